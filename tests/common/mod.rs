#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, Response},
    Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use marquee_api::auth::Scope;
use marquee_api::config::AppConfig;
use marquee_api::database::models::{Permissions, User};
use marquee_api::database::{MemoryStore, PermissionStore, StoreError};
use marquee_api::mailer::{EmailMessage, Mailer, MailerError};
use marquee_api::server::{self, BackgroundTasks, Server, ServerError};
use marquee_api::state::{AppState, Stores};

pub const PASSWORD: &str = "pa55word";

/// Development profile with a cheap bcrypt cost and the limiter off, so tests
/// sharing the "unknown" client key don't throttle each other.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.security.bcrypt_cost = 4;
    config.limiter.enabled = false;
    config
}

/// Records every message instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailerError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Permission store whose backend is always down.
pub struct UnavailablePermissions;

#[async_trait]
impl PermissionStore for UnavailablePermissions {
    async fn get_all_for_user(&self, _user_id: i64) -> Result<Permissions, StoreError> {
        Err(StoreError::Timeout(Duration::from_secs(3)))
    }

    async fn add_for_user(&self, _user_id: i64, _codes: &[&str]) -> Result<(), StoreError> {
        Err(StoreError::Timeout(Duration::from_secs(3)))
    }
}

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_stores(config, store.clone(), Stores::memory(store))
    }

    pub fn with_stores(config: AppConfig, store: Arc<MemoryStore>, stores: Stores) -> Self {
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(config, stores).with_mailer(mailer.clone());
        Self {
            store,
            mailer,
            state,
        }
    }

    pub fn router(&self) -> Router {
        server::app(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        Ok(self.router().oneshot(request).await?)
    }

    /// Seed a user with the given activation state and permission codes.
    pub fn seed_user(&self, email: &str, activated: bool, permissions: &[&str]) -> Result<User> {
        let hash = bcrypt::hash(PASSWORD, 4)?;
        let mut user = User::new("Test User".to_string(), email.to_string(), hash.into_bytes());
        user.activated = activated;
        let user = self.store.seed_user(user)?;
        self.store.grant(user.id, permissions);
        Ok(user)
    }

    pub fn bearer_for(&self, user: &User) -> Result<String> {
        let token = self
            .store
            .issue_token(user.id, Scope::Authentication, chrono::Duration::hours(1))?;
        Ok(token.plaintext)
    }
}

pub fn get(uri: &str) -> Request<Body> {
    request(Method::GET, uri, None, None)
}

pub fn request(
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// A server on a real socket, stopped by [`RunningServer::signal`].
pub struct RunningServer {
    pub addr: SocketAddr,
    pub base_url: String,
    pub lifecycle: tokio::sync::watch::Receiver<server::Lifecycle>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    pub async fn start(app: Router, background: BackgroundTasks, grace: Duration) -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;

        let server = Server::new(listener, app, background, grace);
        let lifecycle = server.lifecycle();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async move {
            let _ = stopped.await;
        }));

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            lifecycle,
            stop,
            handle,
        })
    }

    /// Deliver the shutdown signal without waiting for the drain.
    pub fn signal(self) -> JoinHandle<Result<(), ServerError>> {
        let _ = self.stop.send(());
        self.handle
    }
}
