use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::{MemoryStore, MovieStore, PermissionStore, PgStore, TokenStore, UserStore};
use crate::mailer::{LogMailer, Mailer};
use crate::middleware::{RateLimiterRegistry, RequestMetrics};
use crate::server::BackgroundTasks;

/// The four persistence seams, usually all backed by one store.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub movies: Arc<dyn MovieStore>,
}

impl Stores {
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            tokens: store.clone(),
            permissions: store.clone(),
            movies: store,
        }
    }

    pub fn postgres(pool: PgPool, config: &AppConfig) -> Self {
        let store = Arc::new(PgStore::new(pool, config.database.query_timeout()));
        Self {
            users: store.clone(),
            tokens: store.clone(),
            permissions: store.clone(),
            movies: store,
        }
    }
}

/// Shared by every handler and middleware. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub movies: Arc<dyn MovieStore>,
    pub limiter: Arc<RateLimiterRegistry>,
    pub metrics: Arc<RequestMetrics>,
    pub mailer: Arc<dyn Mailer>,
    pub background: BackgroundTasks,
}

impl AppState {
    pub fn new(config: AppConfig, stores: Stores) -> Self {
        let limiter = Arc::new(RateLimiterRegistry::from_config(&config.limiter));
        Self {
            config: Arc::new(config),
            users: stores.users,
            tokens: stores.tokens,
            permissions: stores.permissions,
            movies: stores.movies,
            limiter,
            metrics: Arc::new(RequestMetrics::new()),
            mailer: Arc::new(LogMailer),
            background: BackgroundTasks::new(),
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }
}
