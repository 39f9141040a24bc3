//! Serving plus a two-phase drain: bounded for HTTP requests, unbounded for
//! tracked background work.

use axum::Router;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::BackgroundTasks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Starting,
    Serving,
    ShuttingDown,
    Drained,
    Stopped,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listener failed: {0}")]
    Listener(#[from] io::Error),

    #[error("in-flight requests did not finish within {0:?}")]
    DrainTimeout(Duration),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub struct Server {
    listener: TcpListener,
    app: Router,
    background: BackgroundTasks,
    grace: Duration,
    lifecycle: watch::Sender<Lifecycle>,
}

impl Server {
    pub fn new(listener: TcpListener, app: Router, background: BackgroundTasks, grace: Duration) -> Self {
        let (lifecycle, _) = watch::channel(Lifecycle::Starting);
        Self {
            listener,
            app,
            background,
            grace,
            lifecycle,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn lifecycle(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle.subscribe()
    }

    /// Serve until `shutdown` resolves, then drain.
    ///
    /// A listener that stops because shutdown began is a clean exit; a listener
    /// failure or a drain that outlives the grace period is an error. Background
    /// tasks are awaited in every case.
    pub async fn run<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            app,
            background,
            grace,
            lifecycle,
        } = self;

        let addr = listener.local_addr()?;
        let stop = CancellationToken::new();
        let stopped = stop.clone();
        let mut serving = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { stopped.cancelled().await })
            .await
        });

        lifecycle.send_replace(Lifecycle::Serving);
        info!(addr = %addr, "starting server");

        let early_exit = tokio::select! {
            _ = shutdown => None,
            joined = &mut serving => Some(joined),
        };

        let outcome = match early_exit {
            Some(joined) => {
                error!("listener stopped before shutdown was requested");
                joined
                    .map_err(ServerError::from)
                    .and_then(|served| served.map_err(ServerError::from))
            }
            None => {
                lifecycle.send_replace(Lifecycle::ShuttingDown);
                info!(grace_secs = grace.as_secs_f64(), "shutting down server");
                stop.cancel();

                match tokio::time::timeout(grace, &mut serving).await {
                    Ok(joined) => joined
                        .map_err(ServerError::from)
                        .and_then(|served| served.map_err(ServerError::from)),
                    Err(_) => {
                        warn!(grace_secs = grace.as_secs_f64(), "in-flight requests outlived the grace period");
                        serving.abort();
                        Err(ServerError::DrainTimeout(grace))
                    }
                }
            }
        };

        lifecycle.send_replace(Lifecycle::Drained);
        info!(tasks = background.len(), "completing background tasks");
        background.close_and_wait().await;

        lifecycle.send_replace(Lifecycle::Stopped);
        info!(addr = %addr, "stopped server");
        outcome
    }
}
