//! Per-client token buckets keyed by IP address.
//!
//! Scope is one process: several instances behind a load balancer each keep their own
//! registry, so the effective limit multiplies with the instance count.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, Reference},
    middleware::NoOpMiddleware,
    nanos::Nanos,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::ops::Add;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::LimiterConfig;
use crate::error::ApiError;
use crate::server::BackgroundTasks;
use crate::state::AppState;

/// Entries not seen for this long are dropped by the sweep.
pub const IDLE_EVICTION: Duration = Duration::from_secs(3 * 60);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Replenish period used when the configured rate is zero or unusable.
const NO_REFILL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

const UNKNOWN_CLIENT: &str = "unknown";

/// Governor clock reading `tokio::time::Instant`, so paused test time drives refills.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokioInstant(Instant);

impl Add<Nanos> for TokioInstant {
    type Output = TokioInstant;

    fn add(self, other: Nanos) -> TokioInstant {
        TokioInstant(self.0 + Duration::from(other))
    }
}

impl Reference for TokioInstant {
    fn duration_since(&self, earlier: Self) -> Nanos {
        Nanos::from(self.0.saturating_duration_since(earlier.0))
    }

    fn saturating_sub(&self, duration: Nanos) -> Self {
        TokioInstant(self.0.checked_sub(duration.into()).unwrap_or(self.0))
    }
}

impl Clock for TokioClock {
    type Instant = TokioInstant;

    fn now(&self) -> TokioInstant {
        TokioInstant(Instant::now())
    }
}

type ClientLimiter = RateLimiter<NotKeyed, InMemoryState, TokioClock, NoOpMiddleware<TokioInstant>>;

struct ClientEntry {
    /// `None` when the burst is zero: every request is denied.
    limiter: Option<ClientLimiter>,
    last_seen: Instant,
}

/// Build the per-client quota. A zero burst yields `None`.
fn client_quota(requests_per_second: f64, burst: u32) -> Option<Quota> {
    let burst = NonZeroU32::new(burst)?;
    let period = if requests_per_second > 0.0 {
        Duration::try_from_secs_f64(1.0 / requests_per_second)
            .ok()
            .filter(|period| !period.is_zero())
            .unwrap_or(NO_REFILL)
    } else {
        NO_REFILL
    };
    let quota = Quota::with_period(period).or_else(|| Quota::with_period(NO_REFILL))?;
    Some(quota.allow_burst(burst))
}

pub struct RateLimiterRegistry {
    quota: Option<Quota>,
    clients: Mutex<HashMap<String, ClientEntry>>,
}

impl RateLimiterRegistry {
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        Self {
            quota: client_quota(requests_per_second, burst),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::new(config.rps, config.burst)
    }

    /// Create-or-lookup, refresh `last_seen` and consume happen under one lock acquisition.
    pub fn allow(&self, client_ip: &str) -> bool {
        let now = Instant::now();
        let mut clients = self.clients();
        let entry = clients
            .entry(client_ip.to_string())
            .or_insert_with(|| ClientEntry {
                limiter: self
                    .quota
                    .map(|quota| RateLimiter::direct_with_clock(quota, TokioClock)),
                last_seen: now,
            });
        entry.last_seen = entry.last_seen.max(now);
        match &entry.limiter {
            Some(limiter) => limiter.check().is_ok(),
            None => false,
        }
    }

    /// Drop clients idle for longer than [`IDLE_EVICTION`]. Returns how many were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut clients = self.clients();
        let before = clients.len();
        clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= IDLE_EVICTION);
        before - clients.len()
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn contains(&self, client_ip: &str) -> bool {
        self.clients().contains_key(client_ip)
    }

    pub fn len(&self) -> usize {
        self.clients().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<String, ClientEntry>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run the idle sweep once a minute until background work is shut down.
pub fn spawn_sweeper(registry: Arc<RateLimiterRegistry>, background: &BackgroundTasks) {
    let shutdown = background.shutdown_token();
    background.spawn("rate-limiter-sweep", async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = registry.sweep();
                    if evicted > 0 {
                        debug!(evicted, remaining = registry.len(), "evicted idle rate limiter entries");
                    }
                }
            }
        }
        Ok::<(), Infallible>(())
    });
}

/// Best-effort client address: proxy headers first, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.config.limiter.enabled {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);

    // The registry lock is released before the rest of the stack runs.
    if !state.limiter.allow(&ip) {
        debug!(client_ip = %ip, "rate limit exceeded");
        return ApiError::RateLimitExceeded.into_response();
    }

    next.run(request).await
}
