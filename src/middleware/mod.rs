pub mod authenticate;
pub mod authorize;
pub mod metrics;
pub mod rate_limit;
pub mod recover;
pub mod response;

pub use authenticate::{authenticate, resolve_identity};
pub use authorize::{
    activated_user, authenticated_user, permitted_user, require_activated_user,
    require_authenticated_user, require_permission, PermissionGate,
};
pub use metrics::{record_metrics, MetricsSnapshot, RequestMetrics};
pub use rate_limit::{client_ip, rate_limit, spawn_sweeper, RateLimiterRegistry};
pub use recover::handle_panic;
pub use response::{ApiResult, Envelope};
