pub mod background;
pub mod lifecycle;
pub mod signal;

pub use background::BackgroundTasks;
pub use lifecycle::{Lifecycle, Server, ServerError};
pub use signal::shutdown_signal;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info_span, warn, Span};

use crate::config::CorsConfig;
use crate::handlers::{debug, healthcheck, movies, not_found, tokens, users, MAX_BODY_BYTES};
use crate::middleware::{
    authenticate, handle_panic, rate_limit, record_metrics, require_authenticated_user,
    require_permission, PermissionGate,
};
use crate::state::AppState;

/// Every endpoint with its per-route authorization; global middleware is added by [`with_middleware`].
pub fn routes(state: &AppState) -> Router<AppState> {
    let can_read = from_fn_with_state(
        PermissionGate::new(state.permissions.clone(), "movies:read"),
        require_permission,
    );
    let can_write = from_fn_with_state(
        PermissionGate::new(state.permissions.clone(), "movies:write"),
        require_permission,
    );

    Router::new()
        .route("/v1/healthcheck", get(healthcheck::healthcheck))
        .route("/debug/vars", get(debug::vars))
        .route(
            "/v1/movies",
            post(movies::create_movie).route_layer(can_write.clone()),
        )
        .route(
            "/v1/movies/:id",
            get(movies::show_movie)
                .route_layer(can_read)
                .merge(delete(movies::delete_movie).route_layer(can_write)),
        )
        .route("/v1/users", post(users::register_user))
        .route("/v1/users/activated", put(users::activate_user))
        .route(
            "/v1/tokens/authentication",
            post(tokens::create_authentication_token).merge(
                delete(tokens::delete_authentication_token)
                    .route_layer(from_fn(require_authenticated_user)),
            ),
        )
        .fallback(not_found)
}

/// Wrap `router` in the global stack. Outermost first: tracing, metrics, panic
/// recovery, request timeout, rate limiting, CORS, authentication.
pub fn with_middleware(router: Router<AppState>, state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors);

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(from_fn_with_state(state.clone(), record_metrics))
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(TimeoutLayer::new(state.config.server.request_timeout()))
                .layer(from_fn_with_state(state.clone(), rate_limit))
                .layer(cors)
                .layer(from_fn_with_state(state.clone(), authenticate))
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

pub fn app(state: AppState) -> Router {
    let router = routes(&state);
    with_middleware(router, state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .trusted_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring unusable trusted origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::OPTIONS, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

fn make_span(request: &Request<Body>) -> Span {
    info_span!(
        "http.request",
        request_method = %request.method(),
        request_url = %request.uri(),
        user_id = tracing::field::Empty,
    )
}
