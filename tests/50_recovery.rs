mod common;

use anyhow::Result;
use axum::{
    http::{header, StatusCode},
    middleware::from_fn,
    routing::get,
    Router,
};
use serde_json::json;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;

use marquee_api::middleware::{handle_panic, require_activated_user};
use marquee_api::server;

use common::{body_json, get as get_request, TestApp};

async fn explode() -> &'static str {
    panic!("handler exploded")
}

#[tokio::test]
async fn handler_panic_becomes_a_single_500() -> Result<()> {
    let app = TestApp::new();
    let router = server::with_middleware(
        Router::new()
            .route("/explode", get(explode))
            .route("/fine", get(|| async { "fine" })),
        app.state.clone(),
    );

    let res = router.clone().oneshot(get_request("/explode")).await?;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers().get(header::CONNECTION).unwrap(), "close");
    assert_eq!(
        body_json(res).await?,
        json!({ "error": "the server encountered a problem and could not process your request" })
    );

    // The service keeps serving after a panic
    let res = router.oneshot(get_request("/fine")).await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn authorization_without_identity_is_a_recovered_500() -> Result<()> {
    // Authorization mounted without the authenticate middleware in front of it
    let router: Router = Router::new()
        .route("/guarded", get(|| async { "unreachable" }))
        .route_layer(from_fn(require_activated_user))
        .layer(CatchPanicLayer::custom(handle_panic));

    let res = router.oneshot(get_request("/guarded")).await?;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers().get(header::CONNECTION).unwrap(), "close");
    Ok(())
}
