mod common;

use anyhow::Result;
use axum::http::{header, StatusCode};
use serde_json::json;

use common::{body_json, get, TestApp};

#[tokio::test]
async fn healthcheck_reports_environment_and_version() -> Result<()> {
    let app = TestApp::new();

    let res = app.send(get("/v1/healthcheck")).await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );

    let body = body_json(res).await?;
    assert_eq!(body["status"], "available");
    assert_eq!(body["system_info"]["environment"], "development");
    assert_eq!(body["system_info"]["version"], env!("CARGO_PKG_VERSION"));
    Ok(())
}

#[tokio::test]
async fn every_response_varies_on_authorization() -> Result<()> {
    let app = TestApp::new();

    let res = app.send(get("/v1/healthcheck")).await?;
    let vary: Vec<_> = res
        .headers()
        .get_all(header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    assert!(vary.iter().any(|v| v.contains("Authorization")), "{vary:?}");
    Ok(())
}

#[tokio::test]
async fn unknown_route_is_json_404() -> Result<()> {
    let app = TestApp::new();

    let res = app.send(get("/v1/nowhere")).await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(res).await?,
        json!({ "error": "the requested resource could not be found" })
    );
    Ok(())
}
