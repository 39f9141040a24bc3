mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{routing::get, Router};

use marquee_api::server::{self, BackgroundTasks, Lifecycle, ServerError};

use common::{RunningServer, TestApp};

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_millis(500)).await;
    "done"
}

async fn very_slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "done"
}

fn slow_app(app: &TestApp) -> Router {
    server::with_middleware(
        Router::new()
            .route("/slow", get(slow))
            .route("/very-slow", get(very_slow)),
        app.state.clone(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn in_flight_request_completes_and_listener_closes() -> Result<()> {
    let app = TestApp::new();
    let running = RunningServer::start(
        slow_app(&app),
        app.state.background.clone(),
        Duration::from_secs(5),
    )
    .await?;
    let addr = running.addr;
    let url = format!("{}/slow", running.base_url);
    let mut lifecycle = running.lifecycle.clone();
    lifecycle.wait_for(|state| *state == Lifecycle::Serving).await?;

    let in_flight = tokio::spawn(async move { reqwest::get(url).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stopping = running.signal();
    let res = in_flight.await??;
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    assert_eq!(res.text().await?, "done");

    stopping.await??;
    assert_eq!(*lifecycle.borrow(), Lifecycle::Stopped);
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn background_work_outlives_the_grace_period() -> Result<()> {
    let app = TestApp::new();
    let background = app.state.background.clone();
    let running = RunningServer::start(
        slow_app(&app),
        background.clone(),
        Duration::from_millis(100),
    )
    .await?;

    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    background.spawn("slow-email", async move {
        tokio::time::sleep(Duration::from_millis(800)).await;
        flag.store(true, Ordering::SeqCst);
        Ok::<(), String>(())
    });

    running.signal().await??;
    assert!(finished.load(Ordering::SeqCst));
    assert!(background.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_outliving_grace_is_a_drain_timeout() -> Result<()> {
    let app = TestApp::new();
    let running = RunningServer::start(
        slow_app(&app),
        BackgroundTasks::new(),
        Duration::from_millis(200),
    )
    .await?;
    let url = format!("{}/very-slow", running.base_url);

    let _in_flight = tokio::spawn(async move { reqwest::get(url).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let outcome = running.signal().await?;
    assert!(matches!(outcome, Err(ServerError::DrainTimeout(_))));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn idle_server_stops_cleanly() -> Result<()> {
    let app = TestApp::new();
    let running = RunningServer::start(
        app.router(),
        app.state.background.clone(),
        Duration::from_secs(5),
    )
    .await?;

    let res = reqwest::get(format!("{}/v1/healthcheck", running.base_url)).await?;
    assert_eq!(res.status(), reqwest::StatusCode::OK);

    running.signal().await??;
    Ok(())
}
