use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use marquee_api::cli::Cli;
use marquee_api::config::{self, AppConfig, Environment};
use marquee_api::database::{open_pool, MemoryStore};
use marquee_api::middleware::spawn_sweeper;
use marquee_api::server::{self, shutdown_signal, Server};
use marquee_api::state::{AppState, Stores};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up MARQUEE_DB_DSN, etc.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = config::config().clone();
    cli.apply(&mut config);

    init_tracing(config.environment);

    if let Err(e) = run(config, cli.in_memory).await {
        error!(error = %format!("{e:#}"), "server exited with error");
        std::process::exit(1);
    }
}

fn init_tracing(environment: Environment) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if environment == Environment::Production {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn run(config: AppConfig, in_memory: bool) -> anyhow::Result<()> {
    let (stores, pool) = if in_memory {
        info!("using in-memory stores");
        let store = Arc::new(MemoryStore::with_query_timeout(config.database.query_timeout()));
        (Stores::memory(store), None)
    } else {
        let pool = open_pool(&config.database)
            .await
            .context("failed to open database pool")?;
        (Stores::postgres(pool.clone(), &config), Some(pool))
    };

    let state = AppState::new(config.clone(), stores);
    if config.limiter.enabled {
        spawn_sweeper(state.limiter.clone(), &state.background);
    }

    let listener = TcpListener::bind(("0.0.0.0", config.server.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.server.port))?;

    info!(env = config.environment.as_str(), port = config.server.port, "configured server");

    let server = Server::new(
        listener,
        server::app(state.clone()),
        state.background.clone(),
        config.server.shutdown_grace(),
    );
    server.run(shutdown_signal()).await?;

    if let Some(pool) = pool {
        pool.close().await;
        info!("database connection pool closed");
    }
    Ok(())
}
