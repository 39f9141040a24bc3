use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from opening the connection pool
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Database did not answer within {0:?}")]
    ConnectTimeout(Duration),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Open the pool described by `config` and verify it with a ping.
pub async fn open_pool(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    let dsn = config
        .dsn
        .as_deref()
        .ok_or(DatabaseError::ConfigMissing("MARQUEE_DB_DSN"))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .idle_timeout(config.max_idle_time())
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect_lazy(dsn)?;

    tokio::time::timeout(CONNECT_TIMEOUT, sqlx::query("SELECT 1").execute(&pool))
        .await
        .map_err(|_| DatabaseError::ConnectTimeout(CONNECT_TIMEOUT))??;

    info!(max_connections = config.max_connections, "database connection pool established");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[tokio::test]
    async fn missing_dsn_is_reported() {
        let config = AppConfig::development();
        let err = open_pool(&config.database).await.unwrap_err();
        assert!(matches!(err, DatabaseError::ConfigMissing("MARQUEE_DB_DSN")));
    }
}
