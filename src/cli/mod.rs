use clap::Parser;

use crate::config::{AppConfig, Environment};

/// Command-line flags. Anything left unset keeps the value from the environment profile.
#[derive(Parser, Debug, Default)]
#[command(name = "marquee-api")]
#[command(about = "Marquee API - JSON backend for a movie catalog")]
#[command(version)]
pub struct Cli {
    #[arg(long, help = "API server port")]
    pub port: Option<u16>,

    #[arg(long = "env", value_parser = parse_environment, help = "Environment (development|staging|production)")]
    pub environment: Option<Environment>,

    #[arg(long = "db-dsn", help = "PostgreSQL DSN")]
    pub db_dsn: Option<String>,

    #[arg(long = "db-max-connections", help = "PostgreSQL max open connections")]
    pub db_max_connections: Option<u32>,

    #[arg(long = "db-max-idle-time", help = "PostgreSQL max connection idle time, in seconds")]
    pub db_max_idle_time: Option<u64>,

    #[arg(long = "limiter-rps", help = "Rate limiter maximum requests per second")]
    pub limiter_rps: Option<f64>,

    #[arg(long = "limiter-burst", help = "Rate limiter maximum burst")]
    pub limiter_burst: Option<u32>,

    #[arg(long = "limiter-enabled", action = clap::ArgAction::Set, help = "Enable rate limiter (true|false)")]
    pub limiter_enabled: Option<bool>,

    #[arg(
        long = "cors-trusted-origins",
        num_args = 1..,
        value_delimiter = ' ',
        help = "Trusted CORS origins (space separated)"
    )]
    pub cors_trusted_origins: Vec<String>,

    #[arg(long = "shutdown-grace", help = "Seconds to let in-flight requests finish on shutdown")]
    pub shutdown_grace: Option<u64>,

    #[arg(long = "in-memory", help = "Use in-process stores instead of PostgreSQL")]
    pub in_memory: bool,
}

fn parse_environment(value: &str) -> Result<Environment, String> {
    Environment::parse(value).ok_or_else(|| format!("unknown environment: {value}"))
}

impl Cli {
    /// Layer the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(environment) = self.environment {
            config.environment = environment;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(grace) = self.shutdown_grace {
            config.server.shutdown_grace_secs = grace;
        }
        if let Some(dsn) = &self.db_dsn {
            config.database.dsn = Some(dsn.clone());
        }
        if let Some(max) = self.db_max_connections {
            config.database.max_connections = max;
        }
        if let Some(idle) = self.db_max_idle_time {
            config.database.max_idle_time_secs = idle;
        }
        if let Some(rps) = self.limiter_rps {
            config.limiter.rps = rps;
        }
        if let Some(burst) = self.limiter_burst {
            config.limiter.burst = burst;
        }
        if let Some(enabled) = self.limiter_enabled {
            config.limiter.enabled = enabled;
        }
        if !self.cors_trusted_origins.is_empty() {
            config.cors.trusted_origins = self.cors_trusted_origins.clone();
        }
    }
}
