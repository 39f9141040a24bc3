use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::auth::password::BCRYPT_COST;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub limiter: LimiterConfig,
    pub cors: CorsConfig,
    pub tokens: TokenConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "development" | "dev" => Some(Environment::Development),
            "staging" | "stage" => Some(Environment::Staging),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Bounded wait for in-flight requests once a shutdown signal arrives.
    pub shutdown_grace_secs: u64,
    /// Requests still running after this long are answered with 408.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub dsn: Option<String>,
    pub max_connections: u32,
    pub max_idle_time_secs: u64,
    /// Upper bound for every individual store call.
    pub query_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    pub rps: f64,
    pub burst: u32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub trusted_origins: Vec<String>,
}

/// Longest lifetime a token may be configured with; larger values are clamped.
pub const MAX_TOKEN_TTL_HOURS: u64 = 10 * 365 * 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub activation_ttl_hours: u64,
    pub authentication_ttl_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// bcrypt work factor for stored passwords.
    pub bcrypt_cost: u32,
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl DatabaseConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn max_idle_time(&self) -> Duration {
        Duration::from_secs(self.max_idle_time_secs)
    }
}

impl TokenConfig {
    pub fn activation_ttl(&self) -> chrono::Duration {
        ttl_hours(self.activation_ttl_hours)
    }

    pub fn authentication_ttl(&self) -> chrono::Duration {
        ttl_hours(self.authentication_ttl_hours)
    }
}

fn ttl_hours(hours: u64) -> chrono::Duration {
    let hours = i64::try_from(hours.min(MAX_TOKEN_TTL_HOURS)).unwrap_or(0);
    chrono::Duration::try_hours(hours).unwrap_or_else(chrono::Duration::zero)
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source; `from_env` is the process-env case.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let environment = lookup("APP_ENV")
            .as_deref()
            .and_then(Environment::parse)
            .unwrap_or(Environment::Development);

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_overrides(lookup)
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        // Server overrides
        if let Some(v) = lookup("MARQUEE_PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Some(v) = lookup("MARQUEE_SHUTDOWN_GRACE_SECS") {
            self.server.shutdown_grace_secs = v.parse().unwrap_or(self.server.shutdown_grace_secs);
        }
        if let Some(v) = lookup("MARQUEE_REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs = v.parse().unwrap_or(self.server.request_timeout_secs);
        }

        // Database overrides
        if let Some(v) = lookup("MARQUEE_DB_DSN") {
            self.database.dsn = Some(v);
        }
        if let Some(v) = lookup("MARQUEE_DB_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Some(v) = lookup("MARQUEE_DB_MAX_IDLE_TIME_SECS") {
            self.database.max_idle_time_secs = v.parse().unwrap_or(self.database.max_idle_time_secs);
        }
        if let Some(v) = lookup("MARQUEE_DB_QUERY_TIMEOUT_SECS") {
            self.database.query_timeout_secs = v.parse().unwrap_or(self.database.query_timeout_secs);
        }

        // Limiter overrides
        if let Some(v) = lookup("MARQUEE_LIMITER_RPS") {
            self.limiter.rps = v.parse().unwrap_or(self.limiter.rps);
        }
        if let Some(v) = lookup("MARQUEE_LIMITER_BURST") {
            self.limiter.burst = v.parse().unwrap_or(self.limiter.burst);
        }
        if let Some(v) = lookup("MARQUEE_LIMITER_ENABLED") {
            self.limiter.enabled = v.parse().unwrap_or(self.limiter.enabled);
        }

        // CORS overrides
        if let Some(v) = lookup("MARQUEE_CORS_TRUSTED_ORIGINS") {
            self.cors.trusted_origins = v
                .split([',', ' '])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        // Token overrides
        if let Some(v) = lookup("MARQUEE_ACTIVATION_TTL_HOURS") {
            let hours = v.parse().unwrap_or(self.tokens.activation_ttl_hours);
            self.tokens.activation_ttl_hours = hours.min(MAX_TOKEN_TTL_HOURS);
        }
        if let Some(v) = lookup("MARQUEE_AUTHENTICATION_TTL_HOURS") {
            let hours = v.parse().unwrap_or(self.tokens.authentication_ttl_hours);
            self.tokens.authentication_ttl_hours = hours.min(MAX_TOKEN_TTL_HOURS);
        }

        // Security overrides
        if let Some(v) = lookup("MARQUEE_BCRYPT_COST") {
            self.security.bcrypt_cost = v.parse().unwrap_or(self.security.bcrypt_cost);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 4000,
                shutdown_grace_secs: 5,
                request_timeout_secs: 30,
            },
            database: DatabaseConfig {
                dsn: None,
                max_connections: 25,
                max_idle_time_secs: 15 * 60,
                query_timeout_secs: 3,
            },
            limiter: LimiterConfig {
                rps: 2.0,
                burst: 4,
                enabled: true,
            },
            cors: CorsConfig {
                trusted_origins: vec![
                    "http://localhost:9000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
            tokens: TokenConfig {
                activation_ttl_hours: 3 * 24,
                authentication_ttl_hours: 24,
            },
            security: SecurityConfig {
                bcrypt_cost: BCRYPT_COST,
            },
        }
    }

    fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.database.max_connections = 25;
        config.limiter = LimiterConfig {
            rps: 4.0,
            burst: 8,
            enabled: true,
        };
        config.cors.trusted_origins = vec!["https://staging.example.com".to_string()];
        config
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 4000,
                shutdown_grace_secs: 5,
                request_timeout_secs: 30,
            },
            database: DatabaseConfig {
                dsn: None,
                max_connections: 50,
                max_idle_time_secs: 15 * 60,
                query_timeout_secs: 3,
            },
            limiter: LimiterConfig {
                rps: 2.0,
                burst: 4,
                enabled: true,
            },
            cors: CorsConfig {
                trusted_origins: vec!["https://app.example.com".to_string()],
            },
            tokens: TokenConfig {
                activation_ttl_hours: 3 * 24,
                authentication_ttl_hours: 24,
            },
            security: SecurityConfig {
                bcrypt_cost: BCRYPT_COST,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
