use std::net::IpAddr;

use serde::Deserialize;

use crate::types::StalenessThresholds;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (rate-limit counters and realtime feed)
    pub redis_url: String,

    /// JWT secret for API authentication
    pub jwt_secret: String,

    /// JWT token expiry in hours
    pub jwt_expiry_hours: u64,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Port the API server binds to (default: 3000)
    pub api_port: u16,

    /// Requests allowed per client and path within one window (default: 120)
    pub rate_limit_max_requests: u32,

    /// Fixed rate-limit window length in seconds (default: 60)
    pub rate_limit_window_seconds: u64,

    /// Reverse proxies whose `X-Forwarded-For` header is honored (default: none)
    pub trusted_proxies: Vec<IpAddr>,

    /// Warning threshold applied when a user has no stored preference
    pub default_warning_days: u32,

    /// Critical threshold applied when a user has no stored preference
    pub default_critical_days: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_expiry_hours: std::env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("JWT_EXPIRY_HOURS must be a valid u64"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
            rate_limit_max_requests: std::env::var("RATE_LIMIT_MAX_REQUESTS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_MAX_REQUESTS must be a valid u32"))?,
            rate_limit_window_seconds: std::env::var("RATE_LIMIT_WINDOW_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_WINDOW_SECONDS must be a valid u64"))?,
            trusted_proxies: parse_trusted_proxies(
                &std::env::var("TRUSTED_PROXIES").unwrap_or_default(),
            )?,
            default_warning_days: std::env::var("DEFAULT_WARNING_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DEFAULT_WARNING_DAYS must be a valid u32"))?,
            default_critical_days: std::env::var("DEFAULT_CRITICAL_DAYS")
                .unwrap_or_else(|_| "14".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DEFAULT_CRITICAL_DAYS must be a valid u32"))?,
        })
    }

    /// Thresholds used when the caller has not stored any preferences.
    pub fn default_thresholds(&self) -> StalenessThresholds {
        StalenessThresholds::new(self.default_warning_days, self.default_critical_days)
    }
}

/// Comma-separated IP list, e.g. `10.0.0.2, 10.0.0.3`. Blank means none.
fn parse_trusted_proxies(raw: &str) -> anyhow::Result<Vec<IpAddr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse()
                .map_err(|_| anyhow::anyhow!("TRUSTED_PROXIES entry '{}' is not an IP address", entry))
        })
        .collect()
}
