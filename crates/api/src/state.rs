//! Shared application state for the Axum API server.

use dealflow_common::config::AppConfig;
use redis::aio::ConnectionManager;
use sqlx::PgPool;

use crate::decision::RateLimitDecisionService;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub redis: ConnectionManager,
    pub config: AppConfig,
    pub decisions: RateLimitDecisionService,
}

impl AppState {
    pub fn new(pool: PgPool, redis: ConnectionManager, config: AppConfig) -> Self {
        let decisions = RateLimitDecisionService::from_config(&config);
        Self {
            pool,
            redis,
            config,
            decisions,
        }
    }
}
