//! Rate-limit decision service: answers `may this client enter this path?`.
//!
//! Two checks, in order:
//! 1. User-agent heuristic: an empty agent or a known automation tool is
//!    blocked as `bot_detected`, with no retry hint
//! 2. Fixed-window counter in Redis per `(client, path)`: `INCR`, with
//!    `EXPIRE` set on the first hit of a window. Past the limit the caller is
//!    blocked as `rate_limited` until the window's key expires
//!
//! Redis failures fail open: the request is allowed and the error is logged.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use dealflow_common::config::AppConfig;
use dealflow_common::error::AppError;
use dealflow_common::types::{BlockReason, RateLimitVerdict};

/// Case-insensitive fragments that mark a user agent as automation.
const AUTOMATION_AGENTS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "scrapy",
    "curl/",
    "wget/",
    "python-requests",
    "python-urllib",
    "go-http-client",
    "headlesschrome",
    "phantomjs",
];

/// Longest path accepted for a decision.
const MAX_PATH_LEN: usize = 256;

#[derive(Debug, Clone)]
pub struct RateLimitDecisionService {
    max_requests: u32,
    window_seconds: u64,
}

impl RateLimitDecisionService {
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds: window_seconds.max(1),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.rate_limit_max_requests, config.rate_limit_window_seconds)
    }

    /// Reject paths that cannot name a route.
    pub fn validate_path(path: &str) -> Result<(), AppError> {
        if !path.starts_with('/') {
            return Err(AppError::Validation("path must start with '/'".to_string()));
        }
        if path.len() > MAX_PATH_LEN {
            return Err(AppError::Validation(format!(
                "path must be at most {} characters",
                MAX_PATH_LEN
            )));
        }
        Ok(())
    }

    pub fn counter_key(client: &str, path: &str) -> String {
        format!("ratelimit:{}:{}", client, path)
    }

    pub fn is_automated(user_agent: Option<&str>) -> bool {
        let Some(agent) = user_agent.map(str::trim).filter(|a| !a.is_empty()) else {
            return true;
        };
        let agent = agent.to_ascii_lowercase();
        AUTOMATION_AGENTS.iter().any(|marker| agent.contains(marker))
    }

    /// Decide for one request.
    pub async fn decide(
        &self,
        redis: &mut ConnectionManager,
        client: &str,
        path: &str,
        user_agent: Option<&str>,
    ) -> RateLimitVerdict {
        if Self::is_automated(user_agent) {
            tracing::info!(client = %client, path = %path, user_agent = ?user_agent, "Blocked automated client");
            return RateLimitVerdict::block(BlockReason::BotDetected, None);
        }

        let key = Self::counter_key(client, path);
        match self.count_hit(redis, &key).await {
            Ok((count, ttl)) => {
                let verdict = self.verdict_for(count, ttl);
                if !verdict.allowed {
                    tracing::debug!(
                        client = %client,
                        path = %path,
                        count,
                        limit = self.max_requests,
                        retry_after = ?verdict.retry_after_seconds,
                        "Rate limit exceeded"
                    );
                }
                verdict
            }
            Err(e) => {
                tracing::warn!(client = %client, path = %path, error = %e, "Rate-limit counter unavailable; allowing");
                RateLimitVerdict::allow()
            }
        }
    }

    /// Count one hit; returns the window's hit count and seconds left in it.
    async fn count_hit(
        &self,
        redis: &mut ConnectionManager,
        key: &str,
    ) -> Result<(u64, u64), AppError> {
        let count: u64 = redis.incr(key, 1).await?;
        if count == 1 {
            let _: () = redis.expire(key, self.window_seconds as i64).await?;
            return Ok((count, self.window_seconds));
        }

        let ttl: i64 = redis.ttl(key).await?;
        if ttl < 0 {
            // Key lost its expiry; start the window over from now.
            let _: () = redis.expire(key, self.window_seconds as i64).await?;
            return Ok((count, self.window_seconds));
        }

        Ok((count, ttl as u64))
    }

    /// Verdict for the `count`-th hit with `ttl` seconds left in the window.
    pub fn verdict_for(&self, count: u64, ttl: u64) -> RateLimitVerdict {
        if count <= u64::from(self.max_requests) {
            return RateLimitVerdict::allow();
        }
        let retry_after = ttl.clamp(1, self.window_seconds);
        RateLimitVerdict::block(BlockReason::RateLimited, Some(retry_after))
    }
}
