//! Rate-limit decision client.
//!
//! The decision itself lives behind an HTTP endpoint:
//! `POST {path}` → `{allowed, retryAfter?, reason?}`.

use std::time::Duration;

use async_trait::async_trait;

use dealflow_common::error::AppError;
use dealflow_common::types::{DecisionRequest, DecisionResponse, RateLimitVerdict};

/// Default timeout for one decision call.
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Sent on every call; the decision endpoint treats a missing agent as automation.
const USER_AGENT: &str = concat!("dealflow-engine/", env!("CARGO_PKG_VERSION"));

/// Anything that can decide whether a protected path may be entered.
#[async_trait]
pub trait RateLimitDecider: Send + Sync {
    async fn decide(&self, path: &str) -> Result<RateLimitVerdict, AppError>;
}

/// Decider that calls the remote decision endpoint over HTTP.
#[derive(Clone)]
pub struct HttpRateLimitDecider {
    client: reqwest::Client,
    endpoint: String,
    bearer_token: Option<String>,
}

impl HttpRateLimitDecider {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            bearer_token: None,
        })
    }

    /// Attach the caller's session token to every decision call.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

#[async_trait]
impl RateLimitDecider for HttpRateLimitDecider {
    async fn decide(&self, path: &str) -> Result<RateLimitVerdict, AppError> {
        let mut request = self.client.post(&self.endpoint).json(&DecisionRequest {
            path: path.to_string(),
        });
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Decision call failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::Upstream(format!("Decision endpoint error: {}", e)))?;

        let body: DecisionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Decode(format!("Malformed decision response: {}", e)))?;

        Ok(body.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_upstream_error() {
        // Port 9 (discard) on localhost is not expected to run an HTTP server.
        let decider = HttpRateLimitDecider::new("http://127.0.0.1:9/api/rate-limit/check").unwrap();
        let result = decider.decide("/deals").await;
        assert!(matches!(result, Err(AppError::Upstream(_))));
    }
}
