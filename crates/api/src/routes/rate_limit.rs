//! Rate-limit decision endpoint. Unauthenticated; a bearer token only
//! changes how the caller is counted.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use dealflow_common::error::AppError;
use dealflow_common::types::{DecisionRequest, DecisionResponse};

use crate::decision::RateLimitDecisionService;
use crate::middleware::client::ClientIdentity;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/rate-limit/check", post(check))
}

/// POST /api/rate-limit/check: `{path}` → `{allowed, retryAfter?, reason?}`.
async fn check(
    State(state): State<AppState>,
    client: ClientIdentity,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, AppError> {
    RateLimitDecisionService::validate_path(&req.path)?;

    let mut redis = state.redis.clone();
    let verdict = state
        .decisions
        .decide(&mut redis, &client.key, &req.path, client.user_agent.as_deref())
        .await;

    Ok(Json(verdict.into()))
}
