//! Stale-deal report and the thresholds behind it.

use axum::extract::{Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dealflow_common::error::AppError;
use dealflow_common::types::StalenessThresholds;
use dealflow_engine::deals::DealRepository;
use dealflow_engine::staleness::{StaleDeal, StalenessAggregator};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/deals/stale", get(stale_deals))
        .route("/api/preferences/staleness", put(save_thresholds))
}

/// Per-request threshold overrides.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleQuery {
    pub warning_days: Option<u32>,
    pub critical_days: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleDealsResponse {
    pub critical: Vec<StaleDeal>,
    pub warning: Vec<StaleDeal>,
    pub total: usize,
    pub thresholds: StalenessThresholds,
}

/// GET /api/deals/stale: Deals whose lenders have gone quiet, by severity.
async fn stale_deals(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<StaleQuery>,
) -> Result<Json<StaleDealsResponse>, AppError> {
    let thresholds = resolve_thresholds(&state, auth.user_id, &query).await;

    let deals = match DealRepository::load_active(&state.pool).await {
        Ok(deals) => deals,
        Err(e) => {
            tracing::warn!(user_id = %auth.user_id, error = %e, "Failed to load deals; reporting none stale");
            Vec::new()
        }
    };

    let report = StalenessAggregator::aggregate(&deals, &thresholds, Utc::now());
    let total = report.total();

    Ok(Json(StaleDealsResponse {
        critical: report.critical,
        warning: report.warning,
        total,
        thresholds,
    }))
}

/// PUT /api/preferences/staleness: Store the caller's thresholds.
async fn save_thresholds(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(thresholds): Json<StalenessThresholds>,
) -> Result<Json<StalenessThresholds>, AppError> {
    DealRepository::save_thresholds(&state.pool, auth.user_id, &thresholds).await?;
    Ok(Json(thresholds))
}

/// Query overrides first, then stored preferences, then configured defaults.
/// Each cut-off is resolved on its own.
async fn resolve_thresholds(state: &AppState, user_id: Uuid, query: &StaleQuery) -> StalenessThresholds {
    let base = if query.warning_days.is_some() && query.critical_days.is_some() {
        state.config.default_thresholds()
    } else {
        match DealRepository::load_thresholds(&state.pool, user_id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => state.config.default_thresholds(),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to load preferences; using defaults");
                state.config.default_thresholds()
            }
        }
    };

    merge_overrides(base, query)
}

fn merge_overrides(base: StalenessThresholds, query: &StaleQuery) -> StalenessThresholds {
    StalenessThresholds::new(
        query.warning_days.unwrap_or(base.warning_days),
        query.critical_days.unwrap_or(base.critical_days),
    )
}
