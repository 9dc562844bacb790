//! Read-marker routes.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use dealflow_common::error::AppError;
use dealflow_common::types::{ReadKey, ReadMarker};
use dealflow_engine::ledger::{PgReadLedger, ReadLedger};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Largest batch accepted by one mark-read call.
const MAX_BATCH: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/notifications/read", get(list_read).post(mark_read))
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub items: Vec<ReadKey>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub requested: usize,
    pub inserted: u64,
}

/// GET /api/notifications/read: Every read marker of the caller.
async fn list_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ReadMarker>>, AppError> {
    let markers = PgReadLedger::new(state.pool.clone()).load(auth.user_id).await?;
    Ok(Json(markers))
}

/// POST /api/notifications/read: Mark a batch read. Repeats are no-ops.
async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>, AppError> {
    validate_batch(&req.items)?;

    let inserted = PgReadLedger::new(state.pool.clone())
        .upsert(auth.user_id, &req.items)
        .await?;

    tracing::info!(
        user_id = %auth.user_id,
        requested = req.items.len(),
        inserted,
        "Notifications marked read"
    );

    Ok(Json(MarkReadResponse {
        requested: req.items.len(),
        inserted,
    }))
}

fn validate_batch(items: &[ReadKey]) -> Result<(), AppError> {
    if items.len() > MAX_BATCH {
        return Err(AppError::Validation(format!(
            "At most {} items per request",
            MAX_BATCH
        )));
    }
    if items.iter().any(|item| item.source_id.trim().is_empty()) {
        return Err(AppError::Validation("Item id must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealflow_common::types::NotificationSource;

    #[test]
    fn test_validate_batch() {
        let ok = vec![ReadKey::new(NotificationSource::Activity, "a1")];
        assert!(validate_batch(&ok).is_ok());
        assert!(validate_batch(&[]).is_ok());

        let blank = vec![ReadKey::new(NotificationSource::Activity, " ")];
        assert!(validate_batch(&blank).is_err());

        let huge: Vec<ReadKey> = (0..=MAX_BATCH)
            .map(|i| ReadKey::new(NotificationSource::SyncQueue, i.to_string()))
            .collect();
        assert!(validate_batch(&huge).is_err());
    }

    #[test]
    fn test_request_wire_shape() {
        let req: MarkReadRequest = serde_json::from_value(serde_json::json!({
            "items": [{"type": "memo_update", "id": "m1"}]
        }))
        .unwrap();
        assert_eq!(req.items, vec![ReadKey::new(NotificationSource::MemoUpdate, "m1")]);
    }
}
