//! Deal repository: loads the snapshot the staleness report is computed over.
//!
//! Deals come back in board order with their lenders in list order; the
//! aggregator relies on that order being stable.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use dealflow_common::error::AppError;
use dealflow_common::types::{Deal, LenderUpdate, StalenessThresholds, TrackingStatus};

/// Read-only access to deals and the threshold preferences.
pub struct DealRepository;

type DealLenderRow = (
    Uuid,
    String,
    Option<TrackingStatus>,
    Option<DateTime<Utc>>,
);

impl DealRepository {
    /// Load every non-archived deal with its lenders.
    pub async fn load_active(pool: &PgPool) -> Result<Vec<Deal>, AppError> {
        let rows: Vec<DealLenderRow> = sqlx::query_as(
            r#"
            SELECT d.id, d.company, l.tracking_status, l.updated_at
            FROM deals d
            LEFT JOIN deal_lenders l ON l.deal_id = d.id
            WHERE d.archived = false
            ORDER BY d.position, d.created_at, d.id, l.position, l.id
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(Self::group_rows(rows))
    }

    /// Fold joined rows into deals. Consecutive rows share a deal; a deal
    /// with no lenders arrives as a single row with NULL lender columns.
    fn group_rows(rows: Vec<DealLenderRow>) -> Vec<Deal> {
        let mut deals: Vec<Deal> = Vec::new();

        for (deal_id, company, status, updated_at) in rows {
            if deals.last().is_none_or(|d| d.id != deal_id) {
                deals.push(Deal {
                    id: deal_id,
                    company,
                    lenders: Vec::new(),
                });
            }

            if let (Some(status), Some(deal)) = (status, deals.last_mut()) {
                deal.lenders.push(LenderUpdate::new(status, updated_at));
            }
        }

        deals
    }

    /// The user's stored thresholds, if they have saved any.
    pub async fn load_thresholds(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<StalenessThresholds>, AppError> {
        let row: Option<(i32, i32)> = sqlx::query_as(
            r#"
            SELECT lender_update_yellow_days, lender_update_red_days
            FROM user_preferences
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|(yellow, red)| {
            StalenessThresholds::new(yellow.max(0) as u32, red.max(0) as u32)
        }))
    }

    /// Store the user's thresholds, replacing any previous values.
    pub async fn save_thresholds(
        pool: &PgPool,
        user_id: Uuid,
        thresholds: &StalenessThresholds,
    ) -> Result<(), AppError> {
        let yellow = i32::try_from(thresholds.warning_days)
            .map_err(|_| AppError::Validation("warningDays is too large".to_string()))?;
        let red = i32::try_from(thresholds.critical_days)
            .map_err(|_| AppError::Validation("criticalDays is too large".to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, lender_update_yellow_days, lender_update_red_days)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET lender_update_yellow_days = $2, lender_update_red_days = $3, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(yellow)
        .bind(red)
        .execute(pool)
        .await?;

        tracing::info!(
            user_id = %user_id,
            warning_days = thresholds.warning_days,
            critical_days = thresholds.critical_days,
            "Staleness thresholds saved"
        );

        Ok(())
    }
}
