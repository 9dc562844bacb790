//! Read-marker ledger: the remote record of which notifications a user has seen.
//!
//! Rows are keyed by `(user_id, notification_type, notification_id)`. Writes are
//! batched upserts that ignore conflicts on the composite key, so replaying a
//! write never creates a second marker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use dealflow_common::error::AppError;
use dealflow_common::types::{NotificationSource, ReadKey, ReadMarker};

/// Remote store of read markers.
#[async_trait]
pub trait ReadLedger: Send + Sync {
    /// Every marker recorded for `user_id`.
    async fn load(&self, user_id: Uuid) -> Result<Vec<ReadMarker>, AppError>;

    /// Insert markers for `keys`, ignoring ones that already exist.
    /// Returns the number of rows actually created.
    async fn upsert(&self, user_id: Uuid, keys: &[ReadKey]) -> Result<u64, AppError>;
}

/// PostgreSQL-backed ledger over the `notification_reads` table.
#[derive(Clone)]
pub struct PgReadLedger {
    pool: PgPool,
}

impl PgReadLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadLedger for PgReadLedger {
    async fn load(&self, user_id: Uuid) -> Result<Vec<ReadMarker>, AppError> {
        let rows: Vec<(String, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT notification_type, notification_id, marked_at
            FROM notification_reads
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut markers = Vec::with_capacity(rows.len());
        for (notification_type, notification_id, marked_at) in rows {
            // Rows written by newer clients may carry types this build doesn't know.
            let Ok(notification_type) = notification_type.parse::<NotificationSource>() else {
                tracing::debug!(
                    user_id = %user_id,
                    notification_type = %notification_type,
                    "Skipping read marker with unknown type"
                );
                continue;
            };
            markers.push(ReadMarker {
                user_id,
                notification_type,
                notification_id,
                marked_at,
            });
        }

        Ok(markers)
    }

    async fn upsert(&self, user_id: Uuid, keys: &[ReadKey]) -> Result<u64, AppError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let types: Vec<String> = keys.iter().map(|k| k.source.to_string()).collect();
        let ids: Vec<String> = keys.iter().map(|k| k.source_id.clone()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO notification_reads (user_id, notification_type, notification_id)
            SELECT $1, t.notification_type, t.notification_id
            FROM UNNEST($2::text[], $3::text[]) AS t(notification_type, notification_id)
            ON CONFLICT (user_id, notification_type, notification_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(&types)
        .bind(&ids)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            user_id = %user_id,
            requested = keys.len(),
            inserted = result.rows_affected(),
            "Read markers upserted"
        );

        Ok(result.rows_affected())
    }
}
