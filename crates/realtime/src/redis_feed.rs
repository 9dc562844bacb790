//! Redis pub/sub transport for the realtime feed.
//!
//! One channel per filter (see [`FeedFilter::channel_name`]). Payloads are
//! JSON-encoded [`NotificationEvent`]s. Each subscription holds its own
//! pub/sub connection; dropping it closes the connection.

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::mpsc;

use dealflow_common::error::AppError;
use dealflow_common::types::{NotificationEvent, scalar_to_string};

use crate::feed::{FeedFilter, FeedSubscription, RealtimeFeed};

/// Subscriber side.
#[derive(Clone)]
pub struct RedisRealtimeFeed {
    client: redis::Client,
}

impl RedisRealtimeFeed {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RealtimeFeed for RedisRealtimeFeed {
    async fn subscribe(&self, filter: &FeedFilter) -> Result<FeedSubscription, AppError> {
        let channel = filter.channel_name();
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;

        tracing::info!(channel = %channel, "Subscribed to realtime feed");

        let (tx, rx) = mpsc::unbounded_channel();
        let pump_channel = channel.clone();
        let pump = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(channel = %pump_channel, error = %e, "Non-text feed payload");
                        continue;
                    }
                };

                match serde_json::from_str::<NotificationEvent>(&payload) {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            channel = %pump_channel,
                            error = %e,
                            "Skipping malformed feed message"
                        );
                    }
                }
            }
            tracing::debug!(channel = %pump_channel, "Feed pump stopped");
        });

        Ok(FeedSubscription::new(channel, rx, Some(pump)))
    }
}

/// Producer side.
#[derive(Clone)]
pub struct RedisFeedPublisher {
    conn: ConnectionManager,
}

impl RedisFeedPublisher {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Publish an insert of `record` into `table`, routed by the value of
    /// `scope_column` in the record. Returns the number of subscribers that
    /// received it.
    pub async fn publish_insert(
        &self,
        table: &str,
        scope_column: &str,
        record: serde_json::Value,
    ) -> Result<usize, AppError> {
        let scope_value = scope_value(&record, scope_column).ok_or_else(|| {
            AppError::Validation(format!("Record has no usable '{}' value", scope_column))
        })?;

        let filter = FeedFilter::new(table, scope_column, scope_value);
        let payload = serde_json::to_string(&NotificationEvent::insert(table, record))?;

        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(filter.channel_name(), payload).await?;

        tracing::debug!(
            channel = %filter.channel_name(),
            receivers,
            "Published realtime insert"
        );

        Ok(receivers.max(0) as usize)
    }
}

/// Filter value for `column` as it appears in a channel name.
fn scope_value(record: &serde_json::Value, column: &str) -> Option<String> {
    scalar_to_string(record.get(column)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scope_value_renders_scalars() {
        let record = json!({"deal_id": 42, "owner": "u1", "pinned": true, "meta": {}});
        assert_eq!(scope_value(&record, "deal_id").as_deref(), Some("42"));
        assert_eq!(scope_value(&record, "owner").as_deref(), Some("u1"));
        assert_eq!(scope_value(&record, "pinned").as_deref(), Some("true"));
        assert!(scope_value(&record, "meta").is_none());
        assert!(scope_value(&record, "missing").is_none());
    }
}
