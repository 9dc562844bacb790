//! Push-feed contract shared by every realtime transport.
//!
//! A feed delivers insert events for one record table, scoped by a single
//! equality filter (`column = value`). There is no replay: a subscriber only
//! sees events published after `subscribe` returns.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use dealflow_common::error::AppError;
use dealflow_common::types::NotificationEvent;

/// Which slice of a table a subscriber wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedFilter {
    pub table: String,
    pub column: String,
    pub value: String,
}

impl FeedFilter {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            value: value.into(),
        }
    }

    /// Transport channel name, e.g. `realtime:activities:deal_id=42`.
    pub fn channel_name(&self) -> String {
        format!("realtime:{}:{}={}", self.table, self.column, self.value)
    }
}

/// An open subscription. Events arrive in publish order.
pub struct FeedSubscription {
    channel: String,
    events: mpsc::UnboundedReceiver<NotificationEvent>,
    pump: Option<JoinHandle<()>>,
}

impl FeedSubscription {
    /// Wrap a receiver. `pump` is the transport task feeding it, if any; it
    /// is stopped when the subscription ends.
    pub fn new(
        channel: String,
        events: mpsc::UnboundedReceiver<NotificationEvent>,
        pump: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            channel,
            events,
            pump,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next event, or `None` once the transport has gone away.
    pub async fn recv(&mut self) -> Option<NotificationEvent> {
        self.events.recv().await
    }

    /// Stop receiving and release the transport.
    pub fn unsubscribe(mut self) {
        self.stop_pump();
        tracing::debug!(channel = %self.channel, "Unsubscribed from feed");
    }

    fn stop_pump(&mut self) {
        self.events.close();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.stop_pump();
    }
}

/// A source of realtime insert events.
#[async_trait]
pub trait RealtimeFeed: Send + Sync {
    async fn subscribe(&self, filter: &FeedFilter) -> Result<FeedSubscription, AppError>;
}

/// In-process feed. Publishers and subscribers share one `LocalFeed`.
#[derive(Default)]
pub struct LocalFeed {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<NotificationEvent>>>>,
}

impl LocalFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every live subscriber of `filter`. Returns how many
    /// subscribers received it.
    pub fn publish(&self, filter: &FeedFilter, event: NotificationEvent) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(senders) = subscribers.get_mut(&filter.channel_name()) else {
            return 0;
        };

        senders.retain(|tx| !tx.is_closed());
        senders
            .iter()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    pub fn subscriber_count(&self, filter: &FeedFilter) -> usize {
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers
            .get(&filter.channel_name())
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl RealtimeFeed for LocalFeed {
    async fn subscribe(&self, filter: &FeedFilter) -> Result<FeedSubscription, AppError> {
        let channel = filter.channel_name();
        let (tx, rx) = mpsc::unbounded_channel();

        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(channel.clone())
            .or_default()
            .push(tx);

        Ok(FeedSubscription::new(channel, rx, None))
    }
}
