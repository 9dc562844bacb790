//! Realtime merge channel: keeps a newest-first list current from a push feed.
//!
//! Lifecycle: `Connecting → Subscribed → Closed`. The channel does not catch up
//! on anything published before it subscribed; callers seed the list from an
//! initial fetch first. Each delivered event is applied exactly once.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::feed::{FeedFilter, RealtimeFeed};
use crate::merge::{MergeList, MergeOutcome, MergeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Subscribed,
    Closed,
}

/// Handle to a running merge task. Close it explicitly with
/// [`RealtimeMergeChannel::close`]; dropping an open channel aborts the task
/// and logs a warning.
pub struct RealtimeMergeChannel {
    filter: FeedFilter,
    state: watch::Receiver<ChannelState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeMergeChannel {
    /// Subscribe to `filter` on `feed` and merge inserts into `list`.
    /// Returns immediately in the `Connecting` state.
    pub fn open<T: MergeRecord>(
        feed: Arc<dyn RealtimeFeed>,
        filter: FeedFilter,
        list: MergeList<T>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_merge(
            feed,
            filter.clone(),
            list,
            state_tx,
            shutdown_rx,
        ));

        Self {
            filter,
            state: state_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn filter(&self) -> &FeedFilter {
        &self.filter
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Unsubscribe and wait for the merge task to finish.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RealtimeMergeChannel {
    fn drop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        if !task.is_finished() {
            tracing::warn!(
                channel = %self.filter.channel_name(),
                "Realtime channel dropped without close; aborting subscription"
            );
        }
        task.abort();
    }
}

async fn run_merge<T: MergeRecord>(
    feed: Arc<dyn RealtimeFeed>,
    filter: FeedFilter,
    list: MergeList<T>,
    state: watch::Sender<ChannelState>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let channel = filter.channel_name();

    let mut subscription = tokio::select! {
        _ = &mut shutdown => {
            state.send_replace(ChannelState::Closed);
            return;
        }
        result = feed.subscribe(&filter) => match result {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Realtime subscribe failed");
                state.send_replace(ChannelState::Closed);
                return;
            }
        }
    };

    state.send_replace(ChannelState::Subscribed);
    tracing::info!(channel = %channel, "Realtime channel subscribed");

    let mut merged = 0usize;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = subscription.recv() => match event {
                Some(event) => {
                    if list.on_insert(&filter.table, &event) == MergeOutcome::Merged {
                        merged += 1;
                    }
                }
                None => {
                    tracing::warn!(channel = %channel, "Realtime feed ended");
                    break;
                }
            }
        }
    }

    subscription.unsubscribe();
    state.send_replace(ChannelState::Closed);
    tracing::debug!(channel = %channel, merged, "Realtime channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use dealflow_common::error::AppError;
    use dealflow_common::types::NotificationEvent;

    use crate::feed::{FeedSubscription, LocalFeed};
    use crate::merge::DuplicatePolicy;

    struct UnreachableFeed;

    #[async_trait]
    impl RealtimeFeed for UnreachableFeed {
        async fn subscribe(&self, _filter: &FeedFilter) -> Result<FeedSubscription, AppError> {
            Err(AppError::Upstream("feed offline".to_string()))
        }
    }

    fn memo_filter() -> FeedFilter {
        FeedFilter::new("memo_updates", "deal_id", "d1")
    }

    fn memo(id: &str) -> NotificationEvent {
        NotificationEvent::insert("memo_updates", json!({"id": id, "deal_id": "d1"}))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_subscribed(channel: &RealtimeMergeChannel) {
        let mut state = channel.subscribe_state();
        state
            .wait_for(|s| *s == ChannelState::Subscribed)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_inserts_are_merged_newest_first() {
        let feed = Arc::new(LocalFeed::new());
        let list = MergeList::<serde_json::Value>::default();
        list.seed(vec![json!({"id": "m0"})]);

        let channel = RealtimeMergeChannel::open(feed.clone(), memo_filter(), list.clone());
        assert_eq!(channel.state(), ChannelState::Connecting);
        wait_subscribed(&channel).await;

        feed.publish(&memo_filter(), memo("m1"));
        feed.publish(&memo_filter(), memo("m2"));
        settle().await;

        let ids: Vec<String> = list
            .snapshot()
            .iter()
            .filter_map(|v| v["id"].as_str().map(str::to_string))
            .collect();
        assert_eq!(ids, vec!["m2", "m1", "m0"]);

        channel.close().await;
    }

    #[tokio::test]
    async fn test_close_unsubscribes() {
        let feed = Arc::new(LocalFeed::new());
        let list = MergeList::<serde_json::Value>::default();
        let channel = RealtimeMergeChannel::open(feed.clone(), memo_filter(), list.clone());
        wait_subscribed(&channel).await;
        assert_eq!(feed.subscriber_count(&memo_filter()), 1);

        let mut state = channel.subscribe_state();
        channel.close().await;

        assert_eq!(*state.borrow_and_update(), ChannelState::Closed);
        assert_eq!(feed.subscriber_count(&memo_filter()), 0);
        assert_eq!(feed.publish(&memo_filter(), memo("late")), 0);
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn test_drop_aborts_subscription() {
        let feed = Arc::new(LocalFeed::new());
        let channel = RealtimeMergeChannel::open(
            feed.clone(),
            memo_filter(),
            MergeList::<serde_json::Value>::default(),
        );
        wait_subscribed(&channel).await;

        drop(channel);
        settle().await;

        assert_eq!(feed.subscriber_count(&memo_filter()), 0);
    }

    #[tokio::test]
    async fn test_subscribe_failure_closes_channel() {
        let channel = RealtimeMergeChannel::open(
            Arc::new(UnreachableFeed),
            memo_filter(),
            MergeList::<serde_json::Value>::default(),
        );

        let mut state = channel.subscribe_state();
        state.wait_for(|s| *s == ChannelState::Closed).await.unwrap();
        channel.close().await;
    }

    #[tokio::test]
    async fn test_dedupe_policy_applies_to_feed() {
        let feed = Arc::new(LocalFeed::new());
        let list = MergeList::<serde_json::Value>::new(DuplicatePolicy::DedupeById);
        list.seed(vec![json!({"id": "m1"})]);

        let channel = RealtimeMergeChannel::open(feed.clone(), memo_filter(), list.clone());
        wait_subscribed(&channel).await;

        // Published between the initial fetch and the subscription.
        feed.publish(&memo_filter(), memo("m1"));
        feed.publish(&memo_filter(), memo("m2"));
        settle().await;

        assert_eq!(list.len(), 2);
        channel.close().await;
    }
}
