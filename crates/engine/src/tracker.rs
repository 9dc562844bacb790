//! Notification read tracker: the façade notification sources talk to.
//!
//! Each source (activity feed, external-sync queue, memo updates) asks the
//! tracker whether its items are read and marks them read when shown. Remote
//! failures are logged and absorbed here: the worst a user sees is read state
//! that is briefly out of date, never an error.

use std::sync::Arc;

use tokio::task::JoinHandle;
use uuid::Uuid;

use dealflow_common::types::{NotificationSource, ReadKey};

use crate::detached::spawn_detached;
use crate::ledger::ReadLedger;
use crate::read_state::ReadStateStore;

/// Cloneable handle over one user's [`ReadStateStore`].
#[derive(Clone)]
pub struct NotificationReadTracker {
    store: Arc<ReadStateStore>,
}

impl NotificationReadTracker {
    pub fn new(user_id: Uuid, ledger: Arc<dyn ReadLedger>) -> Self {
        Self {
            store: Arc::new(ReadStateStore::new(user_id, ledger)),
        }
    }

    pub fn from_store(store: Arc<ReadStateStore>) -> Self {
        Self { store }
    }

    pub fn user_id(&self) -> Uuid {
        self.store.user_id()
    }

    /// Load the user's markers at session start.
    ///
    /// Returns `false` if the ledger could not be reached; the tracker then
    /// starts from "nothing read" instead of blocking the caller.
    pub async fn initialize(&self) -> bool {
        self.refresh().await
    }

    /// Re-fetch the marker set on demand. Known-read items stay read.
    pub async fn refresh(&self) -> bool {
        match self.store.load_all().await {
            Ok(count) => {
                tracing::info!(user_id = %self.user_id(), markers = count, "Read state refreshed");
                true
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %self.user_id(),
                    error = %e,
                    "Failed to load read state; treating unknown items as unread"
                );
                false
            }
        }
    }

    pub fn is_read(&self, source: NotificationSource, source_id: &str) -> bool {
        self.store.is_read(&ReadKey::new(source, source_id))
    }

    /// Mark items read. Safe to call redundantly.
    ///
    /// Returns `true` when the ledger accepted the write (or nothing needed
    /// writing). On `false` the items still read as read locally and are
    /// re-sent by the next call that names them.
    pub async fn mark_read(&self, items: &[ReadKey]) -> bool {
        match self.store.mark_read(items).await {
            Ok(outcome) => {
                if outcome.written > 0 {
                    tracing::debug!(
                        user_id = %self.user_id(),
                        written = outcome.written,
                        inserted = outcome.inserted,
                        "Marked notifications read"
                    );
                }
                true
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %self.user_id(),
                    items = items.len(),
                    error = %e,
                    "Failed to persist read markers; will retry on next mark"
                );
                false
            }
        }
    }

    /// Fire-and-forget variant of [`NotificationReadTracker::mark_read`].
    ///
    /// The items read as read before this returns.
    pub fn mark_read_detached(&self, items: Vec<ReadKey>) -> JoinHandle<()> {
        self.store.mark_local(&items);
        let store = self.store.clone();
        spawn_detached("mark_read", async move {
            store.mark_read(&items).await.map(|_| ())
        })
    }

    /// A view of the tracker bound to one notification source.
    pub fn source(&self, source: NotificationSource) -> SourceReadTracker {
        SourceReadTracker {
            source,
            tracker: self.clone(),
        }
    }
}

/// Tracker scoped to a single notification source.
#[derive(Clone)]
pub struct SourceReadTracker {
    source: NotificationSource,
    tracker: NotificationReadTracker,
}

impl SourceReadTracker {
    pub fn source(&self) -> NotificationSource {
        self.source
    }

    pub fn is_read(&self, id: &str) -> bool {
        self.tracker.is_read(self.source, id)
    }

    pub async fn mark_read<S: AsRef<str>>(&self, ids: &[S]) -> bool {
        let keys: Vec<ReadKey> = ids
            .iter()
            .map(|id| ReadKey::new(self.source, id.as_ref()))
            .collect();
        self.tracker.mark_read(&keys).await
    }

    pub fn unread_count<S: AsRef<str>>(&self, ids: &[S]) -> usize {
        ids.iter().filter(|id| !self.is_read(id.as_ref())).count()
    }

    /// Items from `items` that are not yet read, in their original order.
    pub fn filter_unread<'a, T, F>(&self, items: &'a [T], id_of: F) -> Vec<&'a T>
    where
        F: Fn(&T) -> &str,
    {
        items.iter().filter(|item| !self.is_read(id_of(item))).collect()
    }
}
