//! Newest-first list that realtime inserts are merged into.
//!
//! The list is owned by the caller and shared with the merge task. Readers
//! always get a cloned snapshot, so a merge never disturbs a read in progress.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;

use dealflow_common::types::{ChangeKind, NotificationEvent, scalar_to_string};

/// What to do with an insert whose `id` is already in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Prepend regardless. A race between the initial fetch and the
    /// subscription can then show an item twice.
    #[default]
    Allow,
    /// Drop inserts whose `id` is already present.
    DedupeById,
}

/// A record type that can be merged from a feed payload.
pub trait MergeRecord: DeserializeOwned + Clone + Send + Sync + 'static {
    /// Stable identity used for duplicate detection.
    fn record_id(&self) -> Option<String>;
}

impl MergeRecord for serde_json::Value {
    fn record_id(&self) -> Option<String> {
        scalar_to_string(self.get("id")?)
    }
}

/// Result of offering one event to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    /// Wrong table or not an insert.
    Ignored,
    Duplicate,
    Undecodable,
}

/// Shared, newest-first record list.
pub struct MergeList<T> {
    items: Arc<RwLock<VecDeque<T>>>,
    policy: DuplicatePolicy,
}

impl<T> Clone for MergeList<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            policy: self.policy,
        }
    }
}

impl<T: MergeRecord> Default for MergeList<T> {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default())
    }
}

impl<T: MergeRecord> MergeList<T> {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            items: Arc::new(RwLock::new(VecDeque::new())),
            policy,
        }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Replace the contents with an initial fetch, already newest-first.
    pub fn seed(&self, items: Vec<T>) {
        *self.write() = items.into();
    }

    /// Merge one feed event for `table`.
    pub fn on_insert(&self, table: &str, event: &NotificationEvent) -> MergeOutcome {
        if event.source_table != table || event.event_type != ChangeKind::Insert {
            return MergeOutcome::Ignored;
        }

        let record: T = match serde_json::from_value(event.record.clone()) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    table = %table,
                    error = %e,
                    "Skipping undecodable realtime payload"
                );
                return MergeOutcome::Undecodable;
            }
        };

        let mut items = self.write();
        if self.policy == DuplicatePolicy::DedupeById
            && let Some(id) = record.record_id()
            && items.iter().any(|existing| existing.record_id().as_deref() == Some(id.as_str()))
        {
            tracing::debug!(table = %table, id = %id, "Dropping duplicate realtime insert");
            return MergeOutcome::Duplicate;
        }

        items.push_front(record);
        MergeOutcome::Merged
    }

    /// Cloned view of the list, newest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, VecDeque<T>> {
        self.items.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<T>> {
        self.items.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
