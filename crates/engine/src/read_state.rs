//! Read-state store: one user's session cache of acknowledged notifications.
//!
//! The store keeps three sets:
//! - `confirmed`: keys known to exist in the remote ledger
//! - `local`: keys marked read in this session whose write has not been confirmed
//! - `in_flight`: keys currently being written
//!
//! `is_read` answers from `confirmed ∪ local`. Both sets only ever grow during
//! a session (a key moves from `local` to `confirmed`, never out), so once a
//! key reads as read it stays read no matter how remote calls interleave.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use dealflow_common::error::AppError;
use dealflow_common::types::ReadKey;

use crate::ledger::ReadLedger;

#[derive(Debug, Default)]
struct ReadState {
    confirmed: HashSet<ReadKey>,
    local: HashSet<ReadKey>,
    in_flight: HashSet<ReadKey>,
}

impl ReadState {
    fn is_read(&self, key: &ReadKey) -> bool {
        self.confirmed.contains(key) || self.local.contains(key)
    }
}

/// Result of a `mark_read` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkReadOutcome {
    /// Keys passed in by the caller.
    pub requested: usize,
    /// Keys sent to the ledger after filtering.
    pub written: usize,
    /// Rows the ledger reported as newly created.
    pub inserted: u64,
}

/// Per-user read-state cache backed by a [`ReadLedger`].
pub struct ReadStateStore {
    user_id: Uuid,
    ledger: Arc<dyn ReadLedger>,
    state: RwLock<ReadState>,
}

impl ReadStateStore {
    pub fn new(user_id: Uuid, ledger: Arc<dyn ReadLedger>) -> Self {
        Self {
            user_id,
            ledger,
            state: RwLock::new(ReadState::default()),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Fetch the user's full marker set and merge it into the snapshot.
    ///
    /// Merging (rather than replacing) keeps keys marked locally while the
    /// fetch was running. Transport errors are returned untouched; the
    /// snapshot is left as it was.
    pub async fn load_all(&self) -> Result<usize, AppError> {
        let markers = self.ledger.load(self.user_id).await?;
        let count = markers.len();

        let mut state = self.write_state();
        for marker in markers {
            let key = marker.key();
            state.local.remove(&key);
            state.confirmed.insert(key);
        }

        tracing::debug!(user_id = %self.user_id, markers = count, "Read state loaded");
        Ok(count)
    }

    /// Pure in-memory lookup; never touches the ledger.
    pub fn is_read(&self, key: &ReadKey) -> bool {
        self.read_state().is_read(key)
    }

    /// Every key currently considered read.
    pub fn snapshot(&self) -> HashSet<ReadKey> {
        let state = self.read_state();
        state.confirmed.union(&state.local).cloned().collect()
    }

    /// Number of keys currently considered read.
    pub fn read_count(&self) -> usize {
        let state = self.read_state();
        state.confirmed.len() + state.local.len()
    }

    /// Make `keys` read as read without writing them. A later `mark_read`
    /// naming them still persists them.
    pub fn mark_local(&self, keys: &[ReadKey]) {
        let mut state = self.write_state();
        for key in keys {
            if !state.confirmed.contains(key) {
                state.local.insert(key.clone());
            }
        }
    }

    /// Mark `keys` read.
    ///
    /// Every key reads as read as soon as this is called. Keys already
    /// confirmed or already being written are not sent again; the rest go to
    /// the ledger in a single batch. If that batch fails the keys stay read
    /// locally but unconfirmed, and the next call naming them re-sends them.
    pub async fn mark_read(&self, keys: &[ReadKey]) -> Result<MarkReadOutcome, AppError> {
        let batch = {
            let mut state = self.write_state();
            let mut batch = Vec::new();
            let mut seen = HashSet::new();

            for key in keys {
                if state.confirmed.contains(key) {
                    continue;
                }
                state.local.insert(key.clone());
                if state.in_flight.contains(key) || !seen.insert(key) {
                    continue;
                }
                batch.push(key.clone());
            }

            for key in &batch {
                state.in_flight.insert(key.clone());
            }
            batch
        };

        let mut outcome = MarkReadOutcome {
            requested: keys.len(),
            written: batch.len(),
            inserted: 0,
        };

        if batch.is_empty() {
            return Ok(outcome);
        }

        let guard = InFlightGuard {
            store: self,
            keys: &batch,
            armed: true,
        };

        match self.ledger.upsert(self.user_id, &batch).await {
            Ok(inserted) => {
                guard.finish(true);
                outcome.inserted = inserted;
                Ok(outcome)
            }
            Err(e) => {
                guard.finish(false);
                Err(e)
            }
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ReadState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ReadState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the in-flight claim on a batch, including when the `mark_read`
/// future is dropped before the ledger answers.
struct InFlightGuard<'a> {
    store: &'a ReadStateStore,
    keys: &'a [ReadKey],
    armed: bool,
}

impl InFlightGuard<'_> {
    fn finish(mut self, written: bool) {
        let mut state = self.store.write_state();
        for key in self.keys {
            state.in_flight.remove(key);
            if written {
                state.local.remove(key);
                state.confirmed.insert(key.clone());
            }
        }
        self.armed = false;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.store.write_state();
        for key in self.keys {
            state.in_flight.remove(key);
        }
    }
}
