//! Rate-limit gate: guards one protected entry point.
//!
//! State machine: `Checking -> Allowed | Blocked`. A blocked verdict that
//! carries `retry_after_seconds` starts a local countdown that ticks once per
//! second and re-checks on its own when it reaches zero. Without a
//! retry-after there is no automatic re-check.
//!
//! Decision failures fail open. Rate limiting must never be the reason a page
//! is unavailable.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use dealflow_common::types::{BlockReason, RateLimitVerdict};

use crate::decider::RateLimitDecider;

/// Observable state of a gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Checking,
    Allowed,
    Blocked {
        reason: BlockReason,
        retry_after_seconds: Option<u64>,
        /// Seconds left before the automatic re-check, if one is scheduled.
        seconds_remaining: Option<u64>,
    },
}

struct GateInner {
    path: String,
    decider: Arc<dyn RateLimitDecider>,
    state: watch::Sender<GateState>,
}

impl GateInner {
    /// One decision round trip. Never fails: errors become `allowed`.
    async fn evaluate(&self) -> RateLimitVerdict {
        self.state.send_replace(GateState::Checking);

        let verdict = match self.decider.decide(&self.path).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(
                    path = %self.path,
                    error = %e,
                    "Rate-limit decision failed; failing open"
                );
                RateLimitVerdict::allow()
            }
        };

        let state = if verdict.allowed {
            GateState::Allowed
        } else {
            tracing::info!(
                path = %self.path,
                reason = %verdict.reason,
                retry_after = ?verdict.retry_after_seconds,
                "Access blocked by rate-limit gate"
            );
            GateState::Blocked {
                reason: verdict.reason,
                retry_after_seconds: verdict.retry_after_seconds,
                seconds_remaining: verdict.retry_after_seconds.map(countdown_start),
            }
        };
        self.state.send_replace(state);

        verdict
    }

    fn tick(&self, remaining: u64) {
        self.state.send_modify(|state| {
            if let GateState::Blocked {
                seconds_remaining, ..
            } = state
            {
                *seconds_remaining = Some(remaining);
            }
        });
    }
}

/// A zero retry-after still waits one tick so a misbehaving endpoint cannot
/// drive a tight re-check loop.
fn countdown_start(retry_after: u64) -> u64 {
    retry_after.max(1)
}

/// Tick down `remaining` seconds, re-check, and keep going while the
/// endpoint keeps answering "blocked, retry after n".
async fn run_countdown(inner: Arc<GateInner>, mut remaining: u64) {
    loop {
        while remaining > 0 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            remaining -= 1;
            inner.tick(remaining);
        }

        tracing::debug!(path = %inner.path, "Countdown elapsed; re-checking");
        let verdict = inner.evaluate().await;

        match verdict.retry_after_seconds {
            Some(secs) if !verdict.allowed => remaining = countdown_start(secs),
            _ => break,
        }
    }
}

/// Gate for one protected path. Dropping it cancels any running countdown.
pub struct RateLimitGate {
    inner: Arc<GateInner>,
    countdown: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimitGate {
    /// Create a gate without checking yet. State starts as `Checking`.
    pub fn new(path: impl Into<String>, decider: Arc<dyn RateLimitDecider>) -> Self {
        let (state, _) = watch::channel(GateState::Checking);
        Self {
            inner: Arc::new(GateInner {
                path: path.into(),
                decider,
                state,
            }),
            countdown: Mutex::new(None),
        }
    }

    /// Create a gate and run the entry check. Verdicts are never carried over
    /// from an earlier mount.
    pub async fn mount(path: impl Into<String>, decider: Arc<dyn RateLimitDecider>) -> Self {
        let gate = Self::new(path, decider);
        gate.check().await;
        gate
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Ask the decider now. Replaces any running countdown.
    pub async fn check(&self) -> RateLimitVerdict {
        self.cancel_countdown();

        let verdict = self.inner.evaluate().await;

        if !verdict.allowed
            && let Some(secs) = verdict.retry_after_seconds
        {
            let handle = tokio::spawn(run_countdown(self.inner.clone(), countdown_start(secs)));
            let mut slot = self.countdown.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }

        verdict
    }

    pub fn state(&self) -> GateState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every state change, including countdown ticks.
    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.inner.state.subscribe()
    }

    pub fn is_allowed(&self) -> bool {
        matches!(*self.inner.state.borrow(), GateState::Allowed)
    }

    pub fn seconds_remaining(&self) -> Option<u64> {
        match *self.inner.state.borrow() {
            GateState::Blocked {
                seconds_remaining, ..
            } => seconds_remaining,
            _ => None,
        }
    }

    /// Leave the protected scope. Equivalent to dropping the gate.
    pub fn unmount(self) {}

    fn cancel_countdown(&self) {
        let mut slot = self.countdown.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

impl Drop for RateLimitGate {
    fn drop(&mut self) {
        self.cancel_countdown();
    }
}
