//! Detached tasks: fire-and-forget side effects with a fixed contract.
//!
//! The initiating call returns at once. The task runs exactly once per call;
//! its failure is logged here and never reaches the caller, and nothing is
//! retried behind the caller's back.

use std::fmt::Display;
use std::future::Future;

use tokio::task::JoinHandle;

/// Spawn `task` on the runtime and forget about it.
///
/// The returned handle is only useful for tests or shutdown code that wants
/// to wait; dropping it does not cancel the task.
pub fn spawn_detached<F, E>(label: &'static str, task: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        match task.await {
            Ok(()) => tracing::debug!(task = label, "Detached task finished"),
            Err(e) => tracing::warn!(task = label, error = %e, "Detached task failed"),
        }
    })
}
