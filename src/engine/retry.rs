//! Task retry controller (§4.7): the "waiting to retry" set and deterministic
//! backoff scheduling, distinct from the ambient [`crate::retry`] module this
//! reuses `task_backoff` from.
//!
//! Grounded directly on the teacher's `retry.rs` (`IsRetryable`,
//! `download_with_retry`); the backoff itself is not reimplemented here, it
//! is the same [`crate::retry::task_backoff`] function the ambient module's
//! doc comment already promises this controller would call.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::retry::task_backoff;
use crate::types::{Task, TaskId};

/// A task currently waiting out its backoff before re-enqueue.
pub struct RetryController {
    reenqueue_tx: mpsc::UnboundedSender<Task>,
}

impl RetryController {
    /// `reenqueue_tx` is the scheduler's channel for tasks that have
    /// completed their backoff and are ready to be held again.
    pub fn new(reenqueue_tx: mpsc::UnboundedSender<Task>) -> Self {
        Self { reenqueue_tx }
    }

    /// Schedule a failed, retryable task for re-enqueue after
    /// `2^(retries - retries_remaining)` seconds. The caller is responsible
    /// for having already decremented `retries_remaining` on `task` and for
    /// emitting the `waitingToRetry` status/progress updates.
    pub fn schedule_retry(self: &Arc<Self>, task: Task, cancel: CancelRetry) {
        let retries = task.meta().retries;
        let retries_remaining = task.meta().retries_remaining;
        let delay = task_backoff(retries, retries_remaining);
        let tx = self.reenqueue_tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(task);
                }
                _ = cancel.cancelled() => {}
            }
        });
    }
}

/// Cancellation handle for a single scheduled retry, checked by a
/// `tokio::select!` against the backoff sleep so a cancel command can
/// remove a waiting-to-retry task immediately instead of waiting out the
/// remaining backoff.
#[derive(Clone)]
pub struct CancelRetry {
    token: tokio_util::sync::CancellationToken,
}

impl CancelRetry {
    pub fn new() -> Self {
        Self {
            token: tokio_util::sync::CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl Default for CancelRetry {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a task should be retried at all: it has a retryable exception
/// and at least one attempt remaining.
pub fn should_retry(task: &Task, retryable: bool) -> bool {
    retryable && task.meta().retries_remaining > 0
}

#[allow(dead_code)]
fn _assert_task_id_usable(_id: &TaskId) {}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaseDirectory, HttpMethod, TaskMeta, Updates};
    use std::collections::HashMap;
    use std::time::Duration;

    fn task_with_retries(retries: u32, retries_remaining: u32) -> Task {
        Task::Download(TaskMeta {
            task_id: TaskId("t1".to_string()),
            url: "https://example.com/f".to_string(),
            url_query_parameters: HashMap::new(),
            headers: HashMap::new(),
            http_request_method: HttpMethod::Get,
            post: None,
            base_directory: BaseDirectory::Temporary,
            directory: String::new(),
            filename: "f".to_string(),
            group: "default".to_string(),
            updates: Updates::StatusAndProgress,
            requires_wifi: false,
            retries,
            retries_remaining,
            allow_pause: true,
            priority: 5,
            meta_data: HashMap::new(),
            display_name: None,
            creation_time: 0,
            unique: false,
        })
    }

    #[test]
    fn should_retry_requires_both_retryable_and_attempts_left() {
        assert!(should_retry(&task_with_retries(3, 1), true));
        assert!(!should_retry(&task_with_retries(3, 0), true));
        assert!(!should_retry(&task_with_retries(3, 1), false));
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_retry_reenqueues_after_backoff() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let controller = Arc::new(RetryController::new(tx));
        let task = task_with_retries(3, 2);

        controller.schedule_retry(task.clone(), CancelRetry::new());

        tokio::time::advance(Duration::from_secs(2)).await;
        let reenqueued = rx.recv().await.expect("reenqueued");
        assert_eq!(reenqueued.id(), task.id());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_suppresses_reenqueue() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let controller = Arc::new(RetryController::new(tx));
        let task = task_with_retries(3, 2);
        let cancel = CancelRetry::new();

        controller.schedule_retry(task, cancel.clone());
        cancel.cancel();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}
