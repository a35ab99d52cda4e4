//! Holding queue / scheduler (§4.3): admission, priority ordering, and the
//! three independent concurrency caps (global, per-host, per-group).
//!
//! Grounded on the teacher's `QueuedDownload`/`BinaryHeap` ordering in
//! `downloader/mod.rs` (here ascending-priority instead of the teacher's
//! descending-priority max-heap, same tie-break idiom reversed) and its
//! `Semaphore`-based `concurrent_limit`, generalized from one global cap into
//! a global counter plus two `HashMap<String, usize>` counters (by host
//! authority, by group) — mirroring how `runtime_config.categories` is a
//! `Mutex`/`RwLock`-guarded map keyed the same way.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::types::Task;

/// A task parked in the holding queue awaiting a free slot.
#[derive(Debug, Clone)]
struct Held {
    task: Task,
    host: String,
}

struct Inner {
    held: Vec<Held>,
    running_global: usize,
    running_by_host: HashMap<String, usize>,
    running_by_group: HashMap<String, usize>,
}

/// Tracks admitted-but-not-yet-released tasks and the counters the release
/// pass checks against `Config`'s caps.
pub struct HoldingQueue {
    inner: Mutex<Inner>,
}

impl HoldingQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                held: Vec::new(),
                running_global: 0,
                running_by_host: HashMap::new(),
                running_by_group: HashMap::new(),
            }),
        }
    }

    /// Extract the URL authority (`host[:port]`) a task's concurrency cap is
    /// keyed by. Falls back to the raw URL when it cannot be parsed, which
    /// only ever affects grouping, not correctness.
    pub fn host_of(task: &Task) -> String {
        url::Url::parse(&task.meta().url)
            .ok()
            .and_then(|u| u.host_str().map(|h| match u.port() {
                Some(p) => format!("{h}:{p}"),
                None => h.to_string(),
            }))
            .unwrap_or_else(|| task.meta().url.clone())
    }

    /// Park a task in the holding queue.
    pub async fn hold(&self, task: Task) {
        let host = Self::host_of(&task);
        let mut inner = self.inner.lock().await;
        inner.held.push(Held { task, host });
        Self::sort_held(&mut inner.held);
    }

    /// Ascending priority, ties broken by creation time ascending (§4.3).
    fn sort_held(held: &mut [Held]) {
        held.sort_by(|a, b| {
            a.task
                .meta()
                .priority
                .cmp(&b.task.meta().priority)
                .then_with(|| a.task.meta().creation_time.cmp(&b.task.meta().creation_time))
        });
    }

    /// Remove a held (not yet running) task by id, e.g. on cancel/reset.
    pub async fn remove(&self, id: &crate::types::TaskId) -> bool {
        let mut inner = self.inner.lock().await;
        let before = inner.held.len();
        inner.held.retain(|h| h.task.id() != id);
        inner.held.len() < before
    }

    /// Scan the held list in priority order and release every task whose
    /// caps currently have room, incrementing counters as each is released.
    /// `admits` decides whether a specific task may be released right now
    /// (used to hold back `requiresWiFi` tasks under a metered connection).
    pub async fn release_eligible(
        &self,
        config: &Config,
        admits: impl Fn(&Task) -> bool,
    ) -> Vec<Task> {
        let mut inner = self.inner.lock().await;
        let mut released = Vec::new();
        let mut remaining = Vec::new();

        for held in std::mem::take(&mut inner.held) {
            let group = held.task.group().to_string();
            let group_cap = config.max_concurrent_for_group(&group);
            let host_cap = config.concurrency.max_concurrent_by_host;

            let global_ok = inner.running_global < config.concurrency.max_concurrent;
            let host_ok = *inner.running_by_host.get(&held.host).unwrap_or(&0) < host_cap;
            let group_ok = *inner.running_by_group.get(&group).unwrap_or(&0) < group_cap;

            if global_ok && host_ok && group_ok && admits(&held.task) {
                inner.running_global += 1;
                *inner.running_by_host.entry(held.host.clone()).or_insert(0) += 1;
                *inner.running_by_group.entry(group).or_insert(0) += 1;
                released.push(held.task);
            } else {
                remaining.push(held);
            }
        }

        inner.held = remaining;
        released
    }

    /// Decrement counters for a finished/canceled task, called once per
    /// release so a subsequent `release_eligible` pass can admit more work.
    pub async fn settle(&self, task: &Task) {
        let host = Self::host_of(task);
        let group = task.group().to_string();
        let mut inner = self.inner.lock().await;
        inner.running_global = inner.running_global.saturating_sub(1);
        if let Some(count) = inner.running_by_host.get_mut(&host) {
            *count = count.saturating_sub(1);
        }
        if let Some(count) = inner.running_by_group.get_mut(&group) {
            *count = count.saturating_sub(1);
        }
    }

    pub async fn held_len(&self) -> usize {
        self.inner.lock().await.held.len()
    }

    pub async fn running_global(&self) -> usize {
        self.inner.lock().await.running_global
    }
}

impl Default for HoldingQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaseDirectory, HttpMethod, TaskId, TaskMeta, Updates};
    use std::collections::HashMap as Map;

    fn task(id: &str, url: &str, group: &str, priority: u8, creation_time: i64) -> Task {
        Task::Download(TaskMeta {
            task_id: TaskId(id.to_string()),
            url: url.to_string(),
            url_query_parameters: Map::new(),
            headers: Map::new(),
            http_request_method: HttpMethod::Get,
            post: None,
            base_directory: BaseDirectory::Temporary,
            directory: String::new(),
            filename: "f".to_string(),
            group: group.to_string(),
            updates: Updates::StatusAndProgress,
            requires_wifi: false,
            retries: 0,
            retries_remaining: 0,
            allow_pause: true,
            priority,
            meta_data: Map::new(),
            display_name: None,
            creation_time,
            unique: false,
        })
    }

    #[tokio::test]
    async fn releases_in_priority_then_creation_order() {
        let queue = HoldingQueue::new();
        queue.hold(task("b", "https://h/b", "g", 5, 200)).await;
        queue.hold(task("a", "https://h/a", "g", 1, 100)).await;
        queue.hold(task("c", "https://h/c", "g", 1, 50)).await;

        let mut config = Config::default();
        config.concurrency.max_concurrent = 10;
        config.concurrency.max_concurrent_by_host = 10;

        let released = queue.release_eligible(&config, |_| true).await;
        let ids: Vec<_> = released.iter().map(|t| t.id().as_str().to_string()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn global_cap_limits_release_count() {
        let queue = HoldingQueue::new();
        for i in 0..5 {
            queue
                .hold(task(&format!("t{i}"), "https://h/x", "g", 5, i as i64))
                .await;
        }

        let mut config = Config::default();
        config.concurrency.max_concurrent = 2;
        config.concurrency.max_concurrent_by_host = 10;

        let released = queue.release_eligible(&config, |_| true).await;
        assert_eq!(released.len(), 2);
        assert_eq!(queue.held_len().await, 3);
    }

    #[tokio::test]
    async fn host_cap_is_independent_of_global_cap() {
        let queue = HoldingQueue::new();
        queue.hold(task("a1", "https://a/1", "g", 5, 1)).await;
        queue.hold(task("a2", "https://a/2", "g", 5, 2)).await;
        queue.hold(task("b1", "https://b/1", "g", 5, 3)).await;

        let mut config = Config::default();
        config.concurrency.max_concurrent = 10;
        config.concurrency.max_concurrent_by_host = 1;

        let released = queue.release_eligible(&config, |_| true).await;
        let ids: Vec<_> = released.iter().map(|t| t.id().as_str().to_string()).collect();
        assert_eq!(ids, vec!["a1", "b1"]);
        assert_eq!(queue.held_len().await, 1);
    }

    #[tokio::test]
    async fn settle_frees_a_slot_for_the_next_release_pass() {
        let queue = HoldingQueue::new();
        let t1 = task("t1", "https://h/1", "g", 5, 1);
        queue.hold(t1.clone()).await;
        queue.hold(task("t2", "https://h/2", "g", 5, 2)).await;

        let mut config = Config::default();
        config.concurrency.max_concurrent = 1;
        config.concurrency.max_concurrent_by_host = 10;

        let released = queue.release_eligible(&config, |_| true).await;
        assert_eq!(released.len(), 1);
        assert_eq!(queue.held_len().await, 1);

        queue.settle(&released[0]).await;
        let released_again = queue.release_eligible(&config, |_| true).await;
        assert_eq!(released_again.len(), 1);
        assert_eq!(queue.held_len().await, 0);
    }

    #[tokio::test]
    async fn admits_predicate_can_hold_back_a_task() {
        let queue = HoldingQueue::new();
        queue.hold(task("wifi", "https://h/1", "g", 5, 1)).await;

        let mut config = Config::default();
        config.concurrency.max_concurrent = 10;
        config.concurrency.max_concurrent_by_host = 10;

        let released = queue.release_eligible(&config, |_| false).await;
        assert!(released.is_empty());
        assert_eq!(queue.held_len().await, 1);
    }

    #[tokio::test]
    async fn remove_drops_a_held_task() {
        let queue = HoldingQueue::new();
        queue.hold(task("t1", "https://h/1", "g", 5, 1)).await;
        assert!(queue.remove(&TaskId("t1".to_string())).await);
        assert_eq!(queue.held_len().await, 0);
        assert!(!queue.remove(&TaskId("t1".to_string())).await);
    }
}
