//! Global mutable state for pause/cancel/WiFi-reenqueue, encapsulated in one
//! value owned by the scheduler and mutated only under the command loop (§9
//! "Global mutable state" design note).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::TaskId;

/// TTL a task id stays in the "recently canceled" set, suppressing a
/// duplicate `canceled` emission if the executor races the cancel command.
const RECENTLY_CANCELED_TTL: Duration = Duration::from_secs(1);

/// Holds the three atomic sets named in §9: paused tasks, canceled tasks
/// (with a short-lived dedup window), and tasks pending WiFi-triggered
/// re-enqueue.
#[derive(Default)]
pub struct ControlFlags {
    paused: Mutex<HashMap<TaskId, ()>>,
    canceled: Mutex<HashMap<TaskId, ()>>,
    recently_canceled: Mutex<HashMap<TaskId, Instant>>,
    to_reenqueue: Mutex<HashMap<TaskId, ()>>,
}

impl ControlFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_paused(&self, id: &TaskId) {
        self.paused.lock().unwrap().insert(id.clone(), ());
    }

    pub fn clear_paused(&self, id: &TaskId) {
        self.paused.lock().unwrap().remove(id);
    }

    pub fn is_paused(&self, id: &TaskId) -> bool {
        self.paused.lock().unwrap().contains_key(id)
    }

    /// Mark a task canceled. Returns `false` if it was already canceled
    /// within the dedup TTL, meaning the caller should suppress emitting a
    /// second `canceled` update.
    pub fn mark_canceled(&self, id: &TaskId) -> bool {
        self.canceled.lock().unwrap().insert(id.clone(), ());
        let mut recent = self.recently_canceled.lock().unwrap();
        self.prune_recently_canceled(&mut recent);
        if recent.contains_key(id) {
            return false;
        }
        recent.insert(id.clone(), Instant::now());
        true
    }

    pub fn is_canceled(&self, id: &TaskId) -> bool {
        self.canceled.lock().unwrap().contains_key(id)
    }

    pub fn clear_canceled(&self, id: &TaskId) {
        self.canceled.lock().unwrap().remove(id);
    }

    fn prune_recently_canceled(&self, recent: &mut HashMap<TaskId, Instant>) {
        let now = Instant::now();
        recent.retain(|_, at| now.duration_since(*at) < RECENTLY_CANCELED_TTL);
    }

    /// Mark a task for re-enqueue the next time the executor observes a
    /// failure, used when a WiFi requirement change must cancel-and-restart
    /// in-flight tasks without surfacing `failed` to the caller.
    pub fn mark_to_reenqueue(&self, id: &TaskId) {
        self.to_reenqueue.lock().unwrap().insert(id.clone(), ());
    }

    /// Consume (remove and report) the to-reenqueue flag for a task.
    pub fn take_to_reenqueue(&self, id: &TaskId) -> bool {
        self.to_reenqueue.lock().unwrap().remove(id).is_some()
    }
}
