//! Record cleanup controller (§4.2): rate-limited deletion of old/excess
//! task records, triggered explicitly or automatically every
//! `autoCleanInterval` record updates.
//!
//! Grounded on the teacher's single-writer background-service idiom also
//! used by [`super::retry::RetryController`]: one `Mutex`-guarded "is a pass
//! running" flag plus a "rerun requested" flag, so concurrent callers
//! coalesce onto the in-flight pass instead of racing the database with
//! duplicate deletes. Deletion itself is paced against
//! [`crate::config::CleanupConfig::rate_per_second`] using the candidate-id
//! list from [`crate::db::Database::ids_to_cleanup`] rather than one bulk
//! statement, so a large backlog does not blot out other database I/O.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::CleanupConfig;
use crate::db::Database;
use crate::Result;

/// Background controller driving cleanup passes against the task-record
/// table. Cheap to clone; every clone shares the same coalescing state.
#[derive(Clone)]
pub struct CleanupController {
    db: Arc<Database>,
    state: Arc<Mutex<PassState>>,
    updates_since_last_pass: Arc<AtomicU64>,
}

struct PassState {
    running: bool,
    rerun_requested: bool,
}

impl CleanupController {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            state: Arc::new(Mutex::new(PassState {
                running: false,
                rerun_requested: false,
            })),
            updates_since_last_pass: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Called once per persisted task-record update. When `auto_clean` is
    /// enabled, triggers a cleanup pass every `auto_clean_interval` calls.
    pub fn note_update(&self, config: &CleanupConfig) {
        if !config.auto_clean {
            return;
        }
        let interval = config.auto_clean_interval.max(1);
        let count = self.updates_since_last_pass.fetch_add(1, Ordering::Relaxed) + 1;
        if count % interval == 0 {
            self.request(config.clone());
        }
    }

    /// Request a cleanup pass. If one is already running, marks it to rerun
    /// once more on completion instead of starting a second pass
    /// concurrently, and returns immediately either way.
    pub fn request(&self, config: CleanupConfig) {
        let controller = self.clone();
        tokio::spawn(async move {
            controller.run(config).await;
        });
    }

    async fn run(&self, config: CleanupConfig) {
        {
            let mut state = self.state.lock().await;
            if state.running {
                state.rerun_requested = true;
                return;
            }
            state.running = true;
        }

        loop {
            match self.run_one_pass(&config).await {
                Ok(deleted) if deleted > 0 => {
                    tracing::info!(deleted, "cleaned up task records");
                }
                Ok(_) => {}
                Err(error) => tracing::warn!(%error, "task record cleanup pass failed"),
            }

            let mut state = self.state.lock().await;
            if state.rerun_requested {
                state.rerun_requested = false;
                continue;
            }
            state.running = false;
            break;
        }
    }

    /// Delete every candidate record, paced to roughly
    /// `config.rate_per_second` deletions per second.
    async fn run_one_pass(&self, config: &CleanupConfig) -> Result<u64> {
        let ids = self
            .db
            .ids_to_cleanup(config.max_record_count as i64, config.max_age.as_secs() as i64)
            .await?;
        let batch_size = (config.rate_per_second.max(1)) as usize;

        let mut deleted = 0u64;
        for (i, chunk) in ids.chunks(batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            for id in chunk {
                self.db.delete_task(id).await?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaseDirectory, HttpMethod, Task, TaskId, TaskMeta, Updates};
    use std::collections::HashMap;
    use tempfile::TempDir;

    async fn test_db() -> (Arc<Database>, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).await.expect("open database");
        (Arc::new(db), dir)
    }

    fn task(id: &str) -> Task {
        Task::Download(TaskMeta {
            task_id: TaskId(id.to_string()),
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
            retries: 0,
            retries_remaining: 0,
            allow_pause: true,
            priority: 5,
            meta_data: HashMap::new(),
            display_name: None,
            creation_time: 0,
            unique: false,
        })
    }

    #[tokio::test]
    async fn explicit_request_deletes_excess_records() {
        let (db, _dir) = test_db().await;
        for i in 0..5 {
            db.insert_task(&task(&format!("t{i}"))).await.unwrap();
        }
        let controller = CleanupController::new(db.clone());
        let mut config = CleanupConfig::default();
        config.max_record_count = 2;
        config.max_age = Duration::from_secs(10 * 24 * 60 * 60);
        config.rate_per_second = 100;

        controller.request(config);
        // the pass is spawned; give it a tick to run against the in-memory executor
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(db.count_tasks().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_requests_coalesce_onto_one_rerun() {
        let (db, _dir) = test_db().await;
        db.insert_task(&task("t0")).await.unwrap();
        let controller = CleanupController::new(db.clone());
        let mut config = CleanupConfig::default();
        config.max_record_count = 0;
        config.rate_per_second = 100;

        controller.request(config.clone());
        controller.request(config);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(db.count_tasks().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn note_update_triggers_every_interval_when_auto_clean_enabled() {
        let (db, _dir) = test_db().await;
        for i in 0..3 {
            db.insert_task(&task(&format!("t{i}"))).await.unwrap();
        }
        let controller = CleanupController::new(db.clone());
        let mut config = CleanupConfig::default();
        config.auto_clean = true;
        config.auto_clean_interval = 2;
        config.max_record_count = 0;
        config.rate_per_second = 100;

        controller.note_update(&config);
        assert_eq!(db.count_tasks().await.unwrap(), 3, "no trigger on the first update");
        controller.note_update(&config);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(db.count_tasks().await.unwrap(), 0, "triggers on the second update");
    }

    #[tokio::test]
    async fn note_update_does_nothing_when_auto_clean_disabled() {
        let (db, _dir) = test_db().await;
        db.insert_task(&task("t0")).await.unwrap();
        let controller = CleanupController::new(db.clone());
        let mut config = CleanupConfig::default();
        config.auto_clean = false;
        config.auto_clean_interval = 1;
        config.max_record_count = 0;

        controller.note_update(&config);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(db.count_tasks().await.unwrap(), 1);
    }
}
