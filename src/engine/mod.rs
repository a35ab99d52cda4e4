//! The transfer engine: ties the holding queue, executor, resume controller,
//! retry controller, and observation pipeline together behind a single-writer
//! command loop (§5).
//!
//! Grounded on the teacher's `downloader/services.rs` background-service
//! starter idiom (`tokio::spawn` an async loop owned by one task, callers
//! only ever send into a channel) generalized from the teacher's ad hoc
//! direct-`Mutex`-access style into the one `tokio::sync::mpsc::Command`
//! channel this spec's three-cap scheduler and WiFi re-enqueueing need to
//! stay consistent under concurrent commands.

pub mod cleanup;
pub mod control_flags;
pub mod executor;
pub mod observation;
pub mod parallel;
pub mod queue;
pub mod resume;
pub mod retry;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::Database;
use crate::types::{
    ProgressUpdate, Status, StatusUpdate, Task, TaskId, TaskRecord, Update, CHUNK_GROUP,
};
use crate::utils::{resolve_destination, resolve_destination_dir};
use crate::{Error, Result};

use cleanup::CleanupController;
use control_flags::ControlFlags;
use executor::{Emission, ExecutorContext, Outcome};
use observation::ObservationPipeline;
use queue::HoldingQueue;
use retry::{CancelRetry, RetryController};

/// A command processed, one at a time, by the engine's single-writer loop.
enum Command {
    Enqueue(Task, oneshot::Sender<Result<bool>>),
    Pause(TaskId, oneshot::Sender<Result<bool>>),
    Resume(TaskId, oneshot::Sender<Result<bool>>),
    Cancel(Vec<TaskId>, oneshot::Sender<Result<usize>>),
    Reset(Option<String>, oneshot::Sender<Result<usize>>),
    /// Internal: a task completed its backoff, or a child chunk needs
    /// re-enqueue; no caller is waiting on this one.
    Requeue(Task),
}

/// Handle to the running transfer engine. Cheap to clone; every clone shares
/// the same command channel and background loop.
#[derive(Clone)]
pub struct TransferEngine {
    inner: Arc<Inner>,
}

struct Inner {
    db: Arc<Database>,
    config: RwLock<Config>,
    http: reqwest::Client,
    queue: HoldingQueue,
    control: ControlFlags,
    observation: ObservationPipeline,
    retry: Arc<RetryController>,
    cleanup: CleanupController,
    running: Mutex<HashMap<TaskId, CancellationToken>>,
    retry_cancels: Mutex<HashMap<TaskId, CancelRetry>>,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl TransferEngine {
    /// Build a new engine and spawn its command loop. Call [`Self::start`]
    /// afterward to redeliver buffered updates and resume in-flight tasks
    /// from a previous run.
    pub fn new(config: Config, db: Arc<Database>) -> Self {
        let http = reqwest::Client::builder()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (reenqueue_tx, mut reenqueue_rx) = mpsc::unbounded_channel::<Task>();
        let observation = ObservationPipeline::new(db.clone());
        let cleanup = CleanupController::new(db.clone());

        let inner = Arc::new(Inner {
            db,
            config: RwLock::new(config),
            http,
            queue: HoldingQueue::new(),
            control: ControlFlags::new(),
            observation,
            retry: Arc::new(RetryController::new(reenqueue_tx)),
            cleanup,
            running: Mutex::new(HashMap::new()),
            retry_cancels: Mutex::new(HashMap::new()),
            cmd_tx: cmd_tx.clone(),
        });

        let engine = Self { inner };

        // Forward retry-controller re-enqueues into the command loop so
        // every holding-queue mutation still goes through one writer.
        let forward_tx = cmd_tx.clone();
        tokio::spawn(async move {
            while let Some(task) = reenqueue_rx.recv().await {
                let _ = forward_tx.send(Command::Requeue(task));
            }
        });

        let loop_engine = engine.clone();
        tokio::spawn(async move {
            loop_engine.run_command_loop(cmd_rx).await;
        });

        engine
    }

    /// Redeliver buffered updates and resume every non-terminal task
    /// persisted from a previous run, per §4.2/§4.8.
    pub async fn start(&self) -> Result<()> {
        if self.inner.db.was_unclean_shutdown().await? {
            tracing::warn!("previous run did not shut down cleanly, recovering active tasks");
        }
        self.inner.db.set_clean_start().await?;

        let delivered = self.inner.observation.redeliver_undelivered().await?;
        if delivered > 0 {
            tracing::info!(count = delivered, "redelivered buffered updates");
        }

        for record in self.inner.db.list_active_tasks().await? {
            if record.status == Status::Paused {
                self.inner.queue.hold(record.task).await;
                continue;
            }
            self.inner.queue.hold(record.task).await;
        }
        self.try_release().await;
        Ok(())
    }

    /// Request an explicit cleanup pass, per §4.2. Coalesces with any pass
    /// already in flight rather than running concurrently.
    pub async fn request_cleanup(&self) {
        let config = self.inner.config.read().await.cleanup.clone();
        self.inner.cleanup.request(config);
    }

    /// Snapshot of the current configuration.
    pub async fn config(&self) -> Config {
        self.inner.config.read().await.clone()
    }

    /// Apply a partial runtime configuration update (`PATCH /config`).
    /// `network_status` changes go through [`Self::set_network_status`] so
    /// the WiFi-reenqueue side effect still fires; `max_concurrent` is
    /// written in place and picked up by the next [`Self::try_release`].
    pub async fn update_config(&self, update: crate::config::ConfigUpdate) -> Config {
        if let Some(status) = update.network_status {
            self.set_network_status(status).await;
        }
        if let Some(max_concurrent) = update.max_concurrent {
            self.inner.config.write().await.concurrency.max_concurrent =
                max_concurrent.unwrap_or(usize::MAX);
            self.try_release().await;
        }
        self.config().await
    }

    /// Admit a task: persist it and enqueue it for scheduling.
    pub async fn enqueue(&self, task: Task) -> Result<bool> {
        task.validate().map_err(|e| Error::Task(crate::types::TaskException::General {
            description: e,
        }))?;
        let (tx, rx) = oneshot::channel();
        self.inner
            .cmd_tx
            .send(Command::Enqueue(task, tx))
            .map_err(|_| Error::ShuttingDown)?;
        rx.await.map_err(|_| Error::ShuttingDown)?
    }

    /// Request a running task pause. Returns `false` if the task is not
    /// currently running or does not allow pause.
    pub async fn pause(&self, id: TaskId) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .cmd_tx
            .send(Command::Pause(id, tx))
            .map_err(|_| Error::ShuttingDown)?;
        rx.await.map_err(|_| Error::ShuttingDown)?
    }

    /// Resume a paused (or previously failed-with-resume-data) task.
    pub async fn resume(&self, id: TaskId) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .cmd_tx
            .send(Command::Resume(id, tx))
            .map_err(|_| Error::ShuttingDown)?;
        rx.await.map_err(|_| Error::ShuttingDown)?
    }

    /// Cancel every listed task, returning once each is terminal-canceled or
    /// already terminal.
    pub async fn cancel(&self, ids: Vec<TaskId>) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .cmd_tx
            .send(Command::Cancel(ids, tx))
            .map_err(|_| Error::ShuttingDown)?;
        rx.await.map_err(|_| Error::ShuttingDown)?
    }

    /// Cancel every non-terminal task in `group` (or every group if `None`),
    /// returning the count canceled.
    pub async fn reset(&self, group: Option<String>) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .cmd_tx
            .send(Command::Reset(group, tx))
            .map_err(|_| Error::ShuttingDown)?;
        rx.await.map_err(|_| Error::ShuttingDown)?
    }

    pub async fn task_for_id(&self, id: &TaskId) -> Result<Option<TaskRecord>> {
        self.inner.db.get_task(id).await
    }

    pub async fn all_tasks(&self, group: Option<&str>) -> Result<Vec<TaskRecord>> {
        match group {
            Some(g) => self.inner.db.list_tasks_by_group(g).await,
            None => self.inner.db.list_tasks().await,
        }
    }

    pub async fn tasks_finished(
        &self,
        group: Option<&str>,
        ignore_task_id: Option<&TaskId>,
    ) -> Result<Vec<TaskRecord>> {
        let all = self.all_tasks(group).await?;
        Ok(all
            .into_iter()
            .filter(|r| r.status.is_terminal())
            .filter(|r| ignore_task_id.is_none_or(|id| r.task.id() != id))
            .collect())
    }

    pub async fn network_status(&self) -> crate::config::NetworkStatus {
        self.inner.config.read().await.network_status
    }

    /// Mark this run as having shut down cleanly, so the next [`Self::start`]
    /// does not log a crash-recovery warning.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.db.set_clean_shutdown().await
    }

    /// Update the current network status. Raising the WiFi requirement (the
    /// new status no longer satisfies a `requiresWiFi` task) cancels and
    /// silently re-enqueues every currently-running WiFi-requiring task
    /// instead of surfacing `failed`/`canceled` to callers, per §4.3.
    pub async fn set_network_status(&self, status: crate::config::NetworkStatus) {
        self.inner.config.write().await.network_status = status;

        if !status.satisfies_wifi_requirement() {
            let running: Vec<(TaskId, CancellationToken)> = self
                .inner
                .running
                .lock()
                .await
                .iter()
                .map(|(id, token)| (id.clone(), token.clone()))
                .collect();
            for (id, token) in running {
                let requires_wifi = self
                    .inner
                    .db
                    .get_task(&id)
                    .await
                    .ok()
                    .flatten()
                    .map(|r| r.task.meta().requires_wifi)
                    .unwrap_or(false);
                if requires_wifi {
                    self.inner.control.mark_to_reenqueue(&id);
                    token.cancel();
                }
            }
        }

        self.try_release().await;
    }

    pub fn subscribe_global(&self) -> tokio::sync::broadcast::Receiver<Update> {
        self.inner.observation.subscribe_global()
    }

    pub async fn subscribe_group(&self, group: &str) -> tokio::sync::broadcast::Receiver<Update> {
        self.inner.observation.subscribe_group(group).await
    }

    async fn run_command_loop(&self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Enqueue(task, reply) => {
                    let result = self.handle_enqueue(task).await;
                    let _ = reply.send(result);
                    self.try_release().await;
                }
                Command::Pause(id, reply) => {
                    let result = self.handle_pause(&id).await;
                    let _ = reply.send(result);
                }
                Command::Resume(id, reply) => {
                    let result = self.handle_resume(&id).await;
                    let _ = reply.send(result);
                    self.try_release().await;
                }
                Command::Cancel(ids, reply) => {
                    let result = self.handle_cancel(ids).await;
                    let _ = reply.send(result);
                    self.try_release().await;
                }
                Command::Reset(group, reply) => {
                    let result = self.handle_reset(group).await;
                    let _ = reply.send(result);
                    self.try_release().await;
                }
                Command::Requeue(task) => {
                    self.inner.queue.hold(task).await;
                    self.try_release().await;
                }
            }
        }
    }

    async fn handle_enqueue(&self, task: Task) -> Result<bool> {
        self.inner.db.insert_task(&task).await?;
        self.inner.queue.hold(task).await;
        Ok(true)
    }

    async fn handle_pause(&self, id: &TaskId) -> Result<bool> {
        let running = self.inner.running.lock().await;
        if !running.contains_key(id) {
            return Ok(false);
        }
        self.inner.control.mark_paused(id);
        Ok(true)
    }

    async fn handle_resume(&self, id: &TaskId) -> Result<bool> {
        let Some(record) = self.inner.db.get_task(id).await? else {
            return Ok(false);
        };
        if record.status != Status::Paused && record.status != Status::Failed {
            return Ok(false);
        }
        self.inner.control.clear_paused(id);
        self.inner.control.clear_canceled(id);
        self.inner.queue.hold(record.task).await;
        Ok(true)
    }

    async fn handle_cancel(&self, ids: Vec<TaskId>) -> Result<usize> {
        let mut canceled = 0;
        for id in ids {
            if self.cancel_one(&id).await {
                canceled += 1;
            }
        }
        Ok(canceled)
    }

    async fn cancel_one(&self, id: &TaskId) -> bool {
        if let Some(cancel) = self.inner.retry_cancels.lock().await.remove(id) {
            cancel.cancel();
            let group = self.group_of(id).await;
            self.emit_progress(
                id.clone(),
                group.clone(),
                Status::Canceled.progress_sentinel().unwrap_or(-2.0),
                None,
                0.0,
                -1000,
            )
            .await;
            self.emit_status(id.clone(), group, Status::Canceled, None).await;
            return true;
        }

        if self.inner.queue.remove(id).await {
            let group = self.group_of(id).await;
            self.emit_progress(
                id.clone(),
                group.clone(),
                Status::Canceled.progress_sentinel().unwrap_or(-2.0),
                None,
                0.0,
                -1000,
            )
            .await;
            self.emit_status(id.clone(), group, Status::Canceled, None).await;
            return true;
        }

        let running = self.inner.running.lock().await;
        if let Some(token) = running.get(id) {
            if !self.inner.control.mark_canceled(id) {
                return true;
            }
            token.cancel();
            return true;
        }

        false
    }

    async fn handle_reset(&self, group: Option<String>) -> Result<usize> {
        let records = self.all_tasks(group.as_deref()).await?;
        let ids: Vec<TaskId> = records
            .into_iter()
            .filter(|r| !r.status.is_terminal())
            .map(|r| r.task.id().clone())
            .collect();
        let count = ids.len();
        self.handle_cancel(ids).await?;
        Ok(count)
    }

    async fn group_of(&self, id: &TaskId) -> String {
        self.inner
            .db
            .get_task(id)
            .await
            .ok()
            .flatten()
            .map(|r| r.task.group().to_string())
            .unwrap_or_default()
    }

    /// Release everything the holding queue's three caps and the current
    /// `requiresWiFi` admission allow, spawning one executor task per
    /// release.
    async fn try_release(&self) {
        let config = self.inner.config.read().await.clone();
        let network_status = config.network_status;
        let released = self
            .inner
            .queue
            .release_eligible(&config, |task| {
                !task.meta().requires_wifi || network_status.satisfies_wifi_requirement()
            })
            .await;

        for task in released {
            let engine = self.clone();
            tokio::spawn(async move {
                engine.run_task(task).await;
            });
        }
    }

    async fn run_task(&self, task: Task) {
        if task.is_chunk() {
            self.run_leaf_task(task).await;
            return;
        }
        if matches!(task, Task::ParallelDownload { .. }) {
            self.run_parallel_task(task).await;
            return;
        }
        self.run_leaf_task(task).await;
    }

    /// Drive a `Download`/`Upload`/`MultiUpload` task (or a parallel-download
    /// child chunk, which is itself a `Download`) through the executor,
    /// persisting and publishing every transition.
    async fn run_leaf_task(&self, mut task: Task) {
        let id = task.id().clone();
        let group = task.group().to_string();
        let cancel = CancellationToken::new();
        self.inner.running.lock().await.insert(id.clone(), cancel.clone());
        self.inner.control.clear_paused(&id);

        self.emit_status(id.clone(), group.clone(), Status::Running, None).await;

        let config = self.inner.config.read().await.clone();
        let resume = self.inner.db.get_resume_data(&id).await.ok().flatten();

        let engine_for_pause = self.clone();
        let pause_id = id.clone();
        let pause_flag: Arc<dyn Fn() -> bool + Send + Sync> =
            Arc::new(move || engine_for_pause.inner.control.is_paused(&pause_id));

        // Emissions are forwarded through this channel rather than persisted
        // from inside the (synchronous) executor callback, so a single
        // drainer task processes them strictly in emission order per §5's
        // "updates for a single task are totally ordered" guarantee.
        let (emit_tx, mut emit_rx) = mpsc::unbounded_channel::<Emission>();
        let drainer = {
            let engine = self.clone();
            let id = id.clone();
            let group = group.clone();
            tokio::spawn(async move {
                while let Some(emission) = emit_rx.recv().await {
                    match emission {
                        Emission::Progress(p) => {
                            engine
                                .emit_progress(
                                    id.clone(),
                                    group.clone(),
                                    p.progress,
                                    p.expected_file_size,
                                    p.network_speed_mbps,
                                    p.time_remaining_ms,
                                )
                                .await;
                        }
                        Emission::Status(s) => {
                            engine.emit_status(id.clone(), group.clone(), s.status, s.exception).await;
                        }
                    }
                }
            })
        };

        let ctx = ExecutorContext {
            http: self.inner.http.clone(),
            temp_dir: std::path::PathBuf::from(config.temp_dir()),
            cancel: cancel.clone(),
            pause_requested: pause_flag,
        };

        let outcome = match &task {
            Task::Download(_) => {
                let destination_dir = resolve_destination_dir(&config, task.meta());
                let (outcome, new_resume) =
                    executor::run_download(&ctx, &task, &destination_dir, resume.as_ref(), |emission| {
                        let _ = emit_tx.send(emission);
                    })
                    .await;
                if let Some(resume) = new_resume {
                    let _ = self.inner.db.put_resume_data(&resume).await;
                }
                outcome
            }
            Task::Upload { .. } => {
                executor::run_upload(&ctx, &task, |emission| {
                    let _ = emit_tx.send(emission);
                })
                .await
            }
            Task::MultiUpload { .. } => {
                executor::run_multi_upload(&ctx, &task, |emission| {
                    let _ = emit_tx.send(emission);
                })
                .await
            }
            Task::ParallelDownload { .. } => unreachable!("parallel tasks are routed separately"),
        };
        drop(emit_tx);
        let _ = drainer.await;

        self.inner.running.lock().await.remove(&id);
        self.finish_leaf_task(&mut task, outcome).await;
        self.inner.queue.settle(&task).await;
        self.try_release().await;
    }

    async fn finish_leaf_task(&self, task: &mut Task, outcome: Outcome) {
        let id = task.id().clone();
        let group = task.group().to_string();

        match outcome {
            Outcome::Complete {
                response_status_code,
                response_headers,
                response_body,
                mime_type,
                char_set,
            } => {
                self.emit_progress(id.clone(), group.clone(), 1.0, None, 0.0, 0).await;
                self.emit_complete(
                    id.clone(),
                    group,
                    response_status_code,
                    response_headers,
                    response_body,
                    mime_type,
                    char_set,
                )
                .await;
                let _ = self.inner.db.delete_resume_data(&id).await;
            }
            Outcome::NotFound => {
                self.emit_progress(
                    id.clone(),
                    group.clone(),
                    Status::NotFound.progress_sentinel().unwrap_or(-3.0),
                    None,
                    0.0,
                    -1000,
                )
                .await;
                self.emit_status(id.clone(), group, Status::NotFound, None).await;
            }
            Outcome::Canceled => {
                if self.inner.control.take_to_reenqueue(&id) {
                    self.inner.control.clear_canceled(&id);
                    self.inner.queue.hold(task.clone()).await;
                } else {
                    self.emit_progress(
                        id.clone(),
                        group.clone(),
                        Status::Canceled.progress_sentinel().unwrap_or(-2.0),
                        None,
                        0.0,
                        -1000,
                    )
                    .await;
                    self.emit_status(id.clone(), group, Status::Canceled, None).await;
                    let _ = self.inner.db.delete_resume_data(&id).await;
                    self.inner.control.clear_canceled(&id);
                }
            }
            Outcome::Paused => {
                self.emit_progress(
                    id.clone(),
                    group.clone(),
                    Status::Paused.progress_sentinel().unwrap_or(-5.0),
                    None,
                    0.0,
                    -1000,
                )
                .await;
                self.emit_status(id.clone(), group, Status::Paused, None).await;
                self.inner.control.clear_paused(&id);
            }
            Outcome::SoftTimedOut => {
                self.inner.queue.hold(task.clone()).await;
            }
            Outcome::Failed(exception) => {
                let retryable = crate::retry::IsRetryable::is_retryable(&exception);
                if retry::should_retry(task, retryable) {
                    task.meta_mut().retries_remaining =
                        task.meta().retries_remaining.saturating_sub(1);
                    let _ = self.inner.db.replace_task(task).await;
                    self.emit_progress(
                        id.clone(),
                        group.clone(),
                        Status::WaitingToRetry.progress_sentinel().unwrap_or(-4.0),
                        None,
                        0.0,
                        -1000,
                    )
                    .await;
                    self.emit_status(id.clone(), group, Status::WaitingToRetry, None).await;

                    let cancel_retry = CancelRetry::new();
                    self.inner
                        .retry_cancels
                        .lock()
                        .await
                        .insert(id.clone(), cancel_retry.clone());
                    self.inner.retry.schedule_retry(task.clone(), cancel_retry);
                } else {
                    self.emit_progress(
                        id.clone(),
                        group.clone(),
                        Status::Failed.progress_sentinel().unwrap_or(-1.0),
                        None,
                        0.0,
                        -1000,
                    )
                    .await;
                    self.emit_status(id.clone(), group, Status::Failed, Some(exception)).await;
                }
            }
        }
    }

    async fn run_parallel_task(&self, task: Task) {
        let Task::ParallelDownload { meta, urls, chunks } = &task else {
            return;
        };
        let id = meta.task_id.clone();
        let group = meta.group.clone();
        self.emit_status(id.clone(), group.clone(), Status::Running, None).await;

        let config = self.inner.config.read().await.clone();
        let temp_dir = std::path::PathBuf::from(config.temp_dir());

        let plan = match parallel::plan_chunks(&self.inner.http, &id, urls, *chunks).await {
            Ok(plan) => plan,
            Err(exception) => {
                self.emit_status(id, group, Status::Failed, Some(exception)).await;
                self.inner.queue.settle(&task).await;
                return;
            }
        };

        let mut tracker = parallel::ChildTracker::new();
        let child_ids: Vec<TaskId> = plan.chunks.iter().map(|c| c.child_task_id.clone()).collect();
        let mut child_rx = self.inner.observation.subscribe_group(CHUNK_GROUP).await;

        for chunk in &plan.chunks {
            let child = parallel::build_child_task(&task, chunk);
            let _ = self.inner.db.insert_task(&child).await;
            self.inner.queue.hold(child).await;
        }
        self.try_release().await;

        loop {
            if self.inner.control.is_canceled(&id) {
                self.handle_cancel(child_ids.clone()).await.ok();
                self.emit_status(id, group.clone(), Status::Canceled, None).await;
                self.inner.queue.settle(&task).await;
                return;
            }

            let update = match child_rx.recv().await {
                Ok(update) => update,
                Err(_) => continue,
            };
            if !child_ids.contains(update.task_id()) {
                continue;
            }
            match update {
                Update::Status(s) => {
                    if s.status == Status::Complete {
                        if let Ok(Some(record)) = self.inner.db.get_task(&s.task_id).await {
                            let destination = resolve_destination(&config, record.task.meta());
                            tracker.record_temp_path(s.task_id.clone(), destination);
                        }
                    }
                    tracker.record_status(s.task_id.clone(), s.status);
                }
                Update::Progress(p) => {
                    tracker.record_progress(p.task_id.clone(), p.progress);
                }
            }

            let aggregated_progress = tracker.aggregate_progress(&child_ids);
            self.emit_progress(id.clone(), group.clone(), aggregated_progress, Some(plan.total_length), 0.0, -1000)
                .await;

            let aggregated_status = tracker.aggregate_status(&child_ids);
            match aggregated_status {
                Status::Complete => {
                    let destination = resolve_destination(&config, meta);
                    let temp_paths = child_ids
                        .iter()
                        .filter_map(|cid| {
                            tracker
                                .temp_path(cid)
                                .map(|p| (cid.clone(), p.clone()))
                        })
                        .collect::<HashMap<_, _>>();
                    match parallel::stitch(&plan.chunks, &temp_paths, &destination).await {
                        Ok(()) => {
                            self.emit_progress(id.clone(), group.clone(), 1.0, Some(plan.total_length), 0.0, 0)
                                .await;
                            self.emit_status(id.clone(), group, Status::Complete, None).await;
                        }
                        Err(exception) => {
                            self.emit_status(id.clone(), group, Status::Failed, Some(exception)).await;
                        }
                    }
                    let _ = temp_dir; // temp dir already embedded in child destinations
                    self.inner.queue.settle(&task).await;
                    return;
                }
                Status::Failed => {
                    self.emit_status(id.clone(), group, Status::Failed, None).await;
                    self.inner.queue.settle(&task).await;
                    return;
                }
                Status::NotFound => {
                    self.emit_status(id.clone(), group, Status::NotFound, None).await;
                    self.inner.queue.settle(&task).await;
                    return;
                }
                Status::Running | Status::Enqueued | Status::Paused | Status::Canceled
                | Status::WaitingToRetry => {}
            }
        }
    }

    async fn emit_status(
        &self,
        task_id: TaskId,
        group: String,
        status: Status,
        exception: Option<crate::types::TaskException>,
    ) {
        let update = Update::Status(StatusUpdate {
            task_id: task_id.clone(),
            group,
            status,
            exception: exception.clone(),
            response_body: None,
            mime_type: None,
            char_set: None,
        });
        let _ = self.inner.observation.publish(update).await;
        let _ = self.inner.db.update_status(&task_id, status).await;
        if let Some(exception) = exception {
            let _ = self.inner.db.set_exception(&task_id, &exception).await;
        }
        let cleanup_config = self.inner.config.read().await.cleanup.clone();
        self.inner.cleanup.note_update(&cleanup_config);
    }

    async fn emit_progress(
        &self,
        task_id: TaskId,
        group: String,
        progress: f64,
        expected_file_size: Option<u64>,
        network_speed_mbps: f64,
        time_remaining_ms: i64,
    ) {
        let update = Update::Progress(ProgressUpdate {
            task_id: task_id.clone(),
            group,
            progress,
            expected_file_size,
            network_speed_mbps,
            time_remaining_ms,
        });
        let _ = self.inner.observation.publish(update).await;
        let _ = self
            .inner
            .db
            .update_progress(&task_id, progress, expected_file_size)
            .await;
    }
}
