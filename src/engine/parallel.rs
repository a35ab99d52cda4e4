//! Parallel-download supervisor (§4.6): chunk planning, child task
//! submission, aggregation, and stitching.
//!
//! Grounded on the `other_examples` references `Fluxaus-FluxDM/chunked.rs`
//! and `rudywasfound-mug/parallel_fetch.rs` for the chunk-plan shape, and on
//! the teacher's `post_processing/mod.rs` event-subscription idiom for how
//! the supervisor observes its children: it subscribes to the reserved
//! `"chunk"` group on the [`super::observation::ObservationPipeline`] and
//! filters by `parentTaskId` in `metaData`, rather than holding a callback
//! object per child.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::types::{
    BaseDirectory, Chunk, HttpMethod, Status, Task, TaskId, TaskMeta, Updates, CHUNK_GROUP,
};

pub const PARENT_TASK_ID_KEY: &str = "parentTaskId";

/// The result of planning a parallel download against a HEAD response.
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    pub total_length: u64,
}

/// Issue a HEAD request and plan `len(urls) * chunks_per_url` byte-range
/// chunks across the given URLs, round-robin, per §4.6.
pub async fn plan_chunks(
    http: &reqwest::Client,
    parent_task_id: &TaskId,
    urls: &[String],
    chunks_per_url: u32,
) -> Result<ChunkPlan, crate::types::TaskException> {
    let first_url = urls.first().ok_or_else(|| crate::types::TaskException::General {
        description: "parallel download requires at least one url".to_string(),
    })?;

    let response = http
        .head(first_url)
        .send()
        .await
        .map_err(|e| crate::types::TaskException::Connection {
            description: format!("HEAD request failed: {e}"),
        })?;

    if !response.status().is_success() {
        return Err(crate::types::TaskException::HttpResponse {
            status_code: response.status().as_u16(),
            description: "HEAD request did not succeed".to_string(),
        });
    }

    let accepts_ranges = response
        .headers()
        .get(reqwest::header::ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("bytes"))
        .unwrap_or(false);
    if !accepts_ranges {
        return Err(crate::types::TaskException::General {
            description: "server does not advertise Accept-Ranges: bytes".to_string(),
        });
    }

    let total_length: u64 = response
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| crate::types::TaskException::General {
            description: "HEAD response missing Content-Length".to_string(),
        })?;

    let n = (urls.len() as u64) * (chunks_per_url as u64);
    let chunk_size = total_length.div_ceil(n.max(1));

    let mut chunks = Vec::new();
    for i in 0..n {
        let from = i * chunk_size;
        if from >= total_length {
            break;
        }
        let to = ((i + 1) * chunk_size).saturating_sub(1).min(total_length - 1);
        let url = urls[(i as usize) % urls.len()].clone();
        chunks.push(Chunk {
            parent_task_id: parent_task_id.clone(),
            url,
            filename: rand_name(),
            from,
            to,
            child_task_id: TaskId::generate(),
        });
    }

    Ok(ChunkPlan { chunks, total_length })
}

/// Build the child [`Task::Download`] for one planned chunk, scoped to the
/// reserved `"chunk"` group and carrying `parentTaskId` in `metaData`.
pub fn build_child_task(parent: &Task, chunk: &Chunk) -> Task {
    let parent_meta = parent.meta();
    let mut headers = HashMap::new();
    headers.insert(
        "Range".to_string(),
        format!("bytes={}-{}", chunk.from, chunk.to),
    );
    let mut meta_data = HashMap::new();
    meta_data.insert(PARENT_TASK_ID_KEY.to_string(), chunk.parent_task_id.as_str().to_string());

    Task::Download(TaskMeta {
        task_id: chunk.child_task_id.clone(),
        url: chunk.url.clone(),
        url_query_parameters: HashMap::new(),
        headers,
        http_request_method: HttpMethod::Get,
        post: None,
        base_directory: BaseDirectory::Temporary,
        directory: String::new(),
        filename: chunk.filename.clone(),
        group: CHUNK_GROUP.to_string(),
        updates: Updates::StatusAndProgress,
        requires_wifi: parent_meta.requires_wifi,
        retries: parent_meta.retries,
        retries_remaining: parent_meta.retries,
        allow_pause: false,
        priority: parent_meta.priority,
        meta_data,
        display_name: None,
        creation_time: parent_meta.creation_time,
        unique: false,
    })
}

/// Tracks the latest known state of each child task for aggregation.
#[derive(Default)]
pub struct ChildTracker {
    statuses: HashMap<TaskId, Status>,
    progress: HashMap<TaskId, f64>,
    temp_paths: HashMap<TaskId, PathBuf>,
}

impl ChildTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_status(&mut self, id: TaskId, status: Status) {
        self.statuses.insert(id, status);
    }

    pub fn record_progress(&mut self, id: TaskId, progress: f64) {
        self.progress.insert(id, progress);
    }

    pub fn record_temp_path(&mut self, id: TaskId, path: PathBuf) {
        self.temp_paths.insert(id, path);
    }

    pub fn temp_path(&self, id: &TaskId) -> Option<&PathBuf> {
        self.temp_paths.get(id)
    }

    /// Parent status per §4.6: `failed` if any child exhausted retries and
    /// failed, `notFound` if any child 404'd, `complete` iff every tracked
    /// child is complete, otherwise still running.
    pub fn aggregate_status(&self, child_ids: &[TaskId]) -> Status {
        let mut any_failed = false;
        let mut any_not_found = false;
        let mut all_complete = true;

        for id in child_ids {
            match self.statuses.get(id) {
                Some(Status::Failed) => any_failed = true,
                Some(Status::NotFound) => any_not_found = true,
                Some(Status::Complete) => {}
                _ => all_complete = false,
            }
        }

        if any_failed {
            Status::Failed
        } else if any_not_found {
            Status::NotFound
        } else if all_complete {
            Status::Complete
        } else {
            Status::Running
        }
    }

    /// Arithmetic mean of the last known progress of each tracked child.
    pub fn aggregate_progress(&self, child_ids: &[TaskId]) -> f64 {
        if child_ids.is_empty() {
            return 0.0;
        }
        let sum: f64 = child_ids
            .iter()
            .map(|id| *self.progress.get(id).unwrap_or(&0.0))
            .sum();
        sum / child_ids.len() as f64
    }
}

/// Concatenate child temp files, sorted by `from`, into `destination`, then
/// remove the temp files. Any I/O error is surfaced as a `FileSystem`
/// exception and leaves already-written destination bytes in place (the
/// caller marks the parent `failed`).
pub async fn stitch(
    chunks: &[Chunk],
    temp_paths: &HashMap<TaskId, PathBuf>,
    destination: &Path,
) -> Result<(), crate::types::TaskException> {
    use tokio::io::AsyncWriteExt;

    let mut ordered = chunks.to_vec();
    ordered.sort_by_key(|c| c.from);

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err(format!("failed to create destination directory: {e}")))?;
    }

    let mut out = tokio::fs::File::create(destination)
        .await
        .map_err(|e| io_err(format!("failed to create stitched file: {e}")))?;

    for chunk in &ordered {
        let path = temp_paths
            .get(&chunk.child_task_id)
            .ok_or_else(|| io_err(format!("missing temp file for chunk from={}", chunk.from)))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| io_err(format!("failed to read chunk temp file {}: {e}", path.display())))?;
        out.write_all(&bytes)
            .await
            .map_err(|e| io_err(format!("failed to write stitched bytes: {e}")))?;
    }
    out.flush().await.map_err(|e| io_err(format!("failed to flush stitched file: {e}")))?;
    drop(out);

    for chunk in &ordered {
        if let Some(path) = temp_paths.get(&chunk.child_task_id) {
            let _ = tokio::fs::remove_file(path).await;
        }
    }

    Ok(())
}

/// SHA-256 of a file on disk, used by tests to verify stitched output
/// matches a direct single-stream download (§8 scenario 4).
pub async fn sha256_of_file(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn io_err(description: String) -> crate::types::TaskException {
    crate::types::TaskException::FileSystem { description }
}

fn rand_name() -> String {
    let bytes: [u8; 4] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
