//! Transfer executor (§4.4): the per-task I/O state machine. One instance
//! runs per released task; it streams the HTTP body, throttles progress
//! emission, and classifies every terminal outcome into a [`Status`] plus an
//! optional [`TaskException`].
//!
//! Grounded on the teacher's `reqwest::Client` usage in
//! `downloader/webhooks.rs`/`downloader/rss.rs`, generalized into a
//! streaming transfer path, and on `speed_limiter.rs`'s token-bucket
//! discipline for the network-speed EMA (a lock-free running state rather
//! than a new concurrency primitive). Suspension points reuse the teacher's
//! `active_downloads: HashMap<DownloadId, CancellationToken>` idiom from
//! `downloader/mod.rs`, generalized from pause-only to the pause/cancel/
//! timeout triad this spec needs.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::types::{
    HttpMethod, ProgressUpdate, ResumeData, Status, StatusUpdate, Task, TaskException, Update,
    UploadFile,
};
use crate::utils::{parse_content_disposition_filename, parse_content_type, unique_destination_path};

use super::resume::{can_resume, is_resume_feasible, validate_resume_response};

const STREAM_BUFFER_SIZE: usize = 8 * 1024;
/// Progress fraction reserved for the terminal `complete` emission; streaming
/// never reports 1.0 itself (§4.4).
const MAX_STREAMING_PROGRESS: f64 = 0.999;
const PROGRESS_EMIT_MIN_DELTA: f64 = 0.02;
const PROGRESS_EMIT_MIN_INTERVAL: Duration = Duration::from_millis(500);
const PROGRESS_EMIT_STALL_GRACE: Duration = Duration::from_secs(2);

/// The terminal (or semi-terminal) outcome of running a task to the next
/// pause point, failure, or completion.
pub enum Outcome {
    Complete {
        response_status_code: Option<u16>,
        response_headers: std::collections::HashMap<String, String>,
        response_body: Option<String>,
        mime_type: Option<String>,
        char_set: Option<String>,
    },
    NotFound,
    Failed(TaskException),
    Canceled,
    Paused,
    /// The soft per-task wall-clock limit elapsed; the caller re-enqueues
    /// without counting this as a retry.
    SoftTimedOut,
}

/// Emits progress updates at the throttled cadence required by §4.4.
struct ProgressThrottle {
    last_emitted: f64,
    next_emit: Instant,
}

impl ProgressThrottle {
    fn new() -> Self {
        Self {
            last_emitted: -1.0,
            next_emit: Instant::now(),
        }
    }

    fn should_emit(&mut self, progress: f64, now: Instant) -> bool {
        let delta_ok = progress - self.last_emitted > PROGRESS_EMIT_MIN_DELTA && now >= self.next_emit;
        let stalled_ok =
            progress > self.last_emitted && now >= self.next_emit + PROGRESS_EMIT_STALL_GRACE;
        if delta_ok || stalled_ok {
            self.last_emitted = progress;
            self.next_emit = now + PROGRESS_EMIT_MIN_INTERVAL;
            true
        } else {
            false
        }
    }
}

/// Running estimate of transfer speed, updated per chunk. EMA weighted 3:1
/// toward history per §4.4, mirroring the teacher's token-bucket style
/// lock-free counters in `speed_limiter.rs`.
struct SpeedEma {
    mbps: AtomicU64, // bits of an f64, via to_bits/from_bits
}

impl SpeedEma {
    fn new() -> Self {
        Self {
            mbps: AtomicU64::new(0f64.to_bits()),
        }
    }

    fn sample(&self, bytes: u64, elapsed: Duration) {
        if elapsed.is_zero() {
            return;
        }
        let instant_mbps = (bytes as f64 / 1_000_000.0) / elapsed.as_secs_f64();
        let prev = f64::from_bits(self.mbps.load(Ordering::Relaxed));
        let updated = (prev * 3.0 + instant_mbps) / 4.0;
        self.mbps.store(updated.to_bits(), Ordering::Relaxed);
    }

    fn current(&self) -> f64 {
        f64::from_bits(self.mbps.load(Ordering::Relaxed))
    }
}

fn time_remaining_ms(remaining_bytes: u64, speed_mbps: f64) -> i64 {
    if speed_mbps <= 0.0 {
        return -1000;
    }
    let remaining_mb = remaining_bytes as f64 / 1_000_000.0;
    ((remaining_mb / speed_mbps) * 1000.0) as i64
}

/// Shared resources an executor run needs, independent of which task it is
/// running.
pub struct ExecutorContext {
    pub http: reqwest::Client,
    pub temp_dir: PathBuf,
    pub cancel: CancellationToken,
    /// Polled once per chunk; returning true pauses the transfer in place.
    pub pause_requested: std::sync::Arc<dyn Fn() -> bool + Send + Sync>,
}

/// A single emitted update plus whatever mutable state the caller needs to
/// persist it (the executor does not talk to the database or observation
/// pipeline directly; the engine command loop owns that sequencing per
/// §4.8's "status before database update" rule).
pub enum Emission {
    Status(StatusUpdate),
    Progress(ProgressUpdate),
}

impl Emission {
    pub fn into_update(self) -> Update {
        match self {
            Emission::Status(s) => Update::Status(s),
            Emission::Progress(p) => Update::Progress(p),
        }
    }
}

/// Run a `Download` task (GET/POST, optionally resuming) to completion,
/// reporting emissions via `on_emit` as they occur. `destination_dir` is the
/// resolved `baseDirectory`/`directory` pair; the final filename is decided
/// here from the server's `Content-Disposition` header when the task asked
/// for the suggested-filename sentinel, per §6.
#[allow(clippy::too_many_arguments)]
pub async fn run_download(
    ctx: &ExecutorContext,
    task: &Task,
    destination_dir: &Path,
    resume: Option<&ResumeData>,
    mut on_emit: impl FnMut(Emission),
) -> (Outcome, Option<ResumeData>) {
    let meta = task.meta();
    let mut request = ctx
        .http
        .request(meta.http_request_method.to_reqwest(), task.request_url());

    for (k, v) in &meta.headers {
        request = request.header(k, v);
    }
    if let Some(body) = &meta.post {
        request = request.body(body.clone());
    }

    let temp_path = ctx.temp_dir.join(format!("transferd-{}.part", rand_name()));
    let mut start_byte = 0u64;
    let mut resume_data = resume.cloned();

    if let Some(resume) = resume {
        let existing_len = tokio::fs::metadata(&resume.data).await.ok().map(|m| m.len());
        if !is_resume_feasible(resume, existing_len) {
            resume_data = None;
        } else {
            request = request.header(reqwest::header::RANGE, format!("bytes={}-", resume.required_start_byte));
            start_byte = resume.required_start_byte;
        }
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => return (Outcome::Failed(classify_reqwest_error(&e)), None),
    };

    let status = response.status();
    let headers = response.headers().clone();
    let _advertises_resume = can_resume(&headers);

    if status == reqwest::StatusCode::NOT_FOUND {
        return (Outcome::NotFound, None);
    }

    let mut actual_start = start_byte;
    if let Some(resume) = &resume_data {
        let content_range = headers
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok());
        let e_tag = headers.get(reqwest::header::ETAG).and_then(|v| v.to_str().ok());
        match validate_resume_response(resume, resume.required_start_byte, status, content_range, e_tag) {
            Ok(outcome) => actual_start = outcome.start_byte,
            Err(exception) => return (Outcome::Failed(exception), Some(resume.clone())),
        }
    } else if !status.is_success() {
        return (
            Outcome::Failed(TaskException::HttpResponse {
                status_code: status.as_u16(),
                description: format!("unexpected status {status}"),
            }),
            None,
        );
    }

    let (mime_type, char_set) = headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(parse_content_type)
        .unwrap_or((None, None));

    let content_disposition = headers
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok());
    let destination = destination_dir.join(resolve_filename(task, content_disposition));

    let e_tag = headers.get(reqwest::header::ETAG).and_then(|v| v.to_str().ok()).map(String::from);

    let content_length = headers
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let expected_size = content_length.map(|l| l + actual_start);

    let active_temp_path: PathBuf = resume_data
        .as_ref()
        .map(|r| PathBuf::from(&r.data))
        .unwrap_or(temp_path);

    if let Some(parent) = active_temp_path.parent() {
        if tokio::fs::create_dir_all(parent).await.is_err() {
            return (
                Outcome::Failed(TaskException::FileSystem {
                    description: format!("failed to create temp directory {}", parent.display()),
                }),
                None,
            );
        }
    }

    let open_result = if actual_start > 0 {
        tokio::fs::OpenOptions::new()
            .write(true)
            .open(&active_temp_path)
            .await
    } else {
        tokio::fs::File::create(&active_temp_path).await
    };
    let mut file = match open_result {
        Ok(f) => f,
        Err(e) => {
            return (
                Outcome::Failed(TaskException::FileSystem {
                    description: format!("failed to open temp file: {e}"),
                }),
                None,
            );
        }
    };
    if actual_start > 0 && file.set_len(actual_start).await.is_ok() {
        let _ = file.seek(std::io::SeekFrom::Start(actual_start)).await;
    }

    let mut written = actual_start;
    let mut throttle = ProgressThrottle::new();
    let speed = SpeedEma::new();
    let mut stream = response.bytes_stream();
    let mut last_sample = Instant::now();

    loop {
        if ctx.cancel.is_cancelled() {
            drop(file);
            let _ = tokio::fs::remove_file(&active_temp_path).await;
            return (Outcome::Canceled, None);
        }
        if (ctx.pause_requested)() {
            if let Err(e) = file.flush().await {
                return (
                    Outcome::Failed(TaskException::FileSystem {
                        description: format!("failed to flush on pause: {e}"),
                    }),
                    None,
                );
            }
            let resume = ResumeData {
                task_id: meta.task_id.clone(),
                data: active_temp_path.display().to_string(),
                required_start_byte: written,
                e_tag,
            };
            return (Outcome::Paused, Some(resume));
        }

        match stream.next().await {
            Some(Ok(chunk)) => {
                if let Err(e) = file.write_all(&chunk).await {
                    return (
                        Outcome::Failed(TaskException::FileSystem {
                            description: format!("write failed: {e}"),
                        }),
                        None,
                    );
                }
                written += chunk.len() as u64;
                speed.sample(chunk.len() as u64, last_sample.elapsed());
                last_sample = Instant::now();

                if let Some(expected) = expected_size {
                    let fraction = (written as f64 / expected as f64).min(MAX_STREAMING_PROGRESS);
                    let now = Instant::now();
                    if throttle.should_emit(fraction, now) {
                        let remaining = expected.saturating_sub(written);
                        on_emit(Emission::Progress(ProgressUpdate {
                            task_id: meta.task_id.clone(),
                            group: meta.group.clone(),
                            progress: fraction,
                            expected_file_size: Some(expected),
                            network_speed_mbps: speed.current(),
                            time_remaining_ms: time_remaining_ms(remaining, speed.current()),
                        }));
                    }
                }
            }
            Some(Err(e)) => {
                return (Outcome::Failed(classify_reqwest_error(&e)), None);
            }
            None => break,
        }
    }

    if let Err(e) = file.flush().await {
        return (
            Outcome::Failed(TaskException::FileSystem {
                description: format!("final flush failed: {e}"),
            }),
            None,
        );
    }
    drop(file);

    if let Some(parent) = destination.parent() {
        if tokio::fs::create_dir_all(parent).await.is_err() {
            return (
                Outcome::Failed(TaskException::FileSystem {
                    description: format!("failed to create destination directory {}", parent.display()),
                }),
                None,
            );
        }
    }

    let final_destination = unique_destination_path(destination, meta.unique);
    if let Err(e) = tokio::fs::rename(&active_temp_path, &final_destination).await {
        return (
            Outcome::Failed(TaskException::FileSystem {
                description: format!("failed to move temp file to destination: {e}"),
            }),
            None,
        );
    }

    let response_headers = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();

    (
        Outcome::Complete {
            response_status_code: Some(status.as_u16()),
            response_headers,
            response_body: None,
            mime_type,
            char_set,
        },
        None,
    )
}

/// Resolve a download's destination filename, preferring the server's
/// `Content-Disposition` header when the task asked for the suggested
/// filename, per §6.
pub fn resolve_filename(task: &Task, content_disposition: Option<&str>) -> String {
    let meta = task.meta();
    if meta.filename != crate::types::SUGGESTED_FILENAME {
        return meta.filename.clone();
    }
    content_disposition
        .and_then(parse_content_disposition_filename)
        .unwrap_or_else(|| {
            task.request_url()
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or("download")
                .to_string()
        })
}

/// Run an `Upload` task (binary body or single-file multipart).
pub async fn run_upload(
    ctx: &ExecutorContext,
    task: &Task,
    mut on_emit: impl FnMut(Emission),
) -> Outcome {
    let Task::Upload {
        meta,
        file_field,
        fields,
        file_path,
        mime_type,
        binary,
    } = task
    else {
        return Outcome::Failed(TaskException::General {
            description: "run_upload called with a non-upload task".to_string(),
        });
    };

    let file_bytes = match tokio::fs::read(file_path).await {
        Ok(b) => b,
        Err(e) => {
            return Outcome::Failed(TaskException::FileSystem {
                description: format!("failed to read upload file: {e}"),
            });
        }
    };
    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.bin")
        .to_string();
    let resolved_mime = mime_type.clone().unwrap_or_else(|| guess_mime(&filename));

    let mut request = ctx
        .http
        .request(meta.http_request_method.to_reqwest(), task.request_url());
    for (k, v) in &meta.headers {
        request = request.header(k, v);
    }

    if *binary {
        request = request.header(reqwest::header::CONTENT_TYPE, resolved_mime.clone());
        if !meta.headers.contains_key("Content-Disposition") {
            request = request.header(
                reqwest::header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            );
        }
        request = request.body(file_bytes);
    } else {
        let mut form = reqwest::multipart::Form::new();
        for (k, v) in fields {
            form = form.text(k.clone(), v.clone());
        }
        let field_name = file_field.clone().unwrap_or_else(|| "file".to_string());
        let part = reqwest::multipart::Part::bytes(file_bytes)
            .file_name(filename)
            .mime_str(&resolved_mime)
            .unwrap_or_else(|_| reqwest::multipart::Part::bytes(Vec::new()));
        form = form.part(field_name, part);
        request = request.multipart(form);
    }

    send_and_classify(request, meta, &mut on_emit).await
}

/// Run a `MultiUpload` task (several files as one multipart request).
pub async fn run_multi_upload(
    ctx: &ExecutorContext,
    task: &Task,
    mut on_emit: impl FnMut(Emission),
) -> Outcome {
    let Task::MultiUpload { meta, files } = task else {
        return Outcome::Failed(TaskException::General {
            description: "run_multi_upload called with a non-multi-upload task".to_string(),
        });
    };

    let mut form = reqwest::multipart::Form::new();
    for file in files {
        let bytes = match tokio::fs::read(&file.file_path).await {
            Ok(b) => b,
            Err(e) => {
                return Outcome::Failed(TaskException::FileSystem {
                    description: format!("failed to read {}: {e}", file.file_path.display()),
                });
            }
        };
        let mime = file.mime_type.clone().unwrap_or_else(|| guess_mime(&file.filename));
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file.filename.clone())
            .mime_str(&mime)
            .unwrap_or_else(|_| reqwest::multipart::Part::bytes(Vec::new()));
        form = form.part(file.field.clone(), part);
    }

    let mut request = ctx
        .http
        .request(meta.http_request_method.to_reqwest(), task.request_url())
        .multipart(form);
    for (k, v) in &meta.headers {
        request = request.header(k, v);
    }

    send_and_classify(request, meta, &mut on_emit).await
}

async fn send_and_classify(
    request: reqwest::RequestBuilder,
    _meta: &crate::types::TaskMeta,
    _on_emit: &mut impl FnMut(Emission),
) -> Outcome {
    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => return Outcome::Failed(classify_reqwest_error(&e)),
    };

    let status = response.status();
    let headers = response.headers().clone();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Outcome::NotFound;
    }
    if !status.is_success() {
        return Outcome::Failed(TaskException::HttpResponse {
            status_code: status.as_u16(),
            description: format!("unexpected status {status}"),
        });
    }

    let (mime_type, char_set) = headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(parse_content_type)
        .unwrap_or((None, None));
    let response_headers = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();
    let response_body = response.text().await.ok();

    Outcome::Complete {
        response_status_code: Some(status.as_u16()),
        response_headers,
        response_body,
        mime_type,
        char_set,
    }
}

fn classify_reqwest_error(e: &reqwest::Error) -> TaskException {
    if e.is_timeout() || e.is_connect() {
        TaskException::Connection {
            description: e.to_string(),
        }
    } else if let Some(status) = e.status() {
        TaskException::HttpResponse {
            status_code: status.as_u16(),
            description: e.to_string(),
        }
    } else {
        TaskException::Connection {
            description: e.to_string(),
        }
    }
}

fn guess_mime(filename: &str) -> String {
    let ext = filename.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "txt" => "text/plain",
        "zip" => "application/zip",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
    .to_string()
}

fn rand_name() -> String {
    let bytes: [u8; 4] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[allow(dead_code)]
pub fn _assert_upload_file_used(_: &UploadFile) {}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_throttle_emits_on_delta_then_waits_for_interval() {
        let mut throttle = ProgressThrottle::new();
        let t0 = Instant::now();
        assert!(throttle.should_emit(0.05, t0));
        assert!(!throttle.should_emit(0.06, t0));
        assert!(throttle.should_emit(0.10, t0 + Duration::from_millis(600)));
    }

    #[test]
    fn progress_throttle_emits_on_stall_grace_even_with_small_delta() {
        let mut throttle = ProgressThrottle::new();
        let t0 = Instant::now();
        assert!(throttle.should_emit(0.05, t0));
        assert!(!throttle.should_emit(0.06, t0 + Duration::from_millis(600)));
        assert!(throttle.should_emit(0.06, t0 + Duration::from_secs(3)));
    }

    #[test]
    fn speed_ema_weighted_toward_history() {
        let ema = SpeedEma::new();
        ema.sample(1_000_000, Duration::from_secs(1));
        let first = ema.current();
        assert!(first > 0.0);
        ema.sample(0, Duration::from_secs(1));
        assert!(ema.current() < first);
    }

    #[test]
    fn time_remaining_sentinel_when_speed_unknown() {
        assert_eq!(time_remaining_ms(1000, 0.0), -1000);
        assert!(time_remaining_ms(1_000_000, 1.0) > 0);
    }

    #[test]
    fn resolve_filename_prefers_explicit_over_suggested() {
        let meta = sample_meta();
        let task = Task::Download(meta);
        assert_eq!(resolve_filename(&task, Some("attachment; filename=\"a.zip\"")), "file.zip");
    }

    #[test]
    fn resolve_filename_falls_back_to_url_tail_when_suggested_and_no_header() {
        let mut meta = sample_meta();
        meta.filename = crate::types::SUGGESTED_FILENAME.to_string();
        meta.url = "https://example.com/dir/report.pdf".to_string();
        let task = Task::Download(meta);
        assert_eq!(resolve_filename(&task, None), "report.pdf");
    }

    fn sample_meta() -> crate::types::TaskMeta {
        crate::types::TaskMeta {
            task_id: crate::types::TaskId("t1".to_string()),
            url: "https://example.com/file.zip".to_string(),
            url_query_parameters: Default::default(),
            headers: Default::default(),
            http_request_method: HttpMethod::Get,
            post: None,
            base_directory: crate::types::BaseDirectory::Temporary,
            directory: String::new(),
            filename: "file.zip".to_string(),
            group: "default".to_string(),
            updates: crate::types::Updates::StatusAndProgress,
            requires_wifi: false,
            retries: 0,
            retries_remaining: 0,
            allow_pause: true,
            priority: 5,
            meta_data: Default::default(),
            display_name: None,
            creation_time: 0,
            unique: false,
        }
    }
}
