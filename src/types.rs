//! Core types for the transfer engine
//!
//! Defines the immutable [`Task`] description, the wire-facing [`Update`]
//! stream, persisted [`TaskRecord`]/[`ResumeData`], and the small sentinel
//! values ([`Status`], progress sentinels) that let every consumer of the
//! engine treat progress as a single stream of floats.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use utoipa::ToSchema;

/// Unique identifier for a task.
///
/// Generated client-side (UUID v4 string) when a caller does not supply one,
/// so identifiers remain stable across process restarts without a database
/// round trip.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Self(format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        ))
    }

    /// Sanitize a caller-supplied id to the character set safe for use as a
    /// filename component and a database key.
    pub fn sanitize(raw: &str) -> String {
        raw.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl TaskId {
    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl sqlx::Type<sqlx::Sqlite> for TaskId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <String as sqlx::Encode<'q, sqlx::Sqlite>>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskId {
    fn decode(
        value: sqlx::sqlite::SqliteValueRef<'r>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let s = <String as sqlx::Decode<'r, sqlx::Sqlite>>::decode(value)?;
        Ok(TaskId(s))
    }
}

/// Base directory an implementation-defined root the engine resolves before
/// joining `directory`/`filename`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BaseDirectory {
    /// Application documents directory.
    ApplicationDocuments,
    /// System temporary directory.
    Temporary,
    /// Application support directory.
    ApplicationSupport,
    /// Application library directory.
    ApplicationLibrary,
    /// Filesystem root; `directory` is treated as an absolute path.
    Root,
}

/// Filename sentinel meaning "derive from the server response".
pub const SUGGESTED_FILENAME: &str = "?";

/// How update notifications should be delivered for a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Updates {
    /// No update delivery at all.
    None,
    /// Status updates only.
    Status,
    /// Progress updates only.
    Progress,
    /// Both status and progress updates.
    StatusAndProgress,
}

impl Updates {
    /// Whether status updates should be emitted.
    pub fn wants_status(self) -> bool {
        matches!(self, Updates::Status | Updates::StatusAndProgress)
    }

    /// Whether progress updates should be emitted.
    pub fn wants_progress(self) -> bool {
        matches!(self, Updates::Progress | Updates::StatusAndProgress)
    }
}

/// HTTP method used to perform the transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PATCH
    Patch,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// HEAD
    Head,
}

impl HttpMethod {
    /// Convert to the `reqwest::Method` equivalent.
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }
}

/// Common fields shared by every task subtype.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TaskMeta {
    /// Unique task identifier.
    pub task_id: TaskId,
    /// Fully-encoded URL.
    pub url: String,
    /// Extra query parameters appended to `url`.
    #[serde(default)]
    pub url_query_parameters: HashMap<String, String>,
    /// Request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// HTTP method.
    #[serde(default = "default_method")]
    pub http_request_method: HttpMethod,
    /// Optional request body (POST payload for downloads).
    #[serde(default)]
    pub post: Option<Vec<u8>>,
    /// Base directory the destination is resolved against.
    #[serde(default = "default_base_directory")]
    pub base_directory: BaseDirectory,
    /// Directory relative to `base_directory`.
    #[serde(default)]
    pub directory: String,
    /// Destination filename, or [`SUGGESTED_FILENAME`].
    #[serde(default = "default_filename")]
    pub filename: String,
    /// Routing/query group; `"chunk"` is reserved for parallel-download children.
    #[serde(default = "default_group")]
    pub group: String,
    /// Which updates the caller wants delivered.
    #[serde(default = "default_updates")]
    pub updates: Updates,
    /// Require a non-metered network connection before admission.
    #[serde(default)]
    pub requires_wifi: bool,
    /// Number of retries remaining; equals `retries` at creation.
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub(crate) retries_remaining: u32,
    /// Whether the task supports pause/resume.
    #[serde(default)]
    pub allow_pause: bool,
    /// Scheduling priority; 0 is highest.
    #[serde(default)]
    pub priority: u8,
    /// Opaque caller metadata round-tripped on every update.
    #[serde(default)]
    pub meta_data: HashMap<String, String>,
    /// Caller-supplied display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Creation time, Unix epoch milliseconds.
    #[serde(default = "now_millis")]
    pub creation_time: i64,
    /// When true and the resolved destination path already exists, the
    /// executor inserts ` (n)` before the extension rather than overwriting
    /// (see `unique_destination_path` in [`crate::utils`]).
    #[serde(default)]
    pub unique: bool,
}

fn default_method() -> HttpMethod {
    HttpMethod::Get
}
fn default_base_directory() -> BaseDirectory {
    BaseDirectory::ApplicationDocuments
}
fn default_filename() -> String {
    SUGGESTED_FILENAME.to_string()
}
fn default_group() -> String {
    "default".to_string()
}
fn default_updates() -> Updates {
    Updates::StatusAndProgress
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Reserved group name for parallel-download child tasks.
pub const CHUNK_GROUP: &str = "chunk";

/// Multipart field value for an upload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UploadFile {
    /// Multipart field name.
    pub field: String,
    /// Path to the local file to upload.
    pub file_path: PathBuf,
    /// Filename reported in the multipart part.
    pub filename: String,
    /// MIME type; detected from the extension when absent.
    pub mime_type: Option<String>,
}

/// A single transfer task. Immutable once created; every operation below
/// consumes and returns owned values rather than mutating in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "taskType")]
pub enum Task {
    /// Single-URL download.
    Download(TaskMeta),
    /// Single-file upload (multipart or binary).
    Upload {
        /// Shared fields.
        #[serde(flatten)]
        meta: TaskMeta,
        /// Multipart field holding the file, when not a binary upload.
        file_field: Option<String>,
        /// Additional multipart form fields.
        #[serde(default)]
        fields: HashMap<String, String>,
        /// Local file path to upload.
        file_path: PathBuf,
        /// MIME type override.
        mime_type: Option<String>,
        /// Upload the raw file bytes as the request body instead of multipart.
        #[serde(default)]
        binary: bool,
    },
    /// Multiple files uploaded together in one multipart request.
    MultiUpload {
        /// Shared fields.
        #[serde(flatten)]
        meta: TaskMeta,
        /// One entry per file part.
        files: Vec<UploadFile>,
    },
    /// A download split into byte-range chunks fetched in parallel.
    ParallelDownload {
        /// Shared fields.
        #[serde(flatten)]
        meta: TaskMeta,
        /// Source URLs; chunks are assigned round-robin across them.
        urls: Vec<String>,
        /// Number of chunks requested per URL.
        chunks: u32,
    },
}

impl Task {
    /// Borrow the shared [`TaskMeta`] regardless of subtype.
    pub fn meta(&self) -> &TaskMeta {
        match self {
            Task::Download(m) => m,
            Task::Upload { meta, .. } => meta,
            Task::MultiUpload { meta, .. } => meta,
            Task::ParallelDownload { meta, .. } => meta,
        }
    }

    /// Mutably borrow the shared [`TaskMeta`] regardless of subtype.
    pub fn meta_mut(&mut self) -> &mut TaskMeta {
        match self {
            Task::Download(m) => m,
            Task::Upload { meta, .. } => meta,
            Task::MultiUpload { meta, .. } => meta,
            Task::ParallelDownload { meta, .. } => meta,
        }
    }

    /// Convenience accessor for the task id.
    pub fn id(&self) -> &TaskId {
        &self.meta().task_id
    }

    /// Convenience accessor for the group.
    pub fn group(&self) -> &str {
        &self.meta().group
    }

    /// Whether this is a reserved parallel-download chunk task.
    pub fn is_chunk(&self) -> bool {
        self.group() == CHUNK_GROUP
    }

    /// Resolve the fully qualified request URL, appending query parameters.
    pub fn request_url(&self) -> String {
        let meta = self.meta();
        if meta.url_query_parameters.is_empty() {
            return meta.url.clone();
        }
        let sep = if meta.url.contains('?') { '&' } else { '?' };
        let query: Vec<String> = meta
            .url_query_parameters
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        format!("{}{}{}", meta.url, sep, query.join("&"))
    }

    /// Ensure invariants that the codec cannot express in the type alone.
    pub fn validate(&self) -> Result<(), String> {
        let meta = self.meta();
        if meta.filename != SUGGESTED_FILENAME
            && (meta.filename.contains('/') || meta.filename.contains('\\'))
        {
            return Err("filename must not contain path separators".into());
        }
        if meta.base_directory != BaseDirectory::Root
            && (meta.directory.starts_with('/') || meta.directory.starts_with('\\'))
        {
            return Err("directory must not be absolute unless base_directory is root".into());
        }
        if meta.post.is_some() && meta.allow_pause {
            return Err("tasks with a request body cannot allow pause".into());
        }
        if let Task::Upload { fields, binary, .. } = self
            && *binary
            && !fields.is_empty()
        {
            return Err("binary uploads cannot carry multipart fields".into());
        }
        if meta.priority > 10 {
            return Err("priority must be in 0..=10".into());
        }
        Ok(())
    }
}

/// Terminal and non-terminal task statuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Admitted and durable, not yet running.
    Enqueued,
    /// Actively transferring.
    Running,
    /// Finished successfully.
    Complete,
    /// Server responded 404.
    NotFound,
    /// Terminal failure after retries exhausted.
    Failed,
    /// Canceled by command.
    Canceled,
    /// Paused by command; resumable via [`ResumeData`].
    Paused,
    /// Failed but waiting for the retry controller's backoff to elapse.
    WaitingToRetry,
}

impl Status {
    /// Whether this status is terminal (no further updates will follow).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Complete | Status::NotFound | Status::Failed | Status::Canceled
        )
    }

    /// The progress sentinel value associated with this status, if any.
    /// Returns `None` for `Enqueued`/`Running`, which carry a real fraction.
    pub fn progress_sentinel(self) -> Option<f64> {
        match self {
            Status::Failed => Some(-1.0),
            Status::Canceled => Some(-2.0),
            Status::NotFound => Some(-3.0),
            Status::WaitingToRetry => Some(-4.0),
            Status::Paused => Some(-5.0),
            Status::Complete => Some(1.0),
            Status::Enqueued | Status::Running => None,
        }
    }
}

/// Machine-readable failure reason attached to a terminal `failed` update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskException {
    /// Uncategorized failure.
    #[error("{description}")]
    General {
        /// Human-readable description.
        description: String,
    },
    /// Malformed URL or unsupported scheme.
    #[error("invalid url: {description}")]
    Url {
        /// Human-readable description.
        description: String,
    },
    /// Non-2xx, non-404 HTTP response.
    #[error("http response {status_code}")]
    HttpResponse {
        /// The response status code.
        status_code: u16,
        /// Optional response body, truncated, for diagnostics.
        description: String,
    },
    /// DNS, socket, or TLS failure.
    #[error("connection error: {description}")]
    Connection {
        /// Human-readable description.
        description: String,
    },
    /// Local filesystem failure (open/write/rename/delete).
    #[error("file system error: {description}")]
    FileSystem {
        /// Human-readable description.
        description: String,
    },
    /// Resume preconditions were not satisfied (ETag mismatch, range not
    /// satisfiable, or a missing/truncated temp file).
    #[error("resume failed: {description}")]
    Resume {
        /// Human-readable description.
        description: String,
    },
}

impl crate::retry::IsRetryable for TaskException {
    fn is_retryable(&self) -> bool {
        match self {
            TaskException::Connection { .. } => true,
            TaskException::HttpResponse { status_code, .. } => {
                *status_code == 408 || *status_code == 429 || *status_code >= 500
            }
            TaskException::Resume { .. } => true,
            TaskException::FileSystem { .. }
            | TaskException::Url { .. }
            | TaskException::General { .. } => false,
        }
    }
}

/// A throttled status update delivered over the observation pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusUpdate {
    /// The task this update concerns.
    pub task_id: TaskId,
    /// Routing group, echoed for listener filtering.
    pub group: String,
    /// New status.
    pub status: Status,
    /// Failure detail, present only when `status == Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<TaskException>,
    /// Response body, present on terminal updates when small enough to retain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    /// Parsed MIME type from `Content-Type`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Parsed charset from `Content-Type`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_set: Option<String>,
    /// Raw HTTP response status code, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status_code: Option<u16>,
    /// Response headers, present on terminal updates.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub response_headers: HashMap<String, String>,
}

/// A throttled progress update delivered over the observation pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressUpdate {
    /// The task this update concerns.
    pub task_id: TaskId,
    /// Routing group, echoed for listener filtering.
    pub group: String,
    /// Progress in `[0, 1]`, or a status sentinel (see [`Status::progress_sentinel`]).
    pub progress: f64,
    /// Total bytes expected, if known.
    pub expected_file_size: Option<u64>,
    /// EMA network speed in megabytes per second.
    pub network_speed_mbps: f64,
    /// Estimated time remaining in milliseconds, or `-1000` if unknown.
    pub time_remaining_ms: i64,
}

/// One item on the observation broadcast channel.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Update {
    /// A status transition.
    Status(StatusUpdate),
    /// A progress tick.
    Progress(ProgressUpdate),
}

impl Update {
    /// The task id this update concerns, regardless of variant.
    pub fn task_id(&self) -> &TaskId {
        match self {
            Update::Status(s) => &s.task_id,
            Update::Progress(p) => &p.task_id,
        }
    }

    /// The group this update concerns, regardless of variant.
    pub fn group(&self) -> &str {
        match self {
            Update::Status(s) => &s.group,
            Update::Progress(p) => &p.group,
        }
    }

    /// Which undelivered-buffer bucket this update belongs to.
    pub fn kind(&self) -> UpdateKind {
        match self {
            Update::Status(_) => UpdateKind::Status,
            Update::Progress(_) => UpdateKind::Progress,
        }
    }
}

/// Discriminates the two undelivered-update buffers named in §4.2/§6: status
/// updates and progress updates are drained independently so a listener that
/// only wants one kind is not forced to replay the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateKind {
    /// Buffer of [`Update::Status`] entries.
    Status,
    /// Buffer of [`Update::Progress`] entries.
    Progress,
}

/// Durable snapshot of a task's latest known state.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskRecord {
    /// The immutable task description.
    pub task: Task,
    /// Latest known status.
    pub status: Status,
    /// Latest known progress (real fraction or sentinel).
    pub progress: f64,
    /// Expected total size in bytes, once known.
    pub expected_file_size: Option<u64>,
    /// Failure detail, present only when `status == Failed`.
    pub exception: Option<TaskException>,
}

/// State sufficient to continue a paused or recoverably-failed transfer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResumeData {
    /// The task being resumed.
    pub task_id: TaskId,
    /// Path to the partial temp file (downloads), or a serialized chunk
    /// plan (parallel downloads).
    pub data: String,
    /// Byte offset the resumed transfer must continue from.
    pub required_start_byte: u64,
    /// ETag captured at pause time, validated against the resume response.
    pub e_tag: Option<String>,
}

/// One byte-range slice of a parallel download, realized as a child
/// [`Task::Download`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Chunk {
    /// The parent parallel-download task id.
    pub parent_task_id: TaskId,
    /// Source URL for this chunk.
    pub url: String,
    /// Randomly-named temp file this chunk streams into.
    pub filename: String,
    /// First byte of the range, inclusive.
    pub from: u64,
    /// Last byte of the range, inclusive.
    pub to: u64,
    /// The child task id carrying out this chunk's transfer.
    pub child_task_id: TaskId,
}
