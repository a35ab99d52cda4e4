//! Database layer for transferd
//!
//! Handles SQLite persistence for the durable task state store.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`tasks`] — Task record CRUD (the durable queue/history table)
//! - [`resume`] — Resume data CRUD (pause/resume byte ranges and ETags)
//! - [`undelivered`] — Buffered updates for clients that were not subscribed
//!   when an update was emitted
//! - [`state`] — Runtime state (clean-shutdown tracking)

use crate::types::{Status, Task, TaskException};
use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod resume;
mod state;
mod tasks;
mod undelivered;

/// Raw task record row as stored in `task_records`.
///
/// `task_json`/`exception_json` are stored as JSON text rather than normalized
/// columns, mirroring how `Task`'s own variants (Download/Upload/MultiUpload/
/// ParallelDownload) already carry their shape in one serde-tagged enum —
/// normalizing it into columns would just reimplement that tagging in SQL.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub task_id: String,
    pub group_name: String,
    pub task_json: String,
    pub status: String,
    pub progress: Option<f64>,
    pub expected_file_size: Option<i64>,
    pub exception_json: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TaskRow {
    pub fn into_record(self) -> crate::Result<crate::types::TaskRecord> {
        let task: Task = serde_json::from_str(&self.task_json)?;
        let status = status_from_db(&self.status).ok_or_else(|| {
            crate::Error::Database(crate::error::DatabaseError::QueryFailed(format!(
                "unknown status column value: {}",
                self.status
            )))
        })?;
        let exception = self
            .exception_json
            .as_deref()
            .map(serde_json::from_str::<TaskException>)
            .transpose()?;

        Ok(crate::types::TaskRecord {
            task,
            status,
            progress: self.progress,
            expected_file_size: self.expected_file_size.map(|v| v as u64),
            exception,
        })
    }
}

/// Encodes a [`Status`] as the snake_case text stored in the `status` column,
/// matching `Status`'s own `#[serde(rename_all = "snake_case")]` spelling so a
/// row can be inspected with a plain SQLite client.
pub fn status_to_db(status: Status) -> &'static str {
    match status {
        Status::Enqueued => "enqueued",
        Status::Running => "running",
        Status::Complete => "complete",
        Status::NotFound => "not_found",
        Status::Failed => "failed",
        Status::Canceled => "canceled",
        Status::Paused => "paused",
        Status::WaitingToRetry => "waiting_to_retry",
    }
}

pub fn status_from_db(value: &str) -> Option<Status> {
    Some(match value {
        "enqueued" => Status::Enqueued,
        "running" => Status::Running,
        "complete" => Status::Complete,
        "not_found" => Status::NotFound,
        "failed" => Status::Failed,
        "canceled" => Status::Canceled,
        "paused" => Status::Paused,
        "waiting_to_retry" => Status::WaitingToRetry,
        _ => return None,
    })
}

/// Resume data row as stored in `resume_data`.
#[derive(Debug, Clone, FromRow)]
pub struct ResumeDataRow {
    pub task_id: String,
    pub data: String,
    pub required_start_byte: i64,
    pub e_tag: Option<String>,
}

/// An update that was emitted while no subscriber was listening, held for
/// later delivery through `drain_undelivered`.
#[derive(Debug, Clone, FromRow)]
pub struct UndeliveredRow {
    pub id: i64,
    pub task_id: String,
    pub update_json: String,
    pub created_at: i64,
}

/// Database handle for transferd's durable task state store.
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
