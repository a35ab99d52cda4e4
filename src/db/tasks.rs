//! Task record CRUD operations: the durable queue/history table.

use crate::error::DatabaseError;
use crate::types::{Status, Task, TaskException, TaskId, TaskRecord};
use crate::{Error, Result};

use super::{Database, TaskRow, status_from_db, status_to_db};

impl Database {
    /// Insert a new task record in `Enqueued` status.
    pub async fn insert_task(&self, task: &Task) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let task_json = serde_json::to_string(task)?;

        sqlx::query(
            r#"
            INSERT INTO task_records (
                task_id, group_name, task_json, status, progress,
                expected_file_size, exception_json, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id().as_str())
        .bind(task.group())
        .bind(&task_json)
        .bind(status_to_db(Status::Enqueued))
        .bind(None::<f64>)
        .bind(None::<i64>)
        .bind(None::<String>)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert task: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Fetch a task record by ID.
    pub async fn get_task(&self, task_id: &TaskId) -> Result<Option<TaskRecord>> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT task_id, group_name, task_json, status, progress,
                   expected_file_size, exception_json, created_at, updated_at
            FROM task_records
            WHERE task_id = ?
            "#,
        )
        .bind(task_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get task: {}",
                e
            )))
        })?;

        row.map(TaskRow::into_record).transpose()
    }

    /// List all task records, most recently created first.
    pub async fn list_tasks(&self) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT task_id, group_name, task_json, status, progress,
                   expected_file_size, exception_json, created_at, updated_at
            FROM task_records
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list tasks: {}",
                e
            )))
        })?;

        rows.into_iter().map(TaskRow::into_record).collect()
    }

    /// List task records belonging to a group, most recently created first.
    pub async fn list_tasks_by_group(&self, group: &str) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT task_id, group_name, task_json, status, progress,
                   expected_file_size, exception_json, created_at, updated_at
            FROM task_records
            WHERE group_name = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(group)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list tasks by group: {}",
                e
            )))
        })?;

        rows.into_iter().map(TaskRow::into_record).collect()
    }

    /// List task records not yet in a terminal status, ordered for re-enqueue
    /// (priority via the stored task JSON is applied by the caller; this only
    /// orders by creation time, matching the holding queue's tie-break).
    pub async fn list_active_tasks(&self) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT task_id, group_name, task_json, status, progress,
                   expected_file_size, exception_json, created_at, updated_at
            FROM task_records
            WHERE status IN ('enqueued', 'running', 'paused', 'waiting_to_retry')
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list active tasks: {}",
                e
            )))
        })?;

        rows.into_iter().map(TaskRow::into_record).collect()
    }

    /// Update a task's status, clearing progress/exception fields that no
    /// longer apply (callers pass the values that do apply explicitly via
    /// [`Self::update_progress`] / [`Self::set_exception`]).
    pub async fn update_status(&self, task_id: &TaskId, status: Status) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE task_records SET status = ?, updated_at = ? WHERE task_id = ?")
            .bind(status_to_db(status))
            .bind(now)
            .bind(task_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update status: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Update a task's progress fraction and expected file size.
    pub async fn update_progress(
        &self,
        task_id: &TaskId,
        progress: f64,
        expected_file_size: Option<u64>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "UPDATE task_records SET progress = ?, expected_file_size = ?, updated_at = ? WHERE task_id = ?",
        )
        .bind(progress)
        .bind(expected_file_size.map(|v| v as i64))
        .bind(now)
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update progress: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Attach a failure exception to a task (alongside a `failed` status update).
    pub async fn set_exception(&self, task_id: &TaskId, exception: &TaskException) -> Result<()> {
        let exception_json = serde_json::to_string(exception)?;
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE task_records SET exception_json = ?, updated_at = ? WHERE task_id = ?")
            .bind(&exception_json)
            .bind(now)
            .bind(task_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set exception: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Overwrite a task's stored definition, used by `setPriority`/`updateTask`
    /// style mutations that change `TaskMeta` fields in place.
    pub async fn replace_task(&self, task: &Task) -> Result<()> {
        let task_json = serde_json::to_string(task)?;
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE task_records SET task_json = ?, updated_at = ? WHERE task_id = ?")
            .bind(&task_json)
            .bind(now)
            .bind(task.id().as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to replace task: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Delete a single task record.
    pub async fn delete_task(&self, task_id: &TaskId) -> Result<()> {
        sqlx::query("DELETE FROM task_records WHERE task_id = ?")
            .bind(task_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete task: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Select the ids a cleanup pass would remove (excess beyond
    /// `max_record_count`, oldest first, plus anything older than
    /// `max_age_secs`), without deleting them. Used by the cleanup
    /// controller to pace deletions rather than removing everything in one
    /// statement.
    pub async fn ids_to_cleanup(&self, max_record_count: i64, max_age_secs: i64) -> Result<Vec<TaskId>> {
        let cutoff = chrono::Utc::now().timestamp() - max_age_secs;

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT task_id FROM task_records
            WHERE task_id IN (
                SELECT task_id FROM task_records
                ORDER BY created_at DESC
                LIMIT -1 OFFSET ?
            )
            OR created_at < ?
            "#,
        )
        .bind(max_record_count)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list cleanup candidates: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(|(id,)| TaskId(id)).collect())
    }

    /// Count task records, used to drive the auto-clean interval trigger.
    pub async fn count_tasks(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM task_records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count tasks: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}

#[allow(dead_code)]
fn _assert_status_round_trips(status: Status) -> bool {
    status_from_db(status_to_db(status)) == Some(status)
}
