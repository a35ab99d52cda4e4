//! Resume data CRUD: pause/resume byte ranges and ETags.
//!
//! `resume_data` rows are exclusively owned by the state store (see
//! `ResumeData` in [`crate::types`]); no other writer touches this table.
//! A row is created when the executor transitions a task to `paused` or to a
//! recoverable failure, and destroyed on successful resume, cancel, or a
//! fresh restart.

use crate::error::DatabaseError;
use crate::types::{ResumeData, TaskId};
use crate::{Error, Result};

use super::{Database, ResumeDataRow};

impl ResumeDataRow {
    fn into_resume_data(self) -> Result<ResumeData> {
        Ok(ResumeData {
            task_id: TaskId(self.task_id),
            data: self.data,
            required_start_byte: self.required_start_byte as u64,
            e_tag: self.e_tag,
        })
    }
}

impl Database {
    /// Insert or overwrite the resume data for a task.
    pub async fn put_resume_data(&self, resume: &ResumeData) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO resume_data (task_id, data, required_start_byte, e_tag)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(task_id) DO UPDATE SET
                data = excluded.data,
                required_start_byte = excluded.required_start_byte,
                e_tag = excluded.e_tag
            "#,
        )
        .bind(resume.task_id.as_str())
        .bind(&resume.data)
        .bind(resume.required_start_byte as i64)
        .bind(&resume.e_tag)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to put resume data: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Fetch the resume data for a task, if any.
    pub async fn get_resume_data(&self, task_id: &TaskId) -> Result<Option<ResumeData>> {
        let row = sqlx::query_as::<_, ResumeDataRow>(
            "SELECT task_id, data, required_start_byte, e_tag FROM resume_data WHERE task_id = ?",
        )
        .bind(task_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get resume data: {}",
                e
            )))
        })?;

        row.map(ResumeDataRow::into_resume_data).transpose()
    }

    /// Delete the resume data for a task. Called on successful resume,
    /// cancel, or when a fresh start supersedes a paused/failed attempt.
    pub async fn delete_resume_data(&self, task_id: &TaskId) -> Result<()> {
        sqlx::query("DELETE FROM resume_data WHERE task_id = ?")
            .bind(task_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete resume data: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
