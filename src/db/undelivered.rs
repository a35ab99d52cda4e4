//! Buffered updates for clients that were not subscribed when an update was
//! emitted by the observation pipeline. Drained at `start()` per §4.8/§4.2 of
//! the engine design: a task's group with no registered listener and no
//! global subscriber falls back to this durable buffer instead of dropping
//! the update.

use crate::error::DatabaseError;
use crate::types::{Update, UpdateKind};
use crate::{Error, Result};

use super::{Database, UndeliveredRow};

impl Database {
    /// Buffer an update that failed delivery.
    pub async fn push_undelivered(&self, update: &Update) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let update_json = serde_json::to_string(update)?;
        sqlx::query(
            "INSERT INTO undelivered_updates (task_id, update_json, created_at) VALUES (?, ?, ?)",
        )
        .bind(update.task_id().as_str())
        .bind(&update_json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to buffer undelivered update: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Pop and clear every buffered update of the given kind (status or
    /// progress), oldest first so redelivery preserves emission order.
    pub async fn pop_undelivered(&self, kind: UpdateKind) -> Result<Vec<Update>> {
        let rows = sqlx::query_as::<_, UndeliveredRow>(
            "SELECT id, task_id, update_json, created_at FROM undelivered_updates ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list undelivered updates: {}",
                e
            )))
        })?;

        let mut matched_ids = Vec::new();
        let mut updates = Vec::new();
        for row in rows {
            let update: Update = serde_json::from_str(&row.update_json)?;
            if update.kind() == kind {
                matched_ids.push(row.id);
                updates.push(update);
            }
        }

        if !matched_ids.is_empty() {
            let placeholders = matched_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let query = format!("DELETE FROM undelivered_updates WHERE id IN ({placeholders})");
            let mut q = sqlx::query(&query);
            for id in &matched_ids {
                q = q.bind(id);
            }
            q.execute(&self.pool).await.map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear undelivered updates: {}",
                    e
                )))
            })?;
        }

        Ok(updates)
    }
}
