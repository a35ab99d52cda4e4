//! Observation pipeline: status/progress throttling and buffered delivery
//! across app suspension (§4.8).
//!
//! Grounded on the teacher's `tokio::sync::broadcast::channel(1000)` plus
//! `subscribe()` in `downloader/mod.rs` for the global channel. Per-group
//! listeners are modeled as a `HashMap<String, broadcast::Sender<Update>>`
//! guarded the same way `runtime_config.categories` is guarded
//! (`Arc<RwLock<HashMap<...>>>`). `"chunk"`-group updates are never
//! broadcast globally; the parallel supervisor subscribes to that group's
//! channel directly instead.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};

use crate::db::Database;
use crate::types::{CHUNK_GROUP, Update};
use crate::{Error, Result};

const GLOBAL_CHANNEL_CAPACITY: usize = 1000;
const GROUP_CHANNEL_CAPACITY: usize = 256;

/// Broadcasts [`Update`]s to a global subscriber and any per-group
/// subscribers, falling back to the durable undelivered buffer when nobody
/// is listening for a non-chunk update.
pub struct ObservationPipeline {
    db: Arc<Database>,
    global_tx: broadcast::Sender<Update>,
    group_tx: RwLock<HashMap<String, broadcast::Sender<Update>>>,
}

impl ObservationPipeline {
    pub fn new(db: Arc<Database>) -> Self {
        let (global_tx, _rx) = broadcast::channel(GLOBAL_CHANNEL_CAPACITY);
        Self {
            db,
            global_tx,
            group_tx: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to every update regardless of group (except `"chunk"`,
    /// which is never published on the global channel).
    pub fn subscribe_global(&self) -> broadcast::Receiver<Update> {
        self.global_tx.subscribe()
    }

    /// Subscribe to updates for one group only, including `"chunk"` (used by
    /// the parallel-download supervisor to observe its own children).
    pub async fn subscribe_group(&self, group: &str) -> broadcast::Receiver<Update> {
        let mut guard = self.group_tx.write().await;
        let tx = guard
            .entry(group.to_string())
            .or_insert_with(|| broadcast::channel(GROUP_CHANNEL_CAPACITY).0);
        tx.subscribe()
    }

    /// Publish an update. Chunk-group updates are routed only to their
    /// group's listeners, never to the global broadcast (§4.3 "reserved
    /// behavior for group chunk").
    pub async fn publish(&self, update: Update) -> Result<()> {
        let group = update.group().to_string();
        let is_chunk = group == CHUNK_GROUP;

        let group_delivered = {
            let guard = self.group_tx.read().await;
            match guard.get(&group) {
                Some(tx) => tx.send(update.clone()).is_ok(),
                None => false,
            }
        };

        if is_chunk {
            return Ok(());
        }

        let global_delivered = self.global_tx.send(update.clone()).is_ok();

        if !group_delivered && !global_delivered {
            self.db.push_undelivered(&update).await?;
        }

        Ok(())
    }

    /// Drain and redeliver buffered updates of both kinds. Called during
    /// `start()` per §4.8 step 2.
    pub async fn redeliver_undelivered(&self) -> Result<usize> {
        let mut delivered = 0;
        for kind in [crate::types::UpdateKind::Status, crate::types::UpdateKind::Progress] {
            let buffered = self.db.pop_undelivered(kind).await?;
            for update in buffered {
                self.publish(update).await.map_err(|e| {
                    Error::Other(format!("failed to redeliver buffered update: {e}"))
                })?;
                delivered += 1;
            }
        }
        Ok(delivered)
    }
}
