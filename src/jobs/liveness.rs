//! Editor liveness tracking
//!
//! A document's editing session counts as live while the editor is open and
//! its heartbeat is younger than the staleness threshold. The pipeline
//! consults this before persisting a finished draft; the reaper closes
//! sessions that went quiet and discards their drafts.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::config::StorageConfig;
use crate::db::{Document, DocumentStore};
use crate::error::Result;
use crate::versioning::VersionLifecycle;

/// Heartbeats at least this old mark the session stale.
/// Age strictly below the threshold is active; exactly 120 s is not.
pub const EDITOR_STALE_SECONDS: i64 = 120;

/// Whether the document's editing session is still live.
pub fn editor_active(doc: &Document) -> bool {
    if !doc.editor_open {
        return false;
    }
    let heartbeat = match doc.editor_heartbeat() {
        Some(heartbeat) => heartbeat,
        None => return false,
    };

    (Utc::now() - heartbeat).num_seconds() < EDITOR_STALE_SECONDS
}

/// Close editors whose heartbeat went stale and discard their drafts.
/// Invoked opportunistically from the worker's idle loop. Returns how many
/// sessions were reaped.
pub async fn reap_stale_editors(pool: &SqlitePool, storage: &StorageConfig) -> Result<usize> {
    let docs = DocumentStore::new(pool);
    let lifecycle = VersionLifecycle::new(pool, storage);

    let mut reaped = 0;
    for doc in docs.list_open_editors().await? {
        if doc.editor_heartbeat().is_none() {
            continue;
        }
        if editor_active(&doc) {
            continue;
        }

        tracing::info!(doc_id = %doc.id, "Reaping stale editor session");
        docs.close_editor(&doc.id).await?;
        lifecycle.discard_draft(&doc.id).await?;
        reaped += 1;
    }

    Ok(reaped)
}
