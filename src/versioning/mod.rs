//! Version state machine
//!
//! Owns the draft/saved lifecycle: creating or replacing the draft,
//! promoting it to saved, discarding it, and resolving the effective view
//! for a consumer. Every content change triggers a chunk-index rebuild.
//! File cleanup here is best-effort by contract: a failed delete is logged
//! and never fails the primary operation.

use std::path::{Path, PathBuf};

use sqlx::SqlitePool;

use crate::config::StorageConfig;
use crate::db::{
    ChunkIndex, DocumentStatus, DocumentStore, Version, VersionKind, VersionStore, ViewKind,
};
use crate::error::Result;

/// Resolve the kind actually shown when a consumer asks for `requested`.
///
/// A draft is preferred while a job is in flight or a draft exists; then the
/// saved version; then the original. A request for an unavailable kind
/// degrades through the same order instead of erroring.
pub fn effective_kind(
    requested: Option<ViewKind>,
    status: DocumentStatus,
    has_draft: bool,
    has_saved: bool,
) -> ViewKind {
    let in_flight = matches!(status, DocumentStatus::Queued | DocumentStatus::Processing);

    match requested {
        None | Some(ViewKind::Draft) => {
            if in_flight || has_draft {
                ViewKind::Draft
            } else if has_saved {
                ViewKind::Saved
            } else {
                ViewKind::Original
            }
        }
        Some(ViewKind::Saved) => {
            if has_saved {
                ViewKind::Saved
            } else if in_flight || has_draft {
                ViewKind::Draft
            } else {
                ViewKind::Original
            }
        }
        Some(ViewKind::Original) => ViewKind::Original,
    }
}

/// Version lifecycle operations for one storage layout.
pub struct VersionLifecycle<'a> {
    pool: &'a SqlitePool,
    storage: &'a StorageConfig,
}

impl<'a> VersionLifecycle<'a> {
    pub fn new(pool: &'a SqlitePool, storage: &'a StorageConfig) -> Self {
        Self { pool, storage }
    }

    /// Deterministic artifact path for a generated PDF.
    pub fn generated_pdf_path(&self, doc_id: &str, kind: VersionKind) -> PathBuf {
        self.storage
            .generated_dir
            .join(format!("doc_{doc_id}_{}.pdf", kind.as_str()))
    }

    /// Create or fully replace the draft and rebuild its chunk index.
    pub async fn replace_draft(
        &self,
        doc_id: &str,
        tex_source: &str,
        pdf_path: &Path,
        plain_text: &str,
    ) -> Result<Version> {
        let version = VersionStore::new(self.pool)
            .upsert_draft(doc_id, tex_source, &pdf_path.display().to_string(), plain_text)
            .await?;

        ChunkIndex::new(self.pool)
            .rebuild(doc_id, ViewKind::Draft, plain_text)
            .await?;

        Ok(version)
    }

    /// Promote the draft to saved. A missing draft is a no-op.
    ///
    /// The prior saved row and its artifact are evicted first; the draft row
    /// is then relabeled in place, so its id and content survive. The
    /// artifact copy is best-effort: when it fails, the metadata relabel
    /// still proceeds and readers discover the missing file at view time.
    pub async fn promote(&self, doc_id: &str) -> Result<()> {
        let versions = VersionStore::new(self.pool);
        let draft = match versions.get(doc_id, VersionKind::Draft).await? {
            Some(draft) => draft,
            None => return Ok(()),
        };

        if let Some(old_saved) = versions.get(doc_id, VersionKind::Saved).await? {
            remove_file_best_effort(Path::new(&old_saved.pdf_path));
            versions.delete(doc_id, VersionKind::Saved).await?;
        }

        let saved_pdf = self.generated_pdf_path(doc_id, VersionKind::Saved);
        if Path::new(&draft.pdf_path).exists() {
            let copy = std::fs::create_dir_all(&self.storage.generated_dir)
                .and_then(|_| std::fs::copy(&draft.pdf_path, &saved_pdf));
            if let Err(e) = copy {
                tracing::warn!(doc_id = %doc_id, error = %e, "Saved artifact copy failed");
            }
        }

        versions
            .relabel_draft_to_saved(doc_id, &saved_pdf.display().to_string())
            .await?;

        remove_file_best_effort(&self.generated_pdf_path(doc_id, VersionKind::Draft));

        ChunkIndex::new(self.pool)
            .rebuild(doc_id, ViewKind::Saved, &draft.plain_text)
            .await?;
        ChunkIndex::new(self.pool).clear(doc_id, ViewKind::Draft).await?;

        DocumentStore::new(self.pool).mark_ready(doc_id).await?;

        Ok(())
    }

    /// Drop the draft row, its artifact, and its index entries.
    /// Discarding with no draft present is a no-op.
    pub async fn discard_draft(&self, doc_id: &str) -> Result<()> {
        let versions = VersionStore::new(self.pool);
        if let Some(draft) = versions.get(doc_id, VersionKind::Draft).await? {
            remove_file_best_effort(Path::new(&draft.pdf_path));
            versions.delete(doc_id, VersionKind::Draft).await?;
        }

        remove_file_best_effort(&self.generated_pdf_path(doc_id, VersionKind::Draft));
        ChunkIndex::new(self.pool).clear(doc_id, ViewKind::Draft).await?;

        Ok(())
    }

    /// Dismiss a sticky error: clear it and recompute a best-effort status
    /// from artifact existence.
    pub async fn clear_error(&self, doc_id: &str) -> Result<()> {
        let docs = DocumentStore::new(self.pool);
        let doc = match docs.get(doc_id).await? {
            Some(doc) => doc,
            None => return Ok(()),
        };

        let versions = VersionStore::new(self.pool);
        let mut viewable = Path::new(&doc.original_path).exists();
        for kind in [VersionKind::Draft, VersionKind::Saved] {
            if let Some(version) = versions.get(doc_id, kind).await? {
                if Path::new(&version.pdf_path).exists() {
                    viewable = true;
                }
            }
        }

        let status = if viewable {
            DocumentStatus::Ready
        } else {
            DocumentStatus::Queued
        };
        docs.clear_error(doc_id, status).await
    }

    /// Owner-initiated removal: the row cascade drops versions and shares;
    /// artifacts and index entries are cleaned up best-effort.
    pub async fn delete_document(&self, doc_id: &str) -> Result<bool> {
        let docs = DocumentStore::new(self.pool);
        let doc = match docs.get(doc_id).await? {
            Some(doc) => doc,
            None => return Ok(false),
        };

        let deleted = docs.delete(doc_id).await?;

        remove_file_best_effort(Path::new(&doc.original_path));
        for kind in [VersionKind::Draft, VersionKind::Saved] {
            remove_file_best_effort(&self.generated_pdf_path(doc_id, kind));
        }
        for kind in [ViewKind::Original, ViewKind::Draft, ViewKind::Saved] {
            ChunkIndex::new(self.pool).clear(doc_id, kind).await?;
        }

        Ok(deleted)
    }

    /// Store-backed view resolution for a document.
    pub async fn resolve_view(
        &self,
        doc_id: &str,
        requested: Option<ViewKind>,
    ) -> Result<Option<ViewKind>> {
        let doc = match DocumentStore::new(self.pool).get(doc_id).await? {
            Some(doc) => doc,
            None => return Ok(None),
        };

        let versions = VersionStore::new(self.pool);
        let has_draft = versions.exists(doc_id, VersionKind::Draft).await?;
        let has_saved = versions.exists(doc_id, VersionKind::Saved).await?;

        Ok(Some(effective_kind(requested, doc.status, has_draft, has_saved)))
    }
}

/// Cleanup never fails the primary operation; failures go to the log.
fn remove_file_best_effort(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Cleanup failed");
        }
    }
}
