//! Document database operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Pipeline status of a document. Reflects the last attempted job,
/// independent of which version it touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DocumentStatus {
    Queued,
    Processing,
    Ready,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

/// Document record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub filename: String,
    pub size: i64,
    pub original_path: String,
    pub extracted_text: Option<String>,
    pub status: DocumentStatus,
    pub last_error: Option<String>,
    pub editor_open: bool,
    pub editor_heartbeat_at: Option<String>,
    pub active_job_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Document {
    /// Parsed editor heartbeat, if one is recorded.
    pub fn editor_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.editor_heartbeat_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }
}

const DOCUMENT_COLUMNS: &str = "id, owner_id, filename, size, original_path, extracted_text, \
     status, last_error, editor_open, editor_heartbeat_at, active_job_id, created_at, updated_at";

/// Document repository
pub struct DocumentStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DocumentStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Register an uploaded document, queued for ingest.
    pub async fn create(
        &self,
        owner_id: &str,
        filename: &str,
        original_path: &str,
        size: i64,
    ) -> Result<Document> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO documents (id, owner_id, filename, size, original_path, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'queued', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(owner_id)
        .bind(filename)
        .bind(size)
        .bind(original_path)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created document".to_string()))
    }

    /// Get a document by id
    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(doc)
    }

    /// Claim a document for a pipeline job: status goes to processing, the
    /// previous error is cleared, and the job takes the per-document lease.
    pub async fn begin_job(&self, id: &str, job_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE documents
            SET status = 'processing', last_error = NULL, active_job_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job_id)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// True while the given job still holds the document's lease.
    /// A later job claiming the document steals it; the earlier job must
    /// then discard its result instead of writing.
    pub async fn holds_lease(&self, id: &str, job_id: &str) -> Result<bool> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT active_job_id FROM documents WHERE id = ?")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        Ok(matches!(row, Some((Some(holder),)) if holder == job_id))
    }

    pub async fn mark_ready(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET status = 'ready', last_error = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_error(&self, id: &str, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET status = 'error', last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_status(&self, id: &str, status: DocumentStatus) -> Result<()> {
        sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Cache the text extracted from the original artifact.
    pub async fn cache_extracted_text(&self, id: &str, text: &str) -> Result<()> {
        sqlx::query("UPDATE documents SET extracted_text = ?, updated_at = ? WHERE id = ?")
            .bind(text)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Refresh the editor heartbeat. Called on every viewer read.
    pub async fn touch_heartbeat(&self, id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE documents SET editor_open = 1, editor_heartbeat_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn close_editor(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET editor_open = 0, editor_heartbeat_at = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Documents with an open editor, for the staleness reaper.
    pub async fn list_open_editors(&self) -> Result<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE editor_open = 1"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(docs)
    }

    /// Clear the sticky error banner; the caller decides the recomputed status.
    pub async fn clear_error(&self, id: &str, status: DocumentStatus) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET last_error = NULL, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Delete the document row; versions and shares cascade.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
