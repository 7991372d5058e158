//! Version database operations
//!
//! A document has at most one `draft` and one `saved` version. Promotion
//! relabels the draft row in place rather than copying it, so the row
//! identity survives the transition.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;

/// Stored version role. The original is virtual: it is the document's own
/// extracted text and artifact, never a version row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum VersionKind {
    Draft,
    Saved,
}

impl VersionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Saved => "saved",
        }
    }
}

/// A content kind a consumer can ask to view or index: the two stored
/// version roles plus the virtual original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Original,
    Draft,
    Saved,
}

impl ViewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Draft => "draft",
            Self::Saved => "saved",
        }
    }

    pub fn as_version_kind(self) -> Option<VersionKind> {
        match self {
            Self::Original => None,
            Self::Draft => Some(VersionKind::Draft),
            Self::Saved => Some(VersionKind::Saved),
        }
    }
}

impl From<VersionKind> for ViewKind {
    fn from(kind: VersionKind) -> Self {
        match kind {
            VersionKind::Draft => Self::Draft,
            VersionKind::Saved => Self::Saved,
        }
    }
}

/// Version record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Version {
    pub id: String,
    pub doc_id: String,
    pub kind: VersionKind,
    pub tex_source: String,
    pub pdf_path: String,
    pub plain_text: String,
    pub created_at: String,
    pub updated_at: String,
}

const VERSION_COLUMNS: &str =
    "id, doc_id, kind, tex_source, pdf_path, plain_text, created_at, updated_at";

/// Version repository
pub struct VersionStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> VersionStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, doc_id: &str, kind: VersionKind) -> Result<Option<Version>> {
        let version = sqlx::query_as::<_, Version>(&format!(
            "SELECT {VERSION_COLUMNS} FROM versions WHERE doc_id = ? AND kind = ?"
        ))
        .bind(doc_id)
        .bind(kind)
        .fetch_optional(self.pool)
        .await?;

        Ok(version)
    }

    pub async fn exists(&self, doc_id: &str, kind: VersionKind) -> Result<bool> {
        Ok(self.get(doc_id, kind).await?.is_some())
    }

    /// Create or fully replace the single draft row. The conflict branch
    /// keeps the existing row id.
    pub async fn upsert_draft(
        &self,
        doc_id: &str,
        tex_source: &str,
        pdf_path: &str,
        plain_text: &str,
    ) -> Result<Version> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO versions (id, doc_id, kind, tex_source, pdf_path, plain_text, created_at, updated_at)
            VALUES (?, ?, 'draft', ?, ?, ?, ?, ?)
            ON CONFLICT(doc_id, kind) DO UPDATE SET
                tex_source = excluded.tex_source,
                pdf_path = excluded.pdf_path,
                plain_text = excluded.plain_text,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(doc_id)
        .bind(tex_source)
        .bind(pdf_path)
        .bind(plain_text)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get(doc_id, VersionKind::Draft).await?.ok_or_else(|| {
            crate::error::AppError::Internal("Failed to fetch upserted draft".to_string())
        })
    }

    /// Relabel the draft row to saved in place, pointing it at the saved
    /// artifact path. Returns the relabeled row, or None without a draft.
    pub async fn relabel_draft_to_saved(
        &self,
        doc_id: &str,
        saved_pdf_path: &str,
    ) -> Result<Option<Version>> {
        let result = sqlx::query(
            r#"
            UPDATE versions SET kind = 'saved', pdf_path = ?, updated_at = ?
            WHERE doc_id = ? AND kind = 'draft'
            "#,
        )
        .bind(saved_pdf_path)
        .bind(Utc::now().to_rfc3339())
        .bind(doc_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get(doc_id, VersionKind::Saved).await
    }

    pub async fn delete(&self, doc_id: &str, kind: VersionKind) -> Result<bool> {
        let result = sqlx::query("DELETE FROM versions WHERE doc_id = ? AND kind = ?")
            .bind(doc_id)
            .bind(kind)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
