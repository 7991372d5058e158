//! Document share list
//!
//! Shares grant read access to other users; search results are filtered to
//! the union of owned and shared documents.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;

/// Share repository
pub struct ShareStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ShareStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Share a document with a user. A duplicate share is a no-op.
    pub async fn add(&self, doc_id: &str, user_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO doc_shares (id, doc_id, user_id, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(doc_id, user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(doc_id)
        .bind(user_id)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn remove(&self, doc_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM doc_shares WHERE doc_id = ? AND user_id = ?")
            .bind(doc_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Ids of all documents the user owns or has been granted.
    pub async fn visible_doc_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM documents WHERE owner_id = ?
            UNION
            SELECT doc_id FROM doc_shares WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
