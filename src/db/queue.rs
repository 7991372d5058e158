//! SQLite-backed job queue
//!
//! A minimal at-least-once queue: workers claim the oldest pending row with
//! a single atomic update, and a failed job goes back to pending until its
//! attempt budget runs out. Job bodies are written to be idempotent under
//! re-delivery.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;

/// Attempts before a job is parked as failed.
pub const MAX_ATTEMPTS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// Queued job record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: String,
    pub kind: String,
    pub payload: String,
    pub status: JobStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

const JOB_COLUMNS: &str = "id, kind, payload, status, attempts, last_error, created_at, updated_at";

/// Job queue repository
pub struct JobQueue<'a> {
    pool: &'a SqlitePool,
}

impl<'a> JobQueue<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Enqueue a job and return its id.
    pub async fn enqueue(&self, kind: &str, payload: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO jobs (id, kind, payload, status, created_at, updated_at)
            VALUES (?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(kind)
        .bind(payload)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        tracing::info!(job_id = %id, kind = %kind, "Enqueued job");
        Ok(id)
    }

    /// Atomically claim the oldest pending job, if any.
    pub async fn claim_next(&self) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE jobs
            SET status = 'running', attempts = attempts + 1, updated_at = ?
            WHERE id = (
                SELECT id FROM jobs WHERE status = 'pending'
                ORDER BY created_at, id LIMIT 1
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(Utc::now().to_rfc3339())
        .fetch_optional(self.pool)
        .await?;

        Ok(job)
    }

    pub async fn complete(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = 'done', updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Record a failure. The job returns to pending while attempts remain,
    /// otherwise it is parked as failed.
    pub async fn fail(&self, id: &str, attempts: i64, error: &str) -> Result<()> {
        let status = if attempts < MAX_ATTEMPTS {
            JobStatus::Pending
        } else {
            JobStatus::Failed
        };

        sqlx::query("UPDATE jobs SET status = ?, last_error = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(error)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    #[tokio::test]
    async fn claim_is_fifo_and_exclusive() {
        let pool = memory_pool().await;
        let queue = JobQueue::new(&pool);

        let first = queue.enqueue("ingest", "{}").await.unwrap();
        let second = queue.enqueue("ingest", "{}").await.unwrap();

        let a = queue.claim_next().await.unwrap().unwrap();
        let b = queue.claim_next().await.unwrap().unwrap();

        assert_eq!(a.id, first);
        assert_eq!(b.id, second);
        assert_eq!(a.status, JobStatus::Running);
        assert_eq!(a.attempts, 1);
        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_job_retries_until_attempts_exhausted() {
        let pool = memory_pool().await;
        let queue = JobQueue::new(&pool);

        queue.enqueue("transform", "{}").await.unwrap();

        for attempt in 1..=MAX_ATTEMPTS {
            let job = queue.claim_next().await.unwrap().unwrap();
            assert_eq!(job.attempts, attempt);
            queue.fail(&job.id, job.attempts, "boom").await.unwrap();
        }

        // Attempt budget spent: nothing left to claim.
        assert!(queue.claim_next().await.unwrap().is_none());
    }
}
