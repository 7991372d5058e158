//! Background job pipeline
//!
//! Three job kinds flow through the shared queue: ingest (extract and index
//! the original), transform (LLM rewrite into LaTeX with one compile-repair
//! round), and normalize (deterministic text-to-LaTeX, no LLM). Workers are
//! independent; the only coordination is the per-document lease and the
//! editor liveness check, both best-effort.

pub mod liveness;
pub mod pipeline;

pub use pipeline::Pipeline;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db::{DocumentStatus, DocumentStore, JobQueue, ViewKind};
use crate::error::Result;
use crate::llm::{RewriteService, Rewriter};
use crate::tex::{Compiler, LatexCompiler};

/// Edit options for a transform job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Which content the rewrite starts from.
    pub base_kind: ViewKind,
    pub toc: bool,
    pub structure: bool,
    pub spelling: bool,
    /// Free-text override instruction; wins over the option flags.
    #[serde(default)]
    pub extra: String,
}

/// Queue payload for one pipeline job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    Ingest { doc_id: String },
    Transform { doc_id: String, options: TransformOptions },
    Normalize { doc_id: String },
}

impl JobPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ingest { .. } => "ingest",
            Self::Transform { .. } => "transform",
            Self::Normalize { .. } => "normalize",
        }
    }

    pub fn doc_id(&self) -> &str {
        match self {
            Self::Ingest { doc_id }
            | Self::Transform { doc_id, .. }
            | Self::Normalize { doc_id } => doc_id,
        }
    }
}

/// Queue a pipeline job and move its document to queued.
pub async fn enqueue(pool: &SqlitePool, payload: &JobPayload) -> Result<String> {
    let docs = DocumentStore::new(pool);
    docs.set_status(payload.doc_id(), DocumentStatus::Queued).await?;

    let body = serde_json::to_string(payload)?;
    JobQueue::new(pool).enqueue(payload.kind(), &body).await
}

/// A queue worker: claims jobs, runs them through the pipeline, and reaps
/// stale editor sessions while idle.
#[derive(Clone)]
pub struct Worker {
    pool: SqlitePool,
    config: Arc<Config>,
    rewriter: Arc<dyn Rewriter>,
    compiler: Arc<dyn Compiler>,
}

impl Worker {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        let rewriter = Arc::new(RewriteService::new(config.rewrite.clone()));
        let compiler = Arc::new(LatexCompiler::new(&config.latex, &config.storage.scratch_dir));
        Self::with_services(pool, config, rewriter, compiler)
    }

    /// Construct with explicit service implementations (test seam).
    pub fn with_services(
        pool: SqlitePool,
        config: Config,
        rewriter: Arc<dyn Rewriter>,
        compiler: Arc<dyn Compiler>,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            rewriter,
            compiler,
        }
    }

    /// Drain the queue until the task is dropped.
    pub async fn run(&self) {
        let poll = Duration::from_millis(self.config.worker.poll_interval_ms);

        loop {
            match self.tick().await {
                Ok(true) => {}
                Ok(false) => {
                    if let Err(e) =
                        liveness::reap_stale_editors(&self.pool, &self.config.storage).await
                    {
                        tracing::warn!(error = %e, "Editor reaper failed");
                    }
                    tokio::time::sleep(poll).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Worker tick failed");
                    tokio::time::sleep(poll).await;
                }
            }
        }
    }

    /// Claim and run at most one job. Returns whether one was available.
    pub async fn tick(&self) -> Result<bool> {
        let queue = JobQueue::new(&self.pool);
        let job = match queue.claim_next().await? {
            Some(job) => job,
            None => return Ok(false),
        };

        let pipeline = Pipeline::new(
            &self.pool,
            &self.config,
            self.rewriter.as_ref(),
            self.compiler.as_ref(),
        );

        match pipeline.run(&job).await {
            Ok(()) => queue.complete(&job.id).await?,
            Err(e) => {
                tracing::error!(job_id = %job.id, kind = %job.kind, error = %e, "Job failed");
                queue.fail(&job.id, job.attempts, &e.to_string()).await?;
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod mocks {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::llm::{RewriteError, RewriteOutput, Rewriter};
    use crate::tex::{CompileError, Compiler};

    /// Rewriter returning canned outputs in order, then repeating the last.
    pub struct MockRewriter {
        outputs: Vec<String>,
        pub calls: AtomicUsize,
    }

    impl MockRewriter {
        pub fn returning(outputs: Vec<&str>) -> Self {
            Self {
                outputs: outputs.into_iter().map(String::from).collect(),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Rewriter for MockRewriter {
        async fn rewrite(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
        ) -> Result<RewriteOutput, RewriteError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let text = self
                .outputs
                .get(call)
                .or_else(|| self.outputs.last())
                .cloned()
                .ok_or_else(|| RewriteError::Exhausted("no canned output".to_string()))?;

            Ok(RewriteOutput {
                text,
                model_id: "mock/model".to_string(),
            })
        }
    }

    /// Compiler failing a scripted number of times before succeeding.
    pub struct MockCompiler {
        failures_remaining: AtomicUsize,
        pub calls: AtomicUsize,
    }

    impl MockCompiler {
        pub fn failing_times(failures: usize) -> Self {
            Self {
                failures_remaining: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Compiler for MockCompiler {
        async fn compile(
            &self,
            _tex_source: &str,
            dest: &Path,
            _toc: bool,
        ) -> Result<(), CompileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(CompileError::Engine(
                    "! Undefined control sequence.".to_string(),
                ));
            }

            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(dest, "mock-pdf")?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::mocks::{MockCompiler, MockRewriter};
    use super::*;
    use crate::db::memory_pool;

    fn test_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.storage.original_dir = dir.join("original");
        config.storage.generated_dir = dir.join("generated");
        config.storage.scratch_dir = dir.join("tmp");
        config
    }

    #[tokio::test]
    async fn payload_round_trips_through_the_queue() {
        let pool = memory_pool().await;
        let docs = DocumentStore::new(&pool);
        let doc = docs.create("u", "a.pdf", "/missing", 0).await.unwrap();
        docs.mark_ready(&doc.id).await.unwrap();

        let payload = JobPayload::Transform {
            doc_id: doc.id.clone(),
            options: TransformOptions {
                base_kind: ViewKind::Original,
                toc: true,
                structure: false,
                spelling: true,
                extra: "keep dates".to_string(),
            },
        };
        enqueue(&pool, &payload).await.unwrap();

        // Enqueueing re-queues the document.
        assert_eq!(
            docs.get(&doc.id).await.unwrap().unwrap().status,
            DocumentStatus::Queued
        );

        let job = JobQueue::new(&pool).claim_next().await.unwrap().unwrap();
        assert_eq!(job.kind, "transform");
        let parsed: JobPayload = serde_json::from_str(&job.payload).unwrap();
        match parsed {
            JobPayload::Transform { doc_id, options } => {
                assert_eq!(doc_id, doc.id);
                assert!(options.toc);
                assert_eq!(options.extra, "keep dates");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tick_runs_one_job_and_completes_it() {
        let pool = memory_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let original = dir.path().join("note.txt");
        std::fs::write(&original, "Hello world.").unwrap();
        let doc = DocumentStore::new(&pool)
            .create("u", "note.txt", &original.display().to_string(), 12)
            .await
            .unwrap();

        enqueue(&pool, &JobPayload::Ingest { doc_id: doc.id.clone() })
            .await
            .unwrap();

        let worker = Worker::with_services(
            pool.clone(),
            config,
            Arc::new(MockRewriter::returning(vec![])),
            Arc::new(MockCompiler::failing_times(0)),
        );

        assert!(worker.tick().await.unwrap());
        assert!(!worker.tick().await.unwrap());

        let doc = DocumentStore::new(&pool).get(&doc.id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Ready);
    }

    #[tokio::test]
    async fn failed_job_is_requeued_and_document_marked() {
        let pool = memory_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let doc = DocumentStore::new(&pool)
            .create("u", "gone.pdf", "/nonexistent/gone.txt", 0)
            .await
            .unwrap();
        enqueue(&pool, &JobPayload::Ingest { doc_id: doc.id.clone() })
            .await
            .unwrap();

        let worker = Worker::with_services(
            pool.clone(),
            config,
            Arc::new(MockRewriter::returning(vec![])),
            Arc::new(MockCompiler::failing_times(0)),
        );

        assert!(worker.tick().await.unwrap());

        let doc = DocumentStore::new(&pool).get(&doc.id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Error);
        assert!(doc.last_error.is_some());

        // The queue re-delivers until the attempt budget runs out.
        let job = JobQueue::new(&pool).claim_next().await.unwrap().unwrap();
        assert_eq!(job.attempts, 2);
    }
}
