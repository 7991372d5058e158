//! Pipeline job bodies
//!
//! Every job follows the same shape: claim the document (status goes to
//! processing, the lease is taken), do the work, and either mark the
//! document ready or record the error and re-raise for the queue's retry
//! policy. A missing document means the job has nothing to do.

use std::path::Path;

use sqlx::SqlitePool;

use super::{liveness, JobPayload};
use crate::config::Config;
use crate::db::{ChunkIndex, Document, DocumentStore, Job, VersionKind, VersionStore, ViewKind};
use crate::error::Result;
use crate::extract;
use crate::llm::{truncate_chars, Rewriter};
use crate::prompts;
use crate::tex::{self, Compiler};
use crate::versioning::VersionLifecycle;

/// Cap on the persisted error message, in characters.
const ERROR_MESSAGE_MAX_CHARS: usize = 2000;

/// One job execution against the shared stores and services.
pub struct Pipeline<'a> {
    pool: &'a SqlitePool,
    config: &'a Config,
    rewriter: &'a dyn Rewriter,
    compiler: &'a dyn Compiler,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        config: &'a Config,
        rewriter: &'a dyn Rewriter,
        compiler: &'a dyn Compiler,
    ) -> Self {
        Self {
            pool,
            config,
            rewriter,
            compiler,
        }
    }

    /// Run a claimed job. On failure the document carries the truncated
    /// error and the error propagates to the queue.
    pub async fn run(&self, job: &Job) -> Result<()> {
        let payload: JobPayload = serde_json::from_str(&job.payload)?;
        let doc_id = payload.doc_id().to_string();

        let outcome = match &payload {
            JobPayload::Ingest { doc_id } => self.ingest(doc_id, &job.id).await,
            JobPayload::Transform { doc_id, options } => {
                self.transform(doc_id, &job.id, options).await
            }
            JobPayload::Normalize { doc_id } => self.normalize(doc_id, &job.id).await,
        };

        if let Err(e) = &outcome {
            let message = truncate_chars(&e.to_string(), ERROR_MESSAGE_MAX_CHARS);
            if let Err(persist) = DocumentStore::new(self.pool).mark_error(&doc_id, &message).await
            {
                tracing::warn!(doc_id = %doc_id, error = %persist, "Failed to persist job error");
            }
        }

        outcome
    }

    /// Ingest: extract text from the original artifact, cache it, and
    /// index it under the original kind.
    async fn ingest(&self, doc_id: &str, job_id: &str) -> Result<()> {
        let docs = DocumentStore::new(self.pool);
        let doc = match docs.get(doc_id).await? {
            Some(doc) => doc,
            None => return Ok(()),
        };
        docs.begin_job(doc_id, job_id).await?;

        let text = extract::extract_text(Path::new(&doc.original_path))?;
        docs.cache_extracted_text(doc_id, &text).await?;
        ChunkIndex::new(self.pool)
            .rebuild(doc_id, ViewKind::Original, &text)
            .await?;

        docs.mark_ready(doc_id).await?;
        tracing::info!(doc_id = %doc_id, chars = text.len(), "Ingest done");
        Ok(())
    }

    /// Transform: rewrite the selected base content into LaTeX via the
    /// model, compile it with one repair round, and persist the draft
    /// unless the editing session ended while we worked.
    async fn transform(
        &self,
        doc_id: &str,
        job_id: &str,
        options: &super::TransformOptions,
    ) -> Result<()> {
        let docs = DocumentStore::new(self.pool);
        let doc = match docs.get(doc_id).await? {
            Some(doc) => doc,
            None => return Ok(()),
        };
        docs.begin_job(doc_id, job_id).await?;

        let (input, is_tex) = self.select_input(&doc, options.base_kind).await?;
        let user_prompt = prompts::build_user_prompt(
            &input,
            is_tex,
            options.toc,
            options.structure,
            options.spelling,
            &options.extra,
        );
        let output = self
            .rewriter
            .rewrite(prompts::EDITOR_SYSTEM_PROMPT, &user_prompt)
            .await?;

        let lifecycle = VersionLifecycle::new(self.pool, &self.config.storage);
        let draft_pdf = lifecycle.generated_pdf_path(doc_id, VersionKind::Draft);

        let body = tex::extract_body(&output.text);
        let mut full_tex = tex::wrap_full_document(&body, options.toc);

        if let Err(compile_err) = self
            .compiler
            .compile(&full_tex, &draft_pdf, options.toc)
            .await
        {
            // Exactly one repair round; a second failure propagates.
            tracing::warn!(doc_id = %doc_id, "Compile failed, sending diagnostic back for repair");
            let repair_prompt = prompts::build_repair_prompt(&compile_err.diagnostic(), &full_tex);
            let repaired = self
                .rewriter
                .rewrite(prompts::REPAIR_SYSTEM_PROMPT, &repair_prompt)
                .await?;

            let body = tex::extract_body(&repaired.text);
            full_tex = tex::wrap_full_document(&body, options.toc);
            self.compiler
                .compile(&full_tex, &draft_pdf, options.toc)
                .await?;
        }

        if !self.still_wanted(doc_id, job_id).await? {
            docs.mark_ready(doc_id).await?;
            tracing::info!(doc_id = %doc_id, model = %output.model_id, "Transform result discarded (editor gone)");
            return Ok(());
        }

        let plain = tex::tex_to_plain_text(&full_tex);
        lifecycle
            .replace_draft(doc_id, &full_tex, &draft_pdf, &plain)
            .await?;
        docs.mark_ready(doc_id).await?;

        tracing::info!(doc_id = %doc_id, model = %output.model_id, "Transform done");
        Ok(())
    }

    /// Normalize: deterministic text-to-LaTeX without the model.
    /// Determinism means a compile failure is not transient, so there is no
    /// repair round.
    async fn normalize(&self, doc_id: &str, job_id: &str) -> Result<()> {
        let docs = DocumentStore::new(self.pool);
        if docs.get(doc_id).await?.is_none() {
            return Ok(());
        }
        docs.begin_job(doc_id, job_id).await?;

        let doc = match docs.get(doc_id).await? {
            Some(doc) => doc,
            None => return Ok(()),
        };
        if !liveness::editor_active(&doc) {
            docs.mark_ready(doc_id).await?;
            return Ok(());
        }

        let text = self.original_text(&doc).await?;
        let body = tex::text_to_tex_body(&text);
        let full_tex = tex::wrap_full_document(&body, false);

        let lifecycle = VersionLifecycle::new(self.pool, &self.config.storage);
        let draft_pdf = lifecycle.generated_pdf_path(doc_id, VersionKind::Draft);
        self.compiler.compile(&full_tex, &draft_pdf, false).await?;

        if !self.still_wanted(doc_id, job_id).await? {
            docs.mark_ready(doc_id).await?;
            tracing::info!(doc_id = %doc_id, "Normalize result discarded (editor gone)");
            return Ok(());
        }

        let plain = tex::tex_to_plain_text(&full_tex);
        lifecycle
            .replace_draft(doc_id, &full_tex, &draft_pdf, &plain)
            .await?;
        docs.mark_ready(doc_id).await?;

        tracing::info!(doc_id = %doc_id, "Normalize done");
        Ok(())
    }

    /// Content the transform starts from. A requested base version that
    /// does not exist degrades to the original text.
    async fn select_input(&self, doc: &Document, base: ViewKind) -> Result<(String, bool)> {
        if let Some(kind) = base.as_version_kind() {
            if let Some(version) = VersionStore::new(self.pool).get(&doc.id, kind).await? {
                return Ok((version.tex_source, true));
            }
        }
        Ok((self.original_text(doc).await?, false))
    }

    /// Cached extracted text, extracting and caching on a miss.
    async fn original_text(&self, doc: &Document) -> Result<String> {
        if let Some(text) = doc.extracted_text.as_deref() {
            if !text.trim().is_empty() {
                return Ok(text.to_string());
            }
        }

        let text = extract::extract_text(Path::new(&doc.original_path))?;
        DocumentStore::new(self.pool)
            .cache_extracted_text(&doc.id, &text)
            .await?;
        Ok(text)
    }

    /// A finished result is only written while the editing session is live
    /// and this job still holds the document lease.
    async fn still_wanted(&self, doc_id: &str, job_id: &str) -> Result<bool> {
        let docs = DocumentStore::new(self.pool);
        let doc = match docs.get(doc_id).await? {
            Some(doc) => doc,
            None => return Ok(false),
        };

        Ok(liveness::editor_active(&doc) && docs.holds_lease(doc_id, job_id).await?)
    }
}
