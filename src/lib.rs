//! Palimpsest Engine
//!
//! Turns an uploaded PDF into an editable, LLM-revisable LaTeX document.
//! This crate is the processing core: the background job pipeline, the
//! draft/saved version state machine, the compiler adapter, the rewrite
//! service, and the derived full-text chunk index. HTTP routing, auth, and
//! file upload plumbing live elsewhere and talk to these modules.
//!
//! # Modules
//!
//! - `jobs`: job payloads, the worker loop, and the three pipeline jobs
//! - `versioning`: draft/saved lifecycle and effective-view resolution
//! - `tex`: LaTeX assembly, lossy text projections, compiler adapter
//! - `llm`: rewrite service with ranked model fallback
//! - `db`: SQLite stores, job queue, and the chunk index
//! - `extract`: original-artifact text extraction

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod jobs;
pub mod llm;
pub mod prompts;
pub mod tex;
pub mod versioning;
