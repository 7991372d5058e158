//! Error types for the Palimpsest engine

use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
///
/// Subsystem errors (extraction, rewrite, compile) keep their own enums and
/// convert into this one at the job boundary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Extract(#[from] crate::extract::ExtractError),

    #[error(transparent)]
    Rewrite(#[from] crate::llm::RewriteError),

    #[error(transparent)]
    Compile(#[from] crate::tex::CompileError),
}
