//! Rewrite service
//!
//! Drives a remote text-generation model through an OpenRouter-shaped API.
//! Model selection supports a concrete configured id or "auto", which ranks
//! the provider's live catalog and falls back across candidates in order.

mod catalog;
mod rewrite;

pub use catalog::*;
pub use rewrite::*;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("rewrite provider is disabled")]
    Disabled,

    #[error("unsupported rewrite provider: {0}")]
    UnsupportedProvider(String),

    #[error("rewrite provider API key is empty")]
    MissingApiKey,

    #[error("model catalog request failed: {0}")]
    Catalog(String),

    #[error("provider error {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider response parse error: {0}")]
    Parse(String),

    #[error("all model candidates failed: {0}")]
    Exhausted(String),
}

/// A completed rewrite: the generated text and the model that produced it.
#[derive(Debug, Clone)]
pub struct RewriteOutput {
    pub text: String,
    pub model_id: String,
}

/// Seam for the remote rewrite call, so jobs can be driven against a mock.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<RewriteOutput, RewriteError>;
}

/// Character-safe truncation for logged and persisted error text.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("ééé", 2), "éé");
    }
}
