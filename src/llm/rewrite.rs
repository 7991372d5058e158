//! Rewrite service implementation
//!
//! One rewrite call is synchronous from the caller's perspective: pick the
//! candidate models, try them in order, return the first completion. Every
//! candidate failure is logged and skipped; only exhaustion surfaces.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    rank_models, truncate_chars, CatalogCache, ModelEntry, RewriteError, RewriteOutput, Rewriter,
    CANDIDATE_LIMIT, DEFAULT_PREFERRED_MODELS,
};
use crate::config::RewriteConfig;

/// Cap on fallback attempts within one rewrite call.
const ATTEMPT_LIMIT: usize = 6;

const CATALOG_TIMEOUT: Duration = Duration::from_secs(30);
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(120);

pub struct RewriteService {
    config: RewriteConfig,
    client: reqwest::Client,
    catalog: Mutex<Option<CatalogCache>>,
}

impl RewriteService {
    pub fn new(config: RewriteConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            catalog: Mutex::new(None),
        }
    }

    fn base_url(&self) -> String {
        self.config.base_url.trim_end_matches('/').to_string()
    }

    /// Catalog entries, served from the cache while it is fresh.
    async fn catalog_entries(&self) -> Result<Vec<ModelEntry>, RewriteError> {
        let mut cache = self.catalog.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.entries.clone());
            }
        }

        let entries = self.fetch_catalog().await?;
        *cache = Some(CatalogCache {
            fetched_at: Instant::now(),
            entries: entries.clone(),
        });
        Ok(entries)
    }

    async fn fetch_catalog(&self) -> Result<Vec<ModelEntry>, RewriteError> {
        let url = format!("{}/models", self.base_url());
        let response = self
            .client
            .get(&url)
            .timeout(CATALOG_TIMEOUT)
            .send()
            .await
            .map_err(|e| RewriteError::Catalog(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RewriteError::Catalog(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RewriteError::Catalog(e.to_string()))?;

        let entries = body
            .get("data")
            .and_then(|data| data.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(entries)
    }

    async fn candidates(&self) -> Result<Vec<String>, RewriteError> {
        let requested = self.config.model.trim();
        if !requested.is_empty() && !requested.eq_ignore_ascii_case("auto") {
            return Ok(vec![requested.to_string()]);
        }

        let entries = self.catalog_entries().await?;
        Ok(rank_models(&entries, DEFAULT_PREFERRED_MODELS, CANDIDATE_LIMIT))
    }

    async fn chat(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, RewriteError> {
        let url = format!("{}/chat/completions", self.base_url());
        let request = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(&url)
            .timeout(COMPLETION_TIMEOUT)
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&request)
            .send()
            .await
            .map_err(|e| RewriteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RewriteError::Provider {
                status: status.as_u16(),
                body: truncate_chars(&body, 2000),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RewriteError::Parse(e.to_string()))?;

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.to_string())
            .ok_or_else(|| RewriteError::Parse(truncate_chars(&body.to_string(), 500)))
    }

    fn validate(&self) -> Result<(), RewriteError> {
        let provider = self.config.provider.trim().to_lowercase();
        if provider == "none" {
            return Err(RewriteError::Disabled);
        }
        if provider != "openrouter" {
            return Err(RewriteError::UnsupportedProvider(provider));
        }
        if self.config.api_key.is_empty() {
            return Err(RewriteError::MissingApiKey);
        }
        Ok(())
    }
}

#[async_trait]
impl Rewriter for RewriteService {
    async fn rewrite(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<RewriteOutput, RewriteError> {
        self.validate()?;

        let candidates = self.candidates().await?;
        let mut last_error = String::new();

        for model in candidates.iter().take(ATTEMPT_LIMIT) {
            match self.chat(model, system_prompt, user_prompt).await {
                Ok(text) => {
                    tracing::info!(model = %model, chars = text.len(), "Rewrite ok");
                    return Ok(RewriteOutput {
                        text,
                        model_id: model.clone(),
                    });
                }
                Err(e) => {
                    last_error = e.to_string();
                    // "No endpoints" and 404-style responses mean this
                    // candidate is gone; other failures are skipped the same
                    // way for now, pending a product decision on aborting.
                    if last_error.contains("No endpoints")
                        || last_error.contains("\"code\":404")
                    {
                        tracing::warn!(
                            model = %model,
                            error = %truncate_chars(&last_error, 180),
                            "Rewrite model unavailable, trying next"
                        );
                    } else {
                        tracing::warn!(
                            model = %model,
                            error = %truncate_chars(&last_error, 180),
                            "Rewrite call failed"
                        );
                    }
                    continue;
                }
            }
        }

        if last_error.is_empty() {
            last_error = "no model candidates".to_string();
        }
        Err(RewriteError::Exhausted(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, api_key: &str, model: &str) -> RewriteConfig {
        RewriteConfig {
            provider: provider.to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            referer: "http://localhost".to_string(),
            title: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn disabled_provider_errors_immediately() {
        let service = RewriteService::new(config("none", "key", "auto"));
        let err = service.rewrite("s", "u").await.unwrap_err();
        assert!(matches!(err, RewriteError::Disabled));
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let service = RewriteService::new(config("azure", "key", "auto"));
        let err = service.rewrite("s", "u").await.unwrap_err();
        assert!(matches!(err, RewriteError::UnsupportedProvider(_)));
    }

    #[tokio::test]
    async fn empty_api_key_is_rejected() {
        let service = RewriteService::new(config("openrouter", "", "auto"));
        let err = service.rewrite("s", "u").await.unwrap_err();
        assert!(matches!(err, RewriteError::MissingApiKey));
    }

    #[tokio::test]
    async fn concrete_model_is_sole_candidate() {
        let service = RewriteService::new(config("openrouter", "key", "some/model"));
        let candidates = service.candidates().await.unwrap();
        assert_eq!(candidates, vec!["some/model".to_string()]);
    }
}
