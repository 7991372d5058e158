//! Model catalog ranking
//!
//! The provider's /models listing is scored against an ordered preference
//! list: a candidate gets 1000 − 10×(index of the first matching prefix),
//! plus 3 when the provider flags it as a top provider. Entries without a
//! usable endpoint are dropped before scoring.

use std::time::{Duration, Instant};

use serde::Deserialize;

/// How long a fetched catalog stays fresh.
pub const CATALOG_TTL: Duration = Duration::from_secs(300);

/// Cap on ranked candidates.
pub const CANDIDATE_LIMIT: usize = 8;

pub const DEFAULT_PREFERRED_MODELS: &[&str] = &[
    "deepseek/deepseek-chat",
    "deepseek/deepseek-r1",
    "openai/gpt-4o-mini",
    "google/gemini",
    "anthropic/claude",
];

/// One entry of the provider's model catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    #[serde(default)]
    pub endpoints: Option<serde_json::Value>,
    #[serde(default)]
    pub top_provider: Option<serde_json::Value>,
}

impl ModelEntry {
    /// Endpoint count; an absent field means the default single endpoint.
    fn endpoint_count(&self) -> usize {
        match &self.endpoints {
            Some(serde_json::Value::Array(list)) => list.len(),
            _ => 1,
        }
    }

    fn is_top_provider(&self) -> bool {
        match &self.top_provider {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(serde_json::Value::Object(map)) => !map.is_empty(),
            Some(serde_json::Value::Array(list)) => !list.is_empty(),
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(serde_json::Value::Number(n)) => n.as_f64() != Some(0.0),
        }
    }
}

/// Cached catalog snapshot owned by the rewrite service.
#[derive(Debug)]
pub struct CatalogCache {
    pub fetched_at: Instant,
    pub entries: Vec<ModelEntry>,
}

impl CatalogCache {
    pub fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < CATALOG_TTL
    }
}

/// Rank catalog entries into an ordered candidate list.
pub fn rank_models(entries: &[ModelEntry], prefer: &[&str], limit: usize) -> Vec<String> {
    let mut scored: Vec<(i32, &str)> = Vec::new();

    for entry in entries {
        if entry.endpoint_count() == 0 {
            continue;
        }
        let mut score = 0;
        for (idx, prefix) in prefer.iter().enumerate() {
            if entry.id.starts_with(prefix) {
                score = 1000 - (idx as i32) * 10;
                break;
            }
        }
        if entry.is_top_provider() {
            score += 3;
        }
        scored.push((score, &entry.id));
    }

    scored.sort_by(|a, b| b.cmp(a));

    let mut chosen: Vec<String> = Vec::new();
    for (_, id) in scored {
        if chosen.iter().any(|c| c == id) {
            continue;
        }
        chosen.push(id.to_string());
        if chosen.len() >= limit {
            break;
        }
    }

    // Nothing scored (e.g. every entry lost its endpoints): take the raw
    // listing rather than failing outright.
    if chosen.is_empty() {
        chosen = entries.iter().take(limit).map(|e| e.id.clone()).collect();
    }

    chosen
}
