//! Configuration management for the Palimpsest engine

use std::env;
use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub rewrite: RewriteConfig,
    pub latex: LatexConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Filesystem layout: uploaded originals, generated PDFs, compiler scratch.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub original_dir: PathBuf,
    pub generated_dir: PathBuf,
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewriteConfig {
    /// Provider selector: "openrouter" or "none" (disabled).
    pub provider: String,
    pub base_url: String,
    pub api_key: String,
    /// Concrete model id, or "auto" to rank the live catalog.
    pub model: String,
    pub referer: String,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatexConfig {
    /// Engine binary, e.g. "lualatex" or "xelatex".
    pub engine: String,
    /// Hard cap on compiler passes per compile call, clamped to [1, 5].
    pub max_runs: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: DatabaseConfig {
                url: "sqlite:./storage/palimpsest.db".to_string(),
            },
            storage: StorageConfig {
                original_dir: PathBuf::from("./storage/original"),
                generated_dir: PathBuf::from("./storage/generated"),
                scratch_dir: PathBuf::from("./storage/tmp"),
            },
            rewrite: RewriteConfig {
                provider: "openrouter".to_string(),
                base_url: "https://openrouter.ai/api/v1".to_string(),
                api_key: String::new(),
                model: "auto".to_string(),
                referer: "http://localhost:8000".to_string(),
                title: "Palimpsest".to_string(),
            },
            latex: LatexConfig {
                engine: "lualatex".to_string(),
                max_runs: 2,
            },
            worker: WorkerConfig {
                poll_interval_ms: 1000,
                concurrency: 2,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = Config::default();
        Ok(Config {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            storage: StorageConfig {
                original_dir: env::var("ORIGINAL_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.original_dir),
                generated_dir: env::var("GENERATED_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.generated_dir),
                scratch_dir: env::var("SCRATCH_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.scratch_dir),
            },
            rewrite: RewriteConfig {
                provider: env::var("LLM_PROVIDER").unwrap_or(defaults.rewrite.provider),
                base_url: env::var("OPENROUTER_BASE_URL").unwrap_or(defaults.rewrite.base_url),
                api_key: env::var("OPENROUTER_API_KEY").unwrap_or_default(),
                model: env::var("OPENROUTER_MODEL").unwrap_or(defaults.rewrite.model),
                referer: env::var("OPENROUTER_REFERER").unwrap_or(defaults.rewrite.referer),
                title: env::var("OPENROUTER_TITLE").unwrap_or(defaults.rewrite.title),
            },
            latex: LatexConfig {
                engine: env::var("LATEX_ENGINE").unwrap_or(defaults.latex.engine),
                max_runs: env::var("LATEX_MAX_RUNS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.latex.max_runs),
            },
            worker: WorkerConfig {
                poll_interval_ms: env::var("WORKER_POLL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.worker.poll_interval_ms),
                concurrency: env::var("WORKER_CONCURRENCY")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.worker.concurrency),
            },
        })
    }
}
