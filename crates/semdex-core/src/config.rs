//! Configuration
//!
//! Defaults, overridden by `SEMDEX_*` environment variables, overridden in
//! turn by whatever the front end sets explicitly.

use std::path::PathBuf;
use std::time::Duration;

use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};

use crate::embeddings::{RuntimeOptions, DEFAULT_TOKENIZER_MODEL, EMBEDDING_DIMENSIONS};
use crate::pipeline::{
    FailurePolicy, PipelineOptions, DEFAULT_EMBED_TIMEOUT, DEFAULT_QUERY_CACHE_CAPACITY,
};
use crate::search::{IndexKind, Metric};
use crate::storage::StoreOptions;

/// ONNX file expected in the model cache directory
pub const DEFAULT_MODEL_FILE: &str = "model_quantized.onnx";

/// Results returned by a query when no count is given
pub const DEFAULT_TOP_K: usize = 3;

/// Environment variable names
pub mod env {
    pub const DB_PATH: &str = "SEMDEX_DB_PATH";
    pub const MODEL_PATH: &str = "SEMDEX_MODEL_PATH";
    pub const TOKENIZER_PATH: &str = "SEMDEX_TOKENIZER_PATH";
    pub const MODEL_NAME: &str = "SEMDEX_MODEL_NAME";
    pub const CACHE_DIR: &str = "SEMDEX_CACHE_DIR";
    pub const METRIC: &str = "SEMDEX_METRIC";
    pub const TOP_K: &str = "SEMDEX_TOP_K";
    pub const SESSIONS: &str = "SEMDEX_SESSIONS";
    pub const EMBED_TIMEOUT_SECS: &str = "SEMDEX_EMBED_TIMEOUT_SECS";
    pub const FAILURE_POLICY: &str = "SEMDEX_FAILURE_POLICY";
}

/// Configuration error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A setting could not be parsed
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    /// A setting parsed but is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything needed to build a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SemdexConfig {
    /// Vocabulary name; also the cache key for `tokenizer.json`
    pub model_name: String,
    /// ONNX model; `None` means `<cache_dir>/model_quantized.onnx`
    pub model_path: Option<PathBuf>,
    /// Explicit `tokenizer.json`, bypassing the cache
    pub tokenizer_path: Option<PathBuf>,
    pub cache_dir: PathBuf,
    /// Database file; `None` means the platform data directory
    pub db_path: Option<PathBuf>,
    /// Keep everything in memory; wins over `db_path`
    pub in_memory: bool,
    pub dimensions: usize,
    /// Metric for a new store; `None` follows an existing store, else L2
    pub metric: Option<Metric>,
    pub index_kind: IndexKind,
    pub top_k: usize,
    pub sessions: usize,
    pub intra_threads: usize,
    pub embed_timeout_secs: u64,
    pub failure_policy: FailurePolicy,
    pub query_cache_capacity: usize,
}

impl Default for SemdexConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_TOKENIZER_MODEL.to_string(),
            model_path: None,
            tokenizer_path: None,
            cache_dir: default_cache_dir(),
            db_path: None,
            in_memory: false,
            dimensions: EMBEDDING_DIMENSIONS,
            metric: None,
            index_kind: IndexKind::Exact,
            top_k: DEFAULT_TOP_K,
            sessions: 1,
            intra_threads: 1,
            embed_timeout_secs: DEFAULT_EMBED_TIMEOUT.as_secs(),
            failure_policy: FailurePolicy::SkipAndContinue,
            query_cache_capacity: DEFAULT_QUERY_CACHE_CAPACITY,
        }
    }
}

/// Platform cache directory for models and vocabularies
///
/// - macOS: ~/Library/Caches/com.semdex.semdex/models
/// - Linux: ~/.cache/semdex/models
/// - Windows: %LOCALAPPDATA%\semdex\semdex\cache\models
pub fn default_cache_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("com", "semdex", "semdex") {
        return proj_dirs.cache_dir().join("models");
    }

    if let Some(base_dirs) = BaseDirs::new() {
        return base_dirs.home_dir().join(".cache/semdex/models");
    }

    PathBuf::from(".semdex_cache")
}

fn parse<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

impl SemdexConfig {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from `lookup`, which maps a variable name to its value
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(env::DB_PATH) {
            self.db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup(env::MODEL_PATH) {
            self.model_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup(env::TOKENIZER_PATH) {
            self.tokenizer_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup(env::MODEL_NAME) {
            self.model_name = v;
        }
        if let Some(v) = lookup(env::CACHE_DIR) {
            self.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(env::METRIC) {
            self.metric = Some(parse(env::METRIC, &v)?);
        }
        if let Some(v) = lookup(env::TOP_K) {
            self.top_k = parse(env::TOP_K, &v)?;
        }
        if let Some(v) = lookup(env::SESSIONS) {
            self.sessions = parse(env::SESSIONS, &v)?;
        }
        if let Some(v) = lookup(env::EMBED_TIMEOUT_SECS) {
            self.embed_timeout_secs = parse(env::EMBED_TIMEOUT_SECS, &v)?;
        }
        if let Some(v) = lookup(env::FAILURE_POLICY) {
            self.failure_policy = parse(env::FAILURE_POLICY, &v)?;
        }

        self.validate()
    }

    /// Reject settings no component can run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimensions == 0 {
            return Err(ConfigError::Invalid("dimensions must be positive".into()));
        }
        if self.sessions == 0 {
            return Err(ConfigError::Invalid("session pool size must be at least 1".into()));
        }
        if self.intra_threads == 0 {
            return Err(ConfigError::Invalid("intra-op threads must be at least 1".into()));
        }
        if self.embed_timeout_secs == 0 {
            return Err(ConfigError::Invalid("inference timeout must be positive".into()));
        }
        if self.model_name.trim().is_empty() {
            return Err(ConfigError::Invalid("model name must not be empty".into()));
        }
        Ok(())
    }

    /// Resolved ONNX model path
    pub fn model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| self.cache_dir.join(DEFAULT_MODEL_FILE))
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }

    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            tokenizer_model: self.model_name.clone(),
            tokenizer_path: self.tokenizer_path.clone(),
            cache_dir: self.cache_dir.clone(),
            model_path: self.model_path(),
            sessions: self.sessions,
            intra_threads: self.intra_threads,
        }
    }

    /// The embedding model is left unset; a pipeline records its own
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            dimensions: self.dimensions,
            metric: self.metric,
            index_kind: self.index_kind,
            embedding_model: None,
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            failure_policy: self.failure_policy,
            embed_timeout: self.embed_timeout(),
            query_cache_capacity: self.query_cache_capacity,
        }
    }
}
