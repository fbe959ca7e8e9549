//! Ingestion and query pipeline
//!
//! Ties an [`Embedder`] to a [`Store`]: documents are embedded and inserted
//! under fresh ids, queries are embedded the same way and answered with the
//! nearest stored documents.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::document::{excerpt, is_blank, new_document_id, split_documents, QueryResult};
use crate::embeddings::{Embedder, Embedding, EmbeddingError, EmbeddingRuntime, RuntimeOptions};
use crate::storage::{Store, StoreError, StoreOptions};

/// Default capacity of the query-embedding cache
pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 100;

/// Default limit on one async embedding call
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Pipeline error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// One document (or query) could not be embedded
    #[error("Embedding failed for \"{excerpt}\": {source}")]
    Embedding {
        excerpt: String,
        #[source]
        source: EmbeddingError,
    },
    /// Tokenizer or model could not be loaded
    #[error("Failed to initialize embedding runtime: {0}")]
    Runtime(#[source] EmbeddingError),
    /// Store failure; always aborts the operation
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Embedder and store disagree on vector width
    #[error("Embedder produces {got}-dimensional vectors, store expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Stored vectors came from a different model than the embedder
    #[error("Store holds vectors from model {stored}, embedder is {embedder}")]
    ModelMismatch { stored: String, embedder: String },
    /// Async inference exceeded its limit
    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),
    /// Input file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// Query cache lock poisoned
    #[error("Query cache lock poisoned")]
    CachePoisoned,
}

/// Pipeline result type
pub type Result<T> = std::result::Result<T, PipelineError>;

// ============================================================================
// OPTIONS & REPORTS
// ============================================================================

/// What a batch does when one document fails to embed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop at the first failure and return it
    Abort,
    /// Record the failure in the report and keep going
    #[default]
    SkipAndContinue,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Abort => write!(f, "abort"),
            FailurePolicy::SkipAndContinue => write!(f, "skip-and-continue"),
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "skip" | "skip-and-continue" | "continue" => Ok(FailurePolicy::SkipAndContinue),
            _ => Err(format!("Unknown failure policy: {}", s)),
        }
    }
}

/// Pipeline behavior knobs
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub failure_policy: FailurePolicy,
    /// Limit on one async embedding call
    pub embed_timeout: Duration,
    /// Cached query embeddings; 0 disables the cache
    pub query_cache_capacity: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            query_cache_capacity: DEFAULT_QUERY_CACHE_CAPACITY,
        }
    }
}

/// A document that was not ingested
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFailure {
    /// Position in the input sequence
    pub index: usize,
    pub excerpt: String,
    pub error: String,
}

/// Outcome of a batch ingest
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Ids assigned to stored documents, in input order
    pub inserted: Vec<String>,
    /// Empty or whitespace-only segments
    pub skipped_blank: usize,
    /// Documents dropped under [`FailurePolicy::SkipAndContinue`]
    pub failed: Vec<DocumentFailure>,
}

impl IngestReport {
    /// True when every non-blank document was stored
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Embedder plus store
///
/// The embedder is the runtime context for the process: its tokenizer and
/// sessions are loaded once and shared by every call.
pub struct Pipeline<E: Embedder> {
    embedder: E,
    store: Store,
    options: PipelineOptions,
    query_cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl Pipeline<EmbeddingRuntime> {
    /// Load the tokenizer and model, then open the store
    ///
    /// `db_path` of `None` opens an in-memory store.
    pub fn open(
        runtime: &RuntimeOptions,
        db_path: Option<PathBuf>,
        store: StoreOptions,
        options: PipelineOptions,
    ) -> Result<Self> {
        let embedder = EmbeddingRuntime::new(runtime).map_err(PipelineError::Runtime)?;
        let store = match db_path {
            Some(path) => Store::new(Some(path), store)?,
            None => Store::open_in_memory(store)?,
        };
        Self::new(embedder, store, options)
    }
}

impl<E: Embedder> Pipeline<E> {
    /// Combine an embedder with a store of the same vector width
    ///
    /// The store is bound to the embedder's model: an empty binding is filled
    /// in, and a store recorded under another model is refused.
    pub fn new(embedder: E, store: Store, options: PipelineOptions) -> Result<Self> {
        let expected = store.options().dimensions;
        let got = embedder.dimensions();
        if expected != got {
            return Err(PipelineError::DimensionMismatch { expected, got });
        }

        store
            .bind_embedding_model(embedder.model_name())
            .map_err(|e| match e {
                StoreError::MetaMismatch {
                    stored, requested, ..
                } => PipelineError::ModelMismatch {
                    stored,
                    embedder: requested,
                },
                other => PipelineError::Store(other),
            })?;

        let query_cache = NonZeroUsize::new(options.query_cache_capacity)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));

        Ok(Self {
            embedder,
            store,
            options,
            query_cache,
        })
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    fn embed_document(&self, text: &str) -> Result<Embedding> {
        self.embedder
            .embed(text)
            .map_err(|source| PipelineError::Embedding {
                excerpt: excerpt(text),
                source,
            })
    }

    /// Embed and store one document under a fresh id
    ///
    /// Blank text is skipped and yields `None`.
    pub fn ingest(&self, text: &str) -> Result<Option<String>> {
        if is_blank(text) {
            return Ok(None);
        }

        let embedding = self.embed_document(text)?;
        let id = new_document_id();
        self.store.insert(&id, &embedding.vector, text)?;

        tracing::debug!(id = %id, "Document ingested");
        Ok(Some(id))
    }

    /// Ingest documents in order, applying the failure policy
    ///
    /// Embedding failures follow [`PipelineOptions::failure_policy`]; store
    /// failures always abort.
    pub fn ingest_batch<'a, I>(&self, documents: I) -> Result<IngestReport>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut report = IngestReport::default();

        for (index, text) in documents.into_iter().enumerate() {
            if is_blank(text) {
                report.skipped_blank += 1;
                continue;
            }

            match self.embed_document(text) {
                Ok(embedding) => {
                    let id = new_document_id();
                    self.store.insert(&id, &embedding.vector, text)?;
                    report.inserted.push(id);
                }
                Err(e) => self.record_failure(&mut report, index, text, e)?,
            }
        }

        tracing::info!(
            inserted = report.inserted.len(),
            skipped_blank = report.skipped_blank,
            failed = report.failed.len(),
            "Batch ingested"
        );
        Ok(report)
    }

    fn record_failure(
        &self,
        report: &mut IngestReport,
        index: usize,
        text: &str,
        error: PipelineError,
    ) -> Result<()> {
        match self.options.failure_policy {
            FailurePolicy::Abort => Err(error),
            FailurePolicy::SkipAndContinue => {
                tracing::warn!(index, "Skipping document: {}", error);
                report.failed.push(DocumentFailure {
                    index,
                    excerpt: excerpt(text),
                    error: error.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Read a UTF-8 file and ingest each blank-line-separated segment
    pub fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let contents = read_input(path)?;
        self.ingest_batch(split_documents(&contents))
    }

    fn cached_query(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let Some(cache) = &self.query_cache else {
            return Ok(None);
        };
        let mut cache = cache.lock().map_err(|_| PipelineError::CachePoisoned)?;
        Ok(cache.get(text).cloned())
    }

    fn remember_query(&self, text: &str, vector: &[f32]) -> Result<()> {
        if let Some(cache) = &self.query_cache {
            let mut cache = cache.lock().map_err(|_| PipelineError::CachePoisoned)?;
            cache.put(text.to_string(), vector.to_vec());
        }
        Ok(())
    }

    /// The `k` stored documents closest to `text`
    pub fn search(&self, text: &str, k: usize) -> Result<Vec<QueryResult>> {
        let vector = match self.cached_query(text)? {
            Some(vector) => vector,
            None => {
                let vector = self.embed_document(text)?.vector;
                self.remember_query(text, &vector)?;
                vector
            }
        };

        Ok(self.store.query(&vector, k)?)
    }

    /// Remove every stored document and forget cached queries
    pub fn flush(&self) -> Result<()> {
        self.store.flush()?;
        if let Some(cache) = &self.query_cache {
            cache.lock().map_err(|_| PipelineError::CachePoisoned)?.clear();
        }
        Ok(())
    }
}

// ============================================================================
// ASYNC ENTRY POINTS
// ============================================================================

impl<E: Embedder + 'static> Pipeline<E> {
    /// Embed on the blocking pool, bounded by the configured timeout
    ///
    /// A timed-out forward pass keeps running in the background until it
    /// finishes; only the caller stops waiting.
    pub async fn embed_with_timeout(self: &Arc<Self>, text: String) -> Result<Embedding> {
        let limit = self.options.embed_timeout;
        let pipeline = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || pipeline.embed_document(&text));

        match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined?,
            Err(_) => {
                tracing::warn!(?limit, "Embedding timed out");
                Err(PipelineError::Timeout(limit))
            }
        }
    }

    /// Async [`Pipeline::search`]
    pub async fn search_async(self: &Arc<Self>, text: String, k: usize) -> Result<Vec<QueryResult>> {
        let vector = match self.cached_query(&text)? {
            Some(vector) => vector,
            None => {
                let vector = self.embed_with_timeout(text.clone()).await?.vector;
                self.remember_query(&text, &vector)?;
                vector
            }
        };

        Ok(self.store.query(&vector, k)?)
    }

    /// Async [`Pipeline::ingest_batch`]; each embedding is individually timed
    pub async fn ingest_batch_async(self: &Arc<Self>, documents: Vec<String>) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for (index, text) in documents.into_iter().enumerate() {
            if is_blank(&text) {
                report.skipped_blank += 1;
                continue;
            }

            match self.embed_with_timeout(text.clone()).await {
                Ok(embedding) => {
                    let id = new_document_id();
                    self.store.insert(&id, &embedding.vector, &text)?;
                    report.inserted.push(id);
                }
                Err(e @ (PipelineError::Embedding { .. } | PipelineError::Timeout(_))) => {
                    self.record_failure(&mut report, index, &text, e)?
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            inserted = report.inserted.len(),
            skipped_blank = report.skipped_blank,
            failed = report.failed.len(),
            "Batch ingested"
        );
        Ok(report)
    }

    /// Async [`Pipeline::ingest_file`]
    pub async fn ingest_file_async(self: &Arc<Self>, path: &Path) -> Result<IngestReport> {
        let contents = read_input(path)?;
        let documents = split_documents(&contents).map(str::to_string).collect();
        self.ingest_batch_async(documents).await
    }
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// TESTS
// ============================================================================
