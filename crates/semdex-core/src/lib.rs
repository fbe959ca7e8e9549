//! # Semdex Core
//!
//! Local semantic document index. Text goes in, similar text comes out:
//!
//! - **Tokenization**: BERT WordPiece via HuggingFace `tokenizers`, no padding, no truncation
//! - **Embeddings**: BERT-base ONNX encoder via ONNX Runtime, 768 dimensions
//! - **Storage**: SQLite text and vector tables, written together in one transaction
//! - **Search**: exact top-k by squared L2 (or cosine) distance, optional HNSW candidates
//! - **Pipeline**: ingest files of blank-line-separated documents, query by text
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use semdex_core::{Pipeline, SemdexConfig};
//!
//! let config = SemdexConfig::from_env()?;
//! let pipeline = Pipeline::open(
//!     &config.runtime_options(),
//!     None, // in-memory store
//!     config.store_options(),
//!     config.pipeline_options(),
//! )?;
//!
//! pipeline.ingest_batch(["The cat sat on the mat.", "Stock markets rallied today."])?;
//! for hit in pipeline.search("A feline rested on a rug.", 3)? {
//!     println!("{:.4} {}", hit.distance, hit.text);
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): Compile SQLite into the binary
//! - `hnsw`: HNSW candidate generation with USearch
//! - `download`: Fetch missing `tokenizer.json` files from the Hugging Face hub

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod document;
pub mod embeddings;
pub mod pipeline;
pub mod search;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Documents
pub use document::{
    excerpt, is_blank, new_document_id, split_documents, Document, QueryResult,
    DOCUMENT_SEPARATOR,
};

// Embeddings
pub use embeddings::{
    Embedder, Embedding, EmbeddingError, EmbeddingRunner, EmbeddingRuntime, InferenceError,
    RuntimeOptions, TokenBatch, TokenizationError, TokenizerAdapter, EMBEDDING_DIMENSIONS,
};

// Search
pub use search::{IndexKind, Metric, VectorIndex, VectorIndexStats, VectorSearchError};

// Storage layer
pub use storage::{Store, StoreError, StoreOptions, StoreStats};

// Pipeline
pub use pipeline::{
    DocumentFailure, FailurePolicy, IngestReport, Pipeline, PipelineError, PipelineOptions,
};

// Configuration
pub use config::{ConfigError, SemdexConfig};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default vocabulary (WordPiece, lowercased)
pub const DEFAULT_EMBEDDING_MODEL: &str = embeddings::DEFAULT_TOKENIZER_MODEL;

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        Embedder, Embedding, FailurePolicy, IngestReport, Metric, Pipeline, PipelineError,
        QueryResult, SemdexConfig, Store, StoreError, StoreOptions,
    };
}
