//! Search Module
//!
//! Nearest-neighbor search over stored embeddings:
//! - Exact top-k scan with a fixed metric (squared L2 or cosine)
//! - Insertion-order tie-breaking
//! - Optional HNSW candidate generation using USearch

#[cfg(feature = "hnsw")]
mod hnsw;
mod vector;

pub use vector::{
    IndexKind, Metric, VectorIndex, VectorIndexConfig, VectorIndexStats, VectorSearchError,
    DEFAULT_DIMENSIONS, DEFAULT_OVERSAMPLE,
};

#[cfg(feature = "hnsw")]
pub use hnsw::{
    HnswCandidates, DEFAULT_CONNECTIVITY, DEFAULT_EXPANSION_ADD, DEFAULT_EXPANSION_SEARCH,
};
