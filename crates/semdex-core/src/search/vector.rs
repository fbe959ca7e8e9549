//! Nearest-Neighbor Vector Index
//!
//! In-memory mirror of the stored vectors, kept in insertion order.
//!
//! Features:
//! - Exact brute-force scan by default (O(N·D) per query)
//! - Squared L2 or cosine distance, fixed when the index is created
//! - Deterministic ties: equal distances resolve to the earliest insert
//! - Optional HNSW candidate generation (`hnsw` feature), re-scored exactly

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::embeddings::{cosine_similarity, squared_l2, EMBEDDING_DIMENSIONS};

#[cfg(feature = "hnsw")]
use super::hnsw::HnswCandidates;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default vector width
pub const DEFAULT_DIMENSIONS: usize = EMBEDDING_DIMENSIONS;

/// Candidates fetched per requested result when HNSW is used
pub const DEFAULT_OVERSAMPLE: usize = 4;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector search error types
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum VectorSearchError {
    /// Failed to create the index
    IndexCreation(String),
    /// Failed to add a vector
    IndexAdd(String),
    /// Failed to search
    IndexSearch(String),
    /// Dimension mismatch (expected, got)
    InvalidDimensions(usize, usize),
    /// NaN or infinite component
    NonFinite,
    /// Key already indexed
    DuplicateKey(String),
}

impl std::fmt::Display for VectorSearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorSearchError::IndexCreation(e) => write!(f, "Index creation failed: {}", e),
            VectorSearchError::IndexAdd(e) => write!(f, "Failed to add vector: {}", e),
            VectorSearchError::IndexSearch(e) => write!(f, "Search failed: {}", e),
            VectorSearchError::InvalidDimensions(expected, got) => {
                write!(f, "Invalid dimensions: expected {}, got {}", expected, got)
            }
            VectorSearchError::NonFinite => write!(f, "Vector contains NaN or infinite values"),
            VectorSearchError::DuplicateKey(key) => write!(f, "Key already indexed: {}", key),
        }
    }
}

impl std::error::Error for VectorSearchError {}

// ============================================================================
// METRIC
// ============================================================================

/// Distance metric; smaller is more similar
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Squared Euclidean distance
    #[default]
    L2,
    /// Cosine distance, `1 - cos(a, b)`
    Cosine,
}

impl Metric {
    /// Distance between two equal-length vectors
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2 => squared_l2(a, b),
            // Rounding can push identical vectors slightly below zero
            Metric::Cosine => (1.0 - cosine_similarity(a, b)).max(0.0),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::L2 => write!(f, "l2"),
            Metric::Cosine => write!(f, "cosine"),
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "l2" | "l2sq" | "euclidean" => Ok(Metric::L2),
            "cosine" | "cos" => Ok(Metric::Cosine),
            _ => Err(format!("Unknown metric: {}", s)),
        }
    }
}

/// Where query candidates come from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Every stored vector is scored
    #[default]
    Exact,
    /// HNSW proposes candidates, which are then scored exactly
    ///
    /// Returned distances are exact; recall is approximate, so a true
    /// neighbor the graph misses can be absent from the result.
    Hnsw,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKind::Exact => write!(f, "exact"),
            IndexKind::Hnsw => write!(f, "hnsw"),
        }
    }
}

impl std::str::FromStr for IndexKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" | "flat" => Ok(IndexKind::Exact),
            "hnsw" => Ok(IndexKind::Hnsw),
            _ => Err(format!("Unknown index kind: {}", s)),
        }
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for vector index
#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    /// Number of dimensions
    pub dimensions: usize,
    /// Distance metric
    pub metric: Metric,
    /// Candidate generation strategy
    pub kind: IndexKind,
    /// HNSW candidates per requested result
    pub oversample: usize,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            metric: Metric::L2,
            kind: IndexKind::Exact,
            oversample: DEFAULT_OVERSAMPLE,
        }
    }
}

/// Index statistics
#[derive(Debug, Clone, Serialize)]
pub struct VectorIndexStats {
    /// Total number of vectors
    pub total_vectors: usize,
    /// Vector dimensions
    pub dimensions: usize,
    /// Distance metric
    pub metric: Metric,
    /// Candidate generation strategy
    pub kind: IndexKind,
}

// ============================================================================
// VECTOR INDEX
// ============================================================================

struct IndexEntry {
    key: String,
    seq: u64,
    vector: Vec<f32>,
}

/// Vector index answering top-k queries with exact distances
pub struct VectorIndex {
    config: VectorIndexConfig,
    /// Ordered by `seq`, i.e. insertion order
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
    next_seq: u64,
    #[cfg(feature = "hnsw")]
    hnsw: Option<HnswCandidates>,
}

impl VectorIndex {
    /// Create a new vector index with default configuration
    pub fn new() -> Result<Self, VectorSearchError> {
        Self::with_config(VectorIndexConfig::default())
    }

    /// Create a new vector index with custom configuration
    pub fn with_config(config: VectorIndexConfig) -> Result<Self, VectorSearchError> {
        if config.dimensions == 0 {
            return Err(VectorSearchError::IndexCreation(
                "dimensions must be positive".to_string(),
            ));
        }

        #[cfg(feature = "hnsw")]
        let hnsw = match config.kind {
            IndexKind::Hnsw => Some(HnswCandidates::new(config.dimensions, config.metric)?),
            IndexKind::Exact => None,
        };

        #[cfg(not(feature = "hnsw"))]
        if config.kind == IndexKind::Hnsw {
            return Err(VectorSearchError::IndexCreation(
                "HNSW requires the `hnsw` feature".to_string(),
            ));
        }

        Ok(Self {
            config,
            entries: Vec::new(),
            positions: HashMap::new(),
            next_seq: 0,
            #[cfg(feature = "hnsw")]
            hnsw,
        })
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the dimensions of the index
    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// Get the distance metric
    pub fn metric(&self) -> Metric {
        self.config.metric
    }

    /// Check if a key exists in the index
    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    /// Check a vector against the index shape without inserting it
    pub fn validate(&self, vector: &[f32]) -> Result<(), VectorSearchError> {
        if vector.len() != self.config.dimensions {
            return Err(VectorSearchError::InvalidDimensions(
                self.config.dimensions,
                vector.len(),
            ));
        }
        if !vector.iter().all(|x| x.is_finite()) {
            return Err(VectorSearchError::NonFinite);
        }
        Ok(())
    }

    /// Append a vector under a new key
    pub fn add(&mut self, key: &str, vector: &[f32]) -> Result<(), VectorSearchError> {
        self.validate(vector)?;
        if self.contains(key) {
            return Err(VectorSearchError::DuplicateKey(key.to_string()));
        }

        let seq = self.next_seq;

        #[cfg(feature = "hnsw")]
        if let Some(hnsw) = self.hnsw.as_mut() {
            hnsw.add(seq, vector)?;
        }

        self.next_seq += 1;
        self.positions.insert(key.to_string(), self.entries.len());
        self.entries.push(IndexEntry {
            key: key.to_string(),
            seq,
            vector: vector.to_vec(),
        });

        Ok(())
    }

    /// Remove a vector by key
    pub fn remove(&mut self, key: &str) -> Result<bool, VectorSearchError> {
        let Some(pos) = self.positions.remove(key) else {
            return Ok(false);
        };

        let entry = self.entries.remove(pos);

        #[cfg(feature = "hnsw")]
        if let Some(hnsw) = self.hnsw.as_mut() {
            hnsw.remove(entry.seq)?;
        }
        #[cfg(not(feature = "hnsw"))]
        let _ = entry;

        for (i, shifted) in self.entries.iter().enumerate().skip(pos) {
            self.positions.insert(shifted.key.clone(), i);
        }

        Ok(true)
    }

    /// Drop every vector, keeping the configuration
    pub fn clear(&mut self) -> Result<(), VectorSearchError> {
        self.entries.clear();
        self.positions.clear();

        #[cfg(feature = "hnsw")]
        if self.hnsw.is_some() {
            self.hnsw = Some(HnswCandidates::new(self.config.dimensions, self.config.metric)?);
        }

        Ok(())
    }

    /// The `limit` nearest vectors, ascending by distance
    ///
    /// Ties resolve to the earlier insert.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(String, f32)>, VectorSearchError> {
        self.validate(query)?;

        if self.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let mut scored: Vec<(usize, f32)> = self
            .candidate_positions(query, limit)?
            .into_iter()
            .map(|pos| (pos, self.config.metric.distance(query, &self.entries[pos].vector)))
            .collect();

        let by_distance_then_age = |a: &(usize, f32), b: &(usize, f32)| -> Ordering {
            a.1.total_cmp(&b.1)
                .then_with(|| self.entries[a.0].seq.cmp(&self.entries[b.0].seq))
        };

        if scored.len() > limit {
            scored.select_nth_unstable_by(limit - 1, by_distance_then_age);
            scored.truncate(limit);
        }
        scored.sort_by(by_distance_then_age);

        Ok(scored
            .into_iter()
            .map(|(pos, distance)| (self.entries[pos].key.clone(), distance))
            .collect())
    }

    #[cfg(not(feature = "hnsw"))]
    fn candidate_positions(&self, _query: &[f32], _limit: usize) -> Result<Vec<usize>, VectorSearchError> {
        Ok((0..self.entries.len()).collect())
    }

    #[cfg(feature = "hnsw")]
    fn candidate_positions(&self, query: &[f32], limit: usize) -> Result<Vec<usize>, VectorSearchError> {
        let Some(hnsw) = self.hnsw.as_ref() else {
            return Ok((0..self.entries.len()).collect());
        };

        let wanted = limit.saturating_mul(self.config.oversample.max(1));
        let seqs = hnsw.candidates(query, wanted)?;

        // entries are sorted by seq, so a binary search maps seq -> position
        Ok(seqs
            .into_iter()
            .filter_map(|seq| self.entries.binary_search_by_key(&seq, |e| e.seq).ok())
            .collect())
    }

    /// Get index statistics
    pub fn stats(&self) -> VectorIndexStats {
        VectorIndexStats {
            total_vectors: self.len(),
            dimensions: self.config.dimensions,
            metric: self.config.metric,
            kind: self.config.kind,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
