//! HNSW candidate generation
//!
//! Uses USearch for HNSW (Hierarchical Navigable Small World) indexing.
//! Only proposes keys; the caller re-scores them against the stored vectors.

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::vector::{Metric, VectorSearchError};

/// HNSW connectivity parameter (higher = better recall, more memory)
pub const DEFAULT_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building
pub const DEFAULT_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search (higher = better recall, slower)
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

/// USearch graph keyed by insertion sequence number
pub struct HnswCandidates {
    index: Index,
}

impl HnswCandidates {
    pub fn new(dimensions: usize, metric: Metric) -> Result<Self, VectorSearchError> {
        let options = IndexOptions {
            dimensions,
            metric: match metric {
                Metric::L2 => MetricKind::L2sq,
                Metric::Cosine => MetricKind::Cos,
            },
            // Full precision; candidates are re-scored anyway
            quantization: ScalarKind::F32,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
            multi: false,
        };

        let index =
            Index::new(&options).map_err(|e| VectorSearchError::IndexCreation(e.to_string()))?;

        Ok(Self { index })
    }

    pub fn add(&mut self, seq: u64, vector: &[f32]) -> Result<(), VectorSearchError> {
        // usearch requires reserve() to be called before add() to avoid segfaults
        let capacity = self.index.capacity();
        if self.index.size() >= capacity {
            self.index
                .reserve(std::cmp::max(capacity * 2, 16))
                .map_err(|e| VectorSearchError::IndexAdd(format!("Failed to reserve capacity: {}", e)))?;
        }

        self.index
            .add(seq, vector)
            .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))
    }

    pub fn remove(&mut self, seq: u64) -> Result<(), VectorSearchError> {
        self.index
            .remove(seq)
            .map(|_| ())
            .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))
    }

    /// Up to `count` sequence numbers near `query`
    pub fn candidates(&self, query: &[f32], count: usize) -> Result<Vec<u64>, VectorSearchError> {
        if self.index.size() == 0 {
            return Ok(vec![]);
        }

        let matches = self
            .index
            .search(query, count)
            .map_err(|e| VectorSearchError::IndexSearch(e.to_string()))?;

        Ok(matches.keys)
    }
}
