//! Local Semantic Embeddings
//!
//! The runtime context that turns text into vectors: a loaded vocabulary plus
//! a pool of ONNX sessions, built once and owned by the pipeline.
//!
//! ## Models
//!
//! - **Default**: `bert-base-uncased` vocabulary with a quantized BERT-base
//!   ONNX export (`model_quantized.onnx`), 768 dimensions

use std::path::{Path, PathBuf};

use super::runner::{EMBEDDING_DIMENSIONS, EmbeddingRunner, InferenceError};
use super::tokenizer::{TokenizationError, TokenizerAdapter};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Text could not be turned into tokens
    #[error("Tokenization failed: {0}")]
    Tokenization(#[from] TokenizationError),
    /// Forward pass failed
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),
}

// ============================================================================
// EMBEDDING TYPE
// ============================================================================

/// A semantic embedding vector
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The embedding vector
    pub vector: Vec<f32>,
    /// Dimensions of the vector
    pub dimensions: usize,
}

impl Embedding {
    /// Create a new embedding from a vector
    pub fn new(vector: Vec<f32>) -> Self {
        let dimensions = vector.len();
        Self { vector, dimensions }
    }

    /// True when every component is finite
    pub fn is_finite(&self) -> bool {
        self.vector.iter().all(|x| x.is_finite())
    }

    /// Convert to bytes for storage (little-endian f32)
    pub fn to_bytes(&self) -> Vec<u8> {
        self.vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let vector: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some(Self::new(vector))
    }
}

// ============================================================================
// EMBEDDER SEAM
// ============================================================================

/// Anything that maps text to a fixed-width vector
///
/// Index time and query time must go through the same implementation; the
/// pipeline holds exactly one.
pub trait Embedder: Send + Sync {
    /// Name recorded alongside stored vectors
    fn model_name(&self) -> &str;

    /// Width of every vector this embedder returns
    fn dimensions(&self) -> usize;

    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;
}

// ============================================================================
// EMBEDDING RUNTIME
// ============================================================================

/// Paths and sizing for an [`EmbeddingRuntime`]
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Vocabulary name, also the cache key
    pub tokenizer_model: String,
    /// Explicit `tokenizer.json`; overrides the cache lookup
    pub tokenizer_path: Option<PathBuf>,
    /// Directory holding `<model>/tokenizer.json`
    pub cache_dir: PathBuf,
    /// ONNX model file
    pub model_path: PathBuf,
    /// Number of pooled sessions (parallel forward passes)
    pub sessions: usize,
    /// Intra-op threads per session
    pub intra_threads: usize,
}

/// Tokenizer + ONNX runner, initialized once and shared read-only
#[derive(Debug)]
pub struct EmbeddingRuntime {
    tokenizer: TokenizerAdapter,
    runner: EmbeddingRunner,
}

impl EmbeddingRuntime {
    /// Load the vocabulary and the model sessions
    pub fn new(options: &RuntimeOptions) -> Result<Self, EmbeddingError> {
        let tokenizer = match &options.tokenizer_path {
            Some(path) => TokenizerAdapter::from_file(&options.tokenizer_model, path)?,
            None => TokenizerAdapter::from_cache(&options.tokenizer_model, &options.cache_dir)?,
        };
        let runner = EmbeddingRunner::new(&options.model_path, options.sessions, options.intra_threads)?;

        Ok(Self { tokenizer, runner })
    }

    /// Model file backing the sessions
    pub fn model_path(&self) -> &Path {
        self.runner.model_path()
    }
}

impl Embedder for EmbeddingRuntime {
    fn model_name(&self) -> &str {
        self.tokenizer.model_name()
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let batch = self.tokenizer.tokenize(text)?;
        tracing::debug!(tokens = batch.len(), "Running encoder");
        let vector = self.runner.embed(&batch)?;
        Ok(Embedding::new(vector))
    }
}

// ============================================================================
// SIMILARITY FUNCTIONS
// ============================================================================

/// Compute cosine similarity between two vectors
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        dot_product / denominator
    } else {
        0.0
    }
}

/// Compute squared Euclidean distance between two vectors
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::MAX;
    }

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

// ============================================================================
// TESTS
// ============================================================================
