//! Semantic Embeddings Module
//!
//! Provides local embedding generation using ONNX Runtime.
//! No external API calls required - 100% local and private.
//!
//! Supports:
//! - BERT WordPiece tokenization (no padding, no truncation)
//! - Fixed-signature encoder inference (768-dimensional vectors)
//! - Session pooling for parallel forward passes

mod local;
mod runner;
mod tokenizer;

pub use local::{
    cosine_similarity, squared_l2, Embedder, Embedding, EmbeddingError,
    EmbeddingRuntime, RuntimeOptions,
};

pub use runner::{
    first_token_state, EmbeddingRunner, InferenceError, ATTENTION_MASK, EMBEDDING_DIMENSIONS,
    INPUT_IDS, LAST_HIDDEN_STATE, TOKEN_TYPE_IDS,
};

pub use tokenizer::{
    cached_vocabulary_path, TokenBatch, TokenizationError, TokenizerAdapter,
    DEFAULT_TOKENIZER_MODEL, TOKENIZER_FILE,
};

#[cfg(test)]
pub(crate) use tokenizer::tests::TEST_VOCAB;
