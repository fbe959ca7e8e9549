//! Tokenizer Adapter
//!
//! Wraps a HuggingFace `tokenizer.json` (WordPiece for `bert-base-uncased` by
//! default) and produces the three aligned id sequences the encoder consumes.
//!
//! No padding and no truncation are applied: one text is one `[1, L]` row.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokenizers::Tokenizer;

use crate::document::excerpt;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Vocabulary used when none is configured
pub const DEFAULT_TOKENIZER_MODEL: &str = "bert-base-uncased";

/// File name of a serialized HuggingFace tokenizer
pub const TOKENIZER_FILE: &str = "tokenizer.json";

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Tokenization error types
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum TokenizationError {
    /// No vocabulary file in the local cache
    #[error("Vocabulary for '{model}' not found at {path}")]
    VocabularyMissing { model: String, path: PathBuf },
    /// Vocabulary file exists but could not be parsed
    #[error("Failed to load vocabulary from {source_name}: {reason}")]
    VocabularyLoad { source_name: String, reason: String },
    /// Blank input
    #[error("Cannot tokenize empty text")]
    EmptyInput,
    /// The encoder rejected the text
    #[error("Failed to tokenize \"{excerpt}\": {reason}")]
    Encode { excerpt: String, reason: String },
    /// The encoder accepted the text but emitted nothing
    #[error("Text \"{excerpt}\" produced no tokens")]
    NoTokens { excerpt: String },
}

// ============================================================================
// TOKEN BATCH
// ============================================================================

/// Token ids and derived masks for a single text
///
/// Created per embedding call and dropped after the forward pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBatch {
    /// Vocabulary ids, in order
    pub ids: Vec<i64>,
    /// 1 for every real token (nothing is padded)
    pub attention_mask: Vec<i64>,
    /// Segment ids (token_type_ids), all zero for single-segment text
    pub segment_ids: Vec<i64>,
}

impl TokenBatch {
    /// Build a batch for a single segment from raw vocabulary ids
    pub fn single_segment(ids: Vec<i64>) -> Self {
        let len = ids.len();
        Self {
            ids,
            attention_mask: vec![1; len],
            segment_ids: vec![0; len],
        }
    }

    /// Number of tokens (L)
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when no tokens were produced
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// All three sequences share one length
    pub fn is_aligned(&self) -> bool {
        self.ids.len() == self.attention_mask.len() && self.ids.len() == self.segment_ids.len()
    }
}

// ============================================================================
// ADAPTER
// ============================================================================

/// Location of a cached vocabulary: `<cache_dir>/<model>/tokenizer.json`
///
/// Hub-style names (`org/model`) are flattened to `org--model`.
pub fn cached_vocabulary_path(cache_dir: &Path, model_name: &str) -> PathBuf {
    cache_dir
        .join(model_name.replace('/', "--"))
        .join(TOKENIZER_FILE)
}

/// Loaded vocabulary plus the encoding policy
pub struct TokenizerAdapter {
    tokenizer: Tokenizer,
    model_name: String,
}

impl std::fmt::Debug for TokenizerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenizerAdapter")
            .field("model_name", &self.model_name)
            .finish_non_exhaustive()
    }
}

impl TokenizerAdapter {
    /// Load from an explicit `tokenizer.json` path
    pub fn from_file(model_name: &str, path: &Path) -> Result<Self, TokenizationError> {
        if !path.exists() {
            return Err(TokenizationError::VocabularyMissing {
                model: model_name.to_string(),
                path: path.to_path_buf(),
            });
        }

        let tokenizer =
            Tokenizer::from_file(path).map_err(|e| TokenizationError::VocabularyLoad {
                source_name: path.display().to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(model = model_name, path = %path.display(), "Vocabulary loaded");
        Self::with_tokenizer(model_name, tokenizer)
    }

    /// Load from the contents of a `tokenizer.json`
    pub fn from_json(model_name: &str, json: &str) -> Result<Self, TokenizationError> {
        let tokenizer =
            Tokenizer::from_str(json).map_err(|e| TokenizationError::VocabularyLoad {
                source_name: format!("inline vocabulary for '{}'", model_name),
                reason: e.to_string(),
            })?;
        Self::with_tokenizer(model_name, tokenizer)
    }

    /// Fetch-or-load the vocabulary for `model_name` from the local cache
    ///
    /// With the `download` feature a cache miss is filled from the Hugging Face
    /// hub and written back to the cache; without it a miss is an error.
    pub fn from_cache(model_name: &str, cache_dir: &Path) -> Result<Self, TokenizationError> {
        let path = cached_vocabulary_path(cache_dir, model_name);
        if path.exists() {
            return Self::from_file(model_name, &path);
        }

        #[cfg(feature = "download")]
        {
            tracing::info!(model = model_name, "Vocabulary not cached, fetching from hub");
            let tokenizer = Tokenizer::from_pretrained(model_name, None).map_err(|e| {
                TokenizationError::VocabularyLoad {
                    source_name: format!("hub:{}", model_name),
                    reason: e.to_string(),
                }
            })?;

            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!("Failed to create vocabulary cache {:?}: {}", parent, e);
                }
            }
            if let Err(e) = tokenizer.save(&path, false) {
                tracing::warn!("Failed to cache vocabulary at {:?}: {}", path, e);
            }

            Self::with_tokenizer(model_name, tokenizer)
        }

        #[cfg(not(feature = "download"))]
        Err(TokenizationError::VocabularyMissing {
            model: model_name.to_string(),
            path,
        })
    }

    fn with_tokenizer(model_name: &str, mut tokenizer: Tokenizer) -> Result<Self, TokenizationError> {
        // A serialized tokenizer may carry its own padding/truncation; both are off here.
        tokenizer
            .with_truncation(None)
            .map_err(|e| TokenizationError::VocabularyLoad {
                source_name: model_name.to_string(),
                reason: e.to_string(),
            })?;
        tokenizer.with_padding(None);

        Ok(Self {
            tokenizer,
            model_name: model_name.to_string(),
        })
    }

    /// Vocabulary name
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Size of the loaded vocabulary, including added tokens
    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    /// Tokenize one text into a single-segment batch
    pub fn tokenize(&self, text: &str) -> Result<TokenBatch, TokenizationError> {
        if text.trim().is_empty() {
            return Err(TokenizationError::EmptyInput);
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| TokenizationError::Encode {
                excerpt: excerpt(text),
                reason: e.to_string(),
            })?;

        let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        if ids.is_empty() {
            return Err(TokenizationError::NoTokens {
                excerpt: excerpt(text),
            });
        }

        Ok(TokenBatch::single_segment(ids))
    }
}

// ============================================================================
// TESTS
// ============================================================================
