//! Test Data Fixtures
//!
//! Provides a deterministic stand-in for the ONNX encoder plus small corpora:
//! - `ConceptEmbedder`: synonyms share an axis, so meaning-based ranking is predictable
//! - Corpora for the common journeys
//! - Synthetic vectors for ordering and load tests

use std::sync::atomic::{AtomicUsize, Ordering};

use semdex_core::{Embedder, Embedding, EmbeddingError, TokenizationError, EMBEDDING_DIMENSIONS};

/// Documents containing this word fail to embed
pub const POISON_MARKER: &str = "poison";

/// The two-document corpus from the reference walkthrough
pub const ANIMAL_AND_MARKETS: &[&str] = &["The cat sat on the mat.", "Stock markets rallied today."];

/// One document per concept
pub const MIXED_TOPICS: &[&str] = &[
    "The cat sat on the mat.",
    "Stock markets rallied today.",
    "Heavy rain and wind are forecast for tomorrow.",
    "Simmer the onions before adding garlic.",
    "The compiler rejected the borrowed reference.",
];

/// Words on the same axis are treated as synonyms
const CONCEPTS: &[&[&str]] = &[
    &["cat", "cats", "feline", "kitten", "dog", "puppy", "animal"],
    &["sat", "rested", "lay", "mat", "rug", "carpet", "sofa"],
    &["stock", "stocks", "markets", "market", "rallied", "shares", "investors"],
    &["rain", "wind", "storm", "forecast", "weather", "sunny"],
    &["simmer", "onions", "garlic", "recipe", "bake", "oven"],
    &["compiler", "borrowed", "reference", "rust", "program", "code"],
];

/// Axis collecting every word outside the lexicon
const OTHER_AXIS: usize = EMBEDDING_DIMENSIONS - 1;

/// Deterministic 768-dimensional embedder
///
/// Each known word adds 1.0 on its concept's axis; unknown words add 0.1 on a
/// shared axis. Texts containing [`POISON_MARKER`] fail with a tokenization
/// error.
#[derive(Debug, Default)]
pub struct ConceptEmbedder {
    calls: AtomicUsize,
}

impl ConceptEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `embed` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for ConceptEmbedder {
    fn model_name(&self) -> &str {
        "concept-lexicon"
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if text.contains(POISON_MARKER) {
            return Err(TokenizationError::NoTokens {
                excerpt: semdex_core::excerpt(text),
            }
            .into());
        }

        let mut vector = vec![0.0f32; EMBEDDING_DIMENSIONS];
        for raw in text.split_whitespace() {
            let word: String = raw
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            match CONCEPTS.iter().position(|words| words.contains(&word.as_str())) {
                Some(axis) => vector[axis] += 1.0,
                None => vector[OTHER_AXIS] += 0.1,
            }
        }

        Ok(Embedding::new(vector))
    }
}

/// Join documents the way an input file separates them
pub fn file_contents(documents: &[&str]) -> String {
    documents.join("\n\n")
}

/// Deterministic pseudo-random vector
pub fn synthetic_vector(seed: usize, dimensions: usize) -> Vec<f32> {
    (0..dimensions)
        .map(|j| (((seed + 1) * 7919 + j * 104_729) as f32 * 0.0001).sin())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonyms_share_axes() {
        let embedder = ConceptEmbedder::new();
        let a = embedder.embed("The cat sat on the mat.").unwrap();
        let b = embedder.embed("A feline rested on a rug.").unwrap();
        assert_eq!(a.vector[0], b.vector[0]);
        assert_eq!(a.vector[1], b.vector[1]);
        assert_eq!(a.dimensions, EMBEDDING_DIMENSIONS);
    }

    #[test]
    fn test_poison_fails() {
        let embedder = ConceptEmbedder::new();
        assert!(embedder.embed("a poison pill").is_err());
        assert_eq!(embedder.calls(), 1);
    }
}
