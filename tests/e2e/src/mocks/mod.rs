//! Test doubles and fixtures

mod fixtures;

pub use fixtures::{
    file_contents, synthetic_vector, ConceptEmbedder, ANIMAL_AND_MARKETS, MIXED_TOPICS,
    POISON_MARKER,
};
