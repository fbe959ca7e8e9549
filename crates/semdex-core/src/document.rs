//! Document records and input splitting

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separator between documents in an input file
pub const DOCUMENT_SEPARATOR: &str = "\n\n";

/// Longest text excerpt carried inside an error, in characters
pub const EXCERPT_CHARS: usize = 48;

/// A stored document: identity, verbatim text, and its vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Opaque unique id, immutable once assigned
    pub id: String,
    /// Original text, stored verbatim
    pub text: String,
    /// Fixed-width embedding of `text`
    pub embedding: Vec<f32>,
}

/// One hit from a nearest-neighbor query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub id: String,
    pub text: String,
    /// Non-negative; smaller is more similar
    pub distance: f32,
}

/// Fresh document id (UUID v4, 122 random bits)
pub fn new_document_id() -> String {
    Uuid::new_v4().to_string()
}

/// Split file contents into segments on blank-line boundaries
///
/// Segments are returned verbatim, blank ones included; ingestion skips and
/// counts those (see [`is_blank`]), so runs of blank lines never produce a
/// document.
pub fn split_documents(contents: &str) -> impl Iterator<Item = &str> {
    contents.split(DOCUMENT_SEPARATOR)
}

/// True for empty or whitespace-only text
#[inline]
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Short single-line preview of `text` for logs and errors
pub fn excerpt(text: &str) -> String {
    let flat: String = text
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();

    match flat.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}
