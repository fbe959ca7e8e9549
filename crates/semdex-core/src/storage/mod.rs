//! Storage Module
//!
//! SQLite-based storage layer with:
//! - Co-located text and vector tables written in one transaction
//! - In-memory nearest-neighbor index rebuilt on open
//! - Versioned schema migrations

mod migrations;
mod sqlite;

pub use migrations::{Migration, MIGRATIONS};
pub use sqlite::{default_db_path, Result, Store, StoreError, StoreOptions, StoreStats};
