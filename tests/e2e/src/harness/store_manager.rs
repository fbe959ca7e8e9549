//! Test Store Manager
//!
//! Provides isolated pipeline instances for testing:
//! - Temporary on-disk databases that are automatically cleaned up
//! - In-memory databases
//! - Reopening the same database to check persistence
//! - Writing input files next to the database

use std::path::{Path, PathBuf};
use std::sync::Arc;

use semdex_core::{Pipeline, PipelineOptions, Store, StoreOptions};
use tempfile::TempDir;

use crate::mocks::ConceptEmbedder;

/// Manager for test stores
///
/// Creates an isolated pipeline for each test to prevent interference.
/// The temporary directory is deleted when the manager is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let db = TestStoreManager::new_temp();
/// db.pipeline.ingest("The cat sat on the mat.")?;
/// let db = db.reopen();
/// assert_eq!(db.document_count(), 1);
/// ```
pub struct TestStoreManager {
    /// The pipeline under test
    pub pipeline: Arc<Pipeline<ConceptEmbedder>>,
    /// Temporary directory (kept alive to prevent premature deletion)
    temp_dir: TempDir,
    /// `None` for an in-memory store
    db_path: Option<PathBuf>,
    store_options: StoreOptions,
    pipeline_options: PipelineOptions,
}

impl TestStoreManager {
    /// Create a new on-disk store in a temporary directory
    pub fn new_temp() -> Self {
        Self::with_options(StoreOptions::default(), PipelineOptions::default())
    }

    /// Create an on-disk store with explicit options
    pub fn with_options(store_options: StoreOptions, pipeline_options: PipelineOptions) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test_semdex.db");
        let store = Store::new(Some(db_path.clone()), store_options.clone())
            .expect("Failed to create test store");

        Self::assemble(temp_dir, Some(db_path), store, store_options, pipeline_options)
    }

    /// Create an in-memory store
    pub fn new_in_memory() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store_options = StoreOptions::default();
        let store = Store::open_in_memory(store_options.clone()).expect("Failed to create test store");

        Self::assemble(temp_dir, None, store, store_options, PipelineOptions::default())
    }

    fn assemble(
        temp_dir: TempDir,
        db_path: Option<PathBuf>,
        store: Store,
        store_options: StoreOptions,
        pipeline_options: PipelineOptions,
    ) -> Self {
        let pipeline = Pipeline::new(ConceptEmbedder::new(), store, pipeline_options.clone())
            .expect("Failed to create test pipeline");

        Self {
            pipeline: Arc::new(pipeline),
            temp_dir,
            db_path,
            store_options,
            pipeline_options,
        }
    }

    /// Close the store and open the same database again
    ///
    /// Panics for in-memory stores, which cannot be reopened.
    pub fn reopen(self) -> Self {
        let db_path = self.db_path.clone().expect("In-memory stores cannot be reopened");
        let Self {
            pipeline,
            temp_dir,
            store_options,
            pipeline_options,
            ..
        } = self;
        drop(pipeline);

        let store = Store::new(Some(db_path.clone()), store_options.clone())
            .expect("Failed to reopen test store");
        Self::assemble(temp_dir, Some(db_path), store, store_options, pipeline_options)
    }

    /// Get the database path
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// The store behind the pipeline
    pub fn store(&self) -> &Store {
        self.pipeline.store()
    }

    /// Number of stored documents
    pub fn document_count(&self) -> usize {
        self.store().len().unwrap_or(0)
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.document_count() == 0
    }

    /// Write an input file into the temporary directory
    pub fn write_input(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, contents).expect("Failed to write input file");
        path
    }

    /// Ingest documents, returning their ids in order
    pub fn seed(&self, documents: &[&str]) -> Vec<String> {
        let report = self
            .pipeline
            .ingest_batch(documents.iter().copied())
            .expect("Failed to seed store");
        assert!(report.is_complete(), "seed documents failed: {:?}", report.failed);
        report.inserted
    }
}
