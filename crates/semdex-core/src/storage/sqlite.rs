//! SQLite Storage Implementation
//!
//! Document text and vectors in two SQLite tables, mirrored by an in-memory
//! vector index for nearest-neighbor queries.

use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use directories::ProjectDirs;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;

use crate::document::{Document, QueryResult};
use crate::embeddings::{Embedding, EMBEDDING_DIMENSIONS};
use crate::search::{IndexKind, Metric, VectorIndex, VectorIndexConfig, VectorSearchError};

/// Id reported in errors caused by a query vector rather than a stored one
const QUERY_VECTOR_ID: &str = "<query>";

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Id already present
    #[error("Document already exists: {id}")]
    DuplicateKey { id: String },
    /// Vector width differs from the store's
    #[error("Embedding for {id} has {got} dimensions, store expects {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        got: usize,
    },
    /// NaN or infinite component
    #[error("Embedding for {id} contains NaN or infinite values")]
    NonFinite { id: String },
    /// A vector row has no text row; the store is corrupt
    #[error("Vector {id} has no matching text row")]
    MissingText { id: String },
    /// Document not found
    #[error("Document not found: {0}")]
    NotFound(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Store was created with different fixed settings
    #[error("Store was created with {key} = {stored}, requested {requested}")]
    MetaMismatch {
        key: String,
        stored: String,
        requested: String,
    },
    /// In-memory index failure
    #[error("Vector index error: {0}")]
    Index(String),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Store result type
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// OPTIONS & STATS
// ============================================================================

/// Settings fixed at store creation
///
/// `metric` and `embedding_model` are requests: `None` adopts whatever the
/// store recorded when it was created. An explicit value that disagrees with
/// the recorded one fails with [`StoreError::MetaMismatch`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Vector width
    pub dimensions: usize,
    /// Distance metric; a new store with `None` uses [`Metric::L2`]
    pub metric: Option<Metric>,
    /// Candidate generation strategy (not persisted)
    pub index_kind: IndexKind,
    /// Model that produced the vectors
    pub embedding_model: Option<String>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            dimensions: EMBEDDING_DIMENSIONS,
            metric: None,
            index_kind: IndexKind::Exact,
            embedding_model: None,
        }
    }
}

/// Store statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Rows in the text table
    pub documents: i64,
    /// Vectors in the in-memory index
    pub indexed_vectors: usize,
    pub dimensions: usize,
    pub metric: Metric,
    pub index_kind: IndexKind,
    pub embedding_model: Option<String>,
    pub sqlite_version: String,
    pub schema_version: u32,
    /// `None` for an in-memory store
    pub path: Option<PathBuf>,
}

/// Default database location: `<platform data dir>/semdex.db`
pub fn default_db_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "semdex", "semdex")
        .ok_or_else(|| StoreError::Init("Could not determine project directories".to_string()))?;

    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;
    // Restrict directory permissions to owner-only on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        let _ = std::fs::set_permissions(data_dir, perms);
    }
    Ok(data_dir.join("semdex.db"))
}

// ============================================================================
// STORE
// ============================================================================

/// Durable `(id, embedding, text)` store with top-k similarity queries
///
/// All methods take `&self`; the store is `Send + Sync`. Locks are always
/// taken index first, connection second. Writers hold the index write lock
/// across the SQLite commit, so a query never sees a vector whose text row is
/// not yet committed, and queries observe the last completed write.
pub struct Store {
    conn: Mutex<Connection>,
    index: RwLock<VectorIndex>,
    options: StoreOptions,
    path: Option<PathBuf>,
}

impl Store {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        Ok(())
    }

    /// Open (or create) a store on disk; `None` uses [`default_db_path`]
    pub fn new(db_path: Option<PathBuf>, options: StoreOptions) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => default_db_path()?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;

        // Restrict database file permissions to owner-only on Unix
        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::init(conn, options, Some(path))
    }

    /// Open a store that lives only as long as this value
    pub fn open_in_memory(options: StoreOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, options, None)
    }

    fn init(conn: Connection, mut options: StoreOptions, path: Option<PathBuf>) -> Result<Self> {
        Self::configure_connection(&conn)?;
        super::migrations::apply_migrations(&conn)?;
        let metric = Self::reconcile_meta(&conn, &mut options)?;

        let index = VectorIndex::with_config(VectorIndexConfig {
            dimensions: options.dimensions,
            metric,
            kind: options.index_kind,
            ..Default::default()
        })
        .map_err(|e| StoreError::Init(format!("Failed to create vector index: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            index: RwLock::new(index),
            options,
            path,
        };

        store.load_vectors_into_index()?;

        tracing::info!(
            sqlite_version = rusqlite::version(),
            documents = store.len()?,
            metric = %metric,
            path = ?store.path,
            "Store opened"
        );

        Ok(store)
    }

    /// Record fixed settings on first open, reject conflicting ones later
    ///
    /// Fills unset requests in `options` from the recorded values and returns
    /// the metric the store uses.
    fn reconcile_meta(conn: &Connection, options: &mut StoreOptions) -> Result<Metric> {
        reconcile_key(conn, "dimensions", Some(options.dimensions.to_string()))?;

        let requested = options.metric.map(|m| m.to_string());
        let metric = match reconcile_key(conn, "metric", requested)? {
            Some(stored) => stored.parse::<Metric>().map_err(StoreError::Init)?,
            None => {
                let metric = Metric::default();
                reconcile_key(conn, "metric", Some(metric.to_string()))?;
                metric
            }
        };
        options.metric = Some(metric);

        options.embedding_model = reconcile_key(conn, "embedding_model", options.embedding_model.take())?;

        Ok(metric)
    }

    /// Rebuild the in-memory index from the vector table, in insertion order
    ///
    /// A vector that cannot be decoded or indexed fails the open; its text
    /// would otherwise be stored but unreachable by any query.
    fn load_vectors_into_index(&self) -> Result<()> {
        let rows: Vec<(String, Vec<u8>)> = {
            let conn = self.lock_conn()?;
            let mut stmt = conn.prepare("SELECT id, embedding FROM document_vectors ORDER BY seq")?;
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<_>>()?
        };

        let mut index = self.write_index()?;
        for (id, bytes) in rows {
            let embedding = Embedding::from_bytes(&bytes).ok_or_else(|| {
                tracing::error!(id = %id, bytes = bytes.len(), "Unreadable stored embedding");
                StoreError::Index(format!("Stored embedding for {} is not a whole number of f32 values", id))
            })?;
            index.add(&id, &embedding.vector).map_err(|e| {
                tracing::error!(id = %id, "Stored embedding rejected by index: {}", e);
                StoreError::Index(format!("Failed to load embedding for {}: {}", id, e))
            })?;
        }

        Ok(())
    }

    /// Tie the stored vectors to the model that embeds new text and queries
    ///
    /// Records `model` if the store has none yet; otherwise it must match.
    pub fn bind_embedding_model(&self, model: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        reconcile_key(&conn, "embedding_model", Some(model.to_string()))?;
        Ok(())
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Init("Connection lock poisoned".into()))
    }

    fn read_index(&self) -> Result<std::sync::RwLockReadGuard<'_, VectorIndex>> {
        self.index
            .read()
            .map_err(|_| StoreError::Init("Vector index lock poisoned".into()))
    }

    fn write_index(&self) -> Result<std::sync::RwLockWriteGuard<'_, VectorIndex>> {
        self.index
            .write()
            .map_err(|_| StoreError::Init("Vector index lock poisoned".into()))
    }

    fn vector_error(id: &str, error: VectorSearchError) -> StoreError {
        match error {
            VectorSearchError::InvalidDimensions(expected, got) => StoreError::DimensionMismatch {
                id: id.to_string(),
                expected,
                got,
            },
            VectorSearchError::NonFinite => StoreError::NonFinite { id: id.to_string() },
            VectorSearchError::DuplicateKey(id) => StoreError::DuplicateKey { id },
            other => StoreError::Index(other.to_string()),
        }
    }

    /// Settings this store was opened with
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Number of indexed documents
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_index()?.len())
    }

    /// True when nothing is indexed
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether `id` is stored
    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.read_index()?.contains(id))
    }

    /// Write the text row and the vector row as one unit
    ///
    /// Fails with [`StoreError::DuplicateKey`] if `id` exists.
    pub fn insert(&self, id: &str, embedding: &[f32], text: &str) -> Result<()> {
        let mut index = self.write_index()?;
        index
            .validate(embedding)
            .map_err(|e| Self::vector_error(id, e))?;
        if index.contains(id) {
            return Err(StoreError::DuplicateKey { id: id.to_string() });
        }

        let bytes = Embedding::new(embedding.to_vec()).to_bytes();

        {
            let mut conn = self.lock_conn()?;
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO documents (id, text, created_at) VALUES (?1, ?2, ?3)",
                params![id, text, Utc::now().to_rfc3339()],
            )
            .map_err(|e| duplicate_or(e, id))?;
            tx.execute(
                "INSERT INTO document_vectors (id, embedding, dimensions) VALUES (?1, ?2, ?3)",
                params![id, bytes, embedding.len() as i64],
            )
            .map_err(|e| duplicate_or(e, id))?;
            tx.commit()?;
        }

        if let Err(e) = index.add(id, embedding) {
            // Keep the tables and the index in agreement
            tracing::error!(id = %id, "Index rejected committed vector: {}", e);
            let conn = self.lock_conn()?;
            conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
            return Err(Self::vector_error(id, e));
        }

        tracing::debug!(id = %id, "Document inserted");
        Ok(())
    }

    /// The `k` nearest documents to `embedding`, ascending by distance
    ///
    /// An empty store yields an empty list. A vector without a text row is a
    /// [`StoreError::MissingText`], never silently dropped.
    pub fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryResult>> {
        let index = self.read_index()?;
        let hits = index
            .search(embedding, k)
            .map_err(|e| Self::vector_error(QUERY_VECTOR_ID, e))?;

        if hits.is_empty() {
            return Ok(vec![]);
        }

        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT text FROM documents WHERE id = ?1")?;

        let mut results = Vec::with_capacity(hits.len());
        for (id, distance) in hits {
            let text: Option<String> = stmt.query_row(params![id], |row| row.get(0)).optional()?;
            match text {
                Some(text) => results.push(QueryResult { id, text, distance }),
                None => {
                    tracing::error!(id = %id, "Vector has no matching text row");
                    return Err(StoreError::MissingText { id });
                }
            }
        }

        Ok(results)
    }

    /// Text stored under `id`
    pub fn get_text(&self, id: &str) -> Result<String> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT text FROM documents WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Full record stored under `id`
    pub fn get(&self, id: &str) -> Result<Document> {
        let conn = self.lock_conn()?;
        let row: Option<(String, Option<Vec<u8>>)> = conn
            .query_row(
                "SELECT d.text, v.embedding
                 FROM documents d LEFT JOIN document_vectors v ON v.id = d.id
                 WHERE d.id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (text, bytes) = row.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let embedding = bytes
            .as_deref()
            .and_then(Embedding::from_bytes)
            .map(|e| e.vector)
            .ok_or_else(|| StoreError::Index(format!("Document {} has no readable vector", id)))?;

        Ok(Document {
            id: id.to_string(),
            text,
            embedding,
        })
    }

    /// Remove one document (text and vector together)
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut index = self.write_index()?;

        let removed = {
            let mut conn = self.lock_conn()?;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM document_vectors WHERE id = ?1", params![id])?;
            let rows = tx.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
            tx.commit()?;
            rows > 0
        };

        index
            .remove(id)
            .map_err(|e| StoreError::Index(e.to_string()))?;

        Ok(removed)
    }

    /// Remove every document, leaving an empty but usable store
    pub fn flush(&self) -> Result<()> {
        let mut index = self.write_index()?;

        {
            let mut conn = self.lock_conn()?;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM document_vectors", [])?;
            tx.execute("DELETE FROM documents", [])?;
            tx.commit()?;
        }

        let dropped = index.len();
        index.clear().map_err(|e| StoreError::Index(e.to_string()))?;

        tracing::info!(dropped, "Store flushed");
        Ok(())
    }

    /// Get store statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let index_stats = self.read_index()?.stats();

        let conn = self.lock_conn()?;
        let documents: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        let schema_version = super::migrations::get_current_version(&conn)?;
        let embedding_model: Option<String> = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = 'embedding_model'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(StoreStats {
            documents,
            indexed_vectors: index_stats.total_vectors,
            dimensions: index_stats.dimensions,
            metric: index_stats.metric,
            index_kind: index_stats.kind,
            embedding_model,
            sqlite_version: rusqlite::version().to_string(),
            schema_version,
            path: self.path.clone(),
        })
    }
}

/// Compare `requested` with the value recorded under `key`, recording it if absent
///
/// Returns the value in effect afterwards; `None` only when neither exists.
fn reconcile_key(conn: &Connection, key: &str, requested: Option<String>) -> Result<Option<String>> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;

    match (stored, requested) {
        (Some(stored), Some(requested)) if stored != requested => Err(StoreError::MetaMismatch {
            key: key.to_string(),
            stored,
            requested,
        }),
        (Some(stored), _) => Ok(Some(stored)),
        (None, Some(requested)) => {
            conn.execute(
                "INSERT INTO store_meta (key, value) VALUES (?1, ?2)",
                params![key, requested],
            )?;
            Ok(Some(requested))
        }
        (None, None) => Ok(None),
    }
}

fn duplicate_or(error: rusqlite::Error, id: &str) -> StoreError {
    match &error {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::DuplicateKey { id: id.to_string() }
        }
        _ => StoreError::Database(error),
    }
}

// ============================================================================
// TESTS
// ============================================================================
