//! Embedding Runner
//!
//! Drives an ONNX encoder with the fixed BERT signature:
//!
//! - inputs: `input_ids`, `token_type_ids`, `attention_mask`, each `[1, L]` i64
//! - output: `last_hidden_state`, `[1, L, 768]` f32
//!
//! The returned vector is the first 768 floats of the raw output buffer, i.e.
//! the hidden state of the first token position. This is not mean pooling and
//! not a normalized CLS embedding; it is kept as-is so stored vectors stay
//! comparable with indexes built by earlier releases.

use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, OnceLock};

use ort::inputs;
use ort::session::{Session, builder::SessionBuilder};
use ort::value::Value;

use super::tokenizer::TokenBatch;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Hidden size of the encoder (BERT-base)
pub const EMBEDDING_DIMENSIONS: usize = 768;

/// Graph input carrying vocabulary ids
pub const INPUT_IDS: &str = "input_ids";

/// Graph input carrying segment ids
pub const TOKEN_TYPE_IDS: &str = "token_type_ids";

/// Graph input carrying the attention mask
pub const ATTENTION_MASK: &str = "attention_mask";

/// Graph output holding per-token hidden states
pub const LAST_HIDDEN_STATE: &str = "last_hidden_state";

// ============================================================================
// GLOBAL ENVIRONMENT
// ============================================================================

/// ORT environment is committed once per process and never torn down
static ORT_ENVIRONMENT: OnceLock<()> = OnceLock::new();

fn ensure_environment() {
    ORT_ENVIRONMENT.get_or_init(|| {
        match ort::init().with_name("semdex").commit() {
            Ok(_) => tracing::debug!("ONNX Runtime environment committed"),
            // Sessions fall back to a default environment; their own errors follow
            Err(e) => tracing::warn!("ONNX Runtime environment setup failed: {}", e),
        }
    });
}

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Inference error types
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// Model file does not exist
    #[error("Model file not found: {0}")]
    ModelMissing(PathBuf),
    /// Session creation failed (backend init, unreadable graph)
    #[error("Failed to initialize inference session from {path}: {reason}")]
    SessionInit { path: PathBuf, reason: String },
    /// The three input sequences disagree in length, or are empty
    #[error("Malformed token batch: {0}")]
    InvalidBatch(String),
    /// ONNX Runtime rejected a tensor or the forward pass
    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),
    /// Output tensor does not have the `[1, L, 768]` shape
    #[error("Unexpected output shape {actual:?}, expected [1, {tokens}, {hidden}]")]
    OutputShape {
        actual: Vec<i64>,
        tokens: usize,
        hidden: usize,
    },
    /// The backend panicked inside the forward pass
    #[error("Inference panicked")]
    Panicked,
    /// A session pool lock was poisoned
    #[error("Session pool lock poisoned")]
    Poisoned,
}

// ============================================================================
// SESSION POOL
// ============================================================================

/// Fixed set of sessions, one checked out per forward pass
///
/// Sessions are not shared across threads while running; a caller that finds
/// the pool empty waits until another call returns its session.
struct SessionPool {
    idle: Mutex<Vec<Session>>,
    returned: Condvar,
    size: usize,
}

impl SessionPool {
    fn checkout(&self) -> Result<PooledSession<'_>, InferenceError> {
        let mut idle = self.idle.lock().map_err(|_| InferenceError::Poisoned)?;
        loop {
            if let Some(session) = idle.pop() {
                return Ok(PooledSession {
                    pool: self,
                    session: Some(session),
                });
            }
            idle = self
                .returned
                .wait(idle)
                .map_err(|_| InferenceError::Poisoned)?;
        }
    }
}

/// Session on loan for the duration of one `embed` call
struct PooledSession<'a> {
    pool: &'a SessionPool,
    session: Option<Session>,
}

impl PooledSession<'_> {
    fn get_mut(&mut self) -> Result<&mut Session, InferenceError> {
        // Only taken in Drop
        self.session.as_mut().ok_or(InferenceError::Poisoned)
    }
}

impl Drop for PooledSession<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            match self.pool.idle.lock() {
                Ok(mut idle) => {
                    idle.push(session);
                    self.pool.returned.notify_one();
                }
                Err(_) => tracing::error!("Session pool poisoned, dropping session"),
            }
        }
    }
}

// ============================================================================
// RUNNER
// ============================================================================

/// ONNX encoder producing one 768-float vector per token batch
pub struct EmbeddingRunner {
    model_path: PathBuf,
    pool: SessionPool,
}

impl std::fmt::Debug for EmbeddingRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingRunner")
            .field("model_path", &self.model_path)
            .field("sessions", &self.pool.size)
            .finish()
    }
}

impl EmbeddingRunner {
    /// Load `sessions` independent sessions over the model at `model_path`
    pub fn new(model_path: &Path, sessions: usize, intra_threads: usize) -> Result<Self, InferenceError> {
        if !model_path.exists() {
            return Err(InferenceError::ModelMissing(model_path.to_path_buf()));
        }

        ensure_environment();

        let sessions = sessions.max(1);
        let mut idle = Vec::with_capacity(sessions);
        for _ in 0..sessions {
            idle.push(Self::load_session(model_path, intra_threads)?);
        }

        tracing::info!(
            model = %model_path.display(),
            sessions,
            intra_threads,
            "Embedding runner ready"
        );

        Ok(Self {
            model_path: model_path.to_path_buf(),
            pool: SessionPool {
                idle: Mutex::new(idle),
                returned: Condvar::new(),
                size: sessions,
            },
        })
    }

    fn load_session(model_path: &Path, intra_threads: usize) -> Result<Session, InferenceError> {
        SessionBuilder::new()
            .map_err(|e| session_init_error(model_path, e))?
            .with_intra_threads(intra_threads.max(1))
            .map_err(|e| session_init_error(model_path, e))?
            .commit_from_file(model_path)
            .map_err(|e| session_init_error(model_path, e))
    }

    /// Path of the loaded model
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Number of pooled sessions
    pub fn sessions(&self) -> usize {
        self.pool.size
    }

    /// Run one forward pass and reduce it to a single vector
    pub fn embed(&self, batch: &TokenBatch) -> Result<Vec<f32>, InferenceError> {
        validate_batch(batch)?;

        let seq_len = batch.len();
        let shape = vec![1, seq_len];

        let input_ids = Value::from_array((shape.clone(), batch.ids.clone()))?;
        let token_type_ids = Value::from_array((shape.clone(), batch.segment_ids.clone()))?;
        let attention_mask = Value::from_array((shape, batch.attention_mask.clone()))?;

        let mut session = self.pool.checkout()?;

        // A shape mismatch inside the backend must not take the worker thread down
        let hidden = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let outputs = session.get_mut()?.run(inputs![
                INPUT_IDS => input_ids,
                TOKEN_TYPE_IDS => token_type_ids,
                ATTENTION_MASK => attention_mask,
            ])?;
            let (shape, data) = outputs[LAST_HIDDEN_STATE].try_extract_tensor::<f32>()?;
            let dims: Vec<i64> = shape.iter().copied().collect();
            Ok::<(Vec<i64>, Vec<f32>), InferenceError>((dims, first_token_state(data)))
        }))
        .map_err(|_| InferenceError::Panicked)??;

        let (dims, vector) = hidden;
        check_output_shape(&dims, seq_len)?;

        Ok(vector)
    }
}

fn session_init_error(path: &Path, e: impl std::fmt::Display) -> InferenceError {
    InferenceError::SessionInit {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn validate_batch(batch: &TokenBatch) -> Result<(), InferenceError> {
    if batch.is_empty() {
        return Err(InferenceError::InvalidBatch("no tokens".to_string()));
    }
    if !batch.is_aligned() {
        return Err(InferenceError::InvalidBatch(format!(
            "ids={} attention_mask={} segment_ids={}",
            batch.ids.len(),
            batch.attention_mask.len(),
            batch.segment_ids.len()
        )));
    }
    Ok(())
}

fn check_output_shape(dims: &[i64], seq_len: usize) -> Result<(), InferenceError> {
    let expected = [1, seq_len as i64, EMBEDDING_DIMENSIONS as i64];
    if dims != expected {
        return Err(InferenceError::OutputShape {
            actual: dims.to_vec(),
            tokens: seq_len,
            hidden: EMBEDDING_DIMENSIONS,
        });
    }
    Ok(())
}

/// Take the first 768 contiguous values of the raw output buffer
///
/// Equivalent to the first token's hidden state for a `[1, L, 768]` output.
#[inline]
pub fn first_token_state(raw: &[f32]) -> Vec<f32> {
    raw[..raw.len().min(EMBEDDING_DIMENSIONS)].to_vec()
}

// ============================================================================
// TESTS
// ============================================================================
