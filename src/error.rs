//! Error taxonomy for the prediction engine
//!
//! Training-time errors are isolated per target/algorithm so one failing
//! target never aborts a batch of other targets; prediction-time schema
//! errors are always raised to the caller, never coerced or masked.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Supplied features don't match an artifact's recorded schema.
    /// Fatal for the call; reported with explicit field lists.
    #[error("feature schema mismatch: missing {missing:?}, extra {extra:?}")]
    SchemaMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
    },

    /// Too few samples or candidates for training/analysis. Terminal for
    /// the affected target only.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A single candidate algorithm failed during ensemble construction.
    /// Logged and skipped while at least two candidates remain.
    #[error("candidate '{algorithm}' failed: {reason}")]
    TransientCompute { algorithm: String, reason: String },

    /// Cache read/write failure. Degrades to "always recompute"; the cache
    /// API itself never propagates this as a fatal error.
    #[error("cache IO failure: {0}")]
    CacheIo(#[source] std::io::Error),

    /// Corrupt or missing persisted model. Fatal for the prediction or
    /// recommendation call; never silently replaced by a default.
    #[error("failed to load artifact: {0}")]
    ArtifactLoad(String),

    /// Persisting an artifact or its metadata failed.
    #[error("failed to persist artifact: {0}")]
    ArtifactStore(String),

    /// A training run observed its cancellation token or deadline.
    #[error("training run cancelled")]
    Cancelled,

    /// Malformed input rejected before any computation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether the caller may retry the same call and expect progress.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientCompute { .. } | Error::CacheIo(_))
    }
}
