//! Error types for the retrieval-augmentation core.
//!
//! Library operations return [`Result<T>`]. Per-chunk failures during
//! indexing are logged and counted rather than returned; everything on the
//! query path (retrieval, prompt assembly, generation) propagates a
//! [`RagError`] to the caller.

use thiserror::Error;

/// Errors that can occur while indexing, retrieving, or answering.
#[derive(Debug, Error)]
pub enum RagError {
    /// Attempted to embed an empty or whitespace-only string.
    #[error("cannot embed empty input")]
    EmptyInput,

    /// A vector with this id is already stored in the collection.
    #[error("duplicate id '{0}' in collection")]
    DuplicateId(String),

    /// A collection with this name exists and reuse was not requested.
    #[error("collection '{0}' already exists (use --rebuild or --append)")]
    AlreadyExists(String),

    /// The collection has never been built.
    #[error("index collection '{0}' not found; run `crag index` first")]
    IndexNotFound(String),

    /// The text generator failed or timed out.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The embedding backend failed.
    #[error("embedding error ({provider}): {message}")]
    Embedding {
        /// Provider that produced the error.
        provider: String,
        /// Description of the failure.
        message: String,
    },

    /// The active embedder is not the one the collection was built with.
    #[error(
        "embedding model mismatch for collection '{collection}': indexed with '{indexed}', querying with '{query}'"
    )]
    ModelMismatch {
        collection: String,
        indexed: String,
        query: String,
    },

    /// A vector does not have the collection's dimensionality.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid prompt template or provider setup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Persisted index could not be read or written.
    #[error(transparent)]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub(crate) fn embedding(provider: &str, message: impl Into<String>) -> Self {
        RagError::Embedding {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// Convenience result type for core operations.
pub type Result<T> = std::result::Result<T, RagError>;
