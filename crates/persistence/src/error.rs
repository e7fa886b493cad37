use thiserror::Error;

/// Result type for persister operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors surfaced by a storage provider.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("key encoding failure: {0}")]
    Codec(String),
}

impl PersistenceError {
    pub fn backend<E: ToString>(err: E) -> Self {
        PersistenceError::Backend(err.to_string())
    }

    pub fn codec<E: ToString>(err: E) -> Self {
        PersistenceError::Codec(err.to_string())
    }
}
