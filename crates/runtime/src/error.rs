use thiserror::Error;

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors surfaced by the runtime to its embedder.
///
/// Nothing here reports the fate of a message past local submission; delivery
/// and processing are fire-and-forget, and transport failures are logged
/// where they happen rather than propagated.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The cluster view is empty, so no node can own the address.
    #[error("no home node available for placement")]
    NoHomeNode,
    /// A hosting node was assembled without a persister.
    #[error("a hosting node requires a persister")]
    MissingPersister,
}
