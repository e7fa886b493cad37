use thiserror::Error;
use vactor_core::NodeId;

/// Result type for transport operations.
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Errors surfaced by a cluster transport.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire codec failure: {0}")]
    Codec(String),
    #[error("frame of {0} bytes exceeds the wire limit")]
    FrameTooLarge(usize),
    #[error("peer {0} is not reachable")]
    PeerUnreachable(NodeId),
    #[error("peer {0} has no routable address")]
    BadPeerAddress(NodeId),
    #[error("invocation to {0} timed out")]
    Timeout(NodeId),
    #[error("unexpected reply from {0}")]
    UnexpectedReply(NodeId),
}

impl NetworkError {
    pub fn codec<E: ToString>(err: E) -> Self {
        NetworkError::Codec(err.to_string())
    }
}
