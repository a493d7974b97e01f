//! Error taxonomy shared across the crate.
//!
//! The variants map directly onto what happens on the wire: `Client` and
//! `Routing` turn into `ClientError` responses, `PeerUnreachable` feeds the
//! failure handler before being reported, and `Wire` tears down the
//! offending connection.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    /// The request itself is invalid: bad credentials, duplicate email,
    /// unknown chat, duplicate ring id.
    #[error("client error: {0}")]
    Client(String),

    /// The message could not be brought to a responsible node.
    #[error("routing error: {0}")]
    Routing(String),

    /// A peer did not accept a connection or did not answer within the hop
    /// timeout.
    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    /// Malformed or oversized frame on a connection.
    #[error("wire error: {0}")]
    Wire(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Everything that should not happen.
    #[error("internal error: {0}")]
    Internal(String),
}

impl NodeError {
    pub fn unreachable(peer: impl ToString, reason: impl ToString) -> Self {
        Self::PeerUnreachable {
            peer: peer.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;
