use std::time::Duration;
use thiserror::Error;

/// The byte stream did not contain a decodable frame.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("no frame delimiter within {limit} bytes, discarded {discarded} bytes")]
    Oversized { limit: usize, discarded: usize },
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A well-framed message that the receiver cannot act on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid message: {0}")]
    Invalid(String),
    #[error("unexpected `{0}` message")]
    Unexpected(&'static str),
}

/// Per-frame failure reported by the framer. Neither variant is fatal to
/// the connection.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// The connection itself failed. Ends the session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed by peer")]
    Closed,
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport failure: {0}")]
    Io(#[from] std::io::Error),
}
