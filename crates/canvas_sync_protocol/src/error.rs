//! Error types for the protocol crate.

use crate::graph::ElementKind;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A value could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// Bytes could not be decoded into the expected value.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Why a transaction could not be applied during replay.
///
/// A transaction that fails to apply is malformed from the point of view of
/// the current log. Replay skips it and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// The payload is not a graph delta.
    #[error("payload is not a graph delta: {0}")]
    Undecodable(String),

    /// The delta adds an element that already exists.
    #[error("{kind} {id:?} already exists")]
    AlreadyExists {
        /// Element kind.
        kind: ElementKind,
        /// Element ID.
        id: String,
    },

    /// The delta updates or removes an element that does not exist.
    #[error("{kind} {id:?} does not exist")]
    Missing {
        /// Element kind.
        kind: ElementKind,
        /// Element ID.
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ApplyError::Missing {
            kind: ElementKind::Edge,
            id: "e1".into(),
        };
        assert_eq!(err.to_string(), "edge \"e1\" does not exist");

        let err = ProtocolError::Decode("truncated".into());
        assert!(err.to_string().contains("truncated"));
    }
}
