//! Error types for the reference server.

use canvas_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while handling a request.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed or undecodable request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Push carried more transactions than the server accepts at once.
    #[error("push batch too large: {size} > {max}")]
    BatchTooLarge {
        /// Transactions in the request.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A response message was sent as a request.
    #[error("unexpected message type {0}")]
    UnexpectedMessage(u8),

    /// Encoding a response failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ServerError {
    /// Returns true if the client sent something the server cannot accept.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::BatchTooLarge { .. }
                | ServerError::UnexpectedMessage(_)
        )
    }

    /// Returns true if the failure is on the server's side.
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::UnexpectedMessage(2).is_client_error());
        assert!(ServerError::Protocol(ProtocolError::Encode("oops".into())).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn error_display() {
        let msg = ServerError::BatchTooLarge { size: 12, max: 10 }.to_string();
        assert!(msg.contains("12"));
        assert!(msg.contains("10"));
    }
}
