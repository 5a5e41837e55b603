//! Error types for the engine.

use evalhost_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while running the engine.
///
/// `Canceled` is not a failure: it is the signal that unwinds evaluations
/// nested above a cancellation target. Everything else ends the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Evaluation canceled")]
    Canceled,

    #[error("Shutdown request received")]
    Shutdown,

    #[error("Lost connection to client")]
    ConnectionLost,

    #[error("Client did not answer keep-alive ping within {0:?}")]
    KeepAliveExpired(std::time::Duration),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl EngineError {
    /// Whether this error ends the engine, as opposed to unwinding a
    /// canceled evaluation.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EngineError::Canceled)
    }
}

/// Failure reported by a [`crate::Transport`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}
