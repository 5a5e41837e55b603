//! Error types for the wire protocol.
//!
//! Every variant is a protocol or framing violation. The protocol has no
//! renegotiation, so callers treat all of them as fatal.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Malformed message: {reason} ({len} bytes)")]
    Malformed { reason: &'static str, len: usize },

    #[error("Malformed JSON payload - {message}: {json}")]
    InvalidJson { message: String, json: String },

    #[error("JSON payload must be an array, but got {0}")]
    NotAnArray(String),

    #[error("Unrecognized incoming message name '{0}'")]
    UnrecognizedMessage(String),

    #[error("'{name}': unrecognized flag '{flag}'")]
    UnrecognizedEvalFlag { name: String, flag: char },

    #[error("'{0}': multiple environment flags specified")]
    ConflictingEnvironment(String),

    #[error("Invalid evaluation request #{0}#: must have form [expr]")]
    InvalidEvalRequest(u64),

    #[error("Response '{name}' #{id}# does not name a request")]
    UncorrelatedResponse { id: u64, name: String },

    #[error("Unexpected incoming client response '{name}' to #{correlation_id}#")]
    UnexpectedResponse { correlation_id: u64, name: String },

    #[error("Response '{name}' to #{correlation_id}# received before the previous response was consumed")]
    DuplicateResponse { correlation_id: u64, name: String },

    #[error("Received response [{correlation_id},'{name}'], while awaiting response for [{expected_id},'{expected_name}']")]
    MismatchedResponse {
        correlation_id: u64,
        name: String,
        expected_id: u64,
        expected_name: String,
    },

    #[error("{message}: {args}")]
    InvalidArguments { message: &'static str, args: String },

    #[error("GetBlob: no blob with handle {0}")]
    BlobNotFound(u64),

    #[error("Blob handle overflow")]
    BlobHandleOverflow,
}

impl ProtocolError {
    pub fn malformed(reason: &'static str, payload: &[u8]) -> Self {
        ProtocolError::Malformed {
            reason,
            len: payload.len(),
        }
    }

    pub fn invalid_arguments(message: &'static str, args: &[serde_json::Value]) -> Self {
        ProtocolError::InvalidArguments {
            message,
            args: serde_json::Value::Array(args.to_vec()).to_string(),
        }
    }
}
