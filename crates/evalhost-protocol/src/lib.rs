//! Wire-level building blocks of the evalhost protocol.
//!
//! A message is a 16-byte header (two little-endian `u64` ids) followed by a
//! NUL-terminated name, a NUL-terminated JSON array and an optional trailing
//! blob. The first character of the name tells the category of the message:
//! `!` notification, `?` request, `:` response.

mod blob;
mod error;
mod message;
mod name;

pub use blob::{BlobHandle, BlobStore, FIRST_BLOB_HANDLE};
pub use error::ProtocolError;
pub use message::{json_u64, Message, MessageIds, MessageKind, HEADER_LEN, REQUEST_MARKER};
pub use name::{names, EnvSelector, EvalFlags, Incoming};

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
