//! The binary message envelope.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::error::ProtocolError;

/// Size of the fixed header: `id` and `correlation_id`, both little-endian `u64`.
pub const HEADER_LEN: usize = 16;

/// Correlation id of an outgoing request that has not been sent yet.
pub const REQUEST_MARKER: u64 = u64::MAX;

/// Category of a message, derived from its correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Fire-and-forget, correlation id `0`.
    Notification,
    /// Outgoing request before it is sent.
    Request,
    /// Answer to the request whose id is the correlation id.
    Response,
}

/// A parsed or constructed protocol message.
///
/// Immutable once built. Ownership moves between the queue, the pending
/// response slot and the transport; nothing holds references into a
/// transport buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: u64,
    correlation_id: u64,
    name: String,
    args: Vec<Value>,
    blob: Vec<u8>,
}

impl Message {
    pub fn new(id: u64, correlation_id: u64, name: impl Into<String>, args: Vec<Value>, blob: Vec<u8>) -> Self {
        let name = name.into();
        debug_assert!(!name.contains('\0'), "message name must not contain NUL");
        Self {
            id,
            correlation_id,
            name,
            args,
            blob,
        }
    }

    pub fn notification(id: u64, name: impl Into<String>, args: Vec<Value>, blob: Vec<u8>) -> Self {
        Self::new(id, 0, name, args, blob)
    }

    pub fn request(id: u64, name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::new(id, REQUEST_MARKER, name, args, Vec::new())
    }

    /// Build the response to `request`: same name with `:` in place of the
    /// leading `?`, correlated to the request's id.
    pub fn response_to(id: u64, request: &Message, args: Vec<Value>, blob: Vec<u8>) -> Self {
        let suffix = request.name.get(1..).unwrap_or_default();
        Self::new(id, request.id, format!(":{}", suffix), args, blob)
    }

    /// Parse a payload received from the transport.
    ///
    /// On failure the raw payload is hex dumped to the log before the error
    /// is returned.
    pub fn parse(mut payload: Vec<u8>) -> Result<Message, ProtocolError> {
        let header = match Header::read(&payload) {
            Ok(header) => header,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    payload = %hex::encode(&payload),
                    "Malformed incoming message"
                );
                return Err(err);
            }
        };

        let blob = payload.split_off(header.blob_start);
        Ok(Message {
            id: header.id,
            correlation_id: header.correlation_id,
            name: header.name,
            args: header.args,
            blob,
        })
    }

    /// Serialize to a payload ready for the transport.
    pub fn to_bytes(&self) -> Vec<u8> {
        let json = self.json_text();
        let len = HEADER_LEN + self.name.len() + 1 + json.len() + 1 + self.blob.len();

        let mut payload = Vec::with_capacity(len);
        payload.extend_from_slice(&self.id.to_le_bytes());
        payload.extend_from_slice(&self.wire_correlation_id().to_le_bytes());
        payload.extend_from_slice(self.name.as_bytes());
        payload.push(0);
        payload.extend_from_slice(json.as_bytes());
        payload.push(0);
        payload.extend_from_slice(&self.blob);
        payload
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn correlation_id(&self) -> u64 {
        self.correlation_id
    }

    /// Correlation id as written on the wire. A request carries its own id,
    /// which is what the response will be correlated to.
    pub fn wire_correlation_id(&self) -> u64 {
        if self.correlation_id == REQUEST_MARKER {
            self.id
        } else {
            self.correlation_id
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self.correlation_id {
            0 => MessageKind::Notification,
            REQUEST_MARKER => MessageKind::Request,
            _ => MessageKind::Response,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    pub fn into_blob(self) -> Vec<u8> {
        self.blob
    }

    /// The JSON array text of the arguments.
    pub fn json_text(&self) -> String {
        serde_json::to_string(&self.args).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Everything in a payload except the blob, validated.
struct Header {
    id: u64,
    correlation_id: u64,
    name: String,
    args: Vec<Value>,
    blob_start: usize,
}

impl Header {
    fn read(payload: &[u8]) -> Result<Header, ProtocolError> {
        if payload.len() < HEADER_LEN {
            return Err(ProtocolError::malformed("missing IDs", payload));
        }
        let id = read_u64(&payload[0..8]);
        let correlation_id = read_u64(&payload[8..16]);

        let name_start = HEADER_LEN;
        if name_start >= payload.len() {
            return Err(ProtocolError::malformed("missing name", payload));
        }
        let name_end = find_nul(payload, name_start)
            .ok_or_else(|| ProtocolError::malformed("missing name terminator", payload))?;

        let json_start = name_end + 1;
        if json_start >= payload.len() {
            return Err(ProtocolError::malformed("missing JSON", payload));
        }
        let json_end = find_nul(payload, json_start)
            .ok_or_else(|| ProtocolError::malformed("missing JSON terminator", payload))?;

        let name = std::str::from_utf8(&payload[name_start..name_end])
            .map_err(|_| ProtocolError::malformed("name is not UTF-8", payload))?
            .to_string();
        let json_text = String::from_utf8_lossy(&payload[json_start..json_end]).into_owned();
        let json: Value = serde_json::from_str(&json_text).map_err(|e| ProtocolError::InvalidJson {
            message: e.to_string(),
            json: json_text.clone(),
        })?;
        let Value::Array(args) = json else {
            return Err(ProtocolError::NotAnArray(json_text));
        };

        Ok(Header {
            id,
            correlation_id,
            name,
            args,
            blob_start: json_end + 1,
        })
    }
}

/// Source of message ids. Shared by everything that sends on one connection.
#[derive(Debug, Default)]
pub struct MessageIds {
    last: AtomicU64,
}

impl MessageIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id, starting at 1 and increasing monotonically.
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Read a non-negative integral JSON number, as ids and blob handles are
/// sent as doubles by some clients.
pub fn json_u64(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    if f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn find_nul(payload: &[u8], from: usize) -> Option<usize> {
    payload[from..].iter().position(|&b| b == 0).map(|i| from + i)
}
