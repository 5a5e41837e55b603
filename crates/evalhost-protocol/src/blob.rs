//! Handle-addressed byte buffers exchanged out of band.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::ProtocolError;

/// Opaque blob handle. Sent over the wire as a JSON number.
pub type BlobHandle = u64;

/// The first handle ever handed out.
pub const FIRST_BLOB_HANDLE: BlobHandle = 2;

/// Thread-safe map from handle to bytes.
///
/// Handles increase monotonically and are never reused. Blob traffic is not on
/// the hot path, so one mutex guards the whole map.
#[derive(Debug)]
pub struct BlobStore {
    inner: Mutex<Blobs>,
}

#[derive(Debug)]
struct Blobs {
    last: BlobHandle,
    map: HashMap<BlobHandle, Vec<u8>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::starting_after(FIRST_BLOB_HANDLE - 1)
    }

    fn starting_after(last: BlobHandle) -> Self {
        Self {
            inner: Mutex::new(Blobs {
                last,
                map: HashMap::new(),
            }),
        }
    }

    /// Store `bytes` under a new handle.
    ///
    /// Fails once a handle would no longer survive the trip through a JSON
    /// double.
    pub fn create(&self, bytes: Vec<u8>) -> Result<BlobHandle, ProtocolError> {
        let mut blobs = self.inner.lock();
        let handle = blobs
            .last
            .checked_add(1)
            .filter(|h| *h == (*h as f64) as BlobHandle)
            .ok_or(ProtocolError::BlobHandleOverflow)?;
        blobs.last = handle;
        blobs.map.insert(handle, bytes);
        tracing::trace!(handle, "Created blob");
        Ok(handle)
    }

    pub fn get(&self, handle: BlobHandle) -> Result<Vec<u8>, ProtocolError> {
        self.inner
            .lock()
            .map
            .get(&handle)
            .cloned()
            .ok_or(ProtocolError::BlobNotFound(handle))
    }

    /// Remove a blob. Unknown handles are ignored.
    pub fn destroy(&self, handle: BlobHandle) {
        self.inner.lock().map.remove(&handle);
    }

    pub fn destroy_many(&self, handles: impl IntoIterator<Item = BlobHandle>) {
        let mut blobs = self.inner.lock();
        for handle in handles {
            blobs.map.remove(&handle);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BlobStore {
    fn default() -> Self {
        Self::new()
    }
}
