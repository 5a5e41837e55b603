//! The transport capability and an in-memory implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::error::TransportError;

/// Sends framed payloads to the client.
///
/// Incoming payloads flow the other way, through
/// [`crate::Engine::message_received`], called from the transport's own
/// receive loop.
pub trait Transport: Send + Sync {
    fn send(&self, payload: Vec<u8>) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Send a keep-alive ping. Any inbound traffic counts as the pong.
    fn ping(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Transport backed by a channel, for tests and in-process clients.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: Sender<Vec<u8>>,
    connected: AtomicBool,
}

impl MemoryTransport {
    /// Create a transport and the receiver of everything sent through it.
    pub fn new() -> (Self, Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel();
        let transport = Self {
            tx,
            connected: AtomicBool::new(true),
        };
        (transport, rx)
    }

    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Transport for MemoryTransport {
    fn send(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        self.tx.send(payload).map_err(|_| {
            self.close();
            TransportError::Closed
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
