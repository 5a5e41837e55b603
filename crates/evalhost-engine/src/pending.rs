//! The single slot for a response to an outgoing request.
//!
//! The host has at most one top-level request outstanding. While it waits,
//! queued evaluations keep running, and one of them may issue a request of its
//! own; [`PendingResponse::expect`] saves whatever state the slot was in and
//! the matching [`Expectation`] puts it back, so the outer wait resumes where
//! it left off.

use std::collections::VecDeque;

use evalhost_protocol::{Message, ProtocolError};
use parking_lot::Mutex;

/// Most abandoned request ids remembered. Past this the oldest is forgotten,
/// and a response to it becomes unexpected.
const MAX_ABANDONED: usize = 64;

#[derive(Debug)]
enum Slot {
    Unexpected,
    Expected,
    Received(Message),
}

#[derive(Debug)]
struct State {
    slot: Slot,
    /// Requests whose waits were unwound by cancellation. A late response
    /// to one of them is dropped. Oldest first.
    abandoned: VecDeque<u64>,
}

#[derive(Debug)]
pub struct PendingResponse {
    state: Mutex<State>,
}

impl PendingResponse {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                slot: Slot::Unexpected,
                abandoned: VecDeque::new(),
            }),
        }
    }

    /// Start expecting a response. Must be called before the request is
    /// sent, so that a fast response is not taken for an unexpected one.
    pub fn expect(&self) -> Expectation<'_> {
        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut state.slot, Slot::Expected);
        Expectation {
            pending: self,
            previous: Some(previous),
            request_id: None,
        }
    }

    /// Store an incoming response.
    ///
    /// Returns false if the response answers an abandoned request and was
    /// dropped. A response nobody is waiting for, or one arriving before the
    /// previous one was consumed, is a protocol violation.
    pub fn deliver(&self, message: Message) -> Result<bool, ProtocolError> {
        let mut state = self.state.lock();
        let correlation_id = message.correlation_id();
        if let Some(index) = state.abandoned.iter().position(|id| *id == correlation_id) {
            state.abandoned.remove(index);
            tracing::warn!(
                correlation_id,
                name = message.name(),
                "Dropping response to abandoned request"
            );
            return Ok(false);
        }

        match state.slot {
            Slot::Expected => {
                state.slot = Slot::Received(message);
                Ok(true)
            }
            Slot::Unexpected => Err(ProtocolError::UnexpectedResponse {
                correlation_id: message.correlation_id(),
                name: message.name().to_string(),
            }),
            Slot::Received(_) => Err(ProtocolError::DuplicateResponse {
                correlation_id: message.correlation_id(),
                name: message.name().to_string(),
            }),
        }
    }

    pub fn is_expected(&self) -> bool {
        matches!(self.state.lock().slot, Slot::Expected)
    }
}

impl Default for PendingResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// An outstanding expectation. Dropping it without taking the response
/// restores the previous state and marks the request abandoned.
#[derive(Debug)]
pub struct Expectation<'a> {
    pending: &'a PendingResponse,
    previous: Option<Slot>,
    request_id: Option<u64>,
}

impl Expectation<'_> {
    /// Record the id of the request that was sent.
    pub fn sent(&mut self, request_id: u64) {
        self.request_id = Some(request_id);
    }

    /// Take the response if it has arrived, restoring the saved state.
    pub fn try_take(&mut self) -> Option<Message> {
        let mut state = self.pending.state.lock();
        if self.previous.is_none() || !matches!(state.slot, Slot::Received(_)) {
            return None;
        }
        let previous = self.previous.take().unwrap_or(Slot::Unexpected);
        match std::mem::replace(&mut state.slot, previous) {
            Slot::Received(message) => Some(message),
            _ => None,
        }
    }
}

impl Drop for Expectation<'_> {
    fn drop(&mut self) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        let mut state = self.pending.state.lock();
        let abandoned = std::mem::replace(&mut state.slot, previous);
        if let (Slot::Expected, Some(id)) = (abandoned, self.request_id) {
            if state.abandoned.len() == MAX_ABANDONED {
                state.abandoned.pop_front();
            }
            state.abandoned.push_back(id);
        }
    }
}
