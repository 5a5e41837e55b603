//! Sending notifications, responses and requests.

use evalhost_protocol::{Message, MessageKind, ProtocolError};
use serde_json::Value;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::evaluator::Evaluator;

impl Engine {
    /// Send a notification. `name` starts with `!`.
    pub fn send_notification(&self, name: &str, args: Vec<Value>, blob: Vec<u8>) -> Result<u64, EngineError> {
        debug_assert!(name.starts_with('!'));
        let message = Message::notification(self.ids.next(), name, args, blob);
        self.send(&message)?;
        Ok(message.id())
    }

    /// Respond to a `?` request from the client.
    pub fn respond(&self, request: &Message, args: Vec<Value>, blob: Vec<u8>) -> Result<u64, EngineError> {
        debug_assert!(request.name().starts_with('?'));
        let message = Message::response_to(self.ids.next(), request, args, blob);
        self.send(&message)?;
        Ok(message.id())
    }

    /// Send a request and block until its response arrives.
    ///
    /// While waiting, queued eval requests run first, so nested evaluation
    /// keeps making progress; then the response is checked for; then the
    /// thread sleeps until woken or the poll interval passes. Cancellation
    /// and connection loss are checked on every turn.
    pub fn send_request(&self, name: &str, args: Vec<Value>, evaluator: &mut dyn Evaluator) -> Result<Message, EngineError> {
        debug_assert!(name.starts_with('?'));
        let mut expectation = self.pending.expect();
        let request = Message::request(self.ids.next(), name, args);
        self.send(&request)?;
        expectation.sent(request.id());
        self.check_alive()?;

        loop {
            let seen = self.signal.generation();

            if let Some(eval) = self.queue.pop() {
                self.handle_eval(eval, evaluator)?;
                continue;
            }

            if let Some(response) = expectation.try_take() {
                return check_response(&request, response);
            }

            self.signal.wait(seen, self.config.poll_interval);
            self.check_alive()?;
            if self.query_interrupt() {
                return Err(EngineError::Canceled);
            }
        }
    }

    fn send(&self, message: &Message) -> Result<(), EngineError> {
        trace_message("<==", message);
        self.transport.send(message.to_bytes()).map_err(|err| {
            tracing::error!(error = %err, id = message.id(), name = message.name(), "Failed to send message");
            EngineError::from(err)
        })
    }
}

fn check_response(request: &Message, response: Message) -> Result<Message, EngineError> {
    if response.correlation_id() != request.id() || response.name().get(1..) != request.name().get(1..) {
        return Err(ProtocolError::MismatchedResponse {
            correlation_id: response.correlation_id(),
            name: response.name().to_string(),
            expected_id: request.id(),
            expected_name: request.name().to_string(),
        }
        .into());
    }
    Ok(response)
}

/// Log a message crossing the transport.
pub(crate) fn trace_message(direction: &str, message: &Message) {
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    let correlation = match message.kind() {
        MessageKind::Response => format!(" #{}#", message.correlation_id()),
        _ => String::new(),
    };
    let blob = if message.blob().is_empty() {
        String::new()
    } else {
        format!(" <raw ({} bytes)>", message.blob().len())
    };
    tracing::trace!(
        "{} #{}# {}{} {}{}",
        direction,
        message.id(),
        message.name(),
        correlation,
        message.json_text(),
        blob
    );
}
