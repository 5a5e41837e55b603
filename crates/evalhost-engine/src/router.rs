//! Dispatch of incoming messages.
//!
//! Runs on the transport's receive path. Nothing here calls into the
//! evaluator: eval requests are queued and the interpreter thread is woken.

use evalhost_protocol::{json_u64, Incoming, Message, ProtocolError};
use serde_json::{json, Value};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::outbound::trace_message;
use crate::queue::EvalRequest;
use crate::stack::{CancelOutcome, TOP_LEVEL};

/// What happened to an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Handled,
    /// An eval request was queued.
    Queued,
    /// The client asked the host to shut down.
    Shutdown,
}

impl Engine {
    /// Handle one payload received from the transport.
    ///
    /// Any error is fatal: it is recorded as the engine's termination reason
    /// before being returned.
    pub fn message_received(&self, payload: Vec<u8>) -> Result<Routed, EngineError> {
        self.keepalive.record_activity();
        let routed = Message::parse(payload)
            .map_err(EngineError::from)
            .and_then(|message| self.route(message));
        if let Err(err) = &routed {
            tracing::error!(error = %err, "Fatal error handling incoming message");
            self.terminate(err.clone());
        }
        routed
    }

    /// Keep-alive pong from the client.
    pub fn pong_received(&self) {
        self.keepalive.record_activity();
    }

    fn route(&self, message: Message) -> Result<Routed, EngineError> {
        trace_message("==>", &message);

        match Incoming::classify(&message)? {
            Incoming::Response => {
                if self.pending.deliver(message)? {
                    self.signal.notify();
                }
                Ok(Routed::Handled)
            }
            Incoming::Shutdown => {
                tracing::info!("Shutdown request received");
                self.terminate(EngineError::Shutdown);
                Ok(Routed::Shutdown)
            }
            Incoming::Cancel => {
                self.cancel(&message)?;
                Ok(Routed::Handled)
            }
            Incoming::CreateBlob => {
                let handle = self.blobs.create(message.blob().to_vec())?;
                self.respond(&message, vec![json!(handle as f64)], vec![])?;
                Ok(Routed::Handled)
            }
            Incoming::GetBlob => {
                let handle = match message.args() {
                    [handle] => json_u64(handle),
                    _ => None,
                }
                .ok_or_else(|| ProtocolError::invalid_arguments("GetBlob: non-numeric blob handle", message.args()))?;
                let bytes = self.blobs.get(handle)?;
                self.respond(&message, vec![], bytes)?;
                Ok(Routed::Handled)
            }
            Incoming::DestroyBlob => {
                let handles = message
                    .args()
                    .iter()
                    .map(json_u64)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| ProtocolError::invalid_arguments("DestroyBlob: non-numeric blob handle", message.args()))?;
                self.blobs.destroy_many(handles);
                Ok(Routed::Handled)
            }
            Incoming::Eval(flags) => {
                let request = EvalRequest::new(message, flags)?;
                tracing::debug!(id = request.id(), "Queued eval request");
                self.queue.push(request);
                self.signal.notify();
                Ok(Routed::Queued)
            }
        }
    }

    fn cancel(&self, message: &Message) -> Result<(), EngineError> {
        let target = match message.args() {
            [Value::Null] => TOP_LEVEL,
            [id] => json_u64(id).ok_or_else(|| {
                ProtocolError::invalid_arguments("Evaluation cancellation eval_id must be a number or null", message.args())
            })?,
            args => {
                return Err(ProtocolError::invalid_arguments(
                    "Evaluation cancellation request must be of the form [eval_id]",
                    args,
                )
                .into())
            }
        };

        let outcome = self.stack.lock().request_cancel(target);
        match outcome {
            CancelOutcome::Started => {
                tracing::info!(target, "Canceling evaluation");
                self.signal.notify();
            }
            CancelOutcome::Subsumed => {
                tracing::debug!(target, "Cancellation already in progress");
            }
            CancelOutcome::Stale => {
                tracing::debug!(target, "Ignoring cancellation of completed evaluation");
            }
        }
        Ok(())
    }
}
