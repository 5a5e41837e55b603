//! FIFO of eval requests that have not started yet.

use std::collections::VecDeque;

use evalhost_protocol::{EvalFlags, Message, ProtocolError};
use parking_lot::Mutex;

/// A validated eval request: `?=<flags>` with arguments `[expr]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalRequest {
    pub message: Message,
    pub flags: EvalFlags,
    pub expr: String,
}

impl EvalRequest {
    pub fn new(message: Message, flags: EvalFlags) -> Result<Self, ProtocolError> {
        let expr = match message.args() {
            [serde_json::Value::String(expr)] => expr.clone(),
            _ => return Err(ProtocolError::InvalidEvalRequest(message.id())),
        };
        Ok(Self {
            message,
            flags,
            expr,
        })
    }

    pub fn id(&self) -> u64 {
        self.message.id()
    }
}

/// Eval requests in arrival order.
#[derive(Debug, Default)]
pub struct EvalQueue {
    requests: Mutex<VecDeque<EvalRequest>>,
}

impl EvalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, request: EvalRequest) {
        self.requests.lock().push_back(request);
    }

    pub fn pop(&self) -> Option<EvalRequest> {
        self.requests.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(id: u64, expr: &str) -> EvalRequest {
        EvalRequest::new(Message::new(id, id, "?=", vec![json!(expr)], vec![]), EvalFlags::default()).unwrap()
    }

    #[test]
    fn test_fifo() {
        let queue = EvalQueue::new();
        queue.push(request(1, "a"));
        queue.push(request(2, "b"));
        queue.push(request(3, "c"));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().unwrap().expr, "a");
        assert_eq!(queue.pop().unwrap().expr, "b");
        assert_eq!(queue.pop().unwrap().id(), 3);
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_request_needs_single_string() {
        for args in [vec![], vec![json!(1)], vec![json!("a"), json!("b")]] {
            let message = Message::new(4, 4, "?=", args, vec![]);
            let err = EvalRequest::new(message, EvalFlags::default()).unwrap_err();
            assert_eq!(err, ProtocolError::InvalidEvalRequest(4));
        }
    }
}
