//! Protocol engine for an interpreter host driven by a remote client.
//!
//! The [`Engine`] owns every piece of shared protocol state: the eval stack
//! and cancellation state, the queue of pending eval requests, the pending
//! response slot, the blob store and the message id counter. It is created
//! once per connection and shared between two roles:
//!
//! - the I/O side, which hands every received payload to
//!   [`Engine::message_received`] and never touches the interpreter;
//! - the interpreter thread, which calls [`Engine::run`] with the
//!   [`Evaluator`] and owns it for the lifetime of the engine.
//!
//! Nested evaluation happens only through [`Host::tick`] and
//! [`Host::request`], which receive the evaluator back as an argument. The
//! evaluator therefore is only ever entered from the one call chain that owns
//! it.

mod config;
mod engine;
mod error;
mod evaluator;
mod keepalive;
mod outbound;
mod pending;
mod queue;
mod router;
mod signal;
mod stack;
mod transport;

pub use config::EngineConfig;
pub use engine::{Engine, Exit};
pub use error::{EngineError, TransportError};
pub use evaluator::{EvalInput, EvalOutput, EvalValue, Evaluator, Host, ParseStatus, ResultMode};
pub use keepalive::{KeepAlive, KeepAliveAction};
pub use pending::{Expectation, PendingResponse};
pub use queue::{EvalQueue, EvalRequest};
pub use router::Routed;
pub use signal::Signal;
pub use stack::{CancelOutcome, EvalFrame, EvalStack, TOP_LEVEL};
pub use transport::{MemoryTransport, Transport};

pub use evalhost_protocol as protocol;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
