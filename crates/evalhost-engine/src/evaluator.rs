//! The interpreter capability consumed by the engine, and the host callbacks
//! the interpreter calls back into.

use evalhost_protocol::{BlobStore, EnvSelector, Message};
use serde_json::Value;

use crate::error::EngineError;

/// How the value of an evaluation is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultMode {
    Json,
    Raw,
    /// The requester does not want the value.
    None,
}

/// One evaluation to perform.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalInput<'a> {
    /// Id of the eval request.
    pub id: u64,
    pub expr: &'a str,
    pub env: EnvSelector,
    /// Evaluate in a fresh child of `env`, discarded afterwards.
    pub new_env: bool,
    pub result: ResultMode,
}

/// Outcome of parsing the expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    Null,
    Ok,
    Incomplete,
    Error,
    Eof,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::Null => "NULL",
            ParseStatus::Ok => "OK",
            ParseStatus::Incomplete => "INCOMPLETE",
            ParseStatus::Error => "ERROR",
            ParseStatus::Eof => "EOF",
        }
    }
}

/// The value of an evaluation, converted per [`ResultMode`].
#[derive(Debug, Clone, PartialEq)]
pub enum EvalValue {
    Json(Value),
    Raw(Vec<u8>),
}

/// What an evaluation produced. Errors raised by the evaluated code are
/// reported here, not as `Err`.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutput {
    pub parse_status: ParseStatus,
    pub error: Option<String>,
    pub value: Option<EvalValue>,
}

impl EvalOutput {
    pub fn value(value: EvalValue) -> Self {
        Self {
            parse_status: ParseStatus::Ok,
            error: None,
            value: Some(value),
        }
    }

    pub fn error(parse_status: ParseStatus, error: impl Into<String>) -> Self {
        Self {
            parse_status,
            error: Some(error.into()),
            value: None,
        }
    }
}

/// An interpreter.
///
/// Not thread-safe: the engine only ever calls it from the thread that passed
/// it to [`crate::Engine::run`], possibly re-entrantly through [`Host`].
pub trait Evaluator {
    /// Evaluate `input`.
    ///
    /// Must call [`Host::enter`] once it is ready to be unwound by
    /// cancellation, and [`Host::leave`] before tearing that down. `Err` from
    /// any host call must be propagated unchanged; `EngineError::Canceled`
    /// in particular unwinds the evaluation.
    fn evaluate(&mut self, input: &EvalInput<'_>, host: &mut dyn Host) -> Result<EvalOutput, EngineError>;
}

/// Callbacks available to a running evaluation.
pub trait Host {
    /// Register the evaluation as a cancellation target.
    fn enter(&mut self);

    /// Unregister the evaluation. Idempotent.
    fn leave(&mut self);

    /// Checkpoint. Returns `Err(EngineError::Canceled)` if the evaluation
    /// must unwind; runs queued evaluations when re-entrancy is allowed.
    fn tick(&mut self, evaluator: &mut dyn Evaluator) -> Result<(), EngineError>;

    /// Send a notification to the client.
    fn notify(&mut self, name: &str, args: Vec<Value>) -> Result<(), EngineError>;

    /// Send a request to the client and wait for the response, running
    /// queued evaluations meanwhile.
    fn request(&mut self, evaluator: &mut dyn Evaluator, name: &str, args: Vec<Value>) -> Result<Message, EngineError>;

    /// Whether blocking callbacks (requests to the client) are allowed.
    fn callbacks_allowed(&self) -> bool;

    fn blobs(&self) -> &BlobStore;
}
