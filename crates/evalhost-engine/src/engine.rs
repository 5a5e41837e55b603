//! The engine context object and the evaluation loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use evalhost_protocol::{names, BlobStore, Message, MessageIds};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::evaluator::{EvalInput, EvalOutput, EvalValue, Evaluator, Host, ResultMode};
use crate::keepalive::{KeepAlive, KeepAliveAction};
use crate::pending::PendingResponse;
use crate::queue::{EvalQueue, EvalRequest};
use crate::signal::Signal;
use crate::stack::EvalStack;
use crate::transport::Transport;

/// Version of the message protocol announced in the hello notification.
pub const PROTOCOL_VERSION: f64 = 1.0;

/// How [`Engine::run`] ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The client sent `!End`.
    Shutdown,
}

/// All protocol state for one connection.
///
/// Locks: `stack`, the queue, the pending slot, the blob map and
/// `termination` are independent. No function holds two of them at once, and
/// none is held across a call into the evaluator or the transport.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) ids: MessageIds,
    pub(crate) stack: Mutex<EvalStack>,
    pub(crate) queue: EvalQueue,
    pub(crate) pending: PendingResponse,
    pub(crate) blobs: BlobStore,
    pub(crate) signal: Signal,
    pub(crate) keepalive: KeepAlive,
    /// Whether queued evaluations may run nested in the current one.
    allow_callbacks: AtomicBool,
    /// First reason the engine must stop, set from either side.
    termination: Mutex<Option<EngineError>>,
}

impl Engine {
    pub fn new(config: EngineConfig, transport: Arc<dyn Transport>) -> Self {
        let keepalive = KeepAlive::new(config.keepalive_interval, config.keepalive_timeout);
        Self {
            config,
            transport,
            ids: MessageIds::new(),
            stack: Mutex::new(EvalStack::new()),
            queue: EvalQueue::new(),
            pending: PendingResponse::new(),
            blobs: BlobStore::new(),
            signal: Signal::new(),
            keepalive,
            allow_callbacks: AtomicBool::new(true),
            termination: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Snapshot of the eval stack and cancellation state.
    pub fn stack(&self) -> EvalStack {
        self.stack.lock().clone()
    }

    /// Number of eval requests waiting to start.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Serve the connection on the calling thread until shutdown or a fatal
    /// error.
    ///
    /// This thread owns `evaluator`; every evaluation, nested or not, runs
    /// on it.
    pub fn run(&self, evaluator: &mut dyn Evaluator) -> Result<Exit, EngineError> {
        tracing::info!(host = %self.config.host_name, "Engine started");

        let err = match self.announce() {
            Ok(()) => loop {
                match self.idle_step(evaluator) {
                    Ok(()) => {}
                    Err(EngineError::Canceled) => {
                        if let Err(err) = self.finish_cancel_all() {
                            break err;
                        }
                    }
                    Err(err) => break err,
                }
            },
            Err(err) => err,
        };

        if err == EngineError::Shutdown {
            tracing::info!("Engine stopped by client");
            return Ok(Exit::Shutdown);
        }

        tracing::error!(error = %err, "Engine terminated");
        self.terminate(err.clone());
        if self.transport.is_connected() {
            let _ = self.send_notification(names::END, vec![], vec![]);
        }
        Err(err)
    }

    fn announce(&self) -> Result<(), EngineError> {
        self.send_notification(
            names::HELLO,
            vec![
                json!(PROTOCOL_VERSION),
                json!(self.config.host_name),
                json!(env!("CARGO_PKG_VERSION")),
            ],
            vec![],
        )?;
        Ok(())
    }

    /// One turn of the top-level loop: run the next queued evaluation, or
    /// wait for work.
    fn idle_step(&self, evaluator: &mut dyn Evaluator) -> Result<(), EngineError> {
        let seen = self.signal.generation();
        self.check_alive()?;
        if self.query_interrupt() {
            return Err(EngineError::Canceled);
        }
        if let Some(request) = self.queue.pop() {
            return self.handle_eval(request, evaluator);
        }
        self.signal.wait(seen, self.config.poll_interval);
        Ok(())
    }

    fn finish_cancel_all(&self) -> Result<(), EngineError> {
        if self.stack.lock().finish_cancel_all() {
            tracing::info!("All evaluations canceled");
            self.send_notification(names::CANCELED_ALL, vec![], vec![])?;
        }
        Ok(())
    }

    /// Whether running code should unwind for cancellation now.
    pub fn query_interrupt(&self) -> bool {
        self.stack.lock().query_interrupt()
    }

    /// Fails once the engine has been told to stop or the transport is gone.
    pub fn check_alive(&self) -> Result<(), EngineError> {
        if let Some(reason) = self.termination.lock().clone() {
            return Err(reason);
        }
        if !self.transport.is_connected() {
            return Err(EngineError::ConnectionLost);
        }
        Ok(())
    }

    /// Record why the engine must stop and wake the interpreter thread. The
    /// first reason wins.
    pub fn terminate(&self, reason: EngineError) {
        {
            let mut termination = self.termination.lock();
            if termination.is_none() {
                *termination = Some(reason);
            }
        }
        self.signal.notify();
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.lock().is_some()
    }

    /// Called by the transport when the connection closes.
    pub fn disconnected(&self) {
        tracing::warn!("Transport disconnected");
        self.signal.notify();
    }

    /// Drive the keep-alive. Called periodically by the transport side.
    pub fn keepalive_tick(&self) -> Result<(), EngineError> {
        match self.keepalive.poll() {
            KeepAliveAction::Idle => Ok(()),
            KeepAliveAction::SendPing => {
                tracing::debug!("Sending keep-alive ping");
                self.transport.ping()?;
                Ok(())
            }
            KeepAliveAction::Expired => {
                let err = EngineError::KeepAliveExpired(self.keepalive.timeout());
                tracing::error!(error = %err, "Keep-alive expired");
                self.terminate(err.clone());
                Err(err)
            }
        }
    }

    pub fn callbacks_allowed(&self) -> bool {
        self.allow_callbacks.load(Ordering::SeqCst)
    }

    fn scoped_callbacks(&self, allowed: bool) -> CallbacksGuard<'_> {
        let previous = self.allow_callbacks.swap(allowed, Ordering::SeqCst);
        CallbacksGuard {
            flag: &self.allow_callbacks,
            previous,
        }
    }

    /// Checkpoint inside a running evaluation: unwind if canceled, otherwise
    /// run queued evaluations if the current one allows it.
    pub fn callback(&self, evaluator: &mut dyn Evaluator) -> Result<(), EngineError> {
        self.check_alive()?;
        if self.query_interrupt() {
            return Err(EngineError::Canceled);
        }
        if self.callbacks_allowed() {
            while let Some(request) = self.queue.pop() {
                self.handle_eval(request, evaluator)?;
            }
        }
        Ok(())
    }

    /// Run one eval request and respond to it.
    ///
    /// Returns `Err(Canceled)` if a cancellation targeting an enclosing
    /// evaluation is still in progress afterwards, so the caller keeps
    /// unwinding.
    pub(crate) fn handle_eval(&self, request: EvalRequest, evaluator: &mut dyn Evaluator) -> Result<(), EngineError> {
        let _callbacks = self.scoped_callbacks(request.flags.reentrant);
        let id = request.id();
        tracing::debug!(id, expr = %request.expr, "Evaluating");

        let result = if request.flags.no_result {
            ResultMode::None
        } else if request.flags.raw {
            ResultMode::Raw
        } else {
            ResultMode::Json
        };
        let input = EvalInput {
            id,
            expr: &request.expr,
            env: request.flags.env,
            new_env: request.flags.new_env,
            result,
        };

        let outcome = {
            let mut scope = EvalScope::new(self, id, request.flags.cancelable);
            let outcome = evaluator.evaluate(&input, &mut scope);
            // The evaluator may have been unwound past its own `leave`.
            scope.leave();
            outcome
        };

        match outcome {
            Ok(output) => {
                let (args, blob) = eval_response(output, request.flags.no_result);
                self.respond(&request.message, args, blob)?;
            }
            Err(EngineError::Canceled) => {
                tracing::info!(id, "Evaluation canceled");
                self.respond(&request.message, vec![Value::Null], vec![])?;
            }
            Err(err) => return Err(err),
        }

        if self.query_interrupt() {
            return Err(EngineError::Canceled);
        }
        Ok(())
    }
}

fn eval_response(output: EvalOutput, no_result: bool) -> (Vec<Value>, Vec<u8>) {
    let error = output.error.map(Value::String).unwrap_or(Value::Null);
    let (value, blob) = match output.value {
        Some(_) if no_result => (Value::Null, Vec::new()),
        Some(EvalValue::Json(value)) => (value, Vec::new()),
        Some(EvalValue::Raw(bytes)) => (Value::Null, bytes),
        None => (Value::Null, Vec::new()),
    };
    (vec![json!(output.parse_status.as_str()), error, value], blob)
}

/// Restores the previous re-entrancy flag when an evaluation ends.
struct CallbacksGuard<'a> {
    flag: &'a AtomicBool,
    previous: bool,
}

impl Drop for CallbacksGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::SeqCst);
    }
}

/// The [`Host`] handed to one evaluation. Owns that evaluation's eval stack
/// entry and pops it exactly once, on whichever exit path comes first.
struct EvalScope<'e> {
    engine: &'e Engine,
    id: u64,
    cancelable: bool,
    entered: bool,
    left: bool,
}

impl<'e> EvalScope<'e> {
    fn new(engine: &'e Engine, id: u64, cancelable: bool) -> Self {
        Self {
            engine,
            id,
            cancelable,
            entered: false,
            left: false,
        }
    }
}

impl Host for EvalScope<'_> {
    fn enter(&mut self) {
        if self.entered {
            return;
        }
        self.engine.stack.lock().push(self.id, self.cancelable);
        self.entered = true;
    }

    fn leave(&mut self) {
        if !self.entered || self.left {
            return;
        }
        self.left = true;
        self.engine.stack.lock().pop(self.id);
    }

    fn tick(&mut self, evaluator: &mut dyn Evaluator) -> Result<(), EngineError> {
        self.engine.callback(evaluator)
    }

    fn notify(&mut self, name: &str, args: Vec<Value>) -> Result<(), EngineError> {
        self.engine.check_alive()?;
        self.engine.send_notification(name, args, vec![])?;
        Ok(())
    }

    fn request(&mut self, evaluator: &mut dyn Evaluator, name: &str, args: Vec<Value>) -> Result<Message, EngineError> {
        self.engine.check_alive()?;
        self.engine.send_request(name, args, evaluator)
    }

    fn callbacks_allowed(&self) -> bool {
        self.engine.callbacks_allowed()
    }

    fn blobs(&self) -> &BlobStore {
        &self.engine.blobs
    }
}

impl Drop for EvalScope<'_> {
    fn drop(&mut self) {
        self.leave();
    }
}
