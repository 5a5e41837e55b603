//! Test client driving an engine over a `MemoryTransport`.

#![allow(dead_code)]

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use evalhost_engine::protocol::Message;
use evalhost_engine::{Engine, EngineConfig, EngineError, Evaluator, Exit, MemoryTransport, Routed};
use serde_json::Value;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub struct Client {
    pub engine: Arc<Engine>,
    pub transport: Arc<MemoryTransport>,
    rx: Receiver<Vec<u8>>,
    next_id: u64,
    thread: Option<JoinHandle<Result<Exit, EngineError>>>,
}

impl Client {
    /// Start an engine on its own thread and consume the hello notification.
    pub fn start<E: Evaluator + Send + 'static>(evaluator: E) -> Client {
        let client = Self::start_quiet(evaluator);
        let hello = client.recv();
        assert_eq!(hello.name(), "!evalhost");
        client
    }

    pub fn start_quiet<E: Evaluator + Send + 'static>(evaluator: E) -> Client {
        Self::start_with(EngineConfig::new().poll_interval(Duration::from_millis(5)), evaluator)
    }

    pub fn start_with<E: Evaluator + Send + 'static>(config: EngineConfig, mut evaluator: E) -> Client {
        let (transport, rx) = MemoryTransport::new();
        let transport = Arc::new(transport);
        let engine = Arc::new(Engine::new(config, transport.clone()));
        let thread = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.run(&mut evaluator))
        };
        Client {
            engine,
            transport,
            rx,
            next_id: 1000,
            thread: Some(thread),
        }
    }

    /// Send a message as the client. Requests carry their own id as
    /// correlation id.
    pub fn send(&mut self, name: &str, args: Vec<Value>, blob: Vec<u8>) -> (u64, Result<Routed, EngineError>) {
        self.next_id += 1;
        let id = self.next_id;
        let correlation_id = if name.starts_with('?') { id } else { 0 };
        let message = Message::new(id, correlation_id, name, args, blob);
        (id, self.engine.message_received(message.to_bytes()))
    }

    /// Send an eval request and return its id.
    pub fn eval(&mut self, flags: &str, expr: &str) -> u64 {
        let (id, routed) = self.send(&format!("?={}", flags), vec![Value::from(expr)], vec![]);
        assert_eq!(routed, Ok(Routed::Queued));
        id
    }

    pub fn cancel(&mut self, target: Value) {
        let (_, routed) = self.send("!/", vec![target], vec![]);
        assert_eq!(routed, Ok(Routed::Handled));
    }

    pub fn respond(&mut self, request: &Message, args: Vec<Value>) -> Result<Routed, EngineError> {
        self.next_id += 1;
        let name = format!(":{}", &request.name()[1..]);
        let message = Message::new(self.next_id, request.id(), name, args, vec![]);
        self.engine.message_received(message.to_bytes())
    }

    pub fn recv(&self) -> Message {
        let payload = self.rx.recv_timeout(TIMEOUT).expect("no message from host");
        Message::parse(payload).expect("host sent malformed message")
    }

    pub fn try_recv(&self, wait: Duration) -> Option<Message> {
        self.rx
            .recv_timeout(wait)
            .ok()
            .map(|payload| Message::parse(payload).expect("host sent malformed message"))
    }

    /// Receive the response to `id`.
    pub fn recv_response(&self, id: u64) -> Message {
        let message = self.recv();
        assert_eq!(message.correlation_id(), id, "unexpected message {:?}", message);
        assert!(message.name().starts_with(':'));
        message
    }

    /// Wait until the eval stack has `depth` entries.
    pub fn wait_for_depth(&self, depth: usize) {
        let deadline = Instant::now() + TIMEOUT;
        while self.engine.stack().depth() != depth {
            assert!(Instant::now() < deadline, "eval stack never reached depth {}", depth);
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn join(mut self) -> Result<Exit, EngineError> {
        let thread = self.thread.take().expect("engine already joined");
        let deadline = Instant::now() + TIMEOUT;
        while !thread.is_finished() {
            assert!(Instant::now() < deadline, "engine did not stop");
            std::thread::sleep(Duration::from_millis(1));
        }
        thread.join().expect("engine thread panicked")
    }

    pub fn shutdown(mut self) -> Result<Exit, EngineError> {
        let (_, routed) = self.send("!End", vec![], vec![]);
        assert_eq!(routed, Ok(Routed::Shutdown));
        self.join()
    }
}

/// Evaluator driven by `command:argument` expressions.
pub struct Script;

impl Evaluator for Script {
    fn evaluate(
        &mut self,
        input: &evalhost_engine::EvalInput<'_>,
        host: &mut dyn evalhost_engine::Host,
    ) -> Result<evalhost_engine::EvalOutput, EngineError> {
        host.enter();
        let output = self.run(input.expr, host);
        host.leave();
        output
    }
}

impl Script {
    fn run(
        &mut self,
        expr: &str,
        host: &mut dyn evalhost_engine::Host,
    ) -> Result<evalhost_engine::EvalOutput, EngineError> {
        use evalhost_engine::{EvalOutput, EvalValue, ParseStatus};

        let (command, arg) = expr.split_once(':').unwrap_or((expr, ""));
        match command {
            "value" => Ok(EvalOutput::value(EvalValue::Json(serde_json::from_str(arg).unwrap()))),
            "raw" => Ok(EvalOutput::value(EvalValue::Raw(arg.as_bytes().to_vec()))),
            "error" => Ok(EvalOutput::error(ParseStatus::Ok, arg)),
            "incomplete" => Ok(EvalOutput {
                parse_status: ParseStatus::Incomplete,
                error: None,
                value: None,
            }),
            "spin" => loop {
                host.tick(self)?;
                std::thread::sleep(Duration::from_millis(1));
            },
            "ticks" => {
                let n: u64 = arg.parse().unwrap();
                for _ in 0..n {
                    host.tick(self)?;
                    std::thread::sleep(Duration::from_millis(1));
                }
                Ok(EvalOutput::value(EvalValue::Json(Value::from(n))))
            }
            "print" => {
                host.notify("!", vec![Value::from(arg)])?;
                Ok(EvalOutput::value(EvalValue::Json(Value::Null)))
            }
            "ask" => {
                if !host.callbacks_allowed() {
                    return Ok(EvalOutput::error(
                        ParseStatus::Ok,
                        "blocking callback not allowed during evaluation",
                    ));
                }
                let response = host.request(self, "?>", vec![Value::from(arg)])?;
                Ok(EvalOutput::value(EvalValue::Json(response.args()[0].clone())))
            }
            _ => Ok(EvalOutput::error(ParseStatus::Error, format!("unknown command '{}'", command))),
        }
    }
}
