//! End-to-end tests against the `evalhost` binary over its stdio framing.

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use evalhost_engine::protocol::Message;
use serde_json::{json, Value};

const TIMEOUT: Duration = Duration::from_secs(10);

struct HostProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    frames: Receiver<Vec<u8>>,
    next_id: u64,
}

impl HostProcess {
    fn spawn(args: &[&str]) -> HostProcess {
        let exe = env!("CARGO_BIN_EXE_evalhost");
        let mut child = Command::new(exe)
            .args(["--poll-interval-ms", "5", "--log-level", "warn"])
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn evalhost");

        let stdin = child.stdin.take();
        let mut stdout = child.stdout.take().expect("stdout");
        let (tx, frames) = mpsc::channel();
        std::thread::spawn(move || loop {
            let mut len = [0u8; 4];
            if stdout.read_exact(&mut len).is_err() {
                return;
            }
            let mut payload = vec![0; u32::from_le_bytes(len) as usize];
            if stdout.read_exact(&mut payload).is_err() || tx.send(payload).is_err() {
                return;
            }
        });

        let mut host = HostProcess {
            child,
            stdin,
            frames,
            next_id: 0,
        };
        let hello = host.recv();
        assert_eq!(hello.name(), "!evalhost");
        assert_eq!(hello.args()[1], json!("evalhost"));
        host
    }

    fn write_frame(&mut self, payload: &[u8]) {
        let stdin = self.stdin.as_mut().expect("stdin closed");
        stdin.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
        stdin.write_all(payload).unwrap();
        stdin.flush().unwrap();
    }

    fn send(&mut self, name: &str, args: Vec<Value>, blob: Vec<u8>) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        let correlation_id = if name.starts_with('?') { id } else { 0 };
        let message = Message::new(id, correlation_id, name, args, blob);
        self.write_frame(&message.to_bytes());
        id
    }

    fn respond(&mut self, request: &Message, args: Vec<Value>) {
        self.next_id += 1;
        let name = format!(":{}", &request.name()[1..]);
        let message = Message::new(self.next_id, request.id(), name, args, vec![]);
        self.write_frame(&message.to_bytes());
    }

    fn eval(&mut self, flags: &str, expr: &str) -> u64 {
        self.send(&format!("?={}", flags), vec![json!(expr)], vec![])
    }

    fn recv_frame(&self, wait: Duration) -> Option<Vec<u8>> {
        self.frames.recv_timeout(wait).ok()
    }

    /// Next message, skipping keep-alive pings.
    fn recv(&self) -> Message {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            let payload = self.recv_frame(wait).expect("no message from host");
            if !payload.is_empty() {
                return Message::parse(payload).expect("malformed message from host");
            }
        }
    }

    fn recv_response(&self, id: u64) -> Message {
        let message = self.recv();
        assert_eq!(message.correlation_id(), id, "unexpected message {:?}", message);
        message
    }

    fn wait(mut self) -> Option<i32> {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            if let Some(status) = self.child.try_wait().unwrap() {
                return status.code();
            }
            assert!(Instant::now() < deadline, "evalhost did not exit");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn shutdown(mut self) -> Option<i32> {
        self.send("!End", vec![], vec![]);
        self.wait()
    }
}

impl Drop for HostProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

#[test]
fn test_simple_eval() {
    let mut host = HostProcess::spawn(&[]);
    let id = host.eval("", "1+1");
    let response = host.recv_response(id);
    assert_eq!(response.name(), ":=");
    assert_eq!(response.args(), &[json!("OK"), Value::Null, json!(2)]);
    assert_eq!(host.shutdown(), Some(0));
}

#[test]
fn test_globals_and_errors() {
    let mut host = HostProcess::spawn(&[]);
    let id = host.eval("", "x = 20; x * 2");
    assert_eq!(host.recv_response(id).args()[2], json!(40));

    let id = host.eval("", "y");
    assert_eq!(
        host.recv_response(id).args(),
        &[json!("OK"), json!("object 'y' not found"), Value::Null]
    );

    let id = host.eval("", "(x");
    assert_eq!(host.recv_response(id).args()[0], json!("INCOMPLETE"));
    assert_eq!(host.shutdown(), Some(0));
}

#[test]
fn test_output_and_input() {
    let mut host = HostProcess::spawn(&[]);
    let id = host.eval("@", "print('asking'); 'hi ' + ask('name?')");

    let output = host.recv();
    assert_eq!(output.name(), "!");
    assert_eq!(output.args(), &[json!("asking\n")]);

    let request = host.recv();
    assert_eq!(request.name(), "?>");
    host.respond(&request, vec![json!("Ada")]);

    assert_eq!(host.recv_response(id).args()[2], json!("hi Ada"));
    assert_eq!(host.shutdown(), Some(0));
}

#[test]
fn test_unknown_eval_flag_is_fatal() {
    let mut host = HostProcess::spawn(&[]);
    host.eval("Z", "1");
    assert_eq!(host.recv().name(), "!End");
    assert_eq!(host.wait(), Some(1));
}

#[test]
fn test_blob_lifecycle() {
    let mut host = HostProcess::spawn(&[]);
    let id = host.send("?CreateBlob", vec![], vec![1, 2, 3]);
    let handle = host.recv_response(id).args()[0].clone();

    let id = host.send("?GetBlob", vec![handle.clone()], vec![]);
    assert_eq!(host.recv_response(id).blob(), &[1, 2, 3]);

    host.send("!DestroyBlob", vec![handle.clone()], vec![]);
    host.send("?GetBlob", vec![handle], vec![]);
    assert_eq!(host.recv().name(), "!End");
    assert_eq!(host.wait(), Some(1));
}

#[test]
fn test_blob_from_script() {
    let mut host = HostProcess::spawn(&[]);
    let id = host.eval("", "blob('payload')");
    let handle = host.recv_response(id).args()[2].clone();

    let id = host.send("?GetBlob", vec![handle], vec![]);
    assert_eq!(host.recv_response(id).blob(), b"payload");

    let id = host.eval("r", "'raw bytes'");
    let response = host.recv_response(id);
    assert_eq!(response.blob(), b"raw bytes");
    assert_eq!(response.args()[2], Value::Null);
    assert_eq!(host.shutdown(), Some(0));
}

#[test]
fn test_cancel_running_eval() {
    let mut host = HostProcess::spawn(&[]);
    let id = host.eval("/", "print('started'); spin()");
    assert_eq!(host.recv().name(), "!");

    host.send("!/", vec![json!(id)], vec![]);
    assert_eq!(host.recv_response(id).args(), &[Value::Null]);

    let id = host.eval("", "1");
    assert_eq!(host.recv_response(id).args()[2], json!(1));
    assert_eq!(host.shutdown(), Some(0));
}

#[test]
fn test_cancel_all() {
    let mut host = HostProcess::spawn(&[]);
    let outer = host.eval("@/", "print('outer'); spin()");
    assert_eq!(host.recv().name(), "!");
    let inner = host.eval("/", "print('inner'); spin()");
    assert_eq!(host.recv().name(), "!");

    host.send("!/", vec![Value::Null], vec![]);
    assert_eq!(host.recv_response(inner).args(), &[Value::Null]);
    assert_eq!(host.recv_response(outer).args(), &[Value::Null]);
    assert_eq!(host.recv().name(), "!CanceledAll");
    assert_eq!(host.shutdown(), Some(0));
}

#[test]
fn test_cancel_unknown_eval_is_ignored() {
    let mut host = HostProcess::spawn(&[]);
    host.send("!/", vec![json!(12345)], vec![]);
    assert!(host.recv_frame(Duration::from_millis(200)).is_none());

    let id = host.eval("", "2 * 3");
    assert_eq!(host.recv_response(id).args()[2], json!(6));
    assert_eq!(host.shutdown(), Some(0));
}

#[test]
fn test_unexpected_response_is_fatal() {
    let mut host = HostProcess::spawn(&[]);
    let message = Message::new(50, 49, ":>", vec![json!("stray")], vec![]);
    host.write_frame(&message.to_bytes());
    assert_eq!(host.recv().name(), "!End");
    assert_eq!(host.wait(), Some(1));
}

#[test]
fn test_malformed_frame_is_fatal() {
    let mut host = HostProcess::spawn(&[]);
    host.write_frame(b"too short");
    assert_eq!(host.recv().name(), "!End");
    assert_eq!(host.wait(), Some(1));
}

#[test]
fn test_closing_stdin_ends_host() {
    let mut host = HostProcess::spawn(&[]);
    host.stdin.take();
    assert_eq!(host.wait(), Some(1));
}

#[test]
fn test_keepalive_ping() {
    let mut host = HostProcess::spawn(&["--keepalive-secs", "1", "--keepalive-timeout-secs", "30"]);
    let ping = host.recv_frame(Duration::from_secs(5)).expect("no ping");
    assert!(ping.is_empty());

    // Answer with a pong; the host keeps serving.
    host.write_frame(&[]);
    let id = host.eval("", "len('four')");
    assert_eq!(host.recv_response(id).args()[2], json!(4));
    assert_eq!(host.shutdown(), Some(0));
}
