//! Length-prefixed framing over a byte stream.
//!
//! Every frame is a little-endian `u32` payload length followed by the
//! payload. A zero-length frame is a keep-alive ping in either direction.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use evalhost_engine::{Engine, Routed, Transport, TransportError};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Largest payload accepted from the client.
pub const MAX_FRAME_LEN: u32 = 1 << 30;

/// Outgoing half of the stdio transport.
///
/// `send` never blocks: frames are queued for [`write_frames`], which runs
/// on the async runtime.
pub struct StdioTransport {
    tx: Mutex<Option<UnboundedSender<Vec<u8>>>>,
    connected: AtomicBool,
}

impl StdioTransport {
    pub fn new() -> (Self, UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = unbounded_channel();
        let transport = Self {
            tx: Mutex::new(Some(tx)),
            connected: AtomicBool::new(true),
        };
        (transport, rx)
    }

    /// Mark the connection as gone. Later sends fail.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Stop accepting frames. The writer drains what is queued and ends.
    pub fn close(&self) {
        self.tx.lock().take();
    }
}

impl Transport for StdioTransport {
    fn send(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(payload).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ping(&self) -> Result<(), TransportError> {
        self.send(Vec::new())
    }
}

/// Write queued payloads as frames until every sender is gone.
pub async fn write_frames<W>(mut rx: UnboundedReceiver<Vec<u8>>, mut writer: W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(payload) = rx.recv().await {
        let len = u32::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "payload too large for frame"))?;
        writer.write_u32_le(len).await?;
        writer.write_all(&payload).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Why the read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEnd {
    /// The client closed its end of the stream.
    Eof,
    Shutdown,
    /// The engine rejected a message and is terminating.
    Fatal,
}

/// Read frames and hand them to the engine until the stream ends, the
/// client asks to shut down, or a message is fatal.
pub async fn read_frames<R>(mut reader: R, engine: &Engine) -> io::Result<ReadEnd>
where
    R: AsyncRead + Unpin,
{
    loop {
        let len = match reader.read_u32_le().await {
            Ok(len) => len,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(ReadEnd::Eof),
            Err(err) => return Err(err),
        };
        if len == 0 {
            engine.pong_received();
            continue;
        }
        if len > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {} bytes exceeds limit", len),
            ));
        }

        let mut payload = vec![0; len as usize];
        reader.read_exact(&mut payload).await?;
        match engine.message_received(payload) {
            Ok(Routed::Shutdown) => return Ok(ReadEnd::Shutdown),
            Ok(_) => {}
            Err(_) => return Ok(ReadEnd::Fatal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use evalhost_engine::protocol::Message;
    use evalhost_engine::EngineConfig;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut bytes = (payload.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[tokio::test]
    async fn test_write_frames() {
        let (tx, rx) = unbounded_channel();
        tx.send(b"abc".to_vec()).unwrap();
        tx.send(Vec::new()).unwrap();
        drop(tx);

        let mut out = Vec::new();
        write_frames(rx, &mut out).await.unwrap();
        assert_eq!(out, [frame(b"abc"), frame(b"")].concat());
    }

    #[tokio::test]
    async fn test_read_frames_until_shutdown() {
        let (transport, mut rx) = StdioTransport::new();
        let transport = Arc::new(transport);
        let engine = Engine::new(EngineConfig::new(), transport.clone());

        let create = Message::new(1, 1, "?CreateBlob", vec![], b"xyz".to_vec());
        let end = Message::new(2, 0, "!End", vec![], vec![]);
        let input = [frame(&[]), frame(&create.to_bytes()), frame(&end.to_bytes())].concat();

        let end = read_frames(&input[..], &engine).await.unwrap();
        assert_eq!(end, ReadEnd::Shutdown);

        let response = Message::parse(rx.recv().await.unwrap()).unwrap();
        assert_eq!(response.name(), ":CreateBlob");
        assert_eq!(response.correlation_id(), 1);
    }

    #[tokio::test]
    async fn test_read_frames_eof() {
        let (transport, _rx) = StdioTransport::new();
        let engine = Engine::new(EngineConfig::new(), Arc::new(transport));
        let end = read_frames(&[][..], &engine).await.unwrap();
        assert_eq!(end, ReadEnd::Eof);
    }

    #[tokio::test]
    async fn test_read_frames_fatal() {
        let (transport, _rx) = StdioTransport::new();
        let engine = Engine::new(EngineConfig::new(), Arc::new(transport));
        let input = frame(b"short");
        let end = read_frames(&input[..], &engine).await.unwrap();
        assert_eq!(end, ReadEnd::Fatal);
        assert!(engine.is_terminated());
    }

    #[test]
    fn test_send_after_close_fails() {
        let (transport, _rx) = StdioTransport::new();
        assert!(transport.send(vec![1]).is_ok());
        transport.close();
        assert_eq!(transport.send(vec![1]), Err(TransportError::Closed));

        let (transport, _rx) = StdioTransport::new();
        transport.disconnect();
        assert!(!transport.is_connected());
        assert_eq!(transport.ping(), Err(TransportError::Closed));
    }
}
