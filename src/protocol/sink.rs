//! Session output channel.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::frame::encode;

/// Cloneable handle for writing to a session's output stream.
///
/// Writes are queued to a dedicated writer task, so they never block the
/// caller. Once the stream is gone every write is a silent no-op, which
/// lets late responses from in-flight work land harmlessly after teardown.
#[derive(Debug, Clone)]
pub struct OutputSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl OutputSink {
    /// Create a sink and the receiving end of its queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Write unframed text, such as a trace line.
    pub fn write(&self, text: &str) {
        let bytes: Vec<u8> = text.bytes().filter(|b| *b != super::SENTINEL).collect();
        if !bytes.is_empty() {
            let _ = self.tx.send(bytes);
        }
    }

    /// Write one complete response: text followed by the sentinel.
    pub fn frame(&self, text: &str) {
        let _ = self.tx.send(encode(text));
    }

    /// Whether the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the task that drains a sink into `writer`.
///
/// The task ends when every sink clone is dropped or the writer fails.
pub fn spawn_writer<W>(writer: W) -> (OutputSink, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (sink, rx) = OutputSink::channel();
    let handle = tokio::spawn(drain(rx, writer));
    (sink, handle)
}

async fn drain<W>(mut rx: mpsc::UnboundedReceiver<Vec<u8>>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(bytes) = rx.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            warn!("Output write failed: {}", e);
            break;
        }
        if let Err(e) = writer.flush().await {
            warn!("Output flush failed: {}", e);
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Output shutdown: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_writer_frames_in_order() {
        let (client, server) = tokio::io::duplex(64);
        let (sink, handle) = spawn_writer(server);

        sink.write("IN  000000: { a: 1 }\n");
        sink.frame("3");
        sink.frame("");
        drop(sink);
        handle.await.unwrap();

        let mut buf = Vec::new();
        let mut client = client;
        client.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"IN  000000: { a: 1 }\n3\0\0".to_vec());
    }

    #[tokio::test]
    async fn test_write_after_close_is_noop() {
        let (sink, rx) = OutputSink::channel();
        drop(rx);
        assert!(sink.is_closed());
        sink.frame("late");
        sink.write("late");
    }
}
