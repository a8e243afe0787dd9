//! Dedicated writer task for outbound messages.
//!
//! The connection task and every outstanding [`Completion`] hold a cloneable
//! [`WriterHandle`]. Messages are encoded by the sender and handed to a single
//! writer task over an mpsc channel, so sending never blocks and never needs
//! a lock around the transport.
//!
//! ```text
//! Connection  ─┐
//! Completion 1 ┼─► mpsc::UnboundedSender<String> ─► Writer Task ─► transport
//! Completion N ┘
//! ```
//!
//! On a byte stream the writer appends the newline terminator and batches
//! whatever is queued into one write. On a message transport each message is
//! handed to a [`SessionWriter`] unchanged.
//!
//! [`Completion`]: crate::handler::Completion

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{PeerwireError, Result};
use crate::protocol::{Message, LINE_TERMINATOR};

/// Maximum messages to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Outbound side of a message-based transport session.
///
/// Implemented by whatever owns the session (an HTTP push channel, a
/// websocket, a test harness). Each call carries exactly one encoded message.
pub trait SessionWriter: Send + 'static {
    /// Deliver one message to the peer.
    fn write(&mut self, payload: String) -> std::io::Result<()>;
}

impl SessionWriter for mpsc::UnboundedSender<String> {
    fn write(&mut self, payload: String) -> std::io::Result<()> {
        self.send(payload).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "session receiver dropped")
        })
    }
}

/// Handle for sending messages to the writer task.
///
/// Cheaply cloneable; clones feed the same writer.
#[derive(Clone, Debug)]
pub struct WriterHandle {
    tx: mpsc::UnboundedSender<String>,
}

impl WriterHandle {
    pub(crate) fn from_sender(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// Encode and queue a message.
    ///
    /// Returns `ConnectionClosed` once the writer task has stopped.
    pub fn send(&self, message: &Message) -> Result<()> {
        let encoded = message.encode()?;
        self.tx
            .send(encoded)
            .map_err(|_| PeerwireError::ConnectionClosed)
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn a writer task for a byte stream.
///
/// Every message is written followed by a single `\n`.
pub fn spawn_line_writer<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(line_writer_loop(rx, writer));
    (WriterHandle::from_sender(tx), task)
}

/// Spawn a writer task for a message transport session.
pub fn spawn_message_writer<S>(sink: S) -> (WriterHandle, JoinHandle<Result<()>>)
where
    S: SessionWriter,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(message_writer_loop(rx, sink));
    (WriterHandle::from_sender(tx), task)
}

/// Main line writer loop - receives messages and writes them to the stream.
///
/// Shuts the stream down once every handle is dropped.
async fn line_writer_loop<W>(mut rx: mpsc::UnboundedReceiver<String>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(8 * 1024);

    while let Some(first) = rx.recv().await {
        let mut batched = 1;
        append_line(&mut buf, &first);

        while batched < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(next) => {
                    append_line(&mut buf, &next);
                    batched += 1;
                }
                Err(_) => break,
            }
        }

        writer.write_all(&buf).await?;
        writer.flush().await?;
        buf.clear();
    }

    // Peer may already be gone; nothing left to report.
    let _ = writer.shutdown().await;
    Ok(())
}

fn append_line(buf: &mut BytesMut, line: &str) {
    buf.extend_from_slice(line.as_bytes());
    buf.extend_from_slice(&[LINE_TERMINATOR]);
}

async fn message_writer_loop<S>(mut rx: mpsc::UnboundedReceiver<String>, mut sink: S) -> Result<()>
where
    S: SessionWriter,
{
    while let Some(payload) = rx.recv().await {
        sink.write(payload)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Response;
    use serde_json::json;
    use std::io::Cursor;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_line_writer_appends_terminator() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_line_writer(client);

        handle
            .send(&Message::from(Response::ok(1, json!(5))))
            .unwrap();

        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();

        assert_eq!(&buf[..n], b"{\"id\":1,\"result\":5}\n");
    }

    #[tokio::test]
    async fn test_line_writer_preserves_order() {
        let (client, mut server) = duplex(64 * 1024);
        let (handle, task) = spawn_line_writer(client);

        for i in 0..100u64 {
            handle
                .send(&Message::from(Response::ok(i, json!(i))))
                .unwrap();
        }
        drop(handle);
        task.await.unwrap().unwrap();

        let mut out = String::new();
        server.read_to_string(&mut out).await.unwrap();
        let ids: Vec<u64> = out
            .lines()
            .map(|l| serde_json::from_str::<Response>(l).unwrap().id)
            .collect();

        assert_eq!(ids, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_line_writer_loop_into_cursor() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("a".to_string()).unwrap();
        tx.send("b".to_string()).unwrap();
        drop(tx);

        let mut cursor = Cursor::new(Vec::new());
        line_writer_loop(rx, &mut cursor).await.unwrap();

        assert_eq!(cursor.into_inner(), b"a\nb\n");
    }

    #[tokio::test]
    async fn test_message_writer_has_no_terminator() {
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel::<String>();
        let (handle, _task) = spawn_message_writer(sink_tx);

        handle
            .send(&Message::from(Response::ok(2, json!("x"))))
            .unwrap();

        let payload = sink_rx.recv().await.unwrap();
        assert_eq!(payload, "{\"id\":2,\"result\":\"x\"}");
    }

    #[tokio::test]
    async fn test_send_after_writer_stopped() {
        let (sink_tx, sink_rx) = mpsc::unbounded_channel::<String>();
        drop(sink_rx);
        let (handle, task) = spawn_message_writer(sink_tx);

        handle
            .send(&Message::from(Response::ok(0, json!(null))))
            .unwrap();
        assert!(task.await.unwrap().is_err());

        let result = handle.send(&Message::from(Response::ok(1, json!(null))));
        assert!(matches!(result, Err(PeerwireError::ConnectionClosed)));
        assert!(handle.is_closed());
    }
}
