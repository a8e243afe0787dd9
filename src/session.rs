//! Session runtime: one task per connection.
//!
//! A session owns a [`Connection`] and drives it from two sources:
//! 1. Transport deliveries, cut into frames by the [`Framer`]
//! 2. Commands from proxies and handles (outgoing calls, close)
//!
//! Everything the connection does happens on this task, in arrival order.
//! When the loop ends (EOF, fatal error, or close) the command channel is
//! shut, every pending call fails with `ConnectionClosed` and the outcome is
//! returned from [`Session::wait`].

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::connection::{Command, Connection, ConnectionHandle, Events};
use crate::error::{PeerwireError, Result};
use crate::handler::DispatchTable;
use crate::node::{NodeConfig, Wrapper};
use crate::protocol::Framer;
use crate::remote::{RemoteHandle, RemoteProxy};
use crate::writer::{spawn_line_writer, spawn_message_writer, SessionWriter, WriterHandle};

/// A running connection.
///
/// Dropping a `Session` does not stop the connection; use
/// [`Session::close`] or let the transport end.
#[derive(Debug)]
pub struct Session {
    handle: ConnectionHandle,
    remote: RemoteHandle,
    task: JoinHandle<Result<()>>,
}

impl Session {
    /// Serial number of the connection within its node.
    pub fn id(&self) -> u64 {
        self.handle.id()
    }

    /// Control handle for the connection.
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Watch for the remote proxy without waiting.
    pub fn remote_handle(&self) -> RemoteHandle {
        self.remote.clone()
    }

    /// Wait for discovery to complete and return the peer's proxy.
    pub async fn remote(&self) -> Result<RemoteProxy> {
        self.remote.ready().await
    }

    /// Close the connection.
    pub fn close(&self) {
        self.handle.close();
    }

    /// Whether the connection task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the connection to end.
    ///
    /// Returns `Ok` on a clean close and the fatal error otherwise.
    pub async fn wait(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| PeerwireError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

/// What a session needs from its node.
pub(crate) struct Setup<'a> {
    pub(crate) id: u64,
    pub(crate) wrapper: &'a Wrapper,
    pub(crate) config: NodeConfig,
    pub(crate) events: Events,
}

/// Where inbound chunks come from.
enum Source<R> {
    Stream { reader: R, buf: Vec<u8> },
    Messages(mpsc::UnboundedReceiver<Bytes>),
}

impl<R: AsyncRead + Unpin> Source<R> {
    /// Next transport delivery, `None` at end of input.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match self {
            Source::Stream { reader, buf } => {
                let n = reader.read(buf).await?;
                if n == 0 {
                    Ok(None)
                } else {
                    Ok(Some(Bytes::copy_from_slice(&buf[..n])))
                }
            }
            Source::Messages(rx) => Ok(rx.recv().await),
        }
    }
}

/// Run a connection over a byte stream.
pub(crate) fn spawn_stream<S>(setup: Setup<'_>, stream: S) -> Session
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, write_half) = tokio::io::split(stream);
    let (writer, _writer_task) = spawn_line_writer(write_half);
    let source = Source::Stream {
        reader,
        buf: vec![0u8; setup.config.read_buffer_size],
    };
    let framer = Framer::lines(setup.config.max_frame_size);
    start(setup, writer, framer, source)
}

/// Run a connection over a message transport session.
pub(crate) fn spawn_messages<W>(
    setup: Setup<'_>,
    inbound: mpsc::UnboundedReceiver<Bytes>,
    sink: W,
) -> Session
where
    W: SessionWriter,
{
    let (writer, _writer_task) = spawn_message_writer(sink);
    let source: Source<tokio::io::Empty> = Source::Messages(inbound);
    start(setup, writer, Framer::messages(), source)
}

fn start<R>(setup: Setup<'_>, writer: WriterHandle, framer: Framer, source: Source<R>) -> Session
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (remote_tx, remote_rx) = watch::channel(None);
    let remote = RemoteHandle::new(remote_rx);
    let dispatch: Arc<DispatchTable> = setup.wrapper.build(remote.clone());

    let conn = Connection::new(
        setup.id,
        dispatch,
        writer,
        commands_tx,
        remote_tx,
        setup.events,
    );
    let handle = conn.handle();

    tracing::debug!(conn = setup.id, "Connection opened");
    let task = tokio::spawn(run(setup.id, conn, framer, source, commands_rx));

    Session {
        handle,
        remote,
        task,
    }
}

/// Proxy commands not yet taken by the connection.
///
/// Shutting down (or dropping, also on unwind) fails every queued call.
struct Inbox(mpsc::UnboundedReceiver<Command>);

impl Inbox {
    fn shutdown(&mut self) {
        self.0.close();
        while let Ok(command) = self.0.try_recv() {
            if let Command::Call { completion, .. } = command {
                completion(Err(PeerwireError::ConnectionClosed));
            }
        }
    }
}

impl Drop for Inbox {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run<R>(
    id: u64,
    mut conn: Connection,
    mut framer: Framer,
    mut source: Source<R>,
    commands: mpsc::UnboundedReceiver<Command>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut inbox = Inbox(commands);
    let result = drive(&mut conn, &mut framer, &mut source, &mut inbox.0).await;

    // Pending calls fail first, oldest id first, then anything still queued.
    conn.close();
    inbox.shutdown();

    match &result {
        Ok(()) => tracing::debug!(conn = id, "Connection closed"),
        Err(e) => tracing::error!(conn = id, "Connection failed: {}", e),
    }
    result
}

async fn drive<R>(
    conn: &mut Connection,
    framer: &mut Framer,
    source: &mut Source<R>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    conn.on_connect()?;

    loop {
        tokio::select! {
            chunk = source.next_chunk() => {
                let Some(chunk) = chunk? else {
                    return Ok(());
                };
                for frame in framer.push(chunk)? {
                    conn.on_frame(&frame)?;
                }
                framer.check()?;
            }
            command = commands.recv() => match command {
                Some(Command::Call { method, arguments, completion }) => {
                    conn.call(method, arguments, completion)?;
                }
                Some(Command::Close) | None => return Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn setup(wrapper: &Wrapper) -> Setup<'_> {
        Setup {
            id: 7,
            wrapper,
            config: NodeConfig::default(),
            events: Events::default(),
        }
    }

    #[tokio::test]
    async fn test_stream_session_sends_discovery_first() {
        let wrapper = Wrapper::shared(DispatchTable::new());
        let (local, peer) = tokio::io::duplex(4096);
        let session = spawn_stream(setup(&wrapper), local);
        assert_eq!(session.id(), 7);

        let mut lines = BufReader::new(peer).lines();
        let first = lines.next_line().await.unwrap().unwrap();

        assert_eq!(first, r#"{"id":0,"method":"methods","arguments":[]}"#);
    }

    #[tokio::test]
    async fn test_eof_closes_cleanly() {
        let wrapper = Wrapper::shared(DispatchTable::new());
        let (local, peer) = tokio::io::duplex(4096);
        let session = spawn_stream(setup(&wrapper), local);

        drop(peer);

        assert!(session.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_frame_fails_session() {
        let wrapper = Wrapper::shared(DispatchTable::new());
        let (local, mut peer) = tokio::io::duplex(4096);
        let session = spawn_stream(setup(&wrapper), local);

        peer.write_all(b"{not json}\n").await.unwrap();

        let err = session.wait().await.unwrap_err();
        assert!(matches!(err, PeerwireError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_close_fails_queued_calls() {
        let wrapper = Wrapper::shared(DispatchTable::new());
        let (local, peer) = tokio::io::duplex(4096);
        let session = spawn_stream(setup(&wrapper), local);

        let (_read_half, mut write_half) = tokio::io::split(peer);
        write_half
            .write_all(b"{\"id\":0,\"result\":[\"methods\",\"slow\"]}\n")
            .await
            .unwrap();
        let remote = session.remote().await.unwrap();

        let pending = tokio::spawn({
            let remote = remote.clone();
            async move { remote.request("slow", vec![json!(1)]).await }
        });
        tokio::task::yield_now().await;

        session.close();
        let result = pending.await.unwrap();

        assert!(matches!(result, Err(PeerwireError::ConnectionClosed)));
        assert!(matches!(
            remote.request("slow", vec![]).await,
            Err(PeerwireError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_message_session_round_trip() {
        let wrapper =
            Wrapper::shared(DispatchTable::new().method("add", |(x, y): (i64, i64)| x + y));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let _session = spawn_messages(setup(&wrapper), inbound_rx, out_tx);

        let discovery = out_rx.recv().await.unwrap();
        assert_eq!(discovery, r#"{"id":0,"method":"methods","arguments":[]}"#);

        inbound_tx
            .send(Bytes::from_static(
                br#"{"id":3,"method":"add","arguments":[2,3]}"#,
            ))
            .unwrap();

        assert_eq!(out_rx.recv().await.unwrap(), r#"{"id":3,"result":5}"#);
    }
}
