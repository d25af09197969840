//! Per-connection service loop.
//!
//! A connection moves through `Connected → Active → Draining → Closed`:
//!
//! - the caller's task runs the read loop and feeds raw lines to the
//!   dispatch lane;
//! - the dispatch lane parses `command|args` and runs the handler inside a
//!   panic boundary;
//! - the writer lane drains the outbound queue to the socket.
//!
//! When the read loop ends (EOF, I/O error or panic) the dispatch lane is
//! told to stop, finishes what is already queued, and only then is the
//! outbound queue closed so every reply already enqueued is flushed. The
//! identity is then removed from every room and the connection shut down.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use hostel_common::protocol::split_first;
use hostel_common::Identity;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, WriteHalf,
};
use tokio::sync::{mpsc, oneshot};

use super::commands::{deliver, Command};
use super::hub::{Hub, Sink};
use super::sessions::SessionRegistry;

/// Reply sent when a command handler panics.
pub const UNEXPECTED_ERROR: &str = "Unexpected server error!";

/// Default capacity of a connection's outbound queue.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Raw lines waiting for the dispatch lane. Kept at one so the read loop
/// applies backpressure to the socket instead of buffering input.
const INBOUND_BUFFER: usize = 1;

/// Longest accepted input line in bytes, terminator excluded. A longer line
/// ends the connection.
pub const MAX_LINE: usize = 64 * 1024;

/// Removes a disconnected identity from shared chat state.
pub trait Unsubscriber: Send + Sync {
    fn unsubscribe_all(&self, identity: &Identity);
}

impl Unsubscriber for Hub {
    fn unsubscribe_all(&self, identity: &Identity) {
        Hub::unsubscribe_all(self, identity);
    }
}

struct Inner {
    commands: HashMap<String, Arc<dyn Command>>,
    unsubscriber: Arc<dyn Unsubscriber>,
    sessions: SessionRegistry,
    outbound_buffer: usize,
}

/// The chat service. Cheap to clone; one clone per accepted connection.
#[derive(Clone)]
pub struct Service {
    inner: Arc<Inner>,
}

impl Service {
    /// Create a service with the given command table, keyed by command name.
    pub fn new(
        commands: HashMap<String, Arc<dyn Command>>,
        unsubscriber: Arc<dyn Unsubscriber>,
        outbound_buffer: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                commands,
                unsubscriber,
                sessions: SessionRegistry::new(),
                outbound_buffer: outbound_buffer.max(1),
            }),
        }
    }

    /// Live connections.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    /// Serve one client connection until it disconnects.
    pub async fn handle_client<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let identity = self.inner.sessions.register();
        let mut teardown = Teardown {
            inner: self.inner.clone(),
            identity: identity.clone(),
            done: false,
        };
        tracing::info!(
            identity = %identity,
            active = self.inner.sessions.len(),
            "connection established"
        );

        let (read_half, write_half) = tokio::io::split(stream);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.inner.outbound_buffer);
        let (disconnect_tx, disconnect_rx) = oneshot::channel();
        let (dispatch_exit_tx, dispatch_exit_rx) = oneshot::channel::<()>();

        let dispatch = tokio::spawn(dispatch_lane(
            self.inner.clone(),
            identity.clone(),
            inbound_rx,
            outbound_tx,
            disconnect_rx,
            dispatch_exit_tx,
        ));
        let writer = tokio::spawn(writer_lane(
            identity.clone(),
            write_half,
            outbound_rx,
            dispatch_exit_rx,
        ));

        let read = AssertUnwindSafe(read_lane(&identity, read_half, inbound_tx))
            .catch_unwind()
            .await;
        let read_panicked = read.is_err();
        if let Err(panic) = read {
            tracing::error!(
                identity = %identity,
                panic = %panic_message(&*panic),
                "read loop panicked"
            );
        }

        // Draining.
        let _ = disconnect_tx.send(());
        if let Err(err) = dispatch.await {
            tracing::error!(identity = %identity, %err, "dispatch lane failed");
        }
        let writer = match writer.await {
            Ok(writer) => Some(writer),
            Err(err) => {
                tracing::error!(identity = %identity, %err, "writer lane failed");
                None
            }
        };

        teardown.run();

        // Closed. A panic inside the stream's read poisons the lock shared by
        // both halves, so the write half is only dropped in that case.
        if let Some(mut writer) = writer.filter(|_| !read_panicked) {
            if let Err(err) = writer.shutdown().await {
                tracing::debug!(identity = %identity, %err, "shutdown failed");
            }
        }
    }
}

/// Unsubscribes and deregisters the identity exactly once, either explicitly
/// at the end of `handle_client` or on drop if that future is cancelled.
struct Teardown {
    inner: Arc<Inner>,
    identity: Identity,
    done: bool,
}

impl Teardown {
    fn run(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.inner.unsubscriber.unsubscribe_all(&self.identity);
        let connected_for = self.inner.sessions.remove(&self.identity);
        tracing::info!(
            identity = %self.identity,
            connected_ms = connected_for.map(|d| d.as_millis() as u64).unwrap_or_default(),
            active = self.inner.sessions.len(),
            "connection ended"
        );
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.run();
    }
}

async fn read_lane<R>(identity: &Identity, reader: R, inbound: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await;
        match read {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(identity = %identity, %err, "read error");
                break;
            }
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        } else if buf.len() > MAX_LINE {
            tracing::warn!(identity = %identity, limit = MAX_LINE, "input line too long");
            break;
        }

        // Undecodable bytes become U+FFFD; the line is still answered.
        let line = String::from_utf8_lossy(&buf).into_owned();
        if inbound.send(line).await.is_err() {
            break;
        }
    }
}

async fn dispatch_lane(
    inner: Arc<Inner>,
    identity: Identity,
    mut inbound: mpsc::Receiver<String>,
    outgoing: Sink,
    mut disconnect: oneshot::Receiver<()>,
    _exit: oneshot::Sender<()>,
) {
    loop {
        // Queued lines win over the disconnect signal so nothing read before
        // EOF is lost.
        tokio::select! {
            biased;
            line = inbound.recv() => match line {
                Some(line) => dispatch(&inner, &identity, &line, &outgoing).await,
                None => break,
            },
            _ = &mut disconnect => break,
        }
    }
    // Dropping `_exit` tells the writer lane to close the outbound queue.
}

/// Route one raw line to its handler, containing any panic to this command.
async fn dispatch(inner: &Inner, identity: &Identity, line: &str, outgoing: &Sink) {
    let (name, args) = split_first(line);
    let Some(command) = inner.commands.get(name) else {
        return deliver(outgoing, format!("Unknown command: {name}.")).await;
    };

    let outcome = AssertUnwindSafe(command.handle(identity, args, outgoing))
        .catch_unwind()
        .await;
    if let Err(panic) = outcome {
        tracing::error!(
            identity = %identity,
            command = name,
            panic = %panic_message(&*panic),
            "command panicked"
        );
        deliver(outgoing, UNEXPECTED_ERROR.to_string()).await;
    }
}

/// Drain the outbound queue to the connection. Rooms hold clones of the
/// queue's sender, so it is closed explicitly once the dispatch lane exits;
/// lines already queued are still written.
async fn writer_lane<S>(
    identity: Identity,
    mut writer: WriteHalf<S>,
    mut outbound: mpsc::Receiver<String>,
    mut dispatch_exit: oneshot::Receiver<()>,
) -> WriteHalf<S>
where
    S: AsyncWrite,
{
    let mut closing = false;
    loop {
        tokio::select! {
            _ = &mut dispatch_exit, if !closing => {
                outbound.close();
                closing = true;
            }
            line = outbound.recv() => {
                let Some(line) = line else { break };
                if let Err(err) = write_line(&mut writer, &line).await {
                    tracing::debug!(identity = %identity, %err, "write error");
                    break;
                }
            }
        }
    }
    writer
}

async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
