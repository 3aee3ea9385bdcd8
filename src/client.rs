//! Client actor: wires a [`Session`] to a transport.
//!
//! Inbound chunks can arrive on a different thread than outbound calls,
//! but all protocol state lives in one task: the run loop owns the
//! session, reads from the transport, and drains a command channel fed by
//! [`SessionHandle`] clones. Teardown abandons every in-flight
//! expectation, emits one [`SessionEvent::Closed`], and never retries -
//! reconnection policy belongs to whoever holds the event receiver.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{MuxError, Result};
use crate::router::{DisconnectReason, SessionEvent};
use crate::session::Session;
use crate::writer::{spawn_writer_task, WriterConfig};

/// Read buffer size for the transport loop.
const READ_BUF_SIZE: usize = 16 * 1024;

/// Outbound calls routed into the session actor.
#[derive(Debug)]
enum SessionCommand {
    Input(Bytes),
    Resize(u16, u16),
    Pause,
    Resume,
    ClaimActive,
    RequestRedraw,
    Shutdown,
}

/// Cheaply cloneable handle for driving a running session from any task.
///
/// Every call is queued to the session actor, so outbound ordering
/// follows issuance order regardless of calling thread.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    fn send(&self, cmd: SessionCommand) -> Result<()> {
        self.tx.send(cmd).map_err(|_| MuxError::ConnectionClosed)
    }

    /// Send keyboard input (raw passthrough or input frame, per mode).
    pub fn send_input(&self, bytes: &[u8]) -> Result<()> {
        self.send(SessionCommand::Input(Bytes::copy_from_slice(bytes)))
    }

    /// Report a window-size change.
    pub fn send_resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.send(SessionCommand::Resize(cols, rows))
    }

    /// Ask the remote to stop streaming live output.
    pub fn pause(&self) -> Result<()> {
        self.send(SessionCommand::Pause)
    }

    /// Ask the remote to flush and resume live streaming.
    pub fn resume(&self) -> Result<()> {
        self.send(SessionCommand::Resume)
    }

    /// Claim ownership of size and command routing.
    pub fn claim_active(&self) -> Result<()> {
        self.send(SessionCommand::ClaimActive)
    }

    /// Ask the remote application to repaint.
    pub fn request_redraw(&self) -> Result<()> {
        self.send(SessionCommand::RequestRedraw)
    }

    /// Tear the session down.
    pub fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown)
    }
}

/// Attach a session to a transport's read/write halves.
///
/// Returns the control handle, the event stream for the UI sinks, and the
/// actor's join handle.
pub fn spawn_session<R, W>(
    reader: R,
    writer: W,
) -> (
    SessionHandle,
    mpsc::UnboundedReceiver<SessionEvent>,
    JoinHandle<()>,
)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_session_with_config(reader, writer, WriterConfig::default())
}

/// [`spawn_session`] with custom writer/backpressure configuration.
pub fn spawn_session_with_config<R, W>(
    reader: R,
    writer: W,
    config: WriterConfig,
) -> (
    SessionHandle,
    mpsc::UnboundedReceiver<SessionEvent>,
    JoinHandle<()>,
)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (writer_handle, _writer_task) = spawn_writer_task(writer, config);

    let session = Session::new(writer_handle, event_tx.clone());
    let task = tokio::spawn(run_loop(reader, session, cmd_rx, event_tx));

    (SessionHandle { tx: cmd_tx }, event_rx, task)
}

async fn run_loop<R>(
    mut reader: R,
    mut session: Session,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUF_SIZE];

    let reason = loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => break DisconnectReason::TransportClosed,
                Ok(n) => {
                    if let Err(e) = session.feed(&buf[..n]).await {
                        break disconnect_reason(e);
                    }
                }
                Err(e) => break DisconnectReason::Io(e.to_string()),
            },

            cmd = commands.recv() => {
                let Some(cmd) = cmd else {
                    break DisconnectReason::TransportClosed;
                };
                if matches!(cmd, SessionCommand::Shutdown) {
                    break DisconnectReason::TransportClosed;
                }
                if let Err(e) = apply_command(&mut session, cmd).await {
                    break disconnect_reason(e);
                }
            }
        }
    };

    match &reason {
        DisconnectReason::TransportClosed => tracing::debug!("session closed"),
        DisconnectReason::Desync(msg) => tracing::error!(%msg, "session desynced"),
        DisconnectReason::Io(msg) => tracing::error!(%msg, "session I/O failure"),
    }

    // All protocol state is discarded with the session; the receiver owns
    // whatever reconnection happens next.
    let _ = events.send(SessionEvent::Closed(reason));
}

async fn apply_command(session: &mut Session, cmd: SessionCommand) -> Result<()> {
    match cmd {
        SessionCommand::Input(bytes) => session.send_input(&bytes).await,
        SessionCommand::Resize(cols, rows) => session.send_resize(cols, rows).await,
        SessionCommand::Pause => session.pause().await,
        SessionCommand::Resume => session.resume().await,
        SessionCommand::ClaimActive => session.claim_active().await,
        SessionCommand::RequestRedraw => session.request_redraw().await,
        SessionCommand::Shutdown => Ok(()),
    }
}

fn disconnect_reason(err: MuxError) -> DisconnectReason {
    match err {
        MuxError::Desync(msg) => DisconnectReason::Desync(msg),
        MuxError::ConnectionClosed => DisconnectReason::TransportClosed,
        other => DisconnectReason::Io(other.to_string()),
    }
}
