//! Session facade: owns the whole protocol state for one connection.
//!
//! One `Session` exists per attached transport channel. It owns the byte
//! accumulator, the mode state, the frame decoder, the paginator and the
//! flow controller, and talks outward only through the serialized writer
//! and the event channel. All mutation happens through `&mut self`, so a
//! half-parsed frame can never be interleaved; the [`client`](crate::client)
//! actor confines the session to a single task.
//!
//! Timeout and retry policy live with the caller; the session's job is
//! correctness of framing, not liveness.

use bytes::Bytes;

use crate::error::Result;
use crate::flow::FlowController;
use crate::paginator::ScrollbackPaginator;
use crate::protocol::{
    encode_winch, scan_for_upgrade, ByteAccumulator, ConnectionMode, FrameBuffer, FrameType,
    ScanOutcome,
};
use crate::router::{EventSender, Router, SessionEvent};
use crate::writer::{OutboundChunk, WriterHandle};

/// Protocol engine for one connection.
pub struct Session {
    mode: ConnectionMode,
    acc: ByteAccumulator,
    decoder: FrameBuffer,
    router: Router,
    paginator: ScrollbackPaginator,
    flow: FlowController,
    writer: WriterHandle,
}

impl Session {
    /// Create a session for a freshly attached transport.
    ///
    /// Starts in raw mode: until the companion's handshake signature
    /// shows up, the connection is indistinguishable from a plain shell.
    pub fn new(writer: WriterHandle, events: EventSender) -> Self {
        Self {
            mode: ConnectionMode::Raw,
            acc: ByteAccumulator::new(),
            decoder: FrameBuffer::new(),
            router: Router::new(events),
            paginator: ScrollbackPaginator::new(),
            flow: FlowController::new(),
            writer,
        }
    }

    /// Current connection mode.
    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    /// Absorb an inbound transport chunk of any size or alignment and
    /// process everything that became decodable.
    ///
    /// An error here is fatal for the connection (desync or a dead
    /// writer); underrun just waits for the next chunk.
    pub async fn feed(&mut self, bytes: &[u8]) -> Result<()> {
        self.acc.feed(bytes);
        self.process().await
    }

    async fn process(&mut self) -> Result<()> {
        if self.mode == ConnectionMode::Raw {
            match scan_for_upgrade(&mut self.acc) {
                ScanOutcome::Raw(passthrough) => {
                    if !passthrough.is_empty() {
                        self.router.emit(SessionEvent::TerminalData(passthrough));
                    }
                    return Ok(());
                }
                ScanOutcome::Upgraded(before) => {
                    if !before.is_empty() {
                        self.router.emit(SessionEvent::TerminalData(before));
                    }
                    self.enter_framed().await?;
                    // Bytes after the signature fall through to the frame
                    // decoder below.
                }
            }
        }

        while let Some(frame) = self.decoder.try_decode(&mut self.acc)? {
            let outbound = self
                .router
                .dispatch(frame, &mut self.paginator, &mut self.flow)?;
            for chunk in outbound {
                self.writer.send(chunk).await?;
            }
        }
        Ok(())
    }

    /// Flip to framed mode: replay deferred flow directives, then kick
    /// off scrollback pagination. Happens at most once per connection.
    async fn enter_framed(&mut self) -> Result<()> {
        self.mode = ConnectionMode::Framed;
        tracing::debug!("handshake matched, connection upgraded to framed mode");
        self.router
            .emit(SessionEvent::ModeChanged(ConnectionMode::Framed));

        for chunk in self.flow.on_framed() {
            self.writer.send(chunk).await?;
        }
        if let Some(request) = self.paginator.start() {
            self.writer.send(request).await?;
        }
        Ok(())
    }

    /// Send keyboard input.
    ///
    /// Written unmodified in raw mode; wrapped as an input frame in
    /// framed mode so the remote multiplexer can tell it from control
    /// traffic.
    pub async fn send_input(&self, bytes: &[u8]) -> Result<()> {
        let payload = Bytes::copy_from_slice(bytes);
        let chunk = match self.mode {
            ConnectionMode::Raw => OutboundChunk::raw(payload),
            ConnectionMode::Framed => OutboundChunk::framed(FrameType::Input, payload),
        };
        self.writer.send(chunk).await
    }

    /// Report a window-size change.
    ///
    /// The transport's native resize mechanism (if any) is the caller's
    /// to invoke; when framed, the size additionally goes out as a winch
    /// frame because the remote multiplexer may front several logical
    /// terminals.
    pub async fn send_resize(&self, cols: u16, rows: u16) -> Result<()> {
        if self.mode == ConnectionMode::Raw {
            return Ok(());
        }
        self.writer
            .send(OutboundChunk::framed(
                FrameType::Winch,
                encode_winch(cols, rows),
            ))
            .await
    }

    /// Ask the remote to stop streaming live output (deferred while raw).
    pub async fn pause(&mut self) -> Result<()> {
        let chunk = self.flow.pause();
        self.send_opt(chunk).await
    }

    /// Ask the remote to flush and resume streaming (deferred while raw).
    pub async fn resume(&mut self) -> Result<()> {
        let chunk = self.flow.resume();
        self.send_opt(chunk).await
    }

    /// Claim ownership of size/command routing (deferred while raw).
    pub async fn claim_active(&mut self) -> Result<()> {
        let chunk = self.flow.claim_active();
        self.send_opt(chunk).await
    }

    /// Ask the remote application to repaint (deferred while raw).
    pub async fn request_redraw(&mut self) -> Result<()> {
        let chunk = self.flow.request_redraw();
        self.send_opt(chunk).await
    }

    async fn send_opt(&self, chunk: Option<OutboundChunk>) -> Result<()> {
        match chunk {
            Some(chunk) => self.writer.send(chunk).await,
            None => Ok(()),
        }
    }

    /// Full reset on detach: mode back to raw, all counters and flags
    /// cleared. A reconnection is a logically new protocol instance - it
    /// never resumes mid-frame.
    pub fn reset(&mut self) {
        self.mode = ConnectionMode::Raw;
        self.acc.clear();
        self.decoder.reset();
        self.paginator.reset();
        self.flow.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    use crate::protocol::{build_frame, CommandTag, HANDSHAKE_MAGIC, HEADER_SIZE};
    use crate::writer::spawn_writer_task_default;

    fn session() -> (
        Session,
        UnboundedReceiver<SessionEvent>,
        tokio::io::DuplexStream,
    ) {
        let (client, server) = duplex(64 * 1024);
        let (writer, _task) = spawn_writer_task_default(client);
        let (tx, rx) = unbounded_channel();
        (Session::new(writer, tx), rx, server)
    }

    async fn read_some(server: &mut tokio::io::DuplexStream, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        server.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn raw_bytes_pass_through_verbatim() {
        let (mut session, mut rx, _server) = session();

        session.feed(b"plain shell output").await.unwrap();
        assert_eq!(session.mode(), ConnectionMode::Raw);

        match rx.try_recv().unwrap() {
            SessionEvent::TerminalData(data) => assert_eq!(&data[..], b"plain shell output"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn handshake_then_terminal_frame_in_two_chunks() {
        // Scenario: [handshake][3][5,0,0,0] then ['h','e','l','l','o'].
        let (mut session, mut rx, _server) = session();

        let mut first = HANDSHAKE_MAGIC.to_vec();
        first.extend_from_slice(&[3, 5, 0, 0, 0]);
        session.feed(&first).await.unwrap();
        session.feed(b"hello").await.unwrap();

        match rx.try_recv().unwrap() {
            SessionEvent::ModeChanged(ConnectionMode::Framed) => {}
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            SessionEvent::TerminalData(data) => assert_eq!(&data[..], b"hello"),
            other => panic!("unexpected event: {other:?}"),
        }
        // Exactly one mode change, one terminal event.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn command_frame_scenario() {
        // Scenario: type=2, length=9, payload "open;80" padded.
        let (mut session, mut rx, _server) = session();

        let mut bytes = HANDSHAKE_MAGIC.to_vec();
        bytes.extend_from_slice(&[2, 9, 0, 0, 0]);
        bytes.extend_from_slice(b"open;80\0\0");
        session.feed(&bytes).await.unwrap();

        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::ModeChanged(_)));
        match rx.try_recv().unwrap() {
            SessionEvent::Command { tag, args } => {
                assert_eq!(tag, CommandTag::Open);
                assert_eq!(args, vec!["80"]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn upgrade_is_one_way_and_idempotent() {
        let (mut session, mut rx, _server) = session();

        session.feed(HANDSHAKE_MAGIC).await.unwrap();
        assert_eq!(session.mode(), ConnectionMode::Framed);
        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::ModeChanged(_)));

        // Handshake-like bytes are now ordinary frame payload.
        let mut framed_magic = build_frame(FrameType::TerminalData, HANDSHAKE_MAGIC);
        framed_magic.extend(build_frame(FrameType::TerminalData, b"after"));
        session.feed(&framed_magic).await.unwrap();

        match rx.try_recv().unwrap() {
            SessionEvent::TerminalData(data) => assert_eq!(&data[..], HANDSHAKE_MAGIC),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            SessionEvent::TerminalData(data) => assert_eq!(&data[..], b"after"),
            other => panic!("unexpected event: {other:?}"),
        }
        // No second ModeChanged.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn keystrokes_raw_then_framed() {
        let (mut session, _rx, mut server) = session();

        session.send_input(b"ls\r").await.unwrap();
        assert_eq!(read_some(&mut server, 3).await, b"ls\r");

        session.feed(HANDSHAKE_MAGIC).await.unwrap();
        // First framed write is the initial scrollback page request.
        let request = read_some(&mut server, HEADER_SIZE + 8).await;
        assert_eq!(request[0], FrameType::RequestScrollbackPage.tag());

        session.send_input(b"w").await.unwrap();
        let framed = read_some(&mut server, HEADER_SIZE + 1).await;
        assert_eq!(framed[0], FrameType::Input.tag());
        assert_eq!(&framed[1..5], &1u32.to_le_bytes());
        assert_eq!(framed[5], b'w');
    }

    #[tokio::test]
    async fn resize_only_framed_sends_winch() {
        let (mut session, _rx, mut server) = session();

        // Raw: native transport resize covers it, nothing on the stream.
        session.send_resize(80, 24).await.unwrap();

        session.feed(HANDSHAKE_MAGIC).await.unwrap();
        let _page_request = read_some(&mut server, HEADER_SIZE + 8).await;

        session.send_resize(120, 40).await.unwrap();
        let winch = read_some(&mut server, HEADER_SIZE + 4).await;
        assert_eq!(winch[0], FrameType::Winch.tag());
        assert_eq!(&winch[5..], &[120, 0, 40, 0]);
    }

    #[tokio::test]
    async fn deferred_pause_replayed_once_at_upgrade() {
        let (mut session, _rx, mut server) = session();

        // Deferred while raw: nothing hits the transport.
        session.pause().await.unwrap();
        session.pause().await.unwrap();
        session.claim_active().await.unwrap();

        session.feed(HANDSHAKE_MAGIC).await.unwrap();

        // claim-active, pause, then the page request - in issuance order.
        let bytes = read_some(&mut server, 3 * HEADER_SIZE + 8).await;
        assert_eq!(bytes[0], FrameType::ClaimActive.tag());
        assert_eq!(bytes[HEADER_SIZE], FrameType::Pause.tag());
        assert_eq!(bytes[2 * HEADER_SIZE], FrameType::RequestScrollbackPage.tag());
    }

    #[tokio::test]
    async fn desync_surfaces_as_error() {
        let (mut session, _rx, _server) = session();

        let mut bytes = HANDSHAKE_MAGIC.to_vec();
        bytes.push(2); // command frame
        bytes.extend_from_slice(&(64 * 1024u32).to_le_bytes()); // absurd length
        let err = session.feed(&bytes).await.unwrap_err();
        assert!(matches!(err, crate::error::MuxError::Desync(_)));
    }

    #[tokio::test]
    async fn reset_returns_to_raw_passthrough() {
        let (mut session, mut rx, _server) = session();

        session.feed(HANDSHAKE_MAGIC).await.unwrap();
        assert_eq!(session.mode(), ConnectionMode::Framed);
        // Leave a partial frame in the decoder.
        session.feed(&[3, 5, 0, 0, 0, b'h']).await.unwrap();

        session.reset();
        assert_eq!(session.mode(), ConnectionMode::Raw);

        // Fresh instance: raw passthrough again, no frame resumption.
        while rx.try_recv().is_ok() {}
        session.feed(b"back to plain").await.unwrap();
        match rx.try_recv().unwrap() {
            SessionEvent::TerminalData(data) => assert_eq!(&data[..], b"back to plain"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
