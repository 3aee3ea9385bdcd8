//! Message routing for framed-mode traffic.
//!
//! Once a complete frame is available it is dispatched by type: terminal
//! data to the terminal sink, scrollback pages to the paginator and the
//! scrollback sink, commands to the command handler, idle signals to the
//! notification path and the flow controller. Malformed commands are
//! logged and dropped without affecting the connection; outbound-only
//! types arriving inbound are dropped the same way.
//!
//! Sinks are event-driven: the router emits [`SessionEvent`]s over an
//! unbounded channel rather than mutating UI state directly.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{MuxError, Result};
use crate::flow::FlowController;
use crate::paginator::ScrollbackPaginator;
use crate::protocol::{
    parse_scrollback_page, Command, CommandTag, ConnectionMode, Frame, FrameType,
    ScrollbackPageMeta,
};
use crate::writer::OutboundChunk;

/// Event delivered to the UI/terminal sinks.
#[derive(Debug)]
pub enum SessionEvent {
    /// The connection flipped from raw to framed operation.
    ModeChanged(ConnectionMode),
    /// Live terminal output (raw passthrough or a terminal-data frame).
    TerminalData(Bytes),
    /// One page of scrollback history, for a sink distinct from the live
    /// terminal.
    ScrollbackPage {
        /// Page position within the full history.
        meta: ScrollbackPageMeta,
        /// Page bytes.
        data: Bytes,
    },
    /// An out-of-band command from the remote.
    Command {
        /// Recognized tag.
        tag: CommandTag,
        /// Ordered arguments.
        args: Vec<String>,
    },
    /// The remote saw no terminal output for a threshold period.
    Idle,
    /// The connection is gone; all protocol state has been discarded.
    Closed(DisconnectReason),
}

/// Why a connection ended.
#[derive(Debug)]
pub enum DisconnectReason {
    /// The transport reached EOF or was torn down.
    TransportClosed,
    /// A frame header was out of range; the stream cannot be resynced.
    Desync(String),
    /// Transport I/O failed.
    Io(String),
}

/// Sender half of the event channel handed to the UI.
pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// Dispatches decoded frames to the event sinks and the per-concern
/// components.
#[derive(Debug)]
pub struct Router {
    events: EventSender,
}

impl Router {
    /// Create a router emitting on the given channel.
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }

    /// Emit an event, tolerating a departed receiver.
    pub fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("event receiver dropped, discarding session event");
        }
    }

    /// Dispatch one frame.
    ///
    /// Returns any outbound chunks the frame provoked (follow-up page
    /// requests, prefetch pause/resume), in the order they must reach the
    /// transport.
    pub fn dispatch(
        &self,
        frame: Frame,
        paginator: &mut ScrollbackPaginator,
        flow: &mut FlowController,
    ) -> Result<Vec<OutboundChunk>> {
        let mut outbound = Vec::new();

        match frame.frame_type {
            FrameType::TerminalData => {
                if let Some(repause) = flow.on_terminal_data() {
                    outbound.push(repause);
                }
                self.emit(SessionEvent::TerminalData(frame.payload));
            }

            FrameType::Scrollback => {
                let (meta, data) = parse_scrollback_page(&frame.payload)?;
                tracing::debug!(
                    offset = meta.offset,
                    total = meta.total_len,
                    len = data.len(),
                    "scrollback page"
                );
                if let Some(next) = paginator.apply_page(meta, data.len()) {
                    outbound.push(next);
                }
                self.emit(SessionEvent::ScrollbackPage { meta, data });
            }

            FrameType::Command => match Command::parse(&frame.payload) {
                Ok(Command { tag, args }) => {
                    tracing::debug!(tag = tag.as_str(), ?args, "remote command");
                    self.emit(SessionEvent::Command { tag, args });
                }
                Err(MuxError::MalformedCommand(reason)) => {
                    tracing::warn!(%reason, "dropping malformed command frame");
                }
                Err(other) => return Err(other),
            },

            FrameType::Idle => {
                self.emit(SessionEvent::Idle);
                if let Some(prefetch) = flow.on_idle() {
                    outbound.push(prefetch);
                }
            }

            other => {
                tracing::warn!(tag = other.tag(), "dropping outbound-only frame type received inbound");
            }
        }

        Ok(outbound)
    }
}
