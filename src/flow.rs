//! Flow control directives and the pause/prefetch state machine.
//!
//! `pause` tells the remote to stop streaming live output while it keeps
//! buffering (battery and bandwidth for backgrounded sessions), `resume`
//! flushes the buffer and restarts live streaming, `claim_active` declares
//! which attached client owns terminal-size and command routing, and
//! `request_redraw` asks the remote application to repaint after a pause
//! window.
//!
//! None of these can be sent while the connection is raw - the remote
//! would read them as keystrokes - so directives issued early are deferred
//! and replayed, each exactly once, at the raw-to-framed transition.
//!
//! While paused, an idle signal triggers one opportunistic resume so
//! buffered output can flush; the next terminal-data frame re-pauses. The
//! prefetch window is an explicit state, so a second idle signal arriving
//! mid-prefetch is a no-op instead of a race.

use crate::protocol::FrameType;
use crate::writer::OutboundChunk;

/// Streaming state negotiated with the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Live output streaming normally.
    Active,
    /// Remote is buffering instead of streaming.
    Paused,
    /// Temporarily resumed to flush the buffer; re-pauses on the next
    /// terminal-data frame.
    PrefetchingThenPause,
}

/// Directives deferred while the connection is still raw.
#[derive(Debug, Default)]
struct Deferred {
    claim_active: bool,
    /// Latest of pause (`Some(true)`) / resume (`Some(false)`) wins.
    pause: Option<bool>,
    redraw: bool,
}

/// Issues pause/resume/claim-active/redraw directives, deferring them
/// until framed mode is reached.
#[derive(Debug)]
pub struct FlowController {
    framed: bool,
    state: FlowState,
    deferred: Deferred,
}

impl FlowController {
    /// Create a controller for a raw-mode connection.
    pub fn new() -> Self {
        Self {
            framed: false,
            state: FlowState::Active,
            deferred: Deferred::default(),
        }
    }

    /// Current streaming state.
    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Ask the remote to stop streaming live output.
    pub fn pause(&mut self) -> Option<OutboundChunk> {
        if !self.framed {
            self.deferred.pause = Some(true);
            return None;
        }
        if self.state == FlowState::Paused {
            return None;
        }
        self.state = FlowState::Paused;
        Some(OutboundChunk::control(FrameType::Pause))
    }

    /// Ask the remote to flush its buffer and resume live streaming.
    pub fn resume(&mut self) -> Option<OutboundChunk> {
        if !self.framed {
            self.deferred.pause = Some(false);
            return None;
        }
        match self.state {
            FlowState::Active => None,
            FlowState::Paused => {
                self.state = FlowState::Active;
                Some(OutboundChunk::control(FrameType::Resume))
            }
            // The prefetch resume is already on the wire; just stop the
            // automatic re-pause.
            FlowState::PrefetchingThenPause => {
                self.state = FlowState::Active;
                None
            }
        }
    }

    /// Declare this client the owner of size and command routing.
    pub fn claim_active(&mut self) -> Option<OutboundChunk> {
        if !self.framed {
            self.deferred.claim_active = true;
            return None;
        }
        Some(OutboundChunk::control(FrameType::ClaimActive))
    }

    /// Ask the remote application to repaint.
    pub fn request_redraw(&mut self) -> Option<OutboundChunk> {
        if !self.framed {
            self.deferred.redraw = true;
            return None;
        }
        Some(OutboundChunk::control(FrameType::Redraw))
    }

    /// Replay deferred directives at the raw-to-framed transition.
    ///
    /// Each deferred directive is applied exactly once, however many times
    /// it was issued while raw. Order: claim-active first (ownership
    /// before anything the remote routes), then pause or resume, then
    /// redraw.
    pub fn on_framed(&mut self) -> Vec<OutboundChunk> {
        self.framed = true;
        let deferred = std::mem::take(&mut self.deferred);
        let mut out = Vec::new();

        if deferred.claim_active {
            if let Some(chunk) = self.claim_active() {
                out.push(chunk);
            }
        }
        match deferred.pause {
            Some(true) => {
                if let Some(chunk) = self.pause() {
                    out.push(chunk);
                }
            }
            Some(false) => {
                if let Some(chunk) = self.resume() {
                    out.push(chunk);
                }
            }
            None => {}
        }
        if deferred.redraw {
            if let Some(chunk) = self.request_redraw() {
                out.push(chunk);
            }
        }

        out
    }

    /// React to an idle signal: while paused, resume once to flush
    /// buffered output.
    pub fn on_idle(&mut self) -> Option<OutboundChunk> {
        if self.framed && self.state == FlowState::Paused {
            self.state = FlowState::PrefetchingThenPause;
            return Some(OutboundChunk::control(FrameType::Resume));
        }
        None
    }

    /// React to a terminal-data frame: ends a prefetch window by
    /// re-pausing.
    pub fn on_terminal_data(&mut self) -> Option<OutboundChunk> {
        if self.state == FlowState::PrefetchingThenPause {
            self.state = FlowState::Paused;
            return Some(OutboundChunk::control(FrameType::Pause));
        }
        None
    }

    /// Reset for a fresh connection: raw, active, no deferred directives.
    pub fn reset(&mut self) {
        self.framed = false;
        self.state = FlowState::Active;
        self.deferred = Deferred::default();
    }
}

impl Default for FlowController {
    fn default() -> Self {
        Self::new()
    }
}
