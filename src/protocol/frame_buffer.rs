//! Frame decoding over the byte accumulator.
//!
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: need at least 5 bytes
//! - `WaitingForPayload`: header parsed, need `length` more payload bytes
//!
//! Underrun is not an error; the decoder retains the parsed header and
//! waits for the next `feed`. Frames with unrecognized type tags are
//! skipped (their length is known) and logged, never fatal. A header whose
//! length fails the per-type bound is a desync and kills the connection.

use super::accumulator::ByteAccumulator;
use super::frame::Frame;
use super::wire_format::{Header, HEADER_SIZE};
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a complete 5-byte header.
    WaitingForHeader,
    /// Header parsed and validated, waiting for payload bytes.
    WaitingForPayload { header: Header },
}

/// Extracts complete frames from an accumulator of framed-mode bytes.
#[derive(Debug)]
pub struct FrameBuffer {
    state: State,
}

impl FrameBuffer {
    /// Create a decoder in its initial state.
    pub fn new() -> Self {
        Self {
            state: State::WaitingForHeader,
        }
    }

    /// Try to extract a single recognized frame from the accumulator.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(Desync)` if a header declared an out-of-range length
    pub fn try_decode(&mut self, acc: &mut ByteAccumulator) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    let Some(header_bytes) = acc.consume(HEADER_SIZE) else {
                        return Ok(None);
                    };
                    let Some(header) = Header::decode(&header_bytes) else {
                        return Ok(None);
                    };
                    header.validate()?;
                    self.state = State::WaitingForPayload { header };
                }

                State::WaitingForPayload { header } => {
                    let Some(payload) = acc.consume(header.length as usize) else {
                        return Ok(None);
                    };
                    self.state = State::WaitingForHeader;

                    match header.frame_type() {
                        Some(frame_type) => {
                            return Ok(Some(Frame::new(frame_type, payload)));
                        }
                        None => {
                            tracing::warn!(
                                tag = header.tag,
                                length = header.length,
                                "dropping frame with unrecognized type"
                            );
                            // Skippable: keep scanning for the next frame.
                        }
                    }
                }
            }
        }
    }

    /// Extract all complete frames currently buffered.
    pub fn drain(&mut self, acc: &mut ByteAccumulator) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.try_decode(acc)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// True while a parsed header is waiting on its payload.
    pub fn mid_frame(&self) -> bool {
        matches!(self.state, State::WaitingForPayload { .. })
    }

    /// Discard any partially-parsed frame state.
    pub fn reset(&mut self) {
        self.state = State::WaitingForHeader;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
