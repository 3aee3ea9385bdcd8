//! Byte accumulator for inbound transport chunks.
//!
//! The transport delivers chunks of arbitrary size and alignment; nothing
//! downstream may assume a handshake signature or frame boundary lines up
//! with a `feed` call. The accumulator absorbs chunks and supports bounded
//! consumption and peeking so the detector and decoder can work over the
//! joined stream.
//!
//! Uses `bytes::BytesMut` so consumed regions are handed out without
//! copying.

use bytes::{Bytes, BytesMut};

/// Growable buffer of not-yet-processed inbound bytes.
///
/// The accumulator itself enforces no size cap; callers bound what they
/// ask for (one frame, one page), so memory stays proportional to a single
/// in-flight frame rather than the session's history.
#[derive(Debug, Default)]
pub struct ByteAccumulator {
    buf: BytesMut,
}

impl ByteAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(16 * 1024),
        }
    }

    /// Append a chunk from the transport.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Remove and return exactly `n` bytes, or `None` if fewer are
    /// buffered (recoverable underrun; nothing is consumed).
    pub fn consume(&mut self, n: usize) -> Option<Bytes> {
        if self.buf.len() < n {
            return None;
        }
        Some(self.buf.split_to(n).freeze())
    }

    /// Inspect byte `i` without consuming.
    pub fn peek_byte(&self, i: usize) -> Option<u8> {
        self.buf.get(i).copied()
    }

    /// View the buffered bytes without consuming.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
