//! Frame struct and typed payload views.
//!
//! A [`Frame`] is a complete header+payload unit; the decoder never hands
//! out partial frames. Payloads use `bytes::Bytes` for zero-copy sharing
//! with the terminal and scrollback sinks.

use bytes::Bytes;

use super::wire_format::{FrameType, Header, HEADER_SIZE, SCROLLBACK_PAGE_HEADER};
use crate::error::{MuxError, Result};

/// A complete, recognized protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded frame type.
    pub frame_type: FrameType,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from type and payload.
    pub fn new(frame_type: FrameType, payload: Bytes) -> Self {
        Self {
            frame_type,
            payload,
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Build a complete frame as one contiguous byte vector.
///
/// Header and payload go out as a single write so packet-boundary ordering
/// on the transport is preserved.
///
/// # Example
///
/// ```
/// use ttymux_client::protocol::{build_frame, FrameType};
///
/// let bytes = build_frame(FrameType::TerminalData, b"hello");
/// assert_eq!(&bytes[..], &[3, 5, 0, 0, 0, b'h', b'e', b'l', b'l', b'o']);
/// ```
pub fn build_frame(frame_type: FrameType, payload: &[u8]) -> Vec<u8> {
    let header = Header::for_frame(frame_type, payload.len() as u32);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

/// Pagination metadata carried on every scrollback frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollbackPageMeta {
    /// Byte offset of this page within the full history.
    pub offset: u32,
    /// Total history length, reported on every page.
    pub total_len: u32,
}

/// Split a scrollback payload into its page metadata and data bytes.
///
/// Payload layout: `[offset:u32le][total_len:u32le][data]`. A legacy
/// single-shot dump is just one page with `offset == 0` and
/// `total_len == data.len()`.
pub fn parse_scrollback_page(payload: &Bytes) -> Result<(ScrollbackPageMeta, Bytes)> {
    if payload.len() < SCROLLBACK_PAGE_HEADER {
        return Err(MuxError::Desync(format!(
            "scrollback payload too short for page header: {} bytes",
            payload.len()
        )));
    }
    let offset = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let total_len = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
    let data = payload.slice(SCROLLBACK_PAGE_HEADER..);
    Ok((ScrollbackPageMeta { offset, total_len }, data))
}

/// Encode a paged scrollback request payload: `[offset:u32le][max_len:u32le]`.
pub fn encode_page_request(offset: u32, max_len: u32) -> Bytes {
    let mut buf = Vec::with_capacity(SCROLLBACK_PAGE_HEADER);
    buf.extend_from_slice(&offset.to_le_bytes());
    buf.extend_from_slice(&max_len.to_le_bytes());
    Bytes::from(buf)
}

/// Encode a window-size payload: `[cols:u16le][rows:u16le]`.
pub fn encode_winch(cols: u16, rows: u16) -> Bytes {
    let mut buf = Vec::with_capacity(4);
    buf.extend_from_slice(&cols.to_le_bytes());
    buf.extend_from_slice(&rows.to_le_bytes());
    Bytes::from(buf)
}

/// Recognized out-of-band command tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTag {
    /// Open a new logical terminal.
    Open,
    /// Forward a port.
    Forward,
    /// Open a URL in the device browser.
    Browser,
    /// Post a user-visible notification.
    Notify,
}

impl CommandTag {
    /// Parse a command tag, `None` for unrecognized tags.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "forward" => Some(Self::Forward),
            "browser" => Some(Self::Browser),
            "notify" => Some(Self::Notify),
            _ => None,
        }
    }

    /// Wire spelling of this tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Forward => "forward",
            Self::Browser => "browser",
            Self::Notify => "notify",
        }
    }
}

/// A decoded out-of-band command: consumed by a handler, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Recognized tag.
    pub tag: CommandTag,
    /// Ordered arguments, possibly empty.
    pub args: Vec<String>,
}

impl Command {
    /// Parse a command payload: UTF-8 text `tag[;arg1[;arg2]]`.
    ///
    /// The split count is bounded, so a second argument keeps any `;` it
    /// contains; the first argument cannot (known wire-format limitation,
    /// fixable only with a protocol version bump).
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| MuxError::MalformedCommand(format!("invalid UTF-8: {e}")))?;
        // Remotes pad the payload to the declared frame length.
        let text = text.trim_end_matches(['\0', ' ']);

        let mut parts = text.splitn(3, ';');
        let tag_text = parts.next().unwrap_or_default();
        let tag = CommandTag::from_str(tag_text)
            .ok_or_else(|| MuxError::MalformedCommand(format!("unknown tag {tag_text:?}")))?;

        let args = parts.map(str::to_owned).collect();
        Ok(Self { tag, args })
    }
}
