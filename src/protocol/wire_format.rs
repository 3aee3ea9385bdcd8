//! Wire format encoding and decoding.
//!
//! Implements the 5-byte frame header:
//! ```text
//! ┌──────────┬──────────┐
//! │ Type     │ Length   │
//! │ 1 byte   │ 4 bytes  │
//! │ u8       │ u32 LE   │
//! └──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Little Endian. A frame header is only valid
//! while the connection is in framed mode; in raw mode the stream carries
//! unwrapped terminal bytes.

use crate::error::{MuxError, Result};

/// Header size in bytes (fixed, exactly 5).
pub const HEADER_SIZE: usize = 5;

/// Handshake signature the remote companion emits once, immediately after
/// upgrading the shell to framed operation.
///
/// An APC escape sequence: invisible if it ever reaches a plain terminal,
/// and it carries the protocol version so a mismatched companion build
/// fails detection instead of silently desyncing.
pub const HANDSHAKE_MAGIC: &[u8] = b"\x1b_ttymux/1\x1b\\";

/// Fixed scrollback page size for paginated history replay.
///
/// Conservative so a single in-flight reply stays cheap to receive and
/// apply while the app is under a mobile OS watchdog.
pub const SCROLLBACK_PAGE_SIZE: u32 = 16 * 1024;

/// Size of the `[offset:u32][total_len:u32]` prefix on scrollback payloads.
pub const SCROLLBACK_PAGE_HEADER: usize = 8;

/// Maximum payload for a command frame (short `tag;arg` text).
pub const MAX_COMMAND_PAYLOAD: u32 = 1024;

/// Maximum payload for a terminal-data frame.
pub const MAX_TERMINAL_PAYLOAD: u32 = 256 * 1024;

/// Maximum payload for a scrollback frame.
///
/// Paged replies are bounded by [`SCROLLBACK_PAGE_SIZE`], but a legacy
/// companion may push the whole history as one single-shot frame.
pub const MAX_SCROLLBACK_PAYLOAD: u32 = 4 * 1024 * 1024;

/// Maximum payload for frame types this build does not recognize.
///
/// Unknown types are skippable (the length is always known), so they get a
/// generous ceiling and are dropped rather than treated as fatal.
pub const MAX_UNKNOWN_PAYLOAD: u32 = 1024 * 1024;

/// Frame type tags.
///
/// Types 1-4 arrive from the companion; 5-12 are only ever sent by the
/// client. An outbound-only tag arriving inbound is dropped by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Scrollback history, `[offset:u32][total_len:u32][data]` payload.
    ///
    /// Both paged replies and the legacy single-shot full dump use this
    /// tag; a legacy dump is simply one page covering the whole history.
    Scrollback = 1,
    /// Out-of-band command, UTF-8 `tag[;arg1[;arg2]]` payload.
    Command = 2,
    /// Live terminal output, forwarded to the terminal sink unmodified.
    TerminalData = 3,
    /// Remote saw no terminal output for a threshold period. Zero-length.
    Idle = 4,
    /// Legacy single-shot scrollback request. Zero-length.
    RequestScrollback = 5,
    /// Paged scrollback request, `[offset:u32][max_len:u32]` payload.
    RequestScrollbackPage = 6,
    /// Keystrokes, wrapped so the remote multiplexer can tell them apart
    /// from control traffic.
    Input = 7,
    /// Window size change, `[cols:u16][rows:u16]` payload.
    Winch = 8,
    /// Stop streaming live output (remote keeps buffering). Zero-length.
    Pause = 9,
    /// Flush buffered output and resume live streaming. Zero-length.
    Resume = 10,
    /// Declare this client the owner of size/command routing. Zero-length.
    ClaimActive = 11,
    /// Ask the remote application to repaint. Zero-length.
    Redraw = 12,
}

impl FrameType {
    /// Map a wire tag to a frame type, `None` for unrecognized tags.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Scrollback),
            2 => Some(Self::Command),
            3 => Some(Self::TerminalData),
            4 => Some(Self::Idle),
            5 => Some(Self::RequestScrollback),
            6 => Some(Self::RequestScrollbackPage),
            7 => Some(Self::Input),
            8 => Some(Self::Winch),
            9 => Some(Self::Pause),
            10 => Some(Self::Resume),
            11 => Some(Self::ClaimActive),
            12 => Some(Self::Redraw),
            _ => None,
        }
    }

    /// The wire tag for this frame type.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// True for types the companion sends to the client.
    #[inline]
    pub fn is_inbound(self) -> bool {
        matches!(
            self,
            Self::Scrollback | Self::Command | Self::TerminalData | Self::Idle
        )
    }

    /// Sane maximum payload length for this type.
    ///
    /// A header declaring more than this is a desync, not a big frame.
    pub fn max_payload_len(self) -> u32 {
        match self {
            Self::Scrollback => MAX_SCROLLBACK_PAYLOAD,
            Self::Command => MAX_COMMAND_PAYLOAD,
            Self::TerminalData | Self::Input => MAX_TERMINAL_PAYLOAD,
            Self::RequestScrollbackPage => SCROLLBACK_PAGE_HEADER as u32,
            Self::Winch => 4,
            Self::Idle
            | Self::RequestScrollback
            | Self::Pause
            | Self::Resume
            | Self::ClaimActive
            | Self::Redraw => 0,
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Raw type tag (kept raw so unknown types stay skippable).
    pub tag: u8,
    /// Payload length in bytes.
    pub length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(tag: u8, length: u32) -> Self {
        Self { tag, length }
    }

    /// Header for an outbound frame of the given type.
    pub fn for_frame(frame_type: FrameType, payload_len: u32) -> Self {
        Self::new(frame_type.tag(), payload_len)
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use ttymux_client::protocol::{FrameType, Header};
    ///
    /// let header = Header::for_frame(FrameType::TerminalData, 5);
    /// assert_eq!(header.encode(), [3, 5, 0, 0, 0]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.tag;
        buf[1..5].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    /// Decode header from bytes (Little Endian).
    ///
    /// Returns `None` if the buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            tag: buf[0],
            length: u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]),
        })
    }

    /// The frame type, if this build recognizes the tag.
    #[inline]
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_tag(self.tag)
    }

    /// Validate the declared length against the per-type sane maximum.
    ///
    /// A length outside range means the stream is unsynced; there is no
    /// safe way to find the next frame boundary after that.
    pub fn validate(&self) -> Result<()> {
        let max = match self.frame_type() {
            Some(ft) => ft.max_payload_len(),
            None => MAX_UNKNOWN_PAYLOAD,
        };
        if self.length > max {
            return Err(MuxError::Desync(format!(
                "frame type {} declared {} payload bytes (max {})",
                self.tag, self.length, max
            )));
        }
        Ok(())
    }
}
