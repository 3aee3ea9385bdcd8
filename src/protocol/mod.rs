//! Protocol module - wire format, framing, and mode detection.
//!
//! This module implements the framed-mode binary protocol:
//! - 5-byte header encoding/decoding with per-type length bounds
//! - Byte accumulator for arbitrarily-chunked transport reads
//! - Frame decode state machine that never exposes partial frames
//! - Handshake signature scan that flips a connection from raw to framed

mod accumulator;
mod detect;
mod frame;
mod frame_buffer;
mod wire_format;

pub use accumulator::ByteAccumulator;
pub use detect::{scan_for_upgrade, ConnectionMode, ScanOutcome};
pub use frame::{
    build_frame, encode_page_request, encode_winch, parse_scrollback_page, Command, CommandTag,
    Frame, ScrollbackPageMeta,
};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    FrameType, Header, HANDSHAKE_MAGIC, HEADER_SIZE, MAX_COMMAND_PAYLOAD, MAX_SCROLLBACK_PAYLOAD,
    MAX_TERMINAL_PAYLOAD, MAX_UNKNOWN_PAYLOAD, SCROLLBACK_PAGE_HEADER, SCROLLBACK_PAGE_SIZE,
};
