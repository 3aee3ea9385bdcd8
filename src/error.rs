//! Error types for ttymux-client.

use thiserror::Error;

/// Main error type for all protocol operations.
///
/// Running out of buffered bytes mid-frame is *not* an error: the decoder
/// simply waits for the next `feed`. Only unrecoverable conditions appear
/// here.
#[derive(Debug, Error)]
pub enum MuxError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame header declared a length outside the sane bound for its type.
    ///
    /// Fatal for the connection: once the stream is unsynced there is no
    /// safe resynchronization point.
    #[error("protocol desync: {0}")]
    Desync(String),

    /// A command frame carried invalid UTF-8 or an unrecognized tag.
    ///
    /// Swallowed at the message router (logged and dropped); never fatal.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - outbound write queue full.
    #[error("backpressure timeout")]
    BackpressureTimeout,
}

/// Result type alias using MuxError.
pub type Result<T> = std::result::Result<T, MuxError>;
