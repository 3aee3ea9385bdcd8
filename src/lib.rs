//! # ttymux-client
//!
//! Client-side multiplexing protocol engine for interactive remote-shell
//! channels.
//!
//! A connection starts as a plain byte-for-byte shell session. If a
//! companion process on the remote side upgrades the shell, it emits a
//! fixed handshake signature and the same stream starts carrying typed,
//! length-prefixed frames: live terminal output, out-of-band commands,
//! paginated scrollback replay, idle signals, and flow-control
//! directives. Against a non-upgraded shell the signature never appears
//! and the session is indistinguishable from ordinary terminal I/O.
//!
//! ## Architecture
//!
//! - **Inbound**: transport → byte accumulator → mode detector →
//!   (raw passthrough) or (frame decoder → message router → event sinks)
//! - **Outbound**: keystrokes and control calls → frame codec (when
//!   framed) → one strictly serialized writer task → transport
//!
//! ## Example
//!
//! ```ignore
//! use ttymux_client::{spawn_session, SessionEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     // `reader`/`writer` come from an established shell channel.
//!     let (handle, mut events, _task) = spawn_session(reader, writer);
//!
//!     handle.send_input(b"ls\r").unwrap();
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             SessionEvent::TerminalData(bytes) => render(&bytes),
//!             SessionEvent::Closed(reason) => break,
//!             _ => {}
//!         }
//!     }
//! }
//! ```

pub mod client;
pub mod error;
pub mod flow;
pub mod paginator;
pub mod protocol;
pub mod router;
pub mod session;
pub mod writer;

pub use client::{spawn_session, spawn_session_with_config, SessionHandle};
pub use error::MuxError;
pub use protocol::{Command, CommandTag, ConnectionMode, FrameType, ScrollbackPageMeta};
pub use router::{DisconnectReason, SessionEvent};
pub use session::Session;
