//! edsync wire protocol.
//!
//! Editor adapters talk to the daemon over a Unix socket, one JSON message
//! per line. This crate defines the message types for both directions, the
//! line codec, and the protocol version used during the hello exchange.
//!
//! The daemon's byte offsets address the document content; adapters are
//! responsible for translating them to their editor's own addressing.

pub mod message;
pub mod parse;
pub mod version;

pub use message::{AdapterMessage, DaemonMessage, ReplyPayload};
pub use parse::{decode_line, encode_line, ProtocolError, MAX_LINE_SIZE};
pub use version::ProtocolVersion;
