//! Line codec: one JSON message per newline-terminated line.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Maximum accepted line size (1 MB). Protects the daemon from a
/// misbehaving adapter streaming an unbounded line.
pub const MAX_LINE_SIZE: usize = 1_048_576;

/// Errors produced by the line codec.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("Line too large: {size} bytes (max: {max})")]
    LineTooLarge { size: usize, max: usize },
}

/// Serializes a message to a newline-terminated JSON line.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(msg).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

/// Deserializes a message from one line (trailing newline tolerated).
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    if line.len() > MAX_LINE_SIZE {
        return Err(ProtocolError::LineTooLarge {
            size: line.len(),
            max: MAX_LINE_SIZE,
        });
    }
    serde_json::from_str(line.trim_end()).map_err(|e| ProtocolError::Decode(e.to_string()))
}
