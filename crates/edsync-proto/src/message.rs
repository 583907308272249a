//! Protocol message types for adapter-daemon communication.
//!
//! One connection carries exactly one editing session. The adapter opens
//! with `hello`, requests syncing with `sync`, then streams edit events.
//! Daemon-side queries (`get_cursor`, `get_length`, `get_text`) and acked
//! commands carry a sequence number the adapter echoes back in `reply`.

use crate::version::ProtocolVersion;
use edsync_core::{DocumentId, DocumentName};
use serde::{Deserialize, Serialize};

/// Messages sent from an editor adapter to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdapterMessage {
    /// Opening handshake. Must be the first message on a connection.
    Hello {
        /// Adapter's protocol version
        protocol_version: ProtocolVersion,
        /// Path of the file this session is editing
        path: String,
    },

    /// Request to start syncing this session's file.
    Sync,

    /// The session inserted text locally.
    Insert {
        /// Byte offset of the insertion
        offset: usize,
        /// Inserted text
        text: String,
    },

    /// The session removed a byte range locally.
    Remove {
        /// Byte offset of the removal
        offset: usize,
        /// Number of bytes removed
        length: usize,
    },

    /// The underlying file was (re)opened in the editor.
    FileOpened {
        /// Path of the opened file
        path: String,
    },

    /// The session is going away; the daemon detaches it.
    Closed,

    /// Response to a daemon query or acked command.
    Reply {
        /// Sequence number from the daemon message being answered
        seq: u64,
        /// The answer
        payload: ReplyPayload,
    },
}

/// Payloads an adapter can send in a `reply`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyPayload {
    /// Answer to `get_cursor`.
    Cursor {
        line: u64,
        col: u64,
        /// Byte offset of the cursor in the buffer
        offset: usize,
    },

    /// Answer to `get_length`.
    Length { len: usize },

    /// Answer to `get_text`.
    Text { text: String },

    /// Completion of an acked `insert`/`remove`.
    Done {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Messages sent from the daemon to an editor adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// The session was attached to a document.
    Attached {
        /// Daemon's protocol version
        protocol_version: ProtocolVersion,
        document_id: DocumentId,
        name: DocumentName,
    },

    /// Insert text into the session's buffer.
    Insert {
        offset: usize,
        text: String,
        /// When present, the adapter must answer with a `done` reply.
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },

    /// Remove a byte range from the session's buffer.
    Remove {
        offset: usize,
        length: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },

    /// Move the session's cursor.
    SetCursor { offset: usize },

    /// Query the session's cursor position.
    GetCursor { seq: u64 },

    /// Query the session's buffer length in bytes.
    GetLength { seq: u64 },

    /// Query the session's full buffer text.
    GetText { seq: u64 },

    /// A full-content write into this session has finished.
    InsertDone,

    /// Error response (protocol violation, rejected hello, ...).
    Error { message: String },
}

impl DaemonMessage {
    /// Creates an attached response.
    pub fn attached(document_id: DocumentId, name: DocumentName) -> Self {
        Self::Attached {
            protocol_version: ProtocolVersion::CURRENT,
            document_id,
            name,
        }
    }

    /// Creates an error response.
    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}
