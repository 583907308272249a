//! Session-side command channel.
//!
//! A session is one connected editor buffer. The engine never touches the
//! socket: it talks to sessions through [`SessionHandle`], whose commands are
//! drained by the connection's writer task and serialized onto the wire.
//! Inbound edit traffic flows the other way as [`SessionEvent`]s into the
//! engine.
//!
//! Commands come in two flavors. Fire-and-forget ([`SessionHandle::insert`],
//! [`SessionHandle::remove`], [`SessionHandle::set_cursor`]) return as soon as
//! the command is queued. Acked and query commands carry a oneshot the caller
//! awaits; if the session disconnects before answering, the dropped sender
//! surfaces as [`SessionIoError::Gone`].

use edsync_core::SessionId;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Capacity of a session's command channel.
const COMMAND_BUFFER: usize = 256;

/// Cursor position reported by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPos {
    /// 1-based line number
    pub line: u64,
    /// 1-based column number
    pub col: u64,
    /// Byte offset into the buffer
    pub offset: usize,
}

/// Commands the engine sends to a session.
#[derive(Debug)]
pub enum SessionCommand {
    /// Insert text into the session's buffer. When `done` is present the
    /// session acknowledges completion.
    Insert {
        offset: usize,
        text: String,
        done: Option<oneshot::Sender<Result<(), SessionIoError>>>,
    },

    /// Remove a byte range from the session's buffer.
    Remove {
        offset: usize,
        length: usize,
        done: Option<oneshot::Sender<Result<(), SessionIoError>>>,
    },

    /// Move the session's cursor.
    SetCursor { offset: usize },

    /// Query the session's cursor position.
    GetCursor { respond_to: oneshot::Sender<CursorPos> },

    /// Query the session's buffer length in bytes.
    GetLength { respond_to: oneshot::Sender<usize> },

    /// Query the session's full buffer text.
    GetText { respond_to: oneshot::Sender<String> },

    /// A full-content write into this session has finished.
    InsertDone,
}

/// Errors from commanding a session.
#[derive(Debug, Clone, Error)]
pub enum SessionIoError {
    /// The session disconnected; its command channel is closed.
    #[error("Session is gone")]
    Gone,

    /// The session reported the command failed.
    #[error("Session command failed: {0}")]
    Failed(String),
}

/// Handle for sending commands to one session.
///
/// Cheap to clone; all clones feed the same connection.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    path: String,
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Creates a handle and the receiver its commands drain from.
    pub fn channel(id: SessionId, path: impl Into<String>) -> (Self, mpsc::Receiver<SessionCommand>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        (
            Self {
                id,
                path: path.into(),
                commands: tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Path of the file this session is editing.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Queues an insert without waiting for completion.
    pub async fn insert(&self, offset: usize, text: String) -> Result<(), SessionIoError> {
        self.send(SessionCommand::Insert {
            offset,
            text,
            done: None,
        })
        .await
    }

    /// Queues a remove without waiting for completion.
    pub async fn remove(&self, offset: usize, length: usize) -> Result<(), SessionIoError> {
        self.send(SessionCommand::Remove {
            offset,
            length,
            done: None,
        })
        .await
    }

    /// Inserts and waits for the session to acknowledge.
    pub async fn insert_acked(&self, offset: usize, text: String) -> Result<(), SessionIoError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Insert {
            offset,
            text,
            done: Some(tx),
        })
        .await?;
        rx.await.map_err(|_| SessionIoError::Gone)?
    }

    /// Removes and waits for the session to acknowledge.
    pub async fn remove_acked(&self, offset: usize, length: usize) -> Result<(), SessionIoError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Remove {
            offset,
            length,
            done: Some(tx),
        })
        .await?;
        rx.await.map_err(|_| SessionIoError::Gone)?
    }

    /// Moves the session's cursor.
    pub async fn set_cursor(&self, offset: usize) -> Result<(), SessionIoError> {
        self.send(SessionCommand::SetCursor { offset }).await
    }

    /// Queries the session's cursor position.
    pub async fn get_cursor(&self) -> Result<CursorPos, SessionIoError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::GetCursor { respond_to: tx }).await?;
        rx.await.map_err(|_| SessionIoError::Gone)
    }

    /// Queries the session's buffer length in bytes.
    pub async fn get_length(&self) -> Result<usize, SessionIoError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::GetLength { respond_to: tx }).await?;
        rx.await.map_err(|_| SessionIoError::Gone)
    }

    /// Queries the session's full buffer text.
    pub async fn get_text(&self) -> Result<String, SessionIoError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::GetText { respond_to: tx }).await?;
        rx.await.map_err(|_| SessionIoError::Gone)
    }

    /// Signals that a full-content write into this session has finished.
    pub async fn insert_done(&self) -> Result<(), SessionIoError> {
        self.send(SessionCommand::InsertDone).await
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), SessionIoError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| SessionIoError::Gone)
    }
}

/// Edit traffic a session reports to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session inserted text locally.
    Insert { offset: usize, text: String },

    /// The session removed a byte range locally.
    Remove { offset: usize, length: usize },

    /// The underlying file was (re)opened in the editor.
    FileOpened { path: String },

    /// The session's buffer is going away.
    Closed,
}
