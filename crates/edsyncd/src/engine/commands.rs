//! Command and event types for the sync engine actor.

use chrono::{DateTime, Utc};
use edsync_core::{DocumentId, DocumentName, PendingId, SessionId};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::session::{SessionEvent, SessionHandle};

/// Commands processed by the engine actor.
///
/// Everything that mutates a document arrives here, so document state only
/// ever changes on the actor's task.
#[derive(Debug)]
pub enum EngineCommand {
    /// Attach a session to the document named by its file path.
    Attach {
        session: SessionHandle,
        respond_to: oneshot::Sender<Result<DocumentId, EngineError>>,
    },

    /// Detach a session. Idempotent; unknown sessions are ignored.
    Detach {
        session_id: SessionId,
        respond_to: oneshot::Sender<()>,
    },

    /// An edit or lifecycle event reported by a session.
    Event {
        session_id: SessionId,
        event: SessionEvent,
    },

    /// Initial content read back from the first session of a new document.
    /// Ignored if the document was discarded while the read was in flight.
    SeedDocument {
        document_id: DocumentId,
        text: String,
    },

    /// A pairing-window timer fired for a session's held remove.
    PairingExpired {
        session_id: SessionId,
        pending_id: PendingId,
    },

    /// Fetch a snapshot of one document by name.
    GetDocument {
        name: DocumentName,
        respond_to: oneshot::Sender<Option<DocumentSnapshot>>,
    },

    /// Fetch snapshots of all documents.
    ListDocuments {
        respond_to: oneshot::Sender<Vec<DocumentSnapshot>>,
    },
}

/// Errors from engine operations.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine actor has stopped; its command channel is closed.
    #[error("Engine channel closed")]
    ChannelClosed,
}

/// Events broadcast by the engine to interested observers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    DocumentCreated {
        document_id: DocumentId,
        name: DocumentName,
    },
    DocumentRemoved {
        document_id: DocumentId,
        name: DocumentName,
    },
    SessionAttached {
        session_id: SessionId,
        document_id: DocumentId,
    },
    SessionDetached {
        session_id: SessionId,
        document_id: DocumentId,
    },
}

/// Point-in-time view of a document.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub id: DocumentId,
    pub name: DocumentName,
    pub content: Vec<u8>,
    pub session_count: usize,
    pub created_at: DateTime<Utc>,
}
