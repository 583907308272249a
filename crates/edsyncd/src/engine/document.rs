//! Document state and edit fan-out.
//!
//! A document is the daemon-side copy of one named file's content plus the
//! sessions attached to it. Applying an edit mutates the content and forwards
//! the edit to every attached session except the one it came from.
//!
//! Two wire peculiarities are kept for adapter compatibility:
//! - an insert of empty text is forwarded as a bare `"\n"` (the content
//!   itself is not touched),
//! - a remove that clamps to zero length is forwarded as length 1.

use chrono::{DateTime, Utc};
use edsync_core::{DocumentId, DocumentName, EditOp, SessionId};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::cursor::CursorGuard;
use crate::engine::commands::{DocumentSnapshot, EngineCommand};
use crate::session::{SessionHandle, SessionIoError};

/// One synchronized document and its attached sessions.
#[derive(Debug)]
pub(crate) struct Document {
    pub id: DocumentId,
    pub name: DocumentName,
    pub content: Vec<u8>,
    pub sessions: Vec<SessionHandle>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(id: DocumentId, name: DocumentName) -> Self {
        Self {
            id,
            name,
            content: Vec::new(),
            sessions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            id: self.id,
            name: self.name.clone(),
            content: self.content.clone(),
            session_count: self.sessions.len(),
            created_at: self.created_at,
        }
    }

    /// Applies one edit from `origin` and forwards it to the other sessions.
    pub async fn apply(&mut self, op: &EditOp, origin: SessionId) {
        match op {
            EditOp::Insert { offset, bytes } => self.apply_insert(*offset, bytes, origin).await,
            EditOp::Remove { offset, length } => self.apply_remove(*offset, *length, origin).await,
        }
    }

    async fn apply_insert(&mut self, offset: usize, bytes: &[u8], origin: SessionId) {
        let text = if bytes.is_empty() {
            // Empty insert stands for a bare line terminator on the wire.
            "\n".to_string()
        } else {
            let at = offset.min(self.content.len());
            self.content.splice(at..at, bytes.iter().copied());
            String::from_utf8_lossy(bytes).into_owned()
        };

        debug!(
            document = %self.id,
            origin = %origin,
            offset,
            len = bytes.len(),
            "Applying insert"
        );

        for session in &self.sessions {
            if session.id() == origin {
                continue;
            }
            if let Err(e) = session.insert(offset, text.clone()).await {
                debug!(
                    session = %session.id(),
                    error = %e,
                    "Could not forward insert"
                );
            }
        }
    }

    async fn apply_remove(&mut self, offset: usize, length: usize, origin: SessionId) {
        let offset = offset.min(self.content.len());
        let length = length.min(self.content.len() - offset);
        if length > 0 {
            self.content.drain(offset..offset + length);
        }

        debug!(
            document = %self.id,
            origin = %origin,
            offset,
            length,
            "Applying remove"
        );

        let wire_length = length.max(1);
        for session in &self.sessions {
            if session.id() == origin {
                continue;
            }
            if let Err(e) = session.remove(offset, wire_length).await {
                debug!(
                    session = %session.id(),
                    error = %e,
                    "Could not forward remove"
                );
            }
        }
    }
}

/// Replaces a session's whole buffer with the document content.
///
/// Runs on its own task so the engine never blocks on session I/O. The remove
/// and the insert are acked; any failure aborts the rest of the chain so a
/// half-written buffer is never reported as complete.
pub(crate) fn spawn_push_full_content(content: Vec<u8>, session: SessionHandle) {
    tokio::spawn(async move {
        if let Err(e) = push_full_content(&content, &session).await {
            error!(
                session = %session.id(),
                error = %e,
                "Full-content push failed"
            );
        }
    });
}

async fn push_full_content(content: &[u8], session: &SessionHandle) -> Result<(), SessionIoError> {
    let text = String::from_utf8_lossy(content).into_owned();

    CursorGuard::scoped(session, || async {
        let len = session.get_length().await?;
        if len > 0 {
            session.remove_acked(0, len).await?;
        }
        session.insert_acked(0, text).await?;
        Ok(())
    })
    .await?;

    session.insert_done().await
}

/// Reads a session's full buffer to seed a freshly created document.
///
/// The text re-enters the engine as [`EngineCommand::SeedDocument`] so the
/// content mutation still happens on the actor's task; a document discarded
/// while the read was in flight drops the seed there.
pub(crate) fn spawn_pull_full_content(
    commands: mpsc::Sender<EngineCommand>,
    document_id: DocumentId,
    session: SessionHandle,
) {
    tokio::spawn(async move {
        match session.get_text().await {
            Ok(text) => {
                if commands
                    .send(EngineCommand::SeedDocument { document_id, text })
                    .await
                    .is_err()
                {
                    debug!(document = %document_id, "Engine gone before seed arrived");
                    return;
                }
                if let Err(e) = session.insert_done().await {
                    debug!(session = %session.id(), error = %e, "Could not signal read complete");
                }
            }
            Err(e) => {
                error!(
                    session = %session.id(),
                    document = %document_id,
                    error = %e,
                    "Initial content read failed"
                );
            }
        }
    });
}
