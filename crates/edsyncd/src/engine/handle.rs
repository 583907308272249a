//! Cloneable handle for talking to the engine actor.

use edsync_core::{DocumentId, DocumentName, SessionId};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::engine::commands::{DocumentSnapshot, EngineCommand, EngineError, EngineEvent};
use crate::session::{SessionEvent, SessionHandle};

/// Handle to the engine actor.
///
/// Cheap to clone; every connection holds one.
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineCommand>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    pub(crate) fn new(
        sender: mpsc::Sender<EngineCommand>,
        event_tx: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self { sender, event_tx }
    }

    /// Attaches a session; returns the id of the document it joined.
    pub async fn attach(&self, session: SessionHandle) -> Result<DocumentId, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EngineCommand::Attach {
                session,
                respond_to: tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Detaches a session; completes once the engine has processed it.
    pub async fn detach(&self, session_id: SessionId) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EngineCommand::Detach {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Forwards an edit or lifecycle event from a session.
    pub async fn session_event(
        &self,
        session_id: SessionId,
        event: SessionEvent,
    ) -> Result<(), EngineError> {
        self.sender
            .send(EngineCommand::Event { session_id, event })
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }

    /// Fetches a snapshot of one document.
    pub async fn get_document(
        &self,
        name: DocumentName,
    ) -> Result<Option<DocumentSnapshot>, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EngineCommand::GetDocument {
                name,
                respond_to: tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Fetches snapshots of all documents.
    pub async fn list_documents(&self) -> Result<Vec<DocumentSnapshot>, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EngineCommand::ListDocuments { respond_to: tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Subscribes to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }
}
