//! The sync engine actor.
//!
//! Owns every document and all per-session pairing state. All mutation flows
//! through the actor's command channel and is processed one command at a
//! time, which is the entire concurrency story: no locks, no torn documents.
//! Pairing-window timers and initial content reads run on their own tasks
//! and re-enter through the same channel.

use std::collections::HashMap;
use std::time::Duration;

use edsync_core::{DocumentId, DocumentName, EditCombiner, EditOp, PendingId, SessionId, TimerOp};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::commands::{DocumentSnapshot, EngineCommand, EngineEvent};
use crate::engine::document::{spawn_pull_full_content, spawn_push_full_content, Document};
use crate::session::{SessionEvent, SessionHandle};

/// Pairing state tying one attached session to its document.
struct SessionBinding {
    document: DocumentName,
    combiner: EditCombiner,
    pairing_timer: Option<(PendingId, JoinHandle<()>)>,
}

/// Actor that owns all engine state.
pub(crate) struct EngineActor {
    receiver: mpsc::Receiver<EngineCommand>,
    /// Sender side of our own channel, handed to timers and seed tasks.
    commands: mpsc::Sender<EngineCommand>,
    event_publisher: broadcast::Sender<EngineEvent>,
    documents: HashMap<DocumentName, Document>,
    bindings: HashMap<SessionId, SessionBinding>,
    next_document_id: u64,
    pairing_window: Duration,
}

impl EngineActor {
    pub fn new(
        receiver: mpsc::Receiver<EngineCommand>,
        commands: mpsc::Sender<EngineCommand>,
        event_publisher: broadcast::Sender<EngineEvent>,
        pairing_window: Duration,
    ) -> Self {
        Self {
            receiver,
            commands,
            event_publisher,
            documents: HashMap::new(),
            bindings: HashMap::new(),
            next_document_id: 1,
            pairing_window,
        }
    }

    /// Runs until every command sender is dropped.
    pub async fn run(mut self) {
        info!("Engine actor started");
        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }
        info!("Engine actor stopped");
    }

    async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Attach {
                session,
                respond_to,
            } => {
                let result = self.handle_attach(session);
                let _ = respond_to.send(Ok(result));
            }
            EngineCommand::Detach {
                session_id,
                respond_to,
            } => {
                self.handle_detach(session_id);
                let _ = respond_to.send(());
            }
            EngineCommand::Event { session_id, event } => {
                self.handle_event(session_id, event).await;
            }
            EngineCommand::SeedDocument { document_id, text } => {
                self.handle_seed(document_id, text);
            }
            EngineCommand::PairingExpired {
                session_id,
                pending_id,
            } => {
                self.handle_pairing_expired(session_id, pending_id).await;
            }
            EngineCommand::GetDocument { name, respond_to } => {
                let snapshot = self.documents.get(&name).map(Document::snapshot);
                let _ = respond_to.send(snapshot);
            }
            EngineCommand::ListDocuments { respond_to } => {
                let mut snapshots: Vec<DocumentSnapshot> =
                    self.documents.values().map(Document::snapshot).collect();
                snapshots.sort_by_key(|s| s.id.as_u64());
                let _ = respond_to.send(snapshots);
            }
        }
    }

    /// Attaches a session to the document named by its file path.
    ///
    /// An existing document's content wins: the session's buffer is
    /// overwritten with it. The first session of a new document instead has
    /// its buffer read back to seed the content. A session that is already
    /// attached gets its buffer rewritten from the document (reload).
    fn handle_attach(&mut self, session: SessionHandle) -> DocumentId {
        let session_id = session.id();

        if let Some(binding) = self.bindings.get(&session_id) {
            if let Some(doc) = self.documents.get(&binding.document) {
                info!(session = %session_id, document = %doc.id, "Session re-synced, reloading buffer");
                spawn_push_full_content(doc.content.clone(), session);
                return doc.id;
            }
        }

        let name = DocumentName::from_path(session.path());
        let doc_id = match self.documents.get_mut(&name) {
            Some(doc) => {
                spawn_push_full_content(doc.content.clone(), session.clone());
                doc.sessions.push(session.clone());
                doc.id
            }
            None => {
                let id = DocumentId::new(self.next_document_id);
                self.next_document_id += 1;

                let mut doc = Document::new(id, name.clone());
                doc.sessions.push(session.clone());
                self.documents.insert(name.clone(), doc);

                let _ = self.event_publisher.send(EngineEvent::DocumentCreated {
                    document_id: id,
                    name: name.clone(),
                });

                spawn_pull_full_content(self.commands.clone(), id, session.clone());
                id
            }
        };

        self.bindings.insert(
            session_id,
            SessionBinding {
                document: name.clone(),
                combiner: EditCombiner::new(),
                pairing_timer: None,
            },
        );

        info!(
            session = %session_id,
            document = %doc_id,
            name = %name,
            "Session attached"
        );
        let _ = self.event_publisher.send(EngineEvent::SessionAttached {
            session_id,
            document_id: doc_id,
        });

        doc_id
    }

    /// Detaches a session, discarding its document if it was the last one.
    ///
    /// A pairing still in flight is dropped without emitting its remove; the
    /// departing session's last half-edit has no author to pair it with.
    fn handle_detach(&mut self, session_id: SessionId) {
        let Some(mut binding) = self.bindings.remove(&session_id) else {
            debug!(session = %session_id, "Detach for unknown session, ignoring");
            return;
        };

        if let Some((_, handle)) = binding.pairing_timer.take() {
            handle.abort();
        }
        binding.combiner.cancel();

        if let Some(doc) = self.documents.get_mut(&binding.document) {
            doc.sessions.retain(|s| s.id() != session_id);
            let doc_id = doc.id;

            let _ = self.event_publisher.send(EngineEvent::SessionDetached {
                session_id,
                document_id: doc_id,
            });

            if doc.sessions.is_empty() {
                if let Some(doc) = self.documents.remove(&binding.document) {
                    info!(
                        document = %doc.id,
                        name = %doc.name,
                        "Last session detached, discarding document"
                    );
                    let _ = self.event_publisher.send(EngineEvent::DocumentRemoved {
                        document_id: doc.id,
                        name: doc.name,
                    });
                }
            }
        }

        info!(session = %session_id, "Session detached");
    }

    async fn handle_event(&mut self, session_id: SessionId, event: SessionEvent) {
        if !self.bindings.contains_key(&session_id) {
            debug!(session = %session_id, "Event from unattached session, ignoring");
            return;
        }

        match event {
            SessionEvent::Insert { offset, text } => {
                let step = {
                    let Some(binding) = self.bindings.get_mut(&session_id) else {
                        return;
                    };
                    let Some(doc) = self.documents.get(&binding.document) else {
                        return;
                    };
                    binding.combiner.on_insert(offset, &text, &doc.content)
                };
                self.run_step(session_id, step.ops, step.timers).await;
            }
            SessionEvent::Remove { offset, length } => {
                let step = {
                    let Some(binding) = self.bindings.get_mut(&session_id) else {
                        return;
                    };
                    binding.combiner.on_remove(offset, length)
                };
                self.run_step(session_id, step.ops, step.timers).await;
            }
            SessionEvent::FileOpened { path } => {
                // The editor re-read the file from disk; re-push our content
                // so the document stays authoritative.
                debug!(session = %session_id, path = %path, "File re-opened, reloading buffer");
                if let Some(binding) = self.bindings.get(&session_id) {
                    if let Some(doc) = self.documents.get(&binding.document) {
                        if let Some(session) =
                            doc.sessions.iter().find(|s| s.id() == session_id)
                        {
                            spawn_push_full_content(doc.content.clone(), session.clone());
                        }
                    }
                }
            }
            SessionEvent::Closed => {
                self.handle_detach(session_id);
            }
        }
    }

    async fn handle_pairing_expired(&mut self, session_id: SessionId, pending_id: PendingId) {
        let step = {
            let Some(binding) = self.bindings.get_mut(&session_id) else {
                debug!(session = %session_id, "Expiry for detached session, ignoring");
                return;
            };
            if let Some((id, _)) = &binding.pairing_timer {
                if *id == pending_id {
                    binding.pairing_timer = None;
                }
            }
            binding.combiner.on_pairing_expired(pending_id)
        };
        self.run_step(session_id, step.ops, step.timers).await;
    }

    fn handle_seed(&mut self, document_id: DocumentId, text: String) {
        let Some(doc) = self
            .documents
            .values_mut()
            .find(|d| d.id == document_id)
        else {
            debug!(document = %document_id, "Seed for discarded document, ignoring");
            return;
        };

        doc.content = text.into_bytes();
        debug!(
            document = %document_id,
            len = doc.content.len(),
            "Document seeded from session"
        );
    }

    /// Applies a combiner step: timer directives first, then the edits.
    async fn run_step(
        &mut self,
        session_id: SessionId,
        ops: Vec<EditOp>,
        timers: Vec<TimerOp>,
    ) {
        for timer in timers {
            match timer {
                TimerOp::Cancel(id) => self.cancel_pairing_timer(session_id, id),
                TimerOp::Start(id) => self.start_pairing_timer(session_id, id),
            }
        }

        if ops.is_empty() {
            return;
        }

        let Some(binding) = self.bindings.get(&session_id) else {
            return;
        };
        let name = binding.document.clone();
        let Some(doc) = self.documents.get_mut(&name) else {
            warn!(session = %session_id, document = %name, "Binding references missing document");
            return;
        };

        for op in &ops {
            doc.apply(op, session_id).await;
        }
    }

    fn start_pairing_timer(&mut self, session_id: SessionId, pending_id: PendingId) {
        let Some(binding) = self.bindings.get_mut(&session_id) else {
            return;
        };

        let commands = self.commands.clone();
        let window = self.pairing_window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = commands
                .send(EngineCommand::PairingExpired {
                    session_id,
                    pending_id,
                })
                .await;
        });

        // The combiner cancels any superseded pairing first, so at most one
        // timer is live per session.
        binding.pairing_timer = Some((pending_id, handle));
    }

    fn cancel_pairing_timer(&mut self, session_id: SessionId, pending_id: PendingId) {
        let Some(binding) = self.bindings.get_mut(&session_id) else {
            return;
        };
        if let Some((id, handle)) = binding.pairing_timer.take() {
            if id == pending_id {
                handle.abort();
            } else {
                binding.pairing_timer = Some((id, handle));
            }
        }
    }
}
