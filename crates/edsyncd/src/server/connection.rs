//! Connection handler for one adapter connection.
//!
//! Each connection carries exactly one session. After the hello handshake
//! the handler splits into two halves:
//! - the read loop parses adapter messages, forwarding edits to the engine
//!   and routing `reply` messages to whichever query is waiting on them,
//! - a writer task drains the session's command channel and serializes each
//!   command onto the wire, registering a sequence number for every command
//!   that expects an answer.
//!
//! Connection errors are logged and end in a graceful detach; they never
//! take the daemon down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use edsync_core::{DocumentName, SessionId};
use edsync_proto::{
    decode_line, encode_line, AdapterMessage, DaemonMessage, ProtocolVersion, ReplyPayload,
    MAX_LINE_SIZE,
};

use crate::engine::EngineHandle;
use crate::session::{CursorPos, SessionCommand, SessionEvent, SessionHandle, SessionIoError};

/// Shared writer half of one connection.
pub type ConnectionWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outstanding daemon-to-adapter queries, keyed by sequence number.
#[derive(Default)]
struct ReplyRouter {
    next_seq: u64,
    pending: HashMap<u64, PendingReply>,
}

/// Where each kind of answer goes once the adapter replies.
enum PendingReply {
    Cursor(oneshot::Sender<CursorPos>),
    Length(oneshot::Sender<usize>),
    Text(oneshot::Sender<String>),
    Done(oneshot::Sender<Result<(), SessionIoError>>),
}

impl ReplyRouter {
    fn register(&mut self, reply: PendingReply) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(seq, reply);
        seq
    }

    fn resolve(&mut self, seq: u64, payload: ReplyPayload) {
        let Some(entry) = self.pending.remove(&seq) else {
            warn!(seq, "Reply with unknown seq, dropping");
            return;
        };

        match (entry, payload) {
            (PendingReply::Cursor(tx), ReplyPayload::Cursor { line, col, offset }) => {
                let _ = tx.send(CursorPos { line, col, offset });
            }
            (PendingReply::Length(tx), ReplyPayload::Length { len }) => {
                let _ = tx.send(len);
            }
            (PendingReply::Text(tx), ReplyPayload::Text { text }) => {
                let _ = tx.send(text);
            }
            (PendingReply::Done(tx), ReplyPayload::Done { ok, error }) => {
                let result = if ok {
                    Ok(())
                } else {
                    Err(SessionIoError::Failed(
                        error.unwrap_or_else(|| "unspecified".to_string()),
                    ))
                };
                let _ = tx.send(result);
            }
            // Dropping the sender surfaces as Gone at the awaiting caller.
            _ => warn!(seq, "Reply payload does not match the query, dropping"),
        }
    }
}

/// Handler for a single adapter connection.
pub struct ConnectionHandler {
    reader: BufReader<OwnedReadHalf>,
    writer: ConnectionWriter,
    engine: EngineHandle,
    connection_number: u64,
}

impl ConnectionHandler {
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        engine: EngineHandle,
        connection_number: u64,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
            engine,
            connection_number,
        }
    }

    /// Runs the connection to completion: handshake, then the read loop.
    pub async fn run(mut self) {
        debug!(connection = self.connection_number, "New adapter connected");

        let path = match self.handle_handshake().await {
            Ok(path) => path,
            Err(e) => {
                warn!(
                    connection = self.connection_number,
                    error = %e,
                    "Handshake failed"
                );
                return;
            }
        };

        let session_id = SessionId::new(self.connection_number);
        let (session, commands) = SessionHandle::channel(session_id, path);
        let router = Arc::new(Mutex::new(ReplyRouter::default()));

        let outbound = tokio::spawn(run_outbound(
            commands,
            Arc::clone(&self.writer),
            Arc::clone(&router),
        ));

        info!(session = %session_id, path = %session.path(), "Adapter handshake completed");

        if let Err(e) = self.process_messages(&session, &router).await {
            debug!(session = %session_id, error = %e, "Connection closed");
        }

        // Idempotent: a session that already sent `closed` is long gone.
        if self.engine.detach(session_id).await.is_err() {
            debug!(session = %session_id, "Engine gone during detach");
        }
        outbound.abort();

        info!(session = %session_id, "Adapter disconnected");
    }

    /// Reads the opening `hello` and validates the protocol version.
    ///
    /// Returns the file path this connection's session is editing.
    async fn handle_handshake(&mut self) -> Result<String, ConnectionError> {
        match self.read_message().await? {
            AdapterMessage::Hello {
                protocol_version,
                path,
            } => {
                if !protocol_version.is_compatible_with(&ProtocolVersion::CURRENT) {
                    self.send_message(&DaemonMessage::error(&format!(
                        "Protocol version {} not compatible with daemon version {}",
                        protocol_version,
                        ProtocolVersion::CURRENT
                    )))
                    .await?;

                    return Err(ConnectionError::VersionMismatch {
                        adapter: protocol_version,
                        daemon: ProtocolVersion::CURRENT,
                    });
                }
                Ok(path)
            }
            other => {
                self.send_message(&DaemonMessage::error("Expected hello as first message"))
                    .await?;
                Err(ConnectionError::UnexpectedMessage(format!("{other:?}")))
            }
        }
    }

    /// Reads and dispatches adapter messages until EOF or an I/O error.
    async fn process_messages(
        &mut self,
        session: &SessionHandle,
        router: &Arc<Mutex<ReplyRouter>>,
    ) -> Result<(), ConnectionError> {
        loop {
            let msg = match self.read_message().await {
                Ok(msg) => msg,
                Err(ConnectionError::Eof) => {
                    debug!(session = %session.id(), "Adapter sent EOF");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            match msg {
                AdapterMessage::Hello { .. } => {
                    self.send_message(&DaemonMessage::error("Already connected"))
                        .await?;
                }

                AdapterMessage::Sync => match self.engine.attach(session.clone()).await {
                    Ok(document_id) => {
                        let name = DocumentName::from_path(session.path());
                        self.send_message(&DaemonMessage::attached(document_id, name))
                            .await?;
                    }
                    Err(e) => {
                        self.send_message(&DaemonMessage::error(&e.to_string()))
                            .await?;
                    }
                },

                AdapterMessage::Insert { offset, text } => {
                    self.forward_event(session.id(), SessionEvent::Insert { offset, text })
                        .await?;
                }

                AdapterMessage::Remove { offset, length } => {
                    self.forward_event(session.id(), SessionEvent::Remove { offset, length })
                        .await?;
                }

                AdapterMessage::FileOpened { path } => {
                    self.forward_event(session.id(), SessionEvent::FileOpened { path })
                        .await?;
                }

                AdapterMessage::Closed => {
                    // Detaches the session; the connection itself stays up so
                    // the adapter can sync again later.
                    self.forward_event(session.id(), SessionEvent::Closed)
                        .await?;
                }

                AdapterMessage::Reply { seq, payload } => {
                    router.lock().await.resolve(seq, payload);
                }
            }
        }
    }

    async fn forward_event(
        &self,
        session_id: SessionId,
        event: SessionEvent,
    ) -> Result<(), ConnectionError> {
        self.engine
            .session_event(session_id, event)
            .await
            .map_err(|e| ConnectionError::Engine(e.to_string()))
    }

    /// Reads a single message from the adapter.
    async fn read_message(&mut self) -> Result<AdapterMessage, ConnectionError> {
        let mut line = String::new();

        let bytes_read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line.len() > MAX_LINE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: line.len(),
                max: MAX_LINE_SIZE,
            });
        }

        decode_line(&line).map_err(|e| ConnectionError::Protocol(e.to_string()))
    }

    async fn send_message(&self, msg: &DaemonMessage) -> Result<(), ConnectionError> {
        write_message(&self.writer, msg).await
    }
}

/// Drains a session's command channel onto the wire.
///
/// Runs until the engine drops its last handle to the session or the socket
/// write fails. Commands that expect an answer are registered with the
/// router before they hit the wire, so a fast adapter cannot reply to a seq
/// that is not yet pending.
async fn run_outbound(
    mut commands: mpsc::Receiver<SessionCommand>,
    writer: ConnectionWriter,
    router: Arc<Mutex<ReplyRouter>>,
) {
    while let Some(cmd) = commands.recv().await {
        let msg = match cmd {
            SessionCommand::Insert { offset, text, done } => {
                let seq = match done {
                    Some(tx) => Some(router.lock().await.register(PendingReply::Done(tx))),
                    None => None,
                };
                DaemonMessage::Insert { offset, text, seq }
            }
            SessionCommand::Remove {
                offset,
                length,
                done,
            } => {
                let seq = match done {
                    Some(tx) => Some(router.lock().await.register(PendingReply::Done(tx))),
                    None => None,
                };
                DaemonMessage::Remove {
                    offset,
                    length,
                    seq,
                }
            }
            SessionCommand::SetCursor { offset } => DaemonMessage::SetCursor { offset },
            SessionCommand::GetCursor { respond_to } => {
                let seq = router.lock().await.register(PendingReply::Cursor(respond_to));
                DaemonMessage::GetCursor { seq }
            }
            SessionCommand::GetLength { respond_to } => {
                let seq = router.lock().await.register(PendingReply::Length(respond_to));
                DaemonMessage::GetLength { seq }
            }
            SessionCommand::GetText { respond_to } => {
                let seq = router.lock().await.register(PendingReply::Text(respond_to));
                DaemonMessage::GetText { seq }
            }
            SessionCommand::InsertDone => DaemonMessage::InsertDone,
        };

        if let Err(e) = write_message(&writer, &msg).await {
            debug!(error = %e, "Writer failed, dropping outbound commands");
            break;
        }
    }
}

async fn write_message(
    writer: &ConnectionWriter,
    msg: &DaemonMessage,
) -> Result<(), ConnectionError> {
    let line = encode_line(msg).map_err(|e| ConnectionError::Protocol(e.to_string()))?;

    let mut writer = writer.lock().await;

    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version mismatch: adapter {adapter}, daemon {daemon}")]
    VersionMismatch {
        adapter: ProtocolVersion,
        daemon: ProtocolVersion,
    },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Engine error: {0}")]
    Engine(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::VersionMismatch {
            adapter: ProtocolVersion::new(2, 0),
            daemon: ProtocolVersion::new(1, 0),
        };
        assert!(err.to_string().contains("2.0"));
        assert!(err.to_string().contains("1.0"));
    }

    #[test]
    fn test_message_size_error() {
        let err = ConnectionError::MessageTooLarge {
            size: 2_000_000,
            max: MAX_LINE_SIZE,
        };
        assert!(err.to_string().contains("2000000"));
    }

    #[tokio::test]
    async fn test_reply_router_resolves_matching_kind() {
        let mut router = ReplyRouter::default();
        let (tx, rx) = oneshot::channel();
        let seq = router.register(PendingReply::Length(tx));

        router.resolve(seq, ReplyPayload::Length { len: 17 });
        assert_eq!(rx.await.unwrap(), 17);
    }

    #[tokio::test]
    async fn test_reply_router_drops_mismatched_kind() {
        let mut router = ReplyRouter::default();
        let (tx, rx) = oneshot::channel();
        let seq = router.register(PendingReply::Length(tx));

        router.resolve(
            seq,
            ReplyPayload::Text {
                text: "nope".to_string(),
            },
        );
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_reply_router_seqs_are_unique() {
        let mut router = ReplyRouter::default();
        let (tx_a, _rx_a) = oneshot::channel();
        let (tx_b, _rx_b) = oneshot::channel();
        let a = router.register(PendingReply::Length(tx_a));
        let b = router.register(PendingReply::Length(tx_b));
        assert_ne!(a, b);
    }
}
