//! Integration tests for the sync engine.
//!
//! Each test drives the engine through [`EngineHandle`] with mock sessions
//! that service their command channel against an in-memory buffer, the same
//! way a connection's writer task would against a real editor.

use std::sync::Arc;
use std::time::Duration;

use edsync_core::SessionId;
use edsyncd::engine::{spawn_engine, EngineConfig, EngineEvent, EngineHandle};
use edsyncd::session::{CursorPos, SessionCommand, SessionEvent, SessionHandle};
use tokio::sync::Mutex;

/// Traffic the engine sent to a mock session.
#[derive(Debug, Clone, PartialEq, Eq)]
enum WireOp {
    Insert { offset: usize, text: String },
    Remove { offset: usize, length: usize },
    SetCursor { offset: usize },
    InsertDone,
}

/// In-memory stand-in for a connected editor buffer.
#[derive(Clone)]
struct MockSession {
    handle: SessionHandle,
    buffer: Arc<Mutex<Vec<u8>>>,
    recorded: Arc<Mutex<Vec<WireOp>>>,
}

impl MockSession {
    fn spawn(id: u64, path: &str, initial: &str, cursor_offset: usize) -> Self {
        let (handle, mut rx) = SessionHandle::channel(SessionId::new(id), path);
        let buffer = Arc::new(Mutex::new(initial.as_bytes().to_vec()));
        let recorded = Arc::new(Mutex::new(Vec::new()));

        let buf = Arc::clone(&buffer);
        let rec = Arc::clone(&recorded);
        tokio::spawn(async move {
            let mut cursor = CursorPos {
                line: 1,
                col: cursor_offset as u64 + 1,
                offset: cursor_offset,
            };
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    SessionCommand::Insert { offset, text, done } => {
                        let mut buf = buf.lock().await;
                        let at = offset.min(buf.len());
                        buf.splice(at..at, text.bytes());
                        rec.lock().await.push(WireOp::Insert { offset, text });
                        if let Some(tx) = done {
                            let _ = tx.send(Ok(()));
                        }
                    }
                    SessionCommand::Remove {
                        offset,
                        length,
                        done,
                    } => {
                        let mut buf = buf.lock().await;
                        let at = offset.min(buf.len());
                        let end = (at + length).min(buf.len());
                        buf.drain(at..end);
                        rec.lock().await.push(WireOp::Remove { offset, length });
                        if let Some(tx) = done {
                            let _ = tx.send(Ok(()));
                        }
                    }
                    SessionCommand::SetCursor { offset } => {
                        cursor.offset = offset;
                        rec.lock().await.push(WireOp::SetCursor { offset });
                    }
                    SessionCommand::GetCursor { respond_to } => {
                        let _ = respond_to.send(cursor);
                    }
                    SessionCommand::GetLength { respond_to } => {
                        let _ = respond_to.send(buf.lock().await.len());
                    }
                    SessionCommand::GetText { respond_to } => {
                        let text = String::from_utf8_lossy(&buf.lock().await).into_owned();
                        let _ = respond_to.send(text);
                    }
                    SessionCommand::InsertDone => {
                        rec.lock().await.push(WireOp::InsertDone);
                    }
                }
            }
        });

        Self {
            handle,
            buffer,
            recorded,
        }
    }

    async fn text(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().await).into_owned()
    }

    async fn ops(&self) -> Vec<WireOp> {
        self.recorded.lock().await.clone()
    }

    async fn clear_recorded(&self) {
        self.recorded.lock().await.clear();
    }
}

/// Polls until `f` holds; panics after ~2.5s of simulated time.
async fn wait_until<F, Fut>(what: &str, mut f: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..500 {
        if f().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}

fn engine() -> EngineHandle {
    spawn_engine(EngineConfig::default())
}

/// Attaches a mock session and waits for its full-content exchange (seed or
/// push) to settle on the given document text.
async fn attach_settled(engine: &EngineHandle, session: &MockSession, expected: &str) {
    engine.attach(session.handle.clone()).await.unwrap();
    let name = edsync_core::DocumentName::from_path(session.handle.path());
    wait_until("document content to settle", || async {
        match engine.get_document(name.clone()).await.unwrap() {
            Some(snap) => snap.content == expected.as_bytes(),
            None => false,
        }
    })
    .await;
    wait_until("session buffer to settle", || async {
        session.text().await == expected
    })
    .await;
    // Both the seed read and the content push end with an insert-done
    // marker; wait for it so no residue lands after the clear.
    wait_until("full-content exchange to finish", || async {
        session.ops().await.last() == Some(&WireOp::InsertDone)
    })
    .await;
    session.clear_recorded().await;
}

#[tokio::test]
async fn test_first_session_seeds_document() {
    let engine = engine();
    let a = MockSession::spawn(1, "/home/u/notes.txt", "hello world", 0);

    let doc_id = engine.attach(a.handle.clone()).await.unwrap();

    let name = edsync_core::DocumentName::from_path("/home/u/notes.txt");
    wait_until("seed to arrive", || async {
        match engine.get_document(name.clone()).await.unwrap() {
            Some(snap) => snap.content == b"hello world",
            None => false,
        }
    })
    .await;

    let snap = engine.get_document(name).await.unwrap().unwrap();
    assert_eq!(snap.id, doc_id);
    assert_eq!(snap.session_count, 1);

    // The seeding read completes with an insert-done marker.
    wait_until("read-complete marker", || async {
        a.ops().await.contains(&WireOp::InsertDone)
    })
    .await;
}

#[tokio::test]
async fn test_existing_document_content_wins() {
    let engine = engine();
    let a = MockSession::spawn(1, "/a/notes.txt", "authoritative", 0);
    attach_settled(&engine, &a, "authoritative").await;

    // Second session arrives with different local content; it gets
    // overwritten, not merged.
    let b = MockSession::spawn(2, "/b/notes.txt", "stale stuff", 0);
    engine.attach(b.handle.clone()).await.unwrap();

    wait_until("second buffer overwritten", || async {
        b.text().await == "authoritative"
    })
    .await;

    // Both paths map to one document.
    let docs = engine.list_documents().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].session_count, 2);
}

#[tokio::test]
async fn test_push_preserves_cursor_and_signals_completion() {
    let engine = engine();
    let a = MockSession::spawn(1, "/a/notes.txt", "hello world", 0);
    attach_settled(&engine, &a, "hello world").await;

    let b = MockSession::spawn(2, "/b/notes.txt", "stale", 7);
    engine.attach(b.handle.clone()).await.unwrap();

    wait_until("push to complete", || async {
        b.ops().await.last() == Some(&WireOp::InsertDone)
    })
    .await;

    assert_eq!(
        b.ops().await,
        vec![
            WireOp::Remove {
                offset: 0,
                length: 5
            },
            WireOp::Insert {
                offset: 0,
                text: "hello world".to_string()
            },
            WireOp::SetCursor { offset: 7 },
            WireOp::InsertDone,
        ]
    );
}

#[tokio::test]
async fn test_plain_insert_reaches_peers_not_origin() {
    let engine = engine();
    let a = MockSession::spawn(1, "/a/notes.txt", "", 0);
    attach_settled(&engine, &a, "").await;
    let b = MockSession::spawn(2, "/b/notes.txt", "", 0);
    attach_settled(&engine, &b, "").await;
    let c = MockSession::spawn(3, "/c/notes.txt", "", 0);
    attach_settled(&engine, &c, "").await;

    engine
        .session_event(
            a.handle.id(),
            SessionEvent::Insert {
                offset: 0,
                text: "hi".to_string(),
            },
        )
        .await
        .unwrap();

    wait_until("peers to receive insert", || async {
        b.text().await == "hi" && c.text().await == "hi"
    })
    .await;

    // The origin session never hears its own edit back.
    assert!(a.ops().await.is_empty());
}

#[tokio::test]
async fn test_remove_insert_pair_combines_to_minimal_patch() {
    let engine = engine();
    let a = MockSession::spawn(1, "/a/notes.txt", "hello world", 0);
    attach_settled(&engine, &a, "hello world").await;
    let b = MockSession::spawn(2, "/b/notes.txt", "", 0);
    attach_settled(&engine, &b, "hello world").await;

    // The session reports the whole-line replacement as remove-all plus
    // insert-all; peers should see only the changed span.
    engine
        .session_event(
            a.handle.id(),
            SessionEvent::Remove {
                offset: 0,
                length: 11,
            },
        )
        .await
        .unwrap();
    engine
        .session_event(
            a.handle.id(),
            SessionEvent::Insert {
                offset: 0,
                text: "hello earth".to_string(),
            },
        )
        .await
        .unwrap();

    wait_until("peer to converge", || async {
        b.text().await == "hello earth"
    })
    .await;

    // Never the verbatim 11-byte rewrite.
    for op in b.ops().await {
        match op {
            WireOp::Remove { length, .. } => assert!(length < 11),
            WireOp::Insert { ref text, .. } => assert!(text.len() < 11),
            _ => {}
        }
    }

    let name = edsync_core::DocumentName::from_path("/a/notes.txt");
    let snap = engine.get_document(name).await.unwrap().unwrap();
    assert_eq!(snap.content, b"hello earth");
}

#[tokio::test(start_paused = true)]
async fn test_unpaired_remove_applies_after_window() {
    let engine = engine();
    let a = MockSession::spawn(1, "/a/notes.txt", "hello world", 0);
    attach_settled(&engine, &a, "hello world").await;
    let b = MockSession::spawn(2, "/b/notes.txt", "", 0);
    attach_settled(&engine, &b, "hello world").await;

    engine
        .session_event(
            a.handle.id(),
            SessionEvent::Remove {
                offset: 0,
                length: 6,
            },
        )
        .await
        .unwrap();

    // Held back: nothing reaches the peer inside the pairing window.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(b.ops().await.is_empty());

    // Past the window the remove is applied verbatim.
    tokio::time::sleep(Duration::from_millis(300)).await;
    wait_until("verbatim remove to land", || async {
        b.text().await == "world"
    })
    .await;
    assert_eq!(
        b.ops().await,
        vec![WireOp::Remove {
            offset: 0,
            length: 6
        }]
    );
}

#[tokio::test]
async fn test_trailing_terminator_replacement_wire_sequence() {
    let engine = engine();
    let a = MockSession::spawn(1, "/a/notes.txt", "ab\ncd", 0);
    attach_settled(&engine, &a, "ab\ncd").await;
    let b = MockSession::spawn(2, "/b/notes.txt", "", 0);
    attach_settled(&engine, &b, "ab\ncd").await;

    // Replace "ab\n" with "abX": the terminator in the cut is accounted for
    // by the swallow flag, and the zero-length remove goes out as length 1.
    engine
        .session_event(
            a.handle.id(),
            SessionEvent::Remove {
                offset: 0,
                length: 3,
            },
        )
        .await
        .unwrap();
    engine
        .session_event(
            a.handle.id(),
            SessionEvent::Insert {
                offset: 0,
                text: "abX".to_string(),
            },
        )
        .await
        .unwrap();

    wait_until("combined ops to reach peer", || async {
        b.ops().await.len() == 2
    })
    .await;
    assert_eq!(
        b.ops().await,
        vec![
            WireOp::Remove {
                offset: 2,
                length: 1
            },
            WireOp::Insert {
                offset: 2,
                text: "X".to_string()
            },
        ]
    );

    // The compensating bare terminator from the session is swallowed.
    engine
        .session_event(
            a.handle.id(),
            SessionEvent::Insert {
                offset: 3,
                text: "\n".to_string(),
            },
        )
        .await
        .unwrap();
    engine.list_documents().await.unwrap(); // flush the engine
    assert_eq!(b.ops().await.len(), 2);
}

#[tokio::test]
async fn test_wire_quirks_do_not_mutate_content() {
    let engine = engine();
    let a = MockSession::spawn(1, "/a/notes.txt", "ab", 0);
    attach_settled(&engine, &a, "ab").await;
    let b = MockSession::spawn(2, "/b/notes.txt", "", 0);
    attach_settled(&engine, &b, "ab").await;

    // A zero-length remove goes out as length 1.
    engine
        .session_event(
            a.handle.id(),
            SessionEvent::Remove {
                offset: 1,
                length: 0,
            },
        )
        .await
        .unwrap();
    // An empty insert goes out as a bare line terminator.
    engine
        .session_event(
            a.handle.id(),
            SessionEvent::Insert {
                offset: 1,
                text: String::new(),
            },
        )
        .await
        .unwrap();

    wait_until("quirk ops to reach peer", || async {
        b.ops().await.len() == 2
    })
    .await;
    assert_eq!(
        b.ops().await,
        vec![
            WireOp::Remove {
                offset: 1,
                length: 1
            },
            WireOp::Insert {
                offset: 1,
                text: "\n".to_string()
            },
        ]
    );

    // Neither quirk touched the document's own content.
    let name = edsync_core::DocumentName::from_path("/a/notes.txt");
    let snap = engine.get_document(name).await.unwrap().unwrap();
    assert_eq!(snap.content, b"ab");
}

#[tokio::test(start_paused = true)]
async fn test_detach_drops_pending_remove_silently() {
    let engine = engine();
    let a = MockSession::spawn(1, "/a/notes.txt", "hello world", 0);
    attach_settled(&engine, &a, "hello world").await;
    let b = MockSession::spawn(2, "/b/notes.txt", "", 0);
    attach_settled(&engine, &b, "hello world").await;

    engine
        .session_event(
            a.handle.id(),
            SessionEvent::Remove {
                offset: 0,
                length: 6,
            },
        )
        .await
        .unwrap();
    engine.detach(a.handle.id()).await.unwrap();

    // The departed session's half-edit never fires, even past the window.
    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.list_documents().await.unwrap(); // flush the engine
    assert!(b.ops().await.is_empty());
    assert_eq!(b.text().await, "hello world");
}

#[tokio::test]
async fn test_last_detach_discards_document_and_id_is_fresh() {
    let engine = engine();
    let a = MockSession::spawn(1, "/a/notes.txt", "data", 0);
    engine.attach(a.handle.clone()).await.unwrap();
    let first_id = {
        let name = edsync_core::DocumentName::from_path("/a/notes.txt");
        wait_until("seed", || async {
            engine.get_document(name.clone()).await.unwrap().is_some()
        })
        .await;
        engine.get_document(name).await.unwrap().unwrap().id
    };

    engine.detach(a.handle.id()).await.unwrap();
    assert!(engine.list_documents().await.unwrap().is_empty());

    // Same name later gets a brand-new document, not resurrected content.
    let b = MockSession::spawn(2, "/b/notes.txt", "fresh", 0);
    engine.attach(b.handle.clone()).await.unwrap();
    let name = edsync_core::DocumentName::from_path("/b/notes.txt");
    wait_until("reseed", || async {
        match engine.get_document(name.clone()).await.unwrap() {
            Some(snap) => snap.content == b"fresh",
            None => false,
        }
    })
    .await;
    let second_id = engine.get_document(name).await.unwrap().unwrap().id;
    assert_ne!(first_id, second_id);
}

#[tokio::test]
async fn test_closed_event_detaches_session() {
    let engine = engine();
    let a = MockSession::spawn(1, "/a/notes.txt", "data", 0);
    attach_settled(&engine, &a, "data").await;

    engine
        .session_event(a.handle.id(), SessionEvent::Closed)
        .await
        .unwrap();

    wait_until("document discarded", || async {
        engine.list_documents().await.unwrap().is_empty()
    })
    .await;

    // Detach is idempotent: the connection tearing down afterwards is fine.
    engine.detach(a.handle.id()).await.unwrap();
}

#[tokio::test]
async fn test_engine_events_are_broadcast() {
    let engine = engine();
    let mut events = engine.subscribe();

    let a = MockSession::spawn(1, "/a/notes.txt", "", 0);
    attach_settled(&engine, &a, "").await;

    let first = events.recv().await.unwrap();
    assert!(matches!(first, EngineEvent::DocumentCreated { .. }));
    let second = events.recv().await.unwrap();
    assert!(matches!(
        second,
        EngineEvent::SessionAttached { session_id, .. } if session_id == a.handle.id()
    ));

    engine.detach(a.handle.id()).await.unwrap();
    let third = events.recv().await.unwrap();
    assert!(matches!(third, EngineEvent::SessionDetached { .. }));
    let fourth = events.recv().await.unwrap();
    assert!(matches!(fourth, EngineEvent::DocumentRemoved { .. }));
}

#[tokio::test]
async fn test_event_from_unattached_session_is_ignored() {
    let engine = engine();
    engine
        .session_event(
            SessionId::new(99),
            SessionEvent::Insert {
                offset: 0,
                text: "ghost".to_string(),
            },
        )
        .await
        .unwrap();

    assert!(engine.list_documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resync_reloads_buffer_from_document() {
    let engine = engine();
    let a = MockSession::spawn(1, "/a/notes.txt", "truth", 0);
    attach_settled(&engine, &a, "truth").await;

    // The editor re-read the file from disk; our copy stays authoritative.
    a.buffer.lock().await.clear();
    a.buffer.lock().await.extend_from_slice(b"disk version");
    engine
        .session_event(
            a.handle.id(),
            SessionEvent::FileOpened {
                path: "/a/notes.txt".to_string(),
            },
        )
        .await
        .unwrap();

    wait_until("buffer reloaded", || async { a.text().await == "truth" }).await;
}
