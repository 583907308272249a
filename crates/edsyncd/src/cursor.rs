//! Cursor preservation around full-content writes.
//!
//! Rewriting a session's whole buffer (initial push, reload) would otherwise
//! leave its cursor wherever the write ended. [`CursorGuard`] captures the
//! cursor's byte offset before the write and restores it after, best-effort:
//! a session that cannot answer the cursor query simply gets no restore, and
//! the write proceeds regardless.

use std::future::Future;

use tracing::debug;

use crate::session::SessionHandle;

/// Captured cursor state for one session.
pub struct CursorGuard {
    offset: Option<usize>,
}

impl CursorGuard {
    /// Captures the session's cursor offset.
    ///
    /// Failure to capture is not an error; the guard just becomes a no-op.
    pub async fn capture(session: &SessionHandle) -> Self {
        match session.get_cursor().await {
            Ok(pos) => Self {
                offset: Some(pos.offset),
            },
            Err(e) => {
                debug!(session = %session.id(), error = %e, "Could not capture cursor");
                Self { offset: None }
            }
        }
    }

    /// Restores the captured cursor offset, if any.
    pub async fn restore(&self, session: &SessionHandle) {
        if let Some(offset) = self.offset {
            if let Err(e) = session.set_cursor(offset).await {
                debug!(session = %session.id(), error = %e, "Could not restore cursor");
            }
        }
    }

    /// Runs `body` with the session's cursor captured before and restored
    /// after. The restore runs only once `body`'s future has fully resolved,
    /// so every write inside the scope lands before the cursor moves back.
    pub async fn scoped<T, F, Fut>(session: &SessionHandle, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = Self::capture(session).await;
        let result = body().await;
        guard.restore(session).await;
        result
    }
}
