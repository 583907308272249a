//! Per-session remove/insert pairing state machine.
//!
//! A session reporting a local change usually emits a remove for the whole
//! changed region immediately followed by an insert of the replacement. The
//! [`EditCombiner`] holds the remove back for one pairing window; when the
//! matching insert arrives the pair is reduced by [`combine`](crate::combine)
//! instead of being broadcast verbatim. Every anomaly (late insert, offset
//! mismatch, window expiry) degrades to the verbatim edit, never to an error:
//! correctness on the peers is prioritized over diff minimality.
//!
//! The combiner is pure: timers are expressed as [`TimerOp`] directives for
//! the caller to schedule and cancel, and expiry re-enters through
//! [`EditCombiner::on_pairing_expired`] carrying the pending id. A stale id
//! is ignored, which makes "cancelled exactly once" hold even when an expiry
//! races a matching insert.

use crate::combine::{combine, EditOp};
use tracing::debug;

/// Identifier for one pairing attempt, unique per combiner.
pub type PendingId = u64;

/// A remove event held back while waiting for its matching insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRemoval {
    pub offset: usize,
    pub length: usize,
    pub id: PendingId,
}

/// Timer directive for the caller driving this combiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOp {
    /// Start the pairing-window timer for this pending id.
    Start(PendingId),
    /// Cancel the timer for this pending id; it must not fire.
    Cancel(PendingId),
}

/// Result of feeding one event into the combiner.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StepOutput {
    /// Edits to route through the document, in order.
    pub ops: Vec<EditOp>,
    /// Timers to cancel and start, in order.
    pub timers: Vec<TimerOp>,
}

/// Pairing state for one session attached to one document.
#[derive(Debug, Default)]
pub struct EditCombiner {
    pending: Option<PendingRemoval>,
    swallow_newline: bool,
    next_pending_id: PendingId,
}

impl EditCombiner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a remove event from the session.
    ///
    /// A zero-length remove (a cursor-neutral marker some sessions emit) is
    /// applied immediately; any other remove is held back for pairing.
    pub fn on_remove(&mut self, offset: usize, length: usize) -> StepOutput {
        let mut out = StepOutput::default();

        // A newer remove makes any pending pairing stale: resolve it
        // verbatim before tracking the new one.
        if let Some(stale) = self.pending.take() {
            out.timers.push(TimerOp::Cancel(stale.id));
            out.ops.push(EditOp::remove(stale.offset, stale.length));
        }

        if length == 0 {
            out.ops.push(EditOp::remove(offset, 0));
            return out;
        }

        let id = self.next_pending_id;
        self.next_pending_id += 1;
        self.pending = Some(PendingRemoval { offset, length, id });
        out.timers.push(TimerOp::Start(id));
        out
    }

    /// Feeds an insert event from the session.
    ///
    /// `content` is the document content as it stands right now — the held
    /// remove has not been applied, so the removed bytes are still in place
    /// and can be sliced out for the combine.
    pub fn on_insert(&mut self, offset: usize, text: &str, content: &[u8]) -> StepOutput {
        let mut out = StepOutput::default();

        if let Some(pending) = self.pending.take() {
            out.timers.push(TimerOp::Cancel(pending.id));

            if pending.offset == offset {
                let start = pending.offset.min(content.len());
                let end = (pending.offset + pending.length).min(content.len());
                let combined = combine(offset, &content[start..end], text);
                out.ops.extend(combined.ops);
                if let Some(swallow) = combined.swallow_newline {
                    self.swallow_newline = swallow;
                }
                return out;
            }

            // Offsets differ, so this insert cannot belong to the pending
            // remove (a later insert's offsets would already be off).
            // Resolve verbatim and treat the insert independently.
            debug!(
                pending_offset = pending.offset,
                insert_offset = offset,
                "unpaired insert, resolving pending remove verbatim"
            );
            out.ops.push(EditOp::remove(pending.offset, pending.length));
        }

        if self.swallow_newline && text == "\n" {
            // The compensating terminator a combine already accounted for.
            self.swallow_newline = false;
            return out;
        }

        out.ops.push(EditOp::insert(offset, text.as_bytes().to_vec()));
        out
    }

    /// Pairing-window expiry for `id`.
    ///
    /// Expiry is the defined fallback, not an error: the held remove is
    /// applied verbatim. A stale id (pairing already resolved) is a no-op.
    pub fn on_pairing_expired(&mut self, id: PendingId) -> StepOutput {
        let mut out = StepOutput::default();
        match self.pending.take() {
            Some(pending) if pending.id == id => {
                out.ops.push(EditOp::remove(pending.offset, pending.length));
            }
            other => {
                self.pending = other;
            }
        }
        out
    }

    /// Drops any pending pairing without emitting its remove.
    ///
    /// Used on detach; returns the id whose timer must be cancelled.
    pub fn cancel(&mut self) -> Option<PendingId> {
        self.pending.take().map(|p| p.id)
    }

    pub fn pending(&self) -> Option<&PendingRemoval> {
        self.pending.as_ref()
    }
}
