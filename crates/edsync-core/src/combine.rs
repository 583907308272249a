//! Reduction of a paired remove+insert to a minimal equivalent patch.
//!
//! Editors typically report a local change as "remove the whole changed
//! region" immediately followed by "insert the replacement region".
//! Rebroadcasting that verbatim would rewrite large ranges on every peer and
//! disturb peer cursors. [`combine`] compares the removed bytes against the
//! inserted text and emits at most one remove and one insert covering only
//! the span that actually changed.
//!
//! The scan is a single-pass greedy approximation of a diff: it is correct
//! for one localized edit and intentionally does not attempt minimum edit
//! distance over multiple disjoint changed regions.

use tracing::trace;

/// A primitive edit routed through the document.
///
/// Offsets are byte offsets into the document content at the time the edit
/// is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    Insert { offset: usize, bytes: Vec<u8> },
    Remove { offset: usize, length: usize },
}

impl EditOp {
    pub fn insert(offset: usize, bytes: impl Into<Vec<u8>>) -> Self {
        Self::Insert {
            offset,
            bytes: bytes.into(),
        }
    }

    pub fn remove(offset: usize, length: usize) -> Self {
        Self::Remove { offset, length }
    }
}

/// Result of a combine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combined {
    /// Primitive edits to apply, in order. At most one remove and one
    /// insert (plus the empty-line remove quirk, see below).
    pub ops: Vec<EditOp>,

    /// New value for the session's swallow-newline flag.
    ///
    /// `Some(true)` when the removed span ended in a line terminator but the
    /// inserted text does not: the session is expected to shortly emit a
    /// compensating bare-newline insert which must be swallowed, because
    /// peers already received an equivalent terminator. `None` when this
    /// combine took the append fast path and the flag keeps its previous
    /// value.
    pub swallow_newline: Option<bool>,
}

impl Combined {
    fn unchanged() -> Self {
        Self {
            ops: Vec::new(),
            swallow_newline: None,
        }
    }
}

/// Combines removed bytes `old` at `offset` with replacement text `new_text`.
///
/// The transport cannot express every edit directly, so two quirks are part
/// of the contract:
/// - the inserted text is scanned with a line terminator appended, and the
///   extra terminator is sent when the insertion would otherwise start
///   non-terminator text at column 0 of an empty line (which the transport
///   forbids) — that case also removes the empty line first;
/// - a remove whose changed span ends in a line terminator is shortened by
///   one byte, with the terminator accounted for by the swallow-newline
///   flag.
pub fn combine(offset: usize, old: &[u8], new_text: &str) -> Combined {
    let old_len = old.len();
    let insert_len = new_text.len();

    // Inserted bytes carry one extra terminator used by the empty-line case.
    let mut new_bytes = Vec::with_capacity(insert_len + 1);
    new_bytes.extend_from_slice(new_text.as_bytes());
    new_bytes.push(b'\n');

    // Append fast path: the old text survives as a prefix of the new text.
    if old_len > 0 && insert_len >= old_len && &new_bytes[..old_len] == old {
        if insert_len == old_len {
            return Combined::unchanged();
        }
        trace!(offset, appended = insert_len - old_len, "combine: append fast path");
        return Combined {
            ops: vec![EditOp::insert(
                offset + old_len,
                new_bytes[old_len..insert_len].to_vec(),
            )],
            swallow_newline: None,
        };
    }

    let removed_ends_nl = old.last() == Some(&b'\n');
    let inserted_ends_nl = insert_len > 0 && new_bytes[insert_len - 1] == b'\n';
    let swallow = removed_ends_nl && !inserted_ends_nl;

    // Single left-to-right scan: advance j through the new bytes on each
    // match, and mark the first contiguous run of mismatches as the cut.
    let mut last_same = 0usize;
    let mut j = 0usize;
    let mut in_cut = false;
    let mut cut_start = 0usize;
    let mut cut_end = 0usize;
    for (i, &b) in old.iter().enumerate() {
        if new_bytes.get(j) == Some(&b) {
            j += 1;
            if !in_cut {
                if cut_end == 0 {
                    last_same = j;
                }
            } else {
                // text has started matching again
                cut_end = i;
                in_cut = false;
            }
        } else if !in_cut {
            in_cut = true;
            if cut_end == 0 {
                cut_start = i;
            }
        }
    }
    if in_cut {
        cut_end = old_len;
    }

    let mut ops = Vec::new();

    if cut_end != 0 {
        // Drop the cut from the document. A terminator at the end of the cut
        // is not counted here; the swallow flag covers it.
        let trailing_nl = usize::from(old[cut_end - 1] == b'\n');
        ops.push(EditOp::remove(
            offset + cut_start,
            cut_end - cut_start - trailing_nl,
        ));
    }

    if j < insert_len {
        let mut end = insert_len;
        if last_same == 0 && new_bytes[0] != b'\n' {
            // The transport cannot insert non-terminator text at the start
            // of an empty line: delete the line and re-insert it terminated.
            ops.push(EditOp::remove(offset, 1));
            end += 1;
        }
        ops.push(EditOp::insert(
            offset + last_same,
            new_bytes[last_same..end].to_vec(),
        ));
    }

    trace!(
        offset,
        old_len,
        insert_len,
        ops = ops.len(),
        swallow,
        "combine: general path"
    );

    Combined {
        ops,
        swallow_newline: Some(swallow),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Applies ops to a buffer the way the document does (clamped splices),
    /// so tests can assert the combined edit reproduces the replacement.
    fn apply(content: &mut Vec<u8>, ops: &[EditOp]) {
        for op in ops {
            match op {
                EditOp::Insert { offset, bytes } => {
                    let at = (*offset).min(content.len());
                    content.splice(at..at, bytes.iter().copied());
                }
                EditOp::Remove { offset, length } => {
                    let at = (*offset).min(content.len());
                    let end = (at + length).min(content.len());
                    content.drain(at..end);
                }
            }
        }
    }

    #[test]
    fn test_append_fast_path() {
        let out = combine(5, b"foo", "foobar");
        assert_eq!(out.ops, vec![EditOp::insert(8, &b"bar"[..])]);
        assert_eq!(out.swallow_newline, None);
    }

    #[test]
    fn test_identical_text_emits_nothing() {
        let out = combine(5, b"foo", "foo");
        assert!(out.ops.is_empty());
        assert_eq!(out.swallow_newline, None);
    }

    #[test]
    fn test_single_span_replacement() {
        let out = combine(0, b"hello world", "hello earth");
        // One remove over the differing span, one insert of the replacement.
        let removes: Vec<_> = out
            .ops
            .iter()
            .filter(|op| matches!(op, EditOp::Remove { .. }))
            .collect();
        let inserts: Vec<_> = out
            .ops
            .iter()
            .filter(|op| matches!(op, EditOp::Insert { .. }))
            .collect();
        assert_eq!(removes.len(), 1);
        assert_eq!(inserts.len(), 1);

        let mut buf = b"hello world".to_vec();
        apply(&mut buf, &out.ops);
        assert_eq!(buf, b"hello earth");
    }

    #[test]
    fn test_interior_deletion() {
        // "abcdef" -> "abef": cut is "cd".
        let out = combine(10, b"abcdef", "abef");
        assert_eq!(out.ops, vec![EditOp::remove(12, 2)]);
        assert_eq!(out.swallow_newline, Some(false));

        let mut buf = b"abcdef".to_vec();
        let shifted: Vec<_> = out
            .ops
            .iter()
            .map(|op| match op {
                EditOp::Remove { offset, length } => EditOp::remove(offset - 10, *length),
                EditOp::Insert { offset, bytes } => EditOp::insert(offset - 10, bytes.clone()),
            })
            .collect();
        apply(&mut buf, &shifted);
        assert_eq!(buf, b"abef");
    }

    #[test]
    fn test_prefix_survives_suffix_replaced() {
        let out = combine(0, b"abc", "abxy");
        let mut buf = b"abc".to_vec();
        apply(&mut buf, &out.ops);
        assert_eq!(buf, b"abxy");
    }

    #[test]
    fn test_trailing_newline_sets_swallow_flag() {
        // Removed span ends with a terminator, replacement does not.
        let out = combine(0, b"ab\n", "abX");
        assert_eq!(out.swallow_newline, Some(true));
        // The cut is the lone terminator; its remove length is shortened to
        // zero (the document broadcasts it as length 1, a wire quirk).
        assert_eq!(
            out.ops,
            vec![EditOp::remove(2, 0), EditOp::insert(2, &b"X"[..])]
        );
    }

    #[test]
    fn test_no_swallow_when_both_end_with_newline() {
        let out = combine(0, b"ab\n", "ax\n");
        assert_eq!(out.swallow_newline, Some(false));
    }

    #[test]
    fn test_whole_line_replaced_on_empty_prefix() {
        // Nothing matches at the front and the insertion does not start
        // with a terminator: the empty line is deleted and the insertion is
        // re-terminated.
        let out = combine(4, b"abc", "xyz");
        assert_eq!(out.ops.len(), 3);
        assert_eq!(out.ops[1], EditOp::remove(4, 1));
        match &out.ops[2] {
            EditOp::Insert { offset, bytes } => {
                assert_eq!(*offset, 4);
                assert_eq!(bytes, b"xyz\n");
            }
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_replacement_is_plain_remove() {
        let out = combine(0, b"abc", "");
        assert_eq!(out.ops, vec![EditOp::remove(0, 3)]);
        // "" gains the appended terminator during the scan, so the removed
        // span "abc" (no trailing terminator) does not set the flag.
        assert_eq!(out.swallow_newline, Some(false));
    }

    #[test]
    fn test_empty_old_slice_inserts_fresh_line() {
        // A remove clamped to nothing still pairs with an insert; the whole
        // text lands via the empty-line path.
        let out = combine(0, b"", "hi");
        assert_eq!(
            out.ops,
            vec![EditOp::remove(0, 1), EditOp::insert(0, &b"hi\n"[..])]
        );
    }

    #[test]
    fn test_combined_patch_never_exceeds_verbatim() {
        // The emitted remove span is contained in the verbatim removed range.
        let old = b"the quick brown fox";
        let out = combine(0, old, "the slow brown fox");
        for op in &out.ops {
            if let EditOp::Remove { offset, length } = op {
                assert!(offset + length <= old.len());
            }
        }
    }
}
