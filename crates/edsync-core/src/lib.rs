//! edsync core - document synchronization domain logic
//!
//! This crate provides the pure, I/O-free parts of edsync shared between
//! the daemon (edsyncd) and the wire protocol crate:
//! - type-safe identifiers for sessions and documents
//! - the combine algorithm reducing a paired remove+insert to a minimal patch
//! - the per-session remove/insert pairing state machine
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or unchecked indexing in
//! production paths.

pub mod combine;
pub mod combiner;
pub mod ids;

// Re-exports for convenience
pub use combine::{combine, Combined, EditOp};
pub use combiner::{EditCombiner, PendingId, PendingRemoval, StepOutput, TimerOp};
pub use ids::{DocumentId, DocumentName, SessionId};
