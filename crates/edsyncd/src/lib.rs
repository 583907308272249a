//! edsync daemon library.
//!
//! Keeps any number of editor buffers open on the same named document in
//! sync. Adapters connect over a Unix socket, one session per connection;
//! the engine actor owns every document and routes each edit to the other
//! sessions, combining remove/insert pairs into minimal diffs along the way.
//!
//! Modules:
//! - [`engine`]: the single-mutator sync engine actor
//! - [`server`]: Unix socket server and per-connection handlers
//! - [`session`]: command channel between engine and one connected buffer
//! - [`cursor`]: cursor preservation around full-buffer rewrites
//! - [`config`]: daemon configuration

pub mod config;
pub mod cursor;
pub mod engine;
pub mod server;
pub mod session;
