//! The document synchronization engine.
//!
//! Follows the actor pattern: [`spawn_engine`] starts a task that owns all
//! documents and pairing state, and [`EngineHandle`] is the cloneable front
//! door. Commands are processed strictly one at a time, so a document's
//! content, its session list, and the pairing state always change together
//! or not at all.
//!
//! ```text
//! connections ──EngineCommand──▶ ┌─────────────┐ ──SessionCommand──▶ sessions
//! timers      ──PairingExpired─▶ │ EngineActor │
//! seed tasks  ──SeedDocument──▶  └─────────────┘ ──EngineEvent────▶ observers
//! ```

mod actor;
mod commands;
mod document;
mod handle;

pub use commands::{DocumentSnapshot, EngineError, EngineEvent};
pub use handle::EngineHandle;

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use actor::EngineActor;

/// Capacity of the engine's command channel.
const COMMAND_BUFFER: usize = 1024;

/// Capacity of the engine's event broadcast channel.
const EVENT_BUFFER: usize = 256;

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a remove is held back waiting for its matching insert.
    pub pairing_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pairing_window: Duration::from_millis(200),
        }
    }
}

/// Spawns the engine actor and returns a handle to it.
///
/// The actor holds the sender side of its own channel so expiry and seed
/// tasks can always re-enter; it runs for the life of the process.
pub fn spawn_engine(config: EngineConfig) -> EngineHandle {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = EngineActor::new(rx, tx.clone(), event_tx.clone(), config.pairing_window);
    tokio::spawn(actor.run());

    EngineHandle::new(tx, event_tx)
}
