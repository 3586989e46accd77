//! # External event channel.
//!
//! [`EventChannel`] is a thin wrapper around [`tokio::sync::broadcast`] that lets
//! observers outside the coordinator (a host console, a log sink, a supervising
//! process) follow faults, stops and forwarded lifecycle events.
//!
//! ## Architecture
//! ```text
//! Bus dispatcher ──► Router ──► EventChannel ──► receiver #1 (user)
//!                                   ▲       ├──► receiver #2 (user)
//! Bus (no handler for              │       └──► subscriber listener ──► SubscriberSet
//!  fault/stop kinds) ──────────────┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Bounded capacity**: one ring buffer shared by all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no receivers at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for observers outside the coordinator.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct EventChannel {
    tx: broadcast::Sender<Event>,
}

impl EventChannel {
    /// Creates a new channel with the given capacity (clamped to a minimum of 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers.
    ///
    /// If there are no receivers the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver that observes events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
