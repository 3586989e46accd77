//! Coordinator events: data model, ordered bus, and external channel.
//!
//! ## Contents
//! - [`EventKind`], [`EventTag`], [`Event`] event classification and payload
//! - [`Bus`] serialized dispatch table (one handler per tag, one dispatcher task)
//! - [`EventChannel`] broadcast point for observers outside the coordinator
//!
//! ## Quick reference
//! - **Publishers**: service controllers (state changes, faults, stops),
//!   the fault boundary, and collaborators via `Coordinator::send`.
//! - **Consumers**: the coordinator's router (the only bus handler), and
//!   external receivers of the [`EventChannel`].

mod bus;
mod channel;
mod event;

pub use bus::{Bus, Dispatcher, Handler, Subscription};
pub use channel::EventChannel;
pub use event::{Event, EventKind, EventTag};
