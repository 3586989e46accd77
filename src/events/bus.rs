//! # Ordered event bus.
//!
//! [`Bus`] is a dispatch table keyed by [`EventTag`] in front of a single
//! unbounded queue. One [`Dispatcher`] task drains the queue and awaits each
//! handler before taking the next event, so all handlers of one coordinator run
//! one at a time, in publish order, no matter how many units publish concurrently.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                      Dispatcher (one task):
//!   Unit 1 ──┐                              loop {
//!   Unit 2 ──┼──► Bus::publish ──► [queue] ──► table[tag].handle(&ev).await
//!   send() ──┘        │                     }
//!                     └── no handler for tag:
//!                           ├─ fault / stop ──► EventChannel (fallback)
//!                           └─ otherwise    ──► dropped (no-op)
//! ```
//!
//! ## Rules
//! - **Exactly one handler per tag**: a second `subscribe` for the same tag is rejected.
//! - **Serialized delivery**: handlers never run concurrently with each other.
//! - **Non-blocking publish**: `publish()` only enqueues.
//! - **Panic isolation**: a panicking handler is logged; the dispatcher keeps running.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

use super::channel::EventChannel;
use super::event::{Event, EventTag};
use crate::core::fault::panic_message;
use crate::error::BusError;

/// Handler invoked by the dispatcher for every event of its subscribed tag.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handles a single event. Runs on the dispatcher task; never concurrently
    /// with any other handler of the same bus.
    async fn handle(&self, event: &Event);

    /// Returns the handler name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

type Table = Arc<RwLock<HashMap<EventTag, Arc<dyn Handler>>>>;

/// Serialized publish/subscribe channel of one coordinator.
///
/// Cheap to clone; every clone publishes into the same queue.
#[derive(Clone)]
pub struct Bus {
    tx: mpsc::UnboundedSender<Event>,
    table: Table,
    fallback: Option<EventChannel>,
}

impl Bus {
    /// Creates a bus and the dispatcher that must be spawned to drain it.
    ///
    /// `fallback` receives fault/stop events for which no handler is subscribed.
    pub fn new(fallback: Option<EventChannel>) -> (Self, Dispatcher) {
        let (tx, rx) = mpsc::unbounded_channel();
        let table: Table = Arc::new(RwLock::new(HashMap::new()));
        let dispatcher = Dispatcher {
            rx,
            table: Arc::clone(&table),
            fallback: fallback.clone(),
        };
        (
            Self {
                tx,
                table,
                fallback,
            },
            dispatcher,
        )
    }

    /// Registers `handler` for `tag`.
    pub fn subscribe(&self, tag: EventTag, handler: Arc<dyn Handler>) -> Result<(), BusError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if table.contains_key(&tag) {
            return Err(BusError::AlreadySubscribed { tag });
        }
        table.insert(tag, handler);
        Ok(())
    }

    /// Registers `handler` for every tag in `tags` at once.
    ///
    /// Either all tags are registered or none (on conflict nothing changes).
    /// The returned [`Subscription`] releases them.
    pub fn subscribe_all(
        &self,
        tags: &[EventTag],
        handler: Arc<dyn Handler>,
    ) -> Result<Subscription, BusError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(tag) = tags.iter().find(|t| table.contains_key(t)) {
            return Err(BusError::AlreadySubscribed { tag: *tag });
        }
        for tag in tags {
            table.insert(*tag, Arc::clone(&handler));
        }
        Ok(Subscription {
            table: Arc::clone(&self.table),
            tags: tags.to_vec(),
            released: AtomicBool::new(false),
        })
    }

    /// Enqueues an event for serialized delivery.
    ///
    /// Events without a subscribed handler are dropped, except fault/stop
    /// events which go straight to the fallback channel.
    pub fn publish(&self, ev: Event) {
        if self.is_subscribed(ev.tag()) {
            if let Err(mpsc::error::SendError(ev)) = self.tx.send(ev) {
                trace!(tag = %ev.tag(), service = %ev.service, "bus closed; event dropped");
            }
            return;
        }
        fall_through(self.fallback.as_ref(), ev);
    }

    /// True if a handler is registered for `tag`.
    pub fn is_subscribed(&self, tag: EventTag) -> bool {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&tag)
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.table.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Delivers an unhandled event to the fallback channel when its kind is always observed.
fn fall_through(fallback: Option<&EventChannel>, ev: Event) {
    match fallback {
        Some(ch) if ev.tag().always_observed() => ch.publish(ev),
        _ => trace!(tag = %ev.tag(), service = %ev.service, "no handler; event dropped"),
    }
}

/// Drains the bus queue on a single task, invoking handlers in publish order.
pub struct Dispatcher {
    rx: mpsc::UnboundedReceiver<Event>,
    table: Table,
    fallback: Option<EventChannel>,
}

impl Dispatcher {
    /// Runs until `token` is cancelled or every [`Bus`] clone is dropped.
    pub async fn run(mut self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = self.rx.recv() => match msg {
                    Some(ev) => self.dispatch(ev).await,
                    None => break,
                }
            }
        }
        trace!("bus dispatcher exited");
    }

    async fn dispatch(&self, ev: Event) {
        let handler = self
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ev.tag())
            .cloned();

        let Some(handler) = handler else {
            fall_through(self.fallback.as_ref(), ev);
            return;
        };

        let fut = handler.handle(&ev);
        if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
            error!(
                handler = handler.name(),
                tag = %ev.tag(),
                service = %ev.service,
                "bus handler panicked: {}",
                panic_message(panic.as_ref())
            );
        }
    }
}

/// Group of handler registrations released together, exactly once.
///
/// Dropping the guard releases it as well.
pub struct Subscription {
    table: Table,
    tags: Vec<EventTag>,
    released: AtomicBool,
}

impl Subscription {
    /// Removes the registered handlers.
    ///
    /// Returns `true` only for the call that actually released them.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        for tag in &self.tags {
            table.remove(tag);
        }
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
