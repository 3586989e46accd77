use std::sync::Arc;

use tracing::trace;

use super::lifecycle::{Lifecycle, LifecycleCell};
use super::registry::Registry;
use crate::error::CoordinatorError;
use crate::events::{Bus, Event};
use crate::services::ServiceState;

/// Cheap, cloneable handle to a coordinator.
///
/// Handed to every service through its [`ServiceContext`](crate::ServiceContext)
/// so services can publish requests and read other services' states without
/// keeping the coordinator alive.
#[derive(Clone)]
pub struct CoordinatorHandle {
    bus: Bus,
    registry: Registry,
    lifecycle: LifecycleCell,
}

impl CoordinatorHandle {
    pub(crate) fn new(bus: Bus, registry: Registry, lifecycle: LifecycleCell) -> Self {
        Self {
            bus,
            registry,
            lifecycle,
        }
    }

    /// Publishes `event` on the coordinator's bus.
    ///
    /// Only valid while the coordinator is started or stopping.
    pub fn send(&self, event: Event) -> Result<(), CoordinatorError> {
        let lifecycle = self.lifecycle.get();
        if !lifecycle.accepts_requests() {
            return Err(CoordinatorError::configuration(format!(
                "cannot send '{}' for '{}' while coordinator is {lifecycle}",
                event.tag(),
                event.service
            )));
        }
        trace!(tag = %event.tag(), service = %event.service, "request sent");
        self.bus.publish(event);
        Ok(())
    }

    /// Current state of `name`, if registered.
    pub fn state_of(&self, name: &str) -> Option<ServiceState> {
        self.registry.state_of(name)
    }

    /// Every registered service with its current state, sorted by name.
    pub fn services(&self) -> Vec<(Arc<str>, ServiceState)> {
        self.registry.snapshot()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.get()
    }
}
