//! # UnitFactory: creates and registers service units.
//!
//! ```text
//! get_unit(name, builder)
//!   ├─► allocate state cell + bounded inbox
//!   ├─► registry.register(name → view, name → handle)   (Duplicate → Err, nothing spawned)
//!   ├─► runtime.spawn(unit.run(child token))
//!   └─► runtime.spawn(watch join handle)                 (panic past the boundary → ServiceFault)
//! ```
//!
//! The builder itself runs later, inside the unit, when it processes
//! `CreateService`; the caller only pays for the spawn.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::fault::FaultBoundary;
use super::handle::CoordinatorHandle;
use super::registry::Registry;
use crate::error::FactoryError;
use crate::events::{Bus, Event};
use crate::services::{ServiceBuilder, ServiceController, ServiceUnit, UnitHandle};

#[derive(Clone)]
pub(crate) struct UnitFactory {
    registry: Registry,
    bus: Bus,
    coordinator: CoordinatorHandle,
    runtime: Handle,
    token: CancellationToken,
    inbox_capacity: usize,
    boundary: FaultBoundary,
}

impl UnitFactory {
    pub(crate) fn new(
        registry: Registry,
        bus: Bus,
        coordinator: CoordinatorHandle,
        runtime: Handle,
        token: CancellationToken,
        inbox_capacity: usize,
    ) -> Self {
        Self {
            registry,
            bus,
            coordinator,
            runtime,
            token,
            inbox_capacity: inbox_capacity.max(1),
            boundary: FaultBoundary,
        }
    }

    /// Registers a unit for `name` and spawns it.
    ///
    /// The unit is registered before it can process its first command.
    pub(crate) fn get_unit(
        &self,
        name: Arc<str>,
        builder: ServiceBuilder,
    ) -> Result<UnitHandle, FactoryError> {
        if self.registry.contains(&name) {
            return Err(FactoryError::Duplicate {
                service: name.to_string(),
            });
        }

        let (tx, rx) = mpsc::channel(self.inbox_capacity);
        let handle = UnitHandle::new(Arc::clone(&name), tx);
        let controller = ServiceController::new(
            Arc::clone(&name),
            builder,
            handle.clone(),
            self.coordinator.clone(),
            self.bus.clone(),
        );
        self.registry
            .register(Arc::clone(&name), controller.view(), handle.clone())?;

        let unit = ServiceUnit::new(controller, rx, self.boundary);
        let join = self.runtime.spawn(unit.run(self.token.child_token()));

        let bus = self.bus.clone();
        let boundary = self.boundary;
        let watched = Arc::clone(&name);
        self.runtime.spawn(async move {
            if let Err(err) = join.await {
                if err.is_panic() {
                    let fault = boundary.capture(Some(&*watched), err.into_panic().as_ref());
                    bus.publish(Event::fault_from(watched, &fault));
                }
            }
        });

        debug!(service = %name, "unit spawned");
        Ok(handle)
    }
}
