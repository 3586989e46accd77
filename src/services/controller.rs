//! # ServiceController: lifecycle state machine of one service.
//!
//! The controller validates every command against the transition table of
//! [`ServiceState`], drives the [`Service`](super::Service) instance, and reports
//! every visible change on the bus.
//!
//! ## Command handling
//! ```text
//! CreateService  (Created)                 build ─► Starting ─► start() ─► Running
//! StopService    (Running)                 Stopping ─► stop() ─► Stopped + ServiceStopped
//! UnloadService  (Stopped | Faulted)       drop instance ─► Completed
//! RestartService (Running|Faulted|Stopped) [stop path if Running] ─► Created ─► create path
//!
//! builder / start / stop error  ─► Faulted + ServiceFault(cause)
//! command invalid from state    ─► ServiceFault(invalid transition), state unchanged
//! ```
//!
//! ## Rules
//! - Only the owning unit calls into the controller.
//! - Every state change publishes `ServiceEvent{state}`; `Faulted` also publishes `ServiceFault`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::command::Command;
use super::context::ServiceContext;
use super::service::{ServiceBuilder, ServiceRef};
use super::state::{ControllerView, ServiceState, StateCell};
use super::unit::UnitHandle;
use crate::core::CoordinatorHandle;
use crate::error::ServiceError;
use crate::events::{Bus, Event};

/// Live service instance with the context it was created with.
struct Instance {
    service: ServiceRef,
    ctx: ServiceContext,
}

/// Finite-state machine tracking one service's lifecycle.
pub struct ServiceController {
    name: Arc<str>,
    state: StateCell,
    builder: ServiceBuilder,
    inbox: UnitHandle,
    coordinator: CoordinatorHandle,
    bus: Bus,
    instance: Option<Instance>,
}

impl ServiceController {
    pub(crate) fn new(
        name: Arc<str>,
        builder: ServiceBuilder,
        inbox: UnitHandle,
        coordinator: CoordinatorHandle,
        bus: Bus,
    ) -> Self {
        Self {
            name,
            state: StateCell::new(),
            builder,
            inbox,
            coordinator,
            bus,
            instance: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    #[inline]
    pub fn current_state(&self) -> ServiceState {
        self.state.get()
    }

    /// Read-only view sharing this controller's state cell.
    pub fn view(&self) -> ControllerView {
        ControllerView::new(Arc::clone(&self.name), self.state.clone())
    }

    /// Processes one command.
    ///
    /// Invalid commands are reported as faults without changing state; any other
    /// error faults the service.
    pub async fn handle(&mut self, command: Command) {
        debug!(service = %self.name, %command, state = %self.current_state(), "handling command");

        let result = match command {
            Command::CreateService => self.create().await,
            Command::StopService => self.stop().await,
            Command::UnloadService => self.unload(),
            Command::RestartService => self.restart().await,
        };

        match result {
            Ok(()) => {}
            Err(err) if err.is_invalid_transition() => {
                warn!(service = %self.name, %command, error = %err, "command rejected");
                self.bus.publish(Event::fault_from(self.name_arc(), &err));
            }
            Err(err) => self.fail(err),
        }
    }

    /// Moves the service to `Faulted` (when possible) and publishes the fault.
    pub(crate) fn fail(&mut self, err: ServiceError) {
        warn!(service = %self.name, error = %err, "service faulted");
        self.release();
        if self.current_state().can_transition_to(ServiceState::Faulted) {
            self.set_state(ServiceState::Faulted);
        }
        self.bus.publish(Event::fault_from(self.name_arc(), &err));
    }

    /// Drops the live instance and cancels its context.
    pub(crate) fn release(&mut self) {
        if let Some(instance) = self.instance.take() {
            instance.ctx.token().cancel();
        }
    }

    async fn create(&mut self) -> Result<(), ServiceError> {
        self.require(Command::CreateService, &[ServiceState::Created])?;

        let ctx = ServiceContext::new(
            self.name_arc(),
            self.inbox.clone(),
            self.coordinator.clone(),
            CancellationToken::new(),
        );
        let service = (self.builder)(&ctx)?;

        self.transition(ServiceState::Starting)?;
        self.instance = Some(Instance {
            service: Arc::clone(&service),
            ctx: ctx.clone(),
        });
        service.start(&ctx).await?;
        self.transition(ServiceState::Running)?;

        info!(service = %self.name, "service running");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ServiceError> {
        self.require(Command::StopService, &[ServiceState::Running])?;
        self.transition(ServiceState::Stopping)?;

        if let Some(instance) = &self.instance {
            instance.service.stop(&instance.ctx).await?;
        }
        self.release();
        self.transition(ServiceState::Stopped)?;
        self.bus.publish(Event::stopped(self.name_arc()));

        info!(service = %self.name, "service stopped");
        Ok(())
    }

    fn unload(&mut self) -> Result<(), ServiceError> {
        self.require(
            Command::UnloadService,
            &[ServiceState::Stopped, ServiceState::Faulted],
        )?;
        self.release();
        self.transition(ServiceState::Completed)
    }

    async fn restart(&mut self) -> Result<(), ServiceError> {
        self.require(
            Command::RestartService,
            &[
                ServiceState::Running,
                ServiceState::Faulted,
                ServiceState::Stopped,
            ],
        )?;
        info!(service = %self.name, from = %self.current_state(), "restarting service");

        if self.current_state() == ServiceState::Running {
            self.stop().await?;
        }
        self.transition(ServiceState::Created)?;
        self.create().await
    }

    /// Rejects `command` unless the controller is in one of `allowed`.
    fn require(&self, command: Command, allowed: &[ServiceState]) -> Result<(), ServiceError> {
        let from = self.current_state();
        if allowed.contains(&from) {
            Ok(())
        } else {
            Err(ServiceError::InvalidTransition {
                service: self.name.to_string(),
                from,
                attempted: command.as_str(),
            })
        }
    }

    fn transition(&self, next: ServiceState) -> Result<(), ServiceError> {
        let from = self.current_state();
        if !from.can_transition_to(next) {
            return Err(ServiceError::InvalidTransition {
                service: self.name.to_string(),
                from,
                attempted: next.as_str(),
            });
        }
        self.set_state(next);
        Ok(())
    }

    fn set_state(&self, next: ServiceState) {
        self.state.set(next);
        debug!(service = %self.name, state = %next, "state changed");
        self.bus.publish(Event::state_changed(self.name_arc(), next));
    }
}
