//! # Router: the coordinator's single bus handler.
//!
//! Subscribed to every [`EventTag`](crate::EventTag) when the coordinator
//! starts. Runs on the dispatcher task, so routing decisions never race with
//! each other.
//!
//! ```text
//! ServiceEvent{state}        → wake barrier, forward to channel
//! ServiceFault / Stopped     → stopping && state ∈ {Stopped, Faulted} ? UnloadService
//!                              forward to channel
//! CreateDynamicService       → factory.get_unit(name, loader builder) → CreateService
//! ServiceSourceChanged       → registered   ? RestartService (deferred during startup)
//!                              unregistered ? dynamic creation with the default loader
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};

use super::factory::UnitFactory;
use super::lifecycle::{Lifecycle, LifecycleCell};
use super::registry::Registry;
use crate::error::{FactoryError, UnitError};
use crate::events::{Event, EventChannel, EventKind, Handler};
use crate::services::{Command, LoaderSet, LoaderSpec, ServiceState};

/// Holds restarts requested while the startup barrier is in flight.
#[derive(Default)]
pub(crate) struct StartupGate {
    deferred: Mutex<Option<Vec<Arc<str>>>>,
}

impl StartupGate {
    pub(crate) fn open(&self) {
        *self.lock() = Some(Vec::new());
    }

    /// Queues `name` if the gate is open; returns false otherwise.
    pub(crate) fn defer(&self, name: &Arc<str>) -> bool {
        match self.lock().as_mut() {
            Some(queue) => {
                if !queue.contains(name) {
                    queue.push(Arc::clone(name));
                }
                true
            }
            None => false,
        }
    }

    /// Closes the gate and returns the queued names.
    pub(crate) fn close(&self) -> Vec<Arc<str>> {
        self.lock().take().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Vec<Arc<str>>>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct Router {
    registry: Registry,
    factory: UnitFactory,
    loaders: LoaderSet,
    channel: EventChannel,
    lifecycle: LifecycleCell,
    wake: Arc<Notify>,
    gate: StartupGate,
    default_loader: Arc<str>,
}

impl Router {
    pub(crate) fn new(
        registry: Registry,
        factory: UnitFactory,
        loaders: LoaderSet,
        channel: EventChannel,
        lifecycle: LifecycleCell,
        wake: Arc<Notify>,
        default_loader: Arc<str>,
    ) -> Self {
        Self {
            registry,
            factory,
            loaders,
            channel,
            lifecycle,
            wake,
            gate: StartupGate::default(),
            default_loader,
        }
    }

    pub(crate) fn gate(&self) -> &StartupGate {
        &self.gate
    }

    /// Sends `command` to `name`'s unit; a gone unit is not an error here.
    pub(crate) async fn command(&self, name: &str, command: Command) {
        let Some(unit) = self.registry.unit(name) else {
            warn!(service = name, %command, "no unit registered");
            return;
        };
        match unit.send(command).await {
            Ok(()) => {}
            Err(UnitError::Closed) => trace!(service = name, %command, "unit already exited"),
            Err(UnitError::Full) => warn!(service = name, %command, "unit inbox full"),
        }
    }

    async fn on_fault_or_stop(&self, event: &Event) {
        if self.lifecycle.get() != Lifecycle::Stopping {
            return;
        }
        match self.registry.state_of(&event.service) {
            Some(ServiceState::Stopped | ServiceState::Faulted) => {
                self.command(&event.service, Command::UnloadService).await;
            }
            _ => {}
        }
    }

    async fn create_dynamic(&self, name: &Arc<str>, loader: LoaderSpec) {
        if self.lifecycle.get() == Lifecycle::Stopping {
            warn!(service = %name, "coordinator stopping; dynamic creation ignored");
            return;
        }
        info!(service = %name, kind = %loader.kind, "creating dynamic service");
        let builder = self.loaders.builder_for(loader);
        match self.factory.get_unit(Arc::clone(name), builder) {
            Ok(unit) => {
                if let Err(err) = unit.send(Command::CreateService).await {
                    warn!(service = %name, error = %err, "dynamic unit rejected create");
                }
                // stop() may have collected its units before this one was registered.
                if self.lifecycle.get() == Lifecycle::Stopping {
                    self.command(name, Command::StopService).await;
                }
            }
            Err(FactoryError::Duplicate { .. }) => {
                warn!(service = %name, "service already registered; dynamic creation ignored");
            }
        }
    }

    async fn source_changed(&self, name: &Arc<str>) {
        if !self.registry.contains(name) {
            let loader = LoaderSpec::new(Arc::clone(&self.default_loader));
            self.create_dynamic(name, loader).await;
            return;
        }
        if self.lifecycle.get() == Lifecycle::Stopping {
            debug!(service = %name, "coordinator stopping; restart ignored");
            return;
        }
        if self.gate.defer(name) {
            debug!(service = %name, "restart deferred until startup completes");
            return;
        }
        self.command(name, Command::RestartService).await;
    }
}

#[async_trait]
impl Handler for Router {
    async fn handle(&self, event: &Event) {
        match &event.kind {
            EventKind::ServiceEvent { .. } => {
                self.wake.notify_one();
                self.channel.publish(event.clone());
            }
            EventKind::ServiceFault { .. } | EventKind::ServiceStopped => {
                self.wake.notify_one();
                self.on_fault_or_stop(event).await;
                self.channel.publish(event.clone());
            }
            EventKind::CreateDynamicService { loader } => {
                self.create_dynamic(&event.service, loader.clone()).await;
            }
            EventKind::ServiceSourceChanged => self.source_changed(&event.service).await,
        }
    }

    fn name(&self) -> &'static str {
        "router"
    }
}
