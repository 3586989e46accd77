//! # Coordinator: startup/shutdown barriers over a dynamic set of service units.
//!
//! The [`Coordinator`] owns the bus, the registry, the unit factory and the
//! router. Services are declared with [`create_service`](Coordinator::create_service),
//! brought up together by [`start`](Coordinator::start) and torn down together
//! by [`stop`](Coordinator::stop). In between, collaborators talk to it only
//! through [`send`](Coordinator::send).
//!
//! ## High-level architecture
//! ```text
//! start():
//!   NotStarted ─► Starting   (stop() rejected until start returns)
//!   ├─► take declared services
//!   ├─► bus.subscribe_all(router); spawn dispatcher; spawn subscriber listener
//!   ├─► before_start hook
//!   ├─► open startup gate (defers restarts)
//!   ├─► for each declared service: factory.get_unit() ─► CreateService
//!   ├─► barrier: all Running ─► ok | any Faulted ─► StartupFault | deadline ─► StartupTimeout
//!   ├─► close gate; flush deferred restarts (success only)
//!   ├─► Starting ─► Started  (on every exit path)
//!   └─► after_start hook
//!
//! stop():
//!   Started ─► Stopping
//!   ├─► StopService to every unit
//!   │     router: ServiceStopped / ServiceFault with state ∈ {Stopped, Faulted} ─► UnloadService
//!   ├─► barrier: all Completed ─► ok | deadline ─► ShutdownTimeout (logs each stuck service)
//!   └─► after_stop hook (success only)
//!
//! dispose():  (once; also on drop)
//!   release bus subscription ─► cancel dispatcher, listener and units ─► clear registry
//! ```
//!
//! ## Example
//! ```rust
//! use servisor::{
//!     CoordinatorBuilder, CoordinatorConfig, ServiceContext, ServiceError, ServiceFn, ServiceState,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = CoordinatorBuilder::new(CoordinatorConfig::default()).build()?;
//!
//!     coordinator.create_service("clock", |_ctx: &ServiceContext| {
//!         Ok(ServiceFn::arc(|ctx: ServiceContext| async move {
//!             let token = ctx.token().clone();
//!             tokio::spawn(async move { token.cancelled().await });
//!             Ok::<_, ServiceError>(())
//!         }))
//!     })?;
//!
//!     coordinator.start().await?;
//!     assert_eq!(coordinator.state_of("clock"), Some(ServiceState::Running));
//!
//!     coordinator.stop().await?;
//!     assert_eq!(coordinator.state_of("clock"), Some(ServiceState::Completed));
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{Notify, broadcast};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::barrier::{self, BarrierError};
use super::builder::{HookStage, Hooks};
use super::config::CoordinatorConfig;
use super::factory::UnitFactory;
use super::handle::CoordinatorHandle;
use super::lifecycle::{Lifecycle, LifecycleCell};
use super::registry::Registry;
use super::router::Router;
use crate::error::{CoordinatorError, ServiceError, UnitError};
use crate::events::{Bus, Dispatcher, Event, EventChannel, EventTag, Handler, Subscription};
use crate::services::{Command, LoaderSet, ServiceBuilder, ServiceContext, ServiceRef, ServiceState};
use crate::subscribers::{Subscribe, SubscriberSet};

type Declared = Vec<(Arc<str>, ServiceBuilder)>;

/// Lifecycle coordinator of a set of named services.
pub struct Coordinator {
    cfg: CoordinatorConfig,
    runtime: Handle,
    hooks: Hooks,

    bus: Bus,
    channel: EventChannel,
    registry: Registry,
    lifecycle: LifecycleCell,
    handle: CoordinatorHandle,
    factory: UnitFactory,
    router: Arc<Router>,
    wake: Arc<Notify>,
    token: CancellationToken,

    /// Services declared before `start`; `None` once `start` was called.
    declared: Mutex<Option<Declared>>,
    dispatcher: Mutex<Option<Dispatcher>>,
    subscribers: Mutex<Vec<Arc<dyn Subscribe>>>,
    subscription: Mutex<Option<Subscription>>,
    disposed: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Coordinator {
    pub(crate) fn new_internal(
        cfg: CoordinatorConfig,
        runtime: Handle,
        hooks: Hooks,
        loaders: LoaderSet,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        let channel = EventChannel::new(cfg.channel_capacity_clamped());
        let (bus, dispatcher) = Bus::new(Some(channel.clone()));
        let registry = Registry::new();
        let lifecycle = LifecycleCell::new();
        let handle = CoordinatorHandle::new(bus.clone(), registry.clone(), lifecycle.clone());
        let token = CancellationToken::new();
        let wake = Arc::new(Notify::new());

        let factory = UnitFactory::new(
            registry.clone(),
            bus.clone(),
            handle.clone(),
            runtime.clone(),
            token.clone(),
            cfg.inbox_capacity_clamped(),
        );
        let router = Arc::new(Router::new(
            registry.clone(),
            factory.clone(),
            loaders,
            channel.clone(),
            lifecycle.clone(),
            Arc::clone(&wake),
            Arc::clone(&cfg.default_loader),
        ));

        Self {
            cfg,
            runtime,
            hooks,
            bus,
            channel,
            registry,
            lifecycle,
            handle,
            factory,
            router,
            wake,
            token,
            declared: Mutex::new(Some(Vec::new())),
            dispatcher: Mutex::new(Some(dispatcher)),
            subscribers: Mutex::new(subscribers),
            subscription: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Declares a service that `start` will bring up.
    ///
    /// Only valid before `start`; later services are created with a
    /// `CreateDynamicService` request.
    pub fn create_service<F>(
        &self,
        name: impl Into<Arc<str>>,
        builder: F,
    ) -> Result<(), CoordinatorError>
    where
        F: Fn(&ServiceContext) -> Result<ServiceRef, ServiceError> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut declared = lock(&self.declared);
        let Some(declared) = declared.as_mut() else {
            return Err(CoordinatorError::configuration(format!(
                "cannot declare '{name}' after start was called; send a CreateDynamicService request instead"
            )));
        };
        if declared.iter().any(|(n, _)| *n == name) {
            return Err(CoordinatorError::configuration(format!(
                "service '{name}' is already declared"
            )));
        }
        debug!(service = %name, "service declared");
        declared.push((name, Arc::new(builder)));
        Ok(())
    }

    /// Brings every declared service up.
    ///
    /// Returns once all of them are `Running`. Fails immediately when one
    /// faults, or when the configured timeout passes first. May be called once.
    ///
    /// The coordinator stays `Starting` until this returns: requests sent
    /// meanwhile are accepted, `stop` is rejected.
    pub async fn start(&self) -> Result<(), CoordinatorError> {
        let starting = self.lifecycle.begin_start().map_err(|actual| {
            CoordinatorError::configuration(format!(
                "start requires a coordinator that was never started (lifecycle: {actual})"
            ))
        })?;
        let declared = lock(&self.declared).take().unwrap_or_default();

        self.wire()?;
        self.run_hook(HookStage::BeforeStart)?;

        let names: Vec<Arc<str>> = declared.iter().map(|(n, _)| Arc::clone(n)).collect();
        info!(services = names.len(), timeout = ?self.cfg.timeout, "coordinator starting");

        self.router.gate().open();
        for (name, builder) in declared {
            let unit = self
                .factory
                .get_unit(Arc::clone(&name), builder)
                .map_err(|err| CoordinatorError::configuration(err.to_string()))?;
            if let Err(err) = unit.send(Command::CreateService).await {
                warn!(service = %name, error = %err, "unit rejected create");
            }
        }

        let registry = &self.registry;
        let outcome = barrier::wait_until(
            &self.wake,
            self.cfg.deadline_from(Instant::now()),
            self.cfg.poll_interval_clamped(),
            || registry.pending_for(&names, ServiceState::Running),
            || registry.find_in_state(&names, ServiceState::Faulted),
        )
        .await;
        let deferred = self.router.gate().close();

        match outcome {
            Ok(()) => {}
            Err(BarrierError::Aborted { service }) => {
                error!(service = %service, "service faulted during startup");
                if !deferred.is_empty() {
                    warn!(dropped = deferred.len(), "deferred restarts dropped");
                }
                return Err(CoordinatorError::StartupFault {
                    service: service.to_string(),
                });
            }
            Err(BarrierError::TimedOut { unsatisfied }) => {
                error!(pending = ?unsatisfied, "startup timed out");
                if !deferred.is_empty() {
                    warn!(dropped = deferred.len(), "deferred restarts dropped");
                }
                return Err(CoordinatorError::StartupTimeout {
                    timeout: self.cfg.timeout,
                    pending: unsatisfied.iter().map(|n| n.to_string()).collect(),
                });
            }
        }

        for name in deferred {
            debug!(service = %name, "flushing deferred restart");
            self.router.command(&name, Command::RestartService).await;
        }
        drop(starting);
        info!(services = names.len(), "coordinator started");
        self.run_hook(HookStage::AfterStart)
    }

    /// Stops and unloads every registered service.
    ///
    /// Succeeds only if every service reached `Completed` before the timeout.
    /// Rejected until `start` has returned.
    pub async fn stop(&self) -> Result<(), CoordinatorError> {
        self.lifecycle
            .advance(Lifecycle::Started, Lifecycle::Stopping)
            .map_err(|actual| {
                CoordinatorError::configuration(format!(
                    "stop requires a started coordinator (lifecycle: {actual})"
                ))
            })?;
        info!(services = self.registry.len(), "coordinator stopping");

        for unit in self.registry.units() {
            match unit.send(Command::StopService).await {
                Ok(()) => {}
                Err(UnitError::Closed) => trace!(service = unit.name(), "unit already exited"),
                Err(err) => warn!(service = unit.name(), error = %err, "stop not delivered"),
            }
        }

        let registry = &self.registry;
        let outcome = barrier::wait_until(
            &self.wake,
            self.cfg.deadline_from(Instant::now()),
            self.cfg.poll_interval_clamped(),
            || registry.pending_for(&registry.names(), ServiceState::Completed),
            barrier::never,
        )
        .await;

        match outcome {
            Ok(()) => {
                info!("coordinator stopped");
                self.run_hook(HookStage::AfterStop)
            }
            Err(BarrierError::TimedOut { unsatisfied }) => {
                for name in &unsatisfied {
                    let state = registry
                        .state_of(name)
                        .map(|s| s.as_str())
                        .unwrap_or("unregistered");
                    warn!(service = %name, state, "service did not complete before shutdown deadline");
                }
                Err(CoordinatorError::ShutdownTimeout {
                    timeout: self.cfg.timeout,
                    stuck: unsatisfied.iter().map(|n| n.to_string()).collect(),
                })
            }
            Err(BarrierError::Aborted { service }) => match service {},
        }
    }

    /// Publishes a request (or notification) on the coordinator's bus.
    ///
    /// Fails with a configuration error unless the coordinator is started or stopping.
    pub fn send(&self, event: Event) -> Result<(), CoordinatorError> {
        self.handle.send(event)
    }

    /// External event channel: state changes, faults and stops.
    pub fn event_channel(&self) -> &EventChannel {
        &self.channel
    }

    /// Shorthand for `event_channel().subscribe()`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.channel.subscribe()
    }

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

    /// Cloneable handle for collaborators that must not own the coordinator.
    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.cfg
    }

    /// Releases the bus subscription, cancels every task and clears the registry.
    ///
    /// Returns `true` for the call that actually disposed the coordinator.
    pub fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(subscription) = lock(&self.subscription).take() {
            subscription.release();
        }
        self.token.cancel();
        self.registry.clear();
        self.lifecycle.set(Lifecycle::Disposed);
        debug!("coordinator disposed");
        true
    }

    /// Subscribes the router and spawns the dispatcher and subscriber listener.
    fn wire(&self) -> Result<(), CoordinatorError> {
        let router: Arc<dyn Handler> = self.router.clone();
        let subscription = self
            .bus
            .subscribe_all(&EventTag::ALL, router)
            .map_err(|err| CoordinatorError::configuration(err.to_string()))?;
        *lock(&self.subscription) = Some(subscription);

        if let Some(dispatcher) = lock(&self.dispatcher).take() {
            self.runtime.spawn(dispatcher.run(self.token.child_token()));
        }
        self.subscriber_listener();
        Ok(())
    }

    /// Feeds the event channel into the subscriber set (fire-and-forget).
    fn subscriber_listener(&self) {
        let subscribers = std::mem::take(&mut *lock(&self.subscribers));
        if subscribers.is_empty() {
            return;
        }
        let set = SubscriberSet::new(subscribers, &self.runtime);
        let mut rx = self.channel.subscribe();
        let token = self.token.child_token();

        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber listener lagged; events skipped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            set.shutdown().await;
        });
    }

    fn run_hook(&self, stage: HookStage) -> Result<(), CoordinatorError> {
        let Some(hook) = self.hooks.get(stage) else {
            return Ok(());
        };
        debug!(%stage, "running hook");
        hook(self).map_err(|err| {
            error!(%stage, error = %err, "hook failed");
            CoordinatorError::Hook {
                stage,
                source: err.into(),
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn bus(&self) -> &Bus {
        &self.bus
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}
