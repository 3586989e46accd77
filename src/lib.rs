//! # servisor
//!
//! **Servisor** is a service-lifecycle coordinator for tokio applications.
//!
//! It manages a dynamic set of named services, each running in its own unit
//! (one task, one bounded command inbox, one state machine). Services are
//! brought up under a startup barrier, torn down under a shutdown barrier, and
//! their faults and stops are routed between units and external observers
//! through asynchronous messages, never shared-state locking.
//!
//! ## Architecture
//! ```text
//!   create_service("a", builder) ... ──► Coordinator::start()
//!                                             │
//!                      ┌──────────────────────┼──────────────────────┐
//!                      ▼                      ▼                      ▼
//!               ┌─────────────┐        ┌─────────────┐        ┌─────────────┐
//!               │ ServiceUnit │        │ ServiceUnit │        │ ServiceUnit │
//!               │  [inbox]    │        │  [inbox]    │        │  [inbox]    │
//!               │ Controller  │        │ Controller  │        │ Controller  │
//!               └──────┬──────┘        └──────┬──────┘        └──────┬──────┘
//!                      │ ServiceEvent / ServiceFault / ServiceStopped │
//!                      ▼                      ▼                      ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │ Bus (ordered: one dispatcher task, one handler per EventTag)            │
//! └────────────────────────────────────┬────────────────────────────────────┘
//!                                      ▼
//!                         Router (the coordinator's handler)
//!                  ├─► wakes startup / shutdown barriers
//!                  ├─► UnloadService for stopped/faulted units while stopping
//!                  ├─► CreateDynamicService / ServiceSourceChanged
//!                  └─► EventChannel (broadcast) ──► receivers, SubscriberSet
//! ```
//!
//! ### Service lifecycle
//! ```text
//! Created ─► Starting ─► Running ─► Stopping ─► Stopped ─┐
//!    ▲                                              │     ├─► Completed
//!    └───────────── RestartService ◄────────────────┤     │
//!                                               Faulted ──┘
//! ```
//!
//! ## Features
//! | Area              | Description                                               | Key types / traits                          |
//! |-------------------|-----------------------------------------------------------|---------------------------------------------|
//! | **Coordination**  | Start/stop barriers, dynamic creation, hooks              | [`Coordinator`], [`CoordinatorBuilder`]     |
//! | **Services**      | Business logic driven through its lifecycle               | [`Service`], [`ServiceFn`], [`ServiceState`]|
//! | **Loaders**       | Produce services for dynamic creation requests            | [`ServiceLoader`], [`LoaderSpec`]           |
//! | **Events**        | Ordered bus and broadcast channel                         | [`Event`], [`EventKind`], [`EventChannel`]  |
//! | **Subscriber API**| Observe events with per-subscriber queues                 | [`Subscribe`], [`SubscriberSet`]            |
//! | **Errors**        | Typed errors for orchestration and services               | [`CoordinatorError`], [`ServiceError`]      |
//! | **Configuration** | Timeouts, poll interval, capacities, default loader       | [`CoordinatorConfig`]                       |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use servisor::{
//!     CoordinatorBuilder, CoordinatorConfig, Event, LoaderSpec, ServiceContext, ServiceError,
//!     ServiceFn, ServiceRef, ServiceState,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = CoordinatorConfig::default();
//!     cfg.timeout = Duration::from_secs(5);
//!
//!     let coordinator = CoordinatorBuilder::new(cfg)
//!         .with_loader(
//!             "directory",
//!             |_ctx: &ServiceContext, _spec: &LoaderSpec| -> Result<ServiceRef, ServiceError> {
//!                 Ok(ServiceFn::arc(|_ctx: ServiceContext| async { Ok::<_, ServiceError>(()) }))
//!             },
//!         )
//!         .build()?;
//!
//!     coordinator.create_service("http", |_ctx: &ServiceContext| {
//!         Ok(ServiceFn::arc(|ctx: ServiceContext| async move {
//!             let token = ctx.token().clone();
//!             tokio::spawn(async move { token.cancelled().await });
//!             Ok::<_, ServiceError>(())
//!         }))
//!     })?;
//!
//!     coordinator.start().await?;
//!     coordinator.send(Event::create_dynamic("reports", LoaderSpec::new("directory")))?;
//!
//!     coordinator.stop().await?;
//!     assert_eq!(coordinator.state_of("http"), Some(ServiceState::Completed));
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod events;
mod services;
mod subscribers;

#[cfg(test)]
mod test_support;

// ---- Public re-exports ----

pub use core::{
    Coordinator, CoordinatorBuilder, CoordinatorConfig, CoordinatorHandle, Hook, HookStage,
    Lifecycle, MAX_POLL_INTERVAL, install_panic_hook,
};
pub use error::{BusError, CoordinatorError, FactoryError, ServiceError, UnitError};
pub use events::{Bus, Dispatcher, Event, EventChannel, EventKind, EventTag, Handler, Subscription};
pub use services::{
    Command, ControllerView, LoaderSet, LoaderSpec, Service, ServiceBuilder, ServiceContext,
    ServiceController, ServiceFn, ServiceLoader, ServiceRef, ServiceState, ServiceUnit, UnitHandle,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
