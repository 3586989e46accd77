//! Coordinator core: orchestration and lifecycle.
//!
//! The public API of this module is [`Coordinator`] (built with
//! [`CoordinatorBuilder`]), its [`CoordinatorConfig`], and the
//! [`CoordinatorHandle`] given to services.
//!
//! Internal modules:
//! - [`registry`]: name → controller view / unit handle;
//! - [`factory`]: creates, registers and spawns units;
//! - [`router`]: the single bus handler (fault/stop routing, dynamic creation);
//! - [`barrier`]: deadline-bounded wait over the registry;
//! - [`fault`]: panic boundary around units.

mod barrier;
mod builder;
mod config;
mod coordinator;
mod factory;
pub(crate) mod fault;
mod handle;
mod lifecycle;
mod registry;
mod router;

#[cfg(test)]
mod tests;

pub use builder::{CoordinatorBuilder, Hook, HookStage};
pub use config::{CoordinatorConfig, MAX_POLL_INTERVAL};
pub use coordinator::Coordinator;
pub use fault::install_panic_hook;
pub use handle::CoordinatorHandle;
pub use lifecycle::Lifecycle;

#[cfg(test)]
pub(crate) use lifecycle::LifecycleCell;
#[cfg(test)]
pub(crate) use registry::Registry;
