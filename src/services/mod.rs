//! # Services: what the coordinator manages.
//!
//! - [`Service`] / [`ServiceFn`]: business logic with `start`/`stop`;
//! - [`ServiceState`]: lifecycle states and the transition table;
//! - [`Command`]: messages accepted by a unit's inbox;
//! - [`ServiceController`]: per-service state machine;
//! - [`ServiceUnit`] / [`UnitHandle`]: one task per service and its inbox;
//! - [`LoaderSpec`] / [`ServiceLoader`] / [`LoaderSet`]: dynamic creation.

mod command;
mod context;
mod controller;
mod loader;
mod service;
mod state;
mod unit;

pub use command::Command;
pub use context::ServiceContext;
pub use controller::ServiceController;
pub use loader::{LoaderSet, LoaderSpec, ServiceLoader};
pub use service::{Service, ServiceBuilder, ServiceFn, ServiceRef};
pub use state::{ControllerView, ServiceState};
pub use unit::{ServiceUnit, UnitHandle};

#[cfg(test)]
pub(crate) use state::StateCell;
