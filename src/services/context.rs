use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::unit::UnitHandle;
use crate::core::CoordinatorHandle;

/// Everything a service instance gets from its unit.
///
/// A fresh context (and cancellation token) is made for every create; the
/// token is cancelled when the instance is stopped, faults, or is unloaded.
#[derive(Clone)]
pub struct ServiceContext {
    name: Arc<str>,
    inbox: UnitHandle,
    coordinator: CoordinatorHandle,
    token: CancellationToken,
}

impl ServiceContext {
    pub(crate) fn new(
        name: Arc<str>,
        inbox: UnitHandle,
        coordinator: CoordinatorHandle,
        token: CancellationToken,
    ) -> Self {
        Self {
            name,
            inbox,
            coordinator,
            token,
        }
    }

    /// Name of the service.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle to the unit's own inbox (lets a service restart or stop itself).
    pub fn inbox(&self) -> &UnitHandle {
        &self.inbox
    }

    /// Handle to the owning coordinator.
    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    /// Cancelled when this service instance goes away.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
