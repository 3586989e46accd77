//! # Registry: name → controller view, name → unit handle.
//!
//! Entries are written once, by the [`UnitFactory`](super::factory::UnitFactory),
//! before the unit processes its first command. They are never removed
//! individually: a completed service keeps its entry (and its name) until the
//! coordinator is disposed.
//!
//! Backed by a [`DashMap`] so barriers, the router and `send` read it
//! concurrently without a global lock.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::FactoryError;
use crate::services::{ControllerView, ServiceState, UnitHandle};

/// One registered service.
#[derive(Clone)]
pub(crate) struct RegistryEntry {
    pub(crate) view: ControllerView,
    pub(crate) unit: UnitHandle,
}

/// Concurrent map of registered services. Cheap to clone.
#[derive(Clone, Default)]
pub(crate) struct Registry {
    entries: Arc<DashMap<Arc<str>, RegistryEntry>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `name`; rejects a name that is already taken.
    pub(crate) fn register(
        &self,
        name: Arc<str>,
        view: ControllerView,
        unit: UnitHandle,
    ) -> Result<(), FactoryError> {
        match self.entries.entry(name) {
            Entry::Occupied(e) => Err(FactoryError::Duplicate {
                service: e.key().to_string(),
            }),
            Entry::Vacant(e) => {
                e.insert(RegistryEntry { view, unit });
                Ok(())
            }
        }
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub(crate) fn unit(&self, name: &str) -> Option<UnitHandle> {
        self.entries.get(name).map(|e| e.unit.clone())
    }

    pub(crate) fn state_of(&self, name: &str) -> Option<ServiceState> {
        self.entries.get(name).map(|e| e.view.current_state())
    }

    /// Handles of every registered unit.
    pub(crate) fn units(&self) -> Vec<UnitHandle> {
        self.entries.iter().map(|e| e.unit.clone()).collect()
    }

    pub(crate) fn names(&self) -> Vec<Arc<str>> {
        self.entries.iter().map(|e| Arc::clone(e.key())).collect()
    }

    /// `(name, state)` for every registered service, sorted by name.
    pub(crate) fn snapshot(&self) -> Vec<(Arc<str>, ServiceState)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .map(|e| (Arc::clone(e.key()), e.view.current_state()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Names from `names` whose controller is not (yet) in `target`.
    ///
    /// Unregistered names count as pending.
    pub(crate) fn pending_for(&self, names: &[Arc<str>], target: ServiceState) -> Vec<Arc<str>> {
        names
            .iter()
            .filter(|n| self.state_of(n) != Some(target))
            .cloned()
            .collect()
    }

    /// First name from `names` whose controller is in `state`.
    pub(crate) fn find_in_state(&self, names: &[Arc<str>], state: ServiceState) -> Option<Arc<str>> {
        names
            .iter()
            .find(|n| self.state_of(n) == Some(state))
            .cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }
}
