//! # Service lifecycle states and the transition table.
//!
//! ```text
//!  Created ──► Starting ──► Running ──► Stopping ──► Stopped ──┐
//!     ▲                                                │       ├──► Completed
//!     └──────────── restart (re-create) ◄──────────────┤       │
//!                                                   Faulted ───┘
//!   any non-terminal state ──► Faulted
//! ```
//!
//! The state is stored in an atomic cell: the owning unit is the only writer,
//! everybody else reads an eventually consistent snapshot through a
//! [`ControllerView`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServiceState {
    Created = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
    Faulted = 5,
    Completed = 6,
}

impl ServiceState {
    /// Converts from u8 representation.
    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Created),
            1 => Some(Self::Starting),
            2 => Some(Self::Running),
            3 => Some(Self::Stopping),
            4 => Some(Self::Stopped),
            5 => Some(Self::Faulted),
            6 => Some(Self::Completed),
            _ => None,
        }
    }

    /// Returns the state name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Faulted => "faulted",
            Self::Completed => "completed",
        }
    }

    /// Returns true if this is the terminal state.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether `self → next` is an edge of the transition table.
    pub fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;

        match (self, next) {
            (Completed, _) => false,
            (Faulted, Faulted) => false,
            (_, Faulted) => true,
            (Created, Starting)
            | (Starting, Running)
            | (Running, Stopping)
            | (Stopping, Stopped)
            | (Stopped | Faulted, Completed)
            | (Stopped | Faulted, Created) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared atomic storage for a controller's state.
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ServiceState::Created as u8)))
    }

    #[inline]
    pub(crate) fn get(&self) -> ServiceState {
        // Only valid discriminants are ever stored.
        ServiceState::from_u8(self.0.load(Ordering::Acquire)).unwrap_or(ServiceState::Faulted)
    }

    #[inline]
    pub(crate) fn set(&self, state: ServiceState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Read-only view of a controller, held by the registry.
#[derive(Debug, Clone)]
pub struct ControllerView {
    name: Arc<str>,
    cell: StateCell,
}

impl ControllerView {
    pub(crate) fn new(name: Arc<str>, cell: StateCell) -> Self {
        Self { name, cell }
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the controller's current state.
    #[inline]
    pub fn current_state(&self) -> ServiceState {
        self.cell.get()
    }
}
