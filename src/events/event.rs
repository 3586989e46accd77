//! # Coordinator events: the closed set of messages flowing over the bus.
//!
//! Every [`Event`] names the service it concerns and carries an [`EventKind`]
//! with the kind-specific payload:
//! - **Lifecycle notifications** published by service units:
//!   `ServiceEvent` (state change), `ServiceFault`, `ServiceStopped`;
//! - **Requests** published by collaborators through
//!   [`Coordinator::send`](crate::Coordinator::send):
//!   `CreateDynamicService`, `ServiceSourceChanged`.
//!
//! Dispatch is keyed by [`EventTag`], the payload-free discriminant of a kind.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! The bus delivers events in publish order; `seq` lets observers of the
//! [`EventChannel`](crate::EventChannel) restore that order across receivers.
//!
//! ## Example
//! ```rust
//! use servisor::{Event, EventKind, EventTag, ServiceState};
//!
//! let ev = Event::state_changed("billing", ServiceState::Running);
//!
//! assert_eq!(ev.tag(), EventTag::ServiceEvent);
//! assert_eq!(&*ev.service, "billing");
//! assert_eq!(ev.state(), Some(ServiceState::Running));
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::error::ServiceError;
use crate::services::{LoaderSpec, ServiceState};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Payload-free discriminant of an [`EventKind`]; the key of the bus dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    ServiceEvent,
    ServiceFault,
    ServiceStopped,
    CreateDynamicService,
    ServiceSourceChanged,
}

impl EventTag {
    /// Every tag, in declaration order.
    pub const ALL: [EventTag; 5] = [
        EventTag::ServiceEvent,
        EventTag::ServiceFault,
        EventTag::ServiceStopped,
        EventTag::CreateDynamicService,
        EventTag::ServiceSourceChanged,
    ];

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTag::ServiceEvent => "service_event",
            EventTag::ServiceFault => "service_fault",
            EventTag::ServiceStopped => "service_stopped",
            EventTag::CreateDynamicService => "create_dynamic_service",
            EventTag::ServiceSourceChanged => "service_source_changed",
        }
    }

    /// True for kinds that must reach the external event channel even when
    /// no bus handler is subscribed for them.
    #[inline]
    pub fn always_observed(&self) -> bool {
        matches!(self, EventTag::ServiceFault | EventTag::ServiceStopped)
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of coordinator events with their payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// The service changed its externally visible state.
    ///
    /// Published by the owning unit after every successful transition.
    ServiceEvent { state: ServiceState },

    /// The service faulted, or rejected a command that is invalid from its state.
    ///
    /// - `label`: stable error label (see [`ServiceError::as_label`])
    /// - `cause`: human-readable cause
    ServiceFault {
        label: &'static str,
        cause: Arc<str>,
    },

    /// The service completed a stop and is now `Stopped`.
    ServiceStopped,

    /// Request to build, register and start a service from a loader specification.
    CreateDynamicService { loader: LoaderSpec },

    /// The source backing a service changed; restart it, or create it lazily.
    ServiceSourceChanged,
}

impl EventKind {
    /// Returns the dispatch tag of this kind.
    pub fn tag(&self) -> EventTag {
        match self {
            EventKind::ServiceEvent { .. } => EventTag::ServiceEvent,
            EventKind::ServiceFault { .. } => EventTag::ServiceFault,
            EventKind::ServiceStopped => EventTag::ServiceStopped,
            EventKind::CreateDynamicService { .. } => EventTag::CreateDynamicService,
            EventKind::ServiceSourceChanged => EventTag::ServiceSourceChanged,
        }
    }
}

/// Coordinator event.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - `service`: the service this event concerns
/// - `kind`: classification and payload
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Name of the service.
    pub service: Arc<str>,
    /// Event classification.
    pub kind: EventKind,
}

impl Event {
    /// Creates a new event with current timestamp and next sequence number.
    pub fn new(service: impl Into<Arc<str>>, kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            service: service.into(),
            kind,
        }
    }

    /// `ServiceEvent` for a state change.
    #[inline]
    pub fn state_changed(service: impl Into<Arc<str>>, state: ServiceState) -> Self {
        Self::new(service, EventKind::ServiceEvent { state })
    }

    /// `ServiceFault` carrying a free-form cause.
    #[inline]
    pub fn fault(service: impl Into<Arc<str>>, cause: impl Into<Arc<str>>) -> Self {
        Self::new(
            service,
            EventKind::ServiceFault {
                label: "service_fault",
                cause: cause.into(),
            },
        )
    }

    /// `ServiceFault` built from a [`ServiceError`].
    #[inline]
    pub fn fault_from(service: impl Into<Arc<str>>, err: &ServiceError) -> Self {
        Self::new(
            service,
            EventKind::ServiceFault {
                label: err.as_label(),
                cause: err.to_string().into(),
            },
        )
    }

    /// `ServiceStopped` notification.
    #[inline]
    pub fn stopped(service: impl Into<Arc<str>>) -> Self {
        Self::new(service, EventKind::ServiceStopped)
    }

    /// `CreateDynamicService` request.
    #[inline]
    pub fn create_dynamic(service: impl Into<Arc<str>>, loader: LoaderSpec) -> Self {
        Self::new(service, EventKind::CreateDynamicService { loader })
    }

    /// `ServiceSourceChanged` notification.
    #[inline]
    pub fn source_changed(service: impl Into<Arc<str>>) -> Self {
        Self::new(service, EventKind::ServiceSourceChanged)
    }

    #[inline]
    pub fn tag(&self) -> EventTag {
        self.kind.tag()
    }

    /// The new state, for `ServiceEvent`s.
    #[inline]
    pub fn state(&self) -> Option<ServiceState> {
        match self.kind {
            EventKind::ServiceEvent { state } => Some(state),
            _ => None,
        }
    }

    /// The fault cause, for `ServiceFault`s.
    #[inline]
    pub fn cause(&self) -> Option<&str> {
        match &self.kind {
            EventKind::ServiceFault { cause, .. } => Some(cause),
            _ => None,
        }
    }

    #[inline]
    pub fn is_fault(&self) -> bool {
        matches!(self.kind, EventKind::ServiceFault { .. })
    }
}
