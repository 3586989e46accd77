//! Error types used by the coordinator and its service units.
//!
//! This module defines:
//!
//! - [`CoordinatorError`]: failures of the orchestration calls (`start`, `stop`, `send`).
//! - [`ServiceError`]: failures raised inside a service unit.
//! - [`BusError`], [`UnitError`], [`FactoryError`]: failures of the plumbing layers.
//!
//! The two main enums provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::time::Duration;
use thiserror::Error;

use crate::core::HookStage;
use crate::events::EventTag;
use crate::services::ServiceState;

/// # Errors produced by the coordinator.
///
/// Barrier failures are fatal to the orchestration call that raised them and
/// are never retried internally.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// The coordinator was used outside of its lifecycle (e.g. `send` before `start`).
    #[error("configuration error: {reason}")]
    Configuration {
        /// What was wrong.
        reason: String,
    },

    /// Not every startup service reached `Running` before the deadline.
    #[error("startup timeout {timeout:?} exceeded; pending: {pending:?}")]
    StartupTimeout {
        /// The configured timeout.
        timeout: Duration,
        /// Services that were not running yet.
        pending: Vec<String>,
    },

    /// A tracked service faulted while the startup barrier was waiting.
    #[error("service '{service}' faulted during startup")]
    StartupFault {
        /// The faulted service.
        service: String,
    },

    /// Not every service reached `Completed` before the deadline.
    #[error("shutdown timeout {timeout:?} exceeded; stuck: {stuck:?}")]
    ShutdownTimeout {
        /// The configured timeout.
        timeout: Duration,
        /// Services that did not complete in time.
        stuck: Vec<String>,
    },

    /// A configured lifecycle hook returned an error.
    #[error("{stage} hook failed: {source}")]
    Hook {
        /// Which hook failed.
        stage: HookStage,
        /// The hook's error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl CoordinatorError {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        CoordinatorError::Configuration {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use servisor::CoordinatorError;
    /// use std::time::Duration;
    ///
    /// let err = CoordinatorError::ShutdownTimeout { timeout: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "shutdown_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            CoordinatorError::Configuration { .. } => "configuration",
            CoordinatorError::StartupTimeout { .. } => "startup_timeout",
            CoordinatorError::StartupFault { .. } => "startup_fault",
            CoordinatorError::ShutdownTimeout { .. } => "shutdown_timeout",
            CoordinatorError::Hook { .. } => "hook_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            CoordinatorError::Configuration { reason } => format!("configuration: {reason}"),
            CoordinatorError::StartupTimeout { timeout, pending } => {
                format!("startup timed out after {timeout:?}; pending services={pending:?}")
            }
            CoordinatorError::StartupFault { service } => {
                format!("service {service} faulted during startup")
            }
            CoordinatorError::ShutdownTimeout { timeout, stuck } => {
                format!("shutdown timed out after {timeout:?}; stuck services={stuck:?}")
            }
            CoordinatorError::Hook { stage, source } => format!("{stage} hook: {source}"),
        }
    }
}

/// # Errors raised inside a service unit.
///
/// Every variant ends up on the bus as a `ServiceFault`.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The controller received a command that is not valid from its current state.
    #[error("service '{service}' cannot {attempted} from state {from}")]
    InvalidTransition {
        /// Service name.
        service: String,
        /// State the controller was in.
        from: ServiceState,
        /// Rejected command or target state.
        attempted: &'static str,
    },

    /// Service code (builder, start or stop) failed.
    #[error("service failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// No loader is registered for the requested loader kind.
    #[error("no loader registered for kind '{kind}'")]
    Loader {
        /// The requested kind.
        kind: String,
    },

    /// A panic escaped the unit's execution boundary.
    #[error("unhandled fault in {}: {message}", .origin.as_deref().unwrap_or("unknown origin"))]
    Unhandled {
        /// Name of the unit the panic came from, when known.
        origin: Option<String>,
        /// Panic message.
        message: String,
    },
}

impl ServiceError {
    /// Shorthand for [`ServiceError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        ServiceError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use servisor::ServiceError;
    ///
    /// assert_eq!(ServiceError::fail("boom").as_label(), "service_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::InvalidTransition { .. } => "service_invalid_transition",
            ServiceError::Fail { .. } => "service_failed",
            ServiceError::Loader { .. } => "service_loader_missing",
            ServiceError::Unhandled { .. } => "service_unhandled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ServiceError::InvalidTransition {
                service,
                from,
                attempted,
            } => format!("invalid transition: {service} {from} -/-> {attempted}"),
            ServiceError::Fail { error } => format!("error: {error}"),
            ServiceError::Loader { kind } => format!("missing loader: {kind}"),
            ServiceError::Unhandled { origin, message } => format!(
                "unhandled: {} ({message})",
                origin.as_deref().unwrap_or("unknown")
            ),
        }
    }

    /// True if this error rejects a command without changing controller state.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, ServiceError::InvalidTransition { .. })
    }
}

/// Error returned by [`Bus::subscribe`](crate::Bus::subscribe).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// A handler is already registered for this tag.
    #[error("a handler is already subscribed for {tag}")]
    AlreadySubscribed { tag: EventTag },
}

/// Error returned when sending a command to a service unit.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitError {
    /// The unit inbox is full (try again later or use async `send`).
    #[error("unit inbox full")]
    Full,

    /// The unit has exited (completed, or the coordinator was disposed).
    #[error("unit inbox closed")]
    Closed,
}

/// Error returned by the unit factory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FactoryError {
    /// A unit is already registered under this name.
    #[error("service '{service}' is already registered")]
    Duplicate { service: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_message_names_state_and_command() {
        let err = ServiceError::InvalidTransition {
            service: "cache".into(),
            from: ServiceState::Completed,
            attempted: "stop_service",
        };
        assert_eq!(
            err.to_string(),
            "service 'cache' cannot stop_service from state completed"
        );
        assert!(err.is_invalid_transition());
        assert!(!ServiceError::fail("x").is_invalid_transition());
    }

    #[test]
    fn unhandled_without_origin() {
        let err = ServiceError::Unhandled {
            origin: None,
            message: "index out of bounds".into(),
        };
        assert_eq!(err.as_label(), "service_unhandled");
        assert!(err.to_string().contains("unknown origin"));
    }

    #[test]
    fn hook_error_keeps_source() {
        let err = CoordinatorError::Hook {
            stage: HookStage::AfterStop,
            source: anyhow::anyhow!("flush failed").into(),
        };
        assert_eq!(err.as_label(), "hook_failed");
        assert_eq!(err.to_string(), "after_stop hook failed: flush failed");
        assert!(std::error::Error::source(&err).is_some());
    }
}
