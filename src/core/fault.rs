//! # Fault boundary: last line of defence around service units.
//!
//! Every unit runs its command processing inside `catch_unwind`. Whatever
//! escapes is turned into [`ServiceError::Unhandled`] attributed to the unit,
//! logged at error level with `fatal = true`, and handed back to the unit so it
//! can fault the service.
//!
//! The process panic hook ([`install_panic_hook`], installed by
//! [`CoordinatorBuilder::build`](crate::CoordinatorBuilder::build)) logs every
//! panic in the process at the same severity. Unit tasks run inside a
//! task-local scope naming the unit, so panics on them are attributed; panics
//! anywhere else (including tasks a service spawns) are logged with
//! `service = "unknown"`.

use std::any::Any;
use std::future::Future;
use std::panic::{self, PanicHookInfo};
use std::sync::{Arc, OnceLock};

use tracing::error;

use crate::error::ServiceError;

tokio::task_local! {
    static UNIT: Arc<str>;
}

/// Runs `fut` with `name` as the current unit.
pub(crate) async fn scope<F: Future>(name: Arc<str>, fut: F) -> F::Output {
    UNIT.scope(name, fut).await
}

/// Name of the unit the current task belongs to, if any.
pub(crate) fn current_unit() -> Option<Arc<str>> {
    UNIT.try_with(Arc::clone).ok()
}

/// Extracts the message of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Converts escaped panics into service faults.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FaultBoundary;

impl FaultBoundary {
    /// Records a panic that escaped `origin` and returns the fault to report.
    pub(crate) fn capture(&self, origin: Option<&str>, payload: &(dyn Any + Send)) -> ServiceError {
        let message = panic_message(payload);
        error!(
            fatal = true,
            service = origin.unwrap_or("unknown"),
            "unhandled fault: {message}"
        );
        ServiceError::Unhandled {
            origin: origin.map(str::to_owned),
            message,
        }
    }
}

static HOOK_INSTALLED: OnceLock<()> = OnceLock::new();

/// Logs a panic at fatal severity; `unit` is `None` when the origin is unknown.
pub(crate) fn log_panic(unit: Option<&str>, location: &str, message: &str) {
    error!(
        fatal = true,
        service = unit.unwrap_or("unknown"),
        %location,
        "panic: {message}"
    );
}

/// Installs a process panic hook that logs every panic at fatal severity.
///
/// The previous hook still runs afterwards. Calling this more than once has no
/// further effect.
pub fn install_panic_hook() {
    HOOK_INSTALLED.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_default();
            log_panic(
                current_unit().as_deref(),
                &location,
                &panic_message(info.payload()),
            );
            previous(info);
        }));
    });
}
