//! # Barrier: wait until a set of services satisfies a predicate.
//!
//! ```text
//! loop while now < deadline:
//!   ├─ unsatisfied() empty   → Ok
//!   ├─ aborted() is Some(s)  → Err(Aborted(s))
//!   └─ wait: wake.notified()  |  sleep(min(poll, remaining))
//! final re-check → Ok | Aborted | TimedOut(unsatisfied)
//! ```
//!
//! A barrier with nothing to abort on passes [`never`]; its error type then
//! has no `Aborted` value to handle.
//!
//! The router calls `notify_one` on every state change, so barriers react to
//! events immediately; the poll interval only bounds how stale a missed
//! wake-up can make them.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BarrierError<T = Arc<str>> {
    /// A tracked service reached the abort state.
    Aborted { service: T },
    /// The deadline passed; these services never satisfied the predicate.
    TimedOut { unsatisfied: Vec<Arc<str>> },
}

/// Abort condition that never holds.
pub(crate) fn never() -> Option<Infallible> {
    None
}

pub(crate) async fn wait_until<U, A, T>(
    wake: &Notify,
    deadline: Instant,
    poll: Duration,
    mut unsatisfied: U,
    mut aborted: A,
) -> Result<(), BarrierError<T>>
where
    U: FnMut() -> Vec<Arc<str>>,
    A: FnMut() -> Option<T>,
{
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        if unsatisfied().is_empty() {
            return Ok(());
        }
        if let Some(service) = aborted() {
            return Err(BarrierError::Aborted { service });
        }

        let nap = poll.min(deadline - now);
        tokio::select! {
            _ = wake.notified() => {}
            _ = tokio::time::sleep(nap) => {}
        }
    }

    let pending = unsatisfied();
    if pending.is_empty() {
        return Ok(());
    }
    if let Some(service) = aborted() {
        return Err(BarrierError::Aborted { service });
    }
    Err(BarrierError::TimedOut {
        unsatisfied: pending,
    })
}
