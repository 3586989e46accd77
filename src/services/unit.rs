//! # ServiceUnit: one task per service.
//!
//! A unit owns exactly one [`ServiceController`] and the receiving end of a
//! bounded command inbox. Commands are processed one at a time, strictly in
//! arrival order, concurrently with every other unit and with the coordinator.
//!
//! ## Architecture
//! ```text
//! UnitHandle::send(cmd) ──► [bounded inbox] ──► ServiceUnit::run()
//!                                                  loop {
//!                                                    ├─► recv cmd (or token cancelled → exit)
//!                                                    ├─► controller.handle(cmd)   ── catch_unwind ──┐
//!                                                    │                                              ▼
//!                                                    │                          FaultBoundary::capture → controller.fail()
//!                                                    └─► state == Completed → exit
//!                                                  }
//! ```
//!
//! ## Rules
//! - The controller is never touched from outside the unit task.
//! - A panic escaping a command is converted into a fault of this service.
//! - Cancellation (coordinator disposal) aborts even an in-flight command.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::command::Command;
use super::controller::ServiceController;
use crate::core::fault::{self, FaultBoundary};
use crate::error::UnitError;

/// Sending side of a unit's inbox.
#[derive(Clone, Debug)]
pub struct UnitHandle {
    name: Arc<str>,
    tx: mpsc::Sender<Command>,
}

impl UnitHandle {
    pub(crate) fn new(name: Arc<str>, tx: mpsc::Sender<Command>) -> Self {
        Self { name, tx }
    }

    /// Name of the service this unit runs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends a command (async, waits if the inbox is full).
    pub async fn send(&self, command: Command) -> Result<(), UnitError> {
        self.tx.send(command).await.map_err(|_| UnitError::Closed)
    }

    /// Sends a command without waiting (fails if the inbox is full).
    pub fn try_send(&self, command: Command) -> Result<(), UnitError> {
        self.tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => UnitError::Full,
            mpsc::error::TrySendError::Closed(_) => UnitError::Closed,
        })
    }

    /// True once the unit has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Isolated execution context of one service.
pub struct ServiceUnit {
    controller: ServiceController,
    rx: mpsc::Receiver<Command>,
    boundary: FaultBoundary,
}

impl ServiceUnit {
    pub(crate) fn new(
        controller: ServiceController,
        rx: mpsc::Receiver<Command>,
        boundary: FaultBoundary,
    ) -> Self {
        Self {
            controller,
            rx,
            boundary,
        }
    }

    /// Processes commands until the service completes or `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        let name = self.controller.name_arc();
        fault::scope(name, self.run_inner(token)).await
    }

    async fn run_inner(mut self, token: CancellationToken) {
        loop {
            let command = tokio::select! {
                _ = token.cancelled() => break,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                }
            };
            trace!(service = %self.controller.name(), %command, "unit received command");

            let outcome = tokio::select! {
                _ = token.cancelled() => break,
                res = AssertUnwindSafe(self.controller.handle(command)).catch_unwind() => res,
            };
            if let Err(panic) = outcome {
                let err = self
                    .boundary
                    .capture(Some(self.controller.name()), panic.as_ref());
                self.controller.fail(err);
            }

            if self.controller.current_state().is_terminal() {
                break;
            }
        }
        self.controller.release();
        self.rx.close();
        debug!(
            service = %self.controller.name(),
            state = %self.controller.current_state(),
            "unit exited"
        );
    }
}
