//! # LogWriter: renders coordinator events through `tracing`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  servisor::subscribers: service state changed service="api" state=running seq=4
//! WARN  servisor::subscribers: service fault service="db" label=service_failed cause="..." seq=7
//! INFO  servisor::subscribers: service stopped service="api" seq=9
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::services::ServiceState;
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match &e.kind {
            EventKind::ServiceEvent { state } => match state {
                ServiceState::Running | ServiceState::Completed | ServiceState::Faulted => {
                    info!(target: "servisor::subscribers", service = %e.service, %state, seq = e.seq, "service state changed")
                }
                _ => {
                    debug!(target: "servisor::subscribers", service = %e.service, %state, seq = e.seq, "service state changed")
                }
            },
            EventKind::ServiceFault { label, cause } => {
                warn!(target: "servisor::subscribers", service = %e.service, label, %cause, seq = e.seq, "service fault")
            }
            EventKind::ServiceStopped => {
                info!(target: "servisor::subscribers", service = %e.service, seq = e.seq, "service stopped")
            }
            EventKind::CreateDynamicService { loader } => {
                debug!(target: "servisor::subscribers", service = %e.service, kind = %loader.kind, seq = e.seq, "dynamic service requested")
            }
            EventKind::ServiceSourceChanged => {
                debug!(target: "servisor::subscribers", service = %e.service, seq = e.seq, "service source changed")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
