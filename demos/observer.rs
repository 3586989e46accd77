//! # Example: observer
//!
//! Attaches a custom [`Subscribe`] implementation and a raw event-channel
//! receiver to a coordinator whose startup fails.
//!
//! Shows how to:
//! - Implement [`Subscribe`] and inspect [`EventKind`].
//! - Follow faults directly through [`Coordinator::event_channel`].
//! - Tell a startup fault apart from a startup timeout.
//!
//! ## Run
//! ```bash
//! cargo run --example observer
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use servisor::{
    CoordinatorBuilder, CoordinatorConfig, CoordinatorError, Event, EventKind, ServiceContext,
    ServiceError, ServiceFn, ServiceRef, Subscribe,
};

/// Counts faults and prints every state change.
#[derive(Default)]
struct ConsoleSubscriber {
    faults: AtomicUsize,
}

#[async_trait::async_trait]
impl Subscribe for ConsoleSubscriber {
    async fn on_event(&self, ev: &Event) {
        match &ev.kind {
            EventKind::ServiceEvent { state } => {
                println!("[sub] #{:<3} {:<8} -> {state}", ev.seq, ev.service);
            }
            EventKind::ServiceFault { label, cause } => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                println!("[sub] #{:<3} {:<8} fault {label}: {cause}", ev.seq, ev.service);
            }
            EventKind::ServiceStopped => println!("[sub] #{:<3} {:<8} stopped", ev.seq, ev.service),
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "console"
    }

    fn queue_capacity(&self) -> usize {
        256
    }
}

fn healthy(_ctx: &ServiceContext) -> Result<ServiceRef, ServiceError> {
    Ok(ServiceFn::arc(|_ctx: ServiceContext| async {
        Ok::<_, ServiceError>(())
    }))
}

fn broken(_ctx: &ServiceContext) -> Result<ServiceRef, ServiceError> {
    Ok(ServiceFn::arc(|_ctx: ServiceContext| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Err::<(), _>(ServiceError::fail("port 8080 already in use"))
    }))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let console = Arc::new(ConsoleSubscriber::default());
    let subs: Vec<Arc<dyn Subscribe>> = vec![console.clone()];

    let coordinator = CoordinatorBuilder::new(CoordinatorConfig::default())
        .with_subscribers(subs)
        .build()?;
    let mut faults = coordinator.event_channel().subscribe();

    coordinator.create_service("db", healthy)?;
    coordinator.create_service("api", broken)?;

    match coordinator.start().await {
        Ok(()) => println!("started"),
        Err(CoordinatorError::StartupFault { service }) => {
            println!("startup aborted: {service} faulted");
        }
        Err(err) => return Err(err.into()),
    }

    while let Ok(ev) = faults.try_recv() {
        if let Some(cause) = ev.cause() {
            println!("[channel] {} faulted: {cause}", ev.service);
        }
    }

    coordinator.stop().await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("faults observed by subscriber: {}", console.faults.load(Ordering::Relaxed));
    Ok(())
}
