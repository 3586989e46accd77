//! # Example: coordinator
//!
//! Brings three services up under the startup barrier, creates one more at
//! runtime through a loader, reloads it on a source change, and shuts
//! everything down under the shutdown barrier.
//!
//! ## Flow
//! ```text
//! create_service(http, cache, metrics) ──► start()
//!     ├─► units: CreateService ─► Starting ─► Running
//!     └─► barrier: all Running ─► after_start hook
//! send(CreateDynamicService{reports, "directory"})  ─► loader ─► Running
//! send(ServiceSourceChanged{reports})               ─► RestartService
//! stop()
//!     ├─► StopService ─► Stopped ─► router: UnloadService ─► Completed
//!     └─► barrier: all Completed ─► after_stop hook
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example coordinator
//! ```

use std::sync::Arc;
use std::time::Duration;

use servisor::{
    CoordinatorBuilder, CoordinatorConfig, Event, LoaderSpec, ServiceContext, ServiceError,
    ServiceFn, ServiceRef, Subscribe,
};
use tracing_subscriber::EnvFilter;

/// Service that ticks in the background until its token is cancelled.
fn ticker(period: Duration) -> impl Fn(&ServiceContext) -> Result<ServiceRef, ServiceError> {
    move |_ctx: &ServiceContext| {
        let svc = ServiceFn::new(move |ctx: ServiceContext| async move {
            let token = ctx.token().clone();
            let name = ctx.name().to_string();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => tracing::trace!(service = %name, "tick"),
                    }
                }
            });
            Ok::<_, ServiceError>(())
        })
        .with_stop(|ctx: ServiceContext| async move {
            tracing::info!(service = ctx.name(), "flushing before stop");
            Ok::<_, ServiceError>(())
        });
        Ok(Arc::new(svc) as ServiceRef)
    }
}

fn directory_loader(ctx: &ServiceContext, spec: &LoaderSpec) -> Result<ServiceRef, ServiceError> {
    let source = spec.source.as_deref().unwrap_or(".");
    tracing::info!(service = ctx.name(), %source, "loading service");
    ticker(Duration::from_millis(200))(ctx)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut cfg = CoordinatorConfig::default();
    cfg.timeout = Duration::from_secs(5);
    cfg.poll_interval = Duration::from_millis(250);

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(servisor::LogWriter::new())];

    let coordinator = CoordinatorBuilder::new(cfg)
        .with_subscribers(subs)
        .with_loader("directory", directory_loader)
        .before_start(|_c| {
            tracing::info!("opening shared resources");
            Ok(())
        })
        .after_start(|c| {
            tracing::info!(services = ?c.services(), "all services running");
            Ok(())
        })
        .after_stop(|_c| {
            tracing::info!("shared resources released");
            Ok(())
        })
        .build()?;

    coordinator.create_service("http", ticker(Duration::from_millis(100)))?;
    coordinator.create_service("cache", ticker(Duration::from_millis(500)))?;
    coordinator.create_service("metrics", ticker(Duration::from_secs(1)))?;

    coordinator.start().await?;

    coordinator.send(Event::create_dynamic(
        "reports",
        LoaderSpec::new("directory").with_source("/srv/reports"),
    ))?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    coordinator.send(Event::source_changed("reports"))?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    coordinator.stop().await?;
    for (name, state) in coordinator.services() {
        println!("{name:>8}: {state}");
    }
    coordinator.dispose();
    Ok(())
}
