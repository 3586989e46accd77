use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::*;
use crate::error::{CoordinatorError, ServiceError};
use crate::events::{Event, EventKind, EventTag};
use crate::services::{LoaderSpec, ServiceContext, ServiceFn, ServiceRef, ServiceState};

fn config(timeout: Duration) -> CoordinatorConfig {
    CoordinatorConfig {
        timeout,
        poll_interval: Duration::from_millis(20),
        ..CoordinatorConfig::default()
    }
}

fn coordinator(timeout: Duration) -> Arc<Coordinator> {
    CoordinatorBuilder::new(config(timeout)).build().unwrap()
}

fn ok_service(_ctx: &ServiceContext) -> Result<ServiceRef, ServiceError> {
    Ok(ServiceFn::arc(|_ctx: ServiceContext| async {
        Ok::<_, ServiceError>(())
    }))
}

fn failing_service(_ctx: &ServiceContext) -> Result<ServiceRef, ServiceError> {
    Err(ServiceError::fail("missing configuration"))
}

async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn start_and_stop_walk_every_service_through_its_lifecycle() {
    let c = coordinator(Duration::from_secs(5));
    for name in ["a", "b", "c"] {
        c.create_service(name, ok_service).unwrap();
    }

    c.start().await.unwrap();
    assert_eq!(c.lifecycle(), Lifecycle::Started);
    for (_, state) in c.services() {
        assert_eq!(state, ServiceState::Running);
    }

    c.stop().await.unwrap();
    assert_eq!(c.lifecycle(), Lifecycle::Stopping);
    assert_eq!(
        c.services(),
        vec![
            (Arc::<str>::from("a"), ServiceState::Completed),
            (Arc::<str>::from("b"), ServiceState::Completed),
            (Arc::<str>::from("c"), ServiceState::Completed),
        ]
    );
}

#[tokio::test]
async fn start_returns_as_soon_as_services_run() {
    let c = coordinator(Duration::from_secs(5));
    c.create_service("a", ok_service).unwrap();
    c.create_service("b", ok_service).unwrap();

    let started = Instant::now();
    c.start().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn start_without_services_succeeds() {
    let c = coordinator(Duration::from_secs(5));
    c.start().await.unwrap();
    c.stop().await.unwrap();
}

#[tokio::test]
async fn builder_fault_aborts_startup_immediately() {
    let c = coordinator(Duration::from_secs(5));
    c.create_service("a", ok_service).unwrap();
    c.create_service("b", ok_service).unwrap();
    c.create_service("c", failing_service).unwrap();

    let started = Instant::now();
    let err = c.start().await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(1));
    match err {
        CoordinatorError::StartupFault { service } => assert_eq!(service, "c"),
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(c.state_of("c"), Some(ServiceState::Faulted));
}

#[tokio::test]
async fn panicking_builder_faults_the_service_not_the_coordinator() {
    let c = coordinator(Duration::from_secs(5));
    let mut rx = c.subscribe();
    c.create_service(
        "boom",
        |_ctx: &ServiceContext| -> Result<ServiceRef, ServiceError> { panic!("builder exploded") },
    )
    .unwrap();

    let err = c.start().await.unwrap_err();
    assert_eq!(err.as_label(), "startup_fault");
    assert_eq!(c.state_of("boom"), Some(ServiceState::Faulted));

    loop {
        let ev = rx.recv().await.unwrap();
        if let EventKind::ServiceFault { label, cause } = &ev.kind {
            assert_eq!(*label, "service_unhandled");
            assert!(cause.contains("builder exploded"));
            break;
        }
    }
}

#[tokio::test]
async fn slow_service_times_out_startup() {
    let c = coordinator(Duration::from_millis(200));
    c.create_service("fast", ok_service).unwrap();
    c.create_service("slow", |_ctx: &ServiceContext| {
        Ok(ServiceFn::arc(|_ctx: ServiceContext| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, ServiceError>(())
        }))
    })
    .unwrap();

    match c.start().await.unwrap_err() {
        CoordinatorError::StartupTimeout { timeout, pending } => {
            assert_eq!(timeout, Duration::from_millis(200));
            assert_eq!(pending, vec!["slow".to_string()]);
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(c.state_of("slow"), Some(ServiceState::Starting));
}

#[tokio::test]
async fn hanging_stop_times_out_and_skips_after_stop_hook() {
    let hook_ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&hook_ran);
    let c = CoordinatorBuilder::new(config(Duration::from_millis(300)))
        .after_stop(move |_c| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .build()
        .unwrap();

    c.create_service("ok", ok_service).unwrap();
    c.create_service("hang", |_ctx: &ServiceContext| {
        let svc = ServiceFn::new(|_ctx: ServiceContext| async { Ok::<_, ServiceError>(()) })
            .with_stop(|_ctx: ServiceContext| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, ServiceError>(())
            });
        Ok(Arc::new(svc) as ServiceRef)
    })
    .unwrap();
    c.start().await.unwrap();

    match c.stop().await.unwrap_err() {
        CoordinatorError::ShutdownTimeout { stuck, .. } => assert_eq!(stuck, vec!["hang".to_string()]),
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(c.state_of("ok"), Some(ServiceState::Completed));
    assert_eq!(c.state_of("hang"), Some(ServiceState::Stopping));
    assert!(!hook_ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn failing_stop_still_completes_through_fault_routing() {
    let c = coordinator(Duration::from_secs(5));
    let mut rx = c.subscribe();
    c.create_service("flaky", |_ctx: &ServiceContext| {
        let svc = ServiceFn::new(|_ctx: ServiceContext| async { Ok::<_, ServiceError>(()) })
            .with_stop(|_ctx: ServiceContext| async {
                Err::<(), _>(ServiceError::fail("flush failed"))
            });
        Ok(Arc::new(svc) as ServiceRef)
    })
    .unwrap();
    c.start().await.unwrap();

    c.stop().await.unwrap();
    assert_eq!(c.state_of("flaky"), Some(ServiceState::Completed));

    let mut states = Vec::new();
    while states.last() != Some(&ServiceState::Completed) {
        let ev = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        if let Some(state) = ev.state() {
            states.push(state);
        }
    }
    assert!(states.ends_with(&[
        ServiceState::Stopping,
        ServiceState::Faulted,
        ServiceState::Completed
    ]));
}

#[tokio::test]
async fn faulted_service_is_unloaded_on_stop() {
    let c = coordinator(Duration::from_secs(5));
    c.create_service("bad", failing_service).unwrap();
    assert!(c.start().await.is_err());

    c.stop().await.unwrap();
    assert_eq!(c.state_of("bad"), Some(ServiceState::Completed));
}

#[tokio::test]
async fn send_requires_a_started_coordinator() {
    let c = coordinator(Duration::from_secs(5));
    let err = c.send(Event::source_changed("a")).unwrap_err();
    assert_eq!(err.as_label(), "configuration");

    let err = c.stop().await.unwrap_err();
    assert_eq!(err.as_label(), "configuration");
}

#[tokio::test]
async fn start_may_only_be_called_once() {
    let c = coordinator(Duration::from_secs(5));
    c.start().await.unwrap();
    let err = c.start().await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Configuration { .. }));

    let err = c.create_service("late", ok_service).unwrap_err();
    assert!(err.to_string().contains("CreateDynamicService"));
}

#[tokio::test]
async fn duplicate_declaration_is_rejected() {
    let c = coordinator(Duration::from_secs(5));
    c.create_service("a", ok_service).unwrap();
    assert!(c.create_service("a", ok_service).is_err());
}

#[tokio::test]
async fn source_change_restarts_registered_service() {
    let c = coordinator(Duration::from_secs(5));
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);
    c.create_service("a", move |ctx: &ServiceContext| {
        counter.fetch_add(1, Ordering::SeqCst);
        ok_service(ctx)
    })
    .unwrap();
    c.start().await.unwrap();
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    c.send(Event::source_changed("a")).unwrap();
    eventually("restart", || builds.load(Ordering::SeqCst) == 2).await;
    eventually("running", || c.state_of("a") == Some(ServiceState::Running)).await;
    assert_eq!(c.services().len(), 1);
}

#[tokio::test]
async fn source_change_for_unknown_service_creates_it_with_default_loader() {
    let loads = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&loads);
    let c = CoordinatorBuilder::new(config(Duration::from_secs(5)))
        .with_loader(
            "directory",
            move |ctx: &ServiceContext, spec: &LoaderSpec| -> Result<ServiceRef, ServiceError> {
                seen.lock().unwrap().push(spec.kind.to_string());
                ok_service(ctx)
            },
        )
        .build()
        .unwrap();
    c.start().await.unwrap();

    c.send(Event::source_changed("x")).unwrap();
    eventually("dynamic x", || c.state_of("x") == Some(ServiceState::Running)).await;
    assert_eq!(*loads.lock().unwrap(), vec!["directory".to_string()]);

    // Second change restarts the existing unit instead of creating another one.
    c.send(Event::source_changed("x")).unwrap();
    eventually("reload", || loads.lock().unwrap().len() == 2).await;
    assert_eq!(c.services().len(), 1);

    c.stop().await.unwrap();
    assert_eq!(c.state_of("x"), Some(ServiceState::Completed));
}

#[tokio::test]
async fn unknown_loader_kind_faults_dynamic_service() {
    let c = coordinator(Duration::from_secs(5));
    let mut rx = c.subscribe();
    c.start().await.unwrap();

    c.send(Event::create_dynamic("plugin", LoaderSpec::new("assembly")))
        .unwrap();
    loop {
        let ev = rx.recv().await.unwrap();
        if ev.tag() == EventTag::ServiceFault {
            assert_eq!(&*ev.service, "plugin");
            assert!(ev.cause().unwrap().contains("assembly"));
            break;
        }
    }
    assert_eq!(c.state_of("plugin"), Some(ServiceState::Faulted));
}

#[tokio::test]
async fn duplicate_dynamic_creation_keeps_first_unit() {
    let c = CoordinatorBuilder::new(config(Duration::from_secs(5)))
        .with_loader(
            "directory",
            |ctx: &ServiceContext, _spec: &LoaderSpec| -> Result<ServiceRef, ServiceError> {
                ok_service(ctx)
            },
        )
        .build()
        .unwrap();
    c.create_service("web", ok_service).unwrap();
    c.start().await.unwrap();

    c.send(Event::create_dynamic("web", LoaderSpec::new("directory")))
        .unwrap();
    c.send(Event::create_dynamic("api", LoaderSpec::new("directory")))
        .unwrap();
    eventually("api", || c.state_of("api") == Some(ServiceState::Running)).await;
    assert_eq!(c.services().len(), 2);
    assert_eq!(c.state_of("web"), Some(ServiceState::Running));
}

#[tokio::test]
async fn restart_requested_during_startup_is_deferred() {
    let c = coordinator(Duration::from_secs(5));
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);
    c.create_service("self-reload", move |_ctx: &ServiceContext| {
        let first = counter.fetch_add(1, Ordering::SeqCst) == 0;
        Ok(ServiceFn::arc(move |ctx: ServiceContext| async move {
            if first {
                ctx.coordinator()
                    .send(Event::source_changed(ctx.name()))
                    .map_err(|e| ServiceError::fail(e.to_string()))?;
            }
            Ok::<_, ServiceError>(())
        }))
    })
    .unwrap();

    c.start().await.unwrap();
    eventually("deferred restart", || builds.load(Ordering::SeqCst) == 2).await;
    eventually("running", || {
        c.state_of("self-reload") == Some(ServiceState::Running)
    })
    .await;
}

#[tokio::test]
async fn hooks_run_in_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (a, b, d) = (Arc::clone(&calls), Arc::clone(&calls), Arc::clone(&calls));
    let c = CoordinatorBuilder::new(config(Duration::from_secs(5)))
        .before_start(move |c| {
            assert!(c.services().is_empty());
            a.lock().unwrap().push(HookStage::BeforeStart);
            Ok(())
        })
        .after_start(move |c| {
            assert_eq!(c.state_of("a"), Some(ServiceState::Running));
            b.lock().unwrap().push(HookStage::AfterStart);
            Ok(())
        })
        .after_stop(move |_c| {
            d.lock().unwrap().push(HookStage::AfterStop);
            Ok(())
        })
        .build()
        .unwrap();
    c.create_service("a", ok_service).unwrap();

    c.start().await.unwrap();
    c.stop().await.unwrap();
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            HookStage::BeforeStart,
            HookStage::AfterStart,
            HookStage::AfterStop
        ]
    );
}

#[tokio::test]
async fn failing_hook_surfaces_as_hook_error() {
    let c = CoordinatorBuilder::new(config(Duration::from_secs(5)))
        .before_start(|_c| Err(anyhow::anyhow!("database unreachable")))
        .build()
        .unwrap();
    c.create_service("a", ok_service).unwrap();

    match c.start().await.unwrap_err() {
        CoordinatorError::Hook { stage, source } => {
            assert_eq!(stage, HookStage::BeforeStart);
            assert_eq!(source.to_string(), "database unreachable");
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(c.state_of("a"), None);

    let err = c.create_service("b", ok_service).unwrap_err();
    assert_eq!(err.as_label(), "configuration");
    assert_eq!(c.lifecycle(), Lifecycle::Started);
    c.stop().await.unwrap();
}

#[tokio::test]
async fn dispose_releases_subscription_once() {
    let c = coordinator(Duration::from_secs(5));
    c.create_service("a", ok_service).unwrap();
    c.start().await.unwrap();
    assert_eq!(c.bus().handler_count(), EventTag::ALL.len());

    assert!(c.dispose());
    assert_eq!(c.bus().handler_count(), 0);
    assert!(c.services().is_empty());
    assert_eq!(c.lifecycle(), Lifecycle::Disposed);

    assert!(!c.dispose());
    assert!(c.send(Event::source_changed("a")).is_err());
}

#[tokio::test]
async fn services_reach_coordinator_through_their_context() {
    let c = coordinator(Duration::from_secs(5));
    let seen = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&seen);
    c.create_service("probe", move |_ctx: &ServiceContext| {
        let slot = Arc::clone(&slot);
        Ok(ServiceFn::arc(move |ctx: ServiceContext| {
            let slot = Arc::clone(&slot);
            async move {
                *slot.lock().unwrap() = Some(ctx.coordinator().lifecycle());
                Ok::<_, ServiceError>(())
            }
        }))
    })
    .unwrap();

    c.start().await.unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(Lifecycle::Starting));
    assert_eq!(c.lifecycle(), Lifecycle::Started);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn built_with_explicit_runtime_handle() {
    let c = CoordinatorBuilder::new(config(Duration::from_secs(5)))
        .with_runtime(tokio::runtime::Handle::current())
        .build()
        .unwrap();
    for i in 0..16 {
        c.create_service(format!("svc-{i}"), ok_service).unwrap();
    }
    c.start().await.unwrap();
    c.stop().await.unwrap();
    assert!(
        c.services()
            .iter()
            .all(|(_, s)| *s == ServiceState::Completed)
    );
}

#[test]
fn build_outside_runtime_is_a_configuration_error() {
    let err = CoordinatorBuilder::new(CoordinatorConfig::default())
        .build()
        .err()
        .unwrap();
    assert_eq!(err.as_label(), "configuration");
}

#[tokio::test]
async fn stop_is_rejected_while_start_is_in_flight() {
    let c = coordinator(Duration::from_secs(5));
    c.create_service("slow", |_ctx: &ServiceContext| {
        Ok(ServiceFn::arc(|_ctx: ServiceContext| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok::<_, ServiceError>(())
        }))
    })
    .unwrap();

    let starter = {
        let c = Arc::clone(&c);
        tokio::spawn(async move { c.start().await })
    };
    eventually("starting", || c.lifecycle() == Lifecycle::Starting).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = c.stop().await.unwrap_err();
    assert_eq!(err.as_label(), "configuration");
    assert!(err.to_string().contains("starting"));

    starter.await.unwrap().unwrap();
    assert_eq!(c.lifecycle(), Lifecycle::Started);
    assert_eq!(c.state_of("slow"), Some(ServiceState::Running));

    c.stop().await.unwrap();
    assert_eq!(c.state_of("slow"), Some(ServiceState::Completed));
}

#[tokio::test]
async fn unbounded_timeout_does_not_overflow_the_deadline() {
    let c = coordinator(Duration::MAX);
    c.create_service("a", ok_service).unwrap();

    c.start().await.unwrap();
    c.stop().await.unwrap();
    assert_eq!(c.state_of("a"), Some(ServiceState::Completed));
}

fn loader_coordinator(builds: &Arc<AtomicUsize>) -> Arc<Coordinator> {
    let counter = Arc::clone(builds);
    CoordinatorBuilder::new(config(Duration::from_secs(5)))
        .with_loader(
            "directory",
            move |ctx: &ServiceContext, _spec: &LoaderSpec| -> Result<ServiceRef, ServiceError> {
                counter.fetch_add(1, Ordering::SeqCst);
                ok_service(ctx)
            },
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn requests_queued_behind_stop_are_ignored() {
    let builds = Arc::new(AtomicUsize::new(0));
    let c = loader_coordinator(&builds);
    c.create_service("a", ok_service).unwrap();
    c.start().await.unwrap();

    // Both requests reach the router only after stop() moved to Stopping.
    c.send(Event::create_dynamic("late", LoaderSpec::new("directory")))
        .unwrap();
    c.send(Event::source_changed("a")).unwrap();
    c.stop().await.unwrap();

    assert_eq!(c.state_of("late"), None);
    assert_eq!(c.state_of("a"), Some(ServiceState::Completed));
    assert_eq!(builds.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dynamic_creation_racing_stop_never_blocks_shutdown() {
    for round in 0..20 {
        let builds = Arc::new(AtomicUsize::new(0));
        let c = loader_coordinator(&builds);
        c.create_service("a", ok_service).unwrap();
        c.start().await.unwrap();

        c.send(Event::create_dynamic("late", LoaderSpec::new("directory")))
            .unwrap();
        for _ in 0..round % 4 {
            tokio::task::yield_now().await;
        }
        c.stop().await.unwrap();

        match c.state_of("late") {
            None | Some(ServiceState::Completed) => {}
            other => panic!("round {round}: late service left in {other:?}"),
        }
        assert!(
            c.services()
                .iter()
                .all(|(_, s)| *s == ServiceState::Completed)
        );
    }
}
