//! Shared fixtures for unit tests.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::subscriber::DefaultGuard;

use crate::core::fault::FaultBoundary;
use crate::core::{CoordinatorHandle, LifecycleCell, Registry};
use crate::error::ServiceError;
use crate::events::{Bus, Event, EventTag, Handler, Subscription};
use crate::services::{
    Command, ServiceBuilder, ServiceContext, ServiceController, ServiceFn, ServiceState, ServiceUnit,
    UnitHandle,
};

/// Detached context for calling builders and loaders directly.
pub(crate) fn context(name: &str) -> ServiceContext {
    let name: Arc<str> = Arc::from(name);
    let (tx, _rx) = mpsc::channel(1);
    let (bus, _dispatcher) = Bus::new(None);
    ServiceContext::new(
        Arc::clone(&name),
        UnitHandle::new(name, tx),
        CoordinatorHandle::new(bus, Registry::new(), LifecycleCell::new()),
        CancellationToken::new(),
    )
}

/// Builder of no-op services that counts how often it ran.
pub(crate) fn counting_builder() -> (ServiceBuilder, Arc<AtomicUsize>) {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);
    let builder: ServiceBuilder = Arc::new(move |_ctx: &ServiceContext| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(ServiceFn::arc(|_ctx: ServiceContext| async {
            Ok::<_, ServiceError>(())
        }))
    });
    (builder, builds)
}

struct Recorder(mpsc::UnboundedSender<Event>);

#[async_trait]
impl Handler for Recorder {
    async fn handle(&self, event: &Event) {
        let _ = self.0.send(event.clone());
    }
}

/// Bus with a recording handler for every tag, for driving controllers directly.
pub(crate) struct Harness {
    bus: Bus,
    rx: mpsc::UnboundedReceiver<Event>,
    handle: CoordinatorHandle,
    inboxes: Vec<mpsc::Receiver<Command>>,
    token: CancellationToken,
    _subscription: Subscription,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let (bus, dispatcher) = Bus::new(None);
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = bus
            .subscribe_all(&EventTag::ALL, Arc::new(Recorder(tx)))
            .expect("fresh bus");
        let token = CancellationToken::new();
        tokio::spawn(dispatcher.run(token.clone()));

        let handle = CoordinatorHandle::new(bus.clone(), Registry::new(), LifecycleCell::new());
        Self {
            bus,
            rx,
            handle,
            inboxes: Vec::new(),
            token,
            _subscription: subscription,
        }
    }

    pub(crate) fn controller(&mut self, name: &str, builder: ServiceBuilder) -> ServiceController {
        let name: Arc<str> = Arc::from(name);
        let (tx, rx) = mpsc::channel(8);
        self.inboxes.push(rx);
        ServiceController::new(
            Arc::clone(&name),
            builder,
            UnitHandle::new(name, tx),
            self.handle.clone(),
            self.bus.clone(),
        )
    }

    /// Spawns a unit for `name` and returns its inbox handle.
    pub(crate) fn spawn_unit(
        &mut self,
        name: &str,
        builder: ServiceBuilder,
    ) -> (UnitHandle, JoinHandle<()>) {
        let name: Arc<str> = Arc::from(name);
        let (tx, rx) = mpsc::channel(8);
        let handle = UnitHandle::new(Arc::clone(&name), tx);
        let controller = ServiceController::new(
            name,
            builder,
            handle.clone(),
            self.handle.clone(),
            self.bus.clone(),
        );
        let unit = ServiceUnit::new(controller, rx, FaultBoundary);
        let join = tokio::spawn(unit.run(self.token.child_token()));
        (handle, join)
    }

    /// Every event delivered so far, waiting briefly for stragglers.
    pub(crate) async fn drain(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(Some(ev)) = tokio::time::timeout(Duration::from_millis(50), self.rx.recv()).await
        {
            out.push(ev);
        }
        out
    }

    /// States `name` went through, in order.
    pub(crate) async fn states(&mut self, name: &str) -> Vec<ServiceState> {
        self.drain()
            .await
            .into_iter()
            .filter(|ev| &*ev.service == name)
            .filter_map(|ev| ev.state())
            .collect()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// In-memory sink for `tracing` output.
#[derive(Clone, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Routes this thread's `tracing` output into a buffer until the guard drops.
pub(crate) fn capture_logs() -> (LogBuffer, DefaultGuard) {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}
