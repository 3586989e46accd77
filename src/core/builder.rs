use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;

use super::config::CoordinatorConfig;
use super::coordinator::Coordinator;
use super::fault::install_panic_hook;
use crate::error::CoordinatorError;
use crate::services::{LoaderSet, ServiceLoader};
use crate::subscribers::Subscribe;

/// Lifecycle hook: runs on the caller of `start`/`stop` with the coordinator.
pub type Hook = Arc<dyn Fn(&Coordinator) -> anyhow::Result<()> + Send + Sync + 'static>;

/// Where a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    /// Before any unit is created.
    BeforeStart,
    /// After every startup service reached `Running`.
    AfterStart,
    /// After every service reached `Completed`.
    AfterStop,
}

impl HookStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookStage::BeforeStart => "before_start",
            HookStage::AfterStart => "after_start",
            HookStage::AfterStop => "after_stop",
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default, Clone)]
pub(crate) struct Hooks {
    before_start: Option<Hook>,
    after_start: Option<Hook>,
    after_stop: Option<Hook>,
}

impl Hooks {
    pub(crate) fn get(&self, stage: HookStage) -> Option<&Hook> {
        match stage {
            HookStage::BeforeStart => self.before_start.as_ref(),
            HookStage::AfterStart => self.after_start.as_ref(),
            HookStage::AfterStop => self.after_stop.as_ref(),
        }
    }
}

/// Builder for a [`Coordinator`].
///
/// ```rust
/// use servisor::{CoordinatorBuilder, CoordinatorConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), servisor::CoordinatorError> {
/// let coordinator = CoordinatorBuilder::new(CoordinatorConfig::default())
///     .after_start(|c| {
///         tracing::info!(services = c.services().len(), "ready");
///         Ok(())
///     })
///     .build()?;
/// coordinator.start().await?;
/// coordinator.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct CoordinatorBuilder {
    cfg: CoordinatorConfig,
    runtime: Option<Handle>,
    hooks: Hooks,
    loaders: LoaderSet,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl CoordinatorBuilder {
    pub fn new(cfg: CoordinatorConfig) -> Self {
        Self {
            cfg,
            runtime: None,
            hooks: Hooks::default(),
            loaders: LoaderSet::new(),
            subscribers: Vec::new(),
        }
    }

    /// Runtime that hosts the dispatcher, the units and the subscriber workers.
    ///
    /// Defaults to the runtime `build` is called from.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn before_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Coordinator) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.before_start = Some(Arc::new(hook));
        self
    }

    pub fn after_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Coordinator) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.after_start = Some(Arc::new(hook));
        self
    }

    /// Runs only when shutdown completed within the timeout.
    pub fn after_stop<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Coordinator) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.after_stop = Some(Arc::new(hook));
        self
    }

    /// Registers the loader used for `CreateDynamicService` requests of `kind`.
    pub fn with_loader<L>(mut self, kind: impl Into<Arc<str>>, loader: L) -> Self
    where
        L: ServiceLoader,
    {
        self.loaders.insert(kind, Arc::new(loader));
        self
    }

    /// Sets observers fed from the event channel.
    ///
    /// Each subscriber gets its own worker and bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the coordinator.
    ///
    /// Fails with a configuration error when no runtime was given and `build`
    /// is not called from within one. Installs the process panic hook
    /// ([`install_panic_hook`]) on first use.
    pub fn build(self) -> Result<Arc<Coordinator>, CoordinatorError> {
        let runtime = match self.runtime {
            Some(rt) => rt,
            None => Handle::try_current().map_err(|_| {
                CoordinatorError::configuration(
                    "no tokio runtime available; call build() inside a runtime or use with_runtime()",
                )
            })?,
        };
        install_panic_hook();
        Ok(Arc::new(Coordinator::new_internal(
            self.cfg,
            runtime,
            self.hooks,
            self.loaders,
            self.subscribers,
        )))
    }
}
