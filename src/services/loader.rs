//! # Loaders for dynamically created services.
//!
//! A [`LoaderSpec`] names *how* a service should be produced (`kind`, e.g.
//! `"directory"` or `"bootstrapper"`) and optionally *from where* (`source`).
//! The coordinator keeps a [`LoaderSet`] mapping kinds to [`ServiceLoader`]s;
//! locating and loading service code is entirely up to those collaborators.
//!
//! ```text
//! CreateDynamicService{ name, LoaderSpec{kind, source} }
//!        └─► LoaderSet::builder_for(spec) ──► ServiceBuilder
//!                 (runs inside the new unit)
//!                 ├─ kind registered ──► loader.load(ctx, spec)
//!                 └─ unknown kind    ──► Err(ServiceError::Loader) → Faulted
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use super::context::ServiceContext;
use super::service::{ServiceBuilder, ServiceRef};
use crate::error::ServiceError;

/// Identity of the loader that should produce a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderSpec {
    /// Loader kind; selects the registered [`ServiceLoader`].
    pub kind: Arc<str>,
    /// Loader-specific location (directory, bootstrapper id, ...).
    pub source: Option<Arc<str>>,
}

impl LoaderSpec {
    pub fn new(kind: impl Into<Arc<str>>) -> Self {
        Self {
            kind: kind.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Produces a service from a loader specification.
///
/// Called on the new unit's task, once per create (restarts load again).
pub trait ServiceLoader: Send + Sync + 'static {
    fn load(&self, ctx: &ServiceContext, spec: &LoaderSpec) -> Result<ServiceRef, ServiceError>;
}

impl<F> ServiceLoader for F
where
    F: Fn(&ServiceContext, &LoaderSpec) -> Result<ServiceRef, ServiceError> + Send + Sync + 'static,
{
    fn load(&self, ctx: &ServiceContext, spec: &LoaderSpec) -> Result<ServiceRef, ServiceError> {
        self(ctx, spec)
    }
}

/// Loaders by kind.
#[derive(Clone, Default)]
pub struct LoaderSet {
    loaders: HashMap<Arc<str>, Arc<dyn ServiceLoader>>,
}

impl LoaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the loader for `kind`.
    pub fn insert(&mut self, kind: impl Into<Arc<str>>, loader: Arc<dyn ServiceLoader>) {
        self.loaders.insert(kind.into(), loader);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn ServiceLoader>> {
        self.loaders.get(kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// Builder that loads the service through the loader registered for `spec.kind`.
    ///
    /// The lookup happens when the builder runs, so an unknown kind faults the
    /// service instead of failing the request.
    pub fn builder_for(&self, spec: LoaderSpec) -> ServiceBuilder {
        let loader = self.get(&spec.kind);
        Arc::new(move |ctx: &ServiceContext| match &loader {
            Some(loader) => loader.load(ctx, &spec),
            None => Err(ServiceError::Loader {
                kind: spec.kind.to_string(),
            }),
        })
    }
}
