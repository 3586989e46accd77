//! # Service abstraction and function-backed implementation.
//!
//! A [`Service`] is the business logic a unit drives through its lifecycle:
//! `start` when the controller leaves `Starting`, `stop` when it leaves
//! `Stopping`. [`ServiceFn`] wraps closures, producing a fresh future per call.
//!
//! The common handle type is [`ServiceRef`], an `Arc<dyn Service>`.
//!
//! ## Example
//! ```rust
//! use servisor::{ServiceContext, ServiceError, ServiceFn, ServiceRef};
//!
//! let svc: ServiceRef = ServiceFn::arc(|ctx: ServiceContext| async move {
//!     let token = ctx.token().clone();
//!     tokio::spawn(async move { token.cancelled().await });
//!     Ok::<_, ServiceError>(())
//! });
//! # let _ = svc;
//! ```

use std::future::{Future, Ready, ready};
use std::sync::Arc;

use async_trait::async_trait;

use super::context::ServiceContext;
use crate::error::ServiceError;

/// Asynchronous, stoppable service.
///
/// Both methods run on the owning unit's task; the unit processes no other
/// command until they return. Long-running work belongs in tasks spawned from
/// `start` that watch [`ServiceContext::token`].
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Brings the service up. `Err` faults the service.
    async fn start(&self, ctx: &ServiceContext) -> Result<(), ServiceError>;

    /// Brings the service down. `Err` faults the service.
    ///
    /// The context token is cancelled right after this returns.
    async fn stop(&self, ctx: &ServiceContext) -> Result<(), ServiceError> {
        let _ = ctx;
        Ok(())
    }
}

/// Shared handle to a service.
pub type ServiceRef = Arc<dyn Service>;

/// Constructs the service inside its unit. Runs on every create and re-create.
pub type ServiceBuilder =
    Arc<dyn Fn(&ServiceContext) -> Result<ServiceRef, ServiceError> + Send + Sync + 'static>;

type NoopStop = fn(ServiceContext) -> Ready<Result<(), ServiceError>>;

fn noop_stop(_ctx: ServiceContext) -> Ready<Result<(), ServiceError>> {
    ready(Ok(()))
}

/// Function-backed service.
///
/// `S` creates the start future, `T` the stop future; each call gets an owned
/// clone of the context.
pub struct ServiceFn<S, T = NoopStop> {
    start: S,
    stop: T,
}

impl<S> ServiceFn<S> {
    /// Creates a service from a start closure; stopping is a no-op.
    pub fn new(start: S) -> Self {
        Self {
            start,
            stop: noop_stop,
        }
    }

    /// Creates the service and returns it as a [`ServiceRef`].
    pub fn arc<Fut>(start: S) -> ServiceRef
    where
        S: Fn(ServiceContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        Arc::new(Self::new(start))
    }
}

impl<S, T> ServiceFn<S, T> {
    /// Replaces the stop closure.
    pub fn with_stop<U>(self, stop: U) -> ServiceFn<S, U> {
        ServiceFn {
            start: self.start,
            stop,
        }
    }
}

#[async_trait]
impl<S, SF, T, TF> Service for ServiceFn<S, T>
where
    S: Fn(ServiceContext) -> SF + Send + Sync + 'static,
    SF: Future<Output = Result<(), ServiceError>> + Send + 'static,
    T: Fn(ServiceContext) -> TF + Send + Sync + 'static,
    TF: Future<Output = Result<(), ServiceError>> + Send + 'static,
{
    async fn start(&self, ctx: &ServiceContext) -> Result<(), ServiceError> {
        (self.start)(ctx.clone()).await
    }

    async fn stop(&self, ctx: &ServiceContext) -> Result<(), ServiceError> {
        (self.stop)(ctx.clone()).await
    }
}
