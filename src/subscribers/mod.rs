//! # Observers of a coordinator's event channel.
//!
//! The coordinator forwards state changes, faults and stops to its
//! [`EventChannel`](crate::EventChannel). Subscribers registered with
//! [`CoordinatorBuilder::with_subscribers`](crate::CoordinatorBuilder::with_subscribers)
//! are fed from it by a listener task through a [`SubscriberSet`].
//!
//! ```text
//! Router ──► EventChannel ──► listener ──► SubscriberSet::emit(&Event)
//!                                            ├──► [queue] ─► LogWriter
//!                                            └──► [queue] ─► custom ...
//! ```

#[cfg(feature = "logging")]
mod embedded;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
