//! # Coordinator configuration.
//!
//! Provides [`CoordinatorConfig`], the settings shared by the barriers, the
//! unit factory and the event channel.
//!
//! ## Sentinel values
//! - `poll_interval = 0s` → default interval (1s)
//! - `inbox_capacity = 0` / `channel_capacity = 0` → clamped to 1
//! - `timeout` too large to add to the current instant → deadline saturates
//!   roughly 30 years out (`Duration::MAX` means "no practical deadline")

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Longest time a barrier sleeps between re-evaluations.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Deadline offset used when `timeout` overflows the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Configuration of a [`Coordinator`](crate::Coordinator).
///
/// ## Field semantics
/// - `timeout`: deadline of each barrier (startup and shutdown)
/// - `poll_interval`: barrier re-evaluation period, clamped to at most 1s
/// - `inbox_capacity`: bounded command queue length per unit
/// - `channel_capacity`: ring buffer size of the external event channel
/// - `default_loader`: loader kind used for implicit dynamic creation
///
/// ## Notes
/// All fields are public. Prefer the `*_clamped` accessors over reading them
/// directly.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Deadline applied to the startup and the shutdown barrier.
    ///
    /// `start` fails with `StartupTimeout` and `stop` with `ShutdownTimeout`
    /// when it is exceeded.
    pub timeout: Duration,

    /// How often a barrier re-checks its condition without being woken.
    pub poll_interval: Duration,

    /// Capacity of every unit's command inbox.
    pub inbox_capacity: usize,

    /// Capacity of the external event channel.
    ///
    /// Observers lagging by more than this many events skip the oldest ones.
    pub channel_capacity: usize,

    /// Loader kind used when a source change names an unknown service.
    pub default_loader: Arc<str>,
}

impl CoordinatorConfig {
    /// Returns the barrier poll interval, never above [`MAX_POLL_INTERVAL`].
    #[inline]
    pub fn poll_interval_clamped(&self) -> Duration {
        if self.poll_interval.is_zero() {
            MAX_POLL_INTERVAL
        } else {
            self.poll_interval.min(MAX_POLL_INTERVAL)
        }
    }

    /// Barrier deadline for a wait starting at `now`.
    ///
    /// Never panics: an unrepresentable `now + timeout` saturates to a far
    /// future instant.
    pub fn deadline_from(&self, now: Instant) -> Instant {
        now.checked_add(self.timeout)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now)
    }

    #[inline]
    pub fn inbox_capacity_clamped(&self) -> usize {
        self.inbox_capacity.max(1)
    }

    #[inline]
    pub fn channel_capacity_clamped(&self) -> usize {
        self.channel_capacity.max(1)
    }
}

impl Default for CoordinatorConfig {
    /// Default configuration:
    ///
    /// - `timeout = 60s`
    /// - `poll_interval = 1s`
    /// - `inbox_capacity = 64`
    /// - `channel_capacity = 1024`
    /// - `default_loader = "directory"`
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            poll_interval: MAX_POLL_INTERVAL,
            inbox_capacity: 64,
            channel_capacity: 1024,
            default_loader: Arc::from("directory"),
        }
    }
}
