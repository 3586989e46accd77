use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a coordinator. Strictly linear.
///
/// ```text
/// NotStarted ──start()──► Starting ──start() returns──► Started ──stop()──► Stopping ──dispose()──► Disposed
/// ```
///
/// `Starting` covers the whole startup barrier: requests are accepted but
/// `stop` is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    NotStarted = 0,
    Starting = 1,
    Started = 2,
    Stopping = 3,
    Disposed = 4,
}

impl Lifecycle {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Starting,
            2 => Self::Started,
            3 => Self::Stopping,
            _ => Self::Disposed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Disposed => "disposed",
        }
    }

    /// True while requests may be sent to the coordinator.
    #[inline]
    pub fn accepts_requests(&self) -> bool {
        matches!(self, Self::Starting | Self::Started | Self::Stopping)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared atomic lifecycle cell.
#[derive(Debug, Clone)]
pub(crate) struct LifecycleCell(Arc<AtomicU8>);

impl LifecycleCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(Lifecycle::NotStarted as u8)))
    }

    pub(crate) fn get(&self) -> Lifecycle {
        Lifecycle::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves `from → to`; returns the actual state on mismatch.
    pub(crate) fn advance(&self, from: Lifecycle, to: Lifecycle) -> Result<(), Lifecycle> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(Lifecycle::from_u8)
    }

    pub(crate) fn set(&self, to: Lifecycle) {
        self.0.store(to as u8, Ordering::Release);
    }

    /// Moves `NotStarted → Starting`; the guard moves on to `Started` when dropped.
    pub(crate) fn begin_start(&self) -> Result<StartingGuard<'_>, Lifecycle> {
        self.advance(Lifecycle::NotStarted, Lifecycle::Starting)?;
        Ok(StartingGuard(self))
    }
}

/// Ends the `Starting` phase however `start` returns (or is dropped).
pub(crate) struct StartingGuard<'a>(&'a LifecycleCell);

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        // Disposed while starting: leave it disposed.
        let _ = self.0.advance(Lifecycle::Starting, Lifecycle::Started);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_linear() {
        let cell = LifecycleCell::new();
        assert_eq!(cell.get(), Lifecycle::NotStarted);
        assert!(!cell.get().accepts_requests());

        cell.advance(Lifecycle::NotStarted, Lifecycle::Starting).unwrap();
        assert!(cell.get().accepts_requests());
        assert_eq!(
            cell.advance(Lifecycle::Started, Lifecycle::Stopping),
            Err(Lifecycle::Starting)
        );
        cell.advance(Lifecycle::Starting, Lifecycle::Started).unwrap();
        assert_eq!(
            cell.advance(Lifecycle::NotStarted, Lifecycle::Starting),
            Err(Lifecycle::Started)
        );

        cell.advance(Lifecycle::Started, Lifecycle::Stopping).unwrap();
        assert!(cell.get().accepts_requests());
        cell.set(Lifecycle::Disposed);
        assert_eq!(cell.get().to_string(), "disposed");
    }

    #[test]
    fn starting_guard_ends_startup_on_drop() {
        let cell = LifecycleCell::new();
        let guard = cell.begin_start().unwrap();
        assert_eq!(cell.get(), Lifecycle::Starting);
        assert_eq!(cell.begin_start().err(), Some(Lifecycle::Starting));
        drop(guard);
        assert_eq!(cell.get(), Lifecycle::Started);

        let cell = LifecycleCell::new();
        let guard = cell.begin_start().unwrap();
        cell.set(Lifecycle::Disposed);
        drop(guard);
        assert_eq!(cell.get(), Lifecycle::Disposed);
    }
}
