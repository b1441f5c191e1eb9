//! Semaphore-based concurrency limiter backing each stage pool.
//!
//! Each pipeline stage gets its own limiter so an expensive phase cannot
//! starve the others. A permit is held for the duration of the stage's
//! work and released when dropped.
//!
//! ```ignore
//! let limiter = ConcurrencyLimiter::new(2, "downsample");
//! let _permit = limiter.acquire().await;
//! // work happens here; the permit is released at end of scope
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded pool of permits with in-flight tracking.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,

    /// Maximum permits (for stats/debugging)
    max_permits: usize,

    /// Current number of permits held
    in_flight: AtomicUsize,

    /// Peak concurrent permits observed
    peak_in_flight: AtomicUsize,

    /// Label for this limiter (e.g., "load", "encode")
    label: String,
}

impl ConcurrencyLimiter {
    /// Creates a limiter allowing `max_concurrent` permits at once.
    ///
    /// A limit of zero is raised to one so the stage can make progress.
    pub fn new(max_concurrent: usize, label: impl Into<String>) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_permits: max_concurrent,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            label: label.into(),
        }
    }

    /// Waits for a permit.
    ///
    /// Returns `None` only if the limiter has been closed.
    pub async fn acquire(&self) -> Option<ConcurrencyPermit<'_>> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;
        Some(self.track(permit))
    }

    /// Tries to acquire a permit without waiting.
    pub fn try_acquire(&self) -> Option<ConcurrencyPermit<'_>> {
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        Some(self.track(permit))
    }

    /// Closes the limiter; pending and future `acquire` calls return `None`.
    pub fn close(&self) {
        self.semaphore.close();
    }

    fn track(&self, permit: OwnedSemaphorePermit) -> ConcurrencyPermit<'_> {
        let current = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::Relaxed);
        ConcurrencyPermit {
            _permit: permit,
            in_flight: &self.in_flight,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_permits
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Highest number of permits held at once since creation.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// A held permit. Released on drop.
pub struct ConcurrencyPermit<'a> {
    _permit: OwnedSemaphorePermit,
    in_flight: &'a AtomicUsize,
}

impl Drop for ConcurrencyPermit<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
