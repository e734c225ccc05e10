//! Cooperative millisecond clock.
//!
//! The engine is driven entirely by the host page's event loop; every timer
//! is a deadline checked against this clock, not a sleeping thread. The fake
//! implementation makes debounce and dwell behavior deterministic in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of monotonic-enough milliseconds for deadlines and timestamps.
pub trait EngineClock {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u64;
}

/// Shared handle to a clock implementation.
pub type ClockHandle = Arc<dyn EngineClock>;

/// Wall-clock backed implementation.
#[derive(Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a shared system clock.
    #[must_use]
    pub fn handle() -> ClockHandle {
        Arc::new(Self)
    }
}

impl EngineClock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Fake clock for deterministic tests.
///
/// Time only moves when `advance` or `set` is called.
#[derive(Debug, Default)]
pub struct FakeClock {
    current_ms: AtomicU64,
}

impl FakeClock {
    /// Create a fake clock starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared fake clock starting at `start_ms`.
    #[must_use]
    pub fn handle_at(start_ms: u64) -> Arc<Self> {
        let clock = Self::new();
        clock.set(start_ms);
        Arc::new(clock)
    }

    /// Advance the clock by `delta_ms`.
    pub fn advance(&self, delta_ms: u64) {
        self.current_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, time_ms: u64) {
        self.current_ms.store(time_ms, Ordering::SeqCst);
    }
}

impl EngineClock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }
}
