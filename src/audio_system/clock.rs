/// Tick sources
///
/// The engine reads milliseconds from a `Clock` to timestamp fades; the host
/// drives `AudioEngine::update` with the same time base.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic millisecond tick source
pub trait Clock: Send + Sync {
    /// Current tick value in milliseconds
    fn ticks(&self) -> u64;
}

/// Wall clock counting from construction
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn ticks(&self) -> u64 {
        // Never report 0: a zero reference tick means "not started"
        self.start.elapsed().as_millis() as u64 + 1
    }
}

/// Clock advanced explicitly by its owner
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move the clock forward by `ms`
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump to an absolute tick value
    pub fn set(&self, ticks: u64) {
        self.now.store(ticks, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn ticks(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
