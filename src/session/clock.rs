//! Millisecond clocks and the cancellable delayed task used for cooldowns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic millisecond time source.
pub trait Clock: Send {
    fn now_ms(&self) -> u64;
}

/// Wall clock measured from construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for deterministic timing tests and simulations.
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) -> u64 {
        self.now.fetch_add(ms, Ordering::SeqCst) + ms
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// At most one pending deadline. Polled from the owner's tick, so there is
/// no timer thread to cancel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DelayedTask {
    due_at: Option<u64>,
}

impl DelayedTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the task. Returns false (and keeps the existing deadline) when
    /// it is already pending.
    pub fn schedule(&mut self, due_at: u64) -> bool {
        if self.due_at.is_some() {
            return false;
        }
        self.due_at = Some(due_at);
        true
    }

    pub fn cancel(&mut self) -> bool {
        self.due_at.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.due_at.is_some()
    }

    pub fn due_at(&self) -> Option<u64> {
        self.due_at
    }

    /// Disarm and return true once `now_ms` reaches the deadline.
    pub fn take_if_due(&mut self, now_ms: u64) -> bool {
        match self.due_at {
            Some(due) if now_ms >= due => {
                self.due_at = None;
                true
            }
            _ => false,
        }
    }
}
