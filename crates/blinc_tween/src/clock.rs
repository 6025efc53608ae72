//! Time sources
//!
//! The engine never reads a clock on its own. Every tween and the manager
//! are handed a shared [`Clock`] and ask it for `now()` (seconds, monotonic).
//!
//! Two clock domains exist:
//! - **live**: the realtime frame clock. Killed pooled tweens are recycled.
//! - **preview**: an editor/tooling clock driven by explicit seeks. Pooling
//!   is bypassed so scrubbing never hands instances back to the pool.

use std::cell::Cell;
use std::time::Instant;

/// A monotonic time source measured in seconds
pub trait Clock {
    /// Current time in seconds
    fn now(&self) -> f64;

    /// Whether this clock drives the live runtime (as opposed to a preview)
    fn is_live(&self) -> bool {
        true
    }
}

/// Wall clock backed by [`Instant`], zeroed at construction
#[derive(Clone, Copy, Debug)]
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
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to
///
/// Used for deterministic tests and for preview contexts where a timeline
/// head is positioned by hand.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
    preview: bool,
}

impl ManualClock {
    /// A manual clock in the live domain, starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// A manual clock in the preview domain (pooling bypassed)
    pub fn preview() -> Self {
        Self {
            now: Cell::new(0.0),
            preview: true,
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }

    /// Move forward by `seconds`
    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }

    fn is_live(&self) -> bool {
        !self.preview
    }
}
