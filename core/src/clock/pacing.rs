//! Real-time pacing: wall clock access, fast-forward and diverted-wait sleeps

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::time::TimeSpec;

/// Real (non-deterministic) time source.
///
/// The virtual clock never returns these values to the program; they are
/// only used to pace frames for the human operator.
pub trait WallClock: Send + Sync {
    /// Monotonic time since an arbitrary origin
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `Instant` and `std::thread::sleep`
pub struct SystemWallClock {
    origin: Instant,
}

impl SystemWallClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemWallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemWallClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// How much real time a diverted wait still spends sleeping.
///
/// The real sleep is `min(requested * ratio, max)`, skipped entirely in
/// fast-forward. It has no effect on virtual time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelaySleepPolicy {
    /// Fraction of the requested wait performed for real (0.0 - 1.0)
    pub ratio: f64,
    /// Upper bound on a single real sleep
    pub max: Duration,
}

impl DelaySleepPolicy {
    /// Policy that never sleeps for real
    pub const NONE: Self = Self {
        ratio: 0.0,
        max: Duration::ZERO,
    };

    /// Real sleep to perform for a diverted wait of `requested`
    pub fn real_sleep(&self, requested: TimeSpec) -> Duration {
        requested.scale(self.ratio.clamp(0.0, 1.0)).to_duration().min(self.max)
    }
}

impl Default for DelaySleepPolicy {
    fn default() -> Self {
        Self {
            ratio: 1.0,
            max: Duration::from_millis(20),
        }
    }
}

/// Pacing knobs shared between the clock and the controller link.
///
/// Fast-forward is toggled from whichever thread talks to the controller,
/// so it lives outside the clock mutex.
#[derive(Debug, Default)]
pub struct PacingControl {
    fast_forward: AtomicBool,
    delay_sleep: Mutex<DelaySleepPolicy>,
}

impl PacingControl {
    pub fn new(fast_forward: bool, delay_sleep: DelaySleepPolicy) -> Self {
        Self {
            fast_forward: AtomicBool::new(fast_forward),
            delay_sleep: Mutex::new(delay_sleep),
        }
    }

    pub fn fast_forward(&self) -> bool {
        self.fast_forward.load(Ordering::Acquire)
    }

    pub fn set_fast_forward(&self, enabled: bool) {
        self.fast_forward.store(enabled, Ordering::Release);
    }

    pub fn delay_sleep(&self) -> DelaySleepPolicy {
        *self
            .delay_sleep
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_delay_sleep(&self, policy: DelaySleepPolicy) {
        *self
            .delay_sleep
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = policy;
    }
}
