//! Shared test utilities for integration and unit tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ticklock_shared::{RunFlags, WindowHandle};

use crate::audio::{AudioBuffer, SampleData};
use crate::clock::{ClockConfig, DelaySleepPolicy, PacingControl, VirtualClock, WallClock};
use crate::companion::{CompanionError, CompanionLink};

// ============================================================================
// Manual Wall Clock
// ============================================================================

/// Wall clock that only moves when told to (or when slept on).
#[derive(Default)]
pub struct ManualWallClock {
    inner: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    sleeps: Vec<Duration>,
}

impl ManualWallClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate work taking `d` of real time.
    pub fn advance(&self, d: Duration) {
        self.inner.lock().unwrap().now += d;
    }

    /// Every sleep requested so far
    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner.lock().unwrap().sleeps.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl WallClock for ManualWallClock {
    fn now(&self) -> Duration {
        self.inner.lock().unwrap().now
    }

    fn sleep(&self, duration: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.now += duration;
        inner.sleeps.push(duration);
    }
}

/// Clock at 60 fps over a manual wall clock, with real delay sleeps disabled.
pub fn manual_clock() -> (Arc<VirtualClock>, Arc<ManualWallClock>) {
    manual_clock_with(ClockConfig::default(), DelaySleepPolicy::NONE)
}

pub fn manual_clock_with(
    config: ClockConfig,
    delay_sleep: DelaySleepPolicy,
) -> (Arc<VirtualClock>, Arc<ManualWallClock>) {
    let wall = Arc::new(ManualWallClock::new());
    let pacing = Arc::new(PacingControl::new(false, delay_sleep));
    let clock = Arc::new(VirtualClock::new(config, wall.clone(), pacing));
    (clock, wall)
}

// ============================================================================
// Recording Companion Link
// ============================================================================

/// Companion link that remembers what was sent and replays queued flags.
#[derive(Default)]
pub struct RecordingLink {
    pub sent_window_ids: Vec<WindowHandle>,
    pub pending_flags: Vec<RunFlags>,
}

impl CompanionLink for RecordingLink {
    fn send_window_id(&mut self, handle: WindowHandle) -> Result<(), CompanionError> {
        self.sent_window_ids.push(handle);
        Ok(())
    }

    fn poll_flags(&mut self) -> Option<RunFlags> {
        if self.pending_flags.is_empty() {
            None
        } else {
            Some(self.pending_flags.remove(0))
        }
    }
}

// ============================================================================
// Sample Buffers
// ============================================================================

/// Mono S16 buffer holding `len` copies of `value`
pub fn constant_s16(id: u32, value: i16, len: usize, frequency: u32) -> AudioBuffer {
    AudioBuffer::new(id, SampleData::S16(vec![value; len]), 1, frequency)
}

/// Mono S16 buffer whose sample `i` equals `i` (handy for checking positions)
pub fn ramp_s16(id: u32, len: usize, frequency: u32) -> AudioBuffer {
    let data = (0..len).map(|i| i as i16).collect();
    AudioBuffer::new(id, SampleData::S16(data), 1, frequency)
}
