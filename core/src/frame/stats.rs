//! Real and logical frame rate

use std::time::Duration;

use crate::time::TimeSpec;

/// Frame rate measured over the last interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsSample {
    /// Against the wall clock
    pub fps: f32,
    /// Against virtual time
    pub lfps: f32,
}

/// Samples fps every `interval` frames.
pub struct FrameStats {
    interval: u64,
    frames: u64,
    baseline: Option<(Duration, TimeSpec)>,
    latest: Option<FpsSample>,
}

impl FrameStats {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            frames: 0,
            baseline: None,
            latest: None,
        }
    }

    pub fn latest(&self) -> Option<FpsSample> {
        self.latest
    }

    /// Count a frame. Returns a fresh sample when an interval completes.
    pub fn tick(&mut self, wall: Duration, ticks: TimeSpec) -> Option<FpsSample> {
        let Some((wall_start, ticks_start)) = self.baseline else {
            self.baseline = Some((wall, ticks));
            return None;
        };

        self.frames += 1;
        if self.frames < self.interval {
            return None;
        }

        let frames = self.frames as f64;
        let wall_secs = wall.saturating_sub(wall_start).as_secs_f64();
        let virtual_secs = (ticks - ticks_start).as_nanos() as f64 / 1e9;
        let rate = |secs: f64| if secs > 0.0 { (frames / secs) as f32 } else { 0.0 };

        let sample = FpsSample {
            fps: rate(wall_secs),
            lfps: rate(virtual_secs),
        };
        self.frames = 0;
        self.baseline = Some((wall, ticks));
        self.latest = Some(sample);
        Some(sample)
    }
}

/// Window title carrying both rates, e.g. `"Game (fps: 60.0 - lfps: 60.0)"`
pub fn format_title(base: &str, sample: &FpsSample) -> String {
    format!("{} (fps: {:.1} - lfps: {:.1})", base, sample.fps, sample.lfps)
}
