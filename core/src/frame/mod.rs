//! Frame boundary
//!
//! Brackets every present/swap call of the program. Entering advances
//! virtual time, applies controller flags, mixes one period of audio and
//! draws the HUD; the real draw then runs, and exiting sleeps off the rest
//! of the frame period.

mod stats;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use ticklock_shared::{RunFlags, WindowHandle};

use crate::audio::{AudioContext, AudioSink};
use crate::clock::{FrameRate, QueryKind, VirtualClock};
use crate::companion::{CompanionLink, WindowAnnouncer};
use crate::time::TimeSpec;

pub use stats::{FpsSample, FrameStats, format_title};

/// Frame layer configuration
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Frames between two fps samples
    pub stats_interval: u64,
    /// Warn when the program's work between two frames exceeds the frame period
    pub warn_over_budget: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            stats_interval: 60,
            warn_over_budget: true,
        }
    }
}

/// What the HUD callback is given
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HudInfo {
    pub frame: u64,
    pub ticks: TimeSpec,
    pub fps: Option<FpsSample>,
}

/// Outcome of one [`FrameBoundary::run`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    /// Virtual time after entering the frame
    pub ticks: TimeSpec,
    /// New fps sample, when this frame completed an interval
    pub fps: Option<FpsSample>,
    /// Audio frames mixed for this frame
    pub mixed_frames: usize,
}

struct AudioTick {
    context: Arc<AudioContext>,
    sink: Box<dyn AudioSink>,
}

/// Frame boundary driver, owned by the main thread.
pub struct FrameBoundary {
    clock: Arc<VirtualClock>,
    config: FrameConfig,
    audio: Option<AudioTick>,
    link: Option<Box<dyn CompanionLink>>,
    announcer: WindowAnnouncer,
    stats: FrameStats,
    flags: RunFlags,
    frame_counter: u64,
    last_exit_wall: Option<Duration>,
}

impl FrameBoundary {
    pub fn new(clock: Arc<VirtualClock>, config: FrameConfig) -> Self {
        let stats = FrameStats::new(config.stats_interval);
        Self {
            clock,
            config,
            audio: None,
            link: None,
            announcer: WindowAnnouncer::new(),
            stats,
            flags: RunFlags::default(),
            frame_counter: 0,
            last_exit_wall: None,
        }
    }

    /// Mix `context` once per frame and hand the result to `sink`.
    pub fn with_audio(mut self, context: Arc<AudioContext>, sink: Box<dyn AudioSink>) -> Self {
        self.audio = Some(AudioTick { context, sink });
        self
    }

    pub fn with_link(mut self, link: Box<dyn CompanionLink>) -> Self {
        self.link = Some(link);
        self
    }

    pub fn clock(&self) -> &Arc<VirtualClock> {
        &self.clock
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn flags(&self) -> &RunFlags {
        &self.flags
    }

    pub fn link_mut(&mut self) -> Option<&mut (dyn CompanionLink + 'static)> {
        self.link.as_deref_mut()
    }

    pub fn latest_fps(&self) -> Option<FpsSample> {
        self.stats.latest()
    }

    // =========================================================================
    // Window
    // =========================================================================

    pub fn window_created(&mut self) {
        self.announcer.window_created();
    }

    pub fn window_destroyed(&mut self) {
        self.announcer.window_destroyed();
    }

    /// Send the window identifier to the companion, once per window.
    pub fn announce_window(&mut self, handle: Option<WindowHandle>) {
        let Some(link) = self.link.as_deref_mut() else {
            return;
        };
        if let Err(e) = self.announcer.announce(link, handle) {
            warn!("Could not send the window id: {}", e);
        }
    }

    // =========================================================================
    // Flags
    // =========================================================================

    /// Apply a flag update from the controller.
    pub fn apply_run_flags(&mut self, flags: RunFlags) {
        let pacing = self.clock.pacing();
        if pacing.fast_forward() != flags.fast_forward {
            debug!("Fast-forward {}", if flags.fast_forward { "on" } else { "off" });
            pacing.set_fast_forward(flags.fast_forward);
        }

        match FrameRate::new(flags.framerate, flags.framerate_den) {
            Ok(rate) if rate != self.clock.frame_rate() => {
                debug!("Frame rate set to {}/{}", flags.framerate, flags.framerate_den);
                self.clock.set_frame_rate(rate);
            }
            Ok(_) => {}
            Err(e) => warn!("Ignoring frame rate from controller: {}", e),
        }

        self.flags = flags;
    }

    fn poll_link(&mut self) {
        let Some(link) = self.link.as_deref_mut() else {
            return;
        };
        let mut latest = None;
        while let Some(flags) = link.poll_flags() {
            latest = Some(flags);
        }
        if let Some(flags) = latest {
            self.apply_run_flags(flags);
        }
    }

    /// Hold the frame while the controller has playback paused.
    ///
    /// Only real time passes; the virtual clock stays where the frame entry
    /// left it. Pausing needs a live link to resume from, so without one (or
    /// once it closes) playback goes on.
    fn wait_while_paused(&mut self) {
        if self.flags.running {
            return;
        }
        debug!("Paused at frame {}", self.frame_counter);
        let period = self.clock.frame_rate().period().to_duration();
        while !self.flags.running {
            match self.link.as_deref() {
                Some(link) if !link.is_closed() => {}
                _ => {
                    warn!("No controller to resume from, unpausing");
                    self.flags.running = true;
                    break;
                }
            }
            self.clock.wall().sleep(period);
            self.poll_link();
        }
        debug!("Resumed at frame {}", self.frame_counter);
    }

    // =========================================================================
    // Frame
    // =========================================================================

    /// One frame without a HUD.
    pub fn run(&mut self, draw: impl FnOnce()) -> FrameReport {
        self.run_with_hud(draw, |_| {})
    }

    /// Enter, update flags (waiting out a pause), mix audio, draw the HUD, `draw`, exit.
    pub fn run_with_hud(&mut self, draw: impl FnOnce(), hud: impl FnOnce(&HudInfo)) -> FrameReport {
        self.check_budget();

        self.clock.enter_frame_boundary();
        self.frame_counter += 1;

        self.poll_link();
        self.wait_while_paused();

        let mixed_frames = match &mut self.audio {
            Some(tick) => {
                let audio = tick.context.mix_frame();
                let format = tick.context.output_format();
                tick.sink.push_samples(&audio, &format);
                audio.len() / format.channels.max(1) as usize
            }
            None => 0,
        };

        let ticks = self.clock.query(QueryKind::Untracked);
        let fps = self.stats.tick(self.clock.wall().now(), ticks);

        hud(&HudInfo {
            frame: self.frame_counter,
            ticks,
            fps: self.stats.latest(),
        });

        draw();

        self.clock.exit_frame_boundary();
        self.last_exit_wall = Some(self.clock.wall().now());

        FrameReport {
            frame: self.frame_counter,
            ticks,
            fps,
            mixed_frames,
        }
    }

    fn check_budget(&self) {
        if !self.config.warn_over_budget || self.clock.pacing().fast_forward() {
            return;
        }
        let Some(last_exit) = self.last_exit_wall else {
            return;
        };
        let work = self.clock.wall().now().saturating_sub(last_exit);
        let budget = self.clock.frame_rate().period().to_duration();
        if work > budget {
            warn!(
                "Frame {} took {:?}, exceeds budget of {:?}",
                self.frame_counter + 1,
                work,
                budget
            );
        }
    }
}
