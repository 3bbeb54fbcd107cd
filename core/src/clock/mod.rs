//! Deterministic virtual clock
//!
//! The program never sees real time. Every time query returns the virtual
//! tick value, which only moves forward when the main thread enters a frame
//! boundary (or when the anti-freeze heuristic forces it to). Real time is
//! used for one thing only: sleeping at frame exit so a human sees the game
//! run at its nominal speed.
//!
//! Calling [`VirtualClock::enter_frame_boundary`] and
//! [`VirtualClock::query`] in the same order always yields the same values,
//! independently of CPU speed or the system clock.

mod pacing;


use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, warn};

use crate::time::{NANOS_PER_SEC, TimeSpec};
use crate::trace::DeterminismTrace;

pub use pacing::{DelaySleepPolicy, PacingControl, SystemWallClock, WallClock};

/// Number of tracked query kinds
pub const TRACKED_KINDS: usize = 6;

/// Which time-getting entry point issued a query.
///
/// Tracked kinds count consecutive calls and trigger a forced advance when
/// polled too often without a frame boundary. `Untracked` is for internal
/// computations (e.g. converting absolute deadlines) and never advances time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Untracked,
    /// `time()`
    Time,
    /// `gettimeofday()`
    GetTimeOfDay,
    /// `clock()`
    Clock,
    /// `clock_gettime()`
    ClockGetTime,
    /// Millisecond tick counters (`SDL_GetTicks`)
    GetTicks,
    /// High-resolution counters (`SDL_GetPerformanceCounter`)
    PerformanceCounter,
}

impl QueryKind {
    /// All tracked kinds, in counter order
    pub const TRACKED: [QueryKind; TRACKED_KINDS] = [
        QueryKind::Time,
        QueryKind::GetTimeOfDay,
        QueryKind::Clock,
        QueryKind::ClockGetTime,
        QueryKind::GetTicks,
        QueryKind::PerformanceCounter,
    ];

    /// Counter slot, or `None` for the untracked sentinel
    pub fn index(self) -> Option<usize> {
        match self {
            QueryKind::Untracked => None,
            QueryKind::Time => Some(0),
            QueryKind::GetTimeOfDay => Some(1),
            QueryKind::Clock => Some(2),
            QueryKind::ClockGetTime => Some(3),
            QueryKind::GetTicks => Some(4),
            QueryKind::PerformanceCounter => Some(5),
        }
    }
}

/// Clock errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// Frame rate numerator and denominator must be non-zero
    #[error("invalid frame rate {numerator}/{denominator}")]
    InvalidFrameRate { numerator: u32, denominator: u32 },

    /// A scoped override is already in effect (nesting is unsupported)
    #[error("a scoped time override is already active ({0})")]
    OverrideActive(TimeSpec),
}

/// Frames per `denominator` seconds (60/1, 60000/1001, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    numerator: u32,
    denominator: u32,
}

impl FrameRate {
    pub fn new(numerator: u32, denominator: u32) -> Result<Self, ClockError> {
        if numerator == 0 || denominator == 0 {
            return Err(ClockError::InvalidFrameRate {
                numerator,
                denominator,
            });
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Integer frames per second
    pub fn per_second(fps: u32) -> Result<Self, ClockError> {
        Self::new(fps, 1)
    }

    pub fn numerator(&self) -> u32 {
        self.numerator
    }

    pub fn denominator(&self) -> u32 {
        self.denominator
    }

    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Nominal frame period, truncated to whole nanoseconds
    pub fn period(&self) -> TimeSpec {
        let total = NANOS_PER_SEC as u64 * self.denominator as u64;
        TimeSpec::from_nanos((total / self.numerator as u64) as i128)
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self {
            numerator: 60,
            denominator: 1,
        }
    }
}

/// Busy-loop detection limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AntiFreezeConfig {
    /// Consecutive queries allowed per tracked kind before time is forced forward
    pub limits: [u32; TRACKED_KINDS],
    /// Virtual time injected each time a limit is exceeded
    pub forced_increment: TimeSpec,
}

impl AntiFreezeConfig {
    pub fn limit(&self, kind: QueryKind) -> Option<u32> {
        kind.index().map(|i| self.limits[i])
    }
}

impl Default for AntiFreezeConfig {
    fn default() -> Self {
        Self {
            limits: [100; TRACKED_KINDS],
            forced_increment: TimeSpec::from_millis(1),
        }
    }
}

/// Clock configuration (applied by [`VirtualClock::initialize`])
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClockConfig {
    pub frame_rate: FrameRate,
    pub anti_freeze: AntiFreezeConfig,
}

/// Copy of the clock state, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSnapshot {
    pub ticks: TimeSpec,
    pub fractional_remainder: u64,
    pub accumulated_delay: TimeSpec,
    pub forced_advance: TimeSpec,
    pub scoped_override: TimeSpec,
    pub last_enter_ticks: TimeSpec,
    pub frame_advance: TimeSpec,
    pub frame_count: u64,
}

struct ClockState {
    config: ClockConfig,
    ticks: TimeSpec,
    /// Remainder of `1e9 * den / num`, in units of `1 / num` ns
    fractional_remainder: u64,
    accumulated_delay: TimeSpec,
    last_enter_ticks: TimeSpec,
    /// Virtual time added by the latest frame entry
    frame_advance: TimeSpec,
    last_enter_wall: Duration,
    last_enter_valid: bool,
    scoped_override: TimeSpec,
    forced_advance: TimeSpec,
    query_counts: [u32; TRACKED_KINDS],
    frame_count: u64,
    trace: Option<Arc<DeterminismTrace>>,
}

impl ClockState {
    fn new(config: ClockConfig) -> Self {
        Self {
            config,
            ticks: TimeSpec::ZERO,
            fractional_remainder: 0,
            accumulated_delay: TimeSpec::ZERO,
            last_enter_ticks: TimeSpec::ZERO,
            frame_advance: TimeSpec::ZERO,
            last_enter_wall: Duration::ZERO,
            last_enter_valid: false,
            scoped_override: TimeSpec::ZERO,
            forced_advance: TimeSpec::ZERO,
            query_counts: [0; TRACKED_KINDS],
            frame_count: 0,
            trace: None,
        }
    }

    fn observed(&self) -> TimeSpec {
        self.ticks + self.forced_advance + self.scoped_override
    }

    /// Next nominal frame increment, carrying the division remainder
    fn next_increment(&mut self) -> TimeSpec {
        let num = self.config.frame_rate.numerator as u64;
        let total = NANOS_PER_SEC as u64 * self.config.frame_rate.denominator as u64;

        let mut increment = total / num;
        self.fractional_remainder += total % num;
        if self.fractional_remainder >= num {
            self.fractional_remainder -= num;
            increment += 1;
        }
        TimeSpec::from_nanos(increment as i128)
    }
}

/// Process-wide deterministic time source.
///
/// Constructed once and shared by reference (`Arc`) with the frame layer,
/// the sleep diversion and the audio engine. All operations take the
/// internal mutex for their critical section and release it before any
/// real sleep, so none of them may be called while holding another.
pub struct VirtualClock {
    state: Mutex<ClockState>,
    wall: Arc<dyn WallClock>,
    pacing: Arc<PacingControl>,
}

impl VirtualClock {
    pub fn new(config: ClockConfig, wall: Arc<dyn WallClock>, pacing: Arc<PacingControl>) -> Self {
        Self {
            state: Mutex::new(ClockState::new(config)),
            wall,
            pacing,
        }
    }

    /// Clock driven by the system wall clock with default pacing
    pub fn with_system_clock(config: ClockConfig) -> Self {
        Self::new(
            config,
            Arc::new(SystemWallClock::new()),
            Arc::new(PacingControl::default()),
        )
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("Virtual clock mutex poisoned; continuing");
            e.into_inner()
        })
    }

    pub fn pacing(&self) -> &Arc<PacingControl> {
        &self.pacing
    }

    pub fn wall(&self) -> &Arc<dyn WallClock> {
        &self.wall
    }

    /// Reset all counters and apply `config`.
    ///
    /// An attached trace stays attached.
    pub fn initialize(&self, config: ClockConfig) {
        let mut state = self.lock();
        let trace = state.trace.take();
        *state = ClockState::new(config);
        state.trace = trace;
        debug!(
            "Virtual clock initialized at {}/{} fps",
            config.frame_rate.numerator, config.frame_rate.denominator
        );
    }

    pub fn config(&self) -> ClockConfig {
        self.lock().config
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.lock().config.frame_rate
    }

    /// Change the frame rate without resetting time.
    ///
    /// The carried remainder is dropped because it is expressed in units of
    /// the previous rate's numerator.
    pub fn set_frame_rate(&self, frame_rate: FrameRate) {
        let mut state = self.lock();
        if state.config.frame_rate != frame_rate {
            state.config.frame_rate = frame_rate;
            state.fractional_remainder = 0;
        }
    }

    /// Record every observed value into `trace`.
    pub fn attach_trace(&self, trace: Arc<DeterminismTrace>) {
        self.lock().trace = Some(trace);
    }

    pub fn detach_trace(&self) -> Option<Arc<DeterminismTrace>> {
        self.lock().trace.take()
    }

    /// Current virtual time as seen by the program.
    ///
    /// Returns `ticks + forced_advance + scoped_override`. For tracked kinds,
    /// too many consecutive calls without a frame boundary inject a small
    /// forced advance so threads spinning on the clock cannot freeze the run.
    pub fn query(&self, kind: QueryKind) -> TimeSpec {
        let mut state = self.lock();

        if let Some(idx) = kind.index() {
            state.query_counts[idx] = state.query_counts[idx].saturating_add(1);
            if state.query_counts[idx] > state.config.anti_freeze.limits[idx] {
                let increment = state.config.anti_freeze.forced_increment;
                state.forced_advance += increment;
                state.query_counts[idx] = 0;
                debug!(
                    "{:?} queried too many times without a frame boundary, forcing time forward by {}",
                    kind, increment
                );
            }
        }

        let value = state.observed();
        if let Some(trace) = &state.trace {
            trace.observe(kind, value);
        }
        value
    }

    /// Advance virtual time by one frame.
    ///
    /// The advance is the nominal increment plus any pending diverted delay
    /// plus any forced advance; the latter two are drained to zero.
    pub fn enter_frame_boundary(&self) {
        let mut state = self.lock();

        let mut advance = state.next_increment();
        advance += state.accumulated_delay;
        advance += state.forced_advance;
        state.accumulated_delay = TimeSpec::ZERO;
        state.forced_advance = TimeSpec::ZERO;

        state.ticks += advance;
        state.query_counts = [0; TRACKED_KINDS];
        state.frame_advance = state.ticks - state.last_enter_ticks;
        state.last_enter_ticks = state.ticks;
        state.frame_count += 1;

        if let Some(trace) = &state.trace {
            trace.end_frame(state.frame_count, state.ticks);
        }

        debug!(
            "Frame {} entered at {} (+{})",
            state.frame_count, state.ticks, advance
        );
    }

    /// Sleep off whatever real time the frame did not use.
    ///
    /// Skipped on the first frame and in fast-forward; the sleep itself runs
    /// with the mutex released so other threads can keep querying.
    pub fn exit_frame_boundary(&self) {
        let sleep = {
            let state = self.lock();
            if state.last_enter_valid && !self.pacing.fast_forward() {
                let elapsed = self.wall.now().saturating_sub(state.last_enter_wall);
                state.frame_advance.to_duration().saturating_sub(elapsed)
            } else {
                Duration::ZERO
            }
        };

        if !sleep.is_zero() {
            self.wall.sleep(sleep);
        }

        let now = self.wall.now();
        let mut state = self.lock();
        state.last_enter_wall = now;
        state.last_enter_valid = true;
    }

    /// Fold a diverted wait into virtual time.
    ///
    /// The delay is applied at the next frame entry. A bounded real sleep
    /// (see [`DelaySleepPolicy`]) keeps the program from hogging the CPU.
    pub fn add_delay(&self, delay: TimeSpec) {
        if delay.is_negative() || delay.is_zero() {
            return;
        }

        {
            let mut state = self.lock();
            state.accumulated_delay += delay;
            debug!(
                "Delay of {} diverted (pending {})",
                delay, state.accumulated_delay
            );
        }

        if !self.pacing.fast_forward() {
            let real = self.pacing.delay_sleep().real_sleep(delay);
            if !real.is_zero() {
                self.wall.sleep(real);
            }
        }
    }

    /// Offset every query by `extra` without touching the tick value.
    ///
    /// Pass [`TimeSpec::ZERO`] to clear. Prefer [`VirtualClock::scoped_override`],
    /// which cannot forget to clear.
    pub fn fake_advance_timer(&self, extra: TimeSpec) {
        self.lock().scoped_override = extra;
    }

    /// Apply `offset` until the returned guard is dropped.
    ///
    /// Overrides do not nest: fails if one is already active.
    pub fn scoped_override(&self, offset: TimeSpec) -> Result<ScopedOverride<'_>, ClockError> {
        let mut state = self.lock();
        if !state.scoped_override.is_zero() {
            return Err(ClockError::OverrideActive(state.scoped_override));
        }
        state.scoped_override = offset;
        Ok(ScopedOverride { clock: self })
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        let state = self.lock();
        ClockSnapshot {
            ticks: state.ticks,
            fractional_remainder: state.fractional_remainder,
            accumulated_delay: state.accumulated_delay,
            forced_advance: state.forced_advance,
            scoped_override: state.scoped_override,
            last_enter_ticks: state.last_enter_ticks,
            frame_advance: state.frame_advance,
            frame_count: state.frame_count,
        }
    }
}

/// Active scoped override; clears the offset when dropped.
#[must_use = "the override is cleared as soon as the guard is dropped"]
pub struct ScopedOverride<'a> {
    clock: &'a VirtualClock,
}

impl ScopedOverride<'_> {
    /// Replace the offset while keeping the guard.
    pub fn set(&self, offset: TimeSpec) {
        self.clock.fake_advance_timer(offset);
    }
}

impl Drop for ScopedOverride<'_> {
    fn drop(&mut self) {
        self.clock.fake_advance_timer(TimeSpec::ZERO);
    }
}
