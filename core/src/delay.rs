//! Wait diversion
//!
//! Waits issued by the main thread are not performed. Their duration is
//! added to the virtual clock instead, so a program that sleeps to pace
//! itself sees exactly the time it asked for at the next frame. Waits from
//! other threads, and from a main thread in the native state, really sleep.

use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use tracing::{debug, trace, warn};

use crate::clock::{QueryKind, VirtualClock};
use crate::thread_state;
use crate::time::TimeSpec;

/// How a `clock_nanosleep` deadline is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepMode {
    /// Duration from now
    Relative,
    /// Point in virtual time
    Absolute,
}

/// What happened to a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Folded into virtual time
    Diverted(TimeSpec),
    /// Performed as a real sleep
    Slept(TimeSpec),
    /// Nothing to wait for
    Skipped,
}

pub struct DelayDiversion {
    clock: Arc<VirtualClock>,
    main_thread: OnceLock<ThreadId>,
}

impl DelayDiversion {
    pub fn new(clock: Arc<VirtualClock>) -> Self {
        Self {
            clock,
            main_thread: OnceLock::new(),
        }
    }

    /// Register the calling thread as the one driving frame boundaries.
    ///
    /// Only the first registration counts.
    pub fn register_main_thread(&self) -> bool {
        let current = thread::current().id();
        let registered = *self.main_thread.get_or_init(|| current);
        if registered != current {
            warn!("Main thread already registered as {:?}", registered);
            return false;
        }
        debug!("Main thread is {:?}", current);
        true
    }

    pub fn is_main_thread(&self) -> bool {
        self.main_thread.get() == Some(&thread::current().id())
    }

    /// `SDL_Delay`
    pub fn delay_ms(&self, ms: u32) -> WaitOutcome {
        self.wait(TimeSpec::from_millis(ms as u64), "delay_ms")
    }

    pub fn usleep(&self, usec: u64) -> WaitOutcome {
        self.wait(TimeSpec::from_micros(usec), "usleep")
    }

    pub fn nanosleep(&self, duration: TimeSpec) -> WaitOutcome {
        self.wait(duration, "nanosleep")
    }

    /// Absolute deadlines are measured against virtual time, without
    /// counting as a time query.
    pub fn clock_nanosleep(&self, mode: SleepMode, deadline: TimeSpec) -> WaitOutcome {
        let duration = match mode {
            SleepMode::Relative => deadline,
            SleepMode::Absolute => {
                let remaining = deadline - self.clock.query(QueryKind::Untracked);
                remaining.max(TimeSpec::ZERO)
            }
        };
        self.wait(duration, "clock_nanosleep")
    }

    fn wait(&self, duration: TimeSpec, call: &str) -> WaitOutcome {
        if duration.is_zero() || duration.is_negative() {
            return WaitOutcome::Skipped;
        }

        if self.is_main_thread() && !thread_state::is_native() {
            debug!("{} of {} diverted", call, duration);
            self.clock.add_delay(duration);
            return WaitOutcome::Diverted(duration);
        }

        trace!("{} of {} on {:?}", call, duration, thread::current().id());
        self.clock.wall().sleep(duration.to_duration());
        WaitOutcome::Slept(duration)
    }
}
