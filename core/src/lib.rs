//! Ticklock Core - Deterministic time for injected programs
//!
//! This crate provides the virtual clock, frame boundary and audio mixing
//! engine of a runtime layer that makes a program's notion of time fully
//! reproducible.
//!
//! # Architecture
//!
//! - [`VirtualClock`] - Process-wide deterministic time source
//! - [`FrameBoundary`] - Enter/exit pair bracketing every rendered frame
//! - [`DelayDiversion`] - Turns main-thread waits into virtual time
//! - [`AudioContext`] - Sources mixed over exactly the elapsed virtual time

pub mod audio;
pub mod clock;
pub mod companion;
pub mod config;
pub mod delay;
pub mod frame;
pub mod symbols;
pub mod thread_state;
pub mod time;
pub mod trace;

#[cfg(test)]
pub mod test_utils;

// Re-export the main types
pub use audio::{
    AudioBuffer, AudioContext, AudioError, AudioRefill, AudioSink, AudioSource, MixTarget,
    MixedAudio, OutputFormat, OutputSample, SampleData, SampleFormat, SourceKind, SourceState,
};
pub use clock::{
    AntiFreezeConfig, ClockConfig, ClockError, ClockSnapshot, DelaySleepPolicy, FrameRate,
    PacingControl, QueryKind, ScopedOverride, SystemWallClock, VirtualClock, WallClock,
};
pub use companion::{CompanionError, CompanionLink, StreamLink, WindowAnnouncer};
pub use config::{Config, ConfigError};
pub use delay::{DelayDiversion, SleepMode, WaitOutcome};
pub use frame::{FpsSample, FrameBoundary, FrameConfig, FrameReport, HudInfo, format_title};
pub use symbols::{LazySymbol, SymbolAddress, SymbolError, SymbolResolver, TableResolver};
pub use thread_state::NativeScope;
pub use time::TimeSpec;
pub use trace::DeterminismTrace;

// Re-export the wire contract
pub use ticklock_shared::{RunFlags, WindowHandle};
