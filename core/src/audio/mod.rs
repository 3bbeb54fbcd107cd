//! Audio mixing engine
//!
//! Sources are mixed into a single output stream whose length is dictated by
//! elapsed virtual time. Nothing here talks to a sound device; mixed periods
//! are handed to an [`AudioSink`].

mod buffer;
mod context;
mod convert;
mod mixing;
mod source;


pub use buffer::{AudioBuffer, SampleData, SampleFormat, SampleRun, SampleSlice};
pub use context::{AudioContext, AudioSink, MixedAudio, NullSink};
pub use convert::{Converter, OutputFormat, OutputSample};
pub use mixing::{MixTarget, UNITY_GAIN, gain_fixed, mix_into};
pub use source::{AudioRefill, AudioSource, SourceKind, SourceState};

/// Audio engine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AudioError {
    /// Only mono and stereo at a non-zero rate are converted
    #[error("unsupported audio format: {channels} channel(s) at {frequency} Hz")]
    UnsupportedFormat { channels: u16, frequency: u32 },

    #[error("payload of {len} bytes is not a whole number of {format:?} samples")]
    MisalignedPayload { len: usize, format: SampleFormat },

    #[error("source {source_id} is {current:?}-fed, cannot use it as {requested:?}-fed")]
    SourceKindMismatch {
        source_id: u32,
        current: SourceKind,
        requested: SourceKind,
    },

    #[error("position {requested} is past the end of the queue ({total} samples)")]
    PositionOutOfRange { requested: usize, total: usize },

    #[error("unknown audio source {0}")]
    UnknownSource(u32),

    #[error("unknown audio buffer {0}")]
    UnknownBuffer(u32),
}
