//! Source and buffer registry, and the per-frame mix

use std::sync::{Arc, Mutex, MutexGuard};

use hashbrown::HashMap;
use tracing::{debug, trace, warn};

use super::AudioError;
use super::buffer::{AudioBuffer, SampleData};
use super::convert::{OutputFormat, OutputSample};
use super::mixing::MixTarget;
use super::source::{AudioSource, elapsed_samples};
use crate::clock::{QueryKind, VirtualClock};
use crate::time::TimeSpec;

/// One mixed output period, interleaved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixedAudio {
    U8(Vec<u8>),
    S16(Vec<i16>),
}

impl MixedAudio {
    /// `len` values of silence
    pub fn silence(sample: OutputSample, len: usize) -> Self {
        match sample {
            OutputSample::U8 => MixedAudio::U8(vec![128; len]),
            OutputSample::S16 => MixedAudio::S16(vec![0; len]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MixedAudio::U8(v) => v.len(),
            MixedAudio::S16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_target(&mut self) -> MixTarget<'_> {
        match self {
            MixedAudio::U8(v) => MixTarget::U8(v),
            MixedAudio::S16(v) => MixTarget::S16(v),
        }
    }
}

/// Receives every mixed period (encoder, file writer, ...)
pub trait AudioSink: Send {
    fn push_samples(&mut self, audio: &MixedAudio, format: &OutputFormat);
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn push_samples(&mut self, _audio: &MixedAudio, _format: &OutputFormat) {}
}

struct ContextState {
    /// Registration order is mixing order
    sources: Vec<AudioSource>,
    buffers: HashMap<u32, Arc<AudioBuffer>>,
    next_source_id: u32,
    next_buffer_id: u32,
    master_volume: f32,
    format: OutputFormat,
    last_mix: TimeSpec,
    frame_fraction: i64,
}

/// All sources of the program plus the output format.
///
/// One mutex serializes source mutation (main thread) against mixing, so a
/// refill callback must not call back into the context.
pub struct AudioContext {
    clock: Arc<VirtualClock>,
    state: Mutex<ContextState>,
}

impl AudioContext {
    pub fn new(clock: Arc<VirtualClock>, format: OutputFormat) -> Self {
        Self {
            clock,
            state: Mutex::new(ContextState {
                sources: Vec::new(),
                buffers: HashMap::new(),
                next_source_id: 1,
                next_buffer_id: 1,
                master_volume: 1.0,
                format,
                last_mix: TimeSpec::ZERO,
                frame_fraction: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("Audio context mutex poisoned; continuing");
            e.into_inner()
        })
    }

    pub fn clock(&self) -> &Arc<VirtualClock> {
        &self.clock
    }

    pub fn output_format(&self) -> OutputFormat {
        self.lock().format
    }

    pub fn set_output_format(&self, format: OutputFormat) {
        let mut state = self.lock();
        if state.format != format {
            debug!(
                "Audio output format {:?} {} ch {} Hz",
                format.sample, format.channels, format.frequency
            );
            state.format = format;
            state.frame_fraction = 0;
        }
    }

    pub fn master_volume(&self) -> f32 {
        self.lock().master_volume
    }

    /// Set the master volume (0.0 - 1.0)
    pub fn set_master_volume(&self, volume: f32) {
        self.lock().master_volume = volume.clamp(0.0, 1.0);
    }

    // =========================================================================
    // Registry
    // =========================================================================

    pub fn create_source(&self) -> u32 {
        let mut state = self.lock();
        let id = state.next_source_id;
        state.next_source_id += 1;
        state.sources.push(AudioSource::new(id));
        id
    }

    pub fn delete_source(&self, id: u32) -> Result<(), AudioError> {
        let mut state = self.lock();
        let index = state
            .sources
            .iter()
            .position(|s| s.id() == id)
            .ok_or(AudioError::UnknownSource(id))?;
        state.sources.remove(index);
        Ok(())
    }

    pub fn source_ids(&self) -> Vec<u32> {
        self.lock().sources.iter().map(|s| s.id()).collect()
    }

    /// Run `f` on source `id` with the mixer locked out.
    pub fn with_source<R>(
        &self,
        id: u32,
        f: impl FnOnce(&mut AudioSource) -> R,
    ) -> Result<R, AudioError> {
        let mut state = self.lock();
        let source = state
            .sources
            .iter_mut()
            .find(|s| s.id() == id)
            .ok_or(AudioError::UnknownSource(id))?;
        Ok(f(source))
    }

    pub fn create_buffer(&self, data: SampleData, channels: u16, frequency: u32) -> Arc<AudioBuffer> {
        let mut state = self.lock();
        let id = state.next_buffer_id;
        state.next_buffer_id += 1;
        let buffer = Arc::new(AudioBuffer::new(id, data, channels, frequency));
        state.buffers.insert(id, buffer.clone());
        buffer
    }

    pub fn buffer(&self, id: u32) -> Option<Arc<AudioBuffer>> {
        self.lock().buffers.get(&id).cloned()
    }

    /// Forget buffer `id`. Sources that queued it keep their reference.
    pub fn delete_buffer(&self, id: u32) -> Result<(), AudioError> {
        self.lock()
            .buffers
            .remove(&id)
            .map(|_| ())
            .ok_or(AudioError::UnknownBuffer(id))
    }

    /// Append registered buffer `buffer_id` to source `source_id`.
    pub fn queue_buffer(&self, source_id: u32, buffer_id: u32) -> Result<(), AudioError> {
        let mut state = self.lock();
        let buffer = state
            .buffers
            .get(&buffer_id)
            .cloned()
            .ok_or(AudioError::UnknownBuffer(buffer_id))?;
        let source = state
            .sources
            .iter_mut()
            .find(|s| s.id() == source_id)
            .ok_or(AudioError::UnknownSource(source_id))?;
        source.queue_buffer(buffer)
    }

    // =========================================================================
    // Mixing
    // =========================================================================

    /// Mix every source over `ticks` into `target`.
    ///
    /// Returns the largest number of frames any source produced.
    pub fn mix_all(&self, ticks: TimeSpec, mut target: MixTarget<'_>) -> usize {
        let mut state = self.lock();
        let ContextState {
            sources,
            format,
            master_volume,
            ..
        } = &mut *state;

        let mut produced = 0;
        for source in sources.iter_mut() {
            if let Some(frames) =
                source.mix_with(&self.clock, ticks, target.reborrow(), format, *master_volume)
            {
                trace!("Source {} mixed {} frames", source.id(), frames);
                produced = produced.max(frames);
            }
        }
        produced
    }

    /// Mix the output period covering virtual time since the previous call.
    pub fn mix_frame(&self) -> MixedAudio {
        let now = self.clock.query(QueryKind::Untracked);
        let (ticks, format, frames) = {
            let mut state = self.lock();
            let ticks = if now < state.last_mix {
                // Clock was reinitialized
                TimeSpec::ZERO
            } else {
                now - state.last_mix
            };
            state.last_mix = now;
            let format = state.format;
            let frames = elapsed_samples(ticks, format.frequency, &mut state.frame_fraction);
            (ticks, format, frames)
        };

        let mut audio = MixedAudio::silence(format.sample, frames * format.channels as usize);
        self.mix_all(ticks, audio.as_target());
        audio
    }
}
