//! Playable audio source
//!
//! A source either plays a queue of buffers or is fed by a refill callback.
//! Each mix call asks for exactly the number of samples that elapsed in
//! virtual time, carrying the sub-sample remainder, so the audio stream
//! tracks the clock instead of the sound card.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, error, warn};

use super::AudioError;
use super::buffer::AudioBuffer;
use super::convert::{Converter, OutputFormat, validate_input};
use super::mixing::{MixTarget, gain_fixed, mix_into};
use crate::clock::VirtualClock;
use crate::time::{NANOS_PER_SEC, TimeSpec};

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceState {
    #[default]
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// How a source obtains samples; fixed by the first buffer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceKind {
    #[default]
    Undetermined,
    /// Plays queued buffers in order
    Queue,
    /// Single buffer refilled on demand
    Callback,
}

/// Refills a callback source's buffer.
///
/// Invoked while the virtual clock reports the time at which the new samples
/// will start playing.
pub trait AudioRefill: Send {
    fn refill(&mut self, buffer: &mut AudioBuffer);
}

impl<F> AudioRefill for F
where
    F: FnMut(&mut AudioBuffer) + Send,
{
    fn refill(&mut self, buffer: &mut AudioBuffer) {
        self(buffer)
    }
}

/// Samples elapsed over `ticks` at `frequency`.
///
/// The remainder is carried in `fraction` (units of 1e-9 samples): once it
/// reaches half a sample, one extra sample is emitted and a full sample is
/// subtracted, so the fraction stays in `[-0.5, 0.5)`.
pub(crate) fn elapsed_samples(ticks: TimeSpec, frequency: u32, fraction: &mut i64) -> usize {
    let nanos = ticks.as_nanos().max(0) as u128;
    let scaled = nanos * frequency as u128;
    let per_sec = NANOS_PER_SEC as u128;

    let mut samples = (scaled / per_sec) as usize;
    *fraction += (scaled % per_sec) as i64;
    if *fraction >= NANOS_PER_SEC / 2 {
        *fraction -= NANOS_PER_SEC;
        samples += 1;
    }
    samples
}

pub struct AudioSource {
    id: u32,
    state: SourceState,
    kind: SourceKind,
    looping: bool,
    volume: f32,
    queue: SmallVec<[Arc<AudioBuffer>; 4]>,
    queue_index: usize,
    /// Frame offset inside the current buffer
    position: usize,
    /// Sub-sample remainder in units of 1e-9 samples
    sample_fraction: i64,
    /// Callback buffer fully played; the next mix refills before reading
    refill_due: bool,
    refill: Option<Box<dyn AudioRefill>>,
    converter: Option<Converter>,
    scratch: Vec<i32>,
}

impl std::fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSource")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("kind", &self.kind)
            .field("looping", &self.looping)
            .field("volume", &self.volume)
            .field("queue", &self.queue.len())
            .field("queue_index", &self.queue_index)
            .field("position", &self.position)
            .finish()
    }
}

impl AudioSource {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            state: SourceState::Initial,
            kind: SourceKind::Undetermined,
            looping: false,
            volume: 1.0,
            queue: SmallVec::new(),
            queue_index: 0,
            position: 0,
            sample_fraction: 0,
            refill_due: false,
            refill: None,
            converter: None,
            scratch: Vec::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Rewind the read cursor and drop the converter.
    pub fn init(&mut self) {
        self.rewind_cursor();
        self.converter = None;
    }

    fn rewind_cursor(&mut self) {
        self.queue_index = 0;
        self.position = 0;
        self.sample_fraction = 0;
        self.refill_due = false;
    }

    /// End of a non-looping queue. The converter survives until the current
    /// mix has drained what was already fed.
    fn finish(&mut self) {
        debug!("Source {} reached the end of its queue", self.id);
        self.rewind_cursor();
        self.state = SourceState::Stopped;
    }

    // =========================================================================
    // Transport
    // =========================================================================

    /// Start or resume playback. A stopped source restarts from the top.
    pub fn play(&mut self) {
        if self.state == SourceState::Stopped {
            self.init();
        }
        self.state = SourceState::Playing;
    }

    pub fn pause(&mut self) {
        if self.state == SourceState::Playing {
            self.state = SourceState::Paused;
        }
    }

    pub fn stop(&mut self) {
        self.init();
        self.state = SourceState::Stopped;
    }

    pub fn rewind(&mut self) {
        self.init();
        self.state = SourceState::Initial;
    }

    // =========================================================================
    // Buffers
    // =========================================================================

    fn claim(&mut self, kind: SourceKind) -> Result<(), AudioError> {
        match self.kind {
            SourceKind::Undetermined => {
                self.kind = kind;
                Ok(())
            }
            current if current == kind => Ok(()),
            current => Err(AudioError::SourceKindMismatch {
                source_id: self.id,
                current,
                requested: kind,
            }),
        }
    }

    /// Replace the queue with a single static buffer (or clear it).
    pub fn set_buffer(&mut self, buffer: Option<Arc<AudioBuffer>>) -> Result<(), AudioError> {
        self.claim(SourceKind::Queue)?;
        self.queue.clear();
        self.queue.extend(buffer);
        self.init();
        Ok(())
    }

    pub fn queue_buffer(&mut self, buffer: Arc<AudioBuffer>) -> Result<(), AudioError> {
        self.claim(SourceKind::Queue)?;
        self.queue.push(buffer);
        Ok(())
    }

    /// Remove up to `max` fully played buffers from the front of the queue.
    pub fn unqueue_processed(&mut self, max: usize) -> Vec<Arc<AudioBuffer>> {
        let count = max.min(self.queue_index);
        self.queue_index -= count;
        self.queue.drain(..count).collect()
    }

    /// Turn this into a callback-fed source playing `buffer`.
    pub fn set_callback(
        &mut self,
        buffer: AudioBuffer,
        refill: Box<dyn AudioRefill>,
    ) -> Result<(), AudioError> {
        self.claim(SourceKind::Callback)?;
        self.queue.clear();
        self.queue.push(Arc::new(buffer));
        self.refill = Some(refill);
        self.init();
        Ok(())
    }

    pub fn nb_queue(&self) -> usize {
        self.queue.len()
    }

    pub fn nb_queue_processed(&self) -> usize {
        self.queue_index
    }

    pub fn buffers(&self) -> &[Arc<AudioBuffer>] {
        &self.queue
    }

    /// Total frames across the queue
    pub fn queue_size(&self) -> usize {
        self.queue.iter().map(|b| b.sample_size()).sum()
    }

    /// Index of the buffer being played
    pub fn queue_index(&self) -> usize {
        self.queue_index
    }

    /// Frame offset within the current buffer
    pub fn buffer_position(&self) -> usize {
        self.position
    }

    /// Frames played since the start of the queue
    pub fn position(&self) -> usize {
        let before: usize = self
            .queue
            .iter()
            .take(self.queue_index)
            .map(|b| b.sample_size())
            .sum();
        before + self.position
    }

    /// Seek to absolute frame `pos` across the queue.
    ///
    /// Looping sources wrap; others fail past the end.
    pub fn set_position(&mut self, pos: usize) -> Result<(), AudioError> {
        let total = self.queue_size();
        let pos = if self.looping && total > 0 {
            pos % total
        } else {
            pos
        };
        if pos >= total {
            return Err(AudioError::PositionOutOfRange {
                requested: pos,
                total,
            });
        }

        let mut remaining = pos;
        for (index, buffer) in self.queue.iter().enumerate() {
            let size = buffer.sample_size();
            if remaining < size {
                self.queue_index = index;
                self.position = remaining;
                self.sample_fraction = 0;
                self.refill_due = false;
                return Ok(());
            }
            remaining -= size;
        }
        Err(AudioError::PositionOutOfRange {
            requested: pos,
            total,
        })
    }

    // =========================================================================
    // Mixing
    // =========================================================================

    /// Samples elapsed over `ticks` at `frequency`, carrying the remainder.
    pub fn ticks_to_samples(&mut self, ticks: TimeSpec, frequency: u32) -> usize {
        elapsed_samples(ticks, frequency, &mut self.sample_fraction)
    }

    /// Carried sub-sample remainder, in units of 1e-9 samples
    pub fn sample_fraction(&self) -> i64 {
        self.sample_fraction
    }

    fn ensure_converter(
        &mut self,
        buffer: &AudioBuffer,
        format: &OutputFormat,
    ) -> Result<(), AudioError> {
        if self
            .converter
            .as_ref()
            .is_some_and(|c| c.output() == format)
        {
            return Ok(());
        }
        self.converter = Some(Converter::new(
            buffer.channels(),
            buffer.frequency(),
            *format,
        )?);
        Ok(())
    }

    /// Read up to `count` frames of `buffer` at `offset` into the converter.
    fn feed(&mut self, buffer: &AudioBuffer, offset: usize, count: usize) -> usize {
        let run = buffer.read(offset, count);
        if let Some(converter) = self.converter.as_mut() {
            converter.push(run, buffer.frequency());
        }
        run.frames
    }

    /// Step to the next buffer after the current one finished.
    ///
    /// Returns `false` (after stopping) when a non-looping queue is exhausted.
    fn advance_buffer(&mut self) -> bool {
        self.queue_index += 1;
        self.position = 0;
        if self.queue_index < self.queue.len() {
            return true;
        }
        if self.looping {
            self.queue_index = 0;
            return true;
        }
        self.finish();
        false
    }

    /// Keep the cursor off the end of a buffer.
    fn normalize(&mut self) {
        if self.state != SourceState::Playing || self.queue.is_empty() {
            return;
        }
        if self.kind == SourceKind::Callback {
            if self.position >= self.queue[0].sample_size() {
                self.position = 0;
                self.refill_due = true;
            }
            return;
        }
        while self.state == SourceState::Playing
            && self.queue_size() > 0
            && self.position >= self.queue[self.queue_index].sample_size()
        {
            if !self.advance_buffer() {
                break;
            }
        }
    }

    fn walk_queue(&mut self, mut remaining: usize) {
        if self.queue_size() == 0 {
            self.finish();
            return;
        }
        while remaining > 0 {
            if !self.advance_buffer() {
                return;
            }
            let buffer = self.queue[self.queue_index].clone();
            let got = self.feed(&buffer, 0, remaining);
            self.position = got;
            remaining -= got;
        }
    }

    fn refill_from_callback(&mut self, clock: &VirtualClock, mut remaining: usize) {
        let Some(mut refill) = self.refill.take() else {
            warn!("Source {} is callback-fed but has no callback", self.id);
            return;
        };
        self.refill_due = false;

        while remaining > 0 {
            let frequency = self.queue[0].frequency().max(1);
            let offset = remaining as i128 * NANOS_PER_SEC as i128 / frequency as i128;

            // The program sees the time at which its new samples start playing
            match clock.scoped_override(TimeSpec::from_nanos(-offset)) {
                Ok(_guard) => refill.refill(Arc::make_mut(&mut self.queue[0])),
                Err(e) => {
                    warn!("Refilling source {} without time offset: {}", self.id, e);
                    refill.refill(Arc::make_mut(&mut self.queue[0]));
                }
            }

            let buffer = self.queue[0].clone();
            let got = self.feed(&buffer, 0, remaining);
            if got == 0 {
                warn!("Refill callback of source {} produced no samples", self.id);
                self.position = 0;
                break;
            }
            if got == remaining {
                self.position = got;
            }
            remaining -= got;
        }

        self.refill = Some(refill);
    }

    /// Mix the samples elapsed over `ticks` into `target`.
    ///
    /// Returns `None`, leaving everything untouched, when the source is not
    /// playing or has no buffer. Otherwise returns the number of output frames
    /// produced (zero when the format cannot be converted).
    pub fn mix_with(
        &mut self,
        clock: &VirtualClock,
        ticks: TimeSpec,
        mut target: MixTarget<'_>,
        format: &OutputFormat,
        master_volume: f32,
    ) -> Option<usize> {
        if self.state != SourceState::Playing || self.queue.is_empty() {
            return None;
        }
        if target.sample() != format.sample {
            error!(
                "Source {}: output buffer is {:?} but format says {:?}",
                self.id,
                target.sample(),
                format.sample
            );
            return Some(0);
        }
        if self.queue_index >= self.queue.len() {
            self.queue_index = 0;
            self.position = 0;
        }

        let current = self.queue[self.queue_index].clone();
        let setup = validate_input(current.channels(), current.frequency())
            .and_then(|()| self.ensure_converter(&current, format));
        if let Err(e) = setup {
            error!("Source {}: cannot set up conversion: {}", self.id, e);
            return Some(0);
        }

        let requested = self.ticks_to_samples(ticks, current.frequency());
        let available = if self.refill_due {
            0
        } else {
            let offset = self.position;
            self.feed(&current, offset, requested)
        };
        self.position += available;
        // A callback refill mutates the buffer in place
        drop(current);

        if available < requested {
            let remaining = requested - available;
            match self.kind {
                SourceKind::Callback => self.refill_from_callback(clock, remaining),
                _ => self.walk_queue(remaining),
            }
        }
        self.normalize();

        let max_frames = target.len() / format.channels as usize;
        let gain = gain_fixed(self.volume, master_volume);
        let mut scratch = std::mem::take(&mut self.scratch);
        let frames = match self.converter.as_mut() {
            Some(converter) => converter.drain(&mut scratch, max_frames),
            None => 0,
        };
        mix_into(&mut target, &scratch, gain);
        self.scratch = scratch;

        if self.state == SourceState::Stopped {
            self.converter = None;
        }

        Some(frames)
    }
}
