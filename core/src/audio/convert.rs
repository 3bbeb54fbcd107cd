//! Per-source format conversion
//!
//! Decodes any buffer format to a 16-bit working scale, maps mono/stereo to
//! the output channel count and resamples with linear interpolation. The
//! resampling phase is an exact fraction carried across calls, so feeding a
//! stream in pieces produces the same frames as feeding it whole.

use std::collections::VecDeque;

use tracing::debug;

use super::AudioError;
use super::buffer::SampleRun;

/// Output sample width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSample {
    /// Unsigned 8-bit, silence at 128
    U8,
    /// Signed 16-bit
    S16,
}

/// Format of the mixed output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputFormat {
    pub sample: OutputSample,
    pub channels: u16,
    pub frequency: u32,
}

impl OutputFormat {
    pub const fn stereo_s16(frequency: u32) -> Self {
        Self {
            sample: OutputSample::S16,
            channels: 2,
            frequency,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), AudioError> {
        if !(1..=2).contains(&self.channels) || self.frequency == 0 {
            return Err(AudioError::UnsupportedFormat {
                channels: self.channels,
                frequency: self.frequency,
            });
        }
        Ok(())
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::stereo_s16(44_100)
    }
}

pub(crate) fn validate_input(channels: u16, frequency: u32) -> Result<(), AudioError> {
    if !(1..=2).contains(&channels) || frequency == 0 {
        return Err(AudioError::UnsupportedFormat {
            channels,
            frequency,
        });
    }
    Ok(())
}

/// Frames are stored as two lanes; mono output only uses the first.
type Frame = [i32; 2];

/// More than this many seconds of unread output means the caller is not
/// draining us; the oldest frames are dropped.
const MAX_PENDING_SECONDS: usize = 2;

/// Streaming converter owned by one source.
pub struct Converter {
    in_rate: u32,
    out: OutputFormat,
    /// Last input frame of the previous push (interpolation history)
    prev: Frame,
    /// Input frames to skip at the start of the next push
    skip: usize,
    /// Phase past `prev`, in units of `1 / out_rate` input frames
    phase: u64,
    pending: VecDeque<Frame>,
}

impl Converter {
    pub fn new(in_channels: u16, in_rate: u32, out: OutputFormat) -> Result<Self, AudioError> {
        validate_input(in_channels, in_rate)?;
        out.validate()?;
        debug!(
            "Audio converter {} Hz -> {} Hz, {} channel(s)",
            in_rate, out.frequency, out.channels
        );
        Ok(Self {
            in_rate,
            out,
            prev: [0; 2],
            skip: 0,
            phase: 0,
            pending: VecDeque::new(),
        })
    }

    pub fn output(&self) -> &OutputFormat {
        &self.out
    }

    pub fn in_rate(&self) -> u32 {
        self.in_rate
    }

    /// Frames converted but not yet drained
    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    fn retune(&mut self, in_rate: u32) {
        if in_rate != self.in_rate {
            debug!("Audio converter input rate {} -> {}", self.in_rate, in_rate);
            self.in_rate = in_rate;
            self.skip = 0;
            self.phase = 0;
        }
    }

    fn map_channels(&self, run: &SampleRun<'_>, frame: usize) -> Frame {
        let s = &run.samples;
        match (run.channels, self.out.channels) {
            (1, 1) | (1, 2) => {
                let v = s.value(frame);
                [v, v]
            }
            (2, 1) => {
                let l = s.value(frame * 2);
                let r = s.value(frame * 2 + 1);
                [(l + r) / 2, 0]
            }
            _ => [s.value(frame * 2), s.value(frame * 2 + 1)],
        }
    }

    /// Convert `run` (at `frequency`) and queue the result.
    pub fn push(&mut self, run: SampleRun<'_>, frequency: u32) {
        if run.frames == 0 {
            return;
        }
        if validate_input(run.channels, frequency).is_err() {
            debug!(
                "Skipping {} frames in unsupported format ({} channels, {} Hz)",
                run.frames, run.channels, frequency
            );
            return;
        }
        self.retune(frequency);

        if self.in_rate == self.out.frequency {
            for i in 0..run.frames {
                let frame = self.map_channels(&run, i);
                self.pending.push_back(frame);
            }
            self.prev = self.map_channels(&run, run.frames - 1);
        } else {
            self.resample(&run);
        }

        let cap = self.out.frequency as usize * MAX_PENDING_SECONDS;
        if self.pending.len() > cap {
            let excess = self.pending.len() - cap;
            self.pending.drain(..excess);
            debug!("Dropped {} undrained converted frames", excess);
        }
    }

    /// Linear interpolation over `[prev] ++ run`.
    fn resample(&mut self, run: &SampleRun<'_>) {
        let n = run.frames;
        let out_rate = self.out.frequency as u64;
        let in_rate = self.in_rate as u64;

        let at = |idx: usize, this: &Self| -> Frame {
            if idx == 0 {
                this.prev
            } else {
                this.map_channels(run, idx - 1)
            }
        };

        let mut k = self.skip;
        let mut r = self.phase;
        while k < n {
            let a = at(k, self);
            let b = at(k + 1, self);
            let mut frame = [0; 2];
            for lane in 0..2 {
                let delta = (b[lane] - a[lane]) as i64;
                frame[lane] = a[lane] + (delta * r as i64 / out_rate as i64) as i32;
            }
            self.pending.push_back(frame);

            r += in_rate;
            k += (r / out_rate) as usize;
            r %= out_rate;
        }

        self.prev = at(n, self);
        self.skip = k - n;
        self.phase = r;
    }

    /// Move up to `max_frames` converted frames into `out` as interleaved
    /// samples. Returns the number of frames moved.
    pub fn drain(&mut self, out: &mut Vec<i32>, max_frames: usize) -> usize {
        out.clear();
        let count = max_frames.min(self.pending.len());
        let stereo = self.out.channels == 2;
        for frame in self.pending.drain(..count) {
            out.push(frame[0]);
            if stereo {
                out.push(frame[1]);
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioBuffer, SampleData};

    fn mono(values: &[i16], frequency: u32) -> AudioBuffer {
        AudioBuffer::new(0, SampleData::S16(values.to_vec()), 1, frequency)
    }

    fn drain_all(conv: &mut Converter) -> Vec<i32> {
        let mut out = Vec::new();
        conv.drain(&mut out, usize::MAX);
        out
    }

    #[test]
    fn test_equal_rate_mono_to_stereo() {
        let buf = mono(&[1, 2, 3], 44_100);
        let mut conv = Converter::new(1, 44_100, OutputFormat::stereo_s16(44_100)).unwrap();
        conv.push(buf.read(0, 3), 44_100);
        assert_eq!(drain_all(&mut conv), vec![1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let buf = AudioBuffer::new(0, SampleData::S16(vec![100, 300, -50, -150]), 2, 8000);
        let out = OutputFormat {
            sample: OutputSample::S16,
            channels: 1,
            frequency: 8000,
        };
        let mut conv = Converter::new(2, 8000, out).unwrap();
        conv.push(buf.read(0, 2), 8000);
        assert_eq!(drain_all(&mut conv), vec![200, -100]);
    }

    #[test]
    fn test_upsampling_doubles_frame_count() {
        let buf = mono(&[0, 100, 200, 300], 22_050);
        let mut conv = Converter::new(1, 22_050, OutputFormat::stereo_s16(44_100)).unwrap();
        conv.push(buf.read(0, 4), 22_050);
        let out = drain_all(&mut conv);
        assert_eq!(out.len(), 8 * 2);
        // One frame of history: starts from silence, interpolates halfway
        let left: Vec<i32> = out.iter().step_by(2).copied().collect();
        assert_eq!(left, vec![0, 0, 0, 50, 100, 150, 200, 250]);
    }

    #[test]
    fn test_split_pushes_match_single_push() {
        let values: Vec<i16> = (0..300).map(|i| (i * 37 % 1000) as i16).collect();
        let buf = mono(&values, 32_000);
        let out = OutputFormat::stereo_s16(44_100);

        let mut whole = Converter::new(1, 32_000, out).unwrap();
        whole.push(buf.read(0, 300), 32_000);

        let mut split = Converter::new(1, 32_000, out).unwrap();
        split.push(buf.read(0, 77), 32_000);
        split.push(buf.read(77, 150), 32_000);
        split.push(buf.read(227, 73), 32_000);

        assert_eq!(drain_all(&mut whole), drain_all(&mut split));
    }

    #[test]
    fn test_drain_keeps_remainder() {
        let buf = mono(&[5; 10], 1000);
        let out = OutputFormat {
            sample: OutputSample::S16,
            channels: 1,
            frequency: 1000,
        };
        let mut conv = Converter::new(1, 1000, out).unwrap();
        conv.push(buf.read(0, 10), 1000);

        let mut scratch = Vec::new();
        assert_eq!(conv.drain(&mut scratch, 4), 4);
        assert_eq!(conv.pending_frames(), 6);
    }

    #[test]
    fn test_rejects_unsupported_channels() {
        assert!(matches!(
            Converter::new(6, 48_000, OutputFormat::default()),
            Err(AudioError::UnsupportedFormat { channels: 6, .. })
        ));
        assert!(Converter::new(1, 0, OutputFormat::default()).is_err());
    }
}
