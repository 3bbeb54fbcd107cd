//! Sample payloads

use super::AudioError;

/// Sample encoding of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8-bit, biased around 128
    U8,
    /// Signed 16-bit
    S16,
    /// Signed 32-bit
    S32,
    /// 32-bit float in [-1, 1]
    F32,
    /// 64-bit float in [-1, 1]
    F64,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16 => 2,
            SampleFormat::S32 => 4,
            SampleFormat::F32 => 4,
            SampleFormat::F64 => 8,
        }
    }
}

/// Interleaved sample values, typed by format
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    U8(Vec<u8>),
    S16(Vec<i16>),
    S32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl SampleData {
    /// Decode a raw native-endian payload.
    pub fn from_bytes(format: SampleFormat, bytes: &[u8]) -> Result<Self, AudioError> {
        if bytes.len() % format.bytes_per_sample() != 0 {
            return Err(AudioError::MisalignedPayload {
                len: bytes.len(),
                format,
            });
        }
        // pod_collect_to_vec copies, so the payload need not be aligned
        Ok(match format {
            SampleFormat::U8 => SampleData::U8(bytes.to_vec()),
            SampleFormat::S16 => SampleData::S16(bytemuck::pod_collect_to_vec(bytes)),
            SampleFormat::S32 => SampleData::S32(bytemuck::pod_collect_to_vec(bytes)),
            SampleFormat::F32 => SampleData::F32(bytemuck::pod_collect_to_vec(bytes)),
            SampleFormat::F64 => SampleData::F64(bytemuck::pod_collect_to_vec(bytes)),
        })
    }

    pub fn format(&self) -> SampleFormat {
        match self {
            SampleData::U8(_) => SampleFormat::U8,
            SampleData::S16(_) => SampleFormat::S16,
            SampleData::S32(_) => SampleFormat::S32,
            SampleData::F32(_) => SampleFormat::F32,
            SampleData::F64(_) => SampleFormat::F64,
        }
    }

    /// Number of individual values (frames * channels)
    pub fn len(&self) -> usize {
        match self {
            SampleData::U8(v) => v.len(),
            SampleData::S16(v) => v.len(),
            SampleData::S32(v) => v.len(),
            SampleData::F32(v) => v.len(),
            SampleData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slice(&self, start: usize, end: usize) -> SampleSlice<'_> {
        match self {
            SampleData::U8(v) => SampleSlice::U8(&v[start..end]),
            SampleData::S16(v) => SampleSlice::S16(&v[start..end]),
            SampleData::S32(v) => SampleSlice::S32(&v[start..end]),
            SampleData::F32(v) => SampleSlice::F32(&v[start..end]),
            SampleData::F64(v) => SampleSlice::F64(&v[start..end]),
        }
    }
}

/// Borrowed run of interleaved samples
#[derive(Debug, Clone, Copy)]
pub enum SampleSlice<'a> {
    U8(&'a [u8]),
    S16(&'a [i16]),
    S32(&'a [i32]),
    F32(&'a [f32]),
    F64(&'a [f64]),
}

impl SampleSlice<'_> {
    /// Value `i` on the 16-bit working scale
    pub fn value(&self, i: usize) -> i32 {
        match self {
            SampleSlice::U8(v) => (v[i] as i32 - 128) << 8,
            SampleSlice::S16(v) => v[i] as i32,
            SampleSlice::S32(v) => v[i] >> 16,
            SampleSlice::F32(v) => float_to_s16(v[i] as f64),
            SampleSlice::F64(v) => float_to_s16(v[i]),
        }
    }
}

fn float_to_s16(x: f64) -> i32 {
    if x.is_nan() {
        return 0;
    }
    (x.clamp(-1.0, 1.0) * 32767.0).round() as i32
}

/// Contiguous frames returned by [`AudioBuffer::read`]
#[derive(Debug, Clone, Copy)]
pub struct SampleRun<'a> {
    pub samples: SampleSlice<'a>,
    pub frames: usize,
    pub channels: u16,
}

/// Immutable sample payload with its format.
///
/// Sizes and offsets are in frames ("samples" per channel).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    id: u32,
    data: SampleData,
    channels: u16,
    frequency: u32,
}

impl AudioBuffer {
    pub fn new(id: u32, data: SampleData, channels: u16, frequency: u32) -> Self {
        Self {
            id,
            data,
            channels,
            frequency,
        }
    }

    pub fn from_bytes(
        id: u32,
        format: SampleFormat,
        channels: u16,
        frequency: u32,
        bytes: &[u8],
    ) -> Result<Self, AudioError> {
        Ok(Self::new(
            id,
            SampleData::from_bytes(format, bytes)?,
            channels,
            frequency,
        ))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn format(&self) -> SampleFormat {
        self.data.format()
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn data(&self) -> &SampleData {
        &self.data
    }

    /// Replace the payload (used by refill callbacks).
    pub fn set_data(&mut self, data: SampleData, channels: u16, frequency: u32) {
        self.data = data;
        self.channels = channels;
        self.frequency = frequency;
    }

    /// Total frames in the buffer
    pub fn sample_size(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.data.len() / self.channels as usize
        }
    }

    /// Up to `count` frames starting at frame `offset`.
    ///
    /// Returns fewer frames (possibly none) near the end of the buffer.
    pub fn read(&self, offset: usize, count: usize) -> SampleRun<'_> {
        let size = self.sample_size();
        let start = offset.min(size);
        let frames = count.min(size - start);
        let ch = self.channels as usize;
        SampleRun {
            samples: self.data.slice(start * ch, (start + frames) * ch),
            frames,
            channels: self.channels,
        }
    }
}
