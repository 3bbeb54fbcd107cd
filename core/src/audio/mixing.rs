//! Saturating sample accumulation

use super::convert::OutputSample;

/// Output buffer a source is mixed into, interleaved.
pub enum MixTarget<'a> {
    U8(&'a mut [u8]),
    S16(&'a mut [i16]),
}

impl MixTarget<'_> {
    /// Number of sample values (frames * channels)
    pub fn len(&self) -> usize {
        match self {
            MixTarget::U8(b) => b.len(),
            MixTarget::S16(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shorter-lived view of the same buffer, for mixing several sources.
    pub fn reborrow(&mut self) -> MixTarget<'_> {
        match self {
            MixTarget::U8(b) => MixTarget::U8(&mut **b),
            MixTarget::S16(b) => MixTarget::S16(&mut **b),
        }
    }

    pub fn sample(&self) -> OutputSample {
        match self {
            MixTarget::U8(_) => OutputSample::U8,
            MixTarget::S16(_) => OutputSample::S16,
        }
    }
}

/// Unity gain in 16.16 fixed point
pub const UNITY_GAIN: i32 = 1 << 16;

/// `vol * master`, clamped to `[0, 1]`, as 16.16 fixed point
pub fn gain_fixed(volume: f32, master: f32) -> i32 {
    let gain = volume * master;
    if gain.is_nan() {
        return 0;
    }
    (gain.clamp(0.0, 1.0) * UNITY_GAIN as f32) as i32
}

#[inline]
fn scale(sample: i32, gain: i32) -> i32 {
    ((sample as i64 * gain as i64) >> 16) as i32
}

/// Add `samples` (16-bit working scale) onto `target` with saturation.
///
/// Only the overlapping prefix is mixed.
pub fn mix_into(target: &mut MixTarget<'_>, samples: &[i32], gain: i32) {
    match target {
        MixTarget::S16(out) => {
            for (o, &s) in out.iter_mut().zip(samples) {
                let sum = *o as i32 + scale(s, gain);
                *o = sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            }
        }
        MixTarget::U8(out) => {
            for (o, &s) in out.iter_mut().zip(samples) {
                let sum = (*o as i32 - 128) + (scale(s, gain) >> 8);
                *o = (sum.clamp(-128, 127) + 128) as u8;
            }
        }
    }
}
