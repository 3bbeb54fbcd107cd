//! Virtual time values
//!
//! [`TimeSpec`] mirrors a `timespec`: whole seconds plus nanoseconds. It is
//! signed so scoped clock overrides can move observed time backwards.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::time::Duration;

/// Nanoseconds per second
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Seconds + nanoseconds, normalized so `0 <= nanos < 1e9`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TimeSpec {
    secs: i64,
    nanos: i64,
}

impl TimeSpec {
    /// Zero time / no offset
    pub const ZERO: Self = Self { secs: 0, nanos: 0 };

    /// Build from a possibly denormalized pair.
    pub fn new(secs: i64, nanos: i64) -> Self {
        let carry = nanos.div_euclid(NANOS_PER_SEC);
        Self {
            secs: secs.saturating_add(carry),
            nanos: nanos.rem_euclid(NANOS_PER_SEC),
        }
    }

    pub fn from_nanos(nanos: i128) -> Self {
        let secs = nanos.div_euclid(NANOS_PER_SEC as i128);
        let secs = secs.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Self {
            secs,
            nanos: nanos.rem_euclid(NANOS_PER_SEC as i128) as i64,
        }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::from_nanos(millis as i128 * 1_000_000)
    }

    pub fn from_micros(micros: u64) -> Self {
        Self::from_nanos(micros as i128 * 1_000)
    }

    pub fn secs(&self) -> i64 {
        self.secs
    }

    pub fn subsec_nanos(&self) -> i64 {
        self.nanos
    }

    pub fn as_nanos(&self) -> i128 {
        self.secs as i128 * NANOS_PER_SEC as i128 + self.nanos as i128
    }

    pub fn is_zero(&self) -> bool {
        self.secs == 0 && self.nanos == 0
    }

    pub fn is_negative(&self) -> bool {
        self.secs < 0
    }

    /// Clamp negative values to zero and convert to a real duration.
    pub fn to_duration(&self) -> Duration {
        if self.is_negative() {
            Duration::ZERO
        } else {
            Duration::new(self.secs as u64, self.nanos as u32)
        }
    }

    /// Scale by a non-negative ratio, rounding toward zero.
    pub fn scale(&self, ratio: f64) -> Self {
        if ratio <= 0.0 || self.is_negative() {
            return Self::ZERO;
        }
        Self::from_nanos((self.as_nanos() as f64 * ratio) as i128)
    }
}

impl From<Duration> for TimeSpec {
    fn from(d: Duration) -> Self {
        Self::from_nanos(d.as_nanos() as i128)
    }
}

impl Ord for TimeSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.secs, self.nanos).cmp(&(other.secs, other.nanos))
    }
}

impl PartialOrd for TimeSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for TimeSpec {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.secs.saturating_add(rhs.secs), self.nanos + rhs.nanos)
    }
}

impl AddAssign for TimeSpec {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for TimeSpec {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.secs.saturating_sub(rhs.secs), self.nanos - rhs.nanos)
    }
}

impl SubAssign for TimeSpec {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Neg for TimeSpec {
    type Output = Self;
    fn neg(self) -> Self {
        Self::ZERO - self
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            let pos = -*self;
            write!(f, "-{}.{:09}s", pos.secs, pos.nanos)
        } else {
            write!(f, "{}.{:09}s", self.secs, self.nanos)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_nanos() {
        let t = TimeSpec::new(1, 1_500_000_000);
        assert_eq!(t.secs(), 2);
        assert_eq!(t.subsec_nanos(), 500_000_000);

        let t = TimeSpec::new(1, -1);
        assert_eq!(t.secs(), 0);
        assert_eq!(t.subsec_nanos(), 999_999_999);
    }

    #[test]
    fn test_negative_values() {
        let t = TimeSpec::from_nanos(-250);
        assert!(t.is_negative());
        assert_eq!(t.as_nanos(), -250);
        assert_eq!(t.to_duration(), Duration::ZERO);
        assert_eq!((-t).as_nanos(), 250);
        assert_eq!(t.to_string(), "-0.000000250s");
    }

    #[test]
    fn test_arithmetic_carries() {
        let a = TimeSpec::new(0, 999_999_999);
        let b = TimeSpec::new(0, 2);
        assert_eq!(a + b, TimeSpec::new(1, 1));
        assert_eq!(b - a, TimeSpec::from_nanos(-999_999_997));
    }

    #[test]
    fn test_ordering() {
        assert!(TimeSpec::new(1, 0) > TimeSpec::new(0, 999_999_999));
        assert!(TimeSpec::from_nanos(-1) < TimeSpec::ZERO);
    }

    #[test]
    fn test_scale() {
        let t = TimeSpec::from_millis(10);
        assert_eq!(t.scale(0.5), TimeSpec::from_millis(5));
        assert_eq!(t.scale(0.0), TimeSpec::ZERO);
        assert_eq!(TimeSpec::from_nanos(-5).scale(1.0), TimeSpec::ZERO);
    }
}
