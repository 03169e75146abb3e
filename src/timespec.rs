//! Nanosecond-resolution duration arithmetic sitting next to the OS-timer
//! backends: normalized add/subtract, conversion to/from a floating-point
//! second count, and conversion to a flat nanosecond count for use as a log
//! timestamp.

use std::time::Duration;

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A non-negative `(seconds, nanoseconds)` pair, always normalized so that
/// `nanos < 1_000_000_000`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timespec {
    pub seconds: u64,
    pub nanos: u32,
}

impl Timespec {
    pub const ZERO: Timespec = Timespec {
        seconds: 0,
        nanos: 0,
    };

    pub fn new(seconds: u64, nanos: u32) -> Timespec {
        let mut ts = Timespec { seconds, nanos };
        ts.normalize();
        ts
    }

    fn normalize(&mut self) {
        if self.nanos >= NANOS_PER_SEC {
            self.seconds += (self.nanos / NANOS_PER_SEC) as u64;
            self.nanos %= NANOS_PER_SEC;
        }
    }

    pub fn is_zero(&self) -> bool {
        self.seconds == 0 && self.nanos == 0
    }

    /// Splits a non-negative floating-point second count into integer and
    /// fractional parts. Negative inputs normalize to zero, matching the
    /// reference's treatment of timer durations (which can never be
    /// negative once validated by the caller).
    pub fn from_secs_f64(secs: f64) -> Timespec {
        if !(secs > 0.0) {
            return Timespec::ZERO;
        }
        let seconds = secs.trunc() as u64;
        let nanos = (secs.fract() * NANOS_PER_SEC as f64).round() as u32;
        Timespec::new(seconds, nanos)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.seconds as f64 + self.nanos as f64 / NANOS_PER_SEC as f64
    }

    /// Saturates at `u64::MAX` on overflow; no real timer period approaches
    /// that many nanoseconds, but saturating keeps the conversion total.
    pub fn as_nanos_u64(&self) -> u64 {
        (self.seconds as u128 * NANOS_PER_SEC as u128 + self.nanos as u128)
            .min(u64::MAX as u128) as u64
    }

    pub fn add(&self, other: &Timespec) -> Timespec {
        Timespec::new(
            self.seconds.saturating_add(other.seconds),
            self.nanos + other.nanos,
        )
    }

    /// Saturates at zero if `other` is larger than `self`.
    pub fn saturating_sub(&self, other: &Timespec) -> Timespec {
        let mut lhs_nanos = self.nanos as i64;
        let mut lhs_secs = self.seconds as i64;
        lhs_secs -= other.seconds as i64;
        lhs_nanos -= other.nanos as i64;
        if lhs_nanos < 0 {
            lhs_nanos += NANOS_PER_SEC as i64;
            lhs_secs -= 1;
        }
        if lhs_secs < 0 {
            return Timespec::ZERO;
        }
        Timespec::new(lhs_secs as u64, lhs_nanos as u32)
    }

    pub fn from_duration(d: Duration) -> Timespec {
        Timespec::new(d.as_secs(), d.subsec_nanos())
    }

    pub fn to_duration(&self) -> Duration {
        Duration::new(self.seconds, self.nanos)
    }

    pub(crate) fn to_libc_timespec(&self) -> libc::timespec {
        libc::timespec {
            tv_sec: self.seconds as libc::time_t,
            tv_nsec: self.nanos as libc::c_long,
        }
    }

    pub(crate) fn from_libc_timespec(ts: &libc::timespec) -> Timespec {
        if ts.tv_sec < 0 || ts.tv_nsec < 0 {
            Timespec::ZERO
        } else {
            Timespec::new(ts.tv_sec as u64, ts.tv_nsec as u32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_overflowing_nanos() {
        let ts = Timespec::new(1, 1_500_000_000);
        assert_eq!(ts.seconds, 2);
        assert_eq!(ts.nanos, 500_000_000);
    }

    #[test]
    fn negative_double_normalizes_to_zero() {
        assert_eq!(Timespec::from_secs_f64(-1.0), Timespec::ZERO);
        assert_eq!(Timespec::from_secs_f64(0.0), Timespec::ZERO);
    }

    #[test]
    fn splits_fractional_seconds() {
        let ts = Timespec::from_secs_f64(1.5);
        assert_eq!(ts.seconds, 1);
        assert_eq!(ts.nanos, 500_000_000);
    }

    #[test]
    fn saturating_sub_clamps_at_zero() {
        let a = Timespec::new(1, 0);
        let b = Timespec::new(2, 0);
        assert_eq!(a.saturating_sub(&b), Timespec::ZERO);
    }

    #[test]
    fn as_nanos_saturates() {
        let ts = Timespec::new(u64::MAX, 999_999_999);
        assert_eq!(ts.as_nanos_u64(), u64::MAX);
    }

    #[test]
    fn round_trips_through_duration() {
        let ts = Timespec::new(3, 250_000_000);
        assert_eq!(Timespec::from_duration(ts.to_duration()), ts);
    }
}
