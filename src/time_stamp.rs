//! Rational time bases and time stamps
//!
//! A [`TimeStamp`] is an integer count interpreted against a [`Rational`]
//! time base. Stamps with different time bases are compared exactly by
//! cross-multiplication, never by comparing their raw counts.

use crate::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::ops::AddAssign;

/// Duration of one time stamp tick, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i32,
    den: i32,
}

impl Rational {
    /// One millisecond per tick
    pub const MILLISECOND: Rational = Rational { num: 1, den: 1000 };

    /// One second per tick
    pub const SECOND: Rational = Rational { num: 1, den: 1 };

    /// Create a time base. Both terms must be non-zero.
    pub fn new(num: i32, den: i32) -> Result<Self> {
        if num == 0 || den == 0 {
            return Err(Error::Configuration(format!(
                "Invalid time base {}/{}",
                num, den
            )));
        }

        // Keep the denominator positive so cross-multiplication preserves order
        if den < 0 {
            return Ok(Self {
                num: num.checked_neg().ok_or_else(overflow)?,
                den: den.checked_neg().ok_or_else(overflow)?,
            });
        }

        Ok(Self { num, den })
    }

    /// Time base of `1/rate`, e.g. a sample rate or a frame rate
    pub fn per(rate: u32) -> Result<Self> {
        let den = i32::try_from(rate)
            .map_err(|_| Error::Configuration(format!("Rate {} is out of range", rate)))?;

        Self::new(1, den)
    }

    pub fn num(&self) -> i32 {
        self.num
    }

    pub fn den(&self) -> i32 {
        self.den
    }

    /// Value of one tick in seconds
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::SECOND
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

fn overflow() -> Error {
    Error::Configuration("Time base term overflows".to_string())
}

/// Compare `a` ticks of `a_base` with `b` ticks of `b_base`
pub fn compare(a: i64, a_base: Rational, b: i64, b_base: Rational) -> Ordering {
    let left = a as i128 * a_base.num as i128 * b_base.den as i128;
    let right = b as i128 * b_base.num as i128 * a_base.den as i128;
    left.cmp(&right)
}

/// Convert `value` from ticks of `from` into ticks of `to`.
///
/// Rounds to the nearest tick, halfway cases away from zero. Saturates at the
/// `i64` range.
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    let mut numerator = value as i128 * from.num as i128 * to.den as i128;
    let mut denominator = from.den as i128 * to.num as i128;

    if denominator < 0 {
        numerator = -numerator;
        denominator = -denominator;
    }

    let rounded = if numerator >= 0 {
        (2 * numerator + denominator) / (2 * denominator)
    } else {
        -((-2 * numerator + denominator) / (2 * denominator))
    };

    rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Integer count of ticks in a time base
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeStamp {
    count: i64,
    time_base: Rational,
}

impl TimeStamp {
    pub fn new(count: i64, time_base: Rational) -> Self {
        Self { count, time_base }
    }

    /// Whole seconds, in a `1/1` time base
    pub fn seconds(count: i64) -> Self {
        Self::new(count, Rational::SECOND)
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn increment(&mut self) {
        self.count += 1;
    }

    pub fn as_seconds(&self) -> f64 {
        self.time_base.as_f64() * self.count as f64
    }
}

impl AddAssign<i64> for TimeStamp {
    fn add_assign(&mut self, count: i64) {
        self.count += count;
    }
}

impl PartialEq for TimeStamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimeStamp {}

impl PartialOrd for TimeStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self.count, self.time_base, other.count, other.time_base)
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.count)
    }
}

/// Significant digits printed by [`Seconds`]
const SECONDS_PRECISION: i32 = 6;

/// Displays a time stamp in seconds with six significant digits
pub struct Seconds<'a>(pub &'a TimeStamp);

impl fmt::Display for Seconds<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seconds = self.0.as_seconds();
        if seconds == 0.0 {
            return f.write_str("0");
        }

        let exponent = seconds.abs().log10().floor() as i32;
        if !(-4..SECONDS_PRECISION).contains(&exponent) {
            let text = format!("{:.*e}", (SECONDS_PRECISION - 1) as usize, seconds);
            let (mantissa, exponent) = text.split_once('e').unwrap_or((text.as_str(), "0"));
            return write!(f, "{}e{}", trim_fraction(mantissa), exponent);
        }

        let decimals = (SECONDS_PRECISION - 1 - exponent).max(0) as usize;
        f.write_str(trim_fraction(&format!("{:.*}", decimals, seconds)))
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_terms() {
        assert!(Rational::new(0, 30).is_err());
        assert!(Rational::new(1, 0).is_err());
        assert!(Rational::per(0).is_err());
    }

    #[test]
    fn test_negative_denominator_is_normalized() {
        let base = Rational::new(1, -25).unwrap();
        assert_eq!(base.num(), -1);
        assert_eq!(base.den(), 25);
    }

    #[test]
    fn test_cross_base_comparison_matches_seconds() {
        let bases = [
            Rational::per(30).unwrap(),
            Rational::per(44100).unwrap(),
            Rational::per(48000).unwrap(),
            Rational::new(1001, 30000).unwrap(),
            Rational::MILLISECOND,
            Rational::SECOND,
        ];

        let counts = [0i64, 1, 7, 29, 30, 441, 10000, 44100, 123_456];

        for &a_base in &bases {
            for &b_base in &bases {
                for &a in &counts {
                    for &b in &counts {
                        let exact = compare(a, a_base, b, b_base);
                        let left = a as f64 * a_base.as_f64();
                        let right = b as f64 * b_base.as_f64();

                        if (left - right).abs() > 1e-9 {
                            assert_eq!(
                                exact,
                                left.partial_cmp(&right).unwrap(),
                                "{} @ {} vs {} @ {}",
                                a,
                                a_base,
                                b,
                                b_base
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_equal_instants_in_different_bases() {
        let video = TimeStamp::new(450, Rational::per(30).unwrap());
        let audio = TimeStamp::new(661_500, Rational::per(44100).unwrap());
        assert_eq!(video, audio);
        assert_eq!(video, TimeStamp::seconds(15));
        assert!(TimeStamp::new(451, Rational::per(30).unwrap()) > TimeStamp::seconds(15));
    }

    #[test]
    fn test_rescale_rounds_to_nearest() {
        let samples = Rational::per(44100).unwrap();
        assert_eq!(rescale(10000, samples, Rational::MILLISECOND), 227);
        assert_eq!(rescale(22050, samples, Rational::MILLISECOND), 500);
        assert_eq!(rescale(-10000, samples, Rational::MILLISECOND), -227);
        assert_eq!(rescale(1, Rational::per(30).unwrap(), Rational::per(30).unwrap()), 1);
    }

    #[test]
    fn test_increment_and_add() {
        let mut stamp = TimeStamp::new(0, Rational::per(44100).unwrap());
        stamp += 10000;
        stamp.increment();
        assert_eq!(stamp.count(), 10001);
    }

    #[test]
    fn test_display() {
        let stamp = TimeStamp::new(15, Rational::per(30).unwrap());
        assert_eq!(stamp.to_string(), "15");
        assert_eq!(Seconds(&stamp).to_string(), "0.5");
        assert_eq!(Seconds(&TimeStamp::seconds(0)).to_string(), "0");
    }

    #[test]
    fn test_seconds_keep_six_significant_digits() {
        let samples = Rational::per(44100).unwrap();
        assert_eq!(Seconds(&TimeStamp::new(10000, samples)).to_string(), "0.226757");
        assert_eq!(Seconds(&TimeStamp::new(661_500, samples)).to_string(), "15");
        assert_eq!(Seconds(&TimeStamp::new(-1, Rational::per(3).unwrap())).to_string(), "-0.333333");
        assert_eq!(Seconds(&TimeStamp::new(1, Rational::per(48000).unwrap())).to_string(), "2.08333e-5");
        assert_eq!(Seconds(&TimeStamp::seconds(1_234_567)).to_string(), "1.23457e6");
        assert_eq!(Seconds(&TimeStamp::new(12_345_678, Rational::MILLISECOND)).to_string(), "12345.7");
    }
}
