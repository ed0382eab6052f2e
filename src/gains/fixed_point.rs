//! Exact decimal arithmetic for token and USD amounts.
//!
//! A `FixedPoint` is an arbitrary-precision integer mantissa paired with an
//! explicit decimal scale, so `mantissa = 1500, scale = 3` is `1.5`. Token
//! amounts use the token's own `decimals` as scale; USD amounts use
//! [`USD_SCALE`]. Nothing here ever goes through a binary float except the
//! explicit [`FixedPoint::from_f64`] entry point used for API quotes.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Mul, Neg};
use std::str::FromStr;
use thiserror::Error;

/// Internal scale of every USD amount (wei-style precision).
pub const USD_SCALE: u32 = 18;

/// Errors raised by fixed-point arithmetic and parsing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivideByZero,

    #[error("scale mismatch: {left} vs {right}")]
    ScaleMismatch { left: u32, right: u32 },

    #[error("invalid decimal string: {0:?}")]
    Parse(String),

    #[error("non-finite number cannot be represented")]
    NonFinite,

    #[error("scale overflow")]
    ScaleOverflow,
}

/// Exact decimal value: `mantissa × 10^-scale`.
#[derive(Clone)]
pub struct FixedPoint {
    mantissa: BigInt,
    scale: u32,
}

/// Token quantity at the token's native `decimals`.
pub type TokenAmount = FixedPoint;

/// USD value, normally at [`USD_SCALE`].
pub type UsdAmount = FixedPoint;

fn pow10(exp: u32) -> BigInt {
    BigInt::from(10u8).pow(exp)
}

impl FixedPoint {
    /// Builds a value from a raw integer mantissa and a scale.
    pub fn from_raw(mantissa: impl Into<BigInt>, scale: u32) -> Self {
        Self {
            mantissa: mantissa.into(),
            scale,
        }
    }

    pub fn zero(scale: u32) -> Self {
        Self::from_raw(BigInt::zero(), scale)
    }

    /// The value `1` expressed at `scale`.
    pub fn one(scale: u32) -> Self {
        Self::from_raw(pow10(scale), scale)
    }

    /// Parses a decimal string and converts it to `scale`, truncating extra
    /// fractional digits.
    pub fn parse_with_scale(s: &str, scale: u32) -> Result<Self, ArithmeticError> {
        Ok(s.parse::<Self>()?.rescale(scale))
    }

    /// Parses a raw integer string (e.g. an on-chain `value`) at `scale`.
    pub fn parse_raw(s: &str, scale: u32) -> Result<Self, ArithmeticError> {
        let mantissa = s
            .trim()
            .parse::<BigInt>()
            .map_err(|_| ArithmeticError::Parse(s.to_string()))?;
        Ok(Self::from_raw(mantissa, scale))
    }

    /// Converts a float quote by printing it with `scale` fractional digits
    /// first, the same way a JSON rate is fixed before parsing units.
    pub fn from_f64(value: f64, scale: u32) -> Result<Self, ArithmeticError> {
        if !value.is_finite() {
            return Err(ArithmeticError::NonFinite);
        }
        format!("{:.*}", scale as usize, value).parse()
    }

    pub fn mantissa(&self) -> &BigInt {
        &self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa.is_zero()
    }

    /// True when the value is exactly one, at any scale.
    pub fn is_one(&self) -> bool {
        self.mantissa == pow10(self.scale)
    }

    pub fn is_negative(&self) -> bool {
        self.mantissa.is_negative()
    }

    /// -1, 0 or 1.
    pub fn signum(&self) -> i8 {
        if self.mantissa.is_positive() {
            1
        } else if self.mantissa.is_negative() {
            -1
        } else {
            0
        }
    }

    pub fn abs(&self) -> Self {
        Self::from_raw(self.mantissa.abs(), self.scale)
    }

    pub fn checked_add(&self, other: &Self) -> Result<Self, ArithmeticError> {
        self.require_same_scale(other)?;
        Ok(Self::from_raw(&self.mantissa + &other.mantissa, self.scale))
    }

    pub fn checked_sub(&self, other: &Self) -> Result<Self, ArithmeticError> {
        self.require_same_scale(other)?;
        Ok(Self::from_raw(&self.mantissa - &other.mantissa, self.scale))
    }

    /// Divides by `divisor` and returns the quotient at `out_scale`,
    /// truncated toward zero.
    pub fn checked_div(&self, divisor: &Self, out_scale: u32) -> Result<Self, ArithmeticError> {
        if divisor.is_zero() {
            return Err(ArithmeticError::DivideByZero);
        }
        let scale = out_scale
            .checked_add(divisor.scale)
            .ok_or(ArithmeticError::ScaleOverflow)?;
        let numerator = &self.mantissa * pow10(scale);
        let denominator = &divisor.mantissa * pow10(self.scale);
        Ok(Self::from_raw(numerator / denominator, out_scale))
    }

    /// Pads or truncates trailing digits. Truncation goes toward zero, never
    /// rounds.
    pub fn rescale(&self, scale: u32) -> Self {
        match scale.cmp(&self.scale) {
            Ordering::Equal => self.clone(),
            Ordering::Greater => {
                Self::from_raw(&self.mantissa * pow10(scale - self.scale), scale)
            }
            Ordering::Less => Self::from_raw(&self.mantissa / pow10(self.scale - scale), scale),
        }
    }

    /// Number of characters in the raw mantissa, sign included.
    pub fn raw_len(&self) -> usize {
        self.mantissa.to_string().len()
    }

    /// Two-decimal, comma-grouped display string (truncated).
    pub fn to_currency_string(&self) -> String {
        crate::gains::format::format_currency(&self.to_string())
    }

    fn require_same_scale(&self, other: &Self) -> Result<(), ArithmeticError> {
        if self.scale != other.scale {
            return Err(ArithmeticError::ScaleMismatch {
                left: self.scale,
                right: other.scale,
            });
        }
        Ok(())
    }

    fn aligned(&self, other: &Self) -> (BigInt, BigInt) {
        let scale = self.scale.max(other.scale);
        (
            &self.mantissa * pow10(scale - self.scale),
            &other.mantissa * pow10(scale - other.scale),
        )
    }
}

impl Mul for &FixedPoint {
    type Output = FixedPoint;

    /// Exact product; the result scale is the sum of both scales.
    fn mul(self, rhs: &FixedPoint) -> FixedPoint {
        FixedPoint::from_raw(&self.mantissa * &rhs.mantissa, self.scale + rhs.scale)
    }
}

impl Neg for FixedPoint {
    type Output = FixedPoint;

    fn neg(self) -> FixedPoint {
        FixedPoint::from_raw(-self.mantissa, self.scale)
    }
}

impl PartialEq for FixedPoint {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FixedPoint {}

impl PartialOrd for FixedPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FixedPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        let (left, right) = self.aligned(other);
        left.cmp(&right)
    }
}

impl FromStr for FixedPoint {
    type Err = ArithmeticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ArithmeticError::Parse(s.to_string());
        let trimmed = s.trim();
        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (unsigned, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let digits = format!("{}{}", int_part, frac_part);
        let magnitude = digits.parse::<BigInt>().map_err(|_| invalid())?;
        let mantissa = if negative { -magnitude } else { magnitude };
        Ok(Self::from_raw(mantissa, frac_part.len() as u32))
    }
}

impl fmt::Display for FixedPoint {
    /// Exact decimal rendering with trailing zeros trimmed, keeping one
    /// fractional digit (`1.0`, `0.015`, `-3.25`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.mantissa.is_negative() { "-" } else { "" };
        let digits = self.mantissa.abs().to_string();
        if self.scale == 0 {
            return write!(f, "{}{}", sign, digits);
        }

        let scale = self.scale as usize;
        let padded = format!("{:0>width$}", digits, width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        let frac_part = frac_part.trim_end_matches('0');
        let frac_part = if frac_part.is_empty() { "0" } else { frac_part };
        write!(f, "{}{}.{}", sign, int_part, frac_part)
    }
}

impl fmt::Debug for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedPoint({} @ {})", self, self.scale)
    }
}

impl Serialize for FixedPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FixedPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl Default for FixedPoint {
    fn default() -> Self {
        Self::zero(0)
    }
}

impl From<i64> for FixedPoint {
    fn from(value: i64) -> Self {
        Self::from_raw(value, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(s: &str) -> FixedPoint {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_tracks_scale() {
        let value = fp("12.345");
        assert_eq!(value.scale(), 3);
        assert_eq!(value.mantissa(), &BigInt::from(12345));

        let negative = fp("-0.5");
        assert_eq!(negative.scale(), 1);
        assert!(negative.is_negative());

        assert_eq!(fp(".25"), fp("0.25"));
        assert!("1.2.3".parse::<FixedPoint>().is_err());
        assert!("abc".parse::<FixedPoint>().is_err());
        assert!("".parse::<FixedPoint>().is_err());
        assert!("1e5".parse::<FixedPoint>().is_err());
    }

    #[test]
    fn test_add_then_sub_is_exact() {
        let pairs = [
            ("0.1", "0.2"),
            ("123456789012345678901234567890.123456789012345678", "0.000000000000000001"),
            ("-5.5", "2.5"),
        ];
        for (a, b) in pairs {
            let scale = 18;
            let a = FixedPoint::parse_with_scale(a, scale).unwrap();
            let b = FixedPoint::parse_with_scale(b, scale).unwrap();
            let round_trip = a.checked_add(&b).unwrap().checked_sub(&b).unwrap();
            assert_eq!(round_trip, a);
            assert_eq!(round_trip.mantissa(), a.mantissa());
        }
    }

    #[test]
    fn test_add_rejects_scale_mismatch() {
        let err = fp("1.0").checked_add(&fp("1.00")).unwrap_err();
        assert_eq!(err, ArithmeticError::ScaleMismatch { left: 1, right: 2 });
    }

    #[test]
    fn test_multiply_sums_scales() {
        let product = &fp("1.5") * &fp("0.25");
        assert_eq!(product.scale(), 3);
        assert_eq!(product, fp("0.375"));
    }

    #[test]
    fn test_divide_truncates_at_output_scale() {
        let third = fp("1").checked_div(&fp("3"), 5).unwrap();
        assert_eq!(third.to_string(), "0.33333");

        let negative = fp("-2").checked_div(&fp("3"), 2).unwrap();
        assert_eq!(negative.to_string(), "-0.66");

        let widened = fp("50.0").checked_div(&fp("3000"), 18).unwrap();
        assert_eq!(widened.to_string(), "0.016666666666666666");
    }

    #[test]
    fn test_divide_by_zero_is_an_error() {
        let err = fp("1").checked_div(&FixedPoint::zero(18), 18).unwrap_err();
        assert_eq!(err, ArithmeticError::DivideByZero);
    }

    #[test]
    fn test_divide_reports_scale_overflow() {
        let huge = FixedPoint::from_raw(BigInt::from(1), u32::MAX - 5);
        let err = fp("1").checked_div(&huge, 18).unwrap_err();
        assert_eq!(err, ArithmeticError::ScaleOverflow);
    }

    #[test]
    fn test_rescale_pads_and_truncates() {
        assert_eq!(fp("1.5").rescale(4).mantissa(), &BigInt::from(15000));
        assert_eq!(fp("1.999").rescale(2).to_string(), "1.99");
        assert_eq!(fp("-1.999").rescale(0).to_string(), "-1");
    }

    #[test]
    fn test_comparison_ignores_scale() {
        assert_eq!(fp("1.50"), fp("1.5"));
        assert!(fp("0.01") < fp("0.1"));
        assert!(fp("-2") < fp("1.999"));
        assert_eq!(fp("-3").abs(), fp("3"));
        assert_eq!(fp("-3").signum(), -1);
        assert_eq!(FixedPoint::zero(4).signum(), 0);
    }

    #[test]
    fn test_display_is_exact() {
        assert_eq!(FixedPoint::from_raw(1_000_000_000_000_000_000i64, 18).to_string(), "1.0");
        assert_eq!(FixedPoint::from_raw(5, 3).to_string(), "0.005");
        assert_eq!(FixedPoint::from_raw(-5, 3).to_string(), "-0.005");
        assert_eq!(FixedPoint::from_raw(42, 0).to_string(), "42");
    }

    #[test]
    fn test_from_f64_fixes_digits_first() {
        let quote = FixedPoint::from_f64(0.01, USD_SCALE).unwrap();
        assert_eq!(quote.scale(), USD_SCALE);
        assert_eq!(quote.to_string(), "0.01");
        assert!(FixedPoint::from_f64(f64::NAN, USD_SCALE).is_err());
        assert!(FixedPoint::one(6).is_one());
    }

    #[test]
    fn test_serde_uses_decimal_strings() {
        let json = serde_json::to_string(&fp("12.50")).unwrap();
        assert_eq!(json, "\"12.5\"");
        let back: FixedPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp("12.5"));
    }
}
