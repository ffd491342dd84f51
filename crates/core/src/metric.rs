use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{PerflogError, Result};

/// Largest scale a `Decimal` can carry.
pub const MAX_SCALE: u32 = 28;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricDefinition {
    /// Column heading in the report.
    pub name: String,
    pub application_id: u64,
    /// Remote metric name, sent as `metrics[]`.
    pub metric: String,
    pub field: String,
    pub xpath: String,
    #[serde(default = "default_multiplier")]
    pub multiplier: i64,
    pub scale: u32,
}

fn default_multiplier() -> i64 {
    1
}

impl MetricDefinition {
    pub fn transform(&self, raw: &str) -> Result<Decimal> {
        transform(raw, self.multiplier, self.scale).map_err(|e| match e {
            PerflogError::Parse(msg) => PerflogError::Parse(format!("metric {}: {msg}", self.name)),
            other => other,
        })
    }

    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("name", &self.name),
            ("metric", &self.metric),
            ("field", &self.field),
            ("xpath", &self.xpath),
        ] {
            if value.trim().is_empty() {
                return Err(PerflogError::Config(format!(
                    "metric {:?} has an empty {key}",
                    self.name
                )));
            }
        }
        if self.scale > MAX_SCALE {
            return Err(PerflogError::Config(format!(
                "metric {} has scale {} (max {MAX_SCALE})",
                self.name, self.scale
            )));
        }
        Ok(())
    }
}

/// Parses `raw` as an exact decimal, multiplies it and rounds half away from zero to
/// `scale` places. The result always carries exactly `scale` fractional digits.
pub fn transform(raw: &str, multiplier: i64, scale: u32) -> Result<Decimal> {
    let value = parse_decimal(raw)?;
    let product = value
        .checked_mul(Decimal::from(multiplier))
        .ok_or_else(|| PerflogError::Parse(format!("{raw} x {multiplier} overflows")))?;

    let mut rounded = product.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(scale);
    Ok(rounded)
}

/// Significant digits kept once a value has a fractional part. Any 28-digit mantissa
/// fits in 96 bits.
const MAX_FRACTIONAL_DIGITS: usize = 28;

fn parse_decimal(raw: &str) -> Result<Decimal> {
    let (negative, digits, exponent) = split_number(raw.trim())
        .ok_or_else(|| PerflogError::Parse(format!("{raw:?} is not a number")))?;
    to_decimal(negative, digits, exponent)
        .ok_or_else(|| PerflogError::Parse(format!("{raw:?} is out of range")))
}

/// Splits plain or scientific notation into sign, significant digits and a base-ten
/// exponent, so the value is `digits * 10^exponent`.
fn split_number(s: &str) -> Option<(bool, String, i64)> {
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(i) => (&s[..i], s[i + 1..].parse::<i64>().ok()?),
        None => (s, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part
        .chars()
        .chain(frac_part.chars())
        .all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let digits = format!("{int_part}{frac_part}")
        .trim_start_matches('0')
        .to_string();
    let frac_len = i64::try_from(frac_part.len()).ok()?;
    Some((negative, digits, exponent.checked_sub(frac_len)?))
}

/// Fractional digits past `MAX_SCALE` or past the mantissa width are truncated, which
/// leaves half-up rounding at any smaller scale unchanged. Integers too wide for the
/// mantissa are `None`.
fn to_decimal(negative: bool, mut digits: String, exponent: i64) -> Option<Decimal> {
    if digits.is_empty() {
        return Some(Decimal::ZERO);
    }
    let mut scale = exponent.checked_neg()?;
    if scale < 0 {
        let zeros = usize::try_from(-scale).ok()?;
        if digits.len() + zeros > MAX_FRACTIONAL_DIGITS + 1 {
            return None;
        }
        digits.push_str(&"0".repeat(zeros));
        scale = 0;
    }

    let max_scale = i64::from(MAX_SCALE);
    if scale > max_scale {
        let excess = usize::try_from(scale - max_scale).ok()?;
        digits.truncate(digits.len().saturating_sub(excess));
        scale = max_scale;
    }
    while digits.len() > MAX_FRACTIONAL_DIGITS && scale > 0 {
        digits.pop();
        scale -= 1;
    }
    if digits.is_empty() {
        return Some(Decimal::ZERO);
    }

    let magnitude: i128 = digits.parse().ok()?;
    let mantissa = if negative { -magnitude } else { magnitude };
    Decimal::try_from_i128_with_scale(mantissa, u32::try_from(scale).ok()?).ok()
}
