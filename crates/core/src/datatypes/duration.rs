//! The CQL duration wire type.
//!
//! Durations are `(months, days, nanoseconds)` triples; neither months nor
//! days convert into each other (a month is not a fixed number of days).
//! Two string notations exist on the wire:
//!
//! - compact: `12y3mo1d`, `30h20m`, `-2d12h`
//! - ISO 8601: `P1Y2M3DT4H5M6S`, `-PT30M`, `P1W`

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;

/// A CQL duration: months, days, and sub-day nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataApiDuration {
    months: i32,
    days: i32,
    nanoseconds: i64,
}

/// Parse failure for a duration string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration '{input}': {reason}")]
pub struct ParseDurationError {
    input: String,
    reason: String,
}

impl ParseDurationError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

impl DataApiDuration {
    /// Builds a duration from its components. All three must share a sign
    /// (or be zero).
    pub fn new(months: i32, days: i32, nanoseconds: i64) -> Option<Self> {
        let signs = [
            months.signum() as i64,
            days.signum() as i64,
            nanoseconds.signum(),
        ];
        let has_positive = signs.iter().any(|s| *s > 0);
        let has_negative = signs.iter().any(|s| *s < 0);
        if has_positive && has_negative {
            return None;
        }
        Some(Self {
            months,
            days,
            nanoseconds,
        })
    }

    /// The months component.
    pub fn months(&self) -> i32 {
        self.months
    }

    /// The days component.
    pub fn days(&self) -> i32 {
        self.days
    }

    /// The sub-day component, in nanoseconds.
    pub fn nanoseconds(&self) -> i64 {
        self.nanoseconds
    }

    /// True when every component is zero.
    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.days == 0 && self.nanoseconds == 0
    }

    /// True when the duration is negative.
    pub fn is_negative(&self) -> bool {
        self.months < 0 || self.days < 0 || self.nanoseconds < 0
    }

    fn parse_compact(input: &str) -> Result<Self, ParseDurationError> {
        let (negative, body) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input),
        };
        if body.is_empty() {
            return Err(ParseDurationError::new(input, "empty duration"));
        }

        let mut months = 0i32;
        let mut days = 0i32;
        let mut nanos = 0i64;

        let bytes = body.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let digits_start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if digits_start == i {
                return Err(ParseDurationError::new(input, "expected a number"));
            }
            let quantity: i64 = body[digits_start..i]
                .parse()
                .map_err(|_| ParseDurationError::new(input, "number out of range"))?;

            let unit_start = i;
            while i < bytes.len() && !bytes[i].is_ascii_digit() {
                i += 1;
            }
            let unit = &body[unit_start..i];

            match unit {
                "y" => months += (quantity * 12) as i32,
                "mo" => months += quantity as i32,
                "w" => days += (quantity * 7) as i32,
                "d" => days += quantity as i32,
                "h" => nanos += quantity * NANOS_PER_HOUR,
                "m" => nanos += quantity * NANOS_PER_MINUTE,
                "s" => nanos += quantity * NANOS_PER_SECOND,
                "ms" => nanos += quantity * NANOS_PER_MILLI,
                "us" | "\u{b5}s" => nanos += quantity * NANOS_PER_MICRO,
                "ns" => nanos += quantity,
                other => {
                    return Err(ParseDurationError::new(
                        input,
                        format!("unknown unit '{other}'"),
                    ));
                }
            }
        }

        if negative {
            months = -months;
            days = -days;
            nanos = -nanos;
        }
        Ok(Self {
            months,
            days,
            nanoseconds: nanos,
        })
    }

    fn parse_iso(input: &str) -> Result<Self, ParseDurationError> {
        let (negative, body) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input),
        };
        let body = body
            .strip_prefix('P')
            .ok_or_else(|| ParseDurationError::new(input, "expected leading 'P'"))?;

        let (date_part, time_part) = match body.split_once('T') {
            Some((date, time)) => (date, Some(time)),
            None => (body, None),
        };

        let mut months = 0i32;
        let mut days = 0i32;
        let mut nanos = 0i64;

        for (quantity, unit) in iso_components(input, date_part)? {
            match unit {
                'Y' => months += (quantity * 12.0) as i32,
                'M' => months += quantity as i32,
                'W' => days += (quantity * 7.0) as i32,
                'D' => days += quantity as i32,
                other => {
                    return Err(ParseDurationError::new(
                        input,
                        format!("unexpected date unit '{other}'"),
                    ));
                }
            }
        }

        if let Some(time_part) = time_part {
            for (quantity, unit) in iso_components(input, time_part)? {
                match unit {
                    'H' => nanos += (quantity * NANOS_PER_HOUR as f64) as i64,
                    'M' => nanos += (quantity * NANOS_PER_MINUTE as f64) as i64,
                    'S' => nanos += (quantity * NANOS_PER_SECOND as f64) as i64,
                    other => {
                        return Err(ParseDurationError::new(
                            input,
                            format!("unexpected time unit '{other}'"),
                        ));
                    }
                }
            }
        }

        if negative {
            months = -months;
            days = -days;
            nanos = -nanos;
        }
        Ok(Self {
            months,
            days,
            nanoseconds: nanos,
        })
    }
}

fn iso_components(input: &str, part: &str) -> Result<Vec<(f64, char)>, ParseDurationError> {
    let mut components = Vec::new();
    let mut number = String::new();
    for ch in part.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            number.push(ch);
        } else {
            let quantity: f64 = number
                .parse()
                .map_err(|_| ParseDurationError::new(input, "expected a number"))?;
            components.push((quantity, ch));
            number.clear();
        }
    }
    if !number.is_empty() {
        return Err(ParseDurationError::new(input, "dangling number"));
    }
    Ok(components)
}

impl FromStr for DataApiDuration {
    type Err = ParseDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseDurationError::new(s, "empty duration"));
        }
        if s.starts_with('P') || s.starts_with("-P") {
            Self::parse_iso(s)
        } else {
            Self::parse_compact(s)
        }
    }
}

impl fmt::Display for DataApiDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0s");
        }
        if self.is_negative() {
            f.write_str("-")?;
        }

        let months = self.months.unsigned_abs();
        let days = self.days.unsigned_abs();
        let mut nanos = self.nanoseconds.unsigned_abs();

        if months >= 12 {
            write!(f, "{}y", months / 12)?;
        }
        if months % 12 != 0 {
            write!(f, "{}mo", months % 12)?;
        }
        if days != 0 {
            write!(f, "{days}d")?;
        }

        for (per, unit) in [
            (NANOS_PER_HOUR as u64, "h"),
            (NANOS_PER_MINUTE as u64, "m"),
            (NANOS_PER_SECOND as u64, "s"),
            (NANOS_PER_MILLI as u64, "ms"),
            (NANOS_PER_MICRO as u64, "us"),
            (1, "ns"),
        ] {
            let quantity = nanos / per;
            if quantity != 0 {
                write!(f, "{quantity}{unit}")?;
                nanos %= per;
            }
        }
        Ok(())
    }
}

impl Serialize for DataApiDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DataApiDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compact_notation() {
        let d: DataApiDuration = "12y3mo1d".parse().unwrap();
        assert_eq!(d.months(), 147);
        assert_eq!(d.days(), 1);
        assert_eq!(d.nanoseconds(), 0);

        let t: DataApiDuration = "30h20m5s".parse().unwrap();
        assert_eq!(
            t.nanoseconds(),
            30 * NANOS_PER_HOUR + 20 * NANOS_PER_MINUTE + 5 * NANOS_PER_SECOND
        );
    }

    #[test]
    fn parses_negative_compact() {
        let d: DataApiDuration = "-2d12h".parse().unwrap();
        assert_eq!(d.days(), -2);
        assert_eq!(d.nanoseconds(), -12 * NANOS_PER_HOUR);
        assert!(d.is_negative());
    }

    #[test]
    fn parses_iso_notation() {
        let d: DataApiDuration = "P1Y2M3DT4H5M6S".parse().unwrap();
        assert_eq!(d.months(), 14);
        assert_eq!(d.days(), 3);
        assert_eq!(
            d.nanoseconds(),
            4 * NANOS_PER_HOUR + 5 * NANOS_PER_MINUTE + 6 * NANOS_PER_SECOND
        );

        let w: DataApiDuration = "P2W".parse().unwrap();
        assert_eq!(w.days(), 14);
    }

    #[test]
    fn display_round_trips_through_parse() {
        for input in ["12y3mo1d", "30h20m", "-2d12h", "1s500ms", "750us250ns"] {
            let parsed: DataApiDuration = input.parse().unwrap();
            let reparsed: DataApiDuration = parsed.to_string().parse().unwrap();
            assert_eq!(parsed, reparsed, "failed for {input}");
        }
    }

    #[test]
    fn mixed_signs_are_rejected() {
        assert!(DataApiDuration::new(1, -1, 0).is_none());
        assert!(DataApiDuration::new(0, 1, -5).is_none());
        assert!(DataApiDuration::new(-1, -1, -5).is_some());
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<DataApiDuration>().is_err());
        assert!("5parsecs".parse::<DataApiDuration>().is_err());
        assert!("P5Q".parse::<DataApiDuration>().is_err());
        assert!("12".parse::<DataApiDuration>().is_err());
    }

    #[test]
    fn zero_renders_as_zero_seconds() {
        assert_eq!(DataApiDuration::default().to_string(), "0s");
    }
}
