//! Arbitrary-precision numbers for `varint` and `decimal` columns.
//!
//! The wire parse is always lossless (serde_json's `arbitrary_precision`
//! keeps the raw digits); this type is how those digits surface in user
//! land without truncation.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{self, Serialize, Serializer};

/// An integer or decimal of arbitrary precision.
#[derive(Debug, Clone, PartialEq)]
pub enum BigNumber {
    /// Arbitrary-precision integer (`varint`, `bigint` beyond `i64`).
    Varint(BigInt),
    /// Arbitrary-precision decimal (`decimal`).
    Decimal(BigDecimal),
}

/// Parse failure for a numeric literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid number literal '{0}'")]
pub struct ParseBigNumberError(String);

impl BigNumber {
    /// True for the integer variant.
    pub fn is_integer(&self) -> bool {
        matches!(self, BigNumber::Varint(_))
    }

    /// The integer value, if this is a varint.
    pub fn as_bigint(&self) -> Option<&BigInt> {
        match self {
            BigNumber::Varint(i) => Some(i),
            BigNumber::Decimal(_) => None,
        }
    }

    /// The decimal value, if this is a decimal.
    pub fn as_decimal(&self) -> Option<&BigDecimal> {
        match self {
            BigNumber::Varint(_) => None,
            BigNumber::Decimal(d) => Some(d),
        }
    }

    /// The exact numeric literal.
    pub fn to_literal(&self) -> String {
        match self {
            BigNumber::Varint(i) => i.to_string(),
            BigNumber::Decimal(d) => d.to_string(),
        }
    }
}

impl From<BigInt> for BigNumber {
    fn from(value: BigInt) -> Self {
        BigNumber::Varint(value)
    }
}

impl From<BigDecimal> for BigNumber {
    fn from(value: BigDecimal) -> Self {
        BigNumber::Decimal(value)
    }
}

impl From<i64> for BigNumber {
    fn from(value: i64) -> Self {
        BigNumber::Varint(BigInt::from(value))
    }
}

impl FromStr for BigNumber {
    type Err = ParseBigNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(['.', 'e', 'E']) {
            BigDecimal::from_str(s)
                .map(BigNumber::Decimal)
                .map_err(|_| ParseBigNumberError(s.to_string()))
        } else {
            BigInt::from_str(s)
                .map(BigNumber::Varint)
                .map_err(|_| ParseBigNumberError(s.to_string()))
        }
    }
}

impl fmt::Display for BigNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal())
    }
}

impl Serialize for BigNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Emit a raw JSON number; `arbitrary_precision` carries the digits
        // through serde_json unchanged.
        let number =
            serde_json::Number::from_str(&self.to_literal()).map_err(ser::Error::custom)?;
        number.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BigNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let number = serde_json::Number::deserialize(deserializer)?;
        number.to_string().parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HUGE: &str = "123456789012345678901234567890123456789";

    #[test]
    fn integer_literals_parse_to_varint() {
        let n: BigNumber = HUGE.parse().unwrap();
        assert!(n.is_integer());
        assert_eq!(n.to_literal(), HUGE);
    }

    #[test]
    fn decimal_literals_parse_to_decimal() {
        let n: BigNumber = "1.234567890123456789012345".parse().unwrap();
        assert!(!n.is_integer());
        assert_eq!(n.to_literal(), "1.234567890123456789012345");
    }

    #[test]
    fn round_trips_through_json_without_precision_loss() {
        let original: BigNumber = HUGE.parse().unwrap();
        let wire = serde_json::to_string(&original).unwrap();
        assert_eq!(wire, HUGE);
        let back: BigNumber = serde_json::from_str(&wire).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn rejects_garbage() {
        assert!("12three".parse::<BigNumber>().is_err());
        assert!("".parse::<BigNumber>().is_err());
    }
}
