use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid number: '{0}'")]
pub struct ParseNumberError(pub String);

/// A currency value as it appears in brokerage exports (`$1,234.56`,
/// `-$0.66`, `($12.00)`). The parsed scale is kept so prices quoted to four
/// places survive a read/write cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn new(amount: Decimal) -> Self {
        Money(amount)
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn amount(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Parses an optional cell: blank means absent.
    /// `None` when the sum does not fit in a `Decimal`.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    pub fn parse_optional(s: &str) -> Result<Option<Money>, ParseNumberError> {
        if s.trim().is_empty() {
            return Ok(None);
        }
        s.parse().map(Some)
    }
}

impl FromStr for Money {
    type Err = ParseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, body) = if trimmed.starts_with('(') && trimmed.ends_with(')') {
            (true, &trimmed[1..trimmed.len() - 1])
        } else {
            (false, trimmed)
        };
        let cleaned = body.replace(['$', ',', ' '], "");
        if cleaned.is_empty() {
            return Err(ParseNumberError(s.to_string()));
        }
        let mut value =
            Decimal::from_str(&cleaned).map_err(|_| ParseNumberError(s.to_string()))?;
        if negative {
            value = -value;
        }
        Ok(Money(value))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut magnitude = self.0.abs();
        magnitude.rescale(magnitude.scale().max(2));
        let text = magnitude.to_string();
        let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), ""));
        let sign = if self.is_negative() { "-" } else { "" };
        write!(f, "{sign}${}", group_thousands(whole))?;
        if !frac.is_empty() {
            write!(f, ".{frac}")?;
        }
        Ok(())
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// Parses a share quantity (`1,234.5`, `-161`). Blank means absent.
pub fn parse_quantity(s: &str) -> Result<Option<Decimal>, ParseNumberError> {
    let cleaned = s.trim().replace(',', "");
    if cleaned.is_empty() {
        return Ok(None);
    }
    Decimal::from_str(&cleaned)
        .map(Some)
        .map_err(|_| ParseNumberError(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[test]
    fn parse_plain_and_dollar() {
        assert_eq!(money("123.45").amount(), Decimal::new(12345, 2));
        assert_eq!(money("$99.99").amount(), Decimal::new(9999, 2));
    }

    #[test]
    fn parse_negative_forms() {
        assert_eq!(money("-$1,501.00").amount(), Decimal::new(-150100, 2));
        assert_eq!(money("$-5.00").amount(), Decimal::new(-500, 2));
        assert_eq!(money("(75.25)").amount(), Decimal::new(-7525, 2));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("not_a_number".parse::<Money>().is_err());
        assert!("$".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
    }

    #[test]
    fn parse_optional_blank_is_none() {
        assert_eq!(Money::parse_optional("  ").unwrap(), None);
        assert_eq!(Money::parse_optional("$0.66").unwrap(), Some(money("0.66")));
    }

    #[test]
    fn display_groups_thousands_and_keeps_sign() {
        assert_eq!(money("-$1501.00").to_string(), "-$1,501.00");
        assert_eq!(money("$78327.34").to_string(), "$78,327.34");
        assert_eq!(money("1234567.8").to_string(), "$1,234,567.80");
        assert_eq!(money("$100").to_string(), "$100.00");
    }

    #[test]
    fn display_keeps_extra_precision() {
        assert_eq!(money("$0.6543").to_string(), "$0.6543");
        assert_eq!(money("$9917.27").to_string(), "$9,917.27");
    }

    #[test]
    fn display_zero_has_no_sign() {
        assert_eq!(money("-0.00").to_string(), "$0.00");
    }

    #[test]
    fn display_round_trips() {
        for s in ["-$31.04", "$1,501.00", "$0.01", "-$100,000.00"] {
            assert_eq!(money(s).to_string(), s);
        }
    }

    #[test]
    fn checked_arithmetic_reports_overflow() {
        let max = Money::new(Decimal::MAX);
        assert_eq!(max.checked_add(money("1")), None);
        assert_eq!(Money::new(Decimal::MIN).checked_sub(money("1")), None);
        assert_eq!(money("-$31.04").checked_add(money("$31.04")), Some(Money::zero()));
    }

    #[test]
    fn quantity_parsing() {
        assert_eq!(parse_quantity("1,234.5").unwrap(), Some(Decimal::new(12345, 1)));
        assert_eq!(parse_quantity("-161").unwrap(), Some(Decimal::from(-161)));
        assert_eq!(parse_quantity("").unwrap(), None);
        assert!(parse_quantity("abc").is_err());
    }
}
