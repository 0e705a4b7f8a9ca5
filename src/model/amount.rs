//! Amount type for the numeric `amount` field of a record.
//!
//! Record stores are loose about this field: it arrives as a JSON number, as a numeric string, as a
//! formatted string such as `"$1,200.00"`, or not at all. `Amount` wraps `Decimal` and coerces all
//! of these on ingestion. Anything that cannot be understood becomes zero.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

/// Represents a numeric amount such as the cost of an expense or the price of a product.
///
/// # Examples
///
/// Strict parsing accepts a leading dollar sign and thousands separators:
/// ```
/// # use entity_list::model::Amount;
/// # use std::str::FromStr;
/// let amount = Amount::from_str("-$1,200.50").unwrap();
/// assert_eq!(amount.to_string(), "-1,200.50");
/// ```
///
/// Lenient coercion never fails:
/// ```
/// # use entity_list::model::Amount;
/// assert!(Amount::coerce("twelve").is_zero());
/// assert_eq!(Amount::coerce("1200").to_string(), "1,200.00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount {
    value: Decimal,
}

impl Amount {
    pub const ZERO: Amount = Amount {
        value: Decimal::ZERO,
    };

    /// Creates a new Amount from a Decimal value.
    pub const fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Parses `s` leniently: whitespace is trimmed, a dollar sign and commas are removed, and
    /// anything that still does not parse is treated as zero.
    pub fn coerce(s: &str) -> Self {
        Amount::from_str(s).unwrap_or_default()
    }

    /// Coerces an arbitrary JSON value. Numbers and numeric strings are kept, everything else
    /// (null, booleans, arrays, objects, garbage strings) is zero. A number too large for a
    /// `Decimal` is clamped to `Decimal::MAX` or `Decimal::MIN`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => Self::from_json_number(n),
            serde_json::Value::String(s) => Self::coerce(s),
            _ => Self::ZERO,
        }
    }

    fn from_json_number(n: &serde_json::Number) -> Self {
        if let Some(i) = n.as_i64() {
            return Decimal::from(i).into();
        }
        if let Some(u) = n.as_u64() {
            return Decimal::from(u).into();
        }
        let text = n.to_string();
        let parsed = Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .ok()
            .or_else(|| n.as_f64().and_then(Decimal::from_f64));
        match (parsed, n.as_f64()) {
            (Some(value), _) => Amount::new(value),
            (None, Some(f)) if f.is_finite() && f.abs() > 1.0 => {
                if f.is_sign_negative() {
                    Amount::new(Decimal::MIN)
                } else {
                    Amount::new(Decimal::MAX)
                }
            }
            _ => Amount::ZERO,
        }
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.value().is_zero()
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.value().is_sign_negative()
    }
}

/// An error that can occur when strictly parsing strings into `Amount` values.
pub struct AmountError(rust_decimal::Error);

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Amount::default());
        }

        // "-$50.00", "$50.00" and "-50.00" are all accepted
        let without_dollar = if let Some(after_minus) = trimmed.strip_prefix('-') {
            match after_minus.strip_prefix('$') {
                Some(after_dollar) => format!("-{after_dollar}"),
                None => trimmed.to_string(),
            }
        } else {
            trimmed.strip_prefix('$').unwrap_or(trimmed).to_string()
        };

        let without_commas = without_dollar.replace(',', "");
        let value = Decimal::from_str(&without_commas)
            .or_else(|_| Decimal::from_scientific(&without_commas))
            .map_err(AmountError)?;
        Ok(Amount::new(value))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        let num = self.value().abs();
        write!(
            f,
            "{sign}{}",
            format_num::format_num!(",.2", num.to_f64().unwrap_or_default())
        )
    }
}

impl Serialize for Amount {
    /// Serializes as a JSON number. Whole values are written as integers so that `1200` round-trips
    /// as `1200` rather than `1200.0`.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = self.value().normalize();
        if value.fract().is_zero() {
            if let Some(i) = value.to_i64() {
                return serializer.serialize_i64(i);
            }
        }
        serializer.serialize_f64(value.to_f64().unwrap_or_default())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Amount::from_json(&value))
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}

/// Addition saturates at `Decimal::MAX` and `Decimal::MIN` instead of overflowing.
impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Self) -> Self::Output {
        Amount::new(self.value.saturating_add(rhs.value))
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
