use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PlanError;

/// Ingredient amount stored as hundredths, so sums are exact and
/// independent of the order they are added in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(i64);

const SCALE: i64 = 100;

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    #[must_use]
    pub fn from_hundredths(hundredths: i64) -> Self {
        Self(hundredths)
    }

    #[must_use]
    pub fn hundredths(self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn whole(n: i64) -> Self {
        Self(n.saturating_mul(SCALE))
    }

    /// Round a float to the nearest hundredth. Non-finite and negative
    /// values are rejected.
    pub fn from_f64(value: f64) -> Result<Self, PlanError> {
        if !value.is_finite() {
            return Err(PlanError::validation("quantity", "must be a finite number"));
        }
        if value < 0.0 {
            return Err(PlanError::validation("quantity", "must not be negative"));
        }
        #[allow(clippy::cast_precision_loss)]
        let max = (i64::MAX / SCALE) as f64;
        if value > max {
            return Err(PlanError::validation("quantity", "is too large"));
        }
        Ok(Self((value * 100.0).round() as i64))
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::ZERO, Add::add)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE;
        let frac = self.0 % SCALE;
        if frac == 0 {
            write!(f, "{whole}")
        } else if frac % 10 == 0 {
            write!(f, "{whole}.{}", frac / 10)
        } else {
            write!(f, "{whole}.{frac:02}")
        }
    }
}

/// Accepts "2", "1.5", "1/2" and mixed fractions like "1 1/2".
impl FromStr for Quantity {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PlanError::validation("quantity", "must not be empty"));
        }

        let mut parts = trimmed.split_whitespace();
        let first = parts.next().unwrap_or_default();
        match (parts.next(), parts.next()) {
            (None, _) => parse_simple(first),
            (Some(second), None) if second.contains('/') && !first.contains('/') => {
                let whole = parse_decimal(first)?;
                let frac = parse_fraction(second)?;
                Ok(whole + frac)
            }
            _ => Err(PlanError::validation(
                "quantity",
                format!("'{trimmed}' is not a number or fraction"),
            )),
        }
    }
}

fn parse_simple(s: &str) -> Result<Quantity, PlanError> {
    if s.contains('/') {
        parse_fraction(s)
    } else {
        parse_decimal(s)
    }
}

fn parse_decimal(s: &str) -> Result<Quantity, PlanError> {
    let value: f64 = s.parse().map_err(|_| {
        PlanError::validation("quantity", format!("'{s}' is not a number or fraction"))
    })?;
    Quantity::from_f64(value)
}

fn parse_fraction(s: &str) -> Result<Quantity, PlanError> {
    let (num, den) = s.split_once('/').ok_or_else(|| {
        PlanError::validation("quantity", format!("'{s}' is not a fraction"))
    })?;
    let num: u32 = num
        .trim()
        .parse()
        .map_err(|_| PlanError::validation("quantity", format!("invalid numerator in '{s}'")))?;
    let den: u32 = den
        .trim()
        .parse()
        .map_err(|_| PlanError::validation("quantity", format!("invalid denominator in '{s}'")))?;
    if den == 0 {
        return Err(PlanError::validation(
            "quantity",
            "denominator cannot be zero",
        ));
    }
    Quantity::from_f64(f64::from(num) / f64::from(den))
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct QuantityVisitor;

        impl Visitor<'_> for QuantityVisitor {
            type Value = Quantity;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a non-negative number or a fraction string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Quantity, E> {
                let v = i64::try_from(v).map_err(E::custom)?;
                Ok(Quantity::whole(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Quantity, E> {
                if v < 0 {
                    return Err(E::custom("quantity must not be negative"));
                }
                Ok(Quantity::whole(v))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Quantity, E> {
                Quantity::from_f64(v).map_err(E::custom)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Quantity, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(QuantityVisitor)
    }
}
