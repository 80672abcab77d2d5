use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;
use thiserror::Error;

//--------------------------------------      Points       -----------------------------------------------------------
/// A quantity of reward points, stored as hundredths of a point.
///
/// The accrual service and the public API both speak fractional numbers
/// ("42.5" points), while the database and all arithmetic use integral
/// hundredths so that no floating point error can creep into balances.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd)]
#[sqlx(transparent)]
pub struct Points(i64);

impl Add for Points {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Points {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Points {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Points {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in points: {0}")]
pub struct PointsConversionError(String);

impl Points {
    pub const ZERO: Points = Points(0);

    /// The raw value in hundredths of a point.
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The fractional representation used on the wire.
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl From<i64> for Points {
    fn from(hundredths: i64) -> Self {
        Self(hundredths)
    }
}

impl TryFrom<f64> for Points {
    type Error = PointsConversionError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(PointsConversionError(format!("{value} is not a finite number")));
        }
        let hundredths = (value * 100.0).round();
        if hundredths.abs() > i64::MAX as f64 {
            return Err(PointsConversionError(format!("{value} is out of range")));
        }
        Ok(Self(hundredths as i64))
    }
}

impl PartialEq for Points {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Points {}

impl Sum for Points {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl Display for Points {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.as_f64())
    }
}

impl Serialize for Points {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Points {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Points::try_from(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic_uses_hundredths() {
        let a = Points::from(4_250);
        let b = Points::from(1_000);
        assert_eq!((a + b).value(), 5_250);
        assert_eq!((a - b).value(), 3_250);
        assert_eq!((-b).value(), -1_000);
        let mut c = a;
        c -= b;
        assert_eq!(c, Points::from(3_250));
    }

    #[test]
    fn sums_to_zero_on_empty_iterator() {
        let total: Points = Vec::<Points>::new().into_iter().sum();
        assert_eq!(total, Points::ZERO);
    }

    #[test]
    fn wire_format_is_fractional() {
        let p = Points::from(4_250);
        assert_eq!(serde_json::to_string(&p).unwrap(), "42.5");
        let q: Points = serde_json::from_str("42.5").unwrap();
        assert_eq!(q, p);
        let r: Points = serde_json::from_str("7").unwrap();
        assert_eq!(r.value(), 700);
    }

    #[test]
    fn rejects_non_finite_values() {
        assert!(Points::try_from(f64::NAN).is_err());
        assert!(Points::try_from(f64::INFINITY).is_err());
        assert!(serde_json::from_str::<Points>("1e300").unwrap_err().to_string().contains("out of range"));
    }

    #[test]
    fn displays_two_decimals() {
        assert_eq!(Points::from(4_250).to_string(), "42.50");
        assert_eq!(Points::from(1).to_string(), "0.01");
    }
}
