use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed-point decimal with 4 decimal places, stored as a scaled integer.
///
/// Persisted as a plain JSON number so stored records stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Amount(i64);

impl Amount {
    const SCALE: i64 = 10_000;
    const DECIMALS: usize = 4;

    pub const ZERO: Amount = Amount(0);

    pub fn from_float(value: f64) -> Self {
        Amount((value * Self::SCALE as f64).round() as i64)
    }

    pub fn from_scaled(value: i64) -> Self {
        Amount(value)
    }

    pub fn to_float(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// `None` when the sum leaves the representable range.
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// `None` when the difference leaves the representable range.
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }
}

impl From<f64> for Amount {
    fn from(value: f64) -> Self {
        Amount::from_float(value)
    }
}

impl From<Amount> for f64 {
    fn from(value: Amount) -> Self {
        value.to_float()
    }
}

impl fmt::Display for Amount {
    /// Four decimals unless a precision is requested (`{:.2}`), in which case
    /// the value is rounded half away from zero.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decimals = f.precision().unwrap_or(Self::DECIMALS);
        let abs = self.0.unsigned_abs();

        let (scaled, scale) = if decimals >= Self::DECIMALS {
            (abs, 10u64.pow(Self::DECIMALS as u32))
        } else {
            let divisor = 10u64.pow((Self::DECIMALS - decimals) as u32);
            ((abs + divisor / 2) / divisor, 10u64.pow(decimals as u32))
        };

        let sign = if self.0 < 0 && scaled != 0 { "-" } else { "" };
        let whole = scaled / scale;
        if decimals == 0 {
            return write!(f, "{sign}{whole}");
        }

        let frac = scaled % scale;
        let width = decimals.min(Self::DECIMALS);
        let padding = decimals.saturating_sub(Self::DECIMALS);
        write!(f, "{sign}{whole}.{frac:0width$}{:0<padding$}", "")
    }
}

impl std::ops::Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Amount(-self.0)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}
