//! Monetary amounts and percentage rates.

use serde::{Deserialize, Serialize};

/// Money amount in the currency's minor unit (e.g. cents).
///
/// Signed so that adjustments and refunds can be expressed as negative deltas.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from minor units (1234 = 12.34).
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Creates an amount from whole major units (50 = 50.00).
    pub const fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    /// The zero amount.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// True for amounts above zero.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// True for exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// True for amounts below zero.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity. Callers pricing untrusted quantities check
    /// with [`Money::checked_multiply`] first.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0 * i64::from(quantity))
    }

    /// Multiplies by a quantity, or `None` on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    /// Adds two amounts, or `None` on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Applies a percentage rate, rounding half away from zero to the minor unit.
    pub fn apply_rate(&self, rate: Rate) -> Money {
        let product = i128::from(self.0) * i128::from(rate.basis_points());
        let half = i128::from(Rate::SCALE / 2);
        let rounded = if product >= 0 {
            (product + half) / i128::from(Rate::SCALE)
        } else {
            (product - half) / i128::from(Rate::SCALE)
        };
        Money(rounded as i64)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl std::ops::Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A percentage expressed in basis points (1 bp = 0.01%).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Rate(u32);

impl Rate {
    /// Basis points in 100%.
    pub const SCALE: u32 = 10_000;

    /// Creates a rate from basis points (250 = 2.5%).
    pub const fn from_basis_points(bps: u32) -> Self {
        Self(bps)
    }

    /// Creates a rate from a whole percentage (15 = 15%).
    pub const fn from_percent(percent: u32) -> Self {
        Self(percent * 100)
    }

    /// A 0% rate.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the rate in basis points.
    pub const fn basis_points(&self) -> u32 {
        self.0
    }

    /// Returns true for rates above 100%.
    pub fn exceeds_whole(&self) -> bool {
        self.0 > Self::SCALE
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}
