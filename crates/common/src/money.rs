use serde::{Deserialize, Serialize};

/// Money amount in paise (1/100 rupee) to avoid floating point drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    paise: i64,
}

impl Money {
    /// Creates an amount from paise.
    pub const fn from_paise(paise: i64) -> Self {
        Self { paise }
    }

    /// Creates an amount from whole rupees.
    pub fn from_rupees(rupees: i64) -> Self {
        Self {
            paise: rupees * 100,
        }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { paise: 0 }
    }

    /// Returns the amount in paise.
    pub fn paise(&self) -> i64 {
        self.paise
    }

    /// Returns the rupee amount as a float, for carrier and mail payloads only.
    pub fn as_rupees(&self) -> f64 {
        self.paise as f64 / 100.0
    }

    pub fn is_positive(&self) -> bool {
        self.paise > 0
    }

    pub fn is_zero(&self) -> bool {
        self.paise == 0
    }

    /// Multiplies by a quantity, saturating at the `i64` bounds.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            paise: self.paise.saturating_mul(i64::from(quantity)),
        }
    }

    /// Multiplies by a quantity, or `None` on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.paise
            .checked_mul(i64::from(quantity))
            .map(Money::from_paise)
    }

    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.paise.checked_add(other.paise).map(Money::from_paise)
    }

    /// Returns `percent`% of this amount, rounded half away from zero.
    pub fn percent(&self, percent: u32) -> Money {
        let scaled = self.paise * i64::from(percent);
        let rounded = if scaled >= 0 {
            (scaled + 50) / 100
        } else {
            (scaled - 50) / 100
        };
        Money { paise: rounded }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.paise < 0 { "-" } else { "" };
        let abs = self.paise.abs();
        write!(f, "{sign}₹{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            paise: self.paise + rhs.paise,
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            paise: self.paise - rhs.paise,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.paise += rhs.paise;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}
