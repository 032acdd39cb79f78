//! Type-safe price representation using decimal arithmetic.

use core::fmt;
use core::iter::Sum;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::quantity::Quantity;

/// A unit or line price in the store's currency.
///
/// Backed by [`Decimal`] so totals never pick up binary floating point error.
/// Deserializes from a JSON number or a decimal string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Zero price.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create a price from a whole number of currency units.
    #[must_use]
    pub fn from_units(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// Create a price from an amount in cents.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// Get the decimal amount.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Whether this price is zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Price of `quantity` units at this unit price.
    #[must_use]
    pub fn times(self, quantity: Quantity) -> Self {
        Self(self.0 * Decimal::from(quantity.get()))
    }

    /// Format for display (e.g., "$19.99").
    #[must_use]
    pub fn display(self) -> String {
        format!("${:.2}", self.0.round_dp(2))
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|p| p.0).sum())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats_two_decimals() {
        assert_eq!(Price::from_units(1500).display(), "$1500.00");
        assert_eq!(Price::from_cents(1999).display(), "$19.99");
        assert_eq!(Price::ZERO.display(), "$0.00");
    }

    #[test]
    fn test_times_and_sum() {
        let qty = Quantity::new(3).expect("valid quantity");
        assert_eq!(Price::from_cents(250).times(qty), Price::from_cents(750));

        let total: Price = [Price::from_units(1), Price::from_cents(50)].into_iter().sum();
        assert_eq!(total, Price::from_cents(150));
    }

    #[test]
    fn test_deserialize_from_number_and_string() {
        let p: Price = serde_json::from_str("500").expect("integer");
        assert_eq!(p, Price::from_units(500));

        let p: Price = serde_json::from_str("19.99").expect("float");
        assert_eq!(p, Price::from_cents(1999));

        let p: Price = serde_json::from_str("\"12.50\"").expect("string");
        assert_eq!(p, Price::from_cents(1250));
    }
}
