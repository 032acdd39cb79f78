//! Cart line quantity type.

use core::fmt;
use core::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Errors that can occur when building a [`Quantity`].
///
/// Every variant is a validation failure: callers drop the mutation that
/// produced it instead of clamping or surfacing it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// The value is zero or negative.
    #[error("quantity must be at least 1 (got {0})")]
    BelowMinimum(i64),
    /// The value does not fit in a `u32`.
    #[error("quantity is out of range: {0}")]
    OutOfRange(i64),
    /// The input text is not an integer.
    #[error("quantity is not an integer: {0:?}")]
    NotAnInteger(String),
}

/// Quantity of a product in a cart.
///
/// ## Constraints
///
/// - Always at least 1; a zero or negative quantity cannot be represented
/// - Any positive value that fits in a `u32` is accepted
///
/// ## Examples
///
/// ```
/// use cartsync_core::Quantity;
///
/// assert_eq!(Quantity::new(2).map(Quantity::get), Ok(2));
/// assert!(Quantity::new(0).is_err());
/// assert!(Quantity::new(-1).is_err());
/// assert!(Quantity::parse(" 3 ").is_ok());
/// assert!(Quantity::parse("three").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(NonZeroU32);

impl Quantity {
    /// Smallest storable quantity.
    pub const ONE: Self = Self(NonZeroU32::MIN);

    /// Validate a raw integer quantity.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is below 1 or does not fit in a `u32`.
    pub fn new(value: i64) -> Result<Self, QuantityError> {
        if value < 1 {
            return Err(QuantityError::BelowMinimum(value));
        }
        let raw = u32::try_from(value).map_err(|_| QuantityError::OutOfRange(value))?;
        NonZeroU32::new(raw)
            .map(Self)
            .ok_or(QuantityError::BelowMinimum(value))
    }

    /// Parse a quantity typed into a numeric text input.
    ///
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::NotAnInteger`] if the text is not an integer,
    /// or any error [`Quantity::new`] returns for the parsed value.
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let trimmed = input.trim();
        let value = trimmed
            .parse::<i64>()
            .map_err(|_| QuantityError::NotAnInteger(trimmed.to_string()))?;
        Self::new(value)
    }

    /// Get the quantity as a plain integer.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// The next quantity up, if it stays within range.
    #[must_use]
    pub fn increment(self) -> Option<Self> {
        Self::new(i64::from(self.get()) + 1).ok()
    }

    /// The next quantity down, or `None` at 1.
    #[must_use]
    pub fn decrement(self) -> Option<Self> {
        Self::new(i64::from(self.get()) - 1).ok()
    }

    /// Add two quantities, or `None` if the sum does not fit.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.get()).map(Self)
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.get()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_below_one() {
        assert_eq!(Quantity::new(0), Err(QuantityError::BelowMinimum(0)));
        assert_eq!(Quantity::new(-1), Err(QuantityError::BelowMinimum(-1)));
    }

    #[test]
    fn test_new_accepts_large_values() {
        assert_eq!(Quantity::new(10_000).map(Quantity::get), Ok(10_000));
        assert_eq!(Quantity::new(i64::from(u32::MAX)).map(Quantity::get), Ok(u32::MAX));
        assert_eq!(
            Quantity::new(i64::from(u32::MAX) + 1),
            Err(QuantityError::OutOfRange(i64::from(u32::MAX) + 1))
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!(Quantity::parse("5").map(Quantity::get), Ok(5));
        assert_eq!(Quantity::parse("  7\n").map(Quantity::get), Ok(7));
        assert!(matches!(
            Quantity::parse("abc"),
            Err(QuantityError::NotAnInteger(_))
        ));
        assert!(matches!(
            Quantity::parse("2.5"),
            Err(QuantityError::NotAnInteger(_))
        ));
        assert!(matches!(Quantity::parse(""), Err(QuantityError::NotAnInteger(_))));
        assert_eq!(Quantity::parse("0"), Err(QuantityError::BelowMinimum(0)));
    }

    #[test]
    fn test_increment_decrement() {
        assert_eq!(Quantity::ONE.decrement(), None);
        assert_eq!(Quantity::ONE.increment().map(Quantity::get), Some(2));
        let max = Quantity::new(i64::from(u32::MAX)).expect("max is valid");
        assert_eq!(max.increment(), None);
    }

    #[test]
    fn test_checked_add() {
        let two = Quantity::new(2).expect("valid");
        assert_eq!(two.checked_add(two).map(Quantity::get), Some(4));
        let max = Quantity::new(i64::from(u32::MAX)).expect("valid");
        assert_eq!(max.checked_add(two), None);
    }

    #[test]
    fn test_serde_rejects_zero() {
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert!(serde_json::from_str::<Quantity>("-3").is_err());
        let q: Quantity = serde_json::from_str("4").expect("deserialize");
        assert_eq!(q.get(), 4);
        assert_eq!(serde_json::to_string(&q).expect("serialize"), "4");
    }
}
