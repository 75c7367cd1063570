//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn value(self) -> u64 { self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self { Self(value) }
        }
    };
}

record_id!(
    /// Identity of a catalog product, assigned by the backing store.
    ProductId
);
record_id!(
    /// Identity of a cart line.
    LineId
);
record_id!(
    /// Identity of a catalog category.
    CategoryId
);

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn usd(amount: Decimal) -> Self { Self::new(amount, "USD") }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }

    /// Scales by a rate and rounds to cents.
    pub fn scale(&self, rate: Decimal) -> Money { Money::new((self.amount * rate).round_dp(2), &self.currency) }
}

impl Default for Money { fn default() -> Self { Self::zero("USD") } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.currency.as_str() {
            "USD" => write!(f, "${:.2}", self.amount),
            other => write!(f, "{:.2} {}", self.amount, other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("Currency mismatch")]
    CurrencyMismatch,
}

/// Closed price interval `[min, max]`.
///
/// Construction normalizes inverted bounds, so a range is never empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Decimal, Decimal)", into = "(Decimal, Decimal)")]
pub struct PriceRange { min: Decimal, max: Decimal }

impl PriceRange {
    pub fn new(a: Decimal, b: Decimal) -> Self {
        Self { min: a.min(b), max: a.max(b) }
    }
    pub fn min(&self) -> Decimal { self.min }
    pub fn max(&self) -> Decimal { self.max }
    pub fn contains(&self, price: Decimal) -> bool { self.min <= price && price <= self.max }
}

impl From<(Decimal, Decimal)> for PriceRange {
    fn from((a, b): (Decimal, Decimal)) -> Self { Self::new(a, b) }
}

impl From<PriceRange> for (Decimal, Decimal) {
    fn from(range: PriceRange) -> Self { (range.min, range.max) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_add() {
        let a = Money::usd(Decimal::new(100, 0));
        let b = Money::usd(Decimal::new(50, 0));
        assert_eq!(a.add(&b).unwrap().amount(), Decimal::new(150, 0));
    }

    #[test]
    fn test_money_currency_mismatch() {
        let a = Money::usd(Decimal::ONE);
        let b = Money::new(Decimal::ONE, "EUR");
        assert_eq!(a.add(&b), Err(MoneyError::CurrencyMismatch));
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::usd(Decimal::new(123450, 2)).to_string(), "$1234.50");
    }

    #[test]
    fn test_price_range_swaps_inverted_bounds() {
        let range = PriceRange::new(Decimal::new(500, 0), Decimal::new(100, 0));
        assert_eq!(range.min(), Decimal::new(100, 0));
        assert_eq!(range.max(), Decimal::new(500, 0));
        assert!(range.contains(Decimal::new(100, 0)));
        assert!(range.contains(Decimal::new(500, 0)));
        assert!(!range.contains(Decimal::new(501, 0)));
    }

    #[test]
    fn test_price_range_from_pair() {
        let range: PriceRange = serde_json::from_str("[900, 10]").unwrap();
        assert_eq!(range, PriceRange::new(Decimal::new(10, 0), Decimal::new(900, 0)));
    }
}
