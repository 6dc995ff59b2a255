//! Money Module
//!
//! Fixed-point monetary values for the ledger. All amounts go through this
//! module so that every stored value has exactly two decimal places.
//!
//! ## Design Principles
//! 1. Decimal arithmetic only (`rust_decimal`), never binary floating point
//! 2. Scale is normalized to 2 on construction, rounding half-up
//! 3. [`Balance`] may be negative as an intermediate result; [`Amount`] is a
//!    validated transfer amount in `[0.01, 1_000_000.00]`
//!
//! ## Usage
//! ```rust
//! use ledger_engine::money::{Amount, Balance};
//!
//! let balance = Balance::parse("100.005").unwrap();
//! assert_eq!(balance.to_string(), "100.01"); // half-up
//!
//! let amount = Amount::parse("40").unwrap();
//! assert_eq!(amount.to_string(), "40.00");
//! ```

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Decimal places of every monetary value
pub const MONEY_SCALE: u32 = 2;

/// Smallest transfer amount (0.01)
pub fn min_transfer_amount() -> Decimal {
    Decimal::new(1, MONEY_SCALE)
}

/// Largest transfer amount (1,000,000.00)
pub fn max_transfer_amount() -> Decimal {
    Decimal::new(100_000_000, MONEY_SCALE)
}

/// Round half-up to two places and pin the scale
fn normalize(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

fn parse_decimal(field: &'static str, input: &str) -> Result<Decimal, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required { field });
    }
    Decimal::from_str(trimmed).map_err(|_| ValidationError::InvalidNumber {
        field,
        value: trimmed.to_string(),
    })
}

// ============================================================================
// Balance
// ============================================================================

/// Account balance (2 decimal places, signed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Balance(Decimal);

impl Balance {
    /// Create a balance, rounding half-up to two places
    pub fn new(value: Decimal) -> Self {
        Self(normalize(value))
    }

    pub fn zero() -> Self {
        Self::new(Decimal::ZERO)
    }

    /// Parse a client string such as `"100.50"`
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        parse_decimal("balance", input).map(Self::new)
    }

    #[inline]
    pub fn value(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// True when this balance covers `required`
    #[inline]
    pub fn has_sufficient_funds(&self, required: Balance) -> bool {
        self.0 >= required.0
    }

    /// Returns None on decimal overflow
    pub fn checked_add(self, other: Balance) -> Option<Balance> {
        self.0.checked_add(other.0).map(Self::new)
    }

    /// Returns None on decimal overflow
    pub fn checked_sub(self, other: Balance) -> Option<Balance> {
        self.0.checked_sub(other.0).map(Self::new)
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<Decimal> for Balance {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<Balance> for Decimal {
    fn from(balance: Balance) -> Self {
        balance.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Amount
// ============================================================================

/// Validated transfer amount in `[0.01, 1_000_000.00]`
///
/// Fields are private to force validation through `new()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Create a validated amount
    ///
    /// # Errors
    /// - `NotPositive` if the rounded value is zero or negative
    /// - `OutOfRange` if the rounded value is outside `[0.01, 1_000_000.00]`
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        let value = normalize(value);

        if value <= Decimal::ZERO {
            return Err(ValidationError::NotPositive {
                field: "amount",
                value,
            });
        }

        if value < min_transfer_amount() || value > max_transfer_amount() {
            return Err(ValidationError::OutOfRange {
                field: "amount",
                min: min_transfer_amount(),
                max: max_transfer_amount(),
                value,
            });
        }

        Ok(Self(value))
    }

    /// Parse a client string such as `"40.00"`
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        parse_decimal("amount", input).and_then(Self::new)
    }

    #[inline]
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
