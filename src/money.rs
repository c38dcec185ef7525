//! Money Module
//!
//! All balances and transfer amounts are fixed-point `Decimal` values with at
//! most [`MONEY_SCALE`] fractional digits. Every amount that reaches the
//! transfer core passes through [`validate_amount`]; every amount arriving as
//! text passes through [`parse_amount`] first.
//!
//! ## Rules
//! 1. No silent rounding: `1.005` is rejected, never truncated
//! 2. Strictly positive: zero and negative amounts are rejected
//! 3. Bounded: amounts above the configured maximum are rejected
//!
//! ## Usage
//! ```rust
//! use fundsflow::money::{parse_amount, validate_amount, default_max_amount};
//!
//! let amount = parse_amount("100.50").unwrap();
//! let amount = validate_amount(amount, default_max_amount()).unwrap();
//! assert_eq!(amount.to_string(), "100.50");
//! ```

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Fractional digits carried by every balance and amount.
pub const MONEY_SCALE: u32 = 2;

/// Money parsing / validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    NotPositive,

    #[error("Amount {amount} exceeds maximum {max}")]
    AboveMaximum { amount: Decimal, max: Decimal },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Default upper bound for a single transfer.
pub fn default_max_amount() -> Decimal {
    Decimal::new(99_999_999, 2)
}

/// Parse a client-supplied amount string.
///
/// Rejects ambiguous forms such as `.5`, `5.`, signed values and empty input.
/// Range and precision are checked separately by [`validate_amount`].
pub fn parse_amount(amount_str: &str) -> Result<Decimal, MoneyError> {
    let s = amount_str.trim();
    if s.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }
    if s.starts_with('-') || s.starts_with('+') {
        return Err(MoneyError::InvalidFormat("sign not allowed".into()));
    }
    if s.starts_with('.') {
        return Err(MoneyError::InvalidFormat(
            "missing leading zero (e.g., use 0.5 instead of .5)".into(),
        ));
    }
    if s.ends_with('.') {
        return Err(MoneyError::InvalidFormat(
            "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
        ));
    }

    Decimal::from_str(s).map_err(|e| MoneyError::InvalidFormat(e.to_string()))
}

/// Validate a transfer amount and rescale it to [`MONEY_SCALE`].
///
/// Trailing zeros do not count against precision (`1.500` is accepted as `1.50`).
pub fn validate_amount(amount: Decimal, max: Decimal) -> Result<Decimal, MoneyError> {
    if amount <= Decimal::ZERO {
        return Err(MoneyError::NotPositive);
    }

    let provided = amount.normalize().scale();
    if provided > MONEY_SCALE {
        return Err(MoneyError::PrecisionOverflow {
            provided,
            max: MONEY_SCALE,
        });
    }

    if amount > max {
        return Err(MoneyError::AboveMaximum { amount, max });
    }

    Ok(to_money_scale(amount))
}

/// Rescale a value that is already known to fit [`MONEY_SCALE`].
pub fn to_money_scale(value: Decimal) -> Decimal {
    let mut v = value;
    v.rescale(MONEY_SCALE);
    v
}

/// Human-readable amount with exactly two fractional digits.
pub fn format_amount(value: Decimal) -> String {
    to_money_scale(value).to_string()
}
