//! Amounts
//!
//! Instruments carry amounts as integer minor units (`u64`, centavos for BRL).
//! The settlement network reports decimal strings ("10.50"); every conversion
//! between the two goes through here.

use rust_decimal::prelude::*;
use thiserror::Error;

/// Decimal places of the BRL minor unit
pub const BRL_DECIMALS: u32 = 2;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount has {provided} fractional digits, minor unit allows {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("amount does not fit in minor units")]
    Overflow,

    #[error("unparseable amount: {0}")]
    InvalidFormat(String),
}

/// Convert a decimal string to minor units
///
/// Rejects more fractional digits than `decimals` instead of truncating.
///
/// ```rust
/// use pix_lifecycle::money::parse_minor_units;
/// assert_eq!(parse_minor_units("10.5", 2).unwrap(), 1050);
/// ```
pub fn parse_minor_units(amount_str: &str, decimals: u32) -> Result<u64, MoneyError> {
    let raw = amount_str.trim();
    if raw.is_empty() {
        return Err(MoneyError::InvalidFormat("blank".into()));
    }

    let decimal = Decimal::from_str(raw)
        .map_err(|e| MoneyError::InvalidFormat(format!("{}: {}", raw, e)))?;

    to_minor_units(decimal, decimals)
}

/// Convert a Decimal to minor units
pub fn to_minor_units(decimal: Decimal, decimals: u32) -> Result<u64, MoneyError> {
    if decimal.is_sign_negative() || decimal.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }

    let normalized = decimal.normalize();
    if normalized.scale() > decimals {
        return Err(MoneyError::PrecisionOverflow {
            provided: normalized.scale(),
            max: decimals,
        });
    }

    normalized
        .checked_mul(Decimal::from(10u64.pow(decimals)))
        .and_then(|minor| minor.to_u64())
        .ok_or(MoneyError::Overflow)
}

/// Convert minor units to a fixed-precision display string
///
/// ```rust
/// use pix_lifecycle::money::format_minor_units;
/// assert_eq!(format_minor_units(1050, 2), "10.50");
/// ```
pub fn format_minor_units(value: u64, decimals: u32) -> String {
    let major = Decimal::from_i128_with_scale(value as i128, decimals);
    format!("{:.prec$}", major, prec = decimals as usize)
}
