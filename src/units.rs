//! Fixed-point amount handling
//!
//! Amounts travel through the core as `Decimal` in human units and are only
//! scaled to integer base units (wei, lamports, token atoms) at the edge of
//! a chain adapter, using the token's own decimals.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

/// Largest scale `Decimal` can represent
const MAX_DECIMALS: u8 = 28;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    #[error("token decimals {0} exceed supported precision")]
    UnsupportedDecimals(u8),

    #[error("amount {0} is negative")]
    Negative(Decimal),

    #[error("amount {0} does not fit in base units")]
    Overflow(String),

    #[error("amount {amount} has more precision than the token's {decimals} decimals")]
    Precision { amount: Decimal, decimals: u8 },
}

fn ten_pow(decimals: u8) -> Result<Decimal, UnitsError> {
    if decimals > MAX_DECIMALS {
        return Err(UnitsError::UnsupportedDecimals(decimals));
    }
    Ok(Decimal::from_i128_with_scale(10i128.pow(decimals as u32), 0))
}

fn scale(amount: Decimal, decimals: u8) -> Result<Decimal, UnitsError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(UnitsError::Negative(amount));
    }
    amount
        .checked_mul(ten_pow(decimals)?)
        .ok_or_else(|| UnitsError::Overflow(amount.to_string()))
}

/// Scale a human amount to integer base units
///
/// The amount must be representable exactly: any digit beyond the token's
/// decimals is an error, so a positive amount never scales to a smaller or
/// zero spend.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<u128, UnitsError> {
    let scaled = scale(amount, decimals)?;
    if !scaled.fract().is_zero() {
        return Err(UnitsError::Precision { amount, decimals });
    }
    scaled
        .to_u128()
        .ok_or_else(|| UnitsError::Overflow(amount.to_string()))
}

/// Scale a minimum-acceptable amount, rounding down to whole base units
pub fn to_base_units_floor(amount: Decimal, decimals: u8) -> Result<u128, UnitsError> {
    scale(amount, decimals)?
        .trunc()
        .to_u128()
        .ok_or_else(|| UnitsError::Overflow(amount.to_string()))
}

/// Scale integer base units back to a human amount
pub fn from_base_units(raw: u128, decimals: u8) -> Result<Decimal, UnitsError> {
    if decimals > MAX_DECIMALS {
        return Err(UnitsError::UnsupportedDecimals(decimals));
    }

    let mantissa = i128::try_from(raw).map_err(|_| UnitsError::Overflow(raw.to_string()))?;
    Decimal::try_from_i128_with_scale(mantissa, decimals as u32)
        .map(|d| d.normalize())
        .map_err(|_| UnitsError::Overflow(raw.to_string()))
}

/// Parse a decimal integer string of base units (as returned by aggregators)
pub fn from_base_units_str(raw: &str, decimals: u8) -> Result<Decimal, UnitsError> {
    let value: u128 = raw
        .trim()
        .parse()
        .map_err(|_| UnitsError::Overflow(raw.to_string()))?;
    from_base_units(value, decimals)
}

/// Apply a percent tolerance: `amount * (1 - percent / 100)`
pub fn apply_slippage(amount: Decimal, percent: Decimal) -> Decimal {
    amount * (Decimal::ONE - percent / Decimal::ONE_HUNDRED)
}

/// Share of `value` in `total` as a percent, 0 when the total is 0
pub fn allocation_percent(value: Decimal, total: Decimal) -> Decimal {
    if total.is_zero() {
        return Decimal::ZERO;
    }
    (value / total * Decimal::ONE_HUNDRED).round_dp(4)
}

/// Read a decimal from a JSON number or numeric string
///
/// Upstream APIs disagree on whether prices and amounts are strings or
/// numbers, and numbers may come back in scientific notation.
pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
