//! Input validation
//!
//! Everything here is pure: a request that fails these checks is rejected
//! with `InvalidParameter` before any adapter or upstream is touched.

use crate::config::{ChainFamily, ChainId};
use crate::{Error, Result};
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::str::FromStr;

/// Maximum fractional digits accepted in an amount
pub const MAX_AMOUNT_SCALE: u32 = 18;

fn is_hex_of_len(s: &str, len: usize) -> bool {
    match s.strip_prefix("0x") {
        Some(body) => body.len() == len && body.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// `0x` followed by 40 hex characters
pub fn is_evm_address(s: &str) -> bool {
    is_hex_of_len(s, 40)
}

/// Base58 string decoding to 32 bytes
pub fn is_solana_address(s: &str) -> bool {
    Pubkey::from_str(s).is_ok()
}

pub fn is_address_for(chain: ChainId, s: &str) -> bool {
    match chain.family() {
        ChainFamily::Evm => is_evm_address(s),
        ChainFamily::Solana => is_solana_address(s),
    }
}

/// Reject anything that is not an address on `chain`
pub fn require_address(chain: ChainId, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::invalid(format!("{} is required", field)));
    }
    if !is_address_for(chain, value) {
        return Err(Error::invalid(format!(
            "{} '{}' is not a valid {} address",
            field, value, chain
        )));
    }
    Ok(())
}

/// Parse a strictly positive amount with bounded precision
pub fn parse_amount(field: &str, raw: &str) -> Result<Decimal> {
    let trimmed = raw.trim();
    let amount = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| Error::invalid(format!("{} '{}' is not a decimal number", field, raw)))?;

    if amount <= Decimal::ZERO {
        return Err(Error::invalid(format!("{} must be positive", field)));
    }
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(Error::invalid(format!(
            "{} has more than {} decimal places",
            field, MAX_AMOUNT_SCALE
        )));
    }
    Ok(amount)
}

/// Slippage is a percent in `[0, max]`
pub fn check_slippage(slippage: Decimal, max: Decimal) -> Result<Decimal> {
    if slippage < Decimal::ZERO || slippage > max {
        return Err(Error::invalid(format!(
            "slippage {} must be between 0 and {} percent",
            slippage, max
        )));
    }
    Ok(slippage)
}

/// `0x` followed by 64 hex characters
pub fn is_evm_tx_hash(s: &str) -> bool {
    is_hex_of_len(s, 64)
}

/// Base58 signature decoding to 64 bytes
pub fn is_solana_signature(s: &str) -> bool {
    Signature::from_str(s).is_ok()
}

/// Check a transaction reference against the chain it is claimed for
pub fn require_tx_reference(chain: ChainId, value: &str) -> Result<()> {
    let ok = match chain.family() {
        ChainFamily::Evm => is_evm_tx_hash(value),
        ChainFamily::Solana => is_solana_signature(value),
    };
    if !ok {
        return Err(Error::invalid(format!(
            "'{}' is not a valid {} transaction reference",
            value, chain
        )));
    }
    Ok(())
}

/// Infer the chain of a transaction reference from its format
///
/// EVM hashes are shared between Ethereum and Polygon; those resolve to the
/// default chain and callers pass `blockchain` to pick Polygon.
pub fn detect_tx_chain(value: &str) -> Option<ChainId> {
    if is_evm_tx_hash(value) {
        Some(ChainId::DEFAULT)
    } else if is_solana_signature(value) {
        Some(ChainId::Solana)
    } else {
        None
    }
}
