//! Amount / Unit Conversion
//!
//! Pure conversion between human-readable decimal strings and integer token
//! amounts. Everything stays in 256-bit integers; no float ever touches an
//! amount that is sent on chain.
//!
//! Created: 2026-10-02

use alloy::primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Maximum decimals any supported token uses
pub const MAX_DECIMALS: u8 = 77;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("invalid amount: {0:?}")]
    Invalid(String),
    #[error("amount overflows 256 bits: {0}")]
    Overflow(String),
    #[error("invalid slippage: {0}")]
    Slippage(String),
}

fn pow10(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// Human amount -> raw integer amount. Extra fractional digits are truncated.
pub fn amount_bn(decimals: u8, amount: &str) -> Result<U256, AmountError> {
    let amount = amount.trim();
    if amount.is_empty() || decimals > MAX_DECIMALS {
        return Err(AmountError::Invalid(amount.to_string()));
    }

    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(AmountError::Invalid(amount.to_string()));
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(AmountError::Invalid(amount.to_string()));
    }

    let frac: String = frac.chars().take(decimals as usize).collect();
    let padded = format!("{:0<width$}", frac, width = decimals as usize);
    let digits = format!("{}{}", whole, padded);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }

    U256::from_str_radix(digits, 10).map_err(|_| AmountError::Overflow(amount.to_string()))
}

/// Raw integer amount -> canonical human amount ("1.5", "0.000001", "42")
pub fn amount_ui(decimals: u8, amount: U256) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let base = pow10(decimals);
    let whole = amount / base;
    let frac = amount % base;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Slippage percent ("0.5") -> basis points (50)
pub fn slippage_to_bps(slippage_percent: f64) -> Result<u32, AmountError> {
    let pct = Decimal::from_str(&slippage_percent.to_string())
        .map_err(|e| AmountError::Slippage(e.to_string()))?;
    if pct.is_sign_negative() || pct > Decimal::from(100) {
        return Err(AmountError::Slippage(pct.to_string()));
    }
    (pct * Decimal::from(100))
        .round()
        .to_u32()
        .ok_or_else(|| AmountError::Slippage(pct.to_string()))
}

/// amount * (1 - bps / 10_000), rounded down
pub fn apply_slippage(amount: U256, bps: u32) -> U256 {
    let bps = bps.min(10_000);
    amount * U256::from(10_000 - bps) / U256::from(10_000u32)
}
