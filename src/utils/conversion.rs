//! Type conversion and formatting utilities.
//!
//! Token amounts arrive from the chain as fixed-point integers (`U256`, `I256`)
//! and are carried through the tracker as exact `BigDecimal` values. Nothing in
//! this module goes through floating point.

use alloy::primitives::{hex, Address, I256, U256};
use bigdecimal::BigDecimal;
use num_bigint::{BigInt, Sign};
use once_cell::sync::Lazy;

// ============================================
// Hex Encoding
// ============================================

/// Encode bytes as a lowercase hex string with 0x prefix.
pub fn hex_encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Canonical map key for an account: lowercase hex with 0x prefix.
pub fn address_key(address: &Address) -> String {
    hex_encode(address.as_slice())
}

/// Normalize a caller-supplied address string to the canonical lowercase key.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

// ============================================
// U256 / I256 Conversions
// ============================================

/// Convert an unsigned on-chain integer to an exact `BigDecimal` (scale 0).
pub fn u256_to_big_decimal(value: U256) -> BigDecimal {
    // Via bytes, faster than string parsing
    let bytes: [u8; 32] = value.to_le_bytes();
    BigDecimal::from(BigInt::from_bytes_le(Sign::Plus, &bytes))
}

/// Convert a signed on-chain integer to an exact `BigDecimal` (scale 0).
pub fn i256_to_big_decimal(value: I256) -> BigDecimal {
    let magnitude = u256_to_big_decimal(value.unsigned_abs());
    if value.is_negative() {
        -magnitude
    } else {
        magnitude
    }
}

// ============================================
// Decimal Scaling
// ============================================

/// Scale a raw fixed-point amount down by `decimals` (e.g. wei -> whole tokens).
///
/// Exact: the result keeps every digit of the raw amount.
pub fn to_units(raw: &BigDecimal, decimals: u8) -> BigDecimal {
    if decimals == 0 {
        return raw.clone();
    }
    raw / &big_pow10(decimals)
}

// ============================================
// Internal Helpers
// ============================================

static POW10_CACHE: Lazy<[BigDecimal; 25]> =
    Lazy::new(|| std::array::from_fn(|i| BigDecimal::from(BigInt::from(10u32).pow(i as u32))));

/// Compute 10^exp as BigDecimal.
pub(crate) fn big_pow10(exp: u8) -> BigDecimal {
    if (exp as usize) < POW10_CACHE.len() {
        POW10_CACHE[exp as usize].clone()
    } else {
        BigDecimal::from(BigInt::from(10u32).pow(exp as u32))
    }
}
