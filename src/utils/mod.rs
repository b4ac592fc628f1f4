//! Utility functions for the stakes tracker.
//!
//! - [`conversion`] - Exact conversions (U256/I256 to BigDecimal, hex encoding, address keys)

mod conversion;

// ============================================
// Re-exports
// ============================================

pub use conversion::{
    address_key, hex_encode, i256_to_big_decimal, normalize_address, to_units,
    u256_to_big_decimal,
};
