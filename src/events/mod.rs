//! Decoded chain events and their translation into signed deltas.
//!
//! Gateways decode raw logs into [`ParsedEvent`] at the boundary, so
//! translators pattern-match on strongly-typed fields instead of trusting
//! positional argument order.

pub mod parser;
pub mod translate;

pub use parser::parse_logs;
pub use translate::{
    pool_balance_deltas, receipt_transfer_deltas, resolve_timestamp, supply_transfer_delta,
    swap_delta, TrackedPool,
};

use crate::abis::{erc20, vault};

/// A decoded log with the metadata needed to place it in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedEvent {
    Transfer {
        event: erc20::Transfer,
        log_address: String,
        block_number: u64,
        log_index: u64,
        tx_hash: String,
    },
    PoolBalanceChanged {
        event: vault::PoolBalanceChanged,
        log_address: String,
        block_number: u64,
        log_index: u64,
        tx_hash: String,
    },
    Swap {
        event: vault::Swap,
        log_address: String,
        block_number: u64,
        log_index: u64,
        tx_hash: String,
    },
}

impl ParsedEvent {
    pub fn block_number(&self) -> u64 {
        match self {
            ParsedEvent::Transfer { block_number, .. }
            | ParsedEvent::PoolBalanceChanged { block_number, .. }
            | ParsedEvent::Swap { block_number, .. } => *block_number,
        }
    }

    pub fn log_index(&self) -> u64 {
        match self {
            ParsedEvent::Transfer { log_index, .. }
            | ParsedEvent::PoolBalanceChanged { log_index, .. }
            | ParsedEvent::Swap { log_index, .. } => *log_index,
        }
    }

    /// Lowercase address of the emitting contract.
    pub fn log_address(&self) -> &str {
        match self {
            ParsedEvent::Transfer { log_address, .. }
            | ParsedEvent::PoolBalanceChanged { log_address, .. }
            | ParsedEvent::Swap { log_address, .. } => log_address,
        }
    }

    pub fn tx_hash(&self) -> &str {
        match self {
            ParsedEvent::Transfer { tx_hash, .. }
            | ParsedEvent::PoolBalanceChanged { tx_hash, .. }
            | ParsedEvent::Swap { tx_hash, .. } => tx_hash,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParsedEvent::Transfer { .. } => "Transfer",
            ParsedEvent::PoolBalanceChanged { .. } => "PoolBalanceChanged",
            ParsedEvent::Swap { .. } => "Swap",
        }
    }
}
