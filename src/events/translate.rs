//! Event-to-delta translators.
//!
//! Each translator maps one decoded event plus its resolved block timestamp
//! to the signed deltas it implies for a tracked quantity. They are pure and
//! fail with a logic error whenever an event contradicts what we know about
//! its source.

use alloy::primitives::{Address, B256};
use rustc_hash::FxHashMap;

use crate::{
    error::{Result, TrackerError},
    events::ParsedEvent,
    timeseries::Delta,
    utils::{address_key, hex_encode, i256_to_big_decimal, u256_to_big_decimal},
};

/// The pool whose reserve of one token is being tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackedPool {
    pub pool_id: B256,
    pub reserve_token: Address,
    /// Position of `reserve_token` in the pool's token list.
    pub reserve_token_index: usize,
}

impl TrackedPool {
    /// The pool token (BPT) address: the first 20 bytes of the pool id.
    pub fn pool_token(&self) -> Address {
        Address::from_slice(&self.pool_id[..20])
    }

    fn check_pool_id(&self, found: B256) -> Result<()> {
        if found != self.pool_id {
            return Err(TrackerError::PoolMismatch {
                expected: hex_encode(self.pool_id.as_slice()),
                found: hex_encode(found.as_slice()),
            });
        }
        Ok(())
    }
}

/// Look up the timestamp of the block an event was emitted in.
pub fn resolve_timestamp(timestamps: &FxHashMap<u64, u64>, event: &ParsedEvent) -> Result<u64> {
    let block_number = event.block_number();
    timestamps
        .get(&block_number)
        .copied()
        .ok_or(TrackerError::MissingTimestamp { block_number })
}

/// Per-account deltas for the staking-receipt token.
///
/// A mint credits the recipient, a burn debits the sender, and an ordinary
/// transfer debits the sender and credits the recipient.
pub fn receipt_transfer_deltas(event: &ParsedEvent, timestamp: u64) -> Result<Vec<(String, Delta)>> {
    let ParsedEvent::Transfer { event, tx_hash, .. } = event else {
        return Err(TrackerError::UnexpectedEvent {
            pipeline: "receipt token",
            found: event.name(),
        });
    };

    let amount = u256_to_big_decimal(event.value);

    match (event.from == Address::ZERO, event.to == Address::ZERO) {
        (true, true) => Err(TrackerError::DegenerateTransfer {
            amount: amount.to_string(),
            tx_hash: tx_hash.clone(),
        }),
        (true, false) => Ok(vec![(address_key(&event.to), Delta::new(timestamp, amount))]),
        (false, true) => Ok(vec![(address_key(&event.from), Delta::new(timestamp, -amount))]),
        (false, false) => Ok(vec![
            (address_key(&event.from), Delta::new(timestamp, -amount.clone())),
            (address_key(&event.to), Delta::new(timestamp, amount)),
        ]),
    }
}

/// Total-supply delta for the pool token. Only mints and burns are legal here.
pub fn supply_transfer_delta(event: &ParsedEvent, timestamp: u64) -> Result<Delta> {
    let ParsedEvent::Transfer { event, tx_hash, .. } = event else {
        return Err(TrackerError::UnexpectedEvent {
            pipeline: "pool token supply",
            found: event.name(),
        });
    };

    let amount = u256_to_big_decimal(event.value);

    match (event.from == Address::ZERO, event.to == Address::ZERO) {
        (true, true) => Err(TrackerError::DegenerateTransfer {
            amount: amount.to_string(),
            tx_hash: tx_hash.clone(),
        }),
        (true, false) => Ok(Delta::new(timestamp, amount)),
        (false, true) => Ok(Delta::new(timestamp, -amount)),
        (false, false) => Err(TrackerError::NotMintOrBurn {
            from: address_key(&event.from),
            to: address_key(&event.to),
        }),
    }
}

/// Reserve deltas from a join/exit: the signed amount (positive on join,
/// negative on exit) and the protocol fee paid in the reserve token.
pub fn pool_balance_deltas(
    event: &ParsedEvent,
    timestamp: u64,
    pool: &TrackedPool,
) -> Result<[Delta; 2]> {
    let ParsedEvent::PoolBalanceChanged { event, tx_hash, .. } = event else {
        return Err(TrackerError::UnexpectedEvent {
            pipeline: "pool balance",
            found: event.name(),
        });
    };

    pool.check_pool_id(event.poolId)?;

    let index = pool.reserve_token_index;
    let token = event.tokens.get(index).ok_or_else(|| TrackerError::MalformedEvent {
        tx_hash: tx_hash.clone(),
        reason: format!("{} tokens, reserve token expected at {index}", event.tokens.len()),
    })?;

    if *token != pool.reserve_token {
        return Err(TrackerError::UnexpectedToken {
            index,
            expected: address_key(&pool.reserve_token),
            found: address_key(token),
        });
    }

    let (Some(amount), Some(fee)) = (event.deltas.get(index), event.protocolFeeAmounts.get(index))
    else {
        return Err(TrackerError::MalformedEvent {
            tx_hash: tx_hash.clone(),
            reason: format!(
                "{} tokens but {} deltas and {} protocol fees",
                event.tokens.len(),
                event.deltas.len(),
                event.protocolFeeAmounts.len()
            ),
        });
    };

    Ok([
        Delta::new(timestamp, i256_to_big_decimal(*amount)),
        Delta::new(timestamp, -u256_to_big_decimal(*fee)),
    ])
}

/// Reserve delta from a swap: `+amountIn` when the tracked token went into
/// the pool, `-amountOut` when it came out.
pub fn swap_delta(event: &ParsedEvent, timestamp: u64, pool: &TrackedPool) -> Result<Delta> {
    let ParsedEvent::Swap { event, .. } = event else {
        return Err(TrackerError::UnexpectedEvent {
            pipeline: "swap",
            found: event.name(),
        });
    };

    pool.check_pool_id(event.poolId)?;

    match (event.tokenIn == pool.reserve_token, event.tokenOut == pool.reserve_token) {
        (true, false) => Ok(Delta::new(timestamp, u256_to_big_decimal(event.amountIn))),
        (false, true) => Ok(Delta::new(timestamp, -u256_to_big_decimal(event.amountOut))),
        _ => Err(TrackerError::SwapWithoutTrackedToken {
            token_in: address_key(&event.tokenIn),
            token_out: address_key(&event.tokenOut),
            tracked: address_key(&pool.reserve_token),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abis::{erc20, vault};
    use alloy::primitives::{address, b256, I256, U256};
    use bigdecimal::BigDecimal;

    const RESERVE: Address = address!("cafe001067cdef266afb7eb5a286dcfd277f3de5");
    const WETH: Address = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
    const ALICE: Address = address!("0000000000000000000000000000000000000abc");
    const BOB: Address = address!("0000000000000000000000000000000000000b0b");

    fn pool() -> TrackedPool {
        TrackedPool {
            pool_id: b256!("cb0e14e96f2cefa8550ad8e4aea344f211e5061d00020000000000000000011a"),
            reserve_token: RESERVE,
            reserve_token_index: 1,
        }
    }

    fn transfer(from: Address, to: Address, value: u64) -> ParsedEvent {
        ParsedEvent::Transfer {
            event: erc20::Transfer {
                from,
                to,
                value: U256::from(value),
            },
            log_address: String::new(),
            block_number: 1,
            log_index: 0,
            tx_hash: "0x01".to_string(),
        }
    }

    fn swap(pool_id: B256, token_in: Address, token_out: Address) -> ParsedEvent {
        ParsedEvent::Swap {
            event: vault::Swap {
                poolId: pool_id,
                tokenIn: token_in,
                tokenOut: token_out,
                amountIn: U256::from(70u64),
                amountOut: U256::from(30u64),
            },
            log_address: String::new(),
            block_number: 1,
            log_index: 0,
            tx_hash: "0x02".to_string(),
        }
    }

    fn balance_change(tokens: Vec<Address>, deltas: Vec<i64>, fees: Vec<u64>) -> ParsedEvent {
        ParsedEvent::PoolBalanceChanged {
            event: vault::PoolBalanceChanged {
                poolId: pool().pool_id,
                liquidityProvider: ALICE,
                tokens,
                deltas: deltas.into_iter().map(|d| I256::try_from(d).unwrap()).collect(),
                protocolFeeAmounts: fees.into_iter().map(U256::from).collect(),
            },
            log_address: String::new(),
            block_number: 1,
            log_index: 0,
            tx_hash: "0x03".to_string(),
        }
    }

    #[test]
    fn test_pool_token_is_pool_id_prefix() {
        assert_eq!(
            pool().pool_token(),
            address!("cb0e14e96f2cefa8550ad8e4aea344f211e5061d")
        );
    }

    #[test]
    fn test_receipt_mint_burn_and_move() {
        let minted = receipt_transfer_deltas(&transfer(Address::ZERO, ALICE, 500), 10).unwrap();
        assert_eq!(minted, vec![(address_key(&ALICE), Delta::new(10, BigDecimal::from(500)))]);

        let burned = receipt_transfer_deltas(&transfer(ALICE, Address::ZERO, 200), 20).unwrap();
        assert_eq!(burned, vec![(address_key(&ALICE), Delta::new(20, BigDecimal::from(-200)))]);

        let moved = receipt_transfer_deltas(&transfer(ALICE, BOB, 50), 30).unwrap();
        assert_eq!(
            moved,
            vec![
                (address_key(&ALICE), Delta::new(30, BigDecimal::from(-50))),
                (address_key(&BOB), Delta::new(30, BigDecimal::from(50))),
            ]
        );
    }

    #[test]
    fn test_zero_to_zero_transfer_is_rejected() {
        let err = receipt_transfer_deltas(&transfer(Address::ZERO, Address::ZERO, 1), 1).unwrap_err();
        assert!(matches!(err, TrackerError::DegenerateTransfer { .. }));
        assert!(err.is_logic_error());

        let err = supply_transfer_delta(&transfer(Address::ZERO, Address::ZERO, 1), 1).unwrap_err();
        assert!(matches!(err, TrackerError::DegenerateTransfer { .. }));
    }

    #[test]
    fn test_supply_only_accepts_mint_or_burn() {
        assert_eq!(
            supply_transfer_delta(&transfer(Address::ZERO, ALICE, 9), 5).unwrap(),
            Delta::new(5, BigDecimal::from(9))
        );
        assert_eq!(
            supply_transfer_delta(&transfer(ALICE, Address::ZERO, 4), 6).unwrap(),
            Delta::new(6, BigDecimal::from(-4))
        );

        let err = supply_transfer_delta(&transfer(ALICE, BOB, 4), 6).unwrap_err();
        assert!(matches!(err, TrackerError::NotMintOrBurn { .. }));
    }

    #[test]
    fn test_pool_balance_change_emits_amount_and_fee() {
        let event = balance_change(vec![WETH, RESERVE], vec![5, 200_000], vec![0, 1_000]);
        let [amount, fee] = pool_balance_deltas(&event, 100, &pool()).unwrap();
        assert_eq!(amount, Delta::new(100, BigDecimal::from(200_000)));
        assert_eq!(fee, Delta::new(100, BigDecimal::from(-1_000)));

        let exit = balance_change(vec![WETH, RESERVE], vec![-5, -80], vec![0, 0]);
        let [amount, _] = pool_balance_deltas(&exit, 101, &pool()).unwrap();
        assert_eq!(amount.value, BigDecimal::from(-80));
    }

    #[test]
    fn test_pool_balance_change_checks_token_position() {
        let swapped = balance_change(vec![RESERVE, WETH], vec![1, 2], vec![0, 0]);
        let err = pool_balance_deltas(&swapped, 1, &pool()).unwrap_err();
        assert!(matches!(err, TrackerError::UnexpectedToken { index: 1, .. }));

        let short = balance_change(vec![WETH, RESERVE], vec![1], vec![0, 0]);
        let err = pool_balance_deltas(&short, 1, &pool()).unwrap_err();
        assert!(matches!(err, TrackerError::MalformedEvent { .. }));
    }

    #[test]
    fn test_pool_id_mismatch_is_rejected() {
        let other = swap(B256::repeat_byte(7), RESERVE, WETH);
        let err = swap_delta(&other, 1, &pool()).unwrap_err();
        assert!(matches!(err, TrackerError::PoolMismatch { .. }));
    }

    #[test]
    fn test_swap_direction() {
        let id = pool().pool_id;
        assert_eq!(
            swap_delta(&swap(id, RESERVE, WETH), 3, &pool()).unwrap(),
            Delta::new(3, BigDecimal::from(70))
        );
        assert_eq!(
            swap_delta(&swap(id, WETH, RESERVE), 3, &pool()).unwrap(),
            Delta::new(3, BigDecimal::from(-30))
        );

        let err = swap_delta(&swap(id, WETH, ALICE), 3, &pool()).unwrap_err();
        assert!(matches!(err, TrackerError::SwapWithoutTrackedToken { .. }));
    }

    #[test]
    fn test_wrong_pipeline_is_rejected() {
        let err = swap_delta(&transfer(ALICE, BOB, 1), 1, &pool()).unwrap_err();
        assert!(matches!(
            err,
            TrackerError::UnexpectedEvent {
                pipeline: "swap",
                found: "Transfer"
            }
        ));
    }

    #[test]
    fn test_missing_timestamp() {
        let mut timestamps = FxHashMap::default();
        timestamps.insert(2, 1_700_000_000);

        let err = resolve_timestamp(&timestamps, &transfer(ALICE, BOB, 1)).unwrap_err();
        assert!(matches!(err, TrackerError::MissingTimestamp { block_number: 1 }));

        timestamps.insert(1, 1_699_999_988);
        assert_eq!(resolve_timestamp(&timestamps, &transfer(ALICE, BOB, 1)).unwrap(), 1_699_999_988);
    }
}
