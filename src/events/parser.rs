//! Log parsing for JSON-RPC `eth_getLogs` results.
//!
//! Every log handed to [`parse_logs`] comes from a filtered query, so a log
//! that cannot be decoded is a malformed upstream response. It is reported
//! instead of skipped: a dropped log would silently corrupt the balance sums.

use alloy::{rpc::types::Log, sol_types::SolEvent};
use anyhow::{bail, Context};

use crate::{
    abis::{erc20, vault},
    events::ParsedEvent,
    utils::hex_encode,
};

/// Decode RPC logs into [`ParsedEvent`]s, preserving their order.
pub fn parse_logs(logs: impl IntoIterator<Item = Log>) -> anyhow::Result<Vec<ParsedEvent>> {
    let logs = logs.into_iter();
    let mut parsed = Vec::with_capacity(logs.size_hint().0);

    for log in logs {
        let Some(topic0) = log.topics().first().copied() else {
            bail!("log without topics at index {:?}", log.log_index);
        };

        let block_number = log
            .block_number
            .with_context(|| format!("log {:?} has no block number", log.transaction_hash))?;

        let tx_hash = log
            .transaction_hash
            .as_ref()
            .map(|h| hex_encode(h.as_ref()))
            .unwrap_or_default();

        let log_index = log.log_index.unwrap_or(0);
        let log_address = hex_encode(log.address().as_slice());
        let log_data = log.data();

        let event = match topic0 {
            t if t == erc20::Transfer::SIGNATURE_HASH => ParsedEvent::Transfer {
                event: erc20::Transfer::decode_log_data(log_data)
                    .with_context(|| format!("failed to decode Transfer in tx {tx_hash}"))?,
                log_address,
                block_number,
                log_index,
                tx_hash,
            },
            t if t == vault::PoolBalanceChanged::SIGNATURE_HASH => {
                ParsedEvent::PoolBalanceChanged {
                    event: vault::PoolBalanceChanged::decode_log_data(log_data).with_context(
                        || format!("failed to decode PoolBalanceChanged in tx {tx_hash}"),
                    )?,
                    log_address,
                    block_number,
                    log_index,
                    tx_hash,
                }
            },
            t if t == vault::Swap::SIGNATURE_HASH => ParsedEvent::Swap {
                event: vault::Swap::decode_log_data(log_data)
                    .with_context(|| format!("failed to decode Swap in tx {tx_hash}"))?,
                log_address,
                block_number,
                log_index,
                tx_hash,
            },
            other => bail!("unexpected event signature {other} in tx {tx_hash}"),
        };

        parsed.push(event);
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256, Address, LogData, B256, I256, U256};

    fn rpc_log(address: Address, data: LogData, block_number: Option<u64>) -> Log {
        Log {
            inner: alloy::primitives::Log { address, data },
            block_hash: None,
            block_number,
            block_timestamp: None,
            transaction_hash: Some(B256::repeat_byte(0x11)),
            transaction_index: Some(0),
            log_index: Some(4),
            removed: false,
        }
    }

    #[test]
    fn test_parse_transfer() {
        let token = address!("C8DC2EC5F5E02BE8B37A8444A1931F02374A17AB");
        let transfer = erc20::Transfer {
            from: Address::ZERO,
            to: address!("00000000000000000000000000000000000000aa"),
            value: U256::from(500u64),
        };

        let parsed = parse_logs([rpc_log(token, transfer.encode_log_data(), Some(17))]).unwrap();

        assert_eq!(parsed.len(), 1);
        let ParsedEvent::Transfer {
            event,
            log_address,
            block_number,
            log_index,
            ..
        } = &parsed[0]
        else {
            panic!("expected a transfer, got {}", parsed[0].name());
        };
        assert_eq!(event, &transfer);
        assert_eq!(log_address, "0xc8dc2ec5f5e02be8b37a8444a1931f02374a17ab");
        assert_eq!(*block_number, 17);
        assert_eq!(*log_index, 4);
    }

    #[test]
    fn test_parse_vault_events_keep_order() {
        let vault_address = address!("BA12222222228d8Ba445958a75a0704d566BF2C8");
        let pool_id = b256!("cb0e14e96f2cefa8550ad8e4aea344f211e5061d00020000000000000000011a");
        let token = address!("00000000000000000000000000000000000000f1");

        let swap = vault::Swap {
            poolId: pool_id,
            tokenIn: token,
            tokenOut: Address::ZERO,
            amountIn: U256::from(10u64),
            amountOut: U256::from(3u64),
        };
        let change = vault::PoolBalanceChanged {
            poolId: pool_id,
            liquidityProvider: Address::ZERO,
            tokens: vec![Address::ZERO, token],
            deltas: vec![I256::ZERO, I256::try_from(-7i64).unwrap()],
            protocolFeeAmounts: vec![U256::ZERO, U256::from(1u64)],
        };

        let parsed = parse_logs([
            rpc_log(vault_address, swap.encode_log_data(), Some(5)),
            rpc_log(vault_address, change.encode_log_data(), Some(6)),
        ])
        .unwrap();

        assert_eq!(parsed.iter().map(|e| e.name()).collect::<Vec<_>>(), ["Swap", "PoolBalanceChanged"]);
        assert_eq!(parsed[1].block_number(), 6);
        assert!(matches!(&parsed[1], ParsedEvent::PoolBalanceChanged { event, .. } if event == &change));
    }

    #[test]
    fn test_missing_block_number_is_rejected() {
        let transfer = erc20::Transfer {
            from: Address::ZERO,
            to: Address::repeat_byte(1),
            value: U256::from(1u64),
        };
        let err = parse_logs([rpc_log(Address::ZERO, transfer.encode_log_data(), None)]).unwrap_err();
        assert!(err.to_string().contains("no block number"));
    }

    #[test]
    fn test_unknown_signature_is_rejected() {
        let data = LogData::new_unchecked(vec![B256::repeat_byte(0xee)], Default::default());
        assert!(parse_logs([rpc_log(Address::ZERO, data, Some(1))]).is_err());
    }
}
