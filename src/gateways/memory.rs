//! In-memory collaborators for tests and offline replays.

use std::{collections::BTreeMap, time::Duration};

use alloy::primitives::{Address, B256};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    events::ParsedEvent,
    gateways::{
        EventQuery, EventSource, HolderSnapshotSource, StateReader, TimestampResolver, TokenHolder,
    },
    utils::address_key,
};

/// A gateway call that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayCall {
    Events(&'static str),
    PoolCash,
    TotalSupply,
    Timestamps,
    Holders,
}

/// Fixture-backed gateway. State reads return the latest value recorded at or
/// before the requested block.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    events: Vec<ParsedEvent>,
    block_timestamps: FxHashMap<u64, u64>,
    pool_cash: BTreeMap<u64, BigDecimal>,
    total_supply: BTreeMap<u64, BigDecimal>,
    holders: BTreeMap<u64, Vec<TokenHolder>>,
    failures: FxHashSet<GatewayCall>,
    latency: FxHashMap<&'static str, Duration>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event and the timestamp of its block.
    pub fn with_event(mut self, event: ParsedEvent, timestamp: u64) -> Self {
        self.block_timestamps.insert(event.block_number(), timestamp);
        self.events.push(event);
        self
    }

    /// Record an event whose block timestamp is unknown.
    pub fn with_untimed_event(mut self, event: ParsedEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_pool_cash(mut self, block: u64, cash: BigDecimal) -> Self {
        self.pool_cash.insert(block, cash);
        self
    }

    pub fn with_total_supply(mut self, block: u64, supply: BigDecimal) -> Self {
        self.total_supply.insert(block, supply);
        self
    }

    pub fn with_holders(mut self, block: u64, holders: Vec<TokenHolder>) -> Self {
        self.holders.insert(block, holders);
        self
    }

    /// Make every call of this kind fail.
    pub fn failing(mut self, call: GatewayCall) -> Self {
        self.failures.insert(call);
        self
    }

    /// Delay answers to queries of one event kind.
    pub fn with_latency(mut self, kind: &'static str, delay: Duration) -> Self {
        self.latency.insert(kind, delay);
        self
    }

    fn check(&self, call: GatewayCall) -> anyhow::Result<()> {
        if self.failures.contains(&call) {
            return Err(anyhow!("injected failure for {call:?}"));
        }
        Ok(())
    }

    fn matches(query: &EventQuery, event: &ParsedEvent) -> bool {
        match (query, event) {
            (EventQuery::Transfers { token, from, to }, ParsedEvent::Transfer { event, log_address, .. }) => {
                *log_address == address_key(token)
                    && from.is_none_or(|from| event.from == from)
                    && to.is_none_or(|to| event.to == to)
            },
            (
                EventQuery::PoolBalanceChanged { vault, pool_id },
                ParsedEvent::PoolBalanceChanged { event, log_address, .. },
            ) => *log_address == address_key(vault) && event.poolId == *pool_id,
            (EventQuery::Swaps { vault, pool_id }, ParsedEvent::Swap { event, log_address, .. }) => {
                *log_address == address_key(vault) && event.poolId == *pool_id
            },
            _ => false,
        }
    }

    fn latest_at<'a, V>(values: &'a BTreeMap<u64, V>, block: u64, what: &str) -> anyhow::Result<&'a V> {
        values
            .range(..=block)
            .next_back()
            .map(|(_, value)| value)
            .with_context(|| format!("no {what} recorded at or before block {block}"))
    }
}

#[async_trait]
impl EventSource for MemoryGateway {
    async fn query_events(
        &self,
        query: &EventQuery,
        from_block: u64,
        to_block: u64,
    ) -> anyhow::Result<Vec<ParsedEvent>> {
        if let Some(delay) = self.latency.get(query.kind()) {
            tokio::time::sleep(*delay).await;
        }
        self.check(GatewayCall::Events(query.kind()))?;

        let mut events: Vec<ParsedEvent> = self
            .events
            .iter()
            .filter(|event| (from_block..=to_block).contains(&event.block_number()))
            .filter(|event| Self::matches(query, event))
            .cloned()
            .collect();
        events.sort_by_key(|event| (event.block_number(), event.log_index()));

        Ok(events)
    }
}

#[async_trait]
impl StateReader for MemoryGateway {
    async fn pool_token_cash(
        &self,
        _vault: Address,
        _pool_id: B256,
        _token: Address,
        block: u64,
    ) -> anyhow::Result<BigDecimal> {
        self.check(GatewayCall::PoolCash)?;
        Self::latest_at(&self.pool_cash, block, "pool cash").cloned()
    }

    async fn total_supply(&self, _token: Address, block: u64) -> anyhow::Result<BigDecimal> {
        self.check(GatewayCall::TotalSupply)?;
        Self::latest_at(&self.total_supply, block, "total supply").cloned()
    }
}

#[async_trait]
impl TimestampResolver for MemoryGateway {
    async fn resolve(&self, events: &[ParsedEvent]) -> anyhow::Result<FxHashMap<u64, u64>> {
        self.check(GatewayCall::Timestamps)?;

        Ok(events
            .iter()
            .filter_map(|event| {
                let block_number = event.block_number();
                self.block_timestamps
                    .get(&block_number)
                    .map(|timestamp| (block_number, *timestamp))
            })
            .collect())
    }
}

#[async_trait]
impl HolderSnapshotSource for MemoryGateway {
    async fn token_holders(
        &self,
        _token: Address,
        _chain_id: u64,
        block_height: u64,
    ) -> anyhow::Result<Vec<TokenHolder>> {
        self.check(GatewayCall::Holders)?;
        Ok(self
            .holders
            .range(..=block_height)
            .next_back()
            .map(|(_, holders)| holders.clone())
            .unwrap_or_default())
    }
}
