use std::{collections::BTreeSet, time::Duration};

use alloy::{
    eips::BlockId,
    primitives::{Address, B256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{BlockNumberOrTag, Filter, Log},
    sol_types::SolEvent,
};
use anyhow::{bail, Context};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use futures::future::try_join_all;
use log::debug;
use moka::future::Cache;
use rustc_hash::FxHashMap;
use url::Url;

use crate::{
    abis::{erc20, vault, IVault, IERC20},
    config::RpcSettings,
    events::{parse_logs, ParsedEvent},
    gateways::{EventQuery, EventSource, StateReader, TimestampResolver},
    utils::u256_to_big_decimal,
};

/// Timeout for individual RPC calls (30 seconds)
const RPC_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC gateway for log queries, historical reads and block timestamps.
#[derive(Clone)]
pub struct RpcGateway {
    provider: DynProvider,
    log_chunk_size: u64,
    timestamp_batch_size: usize,
    /// Block timestamps never change, so resolved blocks are kept for reuse
    /// across pipelines and trackers.
    block_timestamps: Cache<u64, u64>,
}

impl RpcGateway {
    pub fn new(settings: &RpcSettings) -> anyhow::Result<Self> {
        let url = Url::parse(&settings.url).context("Invalid RPC URL")?;
        let provider = DynProvider::new(ProviderBuilder::new().connect_http(url));

        Ok(Self {
            provider,
            log_chunk_size: settings.log_chunk_size.max(1),
            timestamp_batch_size: settings.timestamp_batch_size.max(1),
            block_timestamps: Cache::builder().max_capacity(1_000_000).build(),
        })
    }

    /// Timestamp of a single block.
    pub async fn block_timestamp(&self, block_number: u64) -> anyhow::Result<u64> {
        if let Some(timestamp) = self.block_timestamps.get(&block_number).await {
            return Ok(timestamp);
        }

        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block_number))
            .await
            .with_context(|| format!("Failed to fetch block {block_number}"))?;

        let Some(block) = block else {
            bail!("Block {} not found", block_number);
        };

        let timestamp = block.header.timestamp;
        self.block_timestamps.insert(block_number, timestamp).await;
        Ok(timestamp)
    }

    /// Query logs in block chunks to stay under provider range limits.
    async fn query_logs_chunked(
        &self,
        filter: Filter,
        from_block: u64,
        to_block: u64,
    ) -> anyhow::Result<Vec<Log>> {
        let mut all_logs = Vec::new();

        let mut current_from = from_block;
        while current_from <= to_block {
            let current_to = current_from
                .saturating_add(self.log_chunk_size - 1)
                .min(to_block);

            let chunk_filter = filter
                .clone()
                .from_block(BlockNumberOrTag::Number(current_from))
                .to_block(BlockNumberOrTag::Number(current_to));

            let logs = tokio::time::timeout(RPC_CALL_TIMEOUT, self.provider.get_logs(&chunk_filter))
                .await
                .context("eth_getLogs timeout")?
                .with_context(|| format!("eth_getLogs failed for blocks {current_from}..={current_to}"))?;

            debug!(
                "Fetched {} logs for blocks {}..={}",
                logs.len(),
                current_from,
                current_to
            );
            all_logs.extend(logs);

            if current_to == u64::MAX {
                break;
            }
            current_from = current_to + 1;
        }

        Ok(all_logs)
    }
}

fn filter_for(query: &EventQuery) -> Filter {
    match query {
        EventQuery::Transfers { token, from, to } => {
            let mut filter = Filter::new()
                .address(*token)
                .event_signature(erc20::Transfer::SIGNATURE_HASH);
            if let Some(from) = from {
                filter = filter.topic1(from.into_word());
            }
            if let Some(to) = to {
                filter = filter.topic2(to.into_word());
            }
            filter
        },
        EventQuery::PoolBalanceChanged { vault, pool_id } => Filter::new()
            .address(*vault)
            .event_signature(vault::PoolBalanceChanged::SIGNATURE_HASH)
            .topic1(*pool_id),
        EventQuery::Swaps { vault, pool_id } => Filter::new()
            .address(*vault)
            .event_signature(vault::Swap::SIGNATURE_HASH)
            .topic1(*pool_id),
    }
}

#[async_trait]
impl EventSource for RpcGateway {
    async fn query_events(
        &self,
        query: &EventQuery,
        from_block: u64,
        to_block: u64,
    ) -> anyhow::Result<Vec<ParsedEvent>> {
        let logs = self
            .query_logs_chunked(filter_for(query), from_block, to_block)
            .await
            .with_context(|| format!("Failed to get {} logs", query.kind()))?;

        parse_logs(logs)
    }
}

#[async_trait]
impl StateReader for RpcGateway {
    async fn pool_token_cash(
        &self,
        vault: Address,
        pool_id: B256,
        token: Address,
        block: u64,
    ) -> anyhow::Result<BigDecimal> {
        let vault = IVault::new(vault, &self.provider);
        let info = tokio::time::timeout(
            RPC_CALL_TIMEOUT,
            vault
                .getPoolTokenInfo(pool_id, token)
                .block(BlockId::number(block))
                .call(),
        )
        .await
        .context("getPoolTokenInfo timeout")?
        .with_context(|| format!("getPoolTokenInfo failed at block {block}"))?;

        Ok(u256_to_big_decimal(info.cash))
    }

    async fn total_supply(&self, token: Address, block: u64) -> anyhow::Result<BigDecimal> {
        let token = IERC20::new(token, &self.provider);
        let supply = tokio::time::timeout(
            RPC_CALL_TIMEOUT,
            token.totalSupply().block(BlockId::number(block)).call(),
        )
        .await
        .context("totalSupply timeout")?
        .with_context(|| format!("totalSupply failed at block {block}"))?;

        Ok(u256_to_big_decimal(supply))
    }
}

#[async_trait]
impl TimestampResolver for RpcGateway {
    async fn resolve(&self, events: &[ParsedEvent]) -> anyhow::Result<FxHashMap<u64, u64>> {
        let block_numbers: BTreeSet<u64> = events.iter().map(ParsedEvent::block_number).collect();
        let mut timestamps =
            FxHashMap::with_capacity_and_hasher(block_numbers.len(), Default::default());

        let mut missing = Vec::new();
        for block_number in block_numbers {
            match self.block_timestamps.get(&block_number).await {
                Some(timestamp) => {
                    timestamps.insert(block_number, timestamp);
                },
                None => missing.push(block_number),
            }
        }

        debug!(
            "Resolving timestamps for {} blocks ({} cached)",
            missing.len() + timestamps.len(),
            timestamps.len()
        );

        // Bounded concurrency per chunk to avoid overwhelming the RPC
        for chunk in missing.chunks(self.timestamp_batch_size) {
            let fetched =
                try_join_all(chunk.iter().map(|&block_number| async move {
                    Ok::<_, anyhow::Error>((block_number, self.block_timestamp(block_number).await?))
                }))
                .await?;
            timestamps.extend(fetched);
        }

        Ok(timestamps)
    }
}
