//! Safety Module stakes: staked receipt-token balances valued in the pool's
//! reserve token.
//!
//! The receipt token is staked 1:1 against pool tokens (BPT), so its rate to
//! the reserve token is the pool's reserve divided by the BPT supply.

use std::collections::{BTreeMap, BTreeSet};

use alloy::primitives::Address;
use anyhow::Context;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use log::{debug, info};
use num_traits::Zero;
use rustc_hash::FxHashMap;

use crate::{
    error::{Result, TrackerError},
    events::{
        pool_balance_deltas, receipt_transfer_deltas, resolve_timestamp, supply_transfer_delta,
        swap_delta, ParsedEvent, TrackedPool,
    },
    gateways::{EventQuery, Gateways},
    timeseries::{reduce, Delta, TimeSeries},
    tracker::{BlockRange, StakeTracker, TrackerPhase},
    utils::{address_key, normalize_address},
};

/// Addresses and ids a Safety Module tracker reads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafetyModuleConfig {
    pub chain_id: u64,
    /// Staking receipt token
    pub receipt_token: Address,
    pub vault: Address,
    pub pool: TrackedPool,
}

/// Quantities read at the snapshot block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitialState {
    pub pool_reserve: BigDecimal,
    pub pool_token_supply: BigDecimal,
    pub receipt_balances: FxHashMap<String, BigDecimal>,
}

/// Sorted deltas collected over the block range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateChanges {
    pub pool_reserve: TimeSeries,
    pub pool_token_supply: TimeSeries,
    pub receipt_balances: FxHashMap<String, TimeSeries>,
}

pub struct SafetyModuleTracker {
    range: BlockRange,
    config: SafetyModuleConfig,
    gateways: Gateways,
    phase: TrackerPhase,
    initial: InitialState,
    changes: StateChanges,
}

impl SafetyModuleTracker {
    pub fn new(range: BlockRange, config: SafetyModuleConfig, gateways: Gateways) -> Self {
        Self {
            range,
            config,
            gateways,
            phase: TrackerPhase::Uninitialized,
            initial: InitialState::default(),
            changes: StateChanges::default(),
        }
    }

    pub fn config(&self) -> &SafetyModuleConfig {
        &self.config
    }

    pub fn initial_state(&self) -> &InitialState {
        &self.initial
    }

    pub fn state_changes(&self) -> &StateChanges {
        &self.changes
    }

    // ============================================
    // Snapshot
    // ============================================

    async fn fetch_initial_state(&self) -> Result<InitialState> {
        let block = self.range.snapshot_block();
        let pool = &self.config.pool;

        info!("Loading safety module snapshot at block {}", block);

        let (pool_reserve, pool_token_supply, holders) = tokio::try_join!(
            async {
                self.gateways
                    .state
                    .pool_token_cash(self.config.vault, pool.pool_id, pool.reserve_token, block)
                    .await
                    .context("Failed to read pool reserve")
            },
            async {
                self.gateways
                    .state
                    .total_supply(pool.pool_token(), block)
                    .await
                    .context("Failed to read pool token supply")
            },
            async {
                self.gateways
                    .holders
                    .token_holders(self.config.receipt_token, self.config.chain_id, block)
                    .await
                    .context("Failed to fetch receipt token holders")
            },
        )?;

        let receipt_balances: FxHashMap<String, BigDecimal> = holders
            .into_iter()
            .map(|holder| (normalize_address(&holder.address), holder.balance))
            .collect();

        info!(
            "Snapshot at block {}: reserve={}, supply={}, holders={}",
            block,
            pool_reserve,
            pool_token_supply,
            receipt_balances.len()
        );

        Ok(InitialState {
            pool_reserve,
            pool_token_supply,
            receipt_balances,
        })
    }

    // ============================================
    // Differential pipelines
    // ============================================

    async fn fetch_state_changes(&self) -> Result<StateChanges> {
        info!(
            "Loading safety module changes for blocks {}..={}",
            self.range.start_block, self.range.end_block
        );

        let (receipt_balances, pool_token_supply, lp_deltas, swap_deltas) = tokio::try_join!(
            self.receipt_balance_changes(),
            self.pool_token_supply_changes(),
            self.reserve_changes_from_lp(),
            self.reserve_changes_from_swaps(),
        )?;

        // Both reserve pipelines have finished, so one sort covers them
        let mut pool_reserve = TimeSeries::from(lp_deltas);
        pool_reserve.extend(swap_deltas);
        pool_reserve.sort();

        info!(
            "Loaded changes: reserve={}, supply={}, accounts={}",
            pool_reserve.len(),
            pool_token_supply.len(),
            receipt_balances.len()
        );

        Ok(StateChanges {
            pool_reserve,
            pool_token_supply,
            receipt_balances,
        })
    }

    async fn query_events(&self, query: &EventQuery) -> Result<Vec<ParsedEvent>> {
        let events = self
            .gateways
            .events
            .query_events(query, self.range.start_block, self.range.end_block)
            .await
            .with_context(|| format!("Failed to query {} events", query.kind()))?;

        debug!("Fetched {} {} events", events.len(), query.kind());
        Ok(events)
    }

    async fn resolve_timestamps(&self, events: &[ParsedEvent]) -> Result<FxHashMap<u64, u64>> {
        if events.is_empty() {
            return Ok(FxHashMap::default());
        }

        Ok(self
            .gateways
            .timestamps
            .resolve(events)
            .await
            .context("Failed to resolve block timestamps")?)
    }

    async fn receipt_balance_changes(&self) -> Result<FxHashMap<String, TimeSeries>> {
        let events = self
            .query_events(&EventQuery::Transfers {
                token: self.config.receipt_token,
                from: None,
                to: None,
            })
            .await?;
        let timestamps = self.resolve_timestamps(&events).await?;

        let mut balances: FxHashMap<String, TimeSeries> = FxHashMap::default();
        for event in &events {
            let timestamp = resolve_timestamp(&timestamps, event)?;
            for (account, delta) in receipt_transfer_deltas(event, timestamp)? {
                balances.entry(account).or_default().push(delta);
            }
        }

        for series in balances.values_mut() {
            series.sort();
        }

        Ok(balances)
    }

    async fn pool_token_supply_changes(&self) -> Result<TimeSeries> {
        let token = self.config.pool.pool_token();

        let mints = EventQuery::Transfers {
            token,
            from: Some(Address::ZERO),
            to: None,
        };
        let burns = EventQuery::Transfers {
            token,
            from: None,
            to: Some(Address::ZERO),
        };

        let (mut events, burn_events) =
            tokio::try_join!(self.query_events(&mints), self.query_events(&burns))?;
        events.extend(burn_events);

        let timestamps = self.resolve_timestamps(&events).await?;

        let mut series = events
            .iter()
            .map(|event| supply_transfer_delta(event, resolve_timestamp(&timestamps, event)?))
            .collect::<Result<TimeSeries>>()?;
        series.sort();

        Ok(series)
    }

    async fn reserve_changes_from_lp(&self) -> Result<Vec<Delta>> {
        let events = self
            .query_events(&EventQuery::PoolBalanceChanged {
                vault: self.config.vault,
                pool_id: self.config.pool.pool_id,
            })
            .await?;
        let timestamps = self.resolve_timestamps(&events).await?;

        let mut deltas = Vec::with_capacity(events.len() * 2);
        for event in &events {
            let timestamp = resolve_timestamp(&timestamps, event)?;
            deltas.extend(pool_balance_deltas(event, timestamp, &self.config.pool)?);
        }

        Ok(deltas)
    }

    async fn reserve_changes_from_swaps(&self) -> Result<Vec<Delta>> {
        let events = self
            .query_events(&EventQuery::Swaps {
                vault: self.config.vault,
                pool_id: self.config.pool.pool_id,
            })
            .await?;
        let timestamps = self.resolve_timestamps(&events).await?;

        events
            .iter()
            .map(|event| swap_delta(event, resolve_timestamp(&timestamps, event)?, &self.config.pool))
            .collect()
    }

    fn load_summary(&self) -> String {
        format!(
            "blocks={}..={} receipt_token={} snapshot_holders={} accounts_with_changes={}",
            self.range.start_block,
            self.range.end_block,
            address_key(&self.config.receipt_token),
            self.initial.receipt_balances.len(),
            self.changes.receipt_balances.len()
        )
    }

    // ============================================
    // Queries
    // ============================================

    /// Reserve-token balance of the pool at `timestamp`.
    pub fn reserve_at(&self, timestamp: u64) -> Result<BigDecimal> {
        self.ensure_ready()?;
        Ok(self
            .changes
            .pool_reserve
            .value_at(timestamp, &self.initial.pool_reserve, false))
    }

    /// Pool-token total supply at `timestamp`.
    pub fn supply_at(&self, timestamp: u64) -> Result<BigDecimal> {
        self.ensure_ready()?;
        Ok(self
            .changes
            .pool_token_supply
            .value_at(timestamp, &self.initial.pool_token_supply, false))
    }

    /// Reserve tokens per pool token, or `None` when the supply is zero.
    pub fn rate_at(&self, timestamp: u64) -> Result<Option<BigDecimal>> {
        let supply = self.supply_at(timestamp)?;
        if supply.is_zero() {
            return Ok(None);
        }
        Ok(Some(self.reserve_at(timestamp)? / supply))
    }

    /// Reserve tokens per receipt token. Receipts are minted 1:1 for pool
    /// tokens and nothing has been slashed, so this is the pool rate.
    pub fn receipt_rate_at(&self, timestamp: u64) -> Result<Option<BigDecimal>> {
        self.rate_at(timestamp)
    }

    /// Receipt-token balance of `account` at `timestamp`. Case-insensitive.
    pub fn raw_balance_at(&self, account: &str, timestamp: u64) -> Result<BigDecimal> {
        self.ensure_ready()?;
        let account = normalize_address(account);

        Ok(reduce(
            timestamp,
            self.initial.receipt_balances.get(&account),
            self.changes
                .receipt_balances
                .get(&account)
                .map(TimeSeries::deltas),
            true,
        ))
    }

    /// Economic balance of every tracked address, or `None` when no stake
    /// exists at `timestamp`.
    pub fn economic_balances_at(
        &self,
        timestamp: u64,
    ) -> Result<Option<BTreeMap<String, BigDecimal>>> {
        let Some(rate) = self.receipt_rate_at(timestamp)? else {
            return Ok(None);
        };

        let accounts: BTreeSet<String> = self.tracked_addresses()?.into_iter().collect();

        accounts
            .into_iter()
            .map(|account| {
                let balance = self.raw_balance_at(&account, timestamp)? * &rate;
                Ok((account, balance))
            })
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Some)
    }
}

#[async_trait]
impl StakeTracker for SafetyModuleTracker {
    fn block_range(&self) -> BlockRange {
        self.range
    }

    fn phase(&self) -> TrackerPhase {
        self.phase
    }

    async fn load_initial_state(&mut self) -> Result<()> {
        if self.phase != TrackerPhase::Uninitialized {
            return Err(TrackerError::AlreadyLoaded("initial state"));
        }

        self.initial = self.fetch_initial_state().await?;
        self.phase = TrackerPhase::SnapshotReady;
        Ok(())
    }

    async fn load_state_changes(&mut self) -> Result<()> {
        match self.phase {
            TrackerPhase::SnapshotReady => {},
            TrackerPhase::Ready => return Err(TrackerError::AlreadyLoaded("state changes")),
            phase => return Err(TrackerError::NotReady(phase)),
        }

        self.changes = self.fetch_state_changes().await?;
        self.phase = TrackerPhase::Ready;
        Ok(())
    }

    /// Both phases write disjoint state, so they are fetched concurrently.
    async fn load_stakes(&mut self) -> Result<()> {
        if self.phase != TrackerPhase::Uninitialized {
            return Err(TrackerError::AlreadyLoaded("stakes"));
        }

        let (initial, changes) =
            tokio::try_join!(self.fetch_initial_state(), self.fetch_state_changes())?;

        self.initial = initial;
        self.changes = changes;
        self.phase = TrackerPhase::Ready;

        info!("Safety module stakes ready: {}", self.load_summary());
        Ok(())
    }

    fn tracked_addresses(&self) -> Result<Vec<String>> {
        self.ensure_ready()?;
        Ok(self
            .initial
            .receipt_balances
            .keys()
            .chain(self.changes.receipt_balances.keys())
            .cloned()
            .collect())
    }

    fn economic_balance_at(&self, account: &str, timestamp: u64) -> Result<Option<BigDecimal>> {
        let Some(rate) = self.receipt_rate_at(timestamp)? else {
            return Ok(None);
        };
        Ok(Some(self.raw_balance_at(account, timestamp)? * rate))
    }
}
