//! External collaborators: where events, historical reads, block timestamps
//! and holder snapshots come from.
//!
//! Retry, backoff and timeouts belong to the implementations; the tracker
//! treats any error from here as a failed load.

use std::sync::Arc;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use rustc_hash::FxHashMap;

use crate::events::ParsedEvent;

pub mod covalent;
pub mod memory;
pub mod rpc;

pub use covalent::CovalentClient;
pub use memory::{GatewayCall, MemoryGateway};
pub use rpc::RpcGateway;

/// A log query, tagged by the event kind it selects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventQuery {
    /// ERC20 transfers of `token`, optionally narrowed by sender and/or recipient.
    Transfers {
        token: Address,
        from: Option<Address>,
        to: Option<Address>,
    },
    /// Vault joins/exits for one pool.
    PoolBalanceChanged { vault: Address, pool_id: B256 },
    /// Vault swaps for one pool.
    Swaps { vault: Address, pool_id: B256 },
}

impl EventQuery {
    pub fn kind(&self) -> &'static str {
        match self {
            EventQuery::Transfers { .. } => "Transfer",
            EventQuery::PoolBalanceChanged { .. } => "PoolBalanceChanged",
            EventQuery::Swaps { .. } => "Swap",
        }
    }
}

/// One nonzero holder in a balance snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHolder {
    /// Lowercase hex address
    pub address: String,
    /// Raw fixed-point balance
    pub balance: BigDecimal,
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Events matching `query` in the inclusive block window, in chain order.
    async fn query_events(
        &self,
        query: &EventQuery,
        from_block: u64,
        to_block: u64,
    ) -> anyhow::Result<Vec<ParsedEvent>>;
}

#[async_trait]
pub trait StateReader: Send + Sync {
    /// The vault's `cash` balance of `token` for `pool_id` as of `block`.
    async fn pool_token_cash(
        &self,
        vault: Address,
        pool_id: B256,
        token: Address,
        block: u64,
    ) -> anyhow::Result<BigDecimal>;

    async fn total_supply(&self, token: Address, block: u64) -> anyhow::Result<BigDecimal>;
}

#[async_trait]
pub trait TimestampResolver: Send + Sync {
    /// Timestamps for the blocks of `events`.
    ///
    /// Implementations must cover every distinct block in the batch; the
    /// tracker treats a gap as a logic error.
    async fn resolve(&self, events: &[ParsedEvent]) -> anyhow::Result<FxHashMap<u64, u64>>;
}

#[async_trait]
pub trait HolderSnapshotSource: Send + Sync {
    /// Every nonzero holder of `token` as of `block_height`.
    ///
    /// Whether the snapshot reflects exactly that block is up to the
    /// provider; it is trusted, not verified.
    async fn token_holders(
        &self,
        token: Address,
        chain_id: u64,
        block_height: u64,
    ) -> anyhow::Result<Vec<TokenHolder>>;
}

/// The full set of collaborators a tracker needs.
#[derive(Clone)]
pub struct Gateways {
    pub events: Arc<dyn EventSource>,
    pub state: Arc<dyn StateReader>,
    pub timestamps: Arc<dyn TimestampResolver>,
    pub holders: Arc<dyn HolderSnapshotSource>,
}

impl Gateways {
    pub fn new(
        events: Arc<dyn EventSource>,
        state: Arc<dyn StateReader>,
        timestamps: Arc<dyn TimestampResolver>,
        holders: Arc<dyn HolderSnapshotSource>,
    ) -> Self {
        Self {
            events,
            state,
            timestamps,
            holders,
        }
    }

    /// Use a JSON-RPC node for everything but the holder snapshot.
    pub fn from_rpc(rpc: Arc<RpcGateway>, holders: Arc<dyn HolderSnapshotSource>) -> Self {
        Self::new(rpc.clone(), rpc.clone(), rpc, holders)
    }

    /// Serve every collaborator from one in-memory fixture.
    pub fn from_memory(memory: Arc<MemoryGateway>) -> Self {
        Self::new(memory.clone(), memory.clone(), memory.clone(), memory)
    }
}
