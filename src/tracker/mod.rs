//! Stake trackers: snapshot plus differential state over a fixed block range.
//!
//! A tracker moves through two load phases, once each:
//!
//! ```text
//! Uninitialized --load_initial_state--> SnapshotReady --load_state_changes--> Ready
//! ```
//!
//! Queries are answered only in [`TrackerPhase::Ready`]; after that all state
//! is read-only and can be shared freely.

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::error::{Result, TrackerError};

pub mod registry;
pub mod safety_module;

pub use registry::TrackerRegistry;
pub use safety_module::{InitialState, SafetyModuleConfig, SafetyModuleTracker, StateChanges};

/// Inclusive block window `[start_block, end_block]`.
///
/// The snapshot is read at `start_block - 1` and deltas are collected from
/// events inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRange {
    pub start_block: u64,
    pub end_block: u64,
}

impl BlockRange {
    pub fn new(start_block: u64, end_block: u64) -> Result<Self> {
        if start_block == 0 || start_block > end_block {
            return Err(TrackerError::InvalidRange {
                start_block,
                end_block,
            });
        }
        Ok(Self {
            start_block,
            end_block,
        })
    }

    /// Block the snapshot state is read at.
    pub fn snapshot_block(&self) -> u64 {
        self.start_block - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    Uninitialized,
    SnapshotReady,
    Ready,
}

/// Lifecycle shared by every stake tracker.
#[async_trait]
pub trait StakeTracker: Send + Sync {
    fn block_range(&self) -> BlockRange;

    fn phase(&self) -> TrackerPhase;

    /// Read every snapshot quantity at the reference block.
    async fn load_initial_state(&mut self) -> Result<()>;

    /// Collect, translate and sort the deltas for the block range.
    async fn load_state_changes(&mut self) -> Result<()>;

    /// Run both load phases.
    async fn load_stakes(&mut self) -> Result<()> {
        self.load_initial_state().await?;
        self.load_state_changes().await
    }

    /// Every address with a snapshot balance or an observed delta.
    ///
    /// An address present in both appears twice.
    fn tracked_addresses(&self) -> Result<Vec<String>>;

    /// Stake of `account` at `timestamp` in units of the underlying token,
    /// or `None` when no stake exists at that time.
    fn economic_balance_at(&self, account: &str, timestamp: u64) -> Result<Option<BigDecimal>>;

    fn ensure_ready(&self) -> Result<()> {
        match self.phase() {
            TrackerPhase::Ready => Ok(()),
            phase => Err(TrackerError::NotReady(phase)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_range_snapshot_block() {
        let range = BlockRange::new(14_500_000, 14_600_000).unwrap();
        assert_eq!(range.snapshot_block(), 14_499_999);

        let single = BlockRange::new(7, 7).unwrap();
        assert_eq!(single.snapshot_block(), 6);
    }

    #[test]
    fn test_invalid_block_ranges() {
        for (start, end) in [(0, 10), (11, 10)] {
            let err = BlockRange::new(start, end).unwrap_err();
            assert!(err.is_misuse());
        }
    }
}
