use std::sync::Arc;

use log::info;
use moka::future::Cache;

use crate::{
    error::TrackerError,
    gateways::Gateways,
    tracker::{BlockRange, SafetyModuleConfig, SafetyModuleTracker, StakeTracker},
};

/// Loaded trackers kept per block range.
const MAX_TRACKERS: u64 = 16;

/// Builds each tracker once per block range and shares it afterwards.
///
/// Concurrent callers asking for the same range wait on a single load. A
/// failed load is not cached, so the next call retries it.
pub struct TrackerRegistry {
    config: SafetyModuleConfig,
    gateways: Gateways,
    trackers: Cache<BlockRange, Arc<SafetyModuleTracker>>,
}

impl TrackerRegistry {
    pub fn new(config: SafetyModuleConfig, gateways: Gateways) -> Self {
        Self {
            config,
            gateways,
            trackers: Cache::builder().max_capacity(MAX_TRACKERS).build(),
        }
    }

    pub async fn get_or_load(
        &self,
        range: BlockRange,
    ) -> Result<Arc<SafetyModuleTracker>, Arc<TrackerError>> {
        self.trackers
            .try_get_with(range, async {
                info!(
                    "Loading safety module tracker for blocks {}..={}",
                    range.start_block, range.end_block
                );
                let mut tracker =
                    SafetyModuleTracker::new(range, self.config.clone(), self.gateways.clone());
                tracker.load_stakes().await?;
                Ok::<_, TrackerError>(Arc::new(tracker))
            })
            .await
    }
}
