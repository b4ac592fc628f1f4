use std::sync::Arc;

use anyhow::Context;
use bigdecimal::BigDecimal;
use chrono::DateTime;
use jemallocator::Jemalloc;
use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use stakes_tracker::{
    utils::to_units, CovalentClient, Gateways, RpcGateway, SafetyModuleTracker, Settings,
    StakeTracker, TrackerRegistry,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .context("Failed to install logger")?;

    // Load configuration
    let settings = Settings::new()
        .context("Failed to load config.yaml. Please ensure it exists and is valid")?;

    let range = settings.block_range()?;

    let rpc = Arc::new(RpcGateway::new(&settings.rpc).context("Failed to create RPC gateway")?);
    let holders =
        Arc::new(CovalentClient::new(&settings.holders).context("Failed to create holder API client")?);

    let registry = TrackerRegistry::new(
        settings.safety_module_config(),
        Gateways::from_rpc(rpc.clone(), holders),
    );

    let tracker = registry
        .get_or_load(range)
        .await
        .context("Failed to load safety module stakes")?;

    let timestamp = match settings.query.timestamp {
        Some(timestamp) => timestamp,
        None => rpc
            .block_timestamp(range.end_block)
            .await
            .context("Failed to read end block timestamp")?,
    };

    report(&tracker, &settings, timestamp)
}

fn report(tracker: &SafetyModuleTracker, settings: &Settings, timestamp: u64) -> anyhow::Result<()> {
    let decimals = settings.query.display_decimals;
    let units = |raw: &BigDecimal| to_units(raw, decimals).round(6);

    let time = DateTime::from_timestamp(timestamp as i64, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string());

    info!("Safety module state at {} ({})", time, timestamp);
    info!("  pool reserve: {}", units(&tracker.reserve_at(timestamp)?));
    info!("  pool token supply: {}", units(&tracker.supply_at(timestamp)?));

    let Some(rate) = tracker.receipt_rate_at(timestamp)? else {
        warn!("Pool token supply is zero at {}, no stake exists", timestamp);
        return Ok(());
    };
    info!("  receipt rate: {}", rate.round(8));

    let accounts = if settings.query.accounts.is_empty() {
        let mut accounts = tracker.tracked_addresses()?;
        accounts.sort();
        accounts.dedup();
        accounts
    } else {
        settings.query.accounts.clone()
    };

    let mut total = BigDecimal::from(0);
    for account in &accounts {
        let raw = tracker.raw_balance_at(account, timestamp)?;
        let economic = &raw * &rate;
        info!(
            "  {}: staked={} value={}",
            account,
            units(&raw),
            units(&economic)
        );
        total += economic;
    }

    info!("{} accounts, total value {}", accounts.len(), units(&total));
    Ok(())
}
