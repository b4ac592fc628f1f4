pub mod abis;
pub mod config;
pub mod error;
pub mod events;
pub mod gateways;
pub mod timeseries;
pub mod tracker;
pub mod utils;

pub use config::Settings;
pub use error::TrackerError;
pub use gateways::{CovalentClient, Gateways, MemoryGateway, RpcGateway};
pub use timeseries::{reduce, Delta, TimeSeries};
pub use tracker::{
    BlockRange, SafetyModuleConfig, SafetyModuleTracker, StakeTracker, TrackerPhase,
    TrackerRegistry,
};
