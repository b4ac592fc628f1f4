#[allow(clippy::module_inception)]
mod config;

pub use self::config::{
    HolderApiSettings, QuerySettings, RangeSettings, RpcSettings, SafetyModuleSettings, Settings,
};
