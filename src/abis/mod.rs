pub mod erc20;
pub mod vault;

pub use erc20::{Transfer, IERC20};
pub use vault::{IVault, PoolBalanceChanged, Swap as VaultSwap};
