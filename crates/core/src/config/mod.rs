//! Configuration for the options keeper.
//!
//! This module provides:
//! - Keeper runtime configuration (profiles, TOML files, intervals, option trading)
//! - Chain configuration (RPC endpoint, gas pricing and limits)
//! - `${VAR}` expansion from the environment

mod chain;
mod keeper;

pub use chain::{expand_env, ChainSettings, GasPricingModel, GasSettings};
pub use keeper::{
    keeper_private_key, AbiConfig, AggregatorConfig, ContractsConfig, ExpirySettings,
    HedgeSettings, KeeperConfig, TradeSettings, TradedUnderlying,
};
