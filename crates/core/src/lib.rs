//! Options keeper core logic.
//!
//! This crate provides the keeper jobs run against the options protocol:
//! - Hedge rebalancing (lending pool loans, then aggregator swaps)
//! - Option expiry for every configured exchange
//! - Capital reports for market makers
//! - Option trading around spot on the configured underlyings
//!
//! Transactions go through a [`CallRunner`], which issues them one at a time
//! and supports dry runs.

mod capital;
pub mod config;
mod executor;
mod expiry;
pub mod hedge;
mod trade;
pub mod u256_math;

pub use capital::{CapitalReport, CapitalReporter, HedgeBalance};
pub use config::{
    keeper_private_key, ChainSettings, GasPricingModel, GasSettings, KeeperConfig, TradeSettings,
    TradedUnderlying,
};
pub use executor::{CallRunner, SubmittedCall};
pub use expiry::{ExchangeExpiry, ExchangeStatus, ExpiryKeeper, ExpiryReport};
pub use hedge::{HedgeError, HedgePhase, HedgeRebalancer, HedgeReport, SwapOutcome};
pub use trade::{OptionTrade, OptionTrader, StrikePair, TradeReport, UnderlyingTrades, MAX_APPROVAL};
