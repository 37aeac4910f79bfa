//! Gas pricing strategies.
//!
//! Polygon keepers historically pinned a fixed legacy gas price; the
//! strategies here cover that, node-suggested legacy pricing and EIP-1559.
//!
//! # Example
//!
//! ```rust,ignore
//! use keeper_chain::gas::{create_gas_strategy, GasStrategy};
//!
//! let fixed = create_gas_strategy("Fixed", 50.0, 500.0, None);
//! let params = fixed.fetch_params(rpc_url).await?;
//! ```

mod eip1559;
mod legacy;

pub use eip1559::Eip1559GasStrategy;
pub use legacy::LegacyGasStrategy;

use alloy::rpc::types::TransactionRequest;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Wei per gwei.
pub const GWEI: u128 = 1_000_000_000;

/// Convert a gwei amount from config into wei.
pub fn gwei_to_wei(gwei: f64) -> u128 {
    (gwei * GWEI as f64) as u128
}

/// Gas parameters for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasParams {
    Legacy {
        gas_price: u128,
    },
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
        base_fee: u128,
    },
}

impl GasParams {
    /// Upper bound paid per unit of gas.
    pub fn effective_gas_price(&self) -> u128 {
        match self {
            GasParams::Legacy { gas_price } => *gas_price,
            GasParams::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }
}

/// Gas pricing strategy.
#[async_trait]
pub trait GasStrategy: Send + Sync + Debug {
    /// Current gas parameters, querying the node when the strategy needs it.
    async fn fetch_params(&self, rpc_url: &str) -> Result<GasParams>;

    /// Write the parameters onto a transaction request.
    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams);

    fn strategy_name(&self) -> &'static str;
}

/// Build a strategy from the chain's gas config.
///
/// * `pricing_model` - "Fixed", "Legacy" or "Eip1559" (case-insensitive)
/// * `default_gas_price_gwei` - fixed price, or fallback when the node fails
/// * `max_gas_price_gwei` - hard cap
/// * `priority_fee_gwei` - EIP-1559 tip
pub fn create_gas_strategy(
    pricing_model: &str,
    default_gas_price_gwei: f64,
    max_gas_price_gwei: f64,
    priority_fee_gwei: Option<f64>,
) -> Box<dyn GasStrategy> {
    match pricing_model.to_lowercase().as_str() {
        "eip1559" | "eip-1559" => Box::new(
            Eip1559GasStrategy::new(gwei_to_wei(priority_fee_gwei.unwrap_or(30.0)), 2.0)
                .with_max_fee_cap(gwei_to_wei(max_gas_price_gwei)),
        ),
        "legacy" => Box::new(LegacyGasStrategy::new(
            gwei_to_wei(default_gas_price_gwei),
            gwei_to_wei(max_gas_price_gwei),
        )),
        _ => Box::new(LegacyGasStrategy::fixed(gwei_to_wei(default_gas_price_gwei))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gwei_to_wei() {
        assert_eq!(gwei_to_wei(50.0), 50 * GWEI);
        assert_eq!(gwei_to_wei(0.5), GWEI / 2);
    }

    #[test]
    fn test_effective_gas_price() {
        let legacy = GasParams::Legacy { gas_price: 50 * GWEI };
        assert_eq!(legacy.effective_gas_price(), 50 * GWEI);

        let eip1559 = GasParams::Eip1559 {
            max_fee_per_gas: 120 * GWEI,
            max_priority_fee_per_gas: 30 * GWEI,
            base_fee: 45 * GWEI,
        };
        assert_eq!(eip1559.effective_gas_price(), 120 * GWEI);
    }

    #[test]
    fn test_create_gas_strategy() {
        assert_eq!(create_gas_strategy("Fixed", 50.0, 500.0, None).strategy_name(), "Fixed");
        assert_eq!(create_gas_strategy("legacy", 50.0, 500.0, None).strategy_name(), "Legacy");
        assert_eq!(
            create_gas_strategy("Eip1559", 50.0, 500.0, Some(30.0)).strategy_name(),
            "EIP-1559"
        );
        // Unknown models pin the default price
        assert_eq!(create_gas_strategy("whatever", 50.0, 500.0, None).strategy_name(), "Fixed");
    }
}
