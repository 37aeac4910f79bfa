//! EIP-1559 pricing: base fee times a multiplier plus a priority fee.

use super::{GasParams, GasStrategy, GWEI};
use alloy::network::TransactionBuilder;
use alloy::rpc::types::TransactionRequest;
use anyhow::Result;
use async_trait::async_trait;

/// Base fee used when the latest block carries none.
const FALLBACK_BASE_FEE: u128 = 30 * GWEI;

#[derive(Debug)]
pub struct Eip1559GasStrategy {
    /// Tip used when the node does not suggest one (wei)
    default_priority_fee: u128,
    /// max_fee = base_fee * multiplier + priority_fee
    max_fee_multiplier: f64,
    /// Hard cap on max_fee_per_gas (wei)
    max_fee_cap: u128,
}

impl Eip1559GasStrategy {
    pub fn new(default_priority_fee: u128, max_fee_multiplier: f64) -> Self {
        Self {
            default_priority_fee,
            max_fee_multiplier,
            max_fee_cap: 500 * GWEI,
        }
    }

    pub fn with_max_fee_cap(mut self, cap: u128) -> Self {
        self.max_fee_cap = cap;
        self
    }

    fn calculate_max_fee(&self, base_fee: u128, priority_fee: u128) -> u128 {
        let max_fee = ((base_fee as f64) * self.max_fee_multiplier) as u128 + priority_fee;
        max_fee.min(self.max_fee_cap)
    }
}

#[async_trait]
impl GasStrategy for Eip1559GasStrategy {
    async fn fetch_params(&self, rpc_url: &str) -> Result<GasParams> {
        use alloy::providers::{Provider, ProviderBuilder};

        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);

        let block = provider
            .get_block_by_number(alloy::eips::BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Latest block unavailable"))?;

        let base_fee = block
            .header
            .base_fee_per_gas
            .map(|b| b as u128)
            .unwrap_or(FALLBACK_BASE_FEE);

        let priority_fee = provider
            .get_max_priority_fee_per_gas()
            .await
            .unwrap_or(self.default_priority_fee);

        Ok(GasParams::Eip1559 {
            max_fee_per_gas: self.calculate_max_fee(base_fee, priority_fee),
            max_priority_fee_per_gas: priority_fee.min(self.max_fee_cap),
            base_fee,
        })
    }

    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams) {
        match params {
            GasParams::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
                ..
            } => {
                tx.set_max_fee_per_gas(*max_fee_per_gas);
                tx.set_max_priority_fee_per_gas(*max_priority_fee_per_gas);
            }
            GasParams::Legacy { gas_price } => {
                tx.set_max_fee_per_gas(*gas_price);
                tx.set_max_priority_fee_per_gas(self.default_priority_fee.min(*gas_price));
            }
        }
    }

    fn strategy_name(&self) -> &'static str {
        "EIP-1559"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    #[test]
    fn test_max_fee_calculation() {
        let strategy = Eip1559GasStrategy::new(30 * GWEI, 2.0);
        // 40 * 2 + 30
        assert_eq!(strategy.calculate_max_fee(40 * GWEI, 30 * GWEI), 110 * GWEI);
    }

    #[test]
    fn test_max_fee_cap() {
        let strategy = Eip1559GasStrategy::new(30 * GWEI, 10.0).with_max_fee_cap(200 * GWEI);
        assert_eq!(strategy.calculate_max_fee(40 * GWEI, 30 * GWEI), 200 * GWEI);
    }

    #[test]
    fn test_apply_legacy_params() {
        let strategy = Eip1559GasStrategy::new(30 * GWEI, 2.0);
        let mut tx = TransactionRequest::default().with_to(Address::ZERO);

        strategy.apply_gas(&mut tx, &GasParams::Legacy { gas_price: 20 * GWEI });
        assert_eq!(tx.max_fee_per_gas, Some(20 * GWEI));
        // Tip never exceeds the fee cap
        assert_eq!(tx.max_priority_fee_per_gas, Some(20 * GWEI));
    }
}
