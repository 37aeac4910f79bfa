//! Legacy (single gas price) pricing, pinned or node-suggested.

use super::{GasParams, GasStrategy};
use alloy::network::TransactionBuilder;
use alloy::rpc::types::TransactionRequest;
use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

/// Legacy gas pricing.
///
/// In fixed mode the node is never asked; otherwise `eth_gasPrice` is used,
/// falling back to the default price when the call fails. Either way the
/// price never exceeds `max_gas_price`.
#[derive(Debug)]
pub struct LegacyGasStrategy {
    default_gas_price: u128,
    max_gas_price: u128,
    query_node: bool,
}

impl LegacyGasStrategy {
    /// Node-suggested price with a fallback and a cap (both in wei).
    pub fn new(default_gas_price: u128, max_gas_price: u128) -> Self {
        Self {
            default_gas_price,
            max_gas_price,
            query_node: true,
        }
    }

    /// Always use `gas_price` (wei).
    pub fn fixed(gas_price: u128) -> Self {
        Self {
            default_gas_price: gas_price,
            max_gas_price: gas_price,
            query_node: false,
        }
    }

    pub fn is_fixed(&self) -> bool {
        !self.query_node
    }

    fn capped(&self, gas_price: u128) -> u128 {
        gas_price.min(self.max_gas_price)
    }
}

#[async_trait]
impl GasStrategy for LegacyGasStrategy {
    async fn fetch_params(&self, rpc_url: &str) -> Result<GasParams> {
        if !self.query_node {
            return Ok(GasParams::Legacy {
                gas_price: self.default_gas_price,
            });
        }

        use alloy::providers::{Provider, ProviderBuilder};

        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);
        let gas_price = match provider.get_gas_price().await {
            Ok(price) => price,
            Err(e) => {
                warn!(error = %e, "eth_gasPrice failed, using default gas price");
                self.default_gas_price
            }
        };

        Ok(GasParams::Legacy {
            gas_price: self.capped(gas_price),
        })
    }

    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams) {
        tx.set_gas_price(self.capped(params.effective_gas_price()));
    }

    fn strategy_name(&self) -> &'static str {
        if self.query_node {
            "Legacy"
        } else {
            "Fixed"
        }
    }
}
