//! Chain and gas configuration.

use serde::{Deserialize, Serialize};

/// Chain details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSettings {
    /// Chain ID
    pub chain_id: u64,
    /// Human-readable name
    pub name: String,
    /// HTTP JSON-RPC endpoint, `${VAR}` placeholders allowed
    pub rpc_url: String,
    /// Explorer URL for transaction links
    #[serde(default)]
    pub explorer_url: Option<String>,
}

impl ChainSettings {
    pub fn polygon() -> Self {
        Self {
            chain_id: 137,
            name: "polygon".to_string(),
            rpc_url: "https://polygon-mainnet.infura.io/v3/${INFURA_API_KEY}".to_string(),
            explorer_url: Some("https://polygonscan.com".to_string()),
        }
    }

    pub fn mumbai() -> Self {
        Self {
            chain_id: 80001,
            name: "mumbai".to_string(),
            rpc_url: "https://polygon-mumbai.infura.io/v3/${INFURA_API_KEY}".to_string(),
            explorer_url: Some("https://mumbai.polygonscan.com".to_string()),
        }
    }

    /// Explorer link for a transaction hash, if an explorer is configured.
    pub fn tx_url(&self, tx_hash: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), tx_hash))
    }
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self::polygon()
    }
}

/// Gas pricing model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GasPricingModel {
    /// Always `default_gas_price_gwei`
    #[default]
    Fixed,
    /// Node-suggested gas price, capped
    Legacy,
    /// EIP-1559 (base fee + priority fee)
    Eip1559,
}

impl GasPricingModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GasPricingModel::Fixed => "Fixed",
            GasPricingModel::Legacy => "Legacy",
            GasPricingModel::Eip1559 => "Eip1559",
        }
    }
}

/// Gas pricing and per-call limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasSettings {
    #[serde(default)]
    pub pricing: GasPricingModel,
    /// Fixed price, or fallback when the node fails (in gwei)
    #[serde(default = "default_gas_price")]
    pub default_gas_price_gwei: f64,
    /// Maximum gas price willing to pay (in gwei)
    #[serde(default = "default_max_gas_price")]
    pub max_gas_price_gwei: f64,
    /// Priority fee for EIP-1559 transactions (in gwei)
    #[serde(default)]
    pub priority_fee_gwei: Option<f64>,
    /// Limit for lending pool calls
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,
    /// Limit for `approveSpending`
    #[serde(default = "default_approve_gas_limit")]
    pub approve_gas_limit: u64,
    /// Limit for `expireOptions`
    #[serde(default = "default_expire_gas_limit")]
    pub expire_gas_limit: u64,
    /// Inner swap gas when the aggregator reports none
    #[serde(default = "default_swap_gas")]
    pub swap_gas_fallback: u64,
    /// Added on top of the inner swap gas for the `trade` call itself
    #[serde(default = "default_trade_overhead")]
    pub trade_gas_overhead: u64,
}

fn default_gas_price() -> f64 {
    50.0
}
fn default_max_gas_price() -> f64 {
    500.0
}
fn default_gas_limit() -> u64 {
    1_000_000
}
fn default_approve_gas_limit() -> u64 {
    70_000
}
fn default_expire_gas_limit() -> u64 {
    5_000_000
}
fn default_swap_gas() -> u64 {
    600_000
}
fn default_trade_overhead() -> u64 {
    150_000
}

impl Default for GasSettings {
    fn default() -> Self {
        Self {
            pricing: GasPricingModel::default(),
            default_gas_price_gwei: default_gas_price(),
            max_gas_price_gwei: default_max_gas_price(),
            priority_fee_gwei: None,
            default_gas_limit: default_gas_limit(),
            approve_gas_limit: default_approve_gas_limit(),
            expire_gas_limit: default_expire_gas_limit(),
            swap_gas_fallback: default_swap_gas(),
            trade_gas_overhead: default_trade_overhead(),
        }
    }
}

/// Expand ${VAR_NAME} patterns with environment variable values.
/// Unset variables are left in place.
pub fn expand_env(s: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };

    let mut result = s.to_string();
    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }

    result
}

/// Names of `${VAR}` placeholders still present in `s`.
pub fn unresolved_vars(s: &str) -> Vec<String> {
    match regex_lite::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re
            .captures_iter(s)
            .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env() {
        // Use unique var name to avoid conflicts with parallel tests
        std::env::set_var("KEEPER_CHAIN_TEST_VAR", "test_value");
        assert_eq!(expand_env("${KEEPER_CHAIN_TEST_VAR}"), "test_value");
        assert_eq!(
            expand_env("prefix_${KEEPER_CHAIN_TEST_VAR}_suffix"),
            "prefix_test_value_suffix"
        );
        assert_eq!(expand_env("no_vars"), "no_vars");
        std::env::remove_var("KEEPER_CHAIN_TEST_VAR");
    }

    #[test]
    fn test_unresolved_vars_kept() {
        let s = "https://node/${KEEPER_SURELY_UNSET_VAR}";
        assert_eq!(expand_env(s), s);
        assert_eq!(unresolved_vars(s), vec!["KEEPER_SURELY_UNSET_VAR".to_string()]);
        assert!(unresolved_vars("https://node/abc").is_empty());
    }

    #[test]
    fn test_gas_defaults() {
        let gas = GasSettings::default();
        assert_eq!(gas.pricing, GasPricingModel::Fixed);
        assert_eq!(gas.default_gas_price_gwei, 50.0);
        assert_eq!(gas.approve_gas_limit, 70_000);
        assert_eq!(gas.expire_gas_limit, 5_000_000);
    }

    #[test]
    fn test_tx_url() {
        let chain = ChainSettings::polygon();
        assert_eq!(
            chain.tx_url("0xabc").as_deref(),
            Some("https://polygonscan.com/tx/0xabc")
        );
    }
}
