//! Keeper configuration with profile support.
//!
//! A run is configured from a named profile (`polygon`, `mumbai`) or a TOML
//! file. Every section has defaults, so a file only needs the values that
//! differ. `${VAR}` placeholders are expanded from the environment after
//! loading.

use super::chain::{expand_env, unresolved_vars, ChainSettings, GasPricingModel, GasSettings};
use alloy::primitives::utils::parse_ether;
use alloy::primitives::{address, Address, U256};
use anyhow::{Context, Result};
use keeper_api::DEFAULT_ONEINCH_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Build and log transactions without sending them
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub chain: ChainSettings,

    #[serde(default)]
    pub gas: GasSettings,

    /// Market makers to hedge and exchanges to expire
    #[serde(default)]
    pub contracts: ContractsConfig,

    #[serde(default)]
    pub abi: AbiConfig,

    #[serde(default)]
    pub aggregator: AggregatorConfig,

    #[serde(default)]
    pub hedge: HedgeSettings,

    #[serde(default)]
    pub expiry: ExpirySettings,

    #[serde(default)]
    pub trade: TradeSettings,
}

fn default_profile_name() -> String {
    "polygon".to_string()
}

/// Protocol contract addresses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// Market makers whose hedges are rebalanced
    #[serde(default)]
    pub markets: Vec<Address>,
    /// Exchanges polled for expiring options
    #[serde(default)]
    pub exchanges: Vec<Address>,
}

/// Where the contract build's JSON ABI files live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbiConfig {
    /// Searched first; `../build/contracts` is always the fallback
    #[serde(default = "default_abi_dir")]
    pub dir: PathBuf,
    /// Verify the artifacts before hedging or expiring
    #[serde(default = "default_verify_on_start")]
    pub verify_on_start: bool,
}

fn default_abi_dir() -> PathBuf {
    PathBuf::from("build/contracts")
}
fn default_verify_on_start() -> bool {
    false
}

impl Default for AbiConfig {
    fn default() -> Self {
        Self {
            dir: default_abi_dir(),
            verify_on_start: default_verify_on_start(),
        }
    }
}

/// Swap aggregator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_aggregator_url")]
    pub base_url: String,
    /// Sent as a bearer token when set, `${VAR}` placeholders allowed
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_aggregator_url() -> String {
    DEFAULT_ONEINCH_URL.to_string()
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: default_aggregator_url(),
            api_key: None,
        }
    }
}

/// Hedge rebalancing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeSettings {
    /// Interval between runs in watch mode (seconds)
    #[serde(default = "default_hedge_interval")]
    pub poll_interval_secs: u64,
    /// How long to wait for each receipt (seconds)
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    /// Skip the swap phase (loans only)
    #[serde(default)]
    pub skip_swap: bool,
}

fn default_hedge_interval() -> u64 {
    3600
}
fn default_confirmation_timeout() -> u64 {
    180
}

impl Default for HedgeSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_hedge_interval(),
            confirmation_timeout_secs: default_confirmation_timeout(),
            skip_swap: false,
        }
    }
}

impl HedgeSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

/// Option expiry polling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpirySettings {
    /// Interval between polls in watch mode (seconds)
    #[serde(default = "default_expiry_interval")]
    pub poll_interval_secs: u64,
    /// Exchanges read in parallel per poll
    #[serde(default = "default_max_concurrent_reads")]
    pub max_concurrent_reads: usize,
}

fn default_expiry_interval() -> u64 {
    60
}
fn default_max_concurrent_reads() -> usize {
    4
}

impl Default for ExpirySettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_expiry_interval(),
            max_concurrent_reads: default_max_concurrent_reads(),
        }
    }
}

impl ExpirySettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Option trading settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSettings {
    /// Protocol registry resolving the broker and volatility chains
    #[serde(default)]
    pub registry: Option<Address>,
    /// Exchange the options are bought on
    #[serde(default)]
    pub exchange: Option<Address>,
    #[serde(default)]
    pub underlyings: Vec<TradedUnderlying>,
    /// Option tenor (seconds)
    #[serde(default = "default_option_tenor")]
    pub tenor_secs: u64,
    /// Option size in underlying units, e.g. "0.01"
    #[serde(default = "default_option_amount")]
    pub option_amount: String,
    /// Pools traded per underlying, in broker order
    #[serde(default = "default_pools_per_underlying")]
    pub pools_per_underlying: usize,
    /// Interval between runs in watch mode (seconds)
    #[serde(default = "default_trade_interval")]
    pub poll_interval_secs: u64,
}

/// An underlying options are bought on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradedUnderlying {
    pub symbol: String,
    pub token: Address,
    /// Strike grid in whole price units (50 for ETH, 100 for BTC)
    pub min_tick: u64,
}

fn default_option_tenor() -> u64 {
    86_400
}
fn default_option_amount() -> String {
    "0.01".to_string()
}
fn default_pools_per_underlying() -> usize {
    1
}
fn default_trade_interval() -> u64 {
    86_400
}

impl Default for TradeSettings {
    fn default() -> Self {
        Self {
            registry: None,
            exchange: None,
            underlyings: Vec::new(),
            tenor_secs: default_option_tenor(),
            option_amount: default_option_amount(),
            pools_per_underlying: default_pools_per_underlying(),
            poll_interval_secs: default_trade_interval(),
        }
    }
}

impl TradeSettings {
    /// Registry, exchange and at least one underlying are set.
    pub fn is_configured(&self) -> bool {
        self.registry.is_some() && self.exchange.is_some() && !self.underlyings.is_empty()
    }

    /// Option size as a WAD amount.
    pub fn option_amount_wad(&self) -> Result<U256> {
        parse_ether(self.option_amount.trim())
            .with_context(|| format!("Invalid trade.option_amount '{}'", self.option_amount))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.tenor_secs == 0 {
            anyhow::bail!("trade.tenor_secs must be at least 1");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("trade.poll_interval_secs must be at least 1");
        }
        if self.pools_per_underlying == 0 {
            anyhow::bail!("trade.pools_per_underlying must be at least 1");
        }
        if self.option_amount_wad()?.is_zero() {
            anyhow::bail!("trade.option_amount must be above zero");
        }
        if let Some(underlying) = self.underlyings.iter().find(|u| u.min_tick == 0) {
            anyhow::bail!("trade.underlyings: min_tick of {} must be at least 1", underlying.symbol);
        }
        Ok(())
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self::polygon()
    }
}

impl KeeperConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Polygon mainnet deployment.
    pub fn polygon() -> Self {
        Self {
            profile: "polygon".to_string(),
            chain: ChainSettings::polygon(),
            gas: GasSettings::default(),
            contracts: ContractsConfig {
                markets: vec![address!("E7CAC17029eC86fec53Eb2943B0eDa049bc335c3")],
                exchanges: vec![
                    address!("17277a5A0e547cd2425397ffE9069cc3f03C42A2"),
                    address!("6eEfc8B4b5A688eec20501495Fc016e197EB2E2a"),
                ],
            },
            abi: AbiConfig::default(),
            aggregator: AggregatorConfig {
                base_url: default_aggregator_url(),
                api_key: Some("${ONEINCH_API_KEY}".to_string()),
            },
            hedge: HedgeSettings::default(),
            expiry: ExpirySettings::default(),
            trade: TradeSettings {
                underlyings: vec![
                    TradedUnderlying {
                        symbol: "ETH".to_string(),
                        token: address!("7ceB23fD6bC0adD59E62ac25578270cFf1b9f619"),
                        min_tick: 50,
                    },
                    TradedUnderlying {
                        symbol: "BTC".to_string(),
                        token: address!("1BFD67037B42Cf73acF2047067bd4F2C47D9BfD6"),
                        min_tick: 100,
                    },
                ],
                ..TradeSettings::default()
            },
            dry_run: false,
        }
    }

    /// Mumbai testnet deployment.
    pub fn mumbai() -> Self {
        Self {
            profile: "mumbai".to_string(),
            chain: ChainSettings::mumbai(),
            gas: GasSettings {
                pricing: GasPricingModel::Legacy,
                default_gas_price_gwei: 5.0,
                max_gas_price_gwei: 100.0,
                ..GasSettings::default()
            },
            contracts: ContractsConfig {
                markets: Vec::new(),
                exchanges: vec![address!("65d3bF1E994a76Dd512039EF3dF1d111f7B07f4f")],
            },
            abi: AbiConfig::default(),
            aggregator: AggregatorConfig::default(),
            hedge: HedgeSettings::default(),
            expiry: ExpirySettings {
                poll_interval_secs: 30,
                ..ExpirySettings::default()
            },
            trade: TradeSettings {
                registry: Some(address!("386322f0a82d8F82958e6a78AF1Ee6b0Dcc5bAaB")),
                exchange: Some(address!("65d3bF1E994a76Dd512039EF3dF1d111f7B07f4f")),
                underlyings: vec![TradedUnderlying {
                    symbol: "ETH".to_string(),
                    token: address!("A6FA4fB5f76172d178d61B04b0ecd319C5d1C0aa"),
                    min_tick: 50,
                }],
                ..TradeSettings::default()
            },
            dry_run: false,
        }
    }

    /// Named profile, if it exists.
    pub fn profile(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "polygon" | "matic" | "mainnet" => Some(Self::polygon()),
            "mumbai" | "testnet" => Some(Self::mumbai()),
            _ => None,
        }
    }

    /// Get profile from environment variable KEEPER_PROFILE, or polygon.
    pub fn from_env() -> Self {
        std::env::var("KEEPER_PROFILE")
            .ok()
            .and_then(|name| Self::profile(&name))
            .unwrap_or_default()
    }

    /// Resolve the configuration for a run.
    ///
    /// A file wins over a profile; an explicit profile wins over
    /// `KEEPER_PROFILE`. The result has placeholders expanded and is
    /// validated.
    pub fn load(path: Option<&Path>, profile: Option<&str>) -> Result<Self> {
        let mut config = match (path, profile) {
            (Some(path), _) => Self::from_file(path)?,
            (None, Some(name)) => Self::profile(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown profile '{}' (polygon, mumbai)", name))?,
            (None, None) => Self::from_env(),
        };
        config.expand_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables in config values.
    pub fn expand_env_vars(&mut self) {
        self.chain.rpc_url = expand_env(&self.chain.rpc_url);
        self.aggregator.base_url = expand_env(&self.aggregator.base_url);
        if let Some(ref mut key) = self.aggregator.api_key {
            *key = expand_env(key);
        }
        // An API key that stayed a placeholder is treated as unset
        if self
            .aggregator
            .api_key
            .as_deref()
            .is_some_and(|key| key.is_empty() || !unresolved_vars(key).is_empty())
        {
            self.aggregator.api_key = None;
        }
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.chain.chain_id == 0 {
            anyhow::bail!("chain.chain_id must be set");
        }
        let missing = unresolved_vars(&self.chain.rpc_url);
        if !missing.is_empty() {
            anyhow::bail!(
                "chain.rpc_url needs environment variable(s): {}",
                missing.join(", ")
            );
        }
        if self.hedge.poll_interval_secs == 0 {
            anyhow::bail!("hedge.poll_interval_secs must be at least 1");
        }
        if self.hedge.confirmation_timeout_secs == 0 {
            anyhow::bail!("hedge.confirmation_timeout_secs must be at least 1");
        }
        if self.expiry.poll_interval_secs == 0 {
            anyhow::bail!("expiry.poll_interval_secs must be at least 1");
        }
        if self.expiry.max_concurrent_reads == 0 {
            anyhow::bail!("expiry.max_concurrent_reads must be at least 1");
        }
        if self.gas.max_gas_price_gwei < self.gas.default_gas_price_gwei {
            anyhow::bail!(
                "gas.max_gas_price_gwei ({}) is below gas.default_gas_price_gwei ({})",
                self.gas.max_gas_price_gwei,
                self.gas.default_gas_price_gwei
            );
        }
        self.trade.validate()?;
        Ok(())
    }

    /// RPC URL with any API key path segment hidden, for logs.
    pub fn redacted_rpc_url(&self) -> String {
        match self.chain.rpc_url.rsplit_once("/v3/") {
            Some((base, _)) => format!("{}/v3/***", base),
            None => self.chain.rpc_url.clone(),
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(
            profile = %self.profile,
            chain = %self.chain.name,
            chain_id = self.chain.chain_id,
            rpc = %self.redacted_rpc_url(),
            dry_run = self.dry_run,
            "Keeper configuration loaded"
        );
        tracing::info!(
            pricing = self.gas.pricing.as_str(),
            gas_price_gwei = self.gas.default_gas_price_gwei,
            max_gas_price_gwei = self.gas.max_gas_price_gwei,
            approve_limit = self.gas.approve_gas_limit,
            expire_limit = self.gas.expire_gas_limit,
            "Gas settings"
        );
        tracing::info!(
            markets = self.contracts.markets.len(),
            exchanges = self.contracts.exchanges.len(),
            abi_dir = %self.abi.dir.display(),
            aggregator = %self.aggregator.base_url,
            "Contracts"
        );
    }
}

/// Keeper signing key from `PRIVATE_KEY`, falling back to `MNEMONIC`.
///
/// `MNEMONIC` historically held a raw private key, not a phrase.
pub fn keeper_private_key() -> Result<String> {
    std::env::var("PRIVATE_KEY")
        .or_else(|_| std::env::var("MNEMONIC"))
        .map(|key| key.trim().to_string())
        .ok()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| anyhow::anyhow!("PRIVATE_KEY (or MNEMONIC) must be set"))
}
