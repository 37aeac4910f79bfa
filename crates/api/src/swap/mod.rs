//! Swap aggregator abstractions for hedge trades.
//!
//! The keeper never routes swaps itself: an aggregator quotes the trade and
//! returns calldata that the market maker executes against the aggregator's
//! router (the "spender").
//!
//! # Supported Aggregators
//!
//! - `oneinch`: 1inch v3 HTTP API
//!
//! # Example
//!
//! ```rust,ignore
//! use keeper_api::swap::{OneInchClient, QuoteRequest, SwapAggregator};
//!
//! let aggregator = OneInchClient::new(137);
//! let spender = aggregator.spender().await?;
//! let quote = aggregator.quote(QuoteRequest::new(usdc, weth, amount)).await?;
//! ```

mod oneinch;

pub use oneinch::{OneInchClient, DEFAULT_ONEINCH_URL};

use alloy::primitives::{Address, Bytes, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Parameters for a price quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub from_token: Address,
    pub to_token: Address,
    /// Amount of `from_token` to sell (raw, with decimals)
    pub amount: U256,
}

impl QuoteRequest {
    pub fn new(from_token: Address, to_token: Address, amount: U256) -> Self {
        Self {
            from_token,
            to_token,
            amount,
        }
    }
}

/// Parameters for swap calldata.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapRequest {
    pub from_token: Address,
    pub to_token: Address,
    pub amount: U256,
    /// Account that holds the tokens and executes the swap
    pub from_address: Address,
    /// Slippage tolerance in percent (1.0 = 1%)
    pub slippage_percent: f64,
    /// Skip the aggregator's balance and allowance checks
    pub disable_estimate: bool,
}

impl SwapRequest {
    /// Create a swap request with 1% slippage and estimation enabled.
    pub fn new(from_token: Address, to_token: Address, amount: U256, from_address: Address) -> Self {
        Self {
            from_token,
            to_token,
            amount,
            from_address,
            slippage_percent: 1.0,
            disable_estimate: false,
        }
    }

    pub fn with_slippage_percent(mut self, slippage_percent: f64) -> Self {
        self.slippage_percent = slippage_percent;
        self
    }

    /// Needed when the approval is not mined yet at request time.
    pub fn with_disable_estimate(mut self, disable_estimate: bool) -> Self {
        self.disable_estimate = disable_estimate;
        self
    }
}

/// Token metadata echoed by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// Aggregator price quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub from_token: TokenInfo,
    pub to_token: TokenInfo,
    pub from_token_amount: U256,
    pub to_token_amount: U256,
    pub estimated_gas: u64,
}

/// Transaction the aggregator wants executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapTransaction {
    pub from: Address,
    /// Aggregator router
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas: u64,
    pub gas_price: U256,
}

/// Quote plus executable transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapResponse {
    pub from_token: TokenInfo,
    pub to_token: TokenInfo,
    pub from_token_amount: U256,
    pub to_token_amount: U256,
    pub tx: SwapTransaction,
}

/// Trait for swap aggregators.
#[async_trait]
pub trait SwapAggregator: Send + Sync + Debug {
    /// Aggregator identifier (e.g., "1inch").
    fn aggregator_id(&self) -> &str;

    fn chain_id(&self) -> u64;

    /// Router address that must be approved to spend the sold token.
    async fn spender(&self) -> Result<Address>;

    async fn quote(&self, request: QuoteRequest) -> Result<Quote>;

    /// Swap calldata for the given request.
    async fn swap(&self, request: SwapRequest) -> Result<SwapResponse>;
}
