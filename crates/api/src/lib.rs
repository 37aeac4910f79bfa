//! Keeper API clients for external services.
//!
//! This crate provides HTTP clients for:
//! - 1inch: spender lookup, quotes and swap calldata for hedge trades

mod error;
pub mod swap;

pub use error::AggregatorError;
pub use swap::{
    OneInchClient, Quote, QuoteRequest, SwapAggregator, SwapRequest, SwapResponse,
    SwapTransaction, TokenInfo, DEFAULT_ONEINCH_URL,
};
