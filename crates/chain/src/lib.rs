//! Keeper chain interaction layer.
//!
//! This crate provides:
//! - Contract bindings for the market maker, exchange, option vault, registry,
//!   broker, volatility chain and lending pool
//! - ABI artifact loading and verification
//! - Read-only protocol state behind [`ProtocolReader`]
//! - Transaction signing and sending with a local nonce counter
//! - Gas strategy abstraction (Fixed, Legacy, EIP-1559)

pub mod contracts;
pub mod gas;
mod provider;
mod signer;

pub use contracts::artifacts::{ArtifactKind, ArtifactStore, ContractArtifact};
pub use contracts::{CallKind, OptionOrder, OptionType, TxCall};
pub use provider::{
    ChainReader, ExchangeContracts, LendingPoolRef, LoanTrades, MarketTokens, OptionMarket,
    OptionQuote, ProtocolReader, SwapTrades,
};
pub use signer::{
    NonceManager, TransactionSender, TransactionSenderBuilder, TxOutcome, TxSubmitter,
    DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_GAS_LIMIT,
};
