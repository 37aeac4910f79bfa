//! Contract bindings for the options protocol, its lending pool and ERC20
//! tokens.
//!
//! Bindings are declared inline with `sol!` so the encoded calldata is
//! checked at compile time. The [`artifacts`] module cross-checks them
//! against the JSON ABI files produced by the contract build.
//!
//! # Example
//!
//! ```rust,ignore
//! use keeper_chain::contracts::{moret, TxCall, CallKind};
//!
//! let call = TxCall::new(
//!     CallKind::ExpireOptions,
//!     market,
//!     moret::encode_expire_options(keeper),
//! )
//! .with_gas_limit(5_000_000);
//! ```

pub mod artifacts;
pub mod common;
pub mod lending;
pub mod moret;

pub use common::IERC20;
pub use lending::{ILendingPool, ILendingPoolAddressesProvider};
pub use moret::{
    IExchange, IMarketMaker, IMoret, IMoretBroker, IOptionVault, IVolatilityChain, OptionOrder,
    OptionType,
};

use alloy::primitives::{Address, Bytes};
use std::fmt;

/// What a transaction does, for logging and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Market maker approves a spender for one of its tokens
    ApproveSpending,
    /// Lending pool deposit (collateral increase)
    Deposit,
    /// Lending pool borrow (loan increase)
    Borrow,
    /// Lending pool repay (loan decrease)
    Repay,
    /// Lending pool withdraw (collateral decrease)
    Withdraw,
    /// Market maker executes aggregator swap calldata
    Trade,
    /// Market maker settles expired options
    ExpireOptions,
    /// Keeper approves a spender for one of its own tokens
    Approve,
    /// Keeper buys an option on the exchange
    TradeOption,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::ApproveSpending => "approveSpending",
            CallKind::Deposit => "deposit",
            CallKind::Borrow => "borrow",
            CallKind::Repay => "repay",
            CallKind::Withdraw => "withdraw",
            CallKind::Trade => "trade",
            CallKind::ExpireOptions => "expireOptions",
            CallKind::Approve => "approve",
            CallKind::TradeOption => "tradeOption",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contract call ready to be signed and sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxCall {
    pub kind: CallKind,
    /// Target contract
    pub to: Address,
    /// ABI-encoded calldata
    pub calldata: Bytes,
    /// Explicit gas limit (sender default when `None`)
    pub gas_limit: Option<u64>,
}

impl TxCall {
    pub fn new(kind: CallKind, to: Address, calldata: Bytes) -> Self {
        Self {
            kind,
            to,
            calldata,
            gas_limit: None,
        }
    }

    /// Set an explicit gas limit.
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    /// Function selector of the calldata, if present.
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.calldata.get(..4).and_then(|s| s.try_into().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolCall;

    #[test]
    fn test_tx_call_builder() {
        let call = TxCall::new(
            CallKind::ExpireOptions,
            Address::repeat_byte(7),
            moret::encode_expire_options(Address::repeat_byte(9)),
        )
        .with_gas_limit(5_000_000);

        assert_eq!(call.gas_limit, Some(5_000_000));
        assert_eq!(call.selector(), Some(IMarketMaker::expireOptionsCall::SELECTOR));
        assert_eq!(call.kind.to_string(), "expireOptions");
    }

    #[test]
    fn test_selector_on_empty_calldata() {
        let call = TxCall::new(CallKind::Trade, Address::ZERO, Bytes::new());
        assert_eq!(call.selector(), None);
    }
}
