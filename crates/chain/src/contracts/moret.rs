//! Options protocol contract interfaces.
//!
//! Subset of the market maker, exchange, option vault, registry, broker and
//! volatility chain ABIs the keeper reads from or sends transactions to.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use std::fmt;

sol! {
    /// Market maker holding the hedge positions of a pool.
    #[sol(rpc)]
    interface IMarketMaker {
        function underlyingAddress() external view returns (address underlying);
        function fundingAddress() external view returns (address funding);
        function aaveAddressProviderAddress() external view returns (address provider);
        function lendingPoolRateMode() external view returns (uint256 rateMode);
        function swapSlippage() external view returns (uint256 slippage);

        function calcHedgeTradesForLoans() external view returns (
            int256 loanAmount,
            int256 collateralAmount,
            address loanAddress,
            address collateralAddress
        );
        function calcHedgeTradesForSwaps() external view returns (
            int256 underlyingAmount,
            int256 fundingAmount
        );
        function calcCapital(bool net, bool average) external view returns (uint256 capital);

        function approveSpending(address token, address spender, uint256 amount) external;
        function trade(address token, uint256 amount, address spender, bytes calldata data, uint256 gas) external;
        function expireOptions(address payer) external;
    }

    /// Option exchange entry point.
    #[sol(rpc)]
    interface IExchange {
        function marketMakerAddress() external view returns (address marketMaker);
        function vaultAddress() external view returns (address vault);

        function queryOption(
            address pool,
            uint256 tenor,
            uint256 strike,
            uint256 amount,
            uint8 poType,
            uint8 paymentMethod,
            bool isSell
        ) external view returns (uint256 premium, uint256 collateral, uint256 price, uint256 volatility);
        function tradeOption(
            address pool,
            uint256 tenor,
            uint256 strike,
            uint256 amount,
            uint8 poType,
            uint8 paymentMethod
        ) external;
    }

    /// Vault tracking open options.
    #[sol(rpc)]
    interface IOptionVault {
        function anyOptionExpiring() external view returns (bool expiring);
    }

    /// Protocol registry.
    #[sol(rpc)]
    interface IMoret {
        function broker() external view returns (address broker);
        function getVolatilityChain(address token) external view returns (address volatilityChain);
    }

    /// Broker holding the option pools of every underlying.
    #[sol(rpc)]
    interface IMoretBroker {
        function funding() external view returns (address funding);
        function getAllPools(address token) external view returns (address[] pools);
    }

    /// Spot and volatility oracle of one underlying.
    #[sol(rpc)]
    interface IVolatilityChain {
        function queryPrice() external view returns (uint256 price);
    }
}

/// Option payoff, as the exchange encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn code(&self) -> u8 {
        match self {
            OptionType::Call => 0,
            OptionType::Put => 1,
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OptionType::Call => "call",
            OptionType::Put => "put",
        })
    }
}

/// An option bought from a pool through the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionOrder {
    pub pool: Address,
    /// Seconds to expiry
    pub tenor: u64,
    /// Strike price (WAD)
    pub strike: U256,
    /// Underlying amount (WAD)
    pub amount: U256,
    pub option_type: OptionType,
    /// 0 pays the premium in the funding token
    pub payment_method: u8,
}

/// Encode `tradeOption(pool, tenor, strike, amount, poType, paymentMethod)`
/// on the exchange.
pub fn encode_trade_option(order: &OptionOrder) -> Bytes {
    IExchange::tradeOptionCall {
        pool: order.pool,
        tenor: U256::from(order.tenor),
        strike: order.strike,
        amount: order.amount,
        poType: order.option_type.code(),
        paymentMethod: order.payment_method,
    }
    .abi_encode()
    .into()
}

/// Encode `approveSpending(token, spender, amount)` on the market maker.
pub fn encode_approve_spending(token: Address, spender: Address, amount: U256) -> Bytes {
    IMarketMaker::approveSpendingCall {
        token,
        spender,
        amount,
    }
    .abi_encode()
    .into()
}

/// Encode `trade(token, amount, spender, data, gas)` on the market maker.
///
/// `data` is the aggregator's swap calldata, executed by the market maker
/// against `spender` with the given inner gas budget.
pub fn encode_trade(token: Address, amount: U256, spender: Address, data: Bytes, gas: u64) -> Bytes {
    IMarketMaker::tradeCall {
        token,
        amount,
        spender,
        data,
        gas: U256::from(gas),
    }
    .abi_encode()
    .into()
}

/// Encode `expireOptions(payer)` on the market maker.
pub fn encode_expire_options(payer: Address) -> Bytes {
    IMarketMaker::expireOptionsCall { payer }.abi_encode().into()
}
