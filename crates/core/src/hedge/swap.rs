//! Aggregator swap for the hedge's token imbalance.

use crate::config::GasSettings;
use crate::u256_math::abs_amount;
use alloy::primitives::{Address, I256, U256};
use keeper_api::{Quote, SwapTransaction};
use keeper_chain::contracts::moret;
use keeper_chain::{CallKind, MarketTokens, SwapTrades, TxCall};
use std::fmt;

/// Which way the market trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    /// Sell funding for underlying
    BuyUnderlying,
    /// Sell underlying for funding
    SellUnderlying,
}

impl fmt::Display for SwapDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapDirection::BuyUnderlying => f.write_str("buy underlying"),
            SwapDirection::SellUnderlying => f.write_str("sell underlying"),
        }
    }
}

/// A swap the market has to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapPlan {
    pub direction: SwapDirection,
    pub sell_token: Address,
    pub buy_token: Address,
    pub sell_amount: U256,
    /// Output the market maker asked for
    pub target_amount: U256,
}

/// What the swap amounts call for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDecision {
    /// Both amounts are zero
    Nothing,
    /// Amounts with the same sign, or one of them zero
    Inconsistent { underlying: I256, funding: I256 },
    Trade(SwapPlan),
}

impl SwapDecision {
    /// Classify the signed deltas from `calcHedgeTradesForSwaps`.
    pub fn classify(trades: &SwapTrades, tokens: &MarketTokens) -> Self {
        let (underlying, funding) = (trades.underlying_amount, trades.funding_amount);

        if underlying.is_positive() && funding.is_negative() {
            SwapDecision::Trade(SwapPlan {
                direction: SwapDirection::BuyUnderlying,
                sell_token: tokens.funding,
                buy_token: tokens.underlying,
                sell_amount: abs_amount(funding),
                target_amount: abs_amount(underlying),
            })
        } else if underlying.is_negative() && funding.is_positive() {
            SwapDecision::Trade(SwapPlan {
                direction: SwapDirection::SellUnderlying,
                sell_token: tokens.underlying,
                buy_token: tokens.funding,
                sell_amount: abs_amount(underlying),
                target_amount: abs_amount(funding),
            })
        } else if underlying.is_zero() && funding.is_zero() {
            SwapDecision::Nothing
        } else {
            SwapDecision::Inconsistent {
                underlying,
                funding,
            }
        }
    }
}

/// `approveSpending(sell_token, spender, sell_amount)` on the market.
pub fn approve_call(market: Address, plan: &SwapPlan, spender: Address, gas: &GasSettings) -> TxCall {
    TxCall::new(
        CallKind::ApproveSpending,
        market,
        moret::encode_approve_spending(plan.sell_token, spender, plan.sell_amount),
    )
    .with_gas_limit(gas.approve_gas_limit)
}

/// Gas the market forwards to the aggregator router.
///
/// The swap's own figure when present, else the quote's estimate, else the
/// configured fallback.
pub fn inner_swap_gas(tx: &SwapTransaction, quote: &Quote, gas: &GasSettings) -> u64 {
    [tx.gas, quote.estimated_gas]
        .into_iter()
        .find(|g| *g > 0)
        .unwrap_or(gas.swap_gas_fallback)
}

/// `trade(sell_token, sell_amount, spender, data, inner_gas)` on the market.
pub fn trade_call(
    market: Address,
    plan: &SwapPlan,
    spender: Address,
    tx: &SwapTransaction,
    inner_gas: u64,
    gas: &GasSettings,
) -> TxCall {
    TxCall::new(
        CallKind::Trade,
        market,
        moret::encode_trade(plan.sell_token, plan.sell_amount, spender, tx.data.clone(), inner_gas),
    )
    .with_gas_limit(inner_gas.saturating_add(gas.trade_gas_overhead))
}
