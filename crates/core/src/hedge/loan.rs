//! Lending pool adjustments for a market's hedge.
//!
//! The market maker computes signed loan and collateral deltas; this module
//! turns them into the ordered calls that move the lending position there.

use crate::config::GasSettings;
use crate::u256_math::abs_amount;
use alloy::primitives::Address;
use keeper_chain::contracts::{lending, moret};
use keeper_chain::{CallKind, LendingPoolRef, LoanTrades, MarketTokens, TxCall};
use smallvec::SmallVec;

/// At most two calls for collateral and two for the loan.
pub type LoanCalls = SmallVec<[TxCall; 4]>;

/// Ordered calls for one loan adjustment.
///
/// 1. Collateral up: approve funding to the pool, deposit it.
/// 2. Loan up: borrow underlying. Loan down: approve the loan token, repay.
/// 3. Collateral down: approve the collateral token, withdraw funding.
pub fn plan_loan_calls(
    market: Address,
    tokens: &MarketTokens,
    trades: &LoanTrades,
    pool: &LendingPoolRef,
    gas: &GasSettings,
) -> LoanCalls {
    let mut calls = LoanCalls::new();

    let approve = |token: Address, amount| {
        TxCall::new(
            CallKind::ApproveSpending,
            market,
            moret::encode_approve_spending(token, pool.pool, amount),
        )
        .with_gas_limit(gas.approve_gas_limit)
    };
    let pool_call = |kind, calldata| {
        TxCall::new(kind, pool.pool, calldata).with_gas_limit(gas.default_gas_limit)
    };

    let collateral = abs_amount(trades.collateral_amount);
    let loan = abs_amount(trades.loan_amount);

    if trades.collateral_amount.is_positive() {
        calls.push(approve(tokens.funding, collateral));
        calls.push(pool_call(
            CallKind::Deposit,
            lending::encode_deposit(tokens.funding, collateral, market),
        ));
    }

    if trades.loan_amount.is_positive() {
        calls.push(pool_call(
            CallKind::Borrow,
            lending::encode_borrow(tokens.underlying, loan, pool.rate_mode, market),
        ));
    } else if trades.loan_amount.is_negative() {
        calls.push(approve(trades.loan_token, loan));
        calls.push(pool_call(
            CallKind::Repay,
            lending::encode_repay(tokens.underlying, loan, pool.rate_mode, market),
        ));
    }

    if trades.collateral_amount.is_negative() {
        calls.push(approve(trades.collateral_token, collateral));
        calls.push(pool_call(
            CallKind::Withdraw,
            lending::encode_withdraw(tokens.funding, collateral, market),
        ));
    }

    calls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::int;
    use alloy::primitives::U256;
    use alloy::sol_types::SolCall;
    use keeper_chain::contracts::{ILendingPool, IMarketMaker};

    const MARKET: Address = Address::new([0x10; 20]);
    const POOL: Address = Address::new([0x20; 20]);
    const UNDERLYING: Address = Address::new([0x30; 20]);
    const FUNDING: Address = Address::new([0x40; 20]);
    const DEBT_TOKEN: Address = Address::new([0x50; 20]);
    const ATOKEN: Address = Address::new([0x60; 20]);

    fn plan(loan: i64, collateral: i64) -> LoanCalls {
        let tokens = MarketTokens {
            underlying: UNDERLYING,
            funding: FUNDING,
        };
        let trades = LoanTrades {
            loan_amount: int(loan),
            collateral_amount: int(collateral),
            loan_token: DEBT_TOKEN,
            collateral_token: ATOKEN,
        };
        let pool = LendingPoolRef {
            pool: POOL,
            rate_mode: U256::from(2u64),
        };
        plan_loan_calls(MARKET, &tokens, &trades, &pool, &GasSettings::default())
    }

    fn kinds(calls: &LoanCalls) -> Vec<CallKind> {
        calls.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn test_nothing_to_do() {
        assert!(plan(0, 0).is_empty());
    }

    #[test]
    fn test_deposit_then_borrow() {
        let calls = plan(500, 1_000);
        assert_eq!(
            kinds(&calls),
            vec![CallKind::ApproveSpending, CallKind::Deposit, CallKind::Borrow]
        );

        // Approve goes to the market, for funding, spender = pool
        let approve = IMarketMaker::approveSpendingCall::abi_decode(&calls[0].calldata, true).unwrap();
        assert_eq!(calls[0].to, MARKET);
        assert_eq!(approve.token, FUNDING);
        assert_eq!(approve.spender, POOL);
        assert_eq!(approve.amount, U256::from(1_000u64));
        assert_eq!(calls[0].gas_limit, Some(70_000));

        let deposit = ILendingPool::depositCall::abi_decode(&calls[1].calldata, true).unwrap();
        assert_eq!(calls[1].to, POOL);
        assert_eq!(deposit.asset, FUNDING);
        assert_eq!(deposit.onBehalfOf, MARKET);
        assert_eq!(deposit.referralCode, 0);

        let borrow = ILendingPool::borrowCall::abi_decode(&calls[2].calldata, true).unwrap();
        assert_eq!(borrow.asset, UNDERLYING);
        assert_eq!(borrow.amount, U256::from(500u64));
        assert_eq!(borrow.interestRateMode, U256::from(2u64));
        assert_eq!(borrow.onBehalfOf, MARKET);
    }

    #[test]
    fn test_repay_then_withdraw_uses_absolute_amounts() {
        let calls = plan(-300, -700);
        assert_eq!(
            kinds(&calls),
            vec![
                CallKind::ApproveSpending,
                CallKind::Repay,
                CallKind::ApproveSpending,
                CallKind::Withdraw
            ]
        );

        let approve_debt = IMarketMaker::approveSpendingCall::abi_decode(&calls[0].calldata, true).unwrap();
        assert_eq!(approve_debt.token, DEBT_TOKEN);
        assert_eq!(approve_debt.amount, U256::from(300u64));

        let repay = ILendingPool::repayCall::abi_decode(&calls[1].calldata, true).unwrap();
        assert_eq!(repay.asset, UNDERLYING);
        assert_eq!(repay.amount, U256::from(300u64));
        assert_eq!(repay.rateMode, U256::from(2u64));

        let approve_collateral = IMarketMaker::approveSpendingCall::abi_decode(&calls[2].calldata, true).unwrap();
        assert_eq!(approve_collateral.token, ATOKEN);
        assert_eq!(approve_collateral.amount, U256::from(700u64));

        let withdraw = ILendingPool::withdrawCall::abi_decode(&calls[3].calldata, true).unwrap();
        assert_eq!(withdraw.asset, FUNDING);
        assert_eq!(withdraw.amount, U256::from(700u64));
        assert_eq!(withdraw.to, MARKET);
    }

    #[test]
    fn test_deposit_and_repay() {
        assert_eq!(
            kinds(&plan(-1, 1)),
            vec![
                CallKind::ApproveSpending,
                CallKind::Deposit,
                CallKind::ApproveSpending,
                CallKind::Repay
            ]
        );
    }

    #[test]
    fn test_borrow_then_withdraw() {
        assert_eq!(
            kinds(&plan(1, -1)),
            vec![CallKind::Borrow, CallKind::ApproveSpending, CallKind::Withdraw]
        );
    }

    #[test]
    fn test_single_sided() {
        assert_eq!(kinds(&plan(10, 0)), vec![CallKind::Borrow]);
        assert_eq!(
            kinds(&plan(0, -10)),
            vec![CallKind::ApproveSpending, CallKind::Withdraw]
        );
    }
}
