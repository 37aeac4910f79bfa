//! Hedge rebalancing for market makers.
//!
//! For each market the keeper runs two phases, in order:
//!
//! 1. **Loans**: move the lending pool position to the loan and collateral
//!    deltas the market maker computes.
//! 2. **Swap**: trade the remaining token imbalance through the aggregator,
//!    executed by the market maker itself.
//!
//! Every transaction is mined before the next one is built. A failure stops
//! the rest of that market's sequence; other markets still run.

mod loan;
mod swap;

pub use loan::{plan_loan_calls, LoanCalls};
pub use swap::{SwapDecision, SwapDirection, SwapPlan};

use crate::config::GasSettings;
use crate::executor::{CallRunner, SubmittedCall};
use crate::u256_math::{min_output_after_slippage, pct_f64, slippage_percent, units_to_f64};
use alloy::primitives::{Address, I256, U256};
use keeper_api::{AggregatorError, QuoteRequest, SwapAggregator, SwapRequest};
use keeper_chain::{MarketTokens, ProtocolReader};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Stage of a market's rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HedgePhase {
    NonceSync,
    Tokens,
    Loans,
    Swap,
}

impl fmt::Display for HedgePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HedgePhase::NonceSync => "nonce sync",
            HedgePhase::Tokens => "token lookup",
            HedgePhase::Loans => "loan",
            HedgePhase::Swap => "swap",
        })
    }
}

#[derive(Debug, Error)]
pub enum HedgeError {
    #[error("{phase} phase failed for market {market}: {error:#}")]
    Phase {
        market: Address,
        phase: HedgePhase,
        error: anyhow::Error,
    },

    #[error("aggregator router {router} is not the approved spender {spender}")]
    RouterMismatch { router: Address, spender: Address },
}

impl HedgeError {
    fn phase(market: Address, phase: HedgePhase) -> impl FnOnce(anyhow::Error) -> Self {
        move |error| HedgeError::Phase {
            market,
            phase,
            error,
        }
    }

    /// Phase the error happened in.
    pub fn failed_phase(&self) -> HedgePhase {
        match self {
            HedgeError::Phase { phase, .. } => *phase,
            HedgeError::RouterMismatch { .. } => HedgePhase::Swap,
        }
    }

    /// True when the aggregator was unavailable and the next run may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            HedgeError::Phase { error, .. } => error.chain().any(|cause| {
                cause
                    .downcast_ref::<AggregatorError>()
                    .is_some_and(AggregatorError::is_transient)
            }),
            HedgeError::RouterMismatch { .. } => false,
        }
    }
}

/// How the swap phase ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// Not reached (earlier failure) or disabled
    NotRun,
    NothingToSwap,
    /// Amounts did not describe a trade; skipped
    Inconsistent { underlying: I256, funding: I256 },
    Executed {
        plan: SwapPlan,
        quoted_output: U256,
        spender: Address,
    },
}

/// Result of one market's rebalance.
#[derive(Debug)]
pub struct HedgeReport {
    pub market: Address,
    pub tokens: Option<MarketTokens>,
    /// Lending calls in the order they were issued
    pub loan_calls: Vec<SubmittedCall>,
    /// Swap calls (approve, trade) in the order they were issued
    pub swap_calls: Vec<SubmittedCall>,
    pub swap: SwapOutcome,
    pub error: Option<HedgeError>,
}

impl HedgeReport {
    fn new(market: Address) -> Self {
        Self {
            market,
            tokens: None,
            loan_calls: Vec::new(),
            swap_calls: Vec::new(),
            swap: SwapOutcome::NotRun,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Every call, loans first.
    pub fn calls(&self) -> impl Iterator<Item = &SubmittedCall> {
        self.loan_calls.iter().chain(self.swap_calls.iter())
    }
}

/// Rebalances market maker hedges.
#[derive(Debug)]
pub struct HedgeRebalancer {
    reader: Arc<dyn ProtocolReader>,
    aggregator: Arc<dyn SwapAggregator>,
    runner: CallRunner,
    gas: GasSettings,
    skip_swap: bool,
}

impl HedgeRebalancer {
    pub fn new(
        reader: Arc<dyn ProtocolReader>,
        aggregator: Arc<dyn SwapAggregator>,
        runner: CallRunner,
        gas: GasSettings,
    ) -> Self {
        Self {
            reader,
            aggregator,
            runner,
            gas,
            skip_swap: false,
        }
    }

    /// Run the loan phase only.
    pub fn with_skip_swap(mut self, skip_swap: bool) -> Self {
        self.skip_swap = skip_swap;
        self
    }

    /// Rebalance each market in turn.
    pub async fn rebalance_all(&self, markets: &[Address]) -> Vec<HedgeReport> {
        let start = Instant::now();
        let mut reports = Vec::with_capacity(markets.len());

        for &market in markets {
            let report = self.rebalance_market(market).await;
            match &report.error {
                Some(e) if e.is_transient() => {
                    warn!(market = %market, phase = %e.failed_phase(), error = %e, "Aggregator unavailable, retrying next run");
                }
                Some(e) => {
                    error!(market = %market, phase = %e.failed_phase(), error = %e, "Hedge rebalance failed");
                }
                None => {}
            }
            reports.push(report);
        }

        info!(
            markets = markets.len(),
            failed = reports.iter().filter(|r| !r.is_success()).count(),
            calls = reports.iter().map(|r| r.calls().count()).sum::<usize>(),
            elapsed_ms = start.elapsed().as_millis(),
            "Hedge run complete"
        );
        reports
    }

    /// Rebalance one market: nonce sync, loans, then swap.
    pub async fn rebalance_market(&self, market: Address) -> HedgeReport {
        let mut report = HedgeReport::new(market);
        if let Err(e) = self.run_phases(market, &mut report).await {
            report.error = Some(e);
        }
        report
    }

    async fn run_phases(&self, market: Address, report: &mut HedgeReport) -> Result<(), HedgeError> {
        let nonce = self
            .runner
            .begin_sequence()
            .await
            .map_err(HedgeError::phase(market, HedgePhase::NonceSync))?;
        debug!(market = %market, nonce = nonce, "Starting hedge rebalance");

        let tokens = self
            .reader
            .market_tokens(market)
            .await
            .map_err(HedgeError::phase(market, HedgePhase::Tokens))?;
        report.tokens = Some(tokens);

        self.adjust_loans(market, &tokens, &mut report.loan_calls)
            .await
            .map_err(HedgeError::phase(market, HedgePhase::Loans))?;

        if self.skip_swap {
            info!(market = %market, "Swap phase disabled");
            return Ok(());
        }

        report.swap = self
            .execute_swap(market, &tokens, &mut report.swap_calls)
            .await
            .map_err(|e| match e.downcast::<HedgeError>() {
                Ok(hedge_error) => hedge_error,
                Err(e) => HedgeError::Phase {
                    market,
                    phase: HedgePhase::Swap,
                    error: e,
                },
            })?;
        Ok(())
    }

    /// Loan phase: read deltas, resolve the pool, issue the calls in order.
    async fn adjust_loans(
        &self,
        market: Address,
        tokens: &MarketTokens,
        issued: &mut Vec<SubmittedCall>,
    ) -> anyhow::Result<()> {
        let trades = self.reader.loan_trades(market).await?;
        if trades.is_empty() {
            debug!(market = %market, "No loan adjustment needed");
            return Ok(());
        }

        let pool = self.reader.lending_pool(market).await?;
        let calls = plan_loan_calls(market, tokens, &trades, &pool, &self.gas);
        info!(
            market = %market,
            pool = %pool.pool,
            loan = %trades.loan_amount,
            collateral = %trades.collateral_amount,
            calls = calls.len(),
            "Adjusting lending position"
        );

        for call in calls {
            issued.push(self.runner.run(call).await?);
        }
        Ok(())
    }

    /// Swap phase: classify, quote, approve, fetch calldata, trade.
    async fn execute_swap(
        &self,
        market: Address,
        tokens: &MarketTokens,
        issued: &mut Vec<SubmittedCall>,
    ) -> anyhow::Result<SwapOutcome> {
        let trades = self.reader.swap_trades(market).await?;
        let plan = match SwapDecision::classify(&trades, tokens) {
            SwapDecision::Nothing => {
                debug!(market = %market, "No swap needed");
                return Ok(SwapOutcome::NothingToSwap);
            }
            SwapDecision::Inconsistent { underlying, funding } => {
                error!(
                    market = %market,
                    underlying = %underlying,
                    funding = %funding,
                    "Swap amounts are inconsistent, skipping swap"
                );
                return Ok(SwapOutcome::Inconsistent { underlying, funding });
            }
            SwapDecision::Trade(plan) => plan,
        };

        let spender = self.aggregator.spender().await?;
        let slippage_wad = self.reader.swap_slippage(market).await?;
        let slippage = slippage_percent(slippage_wad);
        info!(
            market = %market,
            direction = %plan.direction,
            sell_token = %plan.sell_token,
            sell_amount = %plan.sell_amount,
            target = %plan.target_amount,
            slippage_pct = slippage,
            "Swap started"
        );

        let quote = self
            .aggregator
            .quote(QuoteRequest::new(plan.sell_token, plan.buy_token, plan.sell_amount))
            .await?;
        info!(
            market = %market,
            required = %plan.target_amount,
            quoted = %quote.to_token_amount,
            quoted_pct_of_target = pct_f64(quote.to_token_amount, plan.target_amount),
            "Required output vs quote"
        );
        let floor = min_output_after_slippage(plan.target_amount, slippage_wad);
        if quote.to_token_amount < floor {
            warn!(
                market = %market,
                quoted = %quote.to_token_amount,
                floor = %floor,
                "Quote is below the target after slippage"
            );
        }

        issued.push(
            self.runner
                .run(swap::approve_call(market, &plan, spender, &self.gas))
                .await?,
        );

        let response = self
            .aggregator
            .swap(
                SwapRequest::new(plan.sell_token, plan.buy_token, plan.sell_amount, market)
                    .with_slippage_percent(slippage)
                    .with_disable_estimate(true),
            )
            .await?;
        if response.tx.to != spender {
            return Err(HedgeError::RouterMismatch {
                router: response.tx.to,
                spender,
            }
            .into());
        }

        let inner_gas = swap::inner_swap_gas(&response.tx, &quote, &self.gas);
        issued.push(
            self.runner
                .run(swap::trade_call(market, &plan, spender, &response.tx, inner_gas, &self.gas))
                .await?,
        );

        info!(
            market = %market,
            sold = units_to_f64(response.from_token_amount, response.from_token.decimals),
            sold_symbol = %response.from_token.symbol,
            bought = units_to_f64(response.to_token_amount, response.to_token.decimals),
            bought_symbol = %response.to_token.symbol,
            "Swap submitted"
        );

        Ok(SwapOutcome::Executed {
            plan,
            quoted_output: quote.to_token_amount,
            spender,
        })
    }
}
