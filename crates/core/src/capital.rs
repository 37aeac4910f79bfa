//! Capital report for market makers.

use crate::u256_math::wad_to_f64;
use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use keeper_chain::ProtocolReader;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Token balance held by the market maker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HedgeBalance {
    pub token: Address,
    pub symbol: String,
    pub balance: U256,
}

/// Capital figures of one market maker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapitalReport {
    pub market: Address,
    /// `calcCapital(false, false)`
    pub gross_capital: U256,
    /// `calcCapital(true, true)`
    pub net_equity: U256,
    pub underlying: HedgeBalance,
    pub funding: HedgeBalance,
}

impl CapitalReport {
    /// Gross capital as a float, in WAD units.
    pub fn gross_capital_f64(&self) -> f64 {
        wad_to_f64(self.gross_capital)
    }

    pub fn net_equity_f64(&self) -> f64 {
        wad_to_f64(self.net_equity)
    }
}

#[derive(Debug)]
pub struct CapitalReporter {
    reader: Arc<dyn ProtocolReader>,
}

impl CapitalReporter {
    pub fn new(reader: Arc<dyn ProtocolReader>) -> Self {
        Self { reader }
    }

    async fn balance(&self, token: Address, market: Address) -> Result<HedgeBalance> {
        let (balance, symbol) = tokio::try_join!(
            self.reader.token_balance(token, market),
            self.reader.token_symbol(token),
        )?;
        Ok(HedgeBalance {
            token,
            symbol,
            balance,
        })
    }

    pub async fn report(&self, market: Address) -> Result<CapitalReport> {
        let tokens = self
            .reader
            .market_tokens(market)
            .await
            .context("Failed to read market tokens")?;

        let (gross_capital, net_equity, underlying, funding) = tokio::try_join!(
            self.reader.capital(market, false, false),
            self.reader.capital(market, true, true),
            self.balance(tokens.underlying, market),
            self.balance(tokens.funding, market),
        )
        .context("Failed to read capital")?;

        let report = CapitalReport {
            market,
            gross_capital,
            net_equity,
            underlying,
            funding,
        };
        info!(
            market = %market,
            gross_capital = %report.gross_capital,
            net_equity = %report.net_equity,
            underlying = %report.underlying.balance,
            underlying_symbol = %report.underlying.symbol,
            funding = %report.funding.balance,
            funding_symbol = %report.funding.symbol,
            "Capital"
        );
        Ok(report)
    }

    /// Reports for every market; failures are logged and skipped.
    pub async fn report_all(&self, markets: &[Address]) -> Vec<CapitalReport> {
        let mut reports = Vec::with_capacity(markets.len());
        for &market in markets {
            match self.report(market).await {
                Ok(report) => reports.push(report),
                Err(e) => error!(market = %market, error = %e, "Capital report failed"),
            }
        }
        reports
    }
}
