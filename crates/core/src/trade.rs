//! Option trading job.
//!
//! For every configured underlying the keeper reads the spot price from the
//! volatility chain, rounds it up to a call strike and down to a put strike
//! on the underlying's tick grid, then buys one call and one put on the first
//! pools the broker lists. Before trading, the exchange's allowance on the
//! funding token is topped up to the maximum when it does not cover one
//! option amount.

use crate::config::{GasSettings, TradeSettings, TradedUnderlying};
use crate::executor::{CallRunner, SubmittedCall};
use crate::u256_math::{wad_to_f64, WAD};
use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use keeper_chain::contracts::{common, moret};
use keeper_chain::{CallKind, OptionOrder, OptionType, ProtocolReader, TxCall};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Allowance granted to the exchange when the current one falls short.
pub const MAX_APPROVAL: U256 = U256::MAX;

/// Call and put strikes on either side of a spot price (WAD).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrikePair {
    /// Spot rounded up to the tick
    pub call: U256,
    /// Spot rounded down to the tick; zero when spot is below one tick
    pub put: U256,
}

impl StrikePair {
    /// Strikes around `spot` on a grid of `tick`, both in WAD.
    ///
    /// `None` for a zero tick or when rounding up overflows.
    pub fn around(spot: U256, tick: U256) -> Option<Self> {
        if tick.is_zero() {
            return None;
        }
        let put = spot / tick * tick;
        let call = if put == spot {
            put
        } else {
            put.checked_add(tick)?
        };
        Some(Self { call, put })
    }

    /// Strikes for an underlying whose tick is in whole price units.
    pub fn for_underlying(spot: U256, min_tick: u64) -> Option<Self> {
        Self::around(spot, U256::from(min_tick).checked_mul(WAD)?)
    }
}

/// One option bought (or logged in dry-run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionTrade {
    pub order: OptionOrder,
    /// Quoted premium (WAD)
    pub premium: U256,
    pub call: SubmittedCall,
}

/// Result for one underlying.
#[derive(Debug)]
pub struct UnderlyingTrades {
    pub symbol: String,
    pub spot: Option<U256>,
    pub strikes: Option<StrikePair>,
    pub trades: Vec<OptionTrade>,
    pub error: Option<anyhow::Error>,
}

impl UnderlyingTrades {
    fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            spot: None,
            strikes: None,
            trades: Vec::new(),
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Result of one trading round.
#[derive(Debug, Default)]
pub struct TradeReport {
    /// Funding token approval, when the allowance was short
    pub approval: Option<SubmittedCall>,
    pub underlyings: Vec<UnderlyingTrades>,
    /// Set when the round stopped before any underlying was traded
    pub error: Option<anyhow::Error>,
}

impl TradeReport {
    pub fn traded(&self) -> usize {
        self.underlyings.iter().map(|u| u.trades.len()).sum()
    }

    pub fn failed(&self) -> usize {
        self.underlyings.iter().filter(|u| u.is_failed()).count()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.failed() == 0
    }

    /// Every call, approval first.
    pub fn calls(&self) -> impl Iterator<Item = &SubmittedCall> {
        self.approval
            .iter()
            .chain(self.underlyings.iter().flat_map(|u| u.trades.iter().map(|t| &t.call)))
    }
}

/// Buys calls and puts around spot for each configured underlying.
pub struct OptionTrader {
    reader: Arc<dyn ProtocolReader>,
    runner: CallRunner,
    gas: GasSettings,
    registry: Address,
    exchange: Address,
    underlyings: Vec<TradedUnderlying>,
    tenor: u64,
    amount: U256,
    pools_per_underlying: usize,
}

impl OptionTrader {
    /// Trader for `settings`; the registry and exchange must be set.
    pub fn new(
        reader: Arc<dyn ProtocolReader>,
        runner: CallRunner,
        gas: GasSettings,
        settings: &TradeSettings,
    ) -> Result<Self> {
        let registry = settings
            .registry
            .context("trade.registry must be set to trade options")?;
        let exchange = settings
            .exchange
            .context("trade.exchange must be set to trade options")?;

        Ok(Self {
            reader,
            runner,
            gas,
            registry,
            exchange,
            underlyings: settings.underlyings.clone(),
            tenor: settings.tenor_secs,
            amount: settings.option_amount_wad()?,
            pools_per_underlying: settings.pools_per_underlying.max(1),
        })
    }

    /// Approve if needed, then trade every underlying in turn.
    pub async fn run_once(&self) -> TradeReport {
        let start = Instant::now();
        let mut report = TradeReport::default();

        if let Err(e) = self.runner.begin_sequence().await {
            error!(error = %e, "Nonce sync failed, skipping option trading");
            report.error = Some(e);
            return report;
        }

        match self.ensure_allowance().await {
            Ok(approval) => report.approval = approval,
            Err(e) => {
                error!(exchange = %self.exchange, error = %e, "Funding approval failed");
                report.error = Some(e);
                return report;
            }
        }

        for underlying in &self.underlyings {
            let mut entry = UnderlyingTrades::new(&underlying.symbol);
            if let Err(e) = self.trade_underlying(underlying, &mut entry).await {
                error!(underlying = %underlying.symbol, error = %e, "Option trading failed");
                entry.error = Some(e);
                // A failed send may have left the local nonce ahead
                if let Err(e) = self.runner.begin_sequence().await {
                    warn!(error = %e, "Nonce re-sync failed");
                }
            }
            report.underlyings.push(entry);
        }

        info!(
            underlyings = self.underlyings.len(),
            traded = report.traded(),
            failed = report.failed(),
            elapsed_ms = start.elapsed().as_millis(),
            "Option trading round complete"
        );
        report
    }

    /// Approve the exchange for the funding token when the allowance is short.
    async fn ensure_allowance(&self) -> Result<Option<SubmittedCall>> {
        let funding = self.reader.broker_funding(self.registry).await?;
        let allowance = self
            .reader
            .allowance(funding, self.runner.keeper(), self.exchange)
            .await?;

        if allowance >= self.amount {
            debug!(funding = %funding, allowance = %allowance, "Funding allowance sufficient");
            return Ok(None);
        }

        info!(
            funding = %funding,
            exchange = %self.exchange,
            allowance = %allowance,
            required = %self.amount,
            "Approving exchange for funding token"
        );
        let call = TxCall::new(
            CallKind::Approve,
            funding,
            common::encode_approve(self.exchange, MAX_APPROVAL),
        )
        .with_gas_limit(self.gas.approve_gas_limit);
        Ok(Some(self.runner.run(call).await?))
    }

    async fn trade_underlying(
        &self,
        underlying: &TradedUnderlying,
        entry: &mut UnderlyingTrades,
    ) -> Result<()> {
        let market = self
            .reader
            .option_market(self.registry, underlying.token)
            .await?;
        let spot = self.reader.spot_price(market.volatility_chain).await?;
        entry.spot = Some(spot);

        let strikes = StrikePair::for_underlying(spot, underlying.min_tick).ok_or_else(|| {
            anyhow::anyhow!("No strikes for spot {} on tick {}", spot, underlying.min_tick)
        })?;
        entry.strikes = Some(strikes);

        info!(
            underlying = %underlying.symbol,
            spot = wad_to_f64(spot),
            call_strike = wad_to_f64(strikes.call),
            put_strike = wad_to_f64(strikes.put),
            pools = market.pools.len(),
            "Trading options"
        );
        if market.pools.is_empty() {
            warn!(underlying = %underlying.symbol, "Broker lists no pools");
            return Ok(());
        }

        for &pool in market.pools.iter().take(self.pools_per_underlying) {
            for (option_type, strike) in [(OptionType::Call, strikes.call), (OptionType::Put, strikes.put)] {
                if strike.is_zero() {
                    warn!(underlying = %underlying.symbol, %option_type, "Spot below one tick, skipping");
                    continue;
                }
                let order = OptionOrder {
                    pool,
                    tenor: self.tenor,
                    strike,
                    amount: self.amount,
                    option_type,
                    payment_method: 0,
                };
                entry.trades.push(self.buy(order).await?);
            }
        }
        Ok(())
    }

    /// Quote the order, then send `tradeOption`.
    async fn buy(&self, order: OptionOrder) -> Result<OptionTrade> {
        let quote = self.reader.quote_option(self.exchange, &order).await?;
        info!(
            pool = %order.pool,
            option = %order.option_type,
            strike = wad_to_f64(order.strike),
            premium = wad_to_f64(quote.premium),
            collateral = wad_to_f64(quote.collateral),
            volatility = wad_to_f64(quote.volatility),
            "Option quoted"
        );

        let call = TxCall::new(
            CallKind::TradeOption,
            self.exchange,
            moret::encode_trade_option(&order),
        );
        let call = self.runner.run(call).await?;
        Ok(OptionTrade {
            order,
            premium: quote.premium,
            call,
        })
    }
}

impl std::fmt::Debug for OptionTrader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionTrader")
            .field("keeper", &self.runner.keeper())
            .field("dry_run", &self.runner.is_dry_run())
            .field("exchange", &self.exchange)
            .field("underlyings", &self.underlyings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::{RecordingSubmitter, StaticReader};
    use alloy::sol_types::SolCall;
    use keeper_chain::contracts::{IExchange, IERC20};
    use keeper_chain::OptionMarket;

    const REGISTRY: Address = Address::new([0x01; 20]);
    const EXCHANGE: Address = Address::new([0x65; 20]);
    const FUNDING: Address = Address::new([0x40; 20]);
    const ETH: Address = Address::new([0xE0; 20]);
    const BTC: Address = Address::new([0xB0; 20]);
    const KEEPER: Address = Address::new([0xEE; 20]);

    fn wad(units: u64) -> U256 {
        U256::from(units) * WAD
    }

    fn chain_of(token: Address) -> Address {
        Address::repeat_byte(token.0[0] + 1)
    }

    fn pool(n: u8) -> Address {
        Address::repeat_byte(0x90 + n)
    }

    fn settings() -> TradeSettings {
        TradeSettings {
            registry: Some(REGISTRY),
            exchange: Some(EXCHANGE),
            underlyings: vec![
                TradedUnderlying {
                    symbol: "ETH".to_string(),
                    token: ETH,
                    min_tick: 50,
                },
                TradedUnderlying {
                    symbol: "BTC".to_string(),
                    token: BTC,
                    min_tick: 100,
                },
            ],
            ..TradeSettings::default()
        }
    }

    /// ETH at 1234.5 with three pools, BTC at 30050 with one.
    fn reader(allowance: U256) -> StaticReader {
        let mut reader = StaticReader {
            broker_funding: FUNDING,
            ..Default::default()
        };
        reader.option_markets.insert(
            ETH,
            OptionMarket {
                volatility_chain: chain_of(ETH),
                pools: vec![pool(1), pool(2), pool(3)],
            },
        );
        reader.option_markets.insert(
            BTC,
            OptionMarket {
                volatility_chain: chain_of(BTC),
                pools: vec![pool(4)],
            },
        );
        reader.spots.insert(chain_of(ETH), wad(1234) + WAD / U256::from(2u64));
        reader.spots.insert(chain_of(BTC), wad(30_050));
        reader.allowances.insert((FUNDING, KEEPER, EXCHANGE), allowance);
        reader
    }

    fn trader(
        reader: StaticReader,
        submitter: Arc<RecordingSubmitter>,
        settings: &TradeSettings,
        dry_run: bool,
    ) -> OptionTrader {
        OptionTrader::new(
            Arc::new(reader),
            CallRunner::new(submitter, dry_run),
            GasSettings::default(),
            settings,
        )
        .unwrap()
    }

    fn decode_trade(call: &TxCall) -> IExchange::tradeOptionCall {
        IExchange::tradeOptionCall::abi_decode(&call.calldata, true).unwrap()
    }

    #[test]
    fn test_strikes_round_to_tick() {
        // ETH ticks of 50
        let eth = StrikePair::for_underlying(wad(1234) + WAD / U256::from(2u64), 50).unwrap();
        assert_eq!(eth.call, wad(1250));
        assert_eq!(eth.put, wad(1200));

        // BTC ticks of 100
        let btc = StrikePair::for_underlying(wad(30_050), 100).unwrap();
        assert_eq!(btc.call, wad(30_100));
        assert_eq!(btc.put, wad(30_000));

        // Spot on the grid: both strikes at spot
        let on_grid = StrikePair::for_underlying(wad(1250), 50).unwrap();
        assert_eq!(on_grid.call, wad(1250));
        assert_eq!(on_grid.put, wad(1250));

        // Below one tick the put strike is zero
        let low = StrikePair::for_underlying(wad(30), 50).unwrap();
        assert_eq!(low.call, wad(50));
        assert!(low.put.is_zero());

        assert!(StrikePair::around(wad(1), U256::ZERO).is_none());
        assert!(StrikePair::around(U256::MAX, U256::from(2u64)).is_none());
    }

    #[tokio::test]
    async fn test_approves_when_allowance_short() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let trader = trader(reader(U256::ZERO), submitter.clone(), &settings(), false);

        let report = trader.run_once().await;
        assert!(report.is_success());
        assert!(report.approval.is_some());

        let calls = submitter.calls.lock();
        assert_eq!(calls[0].kind, CallKind::Approve);
        assert_eq!(calls[0].to, FUNDING);
        assert_eq!(calls[0].gas_limit, Some(GasSettings::default().approve_gas_limit));
        let approve = IERC20::approveCall::abi_decode(&calls[0].calldata, true).unwrap();
        assert_eq!(approve.spender, EXCHANGE);
        assert_eq!(approve.amount, MAX_APPROVAL);
        assert!(calls[1..].iter().all(|c| c.kind == CallKind::TradeOption));
    }

    #[tokio::test]
    async fn test_skips_approval_when_allowance_covers() {
        let submitter = Arc::new(RecordingSubmitter::default());
        // Exactly one option amount is enough
        let allowance = settings().option_amount_wad().unwrap();
        let trader = trader(reader(allowance), submitter.clone(), &settings(), false);

        let report = trader.run_once().await;
        assert!(report.approval.is_none());
        assert!(!submitter.kinds().contains(&CallKind::Approve));
        assert_eq!(report.traded(), 4);
    }

    #[tokio::test]
    async fn test_trades_call_and_put_on_first_pools() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let mut settings = settings();
        settings.pools_per_underlying = 2;
        let trader = trader(reader(MAX_APPROVAL), submitter.clone(), &settings, false);

        let report = trader.run_once().await;
        assert!(report.is_success());
        // ETH: 2 pools x (call, put); BTC: 1 pool x (call, put)
        assert_eq!(report.traded(), 6);
        assert_eq!(*submitter.syncs.lock(), 1);

        let calls = submitter.calls.lock();
        assert!(calls.iter().all(|c| c.to == EXCHANGE));
        let trades: Vec<_> = calls.iter().map(decode_trade).collect();
        assert_eq!(
            trades.iter().map(|t| t.pool).collect::<Vec<_>>(),
            vec![pool(1), pool(1), pool(2), pool(2), pool(4), pool(4)]
        );
        assert_eq!((trades[0].strike, trades[0].poType), (wad(1250), 0));
        assert_eq!((trades[1].strike, trades[1].poType), (wad(1200), 1));
        assert_eq!((trades[4].strike, trades[4].poType), (wad(30_100), 0));
        assert_eq!((trades[5].strike, trades[5].poType), (wad(30_000), 1));
        assert!(trades.iter().all(|t| t.tenor == U256::from(86_400u64)));
        assert!(trades
            .iter()
            .all(|t| t.amount == U256::from(10_000_000_000_000_000u64)));

        // Premium comes from the exchange quote
        let eth = &report.underlyings[0];
        assert_eq!(eth.spot, Some(wad(1234) + WAD / U256::from(2u64)));
        assert_eq!(eth.trades[0].premium, wad(1250) / U256::from(100u64));
    }

    #[tokio::test]
    async fn test_failed_underlying_does_not_stop_others() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let mut reader = reader(MAX_APPROVAL);
        reader.spots.remove(&chain_of(ETH));
        let trader = trader(reader, submitter.clone(), &settings(), false);

        let report = trader.run_once().await;
        assert_eq!(report.failed(), 1);
        assert!(report.underlyings[0].is_failed());
        assert!(report.underlyings[0].spot.is_none());
        assert_eq!(report.underlyings[1].trades.len(), 2);
        // Nonce re-read after the failure
        assert_eq!(*submitter.syncs.lock(), 2);
    }

    #[tokio::test]
    async fn test_failed_approval_stops_round() {
        let submitter = Arc::new(RecordingSubmitter::failing_on(CallKind::Approve));
        let trader = trader(reader(U256::ZERO), submitter.clone(), &settings(), false);

        let report = trader.run_once().await;
        assert!(report.error.is_some());
        assert!(report.underlyings.is_empty());
        assert!(submitter.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let trader = trader(reader(U256::ZERO), submitter.clone(), &settings(), true);

        let report = trader.run_once().await;
        assert!(report.is_success());
        assert_eq!(report.calls().count(), 5);
        assert!(report.calls().all(|c| c.is_dry_run()));
        assert!(submitter.calls.lock().is_empty());
    }

    #[test]
    fn test_requires_registry_and_exchange() {
        let mut settings = settings();
        settings.exchange = None;
        let result = OptionTrader::new(
            Arc::new(StaticReader::default()),
            CallRunner::new(Arc::new(RecordingSubmitter::default()), true),
            GasSettings::default(),
            &settings,
        );
        assert!(result.is_err());
    }
}
