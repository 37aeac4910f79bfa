//! Option expiry keeper.
//!
//! Checks every configured exchange for expiring options and calls
//! `expireOptions` on the market maker of each exchange that has some. Checks fan out with
//! bounded concurrency; transactions go out one at a time.

use crate::config::GasSettings;
use crate::executor::{CallRunner, SubmittedCall};
use alloy::primitives::Address;
use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use keeper_chain::contracts::moret;
use keeper_chain::{CallKind, ExchangeContracts, ProtocolReader, TxCall};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Expiry state of one exchange.
#[derive(Debug)]
pub enum ExchangeStatus {
    /// No option expiring
    Idle,
    Expired(SubmittedCall),
    /// Check or expiry failed
    Failed(anyhow::Error),
}

#[derive(Debug)]
pub struct ExchangeExpiry {
    pub exchange: Address,
    pub contracts: Option<ExchangeContracts>,
    pub status: ExchangeStatus,
}

impl ExchangeExpiry {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, ExchangeStatus::Failed(_))
    }
}

/// Result of one expiry round.
#[derive(Debug, Default)]
pub struct ExpiryReport {
    pub exchanges: Vec<ExchangeExpiry>,
}

impl ExpiryReport {
    pub fn expired(&self) -> usize {
        self.exchanges
            .iter()
            .filter(|e| matches!(e.status, ExchangeStatus::Expired(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.exchanges.iter().filter(|e| e.is_failed()).count()
    }
}

pub struct ExpiryKeeper {
    reader: Arc<dyn ProtocolReader>,
    runner: CallRunner,
    gas: GasSettings,
    max_concurrent_reads: usize,
}

impl ExpiryKeeper {
    pub fn new(reader: Arc<dyn ProtocolReader>, runner: CallRunner, gas: GasSettings) -> Self {
        Self {
            reader,
            runner,
            gas,
            max_concurrent_reads: 4,
        }
    }

    pub fn with_max_concurrent_reads(mut self, max: usize) -> Self {
        self.max_concurrent_reads = max.max(1);
        self
    }

    /// Resolve contracts and read the expiring flag.
    async fn check(&self, exchange: Address) -> Result<(ExchangeContracts, bool)> {
        let contracts = self.reader.exchange_contracts(exchange).await?;
        let expiring = self.reader.any_option_expiring(contracts.vault).await?;
        debug!(
            exchange = %exchange,
            vault = %contracts.vault,
            expiring = expiring,
            "Checked vault"
        );
        Ok((contracts, expiring))
    }

    /// `expireOptions(keeper)` on the exchange's market maker.
    fn expire_call(&self, market: Address) -> TxCall {
        TxCall::new(
            CallKind::ExpireOptions,
            market,
            moret::encode_expire_options(self.runner.keeper()),
        )
        .with_gas_limit(self.gas.expire_gas_limit)
    }

    /// One pass over the exchanges.
    pub async fn run_once(&self, exchanges: &[Address]) -> ExpiryReport {
        let start = Instant::now();

        // Reads run concurrently, results stay in exchange order
        let checks: Vec<(Address, Result<(ExchangeContracts, bool)>)> = stream::iter(exchanges.iter().copied())
            .map(|exchange| async move { (exchange, self.check(exchange).await) })
            .buffered(self.max_concurrent_reads)
            .collect()
            .await;

        let mut report = ExpiryReport::default();
        let mut synced = false;

        for (exchange, check) in checks {
            let entry = match check {
                Err(e) => {
                    error!(exchange = %exchange, error = %e, "Expiry check failed");
                    ExchangeExpiry {
                        exchange,
                        contracts: None,
                        status: ExchangeStatus::Failed(e),
                    }
                }
                Ok((contracts, false)) => ExchangeExpiry {
                    exchange,
                    contracts: Some(contracts),
                    status: ExchangeStatus::Idle,
                },
                Ok((contracts, true)) => {
                    info!(
                        exchange = %exchange,
                        market = %contracts.market,
                        at = %Utc::now().format("%Y-%m-%d %H:%M:%S"),
                        "Options expiring"
                    );
                    let status = match self.expire(contracts.market, &mut synced).await {
                        Ok(call) => {
                            info!(exchange = %exchange, tx = ?call.tx_hash, "Options expired");
                            ExchangeStatus::Expired(call)
                        }
                        Err(e) => {
                            error!(exchange = %exchange, error = %e, "Expiry failed");
                            // Force a fresh nonce for the next exchange
                            synced = false;
                            ExchangeStatus::Failed(e)
                        }
                    };
                    ExchangeExpiry {
                        exchange,
                        contracts: Some(contracts),
                        status,
                    }
                }
            };
            report.exchanges.push(entry);
        }

        info!(
            exchanges = exchanges.len(),
            expired = report.expired(),
            failed = report.failed(),
            elapsed_ms = start.elapsed().as_millis(),
            "Expiry round complete"
        );
        report
    }

    async fn expire(&self, market: Address, synced: &mut bool) -> Result<SubmittedCall> {
        if !*synced {
            self.runner.begin_sequence().await?;
            *synced = true;
        }
        self.runner.run(self.expire_call(market)).await
    }
}

impl std::fmt::Debug for ExpiryKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryKeeper")
            .field("keeper", &self.runner.keeper())
            .field("dry_run", &self.runner.is_dry_run())
            .field("max_concurrent_reads", &self.max_concurrent_reads)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::{RecordingSubmitter, StaticReader};
    use alloy::sol_types::SolCall;
    use keeper_chain::contracts::IMarketMaker;

    const EXCHANGE_A: Address = Address::new([0xA0; 20]);
    const EXCHANGE_B: Address = Address::new([0xB0; 20]);
    const EXCHANGE_C: Address = Address::new([0xC0; 20]);

    fn vault_of(exchange: Address) -> Address {
        Address::repeat_byte(exchange.0[0] + 1)
    }

    fn market_of(exchange: Address) -> Address {
        Address::repeat_byte(exchange.0[0] + 2)
    }

    fn reader(expiring: &[Address]) -> StaticReader {
        let mut reader = StaticReader::default();
        for exchange in [EXCHANGE_A, EXCHANGE_B, EXCHANGE_C] {
            reader.exchanges.insert(
                exchange,
                ExchangeContracts {
                    market: market_of(exchange),
                    vault: vault_of(exchange),
                },
            );
        }
        reader.expiring = expiring.iter().map(|e| vault_of(*e)).collect();
        reader
    }

    fn keeper(reader: StaticReader, submitter: Arc<RecordingSubmitter>, dry_run: bool) -> ExpiryKeeper {
        ExpiryKeeper::new(
            Arc::new(reader),
            CallRunner::new(submitter, dry_run),
            GasSettings::default(),
        )
        .with_max_concurrent_reads(2)
    }

    #[tokio::test]
    async fn test_expires_only_flagged_exchanges() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let keeper = keeper(reader(&[EXCHANGE_B, EXCHANGE_C]), submitter.clone(), false);

        let report = keeper.run_once(&[EXCHANGE_A, EXCHANGE_B, EXCHANGE_C]).await;

        assert_eq!(report.expired(), 2);
        assert_eq!(report.failed(), 0);
        assert!(matches!(report.exchanges[0].status, ExchangeStatus::Idle));
        assert_eq!(*submitter.syncs.lock(), 1);

        let calls = submitter.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].to, market_of(EXCHANGE_B));
        assert_eq!(calls[1].to, market_of(EXCHANGE_C));
        assert_eq!(calls[0].gas_limit, Some(5_000_000));

        let decoded = IMarketMaker::expireOptionsCall::abi_decode(&calls[0].calldata, true).unwrap();
        assert_eq!(decoded.payer, Address::repeat_byte(0xEE));
    }

    #[tokio::test]
    async fn test_failed_check_does_not_stop_others() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let unknown = Address::repeat_byte(0x01);
        let keeper = keeper(reader(&[EXCHANGE_A]), submitter.clone(), false);

        let report = keeper.run_once(&[unknown, EXCHANGE_A]).await;

        assert_eq!(report.failed(), 1);
        assert!(report.exchanges[0].is_failed());
        assert!(report.exchanges[0].contracts.is_none());
        assert_eq!(report.expired(), 1);
        assert_eq!(submitter.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_expiry_does_not_stop_others() {
        let submitter = Arc::new(RecordingSubmitter::failing_on(CallKind::ExpireOptions));
        let keeper = keeper(reader(&[EXCHANGE_A, EXCHANGE_B]), submitter.clone(), false);

        let report = keeper.run_once(&[EXCHANGE_A, EXCHANGE_B]).await;

        assert_eq!(report.failed(), 2);
        // Nonce is re-read after each failure
        assert_eq!(*submitter.syncs.lock(), 2);
    }

    #[tokio::test]
    async fn test_dry_run() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let keeper = keeper(reader(&[EXCHANGE_A]), submitter.clone(), true);

        let report = keeper.run_once(&[EXCHANGE_A, EXCHANGE_B]).await;

        assert_eq!(report.expired(), 1);
        match &report.exchanges[0].status {
            ExchangeStatus::Expired(call) => assert!(call.is_dry_run()),
            other => panic!("unexpected status: {other:?}"),
        }
        assert!(submitter.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_expiring_skips_nonce_sync() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let keeper = keeper(reader(&[]), submitter.clone(), false);

        let report = keeper.run_once(&[EXCHANGE_A, EXCHANGE_B, EXCHANGE_C]).await;
        assert_eq!(report.expired(), 0);
        assert_eq!(*submitter.syncs.lock(), 0);
    }
}
