//! Transaction signer and sender for the keeper account.
//!
//! Every transaction from the keeper goes through one [`TransactionSender`],
//! which hands out nonces from a local counter and waits for each receipt
//! before returning. Multi-step sequences (approve, then deposit, then
//! borrow...) therefore land on chain in the order they were submitted.

use crate::contracts::{CallKind, TxCall};
use crate::gas::{create_gas_strategy, GasParams, GasStrategy, LegacyGasStrategy, GWEI};
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Gas limit when a call does not carry its own.
pub const DEFAULT_GAS_LIMIT: u64 = 1_000_000;

/// How long to wait for a receipt before giving up.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(180);

/// Local nonce counter for the keeper account.
#[derive(Debug)]
pub struct NonceManager {
    current: AtomicU64,
}

impl NonceManager {
    pub fn new(initial_nonce: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_nonce),
        }
    }

    /// Hand out the next nonce and advance the counter.
    #[inline]
    pub fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst)
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Move forward to the chain's count; never moves backwards.
    pub fn sync(&self, chain_nonce: u64) {
        self.current.fetch_max(chain_nonce, Ordering::SeqCst);
    }

    /// Force the counter to the chain's count (after a failed submission).
    pub fn reset(&self, chain_nonce: u64) {
        self.current.store(chain_nonce, Ordering::SeqCst);
    }

    /// Apply the chain's count read after a failed submission.
    ///
    /// A nonce taken by a transaction that never got mined is handed out
    /// again. When the count could not be read the counter is left alone
    /// and the error is returned.
    pub fn recover(&self, chain_nonce: Result<u64>) -> Result<u64> {
        let chain_nonce = chain_nonce?;
        self.reset(chain_nonce);
        Ok(chain_nonce)
    }
}

/// Summary of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_hash: B256,
    pub nonce: u64,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// Anything that can sign and send keeper transactions.
#[async_trait]
pub trait TxSubmitter: Send + Sync + Debug {
    /// Keeper account address.
    fn address(&self) -> Address;

    /// Sign, broadcast and wait for the receipt. A revert is an error.
    async fn submit(&self, call: TxCall) -> Result<TxOutcome>;

    /// Re-read the pending transaction count and return the nonce in use.
    async fn sync_nonce(&self) -> Result<u64>;
}

/// Builder for [`TransactionSender`].
pub struct TransactionSenderBuilder {
    rpc_url: String,
    chain_id: u64,
    gas_strategy: Option<Box<dyn GasStrategy>>,
    default_gas_limit: u64,
    confirmation_timeout: Duration,
}

impl TransactionSenderBuilder {
    pub fn new(rpc_url: impl Into<String>, chain_id: u64) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id,
            gas_strategy: None,
            default_gas_limit: DEFAULT_GAS_LIMIT,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }

    pub fn gas_strategy(mut self, strategy: Box<dyn GasStrategy>) -> Self {
        self.gas_strategy = Some(strategy);
        self
    }

    /// Set the gas strategy from chain config values.
    pub fn gas_from_config(
        mut self,
        pricing_model: &str,
        default_gas_price_gwei: f64,
        max_gas_price_gwei: f64,
        priority_fee_gwei: Option<f64>,
    ) -> Self {
        self.gas_strategy = Some(create_gas_strategy(
            pricing_model,
            default_gas_price_gwei,
            max_gas_price_gwei,
            priority_fee_gwei,
        ));
        self
    }

    pub fn default_gas_limit(mut self, limit: u64) -> Self {
        self.default_gas_limit = limit;
        self
    }

    pub fn confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Parse the key, read the pending nonce and build the sender.
    pub async fn build(self, private_key: &str) -> Result<TransactionSender> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .context("Invalid private key")?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let initial_nonce = provider.get_transaction_count(address).pending().await?;

        let gas_strategy = self
            .gas_strategy
            .unwrap_or_else(|| Box::new(LegacyGasStrategy::fixed(50 * GWEI)));

        info!(
            address = %address,
            chain_id = self.chain_id,
            initial_nonce = initial_nonce,
            gas_strategy = gas_strategy.strategy_name(),
            "Transaction sender initialized"
        );

        Ok(TransactionSender {
            rpc_url: self.rpc_url,
            wallet,
            address,
            chain_id: self.chain_id,
            nonce_manager: NonceManager::new(initial_nonce),
            default_gas_limit: self.default_gas_limit,
            confirmation_timeout: self.confirmation_timeout,
            gas_strategy,
        })
    }
}

/// Signs with a local private key and sends over HTTP JSON-RPC.
pub struct TransactionSender {
    rpc_url: String,
    wallet: EthereumWallet,
    address: Address,
    chain_id: u64,
    nonce_manager: NonceManager,
    default_gas_limit: u64,
    confirmation_timeout: Duration,
    gas_strategy: Box<dyn GasStrategy>,
}

impl TransactionSender {
    /// Sender with the default (fixed 50 gwei) gas strategy.
    pub async fn new(private_key: &str, rpc_url: &str, chain_id: u64) -> Result<Self> {
        TransactionSenderBuilder::new(rpc_url, chain_id)
            .build(private_key)
            .await
    }

    pub fn gas_strategy_name(&self) -> &'static str {
        self.gas_strategy.strategy_name()
    }

    /// Native balance of the keeper account.
    pub async fn get_balance(&self) -> Result<U256> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        Ok(provider.get_balance(self.address).await?)
    }

    fn build_request(&self, call: &TxCall, nonce: u64, gas_params: &GasParams) -> TransactionRequest {
        let mut tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(call.to)
            .with_input(call.calldata.clone())
            .with_value(U256::ZERO)
            .with_nonce(nonce)
            .with_gas_limit(call.gas_limit.unwrap_or(self.default_gas_limit))
            .with_chain_id(self.chain_id);
        self.gas_strategy.apply_gas(&mut tx, gas_params);
        tx
    }

    async fn chain_nonce(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        Ok(provider.get_transaction_count(self.address).pending().await?)
    }

    /// Reset the counter from the chain after a failed submission.
    async fn recover_nonce(&self, kind: CallKind) {
        match self.nonce_manager.recover(self.chain_nonce().await) {
            Ok(chain_nonce) => {
                debug!(call = %kind, nonce = chain_nonce, "Nonce reset from chain");
            }
            Err(e) => warn!(call = %kind, error = %e, "Failed to reset nonce from chain"),
        }
    }
}

#[async_trait]
impl TxSubmitter for TransactionSender {
    fn address(&self) -> Address {
        self.address
    }

    async fn submit(&self, call: TxCall) -> Result<TxOutcome> {
        let start = Instant::now();
        let gas_params = self.gas_strategy.fetch_params(&self.rpc_url).await?;
        let nonce = self.nonce_manager.next();
        let tx = self.build_request(&call, nonce, &gas_params);

        info!(
            call = %call.kind,
            to = %call.to,
            nonce = nonce,
            gas_limit = call.gas_limit.unwrap_or(self.default_gas_limit),
            gas_price_gwei = gas_params.effective_gas_price() / GWEI,
            "Sending transaction"
        );

        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.parse()?);

        let pending = match provider.send_transaction(tx).await {
            Ok(pending) => pending,
            Err(e) => {
                self.recover_nonce(call.kind).await;
                return Err(anyhow::Error::new(e).context(format!("Broadcast of {} failed", call.kind)));
            }
        };
        let tx_hash = *pending.tx_hash();
        debug!(call = %call.kind, tx_hash = %tx_hash, "Transaction broadcast, waiting for receipt");

        let receipt = match pending
            .with_timeout(Some(self.confirmation_timeout))
            .get_receipt()
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                self.recover_nonce(call.kind).await;
                return Err(anyhow::Error::new(e)
                    .context(format!("No receipt for {} ({})", call.kind, tx_hash)));
            }
        };

        if !receipt.status() {
            warn!(call = %call.kind, tx_hash = %tx_hash, "Transaction reverted, resetting nonce");
            self.recover_nonce(call.kind).await;
            anyhow::bail!("{} reverted: {}", call.kind, tx_hash);
        }

        info!(
            call = %call.kind,
            tx_hash = %tx_hash,
            block = receipt.block_number.unwrap_or(0),
            gas_used = receipt.gas_used,
            elapsed_ms = start.elapsed().as_millis(),
            "Transaction confirmed"
        );

        Ok(TxOutcome {
            tx_hash,
            nonce,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
        })
    }

    async fn sync_nonce(&self) -> Result<u64> {
        let chain_nonce = self.chain_nonce().await?;
        self.nonce_manager.sync(chain_nonce);
        let nonce = self.nonce_manager.current();
        debug!(chain_nonce = chain_nonce, nonce = nonce, "Nonce synced");
        Ok(nonce)
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.rpc_url)
            .field("gas_strategy", &self.gas_strategy.strategy_name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::moret;

    // Well-known development key (anvil account #0)
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_nonce_manager() {
        let manager = NonceManager::new(10);

        assert_eq!(manager.next(), 10);
        assert_eq!(manager.next(), 11);
        assert_eq!(manager.current(), 12);

        // Chain ahead: move forward
        manager.sync(15);
        assert_eq!(manager.current(), 15);

        // Chain behind (our txs still pending): keep local count
        manager.sync(13);
        assert_eq!(manager.current(), 15);

        manager.reset(13);
        assert_eq!(manager.current(), 13);
    }

    #[test]
    fn test_recover_after_unmined_transaction() {
        // Broadcast rejected, receipt timed out or reverted before the
        // nonce was consumed: the chain still reports the taken nonce
        let manager = NonceManager::new(5);
        let taken = manager.next();
        assert_eq!(manager.current(), 6);

        assert_eq!(manager.recover(Ok(5)).unwrap(), 5);
        assert_eq!(manager.next(), taken);
    }

    #[test]
    fn test_recover_after_mined_revert() {
        // A reverted transaction is mined and consumes its nonce
        let manager = NonceManager::new(5);
        manager.next();

        assert_eq!(manager.recover(Ok(6)).unwrap(), 6);
        assert_eq!(manager.next(), 6);
    }

    #[test]
    fn test_recover_keeps_counter_when_chain_unreadable() {
        let manager = NonceManager::new(5);
        manager.next();

        let err = manager
            .recover(Err(anyhow::anyhow!("connection refused")))
            .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(manager.current(), 6);
    }

    #[test]
    fn test_build_request_fields() {
        let signer: PrivateKeySigner = TEST_KEY.trim_start_matches("0x").parse().unwrap();
        let address = signer.address();
        let sender = TransactionSender {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            wallet: EthereumWallet::from(signer),
            address,
            chain_id: 137,
            nonce_manager: NonceManager::new(0),
            default_gas_limit: DEFAULT_GAS_LIMIT,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            gas_strategy: Box::new(LegacyGasStrategy::fixed(50 * GWEI)),
        };

        let market = Address::repeat_byte(0x33);
        let call = TxCall::new(
            CallKind::ExpireOptions,
            market,
            moret::encode_expire_options(address),
        )
        .with_gas_limit(5_000_000);

        let tx = sender.build_request(&call, 7, &GasParams::Legacy { gas_price: 50 * GWEI });
        assert_eq!(tx.nonce, Some(7));
        assert_eq!(tx.gas, Some(5_000_000));
        assert_eq!(tx.chain_id, Some(137));
        assert_eq!(tx.gas_price, Some(50 * GWEI));
        assert_eq!(tx.from, Some(address));

        // Calls without a limit get the sender default
        let plain = TxCall::new(CallKind::Borrow, market, call.calldata.clone());
        let tx = sender.build_request(&plain, 8, &GasParams::Legacy { gas_price: 50 * GWEI });
        assert_eq!(tx.gas, Some(DEFAULT_GAS_LIMIT));
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_sender_creation() {
        let sender = TransactionSender::new(TEST_KEY, "https://polygon-rpc.com", 137)
            .await
            .unwrap();
        assert_eq!(
            format!("{:?}", sender.address()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(sender.gas_strategy_name(), "Fixed");
    }
}
