//! Sequential call execution with dry-run support.

use alloy::primitives::{Address, B256};
use anyhow::Result;
use keeper_chain::{CallKind, TxCall, TxSubmitter};
use std::sync::Arc;
use tracing::info;

/// A call the keeper issued (or would have issued in dry-run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedCall {
    pub kind: CallKind,
    pub to: Address,
    /// `None` in dry-run
    pub nonce: Option<u64>,
    /// `None` in dry-run
    pub tx_hash: Option<B256>,
}

impl SubmittedCall {
    pub fn is_dry_run(&self) -> bool {
        self.tx_hash.is_none()
    }
}

/// Runs calls one at a time through a [`TxSubmitter`].
///
/// Each call is mined before the next one is built, so a sequence keeps its
/// order on chain. In dry-run mode calls are logged and never sent.
#[derive(Debug, Clone)]
pub struct CallRunner {
    submitter: Arc<dyn TxSubmitter>,
    dry_run: bool,
}

impl CallRunner {
    pub fn new(submitter: Arc<dyn TxSubmitter>, dry_run: bool) -> Self {
        Self { submitter, dry_run }
    }

    /// Keeper account address.
    pub fn keeper(&self) -> Address {
        self.submitter.address()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Re-sync the nonce from the chain before a sequence.
    pub async fn begin_sequence(&self) -> Result<u64> {
        self.submitter.sync_nonce().await
    }

    pub async fn run(&self, call: TxCall) -> Result<SubmittedCall> {
        if self.dry_run {
            info!(
                call = %call.kind,
                to = %call.to,
                gas_limit = ?call.gas_limit,
                calldata_len = call.calldata.len(),
                "Dry run, not sending"
            );
            return Ok(SubmittedCall {
                kind: call.kind,
                to: call.to,
                nonce: None,
                tx_hash: None,
            });
        }

        let kind = call.kind;
        let to = call.to;
        let outcome = self.submitter.submit(call).await?;
        Ok(SubmittedCall {
            kind,
            to,
            nonce: Some(outcome.nonce),
            tx_hash: Some(outcome.tx_hash),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSubmitter;
    use super::*;
    use keeper_chain::contracts::moret;

    fn expire_call() -> TxCall {
        TxCall::new(
            CallKind::ExpireOptions,
            Address::repeat_byte(1),
            moret::encode_expire_options(Address::repeat_byte(0xEE)),
        )
    }

    #[tokio::test]
    async fn test_run_submits_in_order() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let runner = CallRunner::new(submitter.clone(), false);

        let first = runner.run(expire_call()).await.unwrap();
        let second = runner.run(expire_call()).await.unwrap();

        assert_eq!(first.nonce, Some(0));
        assert_eq!(second.nonce, Some(1));
        assert!(!first.is_dry_run());
        assert_eq!(submitter.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_never_submits() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let runner = CallRunner::new(submitter.clone(), true);

        let call = runner.run(expire_call()).await.unwrap();
        assert!(call.is_dry_run());
        assert_eq!(call.kind, CallKind::ExpireOptions);
        assert!(submitter.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failure_propagates() {
        let submitter = Arc::new(RecordingSubmitter::failing_on(CallKind::ExpireOptions));
        let runner = CallRunner::new(submitter, false);
        assert!(runner.run(expire_call()).await.is_err());
    }
}
