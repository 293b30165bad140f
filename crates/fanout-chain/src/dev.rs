//! In-process chain simulator.
//!
//! Backs local runs and tests: submissions are recorded instead of sent,
//! and a transaction gains one confirmation per poll so the confirmation
//! loop exercises its real code path without a network.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::client::{ChainClient, ContractCall, TxHandle};
use crate::error::{ChainError, ChainResult};

pub struct DevChainClient {
    chain_id: u64,
    deployer: String,
    next_tx: AtomicU64,
    confirmations: Mutex<HashMap<String, u64>>,
    submitted: Mutex<Vec<Vec<ContractCall>>>,
    fail_submits: AtomicU64,
    stuck: bool,
}

impl DevChainClient {
    pub fn new(chain_id: u64, deployer: impl Into<String>) -> Self {
        Self {
            chain_id,
            deployer: deployer.into(),
            next_tx: AtomicU64::new(0),
            confirmations: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            fail_submits: AtomicU64::new(0),
            stuck: false,
        }
    }

    /// Transactions never confirm; for timeout tests.
    pub fn with_stuck_confirmations(mut self) -> Self {
        self.stuck = true;
        self
    }

    /// Make the next `n` submissions fail.
    pub fn fail_next_submits(&self, n: u64) {
        self.fail_submits.store(n, Ordering::SeqCst);
    }

    /// Every batch submitted so far, in submission order.
    pub fn submitted(&self) -> Vec<Vec<ContractCall>> {
        self.submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ChainClient for DevChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn deployer_address(&self) -> &str {
        &self.deployer
    }

    async fn submit_batch(&self, calls: &[ContractCall]) -> ChainResult<TxHandle> {
        let remaining = self.fail_submits.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_submits.store(remaining - 1, Ordering::SeqCst);
            return Err(ChainError::SubmitFailed("injected submit failure".into()));
        }

        let seq = self.next_tx.fetch_add(1, Ordering::SeqCst);
        let hash = format!("0x{:064x}", seq);

        self.submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(calls.to_vec());
        self.confirmations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(hash.clone(), 0);

        debug!(chain = self.chain_id, %hash, calls = calls.len(), "batch submitted");
        Ok(TxHandle {
            hash,
            chain_id: self.chain_id,
        })
    }

    async fn confirmations(&self, tx: &TxHandle) -> ChainResult<u64> {
        let mut confirmations = self
            .confirmations
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let count = confirmations
            .get_mut(&tx.hash)
            .ok_or_else(|| ChainError::PollFailed {
                tx_hash: tx.hash.clone(),
                reason: "unknown transaction".into(),
            })?;
        if !self.stuck {
            *count += 1;
        }
        Ok(*count)
    }

    fn derive_account_id(&self, deployer: &str, salt: &[u8; 32]) -> String {
        let mut hasher = DefaultHasher::new();
        self.chain_id.hash(&mut hasher);
        deployer.hash(&mut hasher);
        salt.hash(&mut hasher);
        format!("0x{:040x}", hasher.finish() as u128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_submissions_and_confirms_per_poll() {
        let client = DevChainClient::new(7, "0xdeployer");
        let call = ContractCall {
            contract: "0xsplits".into(),
            method: "createSplit".into(),
            args: serde_json::json!({"accounts": []}),
        };

        let tx = client.submit_batch(std::slice::from_ref(&call)).await.unwrap();
        assert_eq!(tx.chain_id, 7);
        assert_eq!(client.submitted().len(), 1);

        assert_eq!(client.confirmations(&tx).await.unwrap(), 1);
        assert_eq!(client.confirmations(&tx).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let client = DevChainClient::new(1, "0xdeployer");
        client.fail_next_submits(1);

        assert!(client.submit_batch(&[]).await.is_err());
        assert!(client.submit_batch(&[]).await.is_ok());
    }

    #[test]
    fn account_id_derivation_is_deterministic_per_salt() {
        let client = DevChainClient::new(1, "0xdeployer");
        let salt_a = [1u8; 32];
        let salt_b = [2u8; 32];

        assert_eq!(
            client.derive_account_id("0xdeployer", &salt_a),
            client.derive_account_id("0xdeployer", &salt_a)
        );
        assert_ne!(
            client.derive_account_id("0xdeployer", &salt_a),
            client.derive_account_id("0xdeployer", &salt_b)
        );
    }
}
