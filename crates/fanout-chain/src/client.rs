//! The chain-client contract.
//!
//! Everything the deployment pipeline needs from a chain lives behind
//! [`ChainClient`]: batch submission, confirmation-count polling, and
//! deterministic account-id derivation. The pipeline never talks to a
//! provider directly.

use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::ChainResult;

/// One contract invocation inside a batched transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractCall {
    pub contract: String,
    pub method: String,
    pub args: serde_json::Value,
}

/// A submitted transaction awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHandle {
    pub hash: String,
    pub chain_id: u64,
}

/// Access to one chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> u64;

    /// The address transactions are sent from; also the account-id
    /// derivation anchor.
    fn deployer_address(&self) -> &str;

    /// Submit `calls` as a single transaction.
    async fn submit_batch(&self, calls: &[ContractCall]) -> ChainResult<TxHandle>;

    /// Current confirmation count for a submitted transaction.
    async fn confirmations(&self, tx: &TxHandle) -> ChainResult<u64>;

    /// Derive the account id a (deployer, salt) pair will produce,
    /// before anything is on chain. Deterministic.
    fn derive_account_id(&self, deployer: &str, salt: &[u8; 32]) -> String;
}

/// Fresh random salt for account-id derivation.
pub fn random_salt() -> [u8; 32] {
    let mut salt = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
