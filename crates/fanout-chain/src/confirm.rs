//! Bounded confirmation polling.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::client::{ChainClient, TxHandle};
use crate::error::{ChainError, ChainResult};

/// When to consider a transaction settled, and when to give up.
#[derive(Debug, Clone)]
pub struct ConfirmPolicy {
    pub required_confirmations: u64,
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            required_confirmations: 3,
            poll_interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(6 * 60),
        }
    }
}

/// Poll until `tx` reaches the required confirmation count or the wait
/// budget runs out.
pub async fn wait_until_confirmed(
    client: &dyn ChainClient,
    tx: &TxHandle,
    policy: &ConfirmPolicy,
) -> ChainResult<u64> {
    let started = Instant::now();

    loop {
        let confirmations = client.confirmations(tx).await?;
        if confirmations >= policy.required_confirmations {
            info!(
                tx_hash = %tx.hash,
                chain = tx.chain_id,
                confirmations,
                "transaction confirmed"
            );
            return Ok(confirmations);
        }

        let waited = started.elapsed();
        if waited + policy.poll_interval > policy.max_wait {
            return Err(ChainError::ConfirmationTimeout {
                tx_hash: tx.hash.clone(),
                waited_secs: waited.as_secs(),
            });
        }

        debug!(
            tx_hash = %tx.hash,
            confirmations,
            required = policy.required_confirmations,
            "waiting for confirmations"
        );
        tokio::time::sleep(policy.poll_interval).await;
    }
}
