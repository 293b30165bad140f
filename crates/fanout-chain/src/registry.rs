//! Per-chain client registry.
//!
//! Clients are built lazily through the registered factory and memoized
//! per chain id, so repeated deployments against the same chain reuse one
//! connection. The registry is an explicit object passed to whoever needs
//! it, never a global.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::client::ChainClient;
use crate::error::{ChainError, ChainResult};

type ClientFactory =
    Box<dyn Fn(u64) -> Option<Arc<dyn ChainClient>> + Send + Sync>;

pub struct ChainRegistry {
    factory: ClientFactory,
    clients: Mutex<HashMap<u64, Arc<dyn ChainClient>>>,
}

impl ChainRegistry {
    /// `factory` returns `None` for chains this deployment does not serve.
    pub fn new(
        factory: impl Fn(u64) -> Option<Arc<dyn ChainClient>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            factory: Box::new(factory),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The memoized client for `chain_id`, building it on first use.
    pub fn client(&self, chain_id: u64) -> ChainResult<Arc<dyn ChainClient>> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(&chain_id) {
            return Ok(client.clone());
        }

        let client =
            (self.factory)(chain_id).ok_or(ChainError::UnsupportedChain(chain_id))?;
        debug!(chain = chain_id, "chain client initialized");
        clients.insert(chain_id, client.clone());
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::DevChainClient;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn builds_once_per_chain() {
        let builds = Arc::new(AtomicU32::new(0));
        let counter = builds.clone();
        let registry = ChainRegistry::new(move |chain_id| {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new(DevChainClient::new(chain_id, "0xdeployer")) as Arc<dyn ChainClient>)
        });

        let a = registry.client(1).unwrap();
        let b = registry.client(1).unwrap();
        assert_eq!(a.chain_id(), b.chain_id());
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        registry.client(2).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_chain_is_rejected() {
        let registry = ChainRegistry::new(|_| None);
        assert!(matches!(
            registry.client(999),
            Err(ChainError::UnsupportedChain(999))
        ));
    }
}
