//! Metadata pinning contract.
//!
//! The main-account assembly step pins a JSON document describing the
//! ecosystem and attaches the returned content hash to the on-chain
//! structure.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ChainError, ChainResult};

#[async_trait]
pub trait MetadataPinner: Send + Sync {
    /// Pin `document`, returning its content hash.
    async fn pin(&self, document: &serde_json::Value) -> ChainResult<String>;
}

/// Content-addressed in-process pinner for local runs and tests.
#[derive(Default)]
pub struct InMemoryPinner {
    pinned: Mutex<HashMap<String, serde_json::Value>>,
}

impl InMemoryPinner {
    pub fn pinned_count(&self) -> usize {
        self.pinned.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn get(&self, hash: &str) -> Option<serde_json::Value> {
        self.pinned
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(hash)
            .cloned()
    }
}

#[async_trait]
impl MetadataPinner for InMemoryPinner {
    async fn pin(&self, document: &serde_json::Value) -> ChainResult<String> {
        let serialized = serde_json::to_string(document)
            .map_err(|e| ChainError::PinFailed(e.to_string()))?;

        let mut hasher = DefaultHasher::new();
        serialized.hash(&mut hasher);
        let hash = format!("pin-{:016x}", hasher.finish());

        self.pinned
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(hash.clone(), document.clone());
        debug!(%hash, "metadata pinned");
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn pin_is_content_addressed() {
        let pinner = InMemoryPinner::default();
        let doc = json!({"name": "eco", "nodes": 3});

        let first = pinner.pin(&doc).await.unwrap();
        let second = pinner.pin(&doc).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(pinner.pinned_count(), 1);
        assert_eq!(pinner.get(&first), Some(doc));
    }

    #[tokio::test]
    async fn different_documents_get_different_hashes() {
        let pinner = InMemoryPinner::default();
        let a = pinner.pin(&json!({"name": "a"})).await.unwrap();
        let b = pinner.pin(&json!({"name": "b"})).await.unwrap();
        assert_ne!(a, b);
    }
}
