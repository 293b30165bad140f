//! EcosystemStore — redb-backed persistence for ecosystems and their
//! verified graphs.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing). The graph save is one write transaction covering nodes,
//! edges, and propagated weights.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{StateError, StateResult};
use crate::machine;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe ecosystem store backed by redb.
#[derive(Clone)]
pub struct EcosystemStore {
    db: Arc<Database>,
}

impl EcosystemStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "ecosystem store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory ecosystem store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ECOSYSTEMS).map_err(map_err!(Table))?;
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(EDGES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Ecosystems ─────────────────────────────────────────────────

    /// Insert or update an ecosystem aggregate.
    pub fn put_ecosystem(&self, ecosystem: &Ecosystem) -> StateResult<()> {
        let key = ecosystem.table_key();
        let value = serde_json::to_vec(ecosystem).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ECOSYSTEMS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "ecosystem stored");
        Ok(())
    }

    /// Get an ecosystem by id. Soft-deleted rows are treated as absent.
    pub fn get_ecosystem(&self, id: Uuid) -> StateResult<Option<Ecosystem>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ECOSYSTEMS).map_err(map_err!(Table))?;
        match table
            .get(id.to_string().as_str())
            .map_err(map_err!(Read))?
        {
            Some(guard) => {
                let ecosystem: Ecosystem =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok((!ecosystem.deleted).then_some(ecosystem))
            }
            None => Ok(None),
        }
    }

    /// List all non-deleted ecosystems.
    pub fn list_ecosystems(&self) -> StateResult<Vec<Ecosystem>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ECOSYSTEMS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let ecosystem: Ecosystem =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if !ecosystem.deleted {
                results.push(ecosystem);
            }
        }
        Ok(results)
    }

    /// Drive the lifecycle state machine: read the current state, compute
    /// the next one, persist it. Returns the new state.
    pub fn apply_event(&self, id: Uuid, event: EcosystemEvent) -> StateResult<EcosystemState> {
        let mut ecosystem = self
            .get_ecosystem(id)?
            .ok_or_else(|| StateError::NotFound(id.to_string()))?;

        let next = machine::transition(ecosystem.state, event)?;
        ecosystem.state = next;
        ecosystem.updated_at = epoch_secs();
        self.put_ecosystem(&ecosystem)?;

        info!(ecosystem = %id, ?event, state = ?next, "ecosystem state advanced");
        Ok(next)
    }

    /// Record a pipeline error message on the ecosystem.
    pub fn set_error(&self, id: Uuid, error: &str) -> StateResult<()> {
        let mut ecosystem = self
            .get_ecosystem(id)?
            .ok_or_else(|| StateError::NotFound(id.to_string()))?;
        ecosystem.error = Some(error.to_string());
        ecosystem.updated_at = epoch_secs();
        self.put_ecosystem(&ecosystem)
    }

    /// Record the deployed on-chain main-account identifier.
    pub fn set_account_id(&self, id: Uuid, account_id: &str) -> StateResult<()> {
        let mut ecosystem = self
            .get_ecosystem(id)?
            .ok_or_else(|| StateError::NotFound(id.to_string()))?;
        ecosystem.account_id = Some(account_id.to_string());
        ecosystem.updated_at = epoch_secs();
        self.put_ecosystem(&ecosystem)
    }

    /// Soft-delete an ecosystem. Returns true if it existed and was live.
    pub fn soft_delete(&self, id: Uuid) -> StateResult<bool> {
        match self.get_ecosystem(id)? {
            Some(mut ecosystem) => {
                ecosystem.deleted = true;
                ecosystem.updated_at = epoch_secs();
                self.put_ecosystem(&ecosystem)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ── Graph ──────────────────────────────────────────────────────

    /// Persist an ecosystem's verified nodes and edges in one write
    /// transaction. Node records carry their propagated weights; nothing
    /// is observable until the whole graph committed.
    pub fn save_graph(
        &self,
        ecosystem_id: Uuid,
        nodes: &[NodeRecord],
        edges: &[EdgeRecord],
    ) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut node_table = txn.open_table(NODES).map_err(map_err!(Table))?;
            for node in nodes {
                let value = serde_json::to_vec(node).map_err(map_err!(Serialize))?;
                node_table
                    .insert(node.table_key().as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }

            let mut edge_table = txn.open_table(EDGES).map_err(map_err!(Table))?;
            for edge in edges {
                let value = serde_json::to_vec(edge).map_err(map_err!(Serialize))?;
                edge_table
                    .insert(edge.table_key().as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;

        info!(
            ecosystem = %ecosystem_id,
            nodes = nodes.len(),
            edges = edges.len(),
            "graph saved"
        );
        Ok(())
    }

    /// List all nodes of one ecosystem (by key prefix scan).
    pub fn list_nodes(&self, ecosystem_id: Uuid) -> StateResult<Vec<NodeRecord>> {
        let prefix = format!("{ecosystem_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let node: NodeRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(node);
            }
        }
        Ok(results)
    }

    /// List all edges of one ecosystem (by key prefix scan).
    pub fn list_edges(&self, ecosystem_id: Uuid) -> StateResult<Vec<EdgeRecord>> {
        let prefix = format!("{ecosystem_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EDGES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let edge: EdgeRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(edge);
            }
        }
        Ok(results)
    }
}

/// Seconds since the Unix epoch.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
