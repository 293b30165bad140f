//! Domain types for the ecosystem store.
//!
//! All types are serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fanout_graph::Graph;

/// Chain identifier (EVM-style numeric chain id).
pub type ChainId = u64;

/// Lifecycle state of an ecosystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EcosystemState {
    ProcessingGraph,
    PendingDeployment,
    Deploying,
    Deployed,
    Error,
}

impl EcosystemState {
    /// Terminal states admit no further events.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Deployed | Self::Error)
    }
}

/// Named lifecycle events. Transitions are driven by these, never by
/// writing a target state directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EcosystemEvent {
    ProcessingCompleted,
    ProcessingFailed,
    DeploymentStarted,
    DeploymentCompleted,
    DeploymentFailed,
}

/// One submitted graph and its lifecycle record.
///
/// After creation only `state`, `account_id`, `error`, `deleted`, and
/// `updated_at` mutate; the raw graph snapshot is immutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ecosystem {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub state: EcosystemState,
    pub chain_id: ChainId,
    pub owner_address: String,
    /// The graph exactly as submitted.
    pub graph: Graph,
    /// Arbitrary display metadata (emoji, color, ...).
    pub metadata: Vec<MetadataEntry>,
    /// On-chain main-account identifier, set once deployed.
    pub account_id: Option<String>,
    /// Last recorded pipeline error, if any.
    pub error: Option<String>,
    /// Soft-delete flag; rows are never hard-deleted.
    pub deleted: bool,
    /// Unix timestamp (seconds).
    pub created_at: u64,
    pub updated_at: u64,
}

/// A display metadata key/value pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

/// A persisted vertex of an ecosystem's verified graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub ecosystem_id: Uuid,
    /// Registry-verified project name, unique within the ecosystem.
    pub project_name: String,
    /// The name as originally submitted (may differ after a rename).
    pub original_name: String,
    /// External registry identifier; `None` only for the root node.
    pub project_id: Option<String>,
    /// Fraction of the root distribution, 0 until propagation runs.
    pub absolute_weight: f64,
}

/// A persisted directed weighted edge between two nodes of one ecosystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeRecord {
    pub ecosystem_id: Uuid,
    pub source: String,
    pub target: String,
    pub weight: f64,
}

impl Ecosystem {
    /// Key for the ecosystems table.
    pub fn table_key(&self) -> String {
        self.id.to_string()
    }
}

impl NodeRecord {
    /// Composite key: at most one node per (ecosystem, project name).
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.ecosystem_id, self.project_name)
    }
}

impl EdgeRecord {
    /// Composite key: at most one edge per ordered (source, target) pair
    /// within an ecosystem.
    pub fn table_key(&self) -> String {
        format!("{}:{}->{}", self.ecosystem_id, self.source, self.target)
    }
}
