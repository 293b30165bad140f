//! redb table definitions.
//!
//! All values are JSON-serialized domain types. Node and edge keys are
//! prefixed with the ecosystem id so one ecosystem's graph can be
//! range-scanned without touching others.

use redb::TableDefinition;

/// Ecosystems: `{uuid}` → JSON `Ecosystem`.
pub const ECOSYSTEMS: TableDefinition<&str, &[u8]> = TableDefinition::new("ecosystems");

/// Nodes: `{ecosystem}:{project_name}` → JSON `NodeRecord`.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Edges: `{ecosystem}:{source}->{target}` → JSON `EdgeRecord`.
pub const EDGES: TableDefinition<&str, &[u8]> = TableDefinition::new("edges");
