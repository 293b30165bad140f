//! Ecosystem creation pipeline.
//!
//! `submit` validates the graph, persists the aggregate in
//! `processing_graph`, and fans one verification job per node out to the
//! orchestrator. The worker that wins the completion lock finalizes:
//! remaps edges to the verified names, runs weight propagation, writes
//! nodes and edges in one transaction, and advances the state machine.
//! Any permanently failed verification sends the ecosystem to `error`
//! with every reason recorded.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use fanout_graph::{propagate_weights, validate, Graph, GraphEdge};
use fanout_queue::{
    BatchKey, BatchResults, BatchStore, Finalizer, JobError, JobOrchestrator, OrchestratorConfig,
};
use fanout_state::store::epoch_secs;
use fanout_state::{Ecosystem, EcosystemEvent, EcosystemStore, EdgeRecord, MetadataEntry, NodeRecord};

use crate::error::{PipelineError, PipelineResult};
use crate::verify::{verify_node, ProjectVerifier, VerifyError};

/// A new-ecosystem submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub chain_id: u64,
    pub owner_address: String,
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
    pub graph: Graph,
}

/// Result of one verification job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifiedNode {
    pub original_name: String,
    pub verified_name: String,
    pub project_id: Option<String>,
}

#[derive(Clone)]
pub struct CreationPipeline {
    store: EcosystemStore,
    verifier: Arc<dyn ProjectVerifier>,
    batch_store: Arc<dyn BatchStore<VerifiedNode>>,
    config: OrchestratorConfig,
}

impl CreationPipeline {
    pub fn new(
        store: EcosystemStore,
        verifier: Arc<dyn ProjectVerifier>,
        batch_store: Arc<dyn BatchStore<VerifiedNode>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            verifier,
            batch_store,
            config,
        }
    }

    /// Validate and persist a submission, then verify its nodes in the
    /// background. Returns the new ecosystem id immediately.
    pub async fn submit(&self, request: SubmitRequest) -> PipelineResult<Uuid> {
        validate(&request.graph).map_err(PipelineError::Validation)?;

        let now = epoch_secs();
        let ecosystem = Ecosystem {
            id: Uuid::new_v4(),
            name: request.name,
            description: request.description,
            state: fanout_state::EcosystemState::ProcessingGraph,
            chain_id: request.chain_id,
            owner_address: request.owner_address,
            graph: request.graph,
            metadata: request.metadata,
            account_id: None,
            error: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.store.put_ecosystem(&ecosystem)?;
        info!(
            ecosystem = %ecosystem.id,
            nodes = ecosystem.graph.nodes.len(),
            chain = ecosystem.chain_id,
            "ecosystem submitted"
        );

        let this = self.clone();
        let id = ecosystem.id;
        tokio::spawn(async move {
            if let Err(e) = this.run_verification(id).await {
                error!(ecosystem = %id, error = %e, "verification run failed");
                let _ = this.store.set_error(id, &e.to_string());
                let _ = this
                    .store
                    .apply_event(id, EcosystemEvent::ProcessingFailed);
            }
        });

        Ok(id)
    }

    /// Fan out one verification job per node and finalize exactly once.
    pub async fn run_verification(&self, id: Uuid) -> PipelineResult<()> {
        let ecosystem = self
            .store
            .get_ecosystem(id)?
            .ok_or(PipelineError::NotFound(id))?;

        let names: Vec<String> = ecosystem.graph.node_names().map(str::to_string).collect();
        let key = BatchKey::new(id.to_string(), ecosystem.chain_id, "verify");
        let chain_id = ecosystem.chain_id;

        let verifier = self.verifier.clone();
        let handler = move |name: String| {
            let verifier = verifier.clone();
            async move {
                match verify_node(verifier.as_ref(), &name, chain_id).await {
                    Ok(project) => Ok(VerifiedNode {
                        original_name: name,
                        verified_name: project.verified_name,
                        project_id: project.project_id,
                    }),
                    Err(VerifyError::NotFound(reason)) => Err(JobError::Permanent(reason)),
                    Err(VerifyError::Unavailable(reason)) => Err(JobError::Transient(reason)),
                }
            }
        };

        let this = self.clone();
        let finalize_key = key.clone();
        let finalize_names = names.clone();
        let finalizer: Finalizer<VerifiedNode> = Box::new(move |results| {
            Box::pin(async move {
                if let Err(e) = this.finalize(id, &finalize_key, &finalize_names, results).await {
                    error!(ecosystem = %id, error = %e, "creation finalize failed");
                    let _ = this.store.set_error(id, &e.to_string());
                    let _ = this
                        .store
                        .apply_event(id, EcosystemEvent::ProcessingFailed);
                }
            })
        });

        let orchestrator = JobOrchestrator::new(self.batch_store.clone(), self.config.clone());
        orchestrator.run_batch(key, names, handler, finalizer).await?;
        Ok(())
    }

    async fn finalize(
        &self,
        id: Uuid,
        key: &BatchKey,
        names: &[String],
        results: BatchResults<VerifiedNode>,
    ) -> PipelineResult<()> {
        if !results.failed.is_empty() {
            let mut reasons: Vec<String> = results
                .failed
                .iter()
                .map(|(job_id, reason)| {
                    let name = names
                        .get(*job_id as usize)
                        .map(String::as_str)
                        .unwrap_or("?");
                    format!("{name}: {reason}")
                })
                .collect();
            reasons.sort();
            let message = reasons.join("; ");

            warn!(
                ecosystem = %id,
                failed = results.failed.len(),
                "verification batch failed"
            );
            self.store.set_error(id, &message)?;
            self.store
                .apply_event(id, EcosystemEvent::ProcessingFailed)?;
            // Batch keys are kept for inspection on failure.
            return Ok(());
        }

        // Registry renames can converge: two submitted projects resolving
        // to one canonical name would share a table key and merge
        // silently. Fail the batch instead.
        let mut canonical: HashMap<&str, &str> = HashMap::new();
        let mut collisions: Vec<String> = Vec::new();
        for (_, node) in &results.successful {
            if let Some(first) =
                canonical.insert(node.verified_name.as_str(), node.original_name.as_str())
            {
                collisions.push(format!(
                    "'{first}' and '{}' both resolve to '{}'",
                    node.original_name, node.verified_name
                ));
            }
        }
        if !collisions.is_empty() {
            collisions.sort();
            let message = format!(
                "duplicate projects after verification: {}",
                collisions.join("; ")
            );
            warn!(ecosystem = %id, %message, "verification batch failed");
            self.store.set_error(id, &message)?;
            self.store
                .apply_event(id, EcosystemEvent::ProcessingFailed)?;
            return Ok(());
        }

        let ecosystem = self
            .store
            .get_ecosystem(id)?
            .ok_or(PipelineError::NotFound(id))?;

        let verified: HashMap<&str, &VerifiedNode> = results
            .successful
            .iter()
            .map(|(_, node)| (node.original_name.as_str(), node))
            .collect();
        let lookup = |name: &str| -> PipelineResult<&VerifiedNode> {
            verified.get(name).copied().ok_or_else(|| {
                PipelineError::Internal(format!("no verification result for node '{name}'"))
            })
        };

        // Edges were submitted against original names; persist them under
        // the verified ones.
        let verified_names: Vec<String> = names
            .iter()
            .map(|name| Ok(lookup(name)?.verified_name.clone()))
            .collect::<PipelineResult<_>>()?;
        let edges: Vec<GraphEdge> = ecosystem
            .graph
            .edges
            .iter()
            .map(|edge| {
                Ok(GraphEdge {
                    source: lookup(&edge.source)?.verified_name.clone(),
                    target: lookup(&edge.target)?.verified_name.clone(),
                    weight: edge.weight,
                })
            })
            .collect::<PipelineResult<_>>()?;

        let weights = propagate_weights(&verified_names, &edges)?;

        let node_records: Vec<NodeRecord> = names
            .iter()
            .map(|name| {
                let node = lookup(name)?;
                Ok(NodeRecord {
                    ecosystem_id: id,
                    project_name: node.verified_name.clone(),
                    original_name: node.original_name.clone(),
                    project_id: node.project_id.clone(),
                    absolute_weight: weights.get(&node.verified_name).copied().unwrap_or(0.0),
                })
            })
            .collect::<PipelineResult<_>>()?;
        let edge_records: Vec<EdgeRecord> = edges
            .iter()
            .map(|edge| EdgeRecord {
                ecosystem_id: id,
                source: edge.source.clone(),
                target: edge.target.clone(),
                weight: edge.weight,
            })
            .collect();

        self.store.save_graph(id, &node_records, &edge_records)?;
        self.store
            .apply_event(id, EcosystemEvent::ProcessingCompleted)?;
        self.batch_store.delete_batch(key)?;

        info!(
            ecosystem = %id,
            nodes = node_records.len(),
            edges = edge_records.len(),
            "ecosystem graph verified and saved"
        );
        Ok(())
    }
}
