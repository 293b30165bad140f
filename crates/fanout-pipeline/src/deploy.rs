//! Ecosystem deployment pipeline.
//!
//! `deploy` moves a `pending_deployment` ecosystem on chain: build the
//! two-level splits plan from the persisted weights, derive the main
//! account id from a fresh salt, fan sub-list creation out as batched
//! transactions, and on exactly-once finalize pin the metadata document,
//! assemble the main account, and record its id. Batch bookkeeping is
//! keyed by the main account id, the stable cross-chain identifier.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use fanout_chain::{
    random_salt, wait_until_confirmed, ChainClient, ChainError, ChainRegistry, ConfirmPolicy,
    ContractCall, MetadataPinner,
};
use fanout_graph::ROOT_NODE;
use fanout_queue::{
    BatchKey, BatchResults, BatchStore, Finalizer, JobError, JobOrchestrator, OrchestratorConfig,
};
use fanout_splits::{batch_sub_lists, build, SplitsPlan, SubList, WeightedAccount};
use fanout_state::{Ecosystem, EcosystemEvent, EcosystemState, EcosystemStore};

use crate::error::{PipelineError, PipelineResult};

const SPLITS_CONTRACT: &str = "splits-factory";

#[derive(Clone)]
pub struct DeploymentPipeline {
    store: EcosystemStore,
    registry: Arc<ChainRegistry>,
    pinner: Arc<dyn MetadataPinner>,
    batch_store: Arc<dyn BatchStore<String>>,
    config: OrchestratorConfig,
    confirm: ConfirmPolicy,
}

impl DeploymentPipeline {
    pub fn new(
        store: EcosystemStore,
        registry: Arc<ChainRegistry>,
        pinner: Arc<dyn MetadataPinner>,
        batch_store: Arc<dyn BatchStore<String>>,
        config: OrchestratorConfig,
        confirm: ConfirmPolicy,
    ) -> Self {
        Self {
            store,
            registry,
            pinner,
            batch_store,
            config,
            confirm,
        }
    }

    /// Start deploying a `pending_deployment` ecosystem. The state
    /// advances to `deploying` before this returns; the chain work runs
    /// in the background.
    pub async fn deploy(&self, id: Uuid) -> PipelineResult<()> {
        let ecosystem = self
            .store
            .get_ecosystem(id)?
            .ok_or(PipelineError::NotFound(id))?;
        if ecosystem.state != EcosystemState::PendingDeployment {
            return Err(PipelineError::WrongState {
                expected: EcosystemState::PendingDeployment,
                actual: ecosystem.state,
            });
        }

        self.store
            .apply_event(id, EcosystemEvent::DeploymentStarted)?;

        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.run_deployment(id).await {
                error!(ecosystem = %id, error = %e, "deployment run failed");
                let _ = this.store.set_error(id, &e.to_string());
                let _ = this
                    .store
                    .apply_event(id, EcosystemEvent::DeploymentFailed);
            }
        });

        Ok(())
    }

    /// Build the plan, create sub-lists on chain, finalize exactly once.
    pub async fn run_deployment(&self, id: Uuid) -> PipelineResult<()> {
        let ecosystem = self
            .store
            .get_ecosystem(id)?
            .ok_or(PipelineError::NotFound(id))?;
        let client = self.registry.client(ecosystem.chain_id)?;

        let accounts: Vec<WeightedAccount> = self
            .store
            .list_nodes(id)?
            .into_iter()
            .filter(|n| n.project_name != ROOT_NODE && n.absolute_weight > 0.0)
            .map(|n| WeightedAccount {
                account_id: n.project_id.unwrap_or(n.project_name),
                weight: n.absolute_weight,
            })
            .collect();
        let plan = build(&accounts)?;

        let salt = random_salt();
        let main_account = client.derive_account_id(client.deployer_address(), &salt);
        let key = BatchKey::new(main_account.clone(), ecosystem.chain_id, "sub-lists");
        let batches = batch_sub_lists(&plan);

        info!(
            ecosystem = %id,
            main_account = %main_account,
            direct = plan.direct.len(),
            sub_lists = plan.sub_lists.len(),
            batches = batches.len(),
            "deployment plan built"
        );

        let handler_client = client.clone();
        let handler_account = main_account.clone();
        let confirm = self.confirm.clone();
        let handler = move |batch: Vec<SubList>| {
            let client = handler_client.clone();
            let main_account = handler_account.clone();
            let confirm = confirm.clone();
            async move {
                let calls: Vec<ContractCall> = batch
                    .iter()
                    .map(|sub| sub_list_call(&main_account, sub))
                    .collect();
                let tx = client
                    .submit_batch(&calls)
                    .await
                    .map_err(chain_job_error)?;
                wait_until_confirmed(client.as_ref(), &tx, &confirm)
                    .await
                    .map_err(chain_job_error)?;
                Ok(tx.hash)
            }
        };

        let this = self.clone();
        let finalize_key = key.clone();
        let finalize_client = client.clone();
        let finalize_account = main_account.clone();
        let finalizer: Finalizer<String> = Box::new(move |results| {
            Box::pin(async move {
                let finalized = this
                    .finalize(
                        id,
                        &finalize_key,
                        &ecosystem,
                        finalize_client,
                        &finalize_account,
                        &salt,
                        &plan,
                        results,
                    )
                    .await;
                if let Err(e) = finalized {
                    error!(ecosystem = %id, error = %e, "deployment finalize failed");
                    let _ = this.store.set_error(id, &e.to_string());
                    let _ = this
                        .store
                        .apply_event(id, EcosystemEvent::DeploymentFailed);
                }
            })
        });

        let orchestrator = JobOrchestrator::new(self.batch_store.clone(), self.config.clone());
        orchestrator.run_batch(key, batches, handler, finalizer).await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        id: Uuid,
        key: &BatchKey,
        ecosystem: &Ecosystem,
        client: Arc<dyn ChainClient>,
        main_account: &str,
        salt: &[u8; 32],
        plan: &SplitsPlan,
        results: BatchResults<String>,
    ) -> PipelineResult<()> {
        if !results.failed.is_empty() {
            let mut reasons: Vec<String> = results
                .failed
                .iter()
                .map(|(job_id, reason)| format!("sub-list batch {job_id}: {reason}"))
                .collect();
            reasons.sort();
            let message = reasons.join("; ");

            warn!(
                ecosystem = %id,
                failed = results.failed.len(),
                "sub-list creation batch failed"
            );
            self.store.set_error(id, &message)?;
            self.store
                .apply_event(id, EcosystemEvent::DeploymentFailed)?;
            return Ok(());
        }

        let document = json!({
            "name": &ecosystem.name,
            "description": &ecosystem.description,
            "metadata": &ecosystem.metadata,
            "mainAccount": main_account,
            "receivers": plan.direct.len() + plan.sub_lists.iter().map(|s| s.receivers.len()).sum::<usize>(),
        });
        let metadata_hash = self.pinner.pin(&document).await?;

        let assembly = ContractCall {
            contract: SPLITS_CONTRACT.to_string(),
            method: "createMainAccount".to_string(),
            args: json!({
                "salt": hex_salt(salt),
                "metadataHash": metadata_hash,
                "receivers": &plan.direct,
                "subListWeights": plan.sub_lists.iter().map(|s| s.weight).collect::<Vec<_>>(),
            }),
        };
        let tx = client.submit_batch(std::slice::from_ref(&assembly)).await?;
        wait_until_confirmed(client.as_ref(), &tx, &self.confirm).await?;

        self.store.set_account_id(id, main_account)?;
        self.store
            .apply_event(id, EcosystemEvent::DeploymentCompleted)?;
        self.batch_store.delete_batch(key)?;

        info!(
            ecosystem = %id,
            main_account = %main_account,
            tx_hash = %tx.hash,
            "ecosystem deployed"
        );
        Ok(())
    }
}

fn sub_list_call(main_account: &str, sub_list: &SubList) -> ContractCall {
    ContractCall {
        contract: SPLITS_CONTRACT.to_string(),
        method: "createSubList".to_string(),
        args: json!({
            "mainAccount": main_account,
            "receivers": &sub_list.receivers,
            "weight": sub_list.weight,
        }),
    }
}

fn chain_job_error(e: ChainError) -> JobError {
    match e {
        // A timed-out transaction will not resolve on redelivery of the
        // same job; the whole attempt is terminal.
        ChainError::ConfirmationTimeout { .. } => JobError::Permanent(e.to_string()),
        other => JobError::Transient(other.to_string()),
    }
}

fn hex_salt(salt: &[u8; 32]) -> String {
    salt.iter().map(|b| format!("{b:02x}")).collect()
}
