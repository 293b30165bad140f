//! fanoutd — the fanout daemon.
//!
//! Single binary that assembles the fanout service:
//! - Ecosystem store (redb)
//! - Creation pipeline (verification fan-out)
//! - Deployment pipeline (splits creation fan-out)
//! - REST API
//!
//! # Usage
//!
//! ```text
//! fanoutd serve --port 8080 --data-dir /var/lib/fanout
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use fanout_chain::{ChainClient, ChainRegistry, ConfirmPolicy, DevChainClient, InMemoryPinner};
use fanout_pipeline::{
    CreationPipeline, DeploymentPipeline, ProjectVerifier, RegistryVerifier, StaticVerifier,
    VerifiedNode,
};
use fanout_queue::{InMemoryBatchStore, OrchestratorConfig};
use fanout_state::EcosystemStore;

#[derive(Parser)]
#[command(name = "fanoutd", about = "Fanout daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server and both pipelines in one process.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/fanout")]
        data_dir: PathBuf,

        /// Project registry base URL. Without it every project verifies
        /// as submitted (development mode).
        #[arg(long)]
        registry_url: Option<String>,

        /// Bearer token required on mutating API routes.
        #[arg(long, env = "FANOUT_API_TOKEN")]
        auth_token: Option<String>,

        /// Address transactions are sent from.
        #[arg(long, default_value = "0xfanout-deployer")]
        deployer: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fanoutd=debug,fanout=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            data_dir,
            registry_url,
            auth_token,
            deployer,
        } => run_serve(port, data_dir, registry_url, auth_token, deployer).await,
    }
}

async fn run_serve(
    port: u16,
    data_dir: PathBuf,
    registry_url: Option<String>,
    auth_token: Option<String>,
    deployer: String,
) -> anyhow::Result<()> {
    info!("fanout daemon starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("fanout.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = EcosystemStore::open(&db_path)?;
    info!(path = ?db_path, "ecosystem store opened");

    let verifier: Arc<dyn ProjectVerifier> = match registry_url {
        Some(url) => {
            info!(%url, "using registry verifier");
            Arc::new(RegistryVerifier::new(url))
        }
        None => {
            info!("no registry configured, using passthrough verifier");
            Arc::new(StaticVerifier::passthrough())
        }
    };

    // In-process chain simulator; real providers plug in behind the
    // same ChainClient contract.
    let registry = Arc::new(ChainRegistry::new(move |chain_id| {
        Some(Arc::new(DevChainClient::new(chain_id, deployer.clone())) as Arc<dyn ChainClient>)
    }));

    let create = CreationPipeline::new(
        store.clone(),
        verifier,
        Arc::new(InMemoryBatchStore::<VerifiedNode>::default()),
        OrchestratorConfig::default(),
    );
    let deploy = DeploymentPipeline::new(
        store.clone(),
        registry,
        Arc::new(InMemoryPinner::default()),
        Arc::new(InMemoryBatchStore::<String>::default()),
        OrchestratorConfig::default(),
        ConfirmPolicy::default(),
    );
    info!("pipelines initialized");

    // ── Start API server ───────────────────────────────────────

    let router = fanout_api::build_router(fanout_api::ApiState {
        store,
        create,
        deploy,
        auth_token,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
        })
        .await?;

    info!("fanout daemon stopped");
    Ok(())
}
