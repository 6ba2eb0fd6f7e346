//! crmflow - HTTP Server Entry Point
//!
//! Wires the record store, generation client, tool registry and solver
//! together and starts the agent API.

use std::sync::Arc;

use crmflow::config::Config;
use crmflow::llm::AzureOpenAiClient;
use crmflow::solver::Solver;
use crmflow::store::RecordStore;
use crmflow::tools::{CrmAnalytics, CrmDatabaseQuery, CrmReasoning, ToolRegistry};
use crmflow::{api, llm::GenerationClient};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crmflow=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: deployment={}, database={}",
        config.deployment,
        config.database_path.display()
    );

    // Open the CRM store and provision tables on first run
    let store = Arc::new(RecordStore::open(&config.database_path)?);
    store.ensure_schema()?;

    // Generation client shared by the solver and the reasoning tool
    let generation: Arc<dyn GenerationClient> = Arc::new(AzureOpenAiClient::new(
        config.api_key.clone(),
        config.endpoint.clone(),
        config.deployment.clone(),
        config.api_version.clone(),
    ));

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CrmDatabaseQuery::new(store.clone())));
    registry.register(Arc::new(CrmAnalytics::new(store)));
    registry.register(Arc::new(CrmReasoning::new(generation.clone())));
    let registry = Arc::new(registry);
    info!("Registered {} tools", registry.len());

    let solver = Arc::new(Solver::new(generation, registry, config.solver.clone()));

    api::serve(&config, solver).await
}
