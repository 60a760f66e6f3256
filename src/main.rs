use log::{info, warn};
use std::sync::Arc;
use tokio::net::TcpListener;

use workflow_gateway::api::{self, AppState};
use workflow_gateway::greeting::{GreetingActivity, GreetingWorkflow};
use workflow_gateway::storage::implementations::SqliteStorage;
use workflow_gateway::{
    ActivityExecutor, AdmissionGateway, BoxError, GatewayConfig, WorkerPool, WorkflowDispatcher,
    WorkflowEngine, WorkflowStorage,
};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::init();
    info!("Starting the workflow gateway...");

    // Step 1: Read configuration.
    let config = GatewayConfig::from_env()?;
    if config.api_keys.is_empty() {
        warn!("GATEWAY_API_KEYS is empty; every request will be rejected");
    }

    // Step 2: Set up the storage backend. It also serves as the task queue.
    let storage = Arc::new(SqliteStorage::new(&config.database_url).await?);
    WorkflowStorage::init(storage.as_ref()).await?;

    // Step 3: Build the engine and pick up whatever the last process left behind.
    let engine = WorkflowEngine::new(storage.clone(), storage.clone())
        .with_options(config.engine_options())
        .register_workflow(GreetingWorkflow::default());
    let recovered = engine.recover().await?;
    if recovered > 0 {
        info!("Recovered {} unfinished workflow(s)", recovered);
    }

    // Step 4: Start the workers.
    let workers = WorkerPool::new(
        storage.clone(),
        ActivityExecutor::new().register(GreetingActivity),
        engine.clone(),
    )
    .with_options(config.worker_options())
    .start();

    // Step 5: Serve the API until interrupted.
    let dispatcher = WorkflowDispatcher::new(Arc::new(engine.clone()), &config.workflow_id_prefix);
    let state = AppState::new(AdmissionGateway::from_config(&config), dispatcher, engine.clone());
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on {}", config.bind_addr);
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    engine.shutdown();
    workers.shutdown().await;
    Ok(())
}
