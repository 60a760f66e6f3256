//! HTTP surface of the gateway.

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

pub mod error;
pub mod handlers;
pub mod middleware;

pub use error::ApiError;

use crate::config::CREDENTIAL_HEADER;
use crate::dispatcher::WorkflowDispatcher;
use crate::engine::WorkflowEngine;
use crate::gateway::AdmissionGateway;

#[derive(Clone)]
pub struct AppState {
    pub gateway: AdmissionGateway,
    pub dispatcher: WorkflowDispatcher,
    pub engine: WorkflowEngine,
    /// Header carrying the API key, lower case
    pub credential_header: String,
}

impl AppState {
    pub fn new(
        gateway: AdmissionGateway,
        dispatcher: WorkflowDispatcher,
        engine: WorkflowEngine,
    ) -> Self {
        Self {
            gateway,
            dispatcher,
            engine,
            credential_header: CREDENTIAL_HEADER.to_string(),
        }
    }
}

/// Every `/v1` route goes through admission; `/health` does not.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/workflow", post(handlers::start_workflow))
        .route("/v1/workflow/:workflow_id", get(handlers::get_workflow))
        .route(
            "/v1/workflow/:workflow_id/cancel",
            post(handlers::cancel_workflow),
        )
        .route_layer(from_fn_with_state(state.clone(), middleware::admission))
        .route("/health", get(handlers::health))
        .with_state(state)
}
