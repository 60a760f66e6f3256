use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::ApiError;
use super::AppState;
use crate::dispatcher::WorkflowHandle;
use crate::engine::{WorkflowInstance, WorkflowState};
use crate::gateway::Identity;

#[derive(Debug, Deserialize)]
pub struct StartParams {
    pub kind: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub workflow_id: String,
    pub state: WorkflowState,
}

/// `POST /v1/workflow`: the body is the workflow input.
pub async fn start_workflow(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<StartParams>,
    body: Bytes,
) -> Result<Json<WorkflowHandle>, ApiError> {
    let input = String::from_utf8(body.to_vec())
        .map_err(|_| ApiError::BadRequest("request body must be UTF-8".to_string()))?;
    let kind = params
        .kind
        .unwrap_or_else(|| state.dispatcher.default_kind().to_string());

    let handle = state.dispatcher.dispatch(&kind, input).await?;
    info!(
        "'{}' started workflow '{}' (run {})",
        identity, handle.workflow_id, handle.run_id
    );
    Ok(Json(handle))
}

pub async fn get_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<WorkflowInstance>, ApiError> {
    Ok(Json(state.engine.describe(&workflow_id).await?))
}

pub async fn cancel_workflow(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(workflow_id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = state.engine.cancel(&workflow_id).await?;
    info!("'{}' cancelled workflow '{}'", identity, workflow_id);
    Ok(Json(CancelResponse {
        workflow_id,
        state: cancelled,
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
