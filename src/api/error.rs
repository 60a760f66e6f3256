use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde_json::json;
use thiserror::Error;

use crate::error::{AdmissionError, EngineError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Admission(AdmissionError::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Admission(AdmissionError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Engine(EngineError::Unavailable(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Engine(EngineError::UnknownWorkflow(_)) => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Engine(EngineError::AlreadyTerminal { .. }) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
