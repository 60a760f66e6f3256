use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::error::ApiError;
use super::AppState;

/// Admits the request through the gateway and makes the caller's
/// [`Identity`](crate::gateway::Identity) available to handlers.
pub async fn admission(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let credential = request
        .headers()
        .get(state.credential_header.as_str())
        .and_then(|value| value.to_str().ok());
    let identity = state.gateway.admit(credential)?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
