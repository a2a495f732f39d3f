use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState, AuthenticatedKey};

// ============================================================
// Request bodies
// ============================================================

/// Body of `/present` and `/cleanup`, as sent by lego's `httpreq` provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRequest {
    /// Record name, e.g. `_acme-challenge.host.internal.example.com.`
    pub fqdn: String,
    /// TXT value to serve.
    pub value: String,
}

impl ChallengeRequest {
    fn from_body(body: &[u8]) -> Result<Self, ApiError> {
        serde_json::from_slice(body).map_err(|e| match e.classify() {
            serde_json::error::Category::Data => ApiError::MissingFields,
            _ => ApiError::InvalidJson,
        })
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "validations": state.store.len(),
    }))
}

// ============================================================
// Challenges
// ============================================================

pub async fn present(
    State(state): State<AppState>,
    key: AuthenticatedKey,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request = ChallengeRequest::from_body(&body)?;
    key.ensure_allowed(&request.fqdn)?;

    if state.store.present(&request.fqdn, &request.value) {
        tracing::info!("Key {} presented TXT record for {}", key.name, request.fqdn);
    } else {
        tracing::debug!("TXT record for {} already present", request.fqdn);
    }
    Ok(StatusCode::OK)
}

pub async fn cleanup(
    State(state): State<AppState>,
    key: AuthenticatedKey,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request = ChallengeRequest::from_body(&body)?;
    key.ensure_allowed(&request.fqdn)?;

    if state.store.cleanup(&request.fqdn, &request.value) {
        tracing::info!("Key {} cleaned up TXT record for {}", key.name, request.fqdn);
    } else {
        tracing::debug!("No TXT record to clean up for {}", request.fqdn);
    }
    Ok(StatusCode::OK)
}
