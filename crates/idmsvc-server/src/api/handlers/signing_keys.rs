use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::api::AppState;
use crate::api::error::ApiError;

#[derive(Debug, Serialize)]
pub struct SigningKeysResponse {
    /// Public JWKs, each serialized as a JSON string.
    pub keys: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub revoked_kids: Vec<String>,
}

/// GET /signing_keys
pub async fn signing_keys(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SigningKeysResponse>, ApiError> {
    let set = state.service.signing_keys().await?;
    Ok(Json(SigningKeysResponse {
        keys: set.keys,
        revoked_kids: set.revoked_kids,
    }))
}
