//! Host enrollment configuration.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use idmsvc_core::models::domain::{DomainFilter, DomainType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiError;
use crate::api::handlers::domains::parse_uuid;
use crate::api::headers::RhIdentity;

/// Optional hints narrowing the match.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfRequest {
    #[serde(default)]
    pub domain_id: Option<Uuid>,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub domain_type: Option<DomainType>,
}

#[derive(Debug, Serialize)]
pub struct HostConfResponse {
    pub auto_enrollment_enabled: bool,
    pub domain_id: Uuid,
    pub domain_name: String,
    pub domain_type: DomainType,
    #[serde(rename = "rhel-idm")]
    pub rhel_idm: HostConfIdm,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct HostConfIdm {
    pub realm_name: String,
    pub cabundle: String,
    pub enrollment_servers: Vec<EnrollmentServer>,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentServer {
    pub fqdn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// POST /host-conf/{inventory_id}/{fqdn}
///
/// The body is optional; an empty body means no hints.
pub async fn host_conf(
    State(state): State<Arc<AppState>>,
    RhIdentity(identity): RhIdentity,
    Path((inventory_id, fqdn)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<HostConfResponse>, ApiError> {
    let inventory_id = parse_uuid(&inventory_id, "inventory_id")?;
    let request: HostConfRequest = if body.iter().all(u8::is_ascii_whitespace) {
        HostConfRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid host-conf body: {e}")))?
    };
    let hints = DomainFilter {
        domain_uuid: request.domain_id,
        domain_name: request.domain_name,
        domain_type: request.domain_type,
    };

    let issued = state
        .service
        .host_conf(&identity, inventory_id, &fqdn, &hints)
        .await?;

    let domain = issued.domain;
    let idm = domain.rhel_idm.as_ref().ok_or_else(|| {
        ApiError::Internal(format!(
            "matched domain '{}' has no realm data",
            domain.domain_uuid
        ))
    })?;
    let rhel_idm = HostConfIdm {
        realm_name: idm.realm_name.clone(),
        cabundle: idm.ca_bundle(),
        enrollment_servers: idm
            .enrollment_servers()
            .map(|s| EnrollmentServer {
                fqdn: s.fqdn.clone(),
                location: s.location.clone(),
            })
            .collect(),
    };
    Ok(Json(HostConfResponse {
        auto_enrollment_enabled: domain.is_enrollment_enabled(),
        domain_id: domain.domain_uuid,
        domain_name: domain.domain_name,
        domain_type: domain.domain_type,
        rhel_idm,
        token: issued.token,
    }))
}
