//! Domain registration and administration handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use idmsvc_core::models::domain::{Domain, DomainType, IdmDomain, UpdateDomainUser};
use idmsvc_trust::DomainInput;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiError;
use crate::api::headers::{RhIdentity, idm_version, registration_token};

/// Request for a registration token.
#[derive(Debug, Deserialize)]
pub struct DomainTokenRequest {
    pub domain_type: DomainType,
}

#[derive(Debug, Serialize)]
pub struct DomainTokenResponse {
    pub domain_token: String,
    pub domain_id: Uuid,
    pub domain_type: DomainType,
    /// Unix seconds.
    pub expiration: u64,
}

/// Domain body sent by `ipa-hcc` on register and update.
#[derive(Debug, Deserialize)]
pub struct DomainRequest {
    pub domain_name: String,
    pub domain_type: DomainType,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "rhel-idm")]
    pub rhel_idm: Option<IdmDomain>,
}

impl From<DomainRequest> for DomainInput {
    fn from(body: DomainRequest) -> Self {
        DomainInput {
            domain_name: body.domain_name,
            domain_type: body.domain_type,
            title: body.title,
            description: body.description,
            rhel_idm: body.rhel_idm,
        }
    }
}

/// Fields a user may patch; anything else is rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainPatchRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub auto_enrollment_enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct DomainResponse {
    pub domain_id: Uuid,
    pub domain_name: String,
    pub domain_type: DomainType,
    pub title: Option<String>,
    pub description: Option<String>,
    pub auto_enrollment_enabled: Option<bool>,
    #[serde(rename = "rhel-idm", skip_serializing_if = "Option::is_none")]
    pub rhel_idm: Option<IdmDomain>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Domain> for DomainResponse {
    fn from(domain: Domain) -> Self {
        Self {
            domain_id: domain.domain_uuid,
            domain_name: domain.domain_name,
            domain_type: domain.domain_type,
            title: domain.title,
            description: domain.description,
            auto_enrollment_enabled: domain.auto_enrollment_enabled,
            rhel_idm: domain.rhel_idm,
            created_at: domain.created_at,
            updated_at: domain.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ListMeta {
    pub count: u64,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Serialize)]
pub struct ListDomainsResponse {
    pub meta: ListMeta,
    pub data: Vec<DomainResponse>,
}

pub(crate) fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("'{what}' is not a valid uuid")))
}

fn log_agent_version(headers: &HeaderMap, operation: &str) -> Result<(), ApiError> {
    if let Some(version) = idm_version(headers)? {
        info!(
            operation,
            ipa_hcc = %version.ipa_hcc,
            ipa = %version.ipa,
            os_release_id = %version.os_release_id,
            os_release_version_id = %version.os_release_version_id,
            "IdM agent version"
        );
    }
    Ok(())
}

/// POST /domains/token
pub async fn create_domain_token(
    State(state): State<Arc<AppState>>,
    RhIdentity(identity): RhIdentity,
    body: Result<Json<DomainTokenRequest>, JsonRejection>,
) -> Result<Json<DomainTokenResponse>, ApiError> {
    let Json(request) = body?;
    let minted = state
        .service
        .create_domain_token(&identity, request.domain_type)
        .await?;
    Ok(Json(DomainTokenResponse {
        domain_token: minted.token,
        domain_id: minted.domain_uuid,
        domain_type: minted.domain_type,
        expiration: minted.expiration,
    }))
}

/// POST /domains
pub async fn register_domain(
    State(state): State<Arc<AppState>>,
    RhIdentity(identity): RhIdentity,
    headers: HeaderMap,
    body: Result<Json<DomainRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DomainResponse>), ApiError> {
    let token = registration_token(&headers)?;
    log_agent_version(&headers, "register")?;
    let Json(request) = body?;
    let domain = state
        .service
        .register_domain(&identity, token, request.into())
        .await?;
    Ok((StatusCode::CREATED, Json(domain.into())))
}

/// PUT /domains/{uuid}
pub async fn update_domain_agent(
    State(state): State<Arc<AppState>>,
    RhIdentity(identity): RhIdentity,
    Path(uuid): Path<String>,
    headers: HeaderMap,
    body: Result<Json<DomainRequest>, JsonRejection>,
) -> Result<Json<DomainResponse>, ApiError> {
    let domain_uuid = parse_uuid(&uuid, "uuid")?;
    log_agent_version(&headers, "update")?;
    let Json(request) = body?;
    let domain = state
        .service
        .update_domain_agent(&identity, domain_uuid, request.into())
        .await?;
    Ok(Json(domain.into()))
}

/// PATCH /domains/{uuid}
pub async fn update_domain_user(
    State(state): State<Arc<AppState>>,
    RhIdentity(identity): RhIdentity,
    Path(uuid): Path<String>,
    body: Result<Json<DomainPatchRequest>, JsonRejection>,
) -> Result<Json<DomainResponse>, ApiError> {
    let domain_uuid = parse_uuid(&uuid, "uuid")?;
    let Json(request) = body?;
    let patch = UpdateDomainUser {
        title: request.title,
        description: request.description,
        auto_enrollment_enabled: request.auto_enrollment_enabled,
    };
    let domain = state
        .service
        .update_domain_user(&identity, domain_uuid, patch)
        .await?;
    Ok(Json(domain.into()))
}

/// GET /domains
pub async fn list_domains(
    State(state): State<Arc<AppState>>,
    RhIdentity(identity): RhIdentity,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ListDomainsResponse>, ApiError> {
    let Query(params) = params?;
    let page = state
        .service
        .list_domains(&identity, params.offset, params.limit)
        .await?;
    Ok(Json(ListDomainsResponse {
        meta: ListMeta {
            count: page.total,
            offset: page.offset,
            limit: page.limit,
        },
        data: page.items.into_iter().map(DomainResponse::from).collect(),
    }))
}

/// GET /domains/{uuid}
pub async fn read_domain(
    State(state): State<Arc<AppState>>,
    RhIdentity(identity): RhIdentity,
    Path(uuid): Path<String>,
) -> Result<Json<DomainResponse>, ApiError> {
    let domain_uuid = parse_uuid(&uuid, "uuid")?;
    let domain = state.service.read_domain(&identity, domain_uuid).await?;
    Ok(Json(domain.into()))
}

/// DELETE /domains/{uuid}
pub async fn delete_domain(
    State(state): State<Arc<AppState>>,
    RhIdentity(identity): RhIdentity,
    Path(uuid): Path<String>,
) -> Result<StatusCode, ApiError> {
    let domain_uuid = parse_uuid(&uuid, "uuid")?;
    state.service.delete_domain(&identity, domain_uuid).await?;
    Ok(StatusCode::NO_CONTENT)
}
