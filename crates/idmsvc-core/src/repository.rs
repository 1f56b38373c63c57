//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. The domain repository is
//! tenant-scoped: every method takes the `org_id` explicitly and every
//! read or write filters on it. Host-conf keys are process-wide.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::IdmsvcResult;
use crate::models::domain::{
    CreateDomain, Domain, DomainFilter, UpdateAgentDomain, UpdateDomainUser,
};
use crate::models::hostconf_jwk::HostconfJwk;

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 10,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Domains (tenant scope)
// ---------------------------------------------------------------------------

pub trait DomainRepository: Send + Sync {
    /// Page of the tenant's live domains ordered by creation time.
    /// Children are not loaded.
    fn list(
        &self,
        org_id: &str,
        pagination: Pagination,
    ) -> impl Future<Output = IdmsvcResult<PaginatedResult<Domain>>> + Send;

    /// A single domain with its realm data preloaded.
    fn find_by_uuid(
        &self,
        org_id: &str,
        domain_uuid: Uuid,
    ) -> impl Future<Output = IdmsvcResult<Domain>> + Send;

    /// Domains matching every provided hint exactly. Children are not
    /// loaded.
    fn find_candidates(
        &self,
        org_id: &str,
        filter: &DomainFilter,
    ) -> impl Future<Output = IdmsvcResult<Vec<Domain>>> + Send;

    /// Insert the domain and its realm children in one transaction.
    /// Auto-enrollment is always stored as `false`.
    fn register(
        &self,
        org_id: &str,
        input: CreateDomain,
    ) -> impl Future<Output = IdmsvcResult<Domain>> + Send;

    /// Replace realm state on behalf of the update server identified by
    /// `caller`. Preconditions are checked inside the write transaction.
    fn update_agent(
        &self,
        org_id: &str,
        domain_uuid: Uuid,
        caller: Uuid,
        input: UpdateAgentDomain,
    ) -> impl Future<Output = IdmsvcResult<Domain>> + Send;

    fn update_user(
        &self,
        org_id: &str,
        domain_uuid: Uuid,
        input: UpdateDomainUser,
    ) -> impl Future<Output = IdmsvcResult<Domain>> + Send;

    /// Soft-delete the domain and its children.
    fn delete_by_uuid(
        &self,
        org_id: &str,
        domain_uuid: Uuid,
    ) -> impl Future<Output = IdmsvcResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Host-conf JWKs (global scope)
// ---------------------------------------------------------------------------

pub trait HostconfJwkRepository: Send + Sync {
    /// Persist a new key. Duplicate key ids are rejected.
    fn insert(&self, jwk: HostconfJwk) -> impl Future<Output = IdmsvcResult<HostconfJwk>> + Send;

    /// Clear the private key material. Idempotent.
    fn revoke(&self, key_id: &str) -> impl Future<Output = IdmsvcResult<HostconfJwk>> + Send;

    /// Every stored key ordered by key id, whatever its state.
    fn list(&self) -> impl Future<Output = IdmsvcResult<Vec<HostconfJwk>>> + Send;

    /// Remove and return keys with `expires_at <= now`.
    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = IdmsvcResult<Vec<HostconfJwk>>> + Send;
}
