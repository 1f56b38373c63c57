//! Trust fabric orchestration: registration tokens, domain lifecycle and
//! host-conf issuance.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use idmsvc_core::error::{IdmsvcError, IdmsvcResult};
use idmsvc_core::identity::Identity;
use idmsvc_core::models::domain::{
    CreateDomain, Domain, DomainFilter, DomainType, IdmDomain, UpdateAgentDomain,
    UpdateDomainUser,
};
use idmsvc_core::repository::{
    DomainRepository, HostconfJwkRepository, PaginatedResult, Pagination,
};
use tracing::info;
use uuid::Uuid;

use crate::config::TrustConfig;
use crate::domain_token::{self, DomainRegToken};
use crate::hostconf_token::{self, HostconfTokenClaims};
use crate::keys::{HostconfJwkService, PublicKeySet};
use crate::matcher;
use crate::secrets::SecretKeeper;

/// Domain body sent by an IdM server on register and update.
#[derive(Debug, Clone)]
pub struct DomainInput {
    pub domain_name: String,
    pub domain_type: DomainType,
    pub title: Option<String>,
    pub description: Option<String>,
    pub rhel_idm: Option<IdmDomain>,
}

/// Result of a registration token request.
#[derive(Debug, Clone)]
pub struct RegistrationToken {
    pub token: String,
    pub domain_uuid: Uuid,
    pub domain_type: DomainType,
    /// Unix seconds.
    pub expiration: u64,
}

/// Result of a host-conf request.
#[derive(Debug, Clone)]
pub struct HostConf {
    /// Matched domain with realm data loaded.
    pub domain: Domain,
    /// JSON JWS host-conf token.
    pub token: String,
}

/// Trust fabric service.
///
/// Generic over repository implementations so that the trust layer
/// has no dependency on the database crate.
pub struct TrustFabricService<D: DomainRepository, K: HostconfJwkRepository> {
    domains: D,
    keys: HostconfJwkService<K>,
    secrets: Arc<SecretKeeper>,
    config: TrustConfig,
}

impl<D: DomainRepository, K: HostconfJwkRepository> TrustFabricService<D, K> {
    pub fn new(domains: D, jwks: K, secrets: Arc<SecretKeeper>, config: TrustConfig) -> Self {
        let keys = HostconfJwkService::new(jwks, Arc::clone(&secrets), config.clone());
        Self {
            domains,
            keys,
            secrets,
            config,
        }
    }

    /// Host-conf JWK store, for the refresh worker and admin commands.
    pub fn keys(&self) -> &HostconfJwkService<K> {
        &self.keys
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Mint a registration token for the caller's tenant.
    pub async fn create_domain_token(
        &self,
        identity: &Identity,
        domain_type: DomainType,
    ) -> IdmsvcResult<RegistrationToken> {
        let org_id = identity.require_user()?;
        let minted: DomainRegToken = domain_token::mint(
            self.secrets.signing_key(),
            org_id,
            domain_type,
            self.config.token_expiration(),
        )?;
        info!(
            org_id,
            domain_uuid = %minted.domain_uuid,
            %domain_type,
            "Issued domain registration token"
        );
        Ok(RegistrationToken {
            expiration: minted.expiration_secs(),
            token: minted.token,
            domain_uuid: minted.domain_uuid,
            domain_type,
        })
    }

    /// Register a domain under a registration token presented by one of
    /// the realm's update servers.
    pub async fn register_domain(
        &self,
        identity: &Identity,
        token: &str,
        input: DomainInput,
    ) -> IdmsvcResult<Domain> {
        let (org_id, caller) = identity.require_system()?;

        // 1. Verify the token; it names the domain.
        let domain_uuid = domain_token::verify(
            self.secrets.signing_key(),
            org_id,
            input.domain_type,
            token,
        )?;

        // 2. Build the aggregate.
        let rhel_idm = require_realm(&input)?;
        validate_realm(&rhel_idm)?;
        if !rhel_idm.has_update_server(caller) {
            return Err(IdmsvcError::bad_input(format!(
                "caller '{caller}' is not listed as an update server"
            )));
        }
        let title = input
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| input.domain_name.clone());
        let create = CreateDomain {
            domain_uuid,
            domain_name: input.domain_name,
            domain_type: input.domain_type,
            title: Some(title),
            description: Some(input.description.unwrap_or_default()),
            rhel_idm,
        };

        // 3. Persist.
        let domain = self.domains.register(org_id, create).await?;
        info!(
            org_id,
            domain_uuid = %domain.domain_uuid,
            domain_name = %domain.domain_name,
            "Registered domain"
        );
        Ok(domain)
    }

    /// Replace realm state on behalf of an update server.
    pub async fn update_domain_agent(
        &self,
        identity: &Identity,
        domain_uuid: Uuid,
        input: DomainInput,
    ) -> IdmsvcResult<Domain> {
        let (org_id, caller) = identity.require_system()?;
        let rhel_idm = require_realm(&input)?;
        validate_realm(&rhel_idm)?;
        if !rhel_idm.has_update_server(caller) {
            return Err(IdmsvcError::bad_input(format!(
                "caller '{caller}' is not listed as an update server"
            )));
        }
        let update = UpdateAgentDomain {
            domain_name: input.domain_name,
            domain_type: input.domain_type,
            rhel_idm,
        };
        let domain = self
            .domains
            .update_agent(org_id, domain_uuid, caller, update)
            .await?;
        info!(org_id, %domain_uuid, %caller, "Updated domain from agent");
        Ok(domain)
    }

    pub async fn update_domain_user(
        &self,
        identity: &Identity,
        domain_uuid: Uuid,
        patch: UpdateDomainUser,
    ) -> IdmsvcResult<Domain> {
        let org_id = identity.require_user()?;
        if patch.is_empty() {
            return Err(IdmsvcError::bad_input("no fields to update"));
        }
        let domain = self.domains.update_user(org_id, domain_uuid, patch).await?;
        info!(
            org_id,
            %domain_uuid,
            auto_enrollment_enabled = ?domain.auto_enrollment_enabled,
            "Patched domain"
        );
        Ok(domain)
    }

    /// Page of the caller's domains. A missing or zero limit takes the
    /// configured default; larger limits are clamped to the maximum.
    pub async fn list_domains(
        &self,
        identity: &Identity,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> IdmsvcResult<PaginatedResult<Domain>> {
        let org_id = identity.require_user()?;
        let pagination = self.pagination(offset, limit);
        let page = self.domains.list(org_id, pagination).await?;
        if page.total > 0 && pagination.offset >= page.total {
            return Err(IdmsvcError::bad_input(format!(
                "offset {} is out of range (total {})",
                pagination.offset, page.total
            )));
        }
        Ok(page)
    }

    pub async fn read_domain(
        &self,
        identity: &Identity,
        domain_uuid: Uuid,
    ) -> IdmsvcResult<Domain> {
        self.domains
            .find_by_uuid(identity.org_id(), domain_uuid)
            .await
    }

    pub async fn delete_domain(&self, identity: &Identity, domain_uuid: Uuid) -> IdmsvcResult<()> {
        let org_id = identity.require_user()?;
        self.domains.delete_by_uuid(org_id, domain_uuid).await?;
        info!(org_id, %domain_uuid, "Deleted domain");
        Ok(())
    }

    /// Match the calling host to a domain and issue a host-conf token.
    pub async fn host_conf(
        &self,
        identity: &Identity,
        inventory_id: Uuid,
        fqdn: &str,
        hints: &DomainFilter,
    ) -> IdmsvcResult<HostConf> {
        let (org_id, rhsm_id) = identity.require_system()?;
        let fqdn = fqdn.trim();
        if fqdn.is_empty() {
            return Err(IdmsvcError::bad_input("fqdn must not be empty"));
        }

        // 1. Match.
        let domain = matcher::match_domain(
            &self.domains,
            org_id,
            fqdn,
            hints,
            self.config.filter_by_fqdn,
        )
        .await?;

        // 2. Signing keys.
        let keys = self.keys.require_signing_keys().await?;

        // 3. Build and sign.
        let claims = HostconfTokenClaims::new(
            rhsm_id,
            org_id,
            inventory_id,
            fqdn,
            domain.domain_uuid,
            self.config.hostconf_token_validity(),
            Utc::now(),
        );
        let token = hostconf_token::sign(&claims, &keys)?;
        info!(
            org_id,
            %inventory_id,
            fqdn,
            domain_uuid = %domain.domain_uuid,
            signatures = keys.len(),
            "Issued host-conf token"
        );
        Ok(HostConf { domain, token })
    }

    /// Published public keys and revoked key ids.
    pub async fn signing_keys(&self) -> IdmsvcResult<PublicKeySet> {
        self.keys.public_keys().await
    }

    fn pagination(&self, offset: Option<u64>, limit: Option<u64>) -> Pagination {
        let limit = match limit {
            None | Some(0) => self.config.pagination_default_limit,
            Some(l) => l.min(self.config.pagination_max_limit),
        };
        Pagination {
            offset: offset.unwrap_or(0),
            limit,
        }
    }
}

fn require_realm(input: &DomainInput) -> IdmsvcResult<IdmDomain> {
    if input.domain_name.trim().is_empty() {
        return Err(IdmsvcError::bad_input("'domain_name' must not be empty"));
    }
    match (input.domain_type, &input.rhel_idm) {
        (DomainType::RhelIdm, Some(idm)) => Ok(idm.clone()),
        (DomainType::RhelIdm, None) => Err(IdmsvcError::bad_input(
            "'rhel_idm' is required for domain type 'rhel-idm'",
        )),
    }
}

fn validate_realm(idm: &IdmDomain) -> IdmsvcResult<()> {
    if idm.realm_name.trim().is_empty() {
        return Err(IdmsvcError::bad_input("'realm_name' must not be empty"));
    }
    if idm.servers.iter().any(|s| s.fqdn.trim().is_empty()) {
        return Err(IdmsvcError::bad_input("server 'fqdn' must not be empty"));
    }
    for server in &idm.servers {
        let Some(location) = &server.location else {
            continue;
        };
        if !idm.locations.iter().any(|l| &l.name == location) {
            return Err(IdmsvcError::bad_input(format!(
                "server '{}' references unknown location '{location}'",
                server.fqdn
            )));
        }
    }
    let mut seen = HashSet::new();
    for id in idm.servers.iter().filter_map(|s| s.subscription_manager_id) {
        if !seen.insert(id) {
            return Err(IdmsvcError::conflict(format!(
                "subscription manager id '{id}' is listed by more than one server"
            )));
        }
    }
    Ok(())
}
