//! Domain match engine: picks the single realm a host may join.

use idmsvc_core::error::{IdmsvcError, IdmsvcResult};
use idmsvc_core::models::domain::{Domain, DomainFilter};
use idmsvc_core::repository::DomainRepository;
use tracing::debug;

/// Select the unique enrollable domain of `org_id` for a host.
///
/// Candidates are the tenant's domains matching every hint in `filter`
/// with auto-enrollment explicitly enabled. With `filter_by_fqdn`, a
/// candidate must also list a realm domain covering `fqdn`. The result
/// has its realm data preloaded and is checked to be enrollable.
pub async fn match_domain<D: DomainRepository>(
    repo: &D,
    org_id: &str,
    fqdn: &str,
    filter: &DomainFilter,
    filter_by_fqdn: bool,
) -> IdmsvcResult<Domain> {
    // 1. Load candidates by hints.
    let mut candidates = repo.find_candidates(org_id, filter).await?;

    // 2. Only domains opted in to auto-enrollment.
    candidates.retain(Domain::is_enrollment_enabled);

    // 3. Optional fqdn suffix filter; needs realm data.
    if filter_by_fqdn {
        let mut loaded = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let domain = repo.find_by_uuid(org_id, candidate.domain_uuid).await?;
            if domain
                .rhel_idm
                .as_ref()
                .is_some_and(|idm| idm.covers_fqdn(fqdn))
            {
                loaded.push(domain);
            }
        }
        candidates = loaded;
    }

    // 4. Require exactly one.
    let chosen = select_unique(candidates)?;
    debug!(domain_uuid = %chosen.domain_uuid, org_id, fqdn, "Matched domain for host");

    // 5. Preload and check shape.
    let domain = if chosen.rhel_idm.is_some() {
        chosen
    } else {
        repo.find_by_uuid(org_id, chosen.domain_uuid).await?
    };
    check_enrollable(&domain)?;
    Ok(domain)
}

/// Exactly one candidate, never the first of many.
pub fn select_unique(mut candidates: Vec<Domain>) -> IdmsvcResult<Domain> {
    match candidates.len() {
        0 => Err(IdmsvcError::NotFound {
            message: "no matching domains".into(),
        }),
        1 => Ok(candidates.remove(0)),
        n => Err(IdmsvcError::conflict(format!(
            "matched {n} domains, only one expected"
        ))),
    }
}

/// A realm without CA certificates or enrollment servers cannot be
/// joined.
pub fn check_enrollable(domain: &Domain) -> IdmsvcResult<()> {
    let Some(idm) = domain.rhel_idm.as_ref() else {
        return Err(IdmsvcError::InvariantViolation(format!(
            "domain '{}' has no realm data",
            domain.domain_uuid
        )));
    };
    if idm.ca_certs.is_empty() {
        return Err(IdmsvcError::InvariantViolation(format!(
            "domain '{}' has no CA certificates",
            domain.domain_uuid
        )));
    }
    if idm.enrollment_servers().next().is_none() {
        return Err(IdmsvcError::InvariantViolation(format!(
            "domain '{}' has no enrollment servers",
            domain.domain_uuid
        )));
    }
    Ok(())
}
