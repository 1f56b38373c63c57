//! Domain (realm registration) models.
//!
//! A [`Domain`] is owned by a tenant (`org_id`) and, for `rhel-idm`
//! domains, exclusively owns an [`IdmDomain`] which in turn owns the CA
//! certificates, servers and locations reported by the realm.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IdmsvcError;

/// Kind of identity domain. Only `rhel-idm` is registered today.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DomainType {
    #[serde(rename = "rhel-idm")]
    RhelIdm,
}

impl DomainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainType::RhelIdm => "rhel-idm",
        }
    }
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainType {
    type Err = IdmsvcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rhel-idm" => Ok(DomainType::RhelIdm),
            other => Err(IdmsvcError::bad_input(format!(
                "unsupported domain type '{other}'"
            ))),
        }
    }
}

/// A tenant-owned realm registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Domain {
    pub domain_uuid: Uuid,
    /// Owning tenant.
    pub org_id: String,
    /// Primary DNS domain of the realm.
    pub domain_name: String,
    pub domain_type: DomainType,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Tri-state: `None` means never decided.
    pub auto_enrollment_enabled: Option<bool>,
    /// Present iff `domain_type` is `rhel-idm` and children were loaded.
    pub rhel_idm: Option<IdmDomain>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Domain {
    /// Hosts may only auto-enrol into domains explicitly opted in.
    pub fn is_enrollment_enabled(&self) -> bool {
        self.auto_enrollment_enabled == Some(true)
    }
}

/// Realm-specific data for a `rhel-idm` domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IdmDomain {
    pub realm_name: String,
    pub realm_domains: Vec<String>,
    pub ca_certs: Vec<CaCert>,
    pub servers: Vec<Server>,
    pub locations: Vec<Location>,
}

impl IdmDomain {
    /// Whether `common_name` is listed as an `hcc_update_server`.
    pub fn has_update_server(&self, common_name: Uuid) -> bool {
        self.servers
            .iter()
            .any(|s| s.hcc_update_server && s.subscription_manager_id == Some(common_name))
    }

    /// Servers that may enrol hosts.
    pub fn enrollment_servers(&self) -> impl Iterator<Item = &Server> {
        self.servers.iter().filter(|s| s.hcc_enrollment_server)
    }

    /// Concatenated PEM bundle of all CA certificates, each block
    /// terminated by a newline.
    pub fn ca_bundle(&self) -> String {
        let mut bundle = String::new();
        for cert in &self.ca_certs {
            bundle.push_str(&cert.pem);
            if !cert.pem.ends_with('\n') {
                bundle.push('\n');
            }
        }
        bundle
    }

    /// Whether `fqdn` is equal to, or a subdomain of, one of the realm
    /// domains.
    pub fn covers_fqdn(&self, fqdn: &str) -> bool {
        let fqdn = fqdn.trim_end_matches('.').to_ascii_lowercase();
        self.realm_domains.iter().any(|d| {
            let d = d.trim_end_matches('.').to_ascii_lowercase();
            fqdn == d || fqdn.ends_with(&format!(".{d}"))
        })
    }
}

/// PEM-encoded X.509 CA certificate trusted by the realm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaCert {
    pub nickname: String,
    pub issuer: String,
    pub subject: String,
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub pem: String,
}

/// A registered realm server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Server {
    pub fqdn: String,
    /// Subscription-manager id; also the CN of the server's certificate.
    pub subscription_manager_id: Option<Uuid>,
    pub location: Option<String>,
    pub ca_server: bool,
    pub hcc_enrollment_server: bool,
    pub hcc_update_server: bool,
    pub pkinit_server: bool,
}

/// Named site tag within a realm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub name: String,
    pub description: Option<String>,
}

/// Fields required to register a new domain under a verified
/// registration token.
#[derive(Debug, Clone)]
pub struct CreateDomain {
    /// Must be the uuid derived from the consumed registration token.
    pub domain_uuid: Uuid,
    pub domain_name: String,
    pub domain_type: DomainType,
    pub title: Option<String>,
    pub description: Option<String>,
    pub rhel_idm: IdmDomain,
}

/// Realm state pushed by an authorised update server.
#[derive(Debug, Clone)]
pub struct UpdateAgentDomain {
    pub domain_name: String,
    pub domain_type: DomainType,
    pub rhel_idm: IdmDomain,
}

/// Fields a tenant user may patch. All other fields are read-only.
#[derive(Debug, Clone, Default)]
pub struct UpdateDomainUser {
    pub title: Option<String>,
    pub description: Option<String>,
    pub auto_enrollment_enabled: Option<bool>,
}

impl UpdateDomainUser {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.auto_enrollment_enabled.is_none()
    }
}

/// Exact-match hints narrowing the candidate domains of a tenant.
#[derive(Debug, Clone, Default)]
pub struct DomainFilter {
    pub domain_uuid: Option<Uuid>,
    pub domain_name: Option<String>,
    pub domain_type: Option<DomainType>,
}
