//! Caller identity envelope.
//!
//! Authentication happens upstream; the gateway forwards the result as a
//! base64-encoded JSON document in the `X-Rh-Identity` header. The core
//! treats the decoded value as an opaque capability and never re-derives
//! trust from it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{IdmsvcError, IdmsvcResult};

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User { org_id: String, username: String },
    ServiceAccount { org_id: String, client_id: String },
    /// A host or IdM server authenticated by its system certificate.
    System { org_id: String, common_name: String },
}

impl Identity {
    pub fn org_id(&self) -> &str {
        match self {
            Identity::User { org_id, .. }
            | Identity::ServiceAccount { org_id, .. }
            | Identity::System { org_id, .. } => org_id,
        }
    }

    /// Tenant id of a user or service account caller.
    pub fn require_user(&self) -> IdmsvcResult<&str> {
        match self {
            Identity::User { org_id, .. } | Identity::ServiceAccount { org_id, .. } => Ok(org_id),
            Identity::System { .. } => Err(IdmsvcError::bad_input(
                "identity type 'System' is not accepted for this operation",
            )),
        }
    }

    /// Tenant id and certificate CN of a system caller. The CN must be
    /// a subscription-manager uuid.
    pub fn require_system(&self) -> IdmsvcResult<(&str, Uuid)> {
        match self {
            Identity::System {
                org_id,
                common_name,
            } => {
                let cn = Uuid::parse_str(common_name).map_err(|_| {
                    IdmsvcError::bad_input(format!(
                        "system common name '{common_name}' is not a uuid"
                    ))
                })?;
                Ok((org_id, cn))
            }
            _ => Err(IdmsvcError::bad_input(
                "only identity type 'System' is accepted for this operation",
            )),
        }
    }

    /// Decode the raw `X-Rh-Identity` header value.
    pub fn from_header(value: &str) -> IdmsvcResult<Self> {
        let raw = STANDARD
            .decode(value.trim())
            .map_err(|_| IdmsvcError::bad_input("identity header is not valid base64"))?;
        let envelope: XRhIdentity = serde_json::from_slice(&raw)
            .map_err(|e| IdmsvcError::bad_input(format!("identity header is not valid: {e}")))?;
        envelope.identity.try_into()
    }
}

#[derive(Debug, Deserialize)]
struct XRhIdentity {
    identity: IdentityBody,
}

#[derive(Debug, Deserialize)]
struct IdentityBody {
    #[serde(default)]
    org_id: String,
    #[serde(rename = "type")]
    kind: String,
    user: Option<UserBody>,
    system: Option<SystemBody>,
    service_account: Option<ServiceAccountBody>,
}

#[derive(Debug, Deserialize)]
struct UserBody {
    #[serde(default)]
    username: String,
}

#[derive(Debug, Deserialize)]
struct SystemBody {
    cn: String,
}

#[derive(Debug, Deserialize)]
struct ServiceAccountBody {
    #[serde(default)]
    client_id: String,
}

impl TryFrom<IdentityBody> for Identity {
    type Error = IdmsvcError;

    fn try_from(body: IdentityBody) -> Result<Self, Self::Error> {
        if body.org_id.is_empty() {
            return Err(IdmsvcError::bad_input("identity has no org_id"));
        }
        match body.kind.as_str() {
            "User" => Ok(Identity::User {
                org_id: body.org_id,
                username: body.user.map(|u| u.username).unwrap_or_default(),
            }),
            "ServiceAccount" => Ok(Identity::ServiceAccount {
                org_id: body.org_id,
                client_id: body.service_account.map(|s| s.client_id).unwrap_or_default(),
            }),
            "System" => {
                let system = body
                    .system
                    .ok_or_else(|| IdmsvcError::bad_input("system identity has no 'system' body"))?;
                if system.cn.is_empty() {
                    return Err(IdmsvcError::bad_input("system identity has an empty cn"));
                }
                Ok(Identity::System {
                    org_id: body.org_id,
                    common_name: system.cn,
                })
            }
            other => Err(IdmsvcError::bad_input(format!(
                "identity type '{other}' is not supported"
            ))),
        }
    }
}
