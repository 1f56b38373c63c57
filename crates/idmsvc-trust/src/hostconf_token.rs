//! Host-conf token building and multi-key signing.
//!
//! The token is a JWT serialised as general JSON JWS (RFC 7515 §7.2.1):
//! one shared `payload` and one `signatures` entry per signing key, so an
//! IdM server can verify with whichever published key it already has.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use p256::ecdsa::Signature;
use p256::ecdsa::signature::Signer;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TrustError;
use crate::jwk::{ALG_ES256, EcJwk};

pub const TOKEN_ISSUER: &str = "idmsvc/v1";
pub const AUD_JOIN_HOST: &str = "join host";

/// Random bytes in the `jti` claim (48 bits).
const JTI_LEN: usize = 6;

/// Claims carried by a host-conf token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostconfTokenClaims {
    pub iss: String,
    /// Host subscription-manager id.
    pub sub: String,
    pub aud: Vec<String>,
    pub jti: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    /// Tenant (organization) id.
    pub rhorg: String,
    /// Host inventory id.
    pub rhinvid: String,
    /// Host fully qualified domain name.
    pub rhfqdn: String,
    /// Uuid of the domain the host is allowed to join.
    pub rhdomid: String,
}

impl HostconfTokenClaims {
    pub fn new(
        rhsm_id: Uuid,
        org_id: &str,
        inventory_id: Uuid,
        fqdn: &str,
        domain_uuid: Uuid,
        validity: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let mut rng = rand::rng();
        let jti: [u8; JTI_LEN] = rand::Rng::random(&mut rng);
        let iat = now.timestamp();
        Self {
            iss: TOKEN_ISSUER.into(),
            sub: rhsm_id.to_string(),
            aud: vec![AUD_JOIN_HOST.into()],
            jti: URL_SAFE_NO_PAD.encode(jti),
            iat,
            nbf: iat,
            exp: iat + validity.num_seconds(),
            rhorg: org_id.into(),
            rhinvid: inventory_id.to_string(),
            rhfqdn: fqdn.into(),
            rhdomid: domain_uuid.to_string(),
        }
    }
}

/// General JSON JWS serialisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonJws {
    pub payload: String,
    pub signatures: Vec<JwsSignature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwsSignature {
    pub protected: String,
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProtectedHeader {
    pub alg: String,
    pub kid: String,
}

/// Sign `claims` with every key in `keys`, returning the JSON JWS text.
pub fn sign(claims: &HostconfTokenClaims, keys: &[EcJwk]) -> Result<String, TrustError> {
    if keys.is_empty() {
        return Err(TrustError::NoSigningKeys);
    }
    let payload_json = serde_json::to_vec(claims)
        .map_err(|e| TrustError::Crypto(format!("claims encode: {e}")))?;
    let payload = URL_SAFE_NO_PAD.encode(payload_json);

    let mut signatures = Vec::with_capacity(keys.len());
    for key in keys {
        if key.alg != ALG_ES256 {
            return Err(TrustError::InvalidJwk(format!(
                "unsupported signing algorithm '{}'",
                key.alg
            )));
        }
        let signing_key = key.signing_key()?;
        let header = ProtectedHeader {
            alg: key.alg.clone(),
            kid: key.kid.clone(),
        };
        let header_json = serde_json::to_vec(&header)
            .map_err(|e| TrustError::Crypto(format!("header encode: {e}")))?;
        let protected = URL_SAFE_NO_PAD.encode(header_json);

        let signing_input = format!("{protected}.{payload}");
        let signature: Signature = signing_key.sign(signing_input.as_bytes());
        signatures.push(JwsSignature {
            protected,
            signature: URL_SAFE_NO_PAD.encode(signature.to_bytes()),
        });
    }

    serde_json::to_string(&JsonJws {
        payload,
        signatures,
    })
    .map_err(|e| TrustError::Crypto(format!("JWS encode: {e}")))
}
