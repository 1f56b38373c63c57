//! Domain registration tokens.
//!
//! Wire format: `base64url(expiry_ns as u64 BE) "." base64url(mac)`,
//! both without padding, where
//! `mac = HMAC-SHA256(key, personality || domain_type || org_id || payload)`.
//!
//! The token also names the domain it will register:
//! `domain_uuid = uuid_v5(NAMESPACE_IDMSVC, token)`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use idmsvc_core::models::domain::DomainType;
use sha2::Sha256;
use uuid::Uuid;

use crate::error::TrustError;

type HmacSha256 = Hmac<Sha256>;

/// `uuid_v5(NAMESPACE_URL, "https://console.redhat.com/api/idmsvc")`.
pub const NAMESPACE_IDMSVC: Uuid = Uuid::from_bytes([
    0x29, 0x78, 0xcc, 0x95, 0x31, 0xc8, 0x50, 0x3d, 0xba, 0x8f, 0x58, 0x19, 0x11, 0xb6, 0xbe, 0xa0,
]);

/// Domain-separation label mixed into the MAC.
const PERSONALITY: &[u8] = b"register domain";

/// Tokens longer than this are rejected before any decoding.
pub const MAX_TOKEN_LEN: usize = 100;

/// A freshly minted registration token.
#[derive(Debug, Clone)]
pub struct DomainRegToken {
    pub token: String,
    /// Uuid the registered domain will carry.
    pub domain_uuid: Uuid,
    /// Expiry in nanoseconds since the Unix epoch.
    pub expiration_ns: u64,
}

impl DomainRegToken {
    /// Expiry truncated to whole seconds since the Unix epoch.
    pub fn expiration_secs(&self) -> u64 {
        self.expiration_ns / 1_000_000_000
    }
}

/// Derive the domain uuid a token will register.
pub fn domain_uuid_for(token: &str) -> Uuid {
    Uuid::new_v5(&NAMESPACE_IDMSVC, token.as_bytes())
}

/// Mint a token for `org_id` valid for `validity` from now.
pub fn mint(
    key: &[u8],
    org_id: &str,
    domain_type: DomainType,
    validity: Duration,
) -> Result<DomainRegToken, TrustError> {
    mint_at(key, org_id, domain_type, validity, Utc::now())
}

/// Mint a token as if the current time were `now`.
pub fn mint_at(
    key: &[u8],
    org_id: &str,
    domain_type: DomainType,
    validity: Duration,
    now: DateTime<Utc>,
) -> Result<DomainRegToken, TrustError> {
    if org_id.is_empty() {
        return Err(TrustError::MintRequest("'org_id' must not be empty".into()));
    }
    if validity <= Duration::zero() {
        return Err(TrustError::MintRequest("token validity must be positive".into()));
    }
    let expires = now + validity;
    let expiration_ns = expires
        .timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .ok_or_else(|| TrustError::Crypto("token expiry out of range".into()))?;

    let payload = expiration_ns.to_be_bytes();
    let mac = mac_for(key, domain_type, org_id, &payload)?.finalize().into_bytes();

    let token = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload),
        URL_SAFE_NO_PAD.encode(mac)
    );
    let domain_uuid = domain_uuid_for(&token);
    Ok(DomainRegToken {
        token,
        domain_uuid,
        expiration_ns,
    })
}

/// Verify a token against the caller's tenant and the requested
/// domain type, returning the bound domain uuid.
pub fn verify(
    key: &[u8],
    org_id: &str,
    domain_type: DomainType,
    token: &str,
) -> Result<Uuid, TrustError> {
    verify_at(key, org_id, domain_type, token, Utc::now())
}

/// Verify a token as if the current time were `now`.
pub fn verify_at(
    key: &[u8],
    org_id: &str,
    domain_type: DomainType,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Uuid, TrustError> {
    let expiration_ns = parse(key, domain_type, org_id, token)?;
    let now_ns = now
        .timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .unwrap_or(u64::MAX);
    if now_ns > expiration_ns {
        return Err(TrustError::TokenExpired);
    }
    Ok(domain_uuid_for(token))
}

/// Check length, shape and MAC; return the embedded expiry.
fn parse(
    key: &[u8],
    domain_type: DomainType,
    org_id: &str,
    token: &str,
) -> Result<u64, TrustError> {
    if token.len() > MAX_TOKEN_LEN {
        return Err(TrustError::TokenTooLong);
    }
    let mut parts = token.split('.');
    let (Some(payload_b64), Some(mac_b64), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(TrustError::TokenFormat);
    };
    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| TrustError::TokenBase64)?;
    let mac = URL_SAFE_NO_PAD
        .decode(mac_b64)
        .map_err(|_| TrustError::TokenBase64)?;

    mac_for(key, domain_type, org_id, &payload)?
        .verify_slice(&mac)
        .map_err(|_| TrustError::TokenSignature)?;

    let payload: [u8; 8] = payload.try_into().map_err(|_| TrustError::TokenFormat)?;
    Ok(u64::from_be_bytes(payload))
}

fn mac_for(
    key: &[u8],
    domain_type: DomainType,
    org_id: &str,
    payload: &[u8],
) -> Result<HmacSha256, TrustError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| TrustError::Crypto(format!("HMAC init: {e}")))?;
    mac.update(PERSONALITY);
    mac.update(domain_type.as_str().as_bytes());
    mac.update(org_id.as_bytes());
    mac.update(payload);
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use idmsvc_core::error::IdmsvcError;

    /// HKDF "domain registration key" derived from the bytes 0x00..=0x1f.
    const KEY_HEX: &str = "e0fc751de123d9b9c950b4125686ac127bc458620e02fa72ad61b16433d1610f";
    const ORG_ID: &str = "12345";

    fn key() -> Vec<u8> {
        hex::decode(KEY_HEX).unwrap()
    }

    #[test]
    fn namespace_is_derived_from_service_url() {
        let derived = Uuid::new_v5(
            &Uuid::NAMESPACE_URL,
            b"https://console.redhat.com/api/idmsvc",
        );
        assert_eq!(derived, NAMESPACE_IDMSVC);
        assert_eq!(
            NAMESPACE_IDMSVC.to_string(),
            "2978cc95-31c8-503d-ba8f-581911b6bea0"
        );
    }

    #[test]
    fn wire_format_is_pinned() {
        // 2030-01-01T00:00:00Z
        let expires = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let now = expires - Duration::hours(1);
        let tok = mint_at(&key(), ORG_ID, DomainType::RhelIdm, Duration::hours(1), now).unwrap();
        assert_eq!(tok.expiration_ns, 1_893_456_000_000_000_000);
        assert_eq!(tok.expiration_secs(), 1_893_456_000);
        assert_eq!(
            tok.token,
            "GkboMzXVAAA.zfgc_jwStdfsIhfNuAkahpHumbWw4OKUZQPF4p5CG-w"
        );
        assert_eq!(
            tok.domain_uuid.to_string(),
            "4bcf4104-a14c-5b8c-a8bd-9e3b44cbb8f3"
        );
    }

    #[test]
    fn mint_then_verify_returns_same_uuid() {
        let tok = mint(&key(), ORG_ID, DomainType::RhelIdm, Duration::hours(1)).unwrap();
        let uuid = verify(&key(), ORG_ID, DomainType::RhelIdm, &tok.token).unwrap();
        assert_eq!(uuid, tok.domain_uuid);
        assert_eq!(uuid, domain_uuid_for(&tok.token));
        assert!(tok.token.len() <= MAX_TOKEN_LEN);
    }

    #[test]
    fn other_tenant_is_rejected() {
        let tok = mint(&key(), ORG_ID, DomainType::RhelIdm, Duration::hours(1)).unwrap();
        assert!(matches!(
            verify(&key(), "67890", DomainType::RhelIdm, &tok.token),
            Err(TrustError::TokenSignature)
        ));
    }

    #[test]
    fn other_key_is_rejected() {
        let tok = mint(&key(), ORG_ID, DomainType::RhelIdm, Duration::hours(1)).unwrap();
        assert!(matches!(
            verify(&[0u8; 32], ORG_ID, DomainType::RhelIdm, &tok.token),
            Err(TrustError::TokenSignature)
        ));
    }

    #[test]
    fn expiry_boundary() {
        let now = Utc::now();
        let tok = mint_at(&key(), ORG_ID, DomainType::RhelIdm, Duration::hours(1), now).unwrap();
        let at_expiry = now + Duration::hours(1);
        assert!(verify_at(&key(), ORG_ID, DomainType::RhelIdm, &tok.token, at_expiry).is_ok());
        assert!(matches!(
            verify_at(
                &key(),
                ORG_ID,
                DomainType::RhelIdm,
                &tok.token,
                at_expiry + Duration::nanoseconds(1)
            ),
            Err(TrustError::TokenExpired)
        ));
    }

    #[test]
    fn overlong_token_rejected_before_mac() {
        // Valid-looking shape but too long; must fail on length alone.
        let token = format!("{}.{}", "A".repeat(60), "B".repeat(60));
        assert!(matches!(
            verify(&key(), ORG_ID, DomainType::RhelIdm, &token),
            Err(TrustError::TokenTooLong)
        ));
    }

    #[test]
    fn malformed_tokens_rejected() {
        let k = key();
        let t = DomainType::RhelIdm;
        assert!(matches!(verify(&k, ORG_ID, t, "nodot"), Err(TrustError::TokenFormat)));
        assert!(matches!(verify(&k, ORG_ID, t, "a.b.c"), Err(TrustError::TokenFormat)));
        assert!(matches!(verify(&k, ORG_ID, t, "!!.??"), Err(TrustError::TokenBase64)));
        assert!(matches!(verify(&k, ORG_ID, t, "AAAA.AAAA"), Err(TrustError::TokenSignature)));
    }

    #[test]
    fn mint_preconditions() {
        assert!(matches!(
            mint(&key(), "", DomainType::RhelIdm, Duration::hours(1)),
            Err(TrustError::MintRequest(_))
        ));
        let err = mint(&key(), ORG_ID, DomainType::RhelIdm, Duration::zero()).unwrap_err();
        assert!(matches!(IdmsvcError::from(err), IdmsvcError::BadInput { .. }));
    }
}
