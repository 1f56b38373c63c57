//! Host-conf JWK generation, at-rest encryption, and validation.
//!
//! Keys are ES256 (P-256). The private JWK is serialised to JSON and
//! sealed with AES-128-GCM under the wrap key:
//! `nonce (12 bytes) || ciphertext || tag (16 bytes)`, no associated data.

use std::fmt;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use idmsvc_core::models::hostconf_jwk::{HostconfJwk, JwkState};
use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::{EncodedPoint, FieldBytes};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TrustError;
use crate::secrets::SecretKeeper;

pub const KTY_EC: &str = "EC";
pub const CRV_P256: &str = "P-256";
pub const ALG_ES256: &str = "ES256";
pub const USE_SIG: &str = "sig";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KID_LEN: usize = 8;
const COORD_LEN: usize = 32;

/// An EC JWK with the `exp` extension member. `d` is present only on
/// private keys.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default)]
    pub kid: String,
    #[serde(default)]
    pub alg: String,
    #[serde(rename = "use", default)]
    pub key_use: String,
    /// Expiration in Unix seconds.
    pub exp: Option<i64>,
}

impl fmt::Debug for EcJwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcJwk")
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .field("exp", &self.exp)
            .field("private", &self.d.is_some())
            .finish_non_exhaustive()
    }
}

impl EcJwk {
    /// The same key without the private scalar.
    pub fn to_public(&self) -> EcJwk {
        EcJwk {
            d: None,
            ..self.clone()
        }
    }

    pub fn is_private(&self) -> bool {
        self.d.is_some()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    /// Structural validation followed by the expiry check.
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), TrustError> {
        if self.kty != KTY_EC {
            return Err(TrustError::InvalidJwk(format!("invalid key type '{}'", self.kty)));
        }
        if self.crv != CRV_P256 {
            return Err(TrustError::InvalidJwk(format!("invalid curve '{}'", self.crv)));
        }
        if self.kid.is_empty() {
            return Err(TrustError::InvalidJwk("kid is empty".into()));
        }
        if self.key_use != USE_SIG {
            return Err(TrustError::InvalidJwk(format!(
                "invalid key usage '{}'",
                self.key_use
            )));
        }
        if self.alg != ALG_ES256 {
            return Err(TrustError::InvalidJwk(format!("invalid key alg '{}'", self.alg)));
        }
        let verifying = self.verifying_key()?;
        if self.d.is_some() && *self.signing_key()?.verifying_key() != verifying {
            return Err(TrustError::InvalidJwk(
                "private scalar does not match public point".into(),
            ));
        }
        let exp = self
            .exp
            .ok_or_else(|| TrustError::InvalidJwk("missing or invalid 'exp'".into()))?;
        if exp <= now.timestamp() {
            return Err(TrustError::JwkExpired);
        }
        Ok(())
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey, TrustError> {
        let x = decode_coordinate(&self.x, "x")?;
        let y = decode_coordinate(&self.y, "y")?;
        let point = EncodedPoint::from_affine_coordinates(&x, &y, false);
        VerifyingKey::from_encoded_point(&point)
            .map_err(|_| TrustError::InvalidJwk("point is not on P-256".into()))
    }

    pub fn signing_key(&self) -> Result<SigningKey, TrustError> {
        let d = self
            .d
            .as_deref()
            .ok_or_else(|| TrustError::InvalidJwk("not a private key".into()))?;
        let d = URL_SAFE_NO_PAD
            .decode(d)
            .map_err(|_| TrustError::InvalidJwk("'d' is not base64url".into()))?;
        SigningKey::from_slice(&d)
            .map_err(|_| TrustError::InvalidJwk("invalid private scalar".into()))
    }

    pub fn to_json(&self) -> Result<String, TrustError> {
        serde_json::to_string(self).map_err(|e| TrustError::Crypto(format!("JWK encode: {e}")))
    }

    pub fn from_json(src: &[u8]) -> Result<Self, TrustError> {
        serde_json::from_slice(src).map_err(|e| TrustError::InvalidJwk(format!("parse: {e}")))
    }
}

fn decode_coordinate(value: &str, name: &str) -> Result<FieldBytes, TrustError> {
    let raw = URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| TrustError::InvalidJwk(format!("'{name}' is not base64url")))?;
    if raw.len() != COORD_LEN {
        return Err(TrustError::InvalidJwk(format!("'{name}' has wrong length")));
    }
    Ok(FieldBytes::clone_from_slice(&raw))
}

/// RFC 7638 SHA-256 thumbprint of an EC public key, base64url encoded.
pub fn thumbprint(crv: &str, x: &str, y: &str) -> String {
    // Required members in lexicographic order, no whitespace.
    let canonical = format!(r#"{{"crv":"{crv}","kty":"{KTY_EC}","x":"{x}","y":"{y}"}}"#);
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}

/// Generate a new private ES256 JWK expiring at `expires_at`.
pub fn generate(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<EcJwk, TrustError> {
    if expires_at <= now {
        return Err(TrustError::InvalidJwk("expiration must be in the future".into()));
    }
    let signing = SigningKey::random(&mut OsRng);
    let point = signing.verifying_key().to_encoded_point(false);
    let (Some(x), Some(y)) = (point.x(), point.y()) else {
        return Err(TrustError::Crypto("generated point has no coordinates".into()));
    };
    let x = URL_SAFE_NO_PAD.encode(x);
    let y = URL_SAFE_NO_PAD.encode(y);
    let kid: String = thumbprint(CRV_P256, &x, &y).chars().take(KID_LEN).collect();

    Ok(EcJwk {
        kty: KTY_EC.into(),
        crv: CRV_P256.into(),
        x,
        y,
        d: Some(URL_SAFE_NO_PAD.encode(signing.to_bytes())),
        kid,
        alg: ALG_ES256.into(),
        key_use: USE_SIG.into(),
        exp: Some(expires_at.timestamp()),
    })
}

/// Seal a JWK with AES-128-GCM. Returns `nonce || ciphertext || tag`.
pub fn encrypt_jwk(wrap_key: &[u8; 16], jwk: &EcJwk) -> Result<Vec<u8>, TrustError> {
    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(wrap_key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let plaintext = jwk.to_json()?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| TrustError::Crypto(format!("AES-GCM encrypt: {e}")))?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

/// Open a sealed JWK. Does not validate the key.
pub fn decrypt_jwk(wrap_key: &[u8; 16], sealed: &[u8]) -> Result<EcJwk, TrustError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(TrustError::Crypto("encrypted blob is too short".into()));
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(wrap_key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| TrustError::Crypto(format!("AES-GCM decrypt: {e}")))?;
    EcJwk::from_json(&plaintext)
}

/// Generate a key pair and build the row to persist for it.
pub fn new_hostconf_jwk(
    secrets: &SecretKeeper,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<HostconfJwk, TrustError> {
    let private = generate(expires_at, now)?;
    let public_jwk = private.to_public().to_json()?;
    let encrypted = encrypt_jwk(secrets.wrap_key(), &private)?;
    Ok(HostconfJwk {
        key_id: private.kid.clone(),
        expires_at,
        public_jwk,
        encryption_id: secrets.wrap_key_id().to_string(),
        encrypted_jwk: Some(encrypted),
        created_at: now,
        updated_at: now,
    })
}

/// Full state of a stored key, decrypting the private half when the
/// public state allows it. The decrypted key is returned only when the
/// state is [`JwkState::Valid`].
pub fn private_state(
    row: &HostconfJwk,
    secrets: &SecretKeeper,
    now: DateTime<Utc>,
) -> (JwkState, Option<EcJwk>) {
    let state = row.public_state(now);
    if state != JwkState::Valid {
        return (state, None);
    }
    if row.encryption_id != secrets.wrap_key_id() {
        return (JwkState::EncryptionIdMismatch, None);
    }
    let Some(sealed) = row.encrypted_jwk.as_deref() else {
        return (JwkState::Revoked, None);
    };
    let key = match decrypt_jwk(secrets.wrap_key(), sealed) {
        Ok(key) => key,
        Err(_) => return (JwkState::KeyDecryptionFailed, None),
    };
    if !key.is_private() || key.kid != row.key_id {
        return (JwkState::Invalid, None);
    }
    match key.check(now) {
        Ok(()) => (JwkState::Valid, Some(key)),
        Err(TrustError::JwkExpired) => (JwkState::Expired, None),
        Err(_) => (JwkState::Invalid, None),
    }
}

/// Parse a list of public JWK JSON documents, skipping expired keys and
/// failing on any structurally invalid or private one.
pub fn parse_public_keys<S: AsRef<str>>(
    keys: &[S],
    now: DateTime<Utc>,
) -> Result<Vec<EcJwk>, TrustError> {
    let mut out = Vec::with_capacity(keys.len());
    for (i, raw) in keys.iter().enumerate() {
        let key = EcJwk::from_json(raw.as_ref().as_bytes())?;
        if key.is_private() {
            return Err(TrustError::InvalidJwk(format!("key {i}: private key material")));
        }
        match key.check(now) {
            Ok(()) => out.push(key),
            Err(TrustError::JwkExpired) => continue,
            Err(e) => return Err(TrustError::InvalidJwk(format!("key {i}: {e}"))),
        }
    }
    Ok(out)
}
