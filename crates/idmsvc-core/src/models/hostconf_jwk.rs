//! Host-conf signing key models.
//!
//! Keys are process-wide (not tenant-scoped). The public half is stored
//! as cleartext JWK JSON; the private half is AES-GCM encrypted under a
//! wrap key derived from the main secret.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a stored key, derived on read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum JwkState {
    Valid,
    Expired,
    Revoked,
    Invalid,
    /// Wrapped under another instance's main secret.
    EncryptionIdMismatch,
    KeyDecryptionFailed,
}

impl fmt::Display for JwkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JwkState::Valid => "valid",
            JwkState::Expired => "expired",
            JwkState::Revoked => "revoked",
            JwkState::Invalid => "invalid",
            JwkState::EncryptionIdMismatch => "encryptionIdMismatch",
            JwkState::KeyDecryptionFailed => "keyDecryptionFailed",
        };
        f.write_str(s)
    }
}

/// A persisted host-conf JWK.
#[derive(Debug, Clone, PartialEq)]
pub struct HostconfJwk {
    pub key_id: String,
    pub expires_at: DateTime<Utc>,
    /// Public JWK as JSON text.
    pub public_jwk: String,
    /// Identifier of the wrap key that produced `encrypted_jwk`.
    pub encryption_id: String,
    /// `nonce || ciphertext || tag`. Cleared when the key is revoked.
    pub encrypted_jwk: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HostconfJwk {
    /// State computable without the wrap key.
    pub fn public_state(&self, now: DateTime<Utc>) -> JwkState {
        if self.public_jwk.is_empty() || self.key_id.is_empty() {
            JwkState::Invalid
        } else if self.expires_at <= now {
            JwkState::Expired
        } else if self.encrypted_jwk.is_none() {
            JwkState::Revoked
        } else {
            JwkState::Valid
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key(expires_in: Duration, encrypted: Option<Vec<u8>>) -> HostconfJwk {
        let now = Utc::now();
        HostconfJwk {
            key_id: "abcd1234".into(),
            expires_at: now + expires_in,
            public_jwk: "{}".into(),
            encryption_id: "0011223344556677".into(),
            encrypted_jwk: encrypted,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn public_state_classification() {
        let now = Utc::now();
        assert_eq!(
            key(Duration::hours(1), Some(vec![1])).public_state(now),
            JwkState::Valid
        );
        assert_eq!(
            key(Duration::hours(1), None).public_state(now),
            JwkState::Revoked
        );
        assert_eq!(
            key(-Duration::hours(1), None).public_state(now),
            JwkState::Expired
        );

        let mut k = key(Duration::hours(1), Some(vec![1]));
        k.public_jwk.clear();
        assert_eq!(k.public_state(now), JwkState::Invalid);
    }

    #[test]
    fn expiry_is_inclusive() {
        let k = key(Duration::zero(), Some(vec![1]));
        assert!(k.is_expired(k.expires_at));
    }

    #[test]
    fn state_display_names() {
        assert_eq!(JwkState::EncryptionIdMismatch.to_string(), "encryptionIdMismatch");
        assert_eq!(JwkState::Valid.to_string(), "valid");
    }
}
