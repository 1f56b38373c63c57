//! Main secret handling and sub-key derivation.
//!
//! One configured secret feeds every symmetric use in the service. Each
//! use gets its own HKDF-SHA256 expansion with a distinct info label.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hkdf::Hkdf;
use sha2::Sha256;
use tracing::warn;

use crate::error::TrustError;

const HKDF_SALT: &[u8] = b"idmsvc-backend";
const INFO_DOMAIN_REG_KEY: &[u8] = b"domain registration key";
const INFO_WRAP_KEY_ID: &[u8] = b"hostconf JWK encryption id";
const INFO_WRAP_KEY: &[u8] = b"hostconf JWK encryption key";

/// Minimum decoded length of a configured main secret.
pub const MIN_MAIN_SECRET_LEN: usize = 16;

/// Length of a generated main secret.
const GENERATED_SECRET_LEN: usize = 32;

/// Derived key material. Immutable once built; share it behind an `Arc`.
pub struct SecretKeeper {
    domain_reg_key: [u8; 32],
    wrap_key: [u8; 16],
    wrap_key_id: String,
    ephemeral: bool,
}

impl SecretKeeper {
    /// Build from the configured main secret (base64url without
    /// padding). An empty value or the literal `random` generates an
    /// ephemeral secret.
    pub fn from_config(main_secret: &str) -> Result<Self, TrustError> {
        let main_secret = main_secret.trim();
        if main_secret.is_empty() || main_secret == "random" {
            warn!(
                "No main secret configured; generated an ephemeral one. \
                 Keys wrapped by other instances or earlier runs are unusable."
            );
            return Self::ephemeral();
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(main_secret)
            .map_err(|_| TrustError::Secret("not base64url without padding".into()))?;
        Self::from_bytes(&bytes)
    }

    /// Build from raw main secret bytes.
    pub fn from_bytes(main_secret: &[u8]) -> Result<Self, TrustError> {
        if main_secret.len() < MIN_MAIN_SECRET_LEN {
            return Err(TrustError::Secret(format!(
                "must be at least {MIN_MAIN_SECRET_LEN} bytes"
            )));
        }
        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), main_secret);

        let mut domain_reg_key = [0u8; 32];
        hk.expand(INFO_DOMAIN_REG_KEY, &mut domain_reg_key)
            .map_err(|e| TrustError::Crypto(format!("HKDF expand: {e}")))?;

        let mut wrap_key_id = [0u8; 8];
        hk.expand(INFO_WRAP_KEY_ID, &mut wrap_key_id)
            .map_err(|e| TrustError::Crypto(format!("HKDF expand: {e}")))?;

        let mut wrap_key = [0u8; 16];
        hk.expand(INFO_WRAP_KEY, &mut wrap_key)
            .map_err(|e| TrustError::Crypto(format!("HKDF expand: {e}")))?;

        Ok(Self {
            domain_reg_key,
            wrap_key,
            wrap_key_id: hex::encode(wrap_key_id),
            ephemeral: false,
        })
    }

    /// Random main secret; the instance cannot share wrapped keys with
    /// any other process.
    pub fn ephemeral() -> Result<Self, TrustError> {
        let mut rng = rand::rng();
        let bytes: [u8; GENERATED_SECRET_LEN] = rand::Rng::random(&mut rng);
        let mut keeper = Self::from_bytes(&bytes)?;
        keeper.ephemeral = true;
        Ok(keeper)
    }

    /// HMAC key for domain registration tokens.
    pub fn signing_key(&self) -> &[u8; 32] {
        &self.domain_reg_key
    }

    /// AES-128-GCM key wrapping private host-conf JWKs.
    pub fn wrap_key(&self) -> &[u8; 16] {
        &self.wrap_key
    }

    /// Public identifier of [`Self::wrap_key`], stored next to every
    /// ciphertext.
    pub fn wrap_key_id(&self) -> &str {
        &self.wrap_key_id
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }
}

impl fmt::Debug for SecretKeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeeper")
            .field("wrap_key_id", &self.wrap_key_id)
            .field("ephemeral", &self.ephemeral)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// base64url of the bytes 0x00..=0x1f.
    const MAIN_SECRET: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8";

    #[test]
    fn derivation_is_pinned() {
        let keeper = SecretKeeper::from_config(MAIN_SECRET).unwrap();
        assert_eq!(
            hex::encode(keeper.signing_key()),
            "e0fc751de123d9b9c950b4125686ac127bc458620e02fa72ad61b16433d1610f"
        );
        assert_eq!(keeper.wrap_key_id(), "57d17106d8a8e1c3");
        assert_eq!(
            hex::encode(keeper.wrap_key()),
            "82f10056854a60f5af4945fb8516a0cd"
        );
        assert!(!keeper.is_ephemeral());
    }

    #[test]
    fn short_secret_rejected() {
        let short = URL_SAFE_NO_PAD.encode([7u8; 15]);
        assert!(matches!(
            SecretKeeper::from_config(&short),
            Err(TrustError::Secret(_))
        ));
    }

    #[test]
    fn padded_or_standard_base64_rejected() {
        assert!(SecretKeeper::from_config("AAECAwQFBgcICQoLDA0ODw==").is_err());
        assert!(SecretKeeper::from_config("not+base64/url").is_err());
    }

    #[test]
    fn empty_or_random_generates_ephemeral() {
        let a = SecretKeeper::from_config("").unwrap();
        let b = SecretKeeper::from_config("random").unwrap();
        assert!(a.is_ephemeral() && b.is_ephemeral());
        assert_ne!(a.wrap_key_id(), b.wrap_key_id());
    }

    #[test]
    fn debug_never_prints_key_bytes() {
        let keeper = SecretKeeper::from_config(MAIN_SECRET).unwrap();
        let out = format!("{keeper:?}");
        assert!(!out.contains("e0fc751d"));
        assert!(!out.contains("82f10056"));
        assert!(out.contains("57d17106d8a8e1c3"));
    }
}
