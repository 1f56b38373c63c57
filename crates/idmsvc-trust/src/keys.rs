//! Host-conf JWK store: lifecycle, classification and rotation.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use idmsvc_core::error::{IdmsvcError, IdmsvcResult};
use idmsvc_core::models::hostconf_jwk::{HostconfJwk, JwkState};
use idmsvc_core::repository::HostconfJwkRepository;
use tracing::{debug, info, warn};

use crate::config::TrustConfig;
use crate::jwk::{self, EcJwk};
use crate::secrets::SecretKeeper;

/// A stored key together with its state as seen by this process.
#[derive(Debug, Clone)]
pub struct KeyStatus {
    pub key_id: String,
    pub state: JwkState,
    pub expires_at: DateTime<Utc>,
    pub encryption_id: String,
}

/// Public key set for the signing keys endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicKeySet {
    /// Public JWK JSON documents.
    pub keys: Vec<String>,
    pub revoked_kids: Vec<String>,
}

/// Outcome of one refresh run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub purged: usize,
    pub valid: usize,
    pub expired: usize,
    pub revoked: usize,
    /// Key id of the key generated during this run, if any.
    pub generated: Option<String>,
}

/// Host-conf JWK service.
///
/// Generic over the repository so the key logic does not depend on the
/// database crate.
pub struct HostconfJwkService<K: HostconfJwkRepository> {
    repo: K,
    secrets: Arc<SecretKeeper>,
    config: TrustConfig,
}

impl<K: HostconfJwkRepository> HostconfJwkService<K> {
    pub fn new(repo: K, secrets: Arc<SecretKeeper>, config: TrustConfig) -> Self {
        Self {
            repo,
            secrets,
            config,
        }
    }

    /// Generate a key pair expiring at `expires_at` and persist it.
    pub async fn generate(&self, expires_at: DateTime<Utc>) -> IdmsvcResult<HostconfJwk> {
        let now = Utc::now();
        let row = jwk::new_hostconf_jwk(&self.secrets, expires_at, now)?;
        let row = self.repo.insert(row).await?;
        info!(
            kid = %row.key_id,
            expires_at = %row.expires_at,
            "Generated host-conf JWK"
        );
        Ok(row)
    }

    /// Destroy the private half of a key. The public half stays
    /// published in the revoked list until the key expires.
    pub async fn revoke(&self, key_id: &str) -> IdmsvcResult<HostconfJwk> {
        let row = self.repo.revoke(key_id).await?;
        info!(kid = %row.key_id, "Revoked host-conf JWK");
        Ok(row)
    }

    /// Every stored key with its state for this process.
    pub async fn list(&self) -> IdmsvcResult<Vec<KeyStatus>> {
        let now = Utc::now();
        let rows = self.repo.list().await?;
        Ok(rows
            .iter()
            .map(|row| {
                let (state, _) = jwk::private_state(row, &self.secrets, now);
                KeyStatus {
                    key_id: row.key_id.clone(),
                    state,
                    expires_at: row.expires_at,
                    encryption_id: row.encryption_id.clone(),
                }
            })
            .collect())
    }

    pub async fn purge_expired(&self) -> IdmsvcResult<Vec<HostconfJwk>> {
        let purged = self.repo.purge_expired(Utc::now()).await?;
        for row in &purged {
            info!(kid = %row.key_id, expires_at = %row.expires_at, "Purged expired host-conf JWK");
        }
        Ok(purged)
    }

    /// Public JWKs of valid keys wrapped under our secret, plus the ids
    /// of revoked keys.
    pub async fn public_keys(&self) -> IdmsvcResult<PublicKeySet> {
        let now = Utc::now();
        let rows = self.repo.list().await?;
        let mut set = PublicKeySet::default();
        for row in rows {
            match row.public_state(now) {
                JwkState::Valid if row.encryption_id == self.secrets.wrap_key_id() => {
                    set.keys.push(row.public_jwk);
                }
                JwkState::Revoked => set.revoked_kids.push(row.key_id),
                _ => {}
            }
        }
        // Never publish a malformed or private document.
        jwk::parse_public_keys(&set.keys, now)?;
        Ok(set)
    }

    /// Decrypted private keys usable for signing right now. Keys that
    /// are not valid for this process are skipped.
    pub async fn private_signing_keys(&self) -> IdmsvcResult<Vec<EcJwk>> {
        let now = Utc::now();
        let rows = self.repo.list().await?;
        let mut keys = Vec::with_capacity(rows.len());
        for row in &rows {
            match jwk::private_state(row, &self.secrets, now) {
                (JwkState::Valid, Some(key)) => keys.push(key),
                (state, _) => debug!(kid = %row.key_id, %state, "Skipping host-conf JWK"),
            }
        }
        Ok(keys)
    }

    /// Purge expired keys and generate a new one unless a usable key
    /// outlives the renewal threshold.
    pub async fn refresh(&self) -> IdmsvcResult<RefreshReport> {
        self.refresh_at(Utc::now()).await
    }

    pub async fn refresh_at(&self, now: DateTime<Utc>) -> IdmsvcResult<RefreshReport> {
        // 1. Drop what can no longer be used or published.
        let purged = self.repo.purge_expired(now).await?;

        // 2. Classify the remaining keys.
        let rows = self.repo.list().await?;
        let mut report = RefreshReport {
            purged: purged.len(),
            ..Default::default()
        };
        let renew_before = now + self.config.hostconf_jwk_renewal_threshold();
        let mut has_long_lived = false;
        for row in &rows {
            let (state, _) = jwk::private_state(row, &self.secrets, now);
            match state {
                JwkState::Valid => {
                    report.valid += 1;
                    if row.expires_at >= renew_before {
                        has_long_lived = true;
                    }
                }
                JwkState::Expired => report.expired += 1,
                JwkState::Revoked => report.revoked += 1,
                other => warn!(kid = %row.key_id, state = %other, "Unusable host-conf JWK"),
            }
        }

        // 3. Rotate.
        if !has_long_lived {
            let expires_at = now.trunc_subsecs(0) + self.config.hostconf_jwk_validity();
            let row = jwk::new_hostconf_jwk(&self.secrets, expires_at, now)?;
            let row = self.repo.insert(row).await?;
            report.valid += 1;
            report.generated = Some(row.key_id);
        }

        info!(
            purged = report.purged,
            valid = report.valid,
            expired = report.expired,
            revoked = report.revoked,
            generated = report.generated.as_deref().unwrap_or("-"),
            "Refreshed host-conf JWKs"
        );
        Ok(report)
    }

    /// Signing keys for a host-conf token; an empty set is a server
    /// error.
    pub async fn require_signing_keys(&self) -> IdmsvcResult<Vec<EcJwk>> {
        let keys = self.private_signing_keys().await?;
        if keys.is_empty() {
            return Err(IdmsvcError::Internal("no keys available".into()));
        }
        Ok(keys)
    }
}
