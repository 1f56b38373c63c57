//! SurrealDB implementation of [`HostconfJwkRepository`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use idmsvc_core::error::IdmsvcResult;
use idmsvc_core::models::hostconf_jwk::HostconfJwk;
use idmsvc_core::repository::HostconfJwkRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;

use crate::error::{CONFLICT, DbError, check_tx};

#[derive(Debug, SurrealValue)]
struct HostconfJwkRowWithId {
    record_id: String,
    expires_at: DateTime<Utc>,
    public_jwk: String,
    encryption_id: String,
    encrypted_jwk: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl HostconfJwkRowWithId {
    fn try_into_jwk(self) -> Result<HostconfJwk, DbError> {
        let encrypted_jwk = self
            .encrypted_jwk
            .map(|b64| STANDARD.decode(b64))
            .transpose()
            .map_err(|e| DbError::Corrupt(format!("invalid encrypted JWK encoding: {e}")))?;
        Ok(HostconfJwk {
            key_id: self.record_id,
            expires_at: self.expires_at,
            public_jwk: self.public_jwk,
            encryption_id: self.encryption_id,
            encrypted_jwk,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the host-conf JWK repository.
#[derive(Clone)]
pub struct SurrealHostconfJwkRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealHostconfJwkRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn get(&self, key_id: &str) -> Result<HostconfJwk, DbError> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('hostconf_jwk', $kid) \
                 WHERE deleted_at IS NONE",
            )
            .bind(("kid", key_id.to_string()))
            .await?;
        let rows: Vec<HostconfJwkRowWithId> = result.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound {
                entity: "hostconf_jwk".into(),
                id: key_id.to_string(),
            })?
            .try_into_jwk()
    }
}

impl<C: Connection> HostconfJwkRepository for SurrealHostconfJwkRepository<C> {
    async fn insert(&self, jwk: HostconfJwk) -> IdmsvcResult<HostconfJwk> {
        let mut response = self
            .db
            .query(
                "BEGIN TRANSACTION;
                 IF array::len((SELECT VALUE meta::id(id) \
                     FROM type::record('hostconf_jwk', $kid))) > 0 \
                     { THROW $dup_msg; };
                 CREATE type::record('hostconf_jwk', $kid) SET \
                     expires_at = $expires_at, public_jwk = $public_jwk, \
                     encryption_id = $encryption_id, \
                     encrypted_jwk = $encrypted_jwk, \
                     created_at = $created_at, updated_at = $updated_at;
                 COMMIT TRANSACTION;",
            )
            .bind(("kid", jwk.key_id.clone()))
            .bind(("expires_at", jwk.expires_at))
            .bind(("public_jwk", jwk.public_jwk))
            .bind(("encryption_id", jwk.encryption_id))
            .bind(("encrypted_jwk", jwk.encrypted_jwk.map(|b| STANDARD.encode(b))))
            .bind(("created_at", jwk.created_at))
            .bind(("updated_at", jwk.updated_at))
            .bind((
                "dup_msg",
                format!("{CONFLICT} key id '{}' already exists", jwk.key_id),
            ))
            .await
            .map_err(DbError::from)?;
        check_tx(response.take_errors(), "hostconf_jwk", &jwk.key_id)?;

        self.get(&jwk.key_id).await.map_err(Into::into)
    }

    async fn revoke(&self, key_id: &str) -> IdmsvcResult<HostconfJwk> {
        let current = self.get(key_id).await?;
        if current.encrypted_jwk.is_none() {
            return Ok(current);
        }

        self.db
            .query(
                "UPDATE type::record('hostconf_jwk', $kid) \
                 SET encrypted_jwk = NONE, updated_at = $now \
                 WHERE deleted_at IS NONE",
            )
            .bind(("kid", key_id.to_string()))
            .bind(("now", Utc::now()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        self.get(key_id).await.map_err(Into::into)
    }

    async fn list(&self) -> IdmsvcResult<Vec<HostconfJwk>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM hostconf_jwk \
                 WHERE deleted_at IS NONE ORDER BY record_id ASC",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<HostconfJwkRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|row| row.try_into_jwk())
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> IdmsvcResult<Vec<HostconfJwk>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM hostconf_jwk \
                 WHERE expires_at <= $now ORDER BY record_id ASC;
                 DELETE hostconf_jwk WHERE expires_at <= $now;",
            )
            .bind(("now", now))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<HostconfJwkRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|row| row.try_into_jwk())
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }
}
