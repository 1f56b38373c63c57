//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as
//! strings. Business tables carry `created_at`, `updated_at` and an
//! optional `deleted_at`; rows with `deleted_at` set are invisible to
//! repository reads.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Domains (tenant scope, record id = domain uuid)
-- =======================================================================
DEFINE TABLE domain SCHEMAFULL;
DEFINE FIELD org_id ON TABLE domain TYPE string \
    ASSERT string::len($value) > 0;
DEFINE FIELD domain_name ON TABLE domain TYPE string;
DEFINE FIELD domain_type ON TABLE domain TYPE string \
    ASSERT $value IN ['rhel-idm'];
DEFINE FIELD title ON TABLE domain TYPE option<string>;
DEFINE FIELD description ON TABLE domain TYPE option<string>;
DEFINE FIELD auto_enrollment_enabled ON TABLE domain TYPE option<bool>;
DEFINE FIELD created_at ON TABLE domain TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE domain TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD deleted_at ON TABLE domain TYPE option<datetime>;
DEFINE INDEX idx_domain_org ON TABLE domain COLUMNS org_id, created_at;

-- =======================================================================
-- IdM realm data (1:1 with domain, record id = domain uuid)
-- =======================================================================
DEFINE TABLE idm_domain SCHEMAFULL;
DEFINE FIELD org_id ON TABLE idm_domain TYPE string;
DEFINE FIELD domain_id ON TABLE idm_domain TYPE string;
DEFINE FIELD realm_name ON TABLE idm_domain TYPE string;
DEFINE FIELD realm_domains ON TABLE idm_domain TYPE array;
DEFINE FIELD realm_domains.* ON TABLE idm_domain TYPE string;
DEFINE FIELD created_at ON TABLE idm_domain TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE idm_domain TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD deleted_at ON TABLE idm_domain TYPE option<datetime>;

-- =======================================================================
-- CA certificates (owned by idm_domain)
-- =======================================================================
DEFINE TABLE ca_cert SCHEMAFULL;
DEFINE FIELD org_id ON TABLE ca_cert TYPE string;
DEFINE FIELD domain_id ON TABLE ca_cert TYPE string;
DEFINE FIELD position ON TABLE ca_cert TYPE int;
DEFINE FIELD nickname ON TABLE ca_cert TYPE string;
DEFINE FIELD issuer ON TABLE ca_cert TYPE string;
DEFINE FIELD subject ON TABLE ca_cert TYPE string;
DEFINE FIELD serial_number ON TABLE ca_cert TYPE string;
DEFINE FIELD not_before ON TABLE ca_cert TYPE datetime;
DEFINE FIELD not_after ON TABLE ca_cert TYPE datetime;
DEFINE FIELD pem ON TABLE ca_cert TYPE string;
DEFINE FIELD created_at ON TABLE ca_cert TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE ca_cert TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD deleted_at ON TABLE ca_cert TYPE option<datetime>;
DEFINE INDEX idx_ca_cert_domain ON TABLE ca_cert COLUMNS domain_id;

-- =======================================================================
-- Servers (owned by idm_domain)
-- =======================================================================
DEFINE TABLE server SCHEMAFULL;
DEFINE FIELD org_id ON TABLE server TYPE string;
DEFINE FIELD domain_id ON TABLE server TYPE string;
DEFINE FIELD position ON TABLE server TYPE int;
DEFINE FIELD fqdn ON TABLE server TYPE string;
DEFINE FIELD subscription_manager_id ON TABLE server TYPE option<string>;
DEFINE FIELD location ON TABLE server TYPE option<string>;
DEFINE FIELD ca_server ON TABLE server TYPE bool DEFAULT false;
DEFINE FIELD hcc_enrollment_server ON TABLE server TYPE bool \
    DEFAULT false;
DEFINE FIELD hcc_update_server ON TABLE server TYPE bool DEFAULT false;
DEFINE FIELD pkinit_server ON TABLE server TYPE bool DEFAULT false;
DEFINE FIELD created_at ON TABLE server TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE server TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD deleted_at ON TABLE server TYPE option<datetime>;
-- Mirrors subscription_manager_id while the row is live; cleared on soft
-- delete so retired rows never hold an id. NONE is not indexed.
DEFINE FIELD live_rhsm_id ON TABLE server TYPE option<string>;
DEFINE INDEX idx_server_domain ON TABLE server COLUMNS domain_id;
DEFINE INDEX idx_server_live_rhsm_id ON TABLE server \
    COLUMNS live_rhsm_id UNIQUE;

-- =======================================================================
-- Locations (owned by idm_domain)
-- =======================================================================
DEFINE TABLE location SCHEMAFULL;
DEFINE FIELD org_id ON TABLE location TYPE string;
DEFINE FIELD domain_id ON TABLE location TYPE string;
DEFINE FIELD position ON TABLE location TYPE int;
DEFINE FIELD name ON TABLE location TYPE string;
DEFINE FIELD description ON TABLE location TYPE option<string>;
DEFINE FIELD created_at ON TABLE location TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE location TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD deleted_at ON TABLE location TYPE option<datetime>;
DEFINE INDEX idx_location_domain ON TABLE location COLUMNS domain_id;

-- =======================================================================
-- Host-conf JWKs (global scope, record id = key id)
-- =======================================================================
DEFINE TABLE hostconf_jwk SCHEMAFULL;
DEFINE FIELD expires_at ON TABLE hostconf_jwk TYPE datetime;
DEFINE FIELD public_jwk ON TABLE hostconf_jwk TYPE string;
DEFINE FIELD encryption_id ON TABLE hostconf_jwk TYPE string;
-- base64 of nonce || AES-GCM ciphertext; NONE once revoked.
DEFINE FIELD encrypted_jwk ON TABLE hostconf_jwk TYPE option<string>;
DEFINE FIELD created_at ON TABLE hostconf_jwk TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE hostconf_jwk TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD deleted_at ON TABLE hostconf_jwk TYPE option<datetime>;
DEFINE INDEX idx_hostconf_jwk_expires ON TABLE hostconf_jwk \
    COLUMNS expires_at;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(version = migration.version, "Migration applied");
        }
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(window[0].version < window[1].version);
        }
    }

    #[test]
    fn every_business_table_supports_soft_delete() {
        for table in ["domain", "idm_domain", "ca_cert", "server", "location", "hostconf_jwk"] {
            let ddl = format!("DEFINE FIELD deleted_at ON TABLE {table} TYPE option<datetime>;");
            assert!(SCHEMA_V1.contains(&ddl), "{table} lacks deleted_at");
        }
    }

    #[test]
    fn live_subscription_manager_ids_are_uniquely_indexed() {
        assert!(SCHEMA_V1.contains("COLUMNS live_rhsm_id UNIQUE;"));
    }
}
