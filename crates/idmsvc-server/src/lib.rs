//! idmsvc server: configuration, HTTP boundary and background workers.

pub mod api;
pub mod config;
pub mod worker;

use std::sync::Arc;

use anyhow::{Context, Result};
use idmsvc_db::DbManager;
use idmsvc_db::repository::{SurrealDomainRepository, SurrealHostconfJwkRepository};
use idmsvc_trust::{SecretKeeper, TrustFabricService};
use tracing::info;

pub use api::{AppState, Service, create_router};
pub use config::Config;

/// Connect to the database, apply migrations and derive the secrets.
pub async fn bootstrap(config: &Config) -> Result<Arc<AppState>> {
    let manager = DbManager::connect(&config.db_config())
        .await
        .context("connect to SurrealDB")?;
    let db = manager.client().clone();
    idmsvc_db::run_migrations(&db)
        .await
        .context("run database migrations")?;

    let secrets = SecretKeeper::from_config(&config.secrets.main_secret)
        .context("derive keys from secrets.main_secret")?;
    info!(
        encryption_id = %secrets.wrap_key_id(),
        ephemeral = secrets.is_ephemeral(),
        "Secret keeper ready"
    );

    let service = TrustFabricService::new(
        SurrealDomainRepository::new(db.clone()),
        SurrealHostconfJwkRepository::new(db),
        Arc::new(secrets),
        config.trust_config(),
    );
    Ok(Arc::new(AppState { service }))
}
