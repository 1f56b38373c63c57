//! Server configuration.
//!
//! Built from serde defaults, overlaid by an optional YAML file named by
//! `IDMSVC_CONFIG`, then by `IDMSVC_*` environment variables, and finally
//! validated. Core crates only ever see the plain structs produced by
//! [`Config::trust_config`] and [`Config::db_config`].

use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use idmsvc_db::DbConfig;
use idmsvc_trust::{SecretKeeper, TrustConfig};
use serde::Deserialize;

pub const CONFIG_PATH_ENV: &str = "IDMSVC_CONFIG";

const HOUR: u64 = 3600;
const DAY: u64 = 24 * HOUR;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub web: WebConfig,
    pub database: DatabaseConfig,
    pub pagination: PaginationConfig,
    /// Registration token lifetime.
    pub token_expiration_seconds: u64,
    pub hostconf_jwk: HostconfJwkConfig,
    pub hostconf_token: HostconfTokenConfig,
    pub secrets: SecretsConfig,
    #[serde(rename = "match")]
    pub matching: MatchConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web: WebConfig::default(),
            database: DatabaseConfig::default(),
            pagination: PaginationConfig::default(),
            token_expiration_seconds: 2 * HOUR,
            hostconf_jwk: HostconfJwkConfig::default(),
            hostconf_token: HostconfTokenConfig::default(),
            secrets: SecretsConfig::default(),
            matching: MatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_addr: SocketAddr,
    pub size_limit_request_header: usize,
    pub size_limit_request_body: usize,
    pub request_timeout_secs: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            size_limit_request_header: 32 * 1024,
            size_limit_request_body: 128 * 1024,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let db = DbConfig::default();
        Self {
            url: db.url,
            namespace: db.namespace,
            database: db.database,
            username: db.username,
            password: db.password,
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url)
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostconfJwkConfig {
    pub validity_secs: u64,
    pub renewal_threshold_secs: u64,
    pub refresh_interval_secs: u64,
}

impl Default for HostconfJwkConfig {
    fn default() -> Self {
        Self {
            validity_secs: 7 * DAY,
            renewal_threshold_secs: DAY,
            refresh_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostconfTokenConfig {
    pub validity_secs: u64,
}

impl Default for HostconfTokenConfig {
    fn default() -> Self {
        Self {
            validity_secs: HOUR,
        }
    }
}

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Base64url main secret. Empty or `random` generates one per process.
    pub main_secret: String,
}

impl fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = if self.main_secret.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("SecretsConfig")
            .field("main_secret", &shown)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub filter_by_fqdn: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: true,
        }
    }
}

impl Config {
    /// Defaults, then the YAML file named by `IDMSVC_CONFIG`, then the
    /// environment, then [`Config::validate`].
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("read {CONFIG_PATH_ENV}: {path}"))?;
                Self::from_yaml(&contents)?
            }
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).with_context(|| "parse idmsvc config yaml")
    }

    /// Overlay `IDMSVC_*` variables returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvOverlay { lookup };

        env.parse("IDMSVC_WEB_BIND_ADDR", &mut self.web.bind_addr)?;
        env.parse(
            "IDMSVC_WEB_SIZE_LIMIT_REQUEST_HEADER",
            &mut self.web.size_limit_request_header,
        )?;
        env.parse(
            "IDMSVC_WEB_SIZE_LIMIT_REQUEST_BODY",
            &mut self.web.size_limit_request_body,
        )?;
        env.parse(
            "IDMSVC_WEB_REQUEST_TIMEOUT_SECS",
            &mut self.web.request_timeout_secs,
        )?;

        env.string("IDMSVC_DATABASE_URL", &mut self.database.url);
        env.string("IDMSVC_DATABASE_NAMESPACE", &mut self.database.namespace);
        env.string("IDMSVC_DATABASE_DATABASE", &mut self.database.database);
        env.string("IDMSVC_DATABASE_USERNAME", &mut self.database.username);
        env.string("IDMSVC_DATABASE_PASSWORD", &mut self.database.password);

        env.parse(
            "IDMSVC_PAGINATION_DEFAULT_LIMIT",
            &mut self.pagination.default_limit,
        )?;
        env.parse("IDMSVC_PAGINATION_MAX_LIMIT", &mut self.pagination.max_limit)?;
        env.parse(
            "IDMSVC_TOKEN_EXPIRATION_SECONDS",
            &mut self.token_expiration_seconds,
        )?;

        env.parse(
            "IDMSVC_HOSTCONF_JWK_VALIDITY_SECS",
            &mut self.hostconf_jwk.validity_secs,
        )?;
        env.parse(
            "IDMSVC_HOSTCONF_JWK_RENEWAL_THRESHOLD_SECS",
            &mut self.hostconf_jwk.renewal_threshold_secs,
        )?;
        env.parse(
            "IDMSVC_HOSTCONF_JWK_REFRESH_INTERVAL_SECS",
            &mut self.hostconf_jwk.refresh_interval_secs,
        )?;
        env.parse(
            "IDMSVC_HOSTCONF_TOKEN_VALIDITY_SECS",
            &mut self.hostconf_token.validity_secs,
        )?;

        env.string("IDMSVC_SECRETS_MAIN_SECRET", &mut self.secrets.main_secret);
        env.parse(
            "IDMSVC_MATCH_FILTER_BY_FQDN",
            &mut self.matching.filter_by_fqdn,
        )?;
        env.string("IDMSVC_LOGGING_LEVEL", &mut self.logging.level);
        env.parse("IDMSVC_LOGGING_JSON", &mut self.logging.json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.web.size_limit_request_header == 0 {
            bail!("web.size_limit_request_header must be greater than 0");
        }
        if self.web.size_limit_request_body == 0 {
            bail!("web.size_limit_request_body must be greater than 0");
        }
        if self.web.request_timeout_secs == 0 {
            bail!("web.request_timeout_secs must be greater than 0");
        }
        if self.database.url.is_empty() {
            bail!("database.url must not be empty");
        }

        let pagination = &self.pagination;
        if pagination.max_limit == 0 {
            bail!("pagination.max_limit must be at least 1");
        }
        if pagination.default_limit == 0 || pagination.default_limit > pagination.max_limit {
            bail!(
                "pagination.default_limit must be between 1 and {}",
                pagination.max_limit
            );
        }

        let expiration = self.token_expiration_seconds;
        if !(600..=DAY).contains(&expiration) {
            bail!("token_expiration_seconds must be between 600 and {DAY}");
        }

        let jwk = &self.hostconf_jwk;
        if jwk.renewal_threshold_secs < HOUR {
            bail!("hostconf_jwk.renewal_threshold_secs must be at least {HOUR}");
        }
        if jwk.validity_secs <= jwk.renewal_threshold_secs + HOUR {
            bail!("hostconf_jwk.validity_secs must exceed the renewal threshold by more than 1h");
        }
        if jwk.refresh_interval_secs == 0 {
            bail!("hostconf_jwk.refresh_interval_secs must be greater than 0");
        }
        if self.hostconf_token.validity_secs == 0 {
            bail!("hostconf_token.validity_secs must be greater than 0");
        }

        let secret = self.secrets.main_secret.trim();
        if !secret.is_empty() && secret != "random" {
            SecretKeeper::from_config(secret).context("secrets.main_secret")?;
        }
        Ok(())
    }

    pub fn trust_config(&self) -> TrustConfig {
        TrustConfig {
            token_expiration_secs: self.token_expiration_seconds,
            hostconf_jwk_validity_secs: self.hostconf_jwk.validity_secs,
            hostconf_jwk_renewal_threshold_secs: self.hostconf_jwk.renewal_threshold_secs,
            hostconf_token_validity_secs: self.hostconf_token.validity_secs,
            pagination_default_limit: self.pagination.default_limit,
            pagination_max_limit: self.pagination.max_limit,
            filter_by_fqdn: self.matching.filter_by_fqdn,
        }
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            url: self.database.url.clone(),
            namespace: self.database.namespace.clone(),
            database: self.database.database.clone(),
            username: self.database.username.clone(),
            password: self.database.password.clone(),
        }
    }
}

struct EnvOverlay<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvOverlay<F> {
    fn string(&self, key: &str, target: &mut String) {
        if let Some(value) = (self.lookup)(key) {
            *target = value;
        }
    }

    fn parse<T>(&self, key: &str, target: &mut T) -> Result<()>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        if let Some(value) = (self.lookup)(key) {
            *target = value
                .trim()
                .parse()
                .with_context(|| format!("parse {key}"))?;
        }
        Ok(())
    }
}
