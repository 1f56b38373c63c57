//! Trust fabric configuration.

use chrono::Duration;

/// Configuration for the trust fabric service.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    /// Registration token lifetime in seconds (default: 7200).
    pub token_expiration_secs: u64,
    /// Lifetime of a newly generated host-conf JWK (default: 7 days).
    pub hostconf_jwk_validity_secs: u64,
    /// A new JWK is generated when no valid key outlives
    /// `now + threshold` (default: 24 hours).
    pub hostconf_jwk_renewal_threshold_secs: u64,
    /// Host-conf token lifetime in seconds (default: 3600).
    pub hostconf_token_validity_secs: u64,
    /// Page size used when the caller sends none (default: 10).
    pub pagination_default_limit: u64,
    /// Upper bound for the page size (default: 1000).
    pub pagination_max_limit: u64,
    /// Drop match candidates whose realm domains do not cover the host
    /// fqdn (default: off).
    pub filter_by_fqdn: bool,
}

impl TrustConfig {
    pub fn token_expiration(&self) -> Duration {
        Duration::seconds(self.token_expiration_secs as i64)
    }

    pub fn hostconf_jwk_validity(&self) -> Duration {
        Duration::seconds(self.hostconf_jwk_validity_secs as i64)
    }

    pub fn hostconf_jwk_renewal_threshold(&self) -> Duration {
        Duration::seconds(self.hostconf_jwk_renewal_threshold_secs as i64)
    }

    pub fn hostconf_token_validity(&self) -> Duration {
        Duration::seconds(self.hostconf_token_validity_secs as i64)
    }
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            token_expiration_secs: 7200,
            hostconf_jwk_validity_secs: 7 * 24 * 3600,
            hostconf_jwk_renewal_threshold_secs: 24 * 3600,
            hostconf_token_validity_secs: 3600,
            pagination_default_limit: 10,
            pagination_max_limit: 1000,
            filter_by_fqdn: false,
        }
    }
}
