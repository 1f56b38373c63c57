//! idmsvc trust fabric: registration tokens, host-conf JWK lifecycle,
//! host-conf token signing and domain matching.

pub mod config;
pub mod domain_token;
pub mod error;
pub mod hostconf_token;
pub mod jwk;
pub mod keys;
pub mod matcher;
pub mod secrets;
pub mod service;

pub use config::TrustConfig;
pub use error::TrustError;
pub use keys::{HostconfJwkService, KeyStatus, PublicKeySet, RefreshReport};
pub use secrets::SecretKeeper;
pub use service::{DomainInput, HostConf, RegistrationToken, TrustFabricService};
