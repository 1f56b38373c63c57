//! SurrealDB repository implementations.

mod domain;
mod hostconf_jwk;

pub use domain::SurrealDomainRepository;
pub use hostconf_jwk::SurrealHostconfJwkRepository;
