pub mod domain;
pub mod hostconf_jwk;
