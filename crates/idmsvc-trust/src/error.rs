//! Trust fabric error types.

use idmsvc_core::error::IdmsvcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("registration token is too long")]
    TokenTooLong,

    #[error("registration token has an invalid format")]
    TokenFormat,

    #[error("registration token is not valid base64url")]
    TokenBase64,

    #[error("registration token signature mismatch")]
    TokenSignature,

    #[error("registration token has expired")]
    TokenExpired,

    #[error("cannot mint registration token: {0}")]
    MintRequest(String),

    #[error("invalid main secret: {0}")]
    Secret(String),

    #[error("invalid JWK: {0}")]
    InvalidJwk(String),

    #[error("JWK has expired")]
    JwkExpired,

    #[error("no signing keys available")]
    NoSigningKeys,

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<TrustError> for IdmsvcError {
    fn from(err: TrustError) -> Self {
        match err {
            TrustError::TokenTooLong
            | TrustError::TokenFormat
            | TrustError::TokenBase64
            | TrustError::TokenSignature
            | TrustError::TokenExpired => IdmsvcError::TokenInvalid,
            TrustError::MintRequest(message) => IdmsvcError::BadInput { message },
            TrustError::InvalidJwk(_) | TrustError::JwkExpired => {
                IdmsvcError::InvariantViolation(err.to_string())
            }
            TrustError::NoSigningKeys => IdmsvcError::Internal("no keys available".into()),
            TrustError::Secret(msg) => IdmsvcError::Internal(format!("invalid main secret: {msg}")),
            TrustError::Crypto(msg) => IdmsvcError::Crypto(msg),
        }
    }
}
