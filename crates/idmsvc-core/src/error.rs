//! Error kinds surfaced by the idmsvc control plane.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdmsvcError {
    #[error("Invalid input: {message}")]
    BadInput { message: String },

    /// Registration token failed verification. The failing step is
    /// deliberately not carried.
    #[error("token invalid")]
    TokenInvalid,

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Stored data is inconsistent: {0}")]
    InvariantViolation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IdmsvcError {
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::BadInput {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// `unknown <entity> '<id>'`.
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            message: format!("unknown {entity} '{id}'"),
        }
    }

    /// Transient errors may be retried by idempotent callers.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Crypto(_))
    }
}

pub type IdmsvcResult<T> = Result<T, IdmsvcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_invalid_does_not_leak_detail() {
        assert_eq!(IdmsvcError::TokenInvalid.to_string(), "token invalid");
    }

    #[test]
    fn not_found_message() {
        let err = IdmsvcError::not_found("domain", "abc");
        assert_eq!(err.to_string(), "Not found: unknown domain 'abc'");
    }

    #[test]
    fn transient_kinds() {
        assert!(IdmsvcError::Database("io".into()).is_transient());
        assert!(IdmsvcError::Crypto("rng".into()).is_transient());
        assert!(!IdmsvcError::bad_input("x").is_transient());
        assert!(!IdmsvcError::not_found("domain", "abc").is_transient());
    }
}
