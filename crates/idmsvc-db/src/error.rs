//! Database-specific error types and conversions.

use std::collections::HashMap;

use idmsvc_core::error::IdmsvcError;

/// Prefixes carried by `THROW` statements inside write transactions.
pub(crate) const CONFLICT: &str = "conflict:";
pub(crate) const FORBIDDEN: &str = "forbidden:";
pub(crate) const NOT_FOUND: &str = "not_found:";
pub(crate) const BAD_INPUT: &str = "bad_input:";

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    BadInput(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<DbError> for IdmsvcError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => IdmsvcError::not_found(&entity, id),
            DbError::Conflict(message) => IdmsvcError::Conflict { message },
            DbError::Forbidden(reason) => IdmsvcError::Forbidden { reason },
            DbError::BadInput(message) => IdmsvcError::BadInput { message },
            DbError::Corrupt(detail) => IdmsvcError::InvariantViolation(detail),
            other => IdmsvcError::Database(other.to_string()),
        }
    }
}

/// Turn the statement errors of a failed transaction into one
/// [`DbError`].
///
/// A failed transaction reports an error for every statement; only the
/// `THROW` carries one of the known prefixes. Without a prefix the
/// first error is returned as is.
pub(crate) fn check_tx(
    errors: HashMap<usize, surrealdb::Error>,
    entity: &str,
    id: &str,
) -> Result<(), DbError> {
    if errors.is_empty() {
        return Ok(());
    }
    let mut errors: Vec<(usize, surrealdb::Error)> = errors.into_iter().collect();
    errors.sort_by_key(|(index, _)| *index);
    for (_, err) in &errors {
        if let Some(classified) = classify(&err.to_string(), entity, id) {
            return Err(classified);
        }
    }
    match errors.into_iter().next() {
        Some((_, err)) => Err(DbError::Surreal(err)),
        None => Ok(()),
    }
}

/// Unique index over the subscription manager ids of live servers.
const RHSM_INDEX: &str = "idx_server_live_rhsm_id";

fn classify(message: &str, entity: &str, id: &str) -> Option<DbError> {
    if message.contains(RHSM_INDEX) && message.contains("already contains") {
        return Some(DbError::Conflict(
            "a subscription manager id is already used by another server".into(),
        ));
    }
    let detail = |marker: &str| {
        message
            .find(marker)
            .map(|at| message[at + marker.len()..].trim().to_string())
    };
    if let Some(d) = detail(CONFLICT) {
        return Some(DbError::Conflict(d));
    }
    if let Some(d) = detail(FORBIDDEN) {
        return Some(DbError::Forbidden(d));
    }
    if let Some(d) = detail(BAD_INPUT) {
        return Some(DbError::BadInput(d));
    }
    if detail(NOT_FOUND).is_some() {
        return Some(DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thrown_markers_are_classified() {
        let conflict = classify(
            "An error occurred: conflict: domain id 'x' is already registered.",
            "domain",
            "x",
        );
        assert!(matches!(
            conflict,
            Some(DbError::Conflict(m)) if m == "domain id 'x' is already registered."
        ));

        assert!(matches!(
            classify("An error occurred: forbidden: not an update server", "domain", "x"),
            Some(DbError::Forbidden(_))
        ));
        assert!(matches!(
            classify(
                "An error occurred: bad_input: 'realm_name' may not be changed",
                "domain",
                "x"
            ),
            Some(DbError::BadInput(m)) if m == "'realm_name' may not be changed"
        ));
        assert!(matches!(
            classify("An error occurred: not_found:", "domain", "x"),
            Some(DbError::NotFound { entity, id }) if entity == "domain" && id == "x"
        ));
        assert!(
            classify("The query was not executed due to a failed transaction", "domain", "x")
                .is_none()
        );

        let taken = "Database index `idx_server_live_rhsm_id` already contains 'd2a1', \
                     with record `server:abc`";
        assert!(matches!(classify(taken, "domain", "x"), Some(DbError::Conflict(_))));
    }

    #[test]
    fn empty_error_set_is_success() {
        assert!(check_tx(HashMap::new(), "domain", "x").is_ok());
    }

    #[test]
    fn maps_into_core_error_kinds() {
        let err: IdmsvcError = DbError::NotFound {
            entity: "domain".into(),
            id: "abc".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Not found: unknown domain 'abc'");

        let err: IdmsvcError = DbError::Conflict("dup".into()).into();
        assert!(matches!(err, IdmsvcError::Conflict { .. }));

        let err: IdmsvcError = DbError::Migration("boom".into()).into();
        assert!(err.is_transient());
    }
}
