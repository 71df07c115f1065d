//! Mapping from sqlx errors to [`StorageError`].

use ledger_rpc_core::StorageError;

/// SQLSTATE codes that mean "try again".
///
/// `40001` serialization_failure, `40P01` deadlock_detected,
/// `55P03` lock_not_available.
const RETRYABLE_STATES: [&str; 3] = ["40001", "40P01", "55P03"];

/// SQLSTATE `23505` unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Classifies a sqlx error, prefixing the message with `context`.
pub(crate) fn classify(context: &str, error: &sqlx::Error) -> StorageError {
    match error {
        sqlx::Error::Database(db)
            if db
                .code()
                .is_some_and(|code| RETRYABLE_STATES.contains(&code.as_ref())) =>
        {
            StorageError::Conflict(format!("{context}: {error}"))
        },
        sqlx::Error::Database(db) if db.code().is_some_and(|code| code == UNIQUE_VIOLATION) => {
            StorageError::Duplicate(format!("{context}: {error}"))
        },
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::TypeNotFound { .. } => StorageError::Corrupt(format!("{context}: {error}")),
        _ => StorageError::Database(format!("{context}: {error}")),
    }
}

/// Shorthand for `map_err(|e| classify(context, &e))`.
pub(crate) fn with_context(context: &'static str) -> impl Fn(sqlx::Error) -> StorageError {
    move |e| classify(context, &e)
}
