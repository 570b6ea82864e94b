//! Mapping from `sqlx` failures to the engine's storage error classes.

use galley_engine::StoreError;

/// SQLSTATE codes that mean "this row's values were refused", as opposed
/// to the database itself being in trouble.
const RECORD_LEVEL_CODES: &[&str] = &[
    "23505", // unique_violation
    "23502", // not_null_violation
    "23503", // foreign_key_violation
    "23514", // check_violation
    "22001", // string_data_right_truncation
    "22P02", // invalid_text_representation
    "22007", // invalid_datetime_format
    "22003", // numeric_value_out_of_range
];

/// Classify a database error by blast radius.
pub fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => {
            let code = db.code();
            if code.as_deref().is_some_and(|c| RECORD_LEVEL_CODES.contains(&c)) {
                tracing::debug!(code = ?code, error = %db, "Row rejected by database");
                StoreError::Rejected(db.message().to_string())
            } else {
                tracing::error!(code = ?code, error = %db, "Database error");
                StoreError::Internal(err.to_string())
            }
        }
        sqlx::Error::RowNotFound | sqlx::Error::ColumnNotFound(_) => {
            tracing::debug!(error = %err, "Row rejected by database");
            StoreError::Rejected(err.to_string())
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => {
            tracing::warn!(error = %err, "Database unavailable");
            StoreError::Unavailable(err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "Unexpected database error");
            StoreError::Internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn pool_exhaustion_is_unavailable() {
        assert_matches!(classify(sqlx::Error::PoolTimedOut), StoreError::Unavailable(_));
        assert_matches!(classify(sqlx::Error::PoolClosed), StoreError::Unavailable(_));
    }

    #[test]
    fn io_failure_is_unavailable() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert_matches!(classify(err), StoreError::Unavailable(_));
    }

    #[test]
    fn missing_row_is_record_level() {
        assert!(classify(sqlx::Error::RowNotFound).is_record_level());
    }

    #[test]
    fn unknown_column_is_record_level() {
        let err = sqlx::Error::ColumnNotFound("organizations.nickname".into());
        assert_matches!(classify(err), StoreError::Rejected(m) if m.contains("nickname"));
    }

    #[test]
    fn protocol_errors_abort_the_run() {
        let err = sqlx::Error::Protocol("unexpected message".into());
        assert_matches!(classify(err), StoreError::Internal(_));
    }
}
