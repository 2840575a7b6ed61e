// sqlx::Error -> AppError mapping
// (cannot implement From<sqlx::Error> for AppError here due to orphan rules)

use brokerq_core::error::AppError;

/// Map a failure of a queue operation (send, receive, listen)
pub(crate) fn map_queue_error(err: sqlx::Error) -> AppError {
    AppError::QueueUnavailable(describe_sqlx_error(&err))
}

/// Map a failure while creating or migrating the broker
pub(crate) fn map_bootstrap_error(err: sqlx::Error) -> AppError {
    AppError::Bootstrap(describe_sqlx_error(&err))
}

/// SQLSTATE of a server-side error, if any
pub(crate) fn sqlstate(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .map(|code| code.into_owned())
}

/// Human-readable description keyed on PostgreSQL error classes
pub(crate) fn describe_sqlx_error(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => {
            let Some(code) = db_err.code() else {
                return format!("Database error: {}", db_err.message());
            };
            let code_str = code.as_ref();

            // PostgreSQL error codes: https://www.postgresql.org/docs/current/errcodes-appendix.html
            match code_str {
                "42704" | "42P01" | "42883" => {
                    // undefined_object / undefined_table / undefined_function
                    format!(
                        "Broker object missing (is the schema migrated?): {} ({})",
                        db_err.message(),
                        code_str
                    )
                }
                "3D000" => format!("Database does not exist: {}", db_err.message()),
                "57014" => format!("Statement cancelled: {}", db_err.message()),
                c if c.starts_with("23") => format!(
                    "Constraint violation: {} ({})",
                    db_err.message(),
                    code_str
                ),
                c if c.starts_with("08") => format!(
                    "Connection failure: {} ({})",
                    db_err.message(),
                    code_str
                ),
                c if c.starts_with("28") => {
                    format!("Authorization failed: {} ({})", db_err.message(), code_str)
                }
                _ => format!("Database error [{}]: {}", code_str, db_err.message()),
            }
        }
        sqlx::Error::Io(io_err) => format!("Connection failure: {}", io_err),
        sqlx::Error::Tls(tls_err) => format!("TLS failure: {}", tls_err),
        sqlx::Error::PoolTimedOut => "Timed out acquiring a connection".to_string(),
        sqlx::Error::PoolClosed => "Connection pool closed".to_string(),
        sqlx::Error::Configuration(cfg_err) => format!("Invalid connection settings: {}", cfg_err),
        sqlx::Error::ColumnDecode { index, source } => {
            format!("Unexpected value in column {}: {}", index, source)
        }
        other => format!("Database error: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_error_is_connection_failure() {
        let err = sqlx::Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert!(describe_sqlx_error(&err).starts_with("Connection failure"));
        assert!(matches!(map_queue_error(err), AppError::QueueUnavailable(_)));
    }

    #[test]
    fn test_bootstrap_mapping() {
        let err = sqlx::Error::PoolTimedOut;
        match map_bootstrap_error(err) {
            AppError::Bootstrap(msg) => assert!(msg.contains("Timed out")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_client_side_error_has_no_sqlstate() {
        assert_eq!(sqlstate(&sqlx::Error::RowNotFound), None);
    }
}
