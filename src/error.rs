/// Result type alias for sync-layer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the local-first data and sync layer.
///
/// The first group of variants is the caller-facing taxonomy: configuration,
/// authentication, transaction, upload and validation failures. The rest are
/// plumbing errors from the store and the HTTP stack.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Malformed or missing endpoint configuration. Fatal at startup.
   #[error("invalid configuration for {field}: {reason}")]
   Configuration { field: &'static str, reason: String },

   /// Credential fetch or login failed.
   #[error("authentication failed: {0}")]
   Authentication(String),

   /// A statement inside an atomic unit failed; the whole unit was rolled back.
   #[error("transaction rolled back: {0}")]
   Transaction(#[source] Box<Error>),

   /// Transaction failed and rollback also failed.
   #[error("transaction failed: {transaction_error}; rollback also failed: {rollback_error}")]
   TransactionRollbackFailed {
      transaction_error: String,
      rollback_error: String,
   },

   /// An upload request for a queued change-set failed. The change-set stays pending.
   #[error("upload failed for {table}/{id}: {reason}")]
   Upload {
      table: String,
      id: String,
      reason: String,
   },

   /// Caller-supplied data failed a precondition.
   #[error("validation failed: {0}")]
   Validation(String),

   /// Row targeted by a mutation does not exist.
   #[error("{table} row not found: {id}")]
   NotFound { table: &'static str, id: String },

   /// Error from SQLx operations.
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),

   /// Error from the connection manager.
   #[error(transparent)]
   ConnectionManager(#[from] nebbler_conn_mgr::Error),

   /// Transport-level HTTP failure (connect, TLS, timeout).
   #[error("http error: {0}")]
   Http(String),

   /// JSON (de)serialization failure.
   #[error(transparent)]
   Json(#[from] serde_json::Error),

   /// File I/O error, e.g. from persisted session storage.
   #[error(transparent)]
   Io(#[from] std::io::Error),

   /// SQLite type that cannot be mapped to JSON.
   #[error("unsupported datatype: {0}")]
   UnsupportedDatatype(String),

   /// A single-row query returned more than one row.
   #[error("query returned {0} rows, expected 0 or 1")]
   MultipleRowsReturned(usize),
}

impl Error {
   pub(crate) fn configuration(field: &'static str, reason: impl Into<String>) -> Self {
      Error::Configuration {
         field,
         reason: reason.into(),
      }
   }

   pub(crate) fn validation(reason: impl Into<String>) -> Self {
      Error::Validation(reason.into())
   }

   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> String {
      match self {
         Error::Configuration { .. } => "CONFIGURATION_ERROR".to_string(),
         Error::Authentication(_) => "AUTHENTICATION_ERROR".to_string(),
         Error::Transaction(_) => "TRANSACTION_ERROR".to_string(),
         Error::TransactionRollbackFailed { .. } => "TRANSACTION_ROLLBACK_FAILED".to_string(),
         Error::Upload { .. } => "UPLOAD_ERROR".to_string(),
         Error::Validation(_) => "VALIDATION_ERROR".to_string(),
         Error::NotFound { .. } => "NOT_FOUND".to_string(),
         Error::Sqlx(e) => {
            if let Some(code) = e.as_database_error().and_then(|db_err| db_err.code()) {
               return format!("SQLITE_{}", code);
            }
            "SQLX_ERROR".to_string()
         }
         Error::ConnectionManager(_) => "CONNECTION_ERROR".to_string(),
         Error::Http(_) => "HTTP_ERROR".to_string(),
         Error::Json(_) => "JSON_ERROR".to_string(),
         Error::Io(_) => "IO_ERROR".to_string(),
         Error::UnsupportedDatatype(_) => "UNSUPPORTED_DATATYPE".to_string(),
         Error::MultipleRowsReturned(_) => "MULTIPLE_ROWS_RETURNED".to_string(),
      }
   }

   /// True for failures the sync engine is expected to retry on its own schedule.
   pub fn is_retryable(&self) -> bool {
      matches!(self, Error::Upload { .. } | Error::Http(_))
   }
}

impl From<reqwest::Error> for Error {
   fn from(e: reqwest::Error) -> Self {
      Error::Http(e.to_string())
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_error_code_configuration() {
      let err = Error::configuration("backend_url", "relative URL without a base");
      assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
      assert!(err.to_string().contains("backend_url"));
   }

   #[test]
   fn test_error_code_transaction_wraps_cause() {
      let err = Error::Transaction(Box::new(Error::Sqlx(sqlx::Error::RowNotFound)));
      assert_eq!(err.error_code(), "TRANSACTION_ERROR");
      assert!(std::error::Error::source(&err).is_some());
   }

   #[test]
   fn test_error_code_transaction_rollback_failed() {
      let err = Error::TransactionRollbackFailed {
         transaction_error: "constraint".into(),
         rollback_error: "busy".into(),
      };
      assert_eq!(err.error_code(), "TRANSACTION_ROLLBACK_FAILED");
      assert!(err.to_string().contains("constraint"));
      assert!(err.to_string().contains("busy"));
   }

   #[test]
   fn test_upload_is_retryable() {
      let err = Error::Upload {
         table: "events".into(),
         id: "e1".into(),
         reason: "HTTP 503".into(),
      };
      assert_eq!(err.error_code(), "UPLOAD_ERROR");
      assert!(err.is_retryable());
      assert!(err.to_string().contains("events/e1"));
      assert!(!Error::Authentication("HTTP 401".into()).is_retryable());
   }

   #[test]
   fn test_error_code_sqlx_non_database() {
      let err = Error::Sqlx(sqlx::Error::RowNotFound);
      assert_eq!(err.error_code(), "SQLX_ERROR");
   }

   #[test]
   fn test_error_code_validation_and_not_found() {
      assert_eq!(Error::validation("bad date").error_code(), "VALIDATION_ERROR");
      let err = Error::NotFound {
         table: "calendars",
         id: "c1".into(),
      };
      assert_eq!(err.error_code(), "NOT_FOUND");
      assert!(err.to_string().contains("c1"));
   }
}
