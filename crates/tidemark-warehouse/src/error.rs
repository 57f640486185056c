//! Warehouse connector error types.

/// Errors produced by [`Warehouse`](crate::Warehouse) operations.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// The warehouse could not be reached, refused the session, or dropped
    /// the connection mid-statement.
    #[error("connection failed: {0}")]
    Connect(String),

    /// A statement was rejected. `sql` is safe to log (credentials redacted).
    #[error("statement failed: {message}")]
    Statement { sql: String, message: String },

    /// A bulk copy could not read or apply its source.
    #[error("copy from '{location}' failed: {message}")]
    Copy {
        sql: String,
        location: String,
        message: String,
    },

    /// Internal connection mutex was poisoned by a panicked thread.
    #[error("warehouse connection lock poisoned")]
    LockPoisoned,
}

impl WarehouseError {
    pub(crate) fn statement(sql: impl Into<String>, message: impl ToString) -> Self {
        Self::Statement {
            sql: sql.into(),
            message: message.to_string(),
        }
    }

    /// SQL text attached to the failure, if any.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Statement { sql, .. } | Self::Copy { sql, .. } => Some(sql),
            Self::Connect(_) | Self::LockPoisoned => None,
        }
    }

    /// Whether the failure is a connectivity problem rather than a rejected
    /// statement.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, WarehouseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_error_exposes_sql() {
        let err = WarehouseError::statement("DELETE FROM users", "permission denied");
        assert_eq!(err.sql(), Some("DELETE FROM users"));
        assert_eq!(err.to_string(), "statement failed: permission denied");
        assert!(!err.is_connection());
    }

    #[test]
    fn connect_error_has_no_sql() {
        let err = WarehouseError::Connect("timeout expired".into());
        assert!(err.sql().is_none());
        assert!(err.is_connection());
    }

    #[test]
    fn lock_poisoned_displays() {
        let err = WarehouseError::LockPoisoned;
        assert_eq!(err.to_string(), "warehouse connection lock poisoned");
    }
}
