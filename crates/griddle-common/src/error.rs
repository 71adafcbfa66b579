//! Error types for griddle

use thiserror::Error;

/// Result type alias for griddle operations
pub type Result<T> = std::result::Result<T, GriddleError>;

/// MongoDB server code for a unique index violation
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Unified error type for all griddle operations
#[derive(Error, Debug, Clone)]
pub enum GriddleError {
    #[error("MongoDB error: {0}")]
    MongoDB(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or malformed configuration (also raised for calls without a resource name)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Audit metadata could not be applied to a write
    #[error("Audit error: {0}")]
    Audit(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique index violation (server code 11000)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation timed out - retryable
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transient error that may succeed on retry
    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GriddleError {
    /// Returns true if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, GriddleError::Timeout(_) | GriddleError::Transient(_))
    }

    /// Returns true if this is a constraint violation error
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, GriddleError::Conflict(_))
    }
}

impl From<serde_json::Error> for GriddleError {
    fn from(err: serde_json::Error) -> Self {
        GriddleError::Serialization(err.to_string())
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for GriddleError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(write_err))
                if write_err.code == DUPLICATE_KEY_CODE =>
            {
                GriddleError::Conflict(err.to_string())
            }
            ErrorKind::Command(cmd_err) if cmd_err.code == DUPLICATE_KEY_CODE => {
                GriddleError::Conflict(err.to_string())
            }
            ErrorKind::Io(_)
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::ServerSelection { .. } => GriddleError::Transient(err.to_string()),
            ErrorKind::InvalidArgument { .. } => GriddleError::Query(err.to_string()),
            ErrorKind::BsonSerialization(_) => GriddleError::Serialization(err.to_string()),
            ErrorKind::BsonDeserialization(_) => GriddleError::Deserialization(err.to_string()),
            _ => GriddleError::MongoDB(err.to_string()),
        }
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::ser::Error> for GriddleError {
    fn from(err: bson::ser::Error) -> Self {
        GriddleError::Serialization(format!("BSON serialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::de::Error> for GriddleError {
    fn from(err: bson::de::Error) -> Self {
        GriddleError::Deserialization(format!("BSON deserialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::oid::Error> for GriddleError {
    fn from(err: bson::oid::Error) -> Self {
        GriddleError::Validation(format!("Invalid ObjectId: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_mongodb() {
        let err = GriddleError::MongoDB("connection refused".to_string());
        assert_eq!(err.to_string(), "MongoDB error: connection refused");
    }

    #[test]
    fn test_error_display_configuration() {
        let err = GriddleError::Configuration("resource name is required".to_string());
        assert_eq!(err.to_string(), "Configuration error: resource name is required");
    }

    #[test]
    fn test_error_display_audit() {
        let err = GriddleError::Audit("No caller found for setCreatedBy".to_string());
        assert_eq!(err.to_string(), "Audit error: No caller found for setCreatedBy");
    }

    #[test]
    fn test_error_display_conflict() {
        let err = GriddleError::Conflict("duplicate key".to_string());
        assert_eq!(err.to_string(), "Conflict: duplicate key");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: GriddleError = json_err.into();
        assert!(matches!(err, GriddleError::Serialization(_)));
    }

    #[test]
    fn test_is_retryable() {
        assert!(GriddleError::Timeout("test".to_string()).is_retryable());
        assert!(GriddleError::Transient("test".to_string()).is_retryable());
        assert!(!GriddleError::Conflict("test".to_string()).is_retryable());
        assert!(!GriddleError::Configuration("test".to_string()).is_retryable());
    }

    #[test]
    fn test_is_constraint_violation() {
        assert!(GriddleError::Conflict("test".to_string()).is_constraint_violation());
        assert!(!GriddleError::Transient("test".to_string()).is_constraint_violation());
        assert!(!GriddleError::Query("test".to_string()).is_constraint_violation());
    }
}
