//! Error types for glossa.

use thiserror::Error;

/// Result type alias using glossa's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for glossa operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Work item not found by surrogate key
    #[error("Work item not found: {0}")]
    ItemNotFound(i64),

    /// The caller no longer owns the item it tried to complete
    #[error("Work item {item_id} is no longer owned by {worker_id}")]
    OwnershipLost { item_id: i64, worker_id: String },

    /// Extraction collaborator failed; the message is the raw collaborator text
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Scoring collaborator failed
    #[error("Scoring error: {0}")]
    Scoring(String),

    /// Collaborator call exceeded its configured timeout
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Raw text handed to the failure classifier.
    ///
    /// Collaborator variants yield the collaborator's own message without the
    /// display prefix so substring matching sees exactly what the tool printed.
    pub fn collaborator_message(&self) -> String {
        match self {
            Error::Extraction(msg) | Error::Scoring(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("abc".to_string());
        assert_eq!(err.to_string(), "Not found: abc");
    }

    #[test]
    fn test_error_display_item_not_found() {
        let err = Error::ItemNotFound(42);
        assert_eq!(err.to_string(), "Work item not found: 42");
    }

    #[test]
    fn test_error_display_ownership_lost() {
        let err = Error::OwnershipLost {
            item_id: 7,
            worker_id: "node-a".to_string(),
        };
        assert_eq!(err.to_string(), "Work item 7 is no longer owned by node-a");
    }

    #[test]
    fn test_error_display_timeout() {
        assert_eq!(Error::Timeout(30).to_string(), "Timed out after 30s");
    }

    #[test]
    fn test_collaborator_message_strips_prefix() {
        let err = Error::Extraction("ERROR: Private video".to_string());
        assert_eq!(err.collaborator_message(), "ERROR: Private video");
        assert_eq!(err.to_string(), "Extraction error: ERROR: Private video");

        let err = Error::Scoring("model crashed".to_string());
        assert_eq!(err.collaborator_message(), "model crashed");
    }

    #[test]
    fn test_collaborator_message_other_variants_use_display() {
        let err = Error::Internal("boom".to_string());
        assert_eq!(err.collaborator_message(), "Internal error: boom");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
