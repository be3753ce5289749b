//! Error types for wikid operations.
//!
//! Every failure carries a structured [`ErrorCode`] and, for the fatal
//! classes, an operator-facing suggestion. "No match for this mention" is
//! never an error: matchers return empty collections instead.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for wikid operations.
pub type WikidResult<T> = Result<T, WikidError>;

/// Main error type for all wikid operations.
#[derive(Error, Debug)]
pub enum WikidError {
    /// A store already exists where a new one was to be created.
    #[error("Already exists: {message}")]
    AlreadyExists {
        message: String,
        code: ErrorCode,
        path: PathBuf,
    },

    /// Vector lookup or ANN query issued while no embedding index is loaded.
    #[error("Embedding index unavailable: {message}")]
    IndexUnavailable { message: String, code: ErrorCode },

    /// A referenced file does not match the hash recorded at serialization.
    #[error("Integrity error: {message}")]
    Integrity {
        message: String,
        code: ErrorCode,
        file: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    /// Entity (or store) not found.
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: ErrorCode,
        entity_id: Option<String>,
    },

    /// Configuration error, including embedding dimensionality mismatches.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Embedding inference failed.
    #[error("Embedding error: {message}")]
    Embedding {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Store (STORE_xxx)
    StoreAlreadyExists,
    StoreMissing,

    // Index (IDX_xxx)
    IdxUnavailable,
    IdxNotBuilt,

    // Integrity (INT_xxx)
    IntHashMismatch,
    IntFileMissing,

    // Lookup (NF_xxx)
    EntityNotFound,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,

    // Embedding (EMB_xxx)
    EmbGenerationFailed,
    EmbInvalidOutput,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::StoreAlreadyExists => "STORE_001",
            ErrorCode::StoreMissing => "STORE_002",
            ErrorCode::IdxUnavailable => "IDX_001",
            ErrorCode::IdxNotBuilt => "IDX_002",
            ErrorCode::IntHashMismatch => "INT_001",
            ErrorCode::IntFileMissing => "INT_002",
            ErrorCode::EntityNotFound => "NF_001",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::EmbGenerationFailed => "EMB_001",
            ErrorCode::EmbInvalidOutput => "EMB_002",
            ErrorCode::Internal => "SYS_001",
        }
    }
}

impl WikidError {
    /// Create an already-exists error for a store path.
    pub fn already_exists(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self::AlreadyExists {
            message: format!("Store already exists at '{}'", path.display()),
            code: ErrorCode::StoreAlreadyExists,
            path,
        }
    }

    /// Create an index-unavailable error.
    pub fn index_unavailable(message: impl Into<String>) -> Self {
        Self::IndexUnavailable {
            message: message.into(),
            code: ErrorCode::IdxUnavailable,
        }
    }

    /// Create an integrity error for a hash mismatch on `file`.
    pub fn integrity(
        file: impl Into<String>,
        expected: Option<String>,
        actual: Option<String>,
    ) -> Self {
        let file = file.into();
        let code = if actual.is_none() || expected.is_none() {
            ErrorCode::IntFileMissing
        } else {
            ErrorCode::IntHashMismatch
        };
        Self::Integrity {
            message: format!(
                "File '{}' does not match serialized hash (expected {}, found {})",
                file,
                expected.as_deref().unwrap_or("<absent>"),
                actual.as_deref().unwrap_or("<absent>"),
            ),
            code,
            file,
            expected,
            actual,
        }
    }

    /// Create a not found error for an entity id.
    pub fn not_found(entity_id: impl Into<String>) -> Self {
        let id = entity_id.into();
        Self::NotFound {
            message: format!("Entity with id '{}' not found", id),
            code: ErrorCode::EntityNotFound,
            entity_id: Some(id),
        }
    }

    /// Create a not found error for a missing store file.
    pub fn store_missing(path: impl AsRef<Path>) -> Self {
        Self::NotFound {
            message: format!("No store at '{}'", path.as_ref().display()),
            code: ErrorCode::StoreMissing,
            entity_id: None,
        }
    }

    /// Create a configuration error for mismatched vector dimensionality.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::Configuration(format!(
            "Embedding dimension mismatch: expected {}, got {}",
            expected, actual
        ))
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
            code: ErrorCode::EmbGenerationFailed,
            source: None,
        }
    }

    /// Create an internal error for a poisoned lock.
    pub fn lock_poisoned(what: &str) -> Self {
        Self::Internal(format!("Failed to acquire {} lock", what))
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyExists { code, .. } => *code,
            Self::IndexUnavailable { code, .. } => *code,
            Self::Integrity { code, .. } => *code,
            Self::NotFound { code, .. } => *code,
            Self::Database { code, .. } => *code,
            Self::Embedding { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::AlreadyExists { .. } => {
                Some("Remove the existing store explicitly before creating a new one")
            }
            Self::IndexUnavailable { .. } => {
                Some("Build the embedding index before serving queries")
            }
            Self::Integrity { .. } => Some(
                "Store or index changed since serialization; re-serialize the knowledge base",
            ),
            Self::NotFound { .. } => Some("Please check the entity id and ensure it exists"),
            Self::Configuration(_) => {
                Some("Check that the embedder's output dimension matches the configuration")
            }
            _ => None,
        }
    }

    /// Whether the caller may retry the operation (e.g. a transient lock).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database { source, .. } => source
                .as_ref()
                .and_then(|s| s.downcast_ref::<rusqlite::Error>())
                .and_then(|e| e.sqlite_error_code())
                .map_or(false, |c| {
                    matches!(
                        c,
                        rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                    )
                }),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for WikidError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            code: ErrorCode::DbOperationFailed,
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_error() {
        let err = WikidError::already_exists("/tmp/wiki.sqlite3");
        assert_eq!(err.code(), ErrorCode::StoreAlreadyExists);
        assert!(err.to_string().contains("wiki.sqlite3"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_integrity_error_codes() {
        let mismatch =
            WikidError::integrity("db", Some("abc".to_string()), Some("def".to_string()));
        assert_eq!(mismatch.code(), ErrorCode::IntHashMismatch);

        let missing = WikidError::integrity("index", Some("abc".to_string()), None);
        assert_eq!(missing.code(), ErrorCode::IntFileMissing);
        assert!(missing.to_string().contains("<absent>"));
    }

    #[test]
    fn test_not_found_error() {
        let err = WikidError::not_found("Q60");
        assert_eq!(err.code(), ErrorCode::EntityNotFound);
        assert!(matches!(err, WikidError::NotFound { entity_id: Some(ref id), .. } if id == "Q60"));
    }

    #[test]
    fn test_dimension_mismatch_is_configuration() {
        let err = WikidError::dimension_mismatch(300, 96);
        assert!(matches!(err, WikidError::Configuration(_)));
        assert!(err.to_string().contains("300"));
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::StoreAlreadyExists.as_str(), "STORE_001");
        assert_eq!(ErrorCode::IdxUnavailable.as_str(), "IDX_001");
        assert_eq!(ErrorCode::IntHashMismatch.as_str(), "INT_001");
    }

    #[test]
    fn test_database_error_not_retryable_by_default() {
        let err = WikidError::database("constraint failed");
        assert!(!err.is_retryable());
    }
}
