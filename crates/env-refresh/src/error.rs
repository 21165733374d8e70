//! Error types for the refresh library.

use thiserror::Error;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for connection errors.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code for schema conflicts on the target.
pub const EXIT_SCHEMA_CONFLICT: u8 = 3;
/// Exit code for data integrity violations.
pub const EXIT_DATA_INTEGRITY: u8 = 4;
/// Exit code for any other store failure.
pub const EXIT_STORE_ERROR: u8 = 5;
/// Exit code when a run finished but at least one store failed.
pub const EXIT_PARTIAL_FAILURE: u8 = 6;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for refresh operations.
#[derive(Error, Debug)]
pub enum RefreshError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store unreachable or authentication rejected.
    #[error("Connection error ({store}): {message}")]
    Connection { store: String, message: String },

    /// Target already holds an object that the copy tried to create.
    #[error("Schema conflict on {object}: {message}")]
    SchemaConflict { object: String, message: String },

    /// Target rejected rows (duplicate key, constraint violation).
    #[error("Data integrity violation on {object}: {message}")]
    DataIntegrity { object: String, message: String },

    /// Any other failure reported by a store driver.
    #[error("Store error ({store}): {message}")]
    Store { store: String, message: String },

    /// A schema object handed to an adapter that does not own its kind.
    #[error("{store} adapter cannot handle {kind} object {name}")]
    UnsupportedObject {
        store: String,
        kind: String,
        name: String,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RefreshError {
    /// Create a Connection error for a store.
    pub fn connection(store: impl Into<String>, message: impl ToString) -> Self {
        RefreshError::Connection {
            store: store.into(),
            message: message.to_string(),
        }
    }

    /// Create a SchemaConflict error.
    pub fn schema_conflict(object: impl Into<String>, message: impl ToString) -> Self {
        RefreshError::SchemaConflict {
            object: object.into(),
            message: message.to_string(),
        }
    }

    /// Create a DataIntegrity error.
    pub fn data_integrity(object: impl Into<String>, message: impl ToString) -> Self {
        RefreshError::DataIntegrity {
            object: object.into(),
            message: message.to_string(),
        }
    }

    /// Create a Store error.
    pub fn store(store: impl Into<String>, message: impl ToString) -> Self {
        RefreshError::Store {
            store: store.into(),
            message: message.to_string(),
        }
    }

    pub fn unsupported(store: impl Into<String>, kind: impl ToString, name: impl Into<String>) -> Self {
        RefreshError::UnsupportedObject {
            store: store.into(),
            kind: kind.to_string(),
            name: name.into(),
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            RefreshError::Config(_) | RefreshError::Yaml(_) => EXIT_CONFIG_ERROR,
            RefreshError::Connection { .. } => EXIT_CONNECTION_ERROR,
            RefreshError::SchemaConflict { .. } => EXIT_SCHEMA_CONFLICT,
            RefreshError::DataIntegrity { .. } => EXIT_DATA_INTEGRITY,
            RefreshError::Store { .. }
            | RefreshError::UnsupportedObject { .. }
            | RefreshError::Json(_) => EXIT_STORE_ERROR,
            RefreshError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for refresh operations.
pub type Result<T> = std::result::Result<T, RefreshError>;
