//! Error types for the Confidant application.

use thiserror::Error;

/// A shared error type for the entire Confidant application.
///
/// Lost resolve races are not errors; they are reported through
/// [`crate::conversation::ResolveFailure`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfidantError {
    /// Caller supplied an invalid id or an empty message. No state was changed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// The conversation already has a turn in flight.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The completion collaborator failed (transport, HTTP status or malformed body).
    #[error("Completion error: {message}")]
    Completion {
        status: Option<u16>,
        message: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConfidantError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a Completion error
    pub fn completion(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Completion {
            status,
            message: message.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a Validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a Conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Check if this is a Completion error
    pub fn is_completion(&self) -> bool {
        matches!(self, Self::Completion { .. })
    }

    /// Check if this is an IO error
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for ConfidantError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for ConfidantError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for ConfidantError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ConfidantError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<minijinja::Error> for ConfidantError {
    fn from(err: minijinja::Error) -> Self {
        Self::Internal(format!("template error: {err}"))
    }
}

/// Conversion from anyhow::Error (used at binary boundaries)
impl From<anyhow::Error> for ConfidantError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A type alias for `Result<T, ConfidantError>`.
pub type Result<T> = std::result::Result<T, ConfidantError>;
