//! Error types and handling for Fiacre
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Fiacre operations
pub type Result<T> = std::result::Result<T, FiacreError>;

/// Main error type for Fiacre
#[derive(Debug, Error)]
pub enum FiacreError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Database/storage errors
    #[error("Storage error: {message}")]
    Store { message: String },

    /// Encryption/decryption errors
    #[error("Crypto error: {message}")]
    Crypto { message: String },

    /// Authentication/authorization errors
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Vehicle API errors, tagged with the request path
    #[error("API error: {path}: {message}")]
    Api { path: String, message: String },

    /// Serde encode and decode failures
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Filesystem errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Transport failures talking to the vehicle API
    #[error("Network error: {message}")]
    Network { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// A required reading could not be obtained fresh enough to use
    #[error("Data unavailable: {message}")]
    DataUnavailable { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl FiacreError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        FiacreError::Config {
            message: message.into(),
        }
    }

    /// Create a new storage error
    pub fn store<S: Into<String>>(message: S) -> Self {
        FiacreError::Store {
            message: message.into(),
        }
    }

    /// Create a new crypto error
    pub fn crypto<S: Into<String>>(message: S) -> Self {
        FiacreError::Crypto {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        FiacreError::Auth {
            message: message.into(),
        }
    }

    /// Create a new API error for the given request path
    pub fn api<S: Into<String>>(path: S, message: S) -> Self {
        FiacreError::Api {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        FiacreError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        FiacreError::Network {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        FiacreError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new data-unavailable error
    pub fn data_unavailable<S: Into<String>>(message: S) -> Self {
        FiacreError::DataUnavailable {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        FiacreError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for FiacreError {
    fn from(err: std::io::Error) -> Self {
        FiacreError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for FiacreError {
    fn from(err: serde_yaml::Error) -> Self {
        FiacreError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for FiacreError {
    fn from(err: serde_json::Error) -> Self {
        FiacreError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for FiacreError {
    fn from(err: rusqlite::Error) -> Self {
        FiacreError::store(err.to_string())
    }
}

impl From<reqwest::Error> for FiacreError {
    fn from(err: reqwest::Error) -> Self {
        FiacreError::network(err.to_string())
    }
}

impl From<chrono::ParseError> for FiacreError {
    fn from(err: chrono::ParseError) -> Self {
        let message = err.to_string();
        FiacreError::validation("datetime", message.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_variants() {
        assert!(matches!(
            FiacreError::config("broken"),
            FiacreError::Config { .. }
        ));
        assert!(matches!(
            FiacreError::api("/api/1/vehicles", "returned 500"),
            FiacreError::Api { .. }
        ));
        assert!(matches!(
            FiacreError::validation("field", "out of range"),
            FiacreError::Validation { .. }
        ));
    }

    #[test]
    fn test_display_includes_context() {
        assert_eq!(
            FiacreError::config("missing secret").to_string(),
            "Configuration error: missing secret"
        );
        assert_eq!(
            FiacreError::validation("timezone", "unknown name").to_string(),
            "Validation error: timezone - unknown name"
        );
        assert_eq!(
            FiacreError::api("/api/1/vehicles/1/data", "returned 408 (vehicle unavailable)")
                .to_string(),
            "API error: /api/1/vehicles/1/data: returned 408 (vehicle unavailable)"
        );
    }
}
