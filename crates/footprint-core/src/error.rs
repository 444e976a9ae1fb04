//! Core error types for footprint-core.
//!
//! This module defines the error hierarchy using thiserror. Store functions
//! return `rusqlite::Error` directly; the reconciler, suspension handling and
//! sweep layers lift everything into [`CoreError`].

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Core error type for footprint-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors, raised before any write
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A looked-up row does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Emissions calculator failures, propagated verbatim
    #[error("Emissions calculator error: {0}")]
    Calculator(#[from] CalculatorError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        CoreError::NotFound { entity, id }
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Start date after end date
    #[error("Invalid date range: start ({start}) must not be after end ({end})")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    /// Interval count of zero, unknown unit, or calendar overflow
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    /// Payload variant does not match the action's category
    #[error("Payload category '{payload}' does not match action category '{action}'")]
    CategoryMismatch {
        action: &'static str,
        payload: &'static str,
    },

    /// A rule already carries a suspension
    #[error("Rule {rule_id} already has a suspension (id {suspension_id})")]
    SuspensionExists { rule_id: i64, suspension_id: i64 },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Emissions calculator errors.
#[derive(Error, Debug)]
pub enum CalculatorError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("Request to emissions service failed: {0}")]
    Request(String),

    /// Non-success HTTP status
    #[error("Emissions service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded
    #[error("Malformed emissions response: {0}")]
    Decode(String),

    /// The calculator cannot price this request
    #[error("Unsupported emissions request: {0}")]
    Unsupported(String),
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked
                    || err.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<reqwest::Error> for CalculatorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CalculatorError::Decode(err.to_string())
        } else {
            CalculatorError::Request(err.to_string())
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
