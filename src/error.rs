//! Error types for the landing pipeline
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Errors fall into three classes that drive run outcomes:
//! - transient (retried inside the HTTP client, see [`Error::is_retryable`])
//! - data-shape (counted and skipped until a threshold is crossed)
//! - fatal (the entity type's run moves to `FAILED`)

use thiserror::Error;

/// The main error type for the landing pipeline
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Authentication Errors
    // ============================================================================
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Max retries ({max_retries}) exceeded")]
    MaxRetriesExceeded { max_retries: u32 },

    // ============================================================================
    // Data Errors
    // ============================================================================
    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    #[error("{entity}: skipped {skipped} of {seen} records without an id (threshold {threshold})")]
    DataShape {
        entity: String,
        skipped: usize,
        seen: usize,
        threshold: f64,
    },

    #[error("{entity}: {bad} unparseable landing records exceed the allowance of {allowed}")]
    BadRecords {
        entity: String,
        bad: usize,
        allowed: usize,
    },

    // ============================================================================
    // Storage Errors
    // ============================================================================
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Storage operation on '{path}' timed out after {timeout_ms}ms")]
    StorageTimeout { path: String, timeout_ms: u64 },

    #[error("Compression error: {message}")]
    Compression { message: String },

    // ============================================================================
    // State Errors
    // ============================================================================
    #[error("Watermark error: {message}")]
    State { message: String },

    #[error("Run ledger error: {message}")]
    RunLedger { message: String },

    #[error("Invalid run id '{value}': expected YYYYMMDDTHHMMSSZ")]
    InvalidRunId { value: String },

    #[error("Illegal run transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // ============================================================================
    // Catalog Errors
    // ============================================================================
    #[error("Entity type '{entity}' is not defined for source '{source_name}'")]
    UnknownEntity { source_name: String, entity: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a watermark state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Create a run ledger error
    pub fn run_ledger(message: impl Into<String>) -> Self {
        Self::RunLedger {
            message: message.into(),
        }
    }

    /// Create an unknown entity error
    pub fn unknown_entity(source: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::UnknownEntity {
            source_name: source.into(),
            entity: entity.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::RateLimited { .. } | Error::Timeout { .. } | Error::StorageTimeout { .. } => {
                true
            }
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Check if this error can only be fixed by changing credentials
    pub fn is_auth(&self) -> bool {
        match self {
            Error::Auth { .. } => true,
            Error::HttpStatus { status, .. } => matches!(status, 401 | 403),
            _ => false,
        }
    }
}

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504 | 520..=524)
}

/// Result type alias for the landing pipeline
pub type Result<T> = std::result::Result<T, Error>;
