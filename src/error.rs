//! Error types for podio-mirror.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (1=startup auth, 2=db, 3=remote, 7=config, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for `--json` consumers
//!
//! Remote failures are not raised through this type inside the sync engine:
//! they are classified into [`RemoteFailure`] and folded into pass outcomes.
//! They only surface here when a command has nothing left to retry.

use crate::remote::{RemoteFailure, TransportError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for podio-mirror operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Startup (exit 1)
    StartupAuthFailed,
    InternalError,

    // Database (exit 2)
    DatabaseError,
    DatabaseMissing,

    // Remote (exit 3)
    RemoteError,
    HttpError,

    // Config (exit 7)
    ConfigError,
    NotConfigured,

    // I/O (exit 8)
    IoError,
    JsonError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::StartupAuthFailed => "STARTUP_AUTH_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::DatabaseMissing => "DATABASE_MISSING",
            Self::RemoteError => "REMOTE_ERROR",
            Self::HttpError => "HTTP_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::NotConfigured => "NOT_CONFIGURED",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::StartupAuthFailed | Self::InternalError => 1,
            Self::DatabaseError | Self::DatabaseMissing => 2,
            Self::RemoteError | Self::HttpError => 3,
            Self::ConfigError | Self::NotConfigured => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether running the same command again may succeed without changes.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError | Self::RemoteError | Self::HttpError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in podio-mirror operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Startup authentication rejected: {failure}")]
    StartupAuth {
        failure: RemoteFailure,
        #[source]
        source: TransportError,
    },

    #[error("Remote API failure ({failure}): {source}")]
    Remote {
        failure: RemoteFailure,
        #[source]
        source: TransportError,
    },

    #[error("Database not found at {path}")]
    DatabaseMissing { path: PathBuf },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Insert into {table} rejected: {source}")]
    InsertRejected {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration: {0}")]
    NotConfigured(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::StartupAuth { .. } => ErrorCode::StartupAuthFailed,
            Self::Remote { .. } => ErrorCode::RemoteError,
            Self::DatabaseMissing { .. } => ErrorCode::DatabaseMissing,
            Self::Database(_) | Self::InsertRejected { .. } => ErrorCode::DatabaseError,
            Self::Http(_) => ErrorCode::HttpError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::NotConfigured(_) => ErrorCode::NotConfigured,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::StartupAuth { failure, .. } => Some(format!(
                "Podio refused the credentials ({failure}). Check PODIO_CLIENT_ID, \
                 PODIO_CLIENT_SECRET, PODIO_USERNAME and PODIO_PASSWORD."
            )),

            Self::Remote {
                failure: RemoteFailure::RateLimit,
                ..
            } => Some("The hourly request quota is exhausted. Try again in an hour.".to_string()),

            Self::DatabaseMissing { path } => Some(format!(
                "No mirror database at {}. Run `podio-mirror once` to create it.",
                path.display()
            )),

            Self::NotConfigured(what) => Some(format!(
                "Set {what} in the environment or in ~/.podio-mirror/config.json. \
                 Use `podio-mirror config` to see the resolved values."
            )),

            Self::Remote { .. }
            | Self::Database(_)
            | Self::InsertRejected { .. }
            | Self::Http(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
