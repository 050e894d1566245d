//! Structured error handling and exit codes.

use serde::Serialize;

use crate::store::StoreError;

/// Errors returned by the service's public operations.
///
/// A lookup miss is not an error; lookups return `Option`.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request was empty or malformed. Nothing was changed.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Shutdown is in progress and new work is refused. Nothing was changed.
    #[error("Service shutdown pending")]
    ServiceUnavailable,

    /// The durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Exit codes for the hashgen binary.
///
/// - 0: Success (shut down cleanly after draining)
/// - 1: General error (unexpected failure)
/// - 2: Store unavailable (result log could not be opened or replayed)
/// - 3: Invalid configuration
///
/// A termination signal is a normal shutdown and exits with `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: the service drained and stopped.
    Success = 0,
    /// General error: an unexpected error occurred.
    GeneralError = 1,
    /// Store unavailable: the result log could not be opened.
    StoreUnavailable = 2,
    /// Invalid configuration values.
    ConfigInvalid = 3,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "HG000",
            Self::GeneralError => "HG001",
            Self::StoreUnavailable => "HG002",
            Self::ConfigInvalid => "HG003",
        }
    }

    /// Pick the exit code for an application error.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        if err.chain().any(|cause| cause.is::<StoreError>()) {
            Self::StoreUnavailable
        } else if err
            .chain()
            .any(|cause| cause.is::<crate::config::ConfigError>())
        {
            Self::ConfigInvalid
        } else {
            Self::GeneralError
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "HG001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including causes
    pub message: String,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
        }
    }
}
