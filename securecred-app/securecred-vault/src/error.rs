//! Error types for secure store and vault operations.

use serde::{Deserialize, Serialize};

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a secure store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", content = "message")]
pub enum Error {
    /// The requested storage tier is not available on this platform/device.
    #[error("Secure storage not available: {0}")]
    NotAvailable(String),

    /// User failed to authenticate (wrong biometric, too many attempts, etc.)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// User dismissed the authentication prompt.
    #[error("User cancelled authentication")]
    UserCancelled,

    /// Biometric enrollment changed since the secret was stored.
    /// Entries written with `BiometryCurrentSet` are unreadable afterwards.
    #[error("Biometric enrollment changed - stored secrets are now inaccessible")]
    BiometricEnrollmentChanged,

    /// No biometrics enrolled on the device.
    #[error("No biometrics enrolled on this device")]
    NoBiometricsEnrolled,

    /// Nothing stored under the namespace.
    #[error("No secret found in secure storage")]
    SecretNotFound,

    /// Access to secure storage was denied by the OS.
    #[error("Access denied to secure storage")]
    AccessDenied,

    /// Another authentication prompt is already on screen.
    #[error("An authentication prompt is already in progress")]
    PromptInProgress,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Platform-specific internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error means the user was asked and did not get through.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationFailed(_)
                | Error::UserCancelled
                | Error::BiometricEnrollmentChanged
                | Error::AccessDenied
        )
    }

    /// Whether the error means the requested tier cannot be used here.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::NotAvailable(_) | Error::NoBiometricsEnrolled)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
