//! Typed result of a vault operation.

use crate::error::Error;

/// What actually happened, before the fail-soft façade collapses it to
/// `bool`/`Option`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultOutcome<T> {
    Success(T),
    /// Namespace empty, or its content unusable.
    NotFound,
    /// Authentication failed or the OS refused access.
    Denied(String),
    /// User dismissed the prompt.
    Cancelled,
    /// The requested tier is unavailable on this device.
    Unsupported(String),
    /// Any other store failure.
    StoreError(String),
    /// Input refused before the store was touched.
    Invalid(String),
}

impl<T> VaultOutcome<T> {
    pub fn from_error(err: Error) -> Self {
        match err {
            Error::SecretNotFound => Self::NotFound,
            Error::UserCancelled => Self::Cancelled,
            err if err.is_denial() => Self::Denied(err.to_string()),
            err if err.is_unsupported() => Self::Unsupported(err.to_string()),
            err => Self::StoreError(err.to_string()),
        }
    }

    /// An empty read is `NotFound`.
    pub fn from_read(result: crate::error::Result<Option<T>>) -> Self {
        match result {
            Ok(Some(value)) => Self::Success(value),
            Ok(None) => Self::NotFound,
            Err(err) => Self::from_error(err),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> VaultOutcome<U> {
        self.and_then(|value| VaultOutcome::Success(f(value)))
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> VaultOutcome<U>) -> VaultOutcome<U> {
        match self {
            Self::Success(value) => f(value),
            Self::NotFound => VaultOutcome::NotFound,
            Self::Denied(reason) => VaultOutcome::Denied(reason),
            Self::Cancelled => VaultOutcome::Cancelled,
            Self::Unsupported(reason) => VaultOutcome::Unsupported(reason),
            Self::StoreError(reason) => VaultOutcome::StoreError(reason),
            Self::Invalid(reason) => VaultOutcome::Invalid(reason),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::NotFound => "not found",
            Self::Denied(_) => "denied",
            Self::Cancelled => "cancelled",
            Self::Unsupported(_) => "unsupported",
            Self::StoreError(_) => "store error",
            Self::Invalid(_) => "invalid input",
        }
    }
}

impl<T> From<crate::error::Result<T>> for VaultOutcome<T> {
    fn from(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::from_error(err),
        }
    }
}
