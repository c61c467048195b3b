//! The Secure Vault Service.
//!
//! Persists login credentials, session tokens, MPINs, auth-state flags and
//! arbitrary sensitive values in a [`SecureStore`](crate::store::SecureStore),
//! optionally behind biometric authentication. Callers get a fail-soft API
//! (`bool`/`Option`, never an error) and a typed one (`try_*`, returning
//! [`VaultOutcome`]).

pub mod mpin;
pub mod namespace;
pub mod outcome;
pub mod service;

pub use mpin::{validate_mpin, MpinError};
pub use namespace::Namespaces;
pub use outcome::VaultOutcome;
pub use service::SecureVault;
