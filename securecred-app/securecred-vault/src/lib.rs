//! Secure credential vault.
//!
//! A uniform façade over platform secure stores: credentials, session
//! tokens, MPINs and sensitive values, with biometric gating where the
//! platform supports it and a software fallback where it does not.
//!
//! ```no_run
//! use std::sync::Arc;
//! use securecred_vault::{MemoryStore, SecureVault, VaultConfig};
//!
//! # async fn demo() {
//! let vault = SecureVault::new(Arc::new(MemoryStore::new()), VaultConfig::default());
//! vault.save_credential("alice", "p@ss1", None).await;
//! assert!(vault.get_credential(None).await.is_some());
//! # }
//! ```

pub mod config;
pub mod documents;
pub mod error;
pub mod models;
pub mod session;
pub mod store;
pub mod vault;

pub use config::{
    load_config, save_config, KdfParams, PromptDefaults, VaultConfig, DEFAULT_SERVICE_NAME,
    MAX_TOKEN_TTL_HOURS,
};
pub use documents::{DocumentKind, DocumentService, SecureDocument};
pub use error::{Error, Result};
pub use models::*;
pub use session::{MpinCheck, SessionError, SessionService, SessionUser};
pub use store::{
    AuthenticationPrompt, EncryptedFileStore, MemoryStore, PromptResponse, ReadOptions, SecureStore,
    WriteOptions,
};
#[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
pub use store::KeyringStore;
pub use vault::{MpinError, SecureVault, VaultOutcome};
