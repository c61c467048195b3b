//! The platform secure store boundary.
//!
//! The vault never touches key material itself. Everything it persists goes
//! through a [`SecureStore`], one entry per namespace:
//! - [`MemoryStore`]: in-process simulation of a mobile keystore (biometry,
//!   secure hardware, prompts), used by tests and the demo
//! - [`KeyringStore`]: OS keyring on desktop, software tier only
//! - [`EncryptedFileStore`]: AES-256-GCM file with a passphrase-derived key

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{BiometryType, SecretStorageMethod, StoredSecret};

mod file;
#[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
mod os_keyring;
mod memory;

pub use file::EncryptedFileStore;
#[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
pub use os_keyring::KeyringStore;
pub use memory::{MemoryStore, PromptResponse};

/// When an entry may be read.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Accessibility {
    /// Platform default tier.
    #[default]
    WhenUnlocked,
    WhenUnlockedThisDeviceOnly,
    AfterFirstUnlock,
    /// Only while a device passcode is set; the entry is dropped if it is removed.
    WhenPasscodeSetThisDeviceOnly,
}

/// Authentication the platform demands before releasing an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessControl {
    /// Any enrolled biometric, invalidated when the enrollment changes.
    BiometryCurrentSet,
    /// Any enrolled biometric, surviving enrollment changes.
    BiometryAny,
    /// Biometric or device passcode.
    UserPresence,
    DevicePasscode,
}

impl AccessControl {
    pub fn needs_biometry(&self) -> bool {
        matches!(self, Self::BiometryCurrentSet | Self::BiometryAny)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecurityLevel {
    /// Hardware-backed (TEE, StrongBox, Secure Enclave).
    SecureHardware,
    SecureSoftware,
    Any,
}

/// Cipher family the platform wraps the entry with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageType {
    /// Asymmetric key in secure hardware; required for biometric gating on Android.
    Rsa,
    Aes,
}

/// Attributes of a write.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOptions {
    pub accessibility: Accessibility,
    pub access_control: Option<AccessControl>,
    pub security_level: Option<SecurityLevel>,
    pub storage: Option<StorageType>,
}

impl WriteOptions {
    /// Platform default accessibility, no gate.
    pub fn plain() -> Self {
        Self::default()
    }

    /// Readable while unlocked on this device only, no gate.
    pub fn when_unlocked() -> Self {
        Self {
            accessibility: Accessibility::WhenUnlockedThisDeviceOnly,
            ..Self::default()
        }
    }

    /// Hardware-backed, gated by the current biometric enrollment.
    pub fn strong_tier() -> Self {
        Self {
            accessibility: Accessibility::WhenPasscodeSetThisDeviceOnly,
            access_control: Some(AccessControl::BiometryCurrentSet),
            security_level: Some(SecurityLevel::SecureHardware),
            storage: Some(StorageType::Rsa),
        }
    }

    /// Software-encrypted fallback without hardware attestation.
    pub fn software_tier() -> Self {
        Self {
            accessibility: Accessibility::WhenUnlockedThisDeviceOnly,
            access_control: None,
            security_level: Some(SecurityLevel::SecureSoftware),
            storage: Some(StorageType::Aes),
        }
    }

    /// Whether the write asks for anything a plain keyring cannot give.
    pub fn requires_hardware(&self) -> bool {
        self.security_level == Some(SecurityLevel::SecureHardware)
            || self.access_control.is_some()
            || self.storage == Some(StorageType::Rsa)
    }
}

/// Texts of the modal authentication prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationPrompt {
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub cancel: String,
}

impl AuthenticationPrompt {
    pub fn new(
        title: impl Into<String>,
        subtitle: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            subtitle: subtitle.into(),
            description: description.into(),
            cancel: "Cancel".to_string(),
        }
    }

    /// Same prompt with a caller-supplied title.
    pub fn titled(&self, title: Option<&str>) -> Self {
        match title {
            Some(title) => Self {
                title: title.to_string(),
                ..self.clone()
            },
            None => self.clone(),
        }
    }
}

impl Default for AuthenticationPrompt {
    fn default() -> Self {
        Self::new("Authenticate", "", "")
    }
}

/// Attributes of a read.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    pub prompt: Option<AuthenticationPrompt>,
}

impl ReadOptions {
    pub fn with_prompt(prompt: AuthenticationPrompt) -> Self {
        Self {
            prompt: Some(prompt),
        }
    }
}

/// A platform secure credential store.
///
/// Each namespace holds at most one entry; `write` replaces it. `read` returns
/// `Ok(None)` when the namespace is empty and `reset` of an empty namespace
/// succeeds. Biometric gating is enforced by the store, from the options the
/// entry was written with.
#[async_trait]
pub trait SecureStore: Send + Sync {
    async fn write(
        &self,
        namespace: &str,
        account: &str,
        secret: &str,
        options: &WriteOptions,
    ) -> Result<()>;

    async fn read(&self, namespace: &str, options: &ReadOptions) -> Result<Option<StoredSecret>>;

    async fn reset(&self, namespace: &str) -> Result<()>;

    /// `None` when no biometry is enrolled or present.
    async fn supported_biometry(&self) -> Result<Option<BiometryType>>;

    /// Server-keyed variant for internet credentials.
    async fn write_internet(&self, server: &str, account: &str, secret: &str) -> Result<()>;

    async fn read_internet(&self, server: &str) -> Result<Option<StoredSecret>>;

    async fn reset_internet(&self, server: &str) -> Result<()>;

    fn method(&self) -> SecretStorageMethod;
}
