use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::AuthenticationPrompt;

/// Namespace prefix used when no configuration overrides it.
pub const DEFAULT_SERVICE_NAME: &str = "SecureCredentialManager";

/// Longest accepted session token lifetime (ten years).
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365 * 10;

/// Vault configuration, injected at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Prefix of every namespace the vault addresses.
    pub service_name: String,
    /// Record which tier accepted each biometric write.
    pub persist_tier_metadata: bool,
    pub token_ttl_hours: i64,
    pub mpin_min_len: usize,
    pub mpin_max_len: usize,
    /// Wrong MPIN entries tolerated before the session is dropped.
    pub max_mpin_attempts: u32,
    pub prompts: PromptDefaults,
    pub kdf: KdfParams,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            persist_tier_metadata: true,
            token_ttl_hours: 24,
            mpin_min_len: 4,
            mpin_max_len: 6,
            max_mpin_attempts: 3,
            prompts: PromptDefaults::default(),
            kdf: KdfParams::default(),
        }
    }
}

impl VaultConfig {
    /// Same configuration under a different namespace prefix.
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(Error::Config("service_name must not be empty".into()));
        }
        if self.mpin_min_len == 0 || self.mpin_min_len > self.mpin_max_len {
            return Err(Error::Config(format!(
                "Invalid MPIN length bounds: {}..={}",
                self.mpin_min_len, self.mpin_max_len
            )));
        }
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&self.token_ttl_hours) {
            return Err(Error::Config(format!(
                "token_ttl_hours must be between 1 and {}, got {}",
                MAX_TOKEN_TTL_HOURS, self.token_ttl_hours
            )));
        }
        if self.max_mpin_attempts == 0 {
            return Err(Error::Config("max_mpin_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Default authentication prompt texts per secret family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptDefaults {
    pub credentials: AuthenticationPrompt,
    pub token: AuthenticationPrompt,
    pub mpin: AuthenticationPrompt,
    pub sensitive_data: AuthenticationPrompt,
    pub sign_in: AuthenticationPrompt,
    pub restore_session: AuthenticationPrompt,
}

impl Default for PromptDefaults {
    fn default() -> Self {
        Self {
            credentials: AuthenticationPrompt::new(
                "Authenticate to access your credentials",
                "Biometric authentication required",
                "Use your fingerprint to unlock",
            ),
            token: AuthenticationPrompt::new(
                "Authenticate to access your session",
                "Use biometrics to unlock",
                "Place your finger on the sensor",
            ),
            mpin: AuthenticationPrompt::new(
                "Authenticate to access your MPIN",
                "Use biometrics to unlock",
                "Place your finger on the sensor",
            ),
            sensitive_data: AuthenticationPrompt::new(
                "Authenticate to access secure data",
                "Use biometrics to unlock",
                "Place your finger on the sensor",
            ),
            sign_in: AuthenticationPrompt::new(
                "Use biometrics to sign in",
                "Biometric authentication required",
                "Use your fingerprint to unlock",
            ),
            restore_session: AuthenticationPrompt::new(
                "Authenticate to restore your session",
                "Biometric authentication required",
                "Use your fingerprint to unlock",
            ),
        }
    }
}

/// Argon2id parameters for the encrypted file store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536, // 64 MB
            iterations: 3,
            parallelism: 4,
        }
    }
}

/// Load the configuration, falling back to defaults when the file is missing.
pub fn load_config(path: &Path) -> Result<VaultConfig> {
    if !path.exists() {
        return Ok(VaultConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: VaultConfig = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &VaultConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
