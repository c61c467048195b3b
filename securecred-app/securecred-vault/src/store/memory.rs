//! In-process simulation of a mobile secure keystore.
//!
//! Behaves like the Android/iOS keystores the vault is written against:
//! hardware-backed writes need secure hardware, biometric access control needs
//! an enrolled biometric and a lock screen, gated reads show a modal prompt,
//! and `BiometryCurrentSet` entries die when the enrollment changes. Device
//! capabilities and the user's answer to prompts are scripted by the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::{
    AccessControl, Accessibility, AuthenticationPrompt, ReadOptions, SecureStore, SecurityLevel,
    StorageType, WriteOptions,
};
use crate::error::{Error, Result};
use crate::models::{BiometryType, SecretStorageMethod, StoredSecret};

/// What the simulated user does when a prompt appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResponse {
    Approve,
    Cancel,
    /// Biometric not recognised.
    Fail,
}

#[derive(Debug, Clone)]
struct Device {
    biometry: Option<BiometryType>,
    secure_hardware: bool,
    passcode_set: bool,
    prompt_response: PromptResponse,
    prompt_delay: Option<Duration>,
    /// Bumped on every enrollment change.
    enrollment: u64,
    biometry_query_error: Option<String>,
    /// Injected failure returned by every operation while set.
    outage: Option<Error>,
}

#[derive(Debug, Clone)]
struct Entry {
    secret: StoredSecret,
    options: WriteOptions,
    enrollment: u64,
}

/// Simulated keystore. Starts as a phone with a fingerprint sensor, secure
/// hardware and a lock screen, whose user approves every prompt.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    internet: RwLock<HashMap<String, StoredSecret>>,
    device: RwLock<Device>,
    prompts: Mutex<Vec<AuthenticationPrompt>>,
    prompt_active: AtomicBool,
    /// One-shot failures keyed by namespace.
    read_faults: Mutex<HashMap<String, Error>>,
    write_faults: Mutex<HashMap<String, Error>>,
}

/// Clears the modal flag when the prompt resolves, even if the read is dropped.
struct PromptGuard<'a>(&'a AtomicBool);

impl Drop for PromptGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            internet: RwLock::new(HashMap::new()),
            device: RwLock::new(Device {
                biometry: Some(BiometryType::Fingerprint),
                secure_hardware: true,
                passcode_set: true,
                prompt_response: PromptResponse::Approve,
                prompt_delay: None,
                enrollment: 0,
                biometry_query_error: None,
                outage: None,
            }),
            prompts: Mutex::new(Vec::new()),
            prompt_active: AtomicBool::new(false),
            read_faults: Mutex::new(HashMap::new()),
            write_faults: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_biometry(mut self, biometry: Option<BiometryType>) -> Self {
        self.device.get_mut().biometry = biometry;
        self
    }

    pub fn with_secure_hardware(mut self, secure_hardware: bool) -> Self {
        self.device.get_mut().secure_hardware = secure_hardware;
        self
    }

    pub fn with_passcode(mut self, passcode_set: bool) -> Self {
        self.device.get_mut().passcode_set = passcode_set;
        self
    }

    pub fn with_prompt_response(mut self, response: PromptResponse) -> Self {
        self.device.get_mut().prompt_response = response;
        self
    }

    /// Keep each prompt on screen for `delay` before the user answers.
    pub fn with_prompt_delay(mut self, delay: Duration) -> Self {
        self.device.get_mut().prompt_delay = Some(delay);
        self
    }

    pub async fn set_prompt_response(&self, response: PromptResponse) {
        self.device.write().await.prompt_response = response;
    }

    /// Simulate the user adding or removing a fingerprint/face.
    pub async fn change_enrollment(&self) {
        let mut device = self.device.write().await;
        device.enrollment += 1;
        info!("Simulated biometric enrollment change (epoch {})", device.enrollment);
    }

    /// Make the biometry query itself fail.
    pub async fn fail_biometry_query(&self, reason: impl Into<String>) {
        self.device.write().await.biometry_query_error = Some(reason.into());
    }

    /// Make every operation fail with `error` until cleared with `None`.
    pub async fn set_outage(&self, error: Option<Error>) {
        self.device.write().await.outage = error;
    }

    /// Fail the next read of `namespace` with `error`.
    pub async fn fail_next_read(&self, namespace: impl Into<String>, error: Error) {
        self.read_faults.lock().await.insert(namespace.into(), error);
    }

    /// Fail the next write to `namespace` with `error`.
    pub async fn fail_next_write(&self, namespace: impl Into<String>, error: Error) {
        self.write_faults.lock().await.insert(namespace.into(), error);
    }

    /// Prompts shown so far, oldest first.
    pub async fn prompts_shown(&self) -> Vec<AuthenticationPrompt> {
        self.prompts.lock().await.clone()
    }

    pub async fn contains(&self, namespace: &str) -> bool {
        self.entries.read().await.contains_key(namespace)
    }

    /// Options the entry in `namespace` was written with.
    pub async fn write_options(&self, namespace: &str) -> Option<WriteOptions> {
        self.entries
            .read()
            .await
            .get(namespace)
            .map(|entry| entry.options)
    }

    pub async fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn check_outage(&self) -> Result<Device> {
        let device = self.device.read().await.clone();
        match &device.outage {
            Some(err) => Err(err.clone()),
            None => Ok(device),
        }
    }

    /// Refuse writes the simulated hardware cannot honour.
    fn check_capabilities(device: &Device, options: &WriteOptions) -> Result<()> {
        let wants_hardware = options.security_level == Some(SecurityLevel::SecureHardware)
            || options.storage == Some(StorageType::Rsa);
        if wants_hardware && !device.secure_hardware {
            return Err(Error::NotAvailable(
                "No secure hardware available for key storage".into(),
            ));
        }

        if let Some(access_control) = options.access_control {
            if access_control.needs_biometry() && device.biometry.is_none() {
                return Err(Error::NoBiometricsEnrolled);
            }
            if !device.passcode_set {
                return Err(Error::NotAvailable("Device has no secure lock screen".into()));
            }
        }

        if options.accessibility == Accessibility::WhenPasscodeSetThisDeviceOnly
            && !device.passcode_set
        {
            return Err(Error::NotAvailable("Device passcode not set".into()));
        }

        Ok(())
    }

    /// Show the modal prompt and wait for the scripted answer.
    async fn authenticate(&self, device: &Device, prompt: AuthenticationPrompt) -> Result<()> {
        if self.prompt_active.swap(true, Ordering::SeqCst) {
            warn!("Second authentication prompt requested while one is on screen");
            return Err(Error::PromptInProgress);
        }
        let _guard = PromptGuard(&self.prompt_active);

        debug!("Showing authentication prompt: {}", prompt.title);
        self.prompts.lock().await.push(prompt);

        if let Some(delay) = device.prompt_delay {
            tokio::time::sleep(delay).await;
        }

        match self.device.read().await.prompt_response {
            PromptResponse::Approve => Ok(()),
            PromptResponse::Cancel => Err(Error::UserCancelled),
            PromptResponse::Fail => {
                Err(Error::AuthenticationFailed("Biometric not recognized".into()))
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureStore for MemoryStore {
    async fn write(
        &self,
        namespace: &str,
        account: &str,
        secret: &str,
        options: &WriteOptions,
    ) -> Result<()> {
        let device = self.check_outage().await?;
        if let Some(err) = self.write_faults.lock().await.remove(namespace) {
            return Err(err);
        }
        Self::check_capabilities(&device, options)?;

        let entry = Entry {
            secret: StoredSecret {
                account: account.to_string(),
                secret: secret.to_string(),
            },
            options: *options,
            enrollment: device.enrollment,
        };
        self.entries.write().await.insert(namespace.to_string(), entry);
        debug!("Stored entry in {} ({:?})", namespace, options.access_control);
        Ok(())
    }

    async fn read(&self, namespace: &str, options: &ReadOptions) -> Result<Option<StoredSecret>> {
        let device = self.check_outage().await?;
        if let Some(err) = self.read_faults.lock().await.remove(namespace) {
            return Err(err);
        }

        let entry = match self.entries.read().await.get(namespace) {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };

        let Some(access_control) = entry.options.access_control else {
            return Ok(Some(entry.secret));
        };

        if access_control == AccessControl::BiometryCurrentSet
            && entry.enrollment != device.enrollment
        {
            return Err(Error::BiometricEnrollmentChanged);
        }

        // Gated entries cannot be released without user interaction
        let prompt = options.prompt.clone().ok_or_else(|| {
            Error::AuthenticationFailed("User interaction required but not allowed".into())
        })?;
        self.authenticate(&device, prompt).await?;

        Ok(Some(entry.secret))
    }

    async fn reset(&self, namespace: &str) -> Result<()> {
        self.check_outage().await?;
        self.entries.write().await.remove(namespace);
        Ok(())
    }

    async fn supported_biometry(&self) -> Result<Option<BiometryType>> {
        let device = self.check_outage().await?;
        match device.biometry_query_error {
            Some(reason) => Err(Error::Internal(reason)),
            None => Ok(device.biometry),
        }
    }

    async fn write_internet(&self, server: &str, account: &str, secret: &str) -> Result<()> {
        self.check_outage().await?;
        self.internet.write().await.insert(
            server.to_string(),
            StoredSecret {
                account: account.to_string(),
                secret: secret.to_string(),
            },
        );
        Ok(())
    }

    async fn read_internet(&self, server: &str) -> Result<Option<StoredSecret>> {
        self.check_outage().await?;
        Ok(self.internet.read().await.get(server).cloned())
    }

    async fn reset_internet(&self, server: &str) -> Result<()> {
        self.check_outage().await?;
        self.internet.write().await.remove(server);
        Ok(())
    }

    fn method(&self) -> SecretStorageMethod {
        SecretStorageMethod::MemorySimulation
    }
}
