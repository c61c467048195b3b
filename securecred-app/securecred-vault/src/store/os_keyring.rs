//! Desktop store using the OS keyring.
//!
//! - **macOS**: Keychain Access
//! - **Windows**: Credential Manager
//! - **Linux**: kernel keyutils
//!
//! Desktop keyrings have no biometric access control, so this is a software
//! tier only store: writes that ask for secure hardware or an access-control
//! gate are refused with `NotAvailable` and the vault falls back.

use async_trait::async_trait;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{ReadOptions, SecureStore, WriteOptions};
use crate::error::{Error, Result};
use crate::models::{BiometryType, SecretStorageMethod, StoredSecret};

/// Keyring user name for generic entries; the namespace is the keyring service.
const ACCOUNT_NAME: &str = "vault-entry";

/// Keyring user name for server-keyed entries.
const INTERNET_ACCOUNT_NAME: &str = "internet-credentials";

/// Prefix keeping server-keyed entries apart from generic namespaces.
const INTERNET_SERVICE_PREFIX: &str = "internet:";

/// What actually goes into the keyring password field.
#[derive(Serialize, Deserialize)]
struct KeyringPayload {
    account: String,
    secret: String,
}

/// OS keyring backed store.
#[derive(Debug, Clone, Default)]
pub struct KeyringStore;

impl KeyringStore {
    pub fn new() -> Self {
        Self
    }

    fn store_entry(service: &str, user: &str, payload: &KeyringPayload) -> Result<()> {
        let encoded = serde_json::to_string(payload)?;

        let entry = Entry::new(service, user).map_err(|e| {
            error!("Failed to create keyring entry: {}", e);
            map_keyring_error(e)
        })?;
        entry.set_password(&encoded).map_err(|e| {
            error!("Failed to store secret in keyring: {:?}", e);
            map_keyring_error(e)
        })?;

        // Read back through a NEW Entry so we are not looking at a cached value
        let verify_entry = Entry::new(service, user).map_err(map_keyring_error)?;
        match verify_entry.get_password() {
            Ok(readback) if readback == encoded => {
                debug!("Keyring entry {} verified after write", service);
                Ok(())
            }
            Ok(_) => {
                error!("Keyring verification failed - stored data doesn't match!");
                Err(Error::Internal("Keyring verification failed: data mismatch".into()))
            }
            Err(e) => {
                error!("Keyring verification failed - cannot read back: {:?}", e);
                Err(Error::Internal(format!(
                    "Keyring verification failed: set_password() succeeded but get_password() failed: {:?}",
                    e
                )))
            }
        }
    }

    fn load_entry(service: &str, user: &str) -> Result<Option<StoredSecret>> {
        let entry = Entry::new(service, user).map_err(map_keyring_error)?;

        let encoded = match entry.get_password() {
            Ok(password) => password,
            Err(keyring::Error::NoEntry) => {
                debug!("No keyring entry for {}", service);
                return Ok(None);
            }
            Err(e) => {
                error!("Failed to retrieve secret from keyring: {:?}", e);
                return Err(map_keyring_error(e));
            }
        };

        let payload: KeyringPayload = serde_json::from_str(&encoded).map_err(|e| {
            error!("Keyring entry {} is not a vault payload: {}", service, e);
            Error::Serialization(format!("Failed to decode keyring entry: {}", e))
        })?;

        Ok(Some(StoredSecret {
            account: payload.account,
            secret: payload.secret,
        }))
    }

    fn delete_entry(service: &str, user: &str) -> Result<()> {
        let entry = Entry::new(service, user).map_err(map_keyring_error)?;

        // delete_credential fails when the entry doesn't exist, but delete is idempotent
        match entry.delete_credential() {
            Ok(()) => {
                info!("Deleted keyring entry {}", service);
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                debug!("No keyring entry to delete for {} (already gone)", service);
                Ok(())
            }
            Err(e) => {
                error!("Failed to delete keyring entry: {:?}", e);
                Err(map_keyring_error(e))
            }
        }
    }

    fn platform_method() -> SecretStorageMethod {
        #[cfg(target_os = "macos")]
        {
            SecretStorageMethod::MacOSKeychain
        }
        #[cfg(target_os = "windows")]
        {
            SecretStorageMethod::WindowsCredentialManager
        }
        #[cfg(target_os = "linux")]
        {
            SecretStorageMethod::LinuxKeyutils
        }
    }
}

/// Run a blocking keyring call off the async executor.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("Keyring task failed: {}", e)))?
}

fn internet_service(server: &str) -> String {
    format!("{}{}", INTERNET_SERVICE_PREFIX, server)
}

/// Map keyring errors to our error type.
fn map_keyring_error(err: keyring::Error) -> Error {
    match err {
        keyring::Error::NoEntry => Error::SecretNotFound,
        keyring::Error::Ambiguous(_) => Error::Internal("Multiple keyring entries found".into()),
        keyring::Error::NoStorageAccess(e) => {
            Error::NotAvailable(format!("Keyring access denied: {:?}", e))
        }
        keyring::Error::PlatformFailure(e) => Error::Internal(format!("Keyring platform failure: {}", e)),
        keyring::Error::BadEncoding(e) => {
            Error::Serialization(format!("Keyring encoding error: {:?}", e))
        }
        keyring::Error::TooLong(attr, limit) => {
            Error::Internal(format!("Keyring attribute {} longer than {} bytes", attr, limit))
        }
        _ => Error::Internal(format!("Keyring error: {}", err)),
    }
}

#[async_trait]
impl SecureStore for KeyringStore {
    async fn write(
        &self,
        namespace: &str,
        account: &str,
        secret: &str,
        options: &WriteOptions,
    ) -> Result<()> {
        if options.requires_hardware() {
            warn!(
                "Refusing hardware-backed write to {}: desktop keyring has no biometric access control",
                namespace
            );
            return Err(Error::NotAvailable(
                "Hardware-backed biometric storage is not available in the OS keyring".into(),
            ));
        }

        info!(
            "Storing {} byte secret in keyring (service: {}, account label: {})",
            secret.len(),
            namespace,
            account
        );
        let service = namespace.to_string();
        let payload = KeyringPayload {
            account: account.to_string(),
            secret: secret.to_string(),
        };
        blocking(move || Self::store_entry(&service, ACCOUNT_NAME, &payload)).await
    }

    async fn read(&self, namespace: &str, options: &ReadOptions) -> Result<Option<StoredSecret>> {
        if options.prompt.is_some() {
            debug!("Keyring reads are session-based; ignoring authentication prompt");
        }
        let service = namespace.to_string();
        blocking(move || Self::load_entry(&service, ACCOUNT_NAME)).await
    }

    async fn reset(&self, namespace: &str) -> Result<()> {
        let service = namespace.to_string();
        blocking(move || Self::delete_entry(&service, ACCOUNT_NAME)).await
    }

    async fn supported_biometry(&self) -> Result<Option<BiometryType>> {
        Ok(None)
    }

    async fn write_internet(&self, server: &str, account: &str, secret: &str) -> Result<()> {
        let service = internet_service(server);
        let payload = KeyringPayload {
            account: account.to_string(),
            secret: secret.to_string(),
        };
        blocking(move || Self::store_entry(&service, INTERNET_ACCOUNT_NAME, &payload)).await
    }

    async fn read_internet(&self, server: &str) -> Result<Option<StoredSecret>> {
        let service = internet_service(server);
        blocking(move || Self::load_entry(&service, INTERNET_ACCOUNT_NAME)).await
    }

    async fn reset_internet(&self, server: &str) -> Result<()> {
        let service = internet_service(server);
        blocking(move || Self::delete_entry(&service, INTERNET_ACCOUNT_NAME)).await
    }

    fn method(&self) -> SecretStorageMethod {
        Self::platform_method()
    }
}
