//! Local session flows built on the vault.
//!
//! Login, MPIN setup and verification with lockout, biometric quick-login,
//! session restore and sign-out. There is no backend: a login mints a local
//! token and a session is "restored" by reading the biometric credentials.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{AuthToken, Credential, StoreTier};
use crate::store::SecureStore;
use crate::vault::{validate_mpin, MpinError, SecureVault, VaultOutcome};

/// uid of every locally restored user.
pub const LOCAL_USER_ID: &str = "local-user";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Please enter both username and password")]
    MissingCredentials,

    #[error(transparent)]
    Mpin(#[from] MpinError),

    #[error("Failed to save {0}")]
    Storage(&'static str),

    #[error("Token lifetime of {0} hours is out of range")]
    InvalidTokenTtl(i64),
}

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl SessionUser {
    fn local(username: String) -> Self {
        Self {
            uid: LOCAL_USER_ID.to_string(),
            email: Some(username),
            display_name: None,
        }
    }
}

/// Result of an MPIN entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MpinCheck {
    Verified,
    Incorrect { remaining: u32 },
    /// Too many wrong entries; auth state and token were cleared.
    LockedOut,
    /// Malformed entry, not counted as an attempt.
    Invalid(MpinError),
}

pub struct SessionService<S: ?Sized = dyn SecureStore> {
    vault: Arc<SecureVault<S>>,
    failed_attempts: Mutex<u32>,
}

impl<S: SecureStore + ?Sized> SessionService<S> {
    pub fn new(vault: Arc<SecureVault<S>>) -> Self {
        Self {
            vault,
            failed_attempts: Mutex::new(0),
        }
    }

    pub fn vault(&self) -> &Arc<SecureVault<S>> {
        &self.vault
    }

    /// Log in locally: any non-empty pair is accepted.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthToken, SessionError> {
        if username.is_empty() || password.is_empty() {
            return Err(SessionError::MissingCredentials);
        }

        let ttl_hours = self.vault.config().token_ttl_hours;
        let token = AuthToken::expiring_in(Uuid::new_v4().simple().to_string(), ttl_hours)
            .ok_or(SessionError::InvalidTokenTtl(ttl_hours))?;

        if !self.vault.save_credential(username, password, None).await {
            return Err(SessionError::Storage("credentials"));
        }
        if !self
            .vault
            .save_token(&token.token, token.expires_at.as_deref())
            .await
        {
            return Err(SessionError::Storage("session token"));
        }
        if !self.vault.set_auth_state(true).await {
            return Err(SessionError::Storage("auth state"));
        }

        *self.failed_attempts.lock().await = 0;
        info!("User {} logged in", username);
        Ok(token)
    }

    /// Autofill suggestion for the login form.
    pub async fn saved_credentials(&self) -> Option<Credential> {
        self.vault.get_credential(None).await
    }

    pub async fn set_mpin(&self, pin: &str, confirm: &str) -> Result<(), SessionError> {
        if pin.is_empty() || confirm.is_empty() {
            return Err(MpinError::Empty.into());
        }
        validate_mpin(pin, self.vault.config())?;
        if pin != confirm {
            return Err(MpinError::Mismatch.into());
        }

        if !self.vault.save_mpin(pin).await {
            return Err(SessionError::Storage("MPIN"));
        }
        if !self.vault.save_auth_state(true).await {
            return Err(SessionError::Storage("auth state"));
        }
        *self.failed_attempts.lock().await = 0;
        info!("MPIN set");
        Ok(())
    }

    /// Check an MPIN entry against the stored one.
    ///
    /// Entries are serialized so the attempt counter cannot be raced.
    pub async fn verify_mpin(&self, pin: &str) -> MpinCheck {
        if let Err(e) = validate_mpin(pin, self.vault.config()) {
            return MpinCheck::Invalid(e);
        }

        let mut failed = self.failed_attempts.lock().await;
        if self.vault.verify_mpin(pin).await {
            *failed = 0;
            self.vault.set_auth_state(true).await;
            debug!("MPIN verified");
            return MpinCheck::Verified;
        }

        *failed += 1;
        let max = self.vault.config().max_mpin_attempts;
        if *failed >= max {
            warn!("Wrong MPIN entered {} times, ending session", *failed);
            *failed = 0;
            self.vault.clear_auth_state().await;
            self.vault.delete_token().await;
            return MpinCheck::LockedOut;
        }

        MpinCheck::Incorrect {
            remaining: max - *failed,
        }
    }

    pub async fn failed_attempts(&self) -> u32 {
        *self.failed_attempts.lock().await
    }

    /// Reset path: the user has to log in again and pick a new MPIN.
    pub async fn forgot_mpin(&self) -> bool {
        let auth = self.vault.clear_auth_state().await;
        let token = self.vault.delete_token().await;
        let mpin = self.vault.delete_mpin().await;
        *self.failed_attempts.lock().await = 0;
        info!("MPIN reset requested");
        auth && token && mpin
    }

    /// Store credentials for biometric quick-login.
    ///
    /// Returns the tier for a biometric save, or `None` when the device has
    /// no biometry and the credentials were saved without protection. The
    /// quick-login flag is set only after a biometric save.
    pub async fn enable_biometric_login(
        &self,
        username: &str,
        password: &str,
    ) -> VaultOutcome<Option<StoreTier>> {
        if !self.vault.get_supported_biometry_type().await.available {
            warn!("Biometry unavailable, saving credentials without biometric protection");
            return self
                .vault
                .try_save_credential(username, password, None)
                .await
                .map(|()| None);
        }

        let outcome = self
            .vault
            .try_save_credentials_with_biometrics(username, password, None)
            .await;
        if outcome.is_success() {
            self.vault.set_biometric_enabled().await;
        }
        outcome.map(Some)
    }

    pub async fn disable_biometric_login(&self) -> bool {
        let flag = self.vault.clear_biometric_enabled().await;
        let creds = self.vault.delete_credentials_with_biometrics(None).await;
        flag && creds
    }

    pub async fn quick_login_available(&self) -> bool {
        self.vault.is_biometric_enabled().await
            && self.vault.get_supported_biometry_type().await.available
    }

    pub async fn sign_in_with_biometrics(&self, prompt_message: Option<&str>) -> Option<SessionUser> {
        let title = prompt_message.unwrap_or(&self.vault.config().prompts.sign_in.title);
        let Some(creds) = self
            .vault
            .get_credentials_with_biometrics(None, Some(title))
            .await
        else {
            warn!("Biometric sign-in failed: no credentials released");
            return None;
        };

        self.vault.set_auth_state(true).await;
        info!("Signed in with biometrics as {}", creds.username);
        Some(SessionUser::local(creds.username))
    }

    /// Bring back the previous session on startup.
    ///
    /// Only prompts when the user was logged in.
    pub async fn restore_session(&self) -> Option<SessionUser> {
        if !self.vault.get_auth_state().await {
            debug!("No previous session to restore");
            return None;
        }

        let title = self.vault.config().prompts.restore_session.title.clone();
        let creds = self
            .vault
            .get_credentials_with_biometrics(None, Some(&title))
            .await?;
        info!("Local session restored");
        Some(SessionUser::local(creds.username))
    }

    /// End the session; with `clear_local_data` also forget credentials,
    /// token and MPIN.
    pub async fn sign_out(&self, clear_local_data: bool) -> bool {
        let mut ok = self.vault.clear_auth_state().await;
        if clear_local_data {
            ok &= self.vault.delete_credential(None).await;
            ok &= self.vault.delete_token().await;
            ok &= self.vault.delete_mpin().await;
        }
        info!("Signed out (local data cleared: {})", clear_local_data);
        ok
    }
}
