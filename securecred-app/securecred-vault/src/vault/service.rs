//! SecureVault - uniform façade over a platform secure store.
//!
//! Every operation comes in two flavours:
//! - `try_*` returns a [`VaultOutcome`] saying what actually happened
//! - the plain name collapses that to `bool`/`Option` and never fails
//!
//! The collapsed form is the fail-soft contract callers rely on: `false` or
//! `None` may mean not found, denied, cancelled or broken hardware. Every
//! failure is logged before it is collapsed.
//!
//! Biometric writes try the strong tier (secure hardware, gated by the current
//! biometric enrollment) and fall back to the software tier. The tier that
//! accepted the write is returned and, unless disabled, recorded next to the
//! entry so reads know whether to attach a prompt.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::mpin::{mpin_matches, validate_mpin};
use super::namespace::{
    Namespaces, AUTH_STATE_ACCOUNT, BIOMETRIC_FLAG_ACCOUNT, MPIN_ACCOUNT, TIER_ACCOUNT,
    TOKEN_ACCOUNT,
};
use super::outcome::VaultOutcome;
use crate::config::VaultConfig;
use crate::error::Error;
use crate::models::{AuthToken, BiometricSupport, Credential, StoreTier, StoredSecret};
use crate::store::{AuthenticationPrompt, ReadOptions, SecureStore, WriteOptions};

/// The Secure Vault Service.
///
/// Holds no locks: concurrent writes to the same namespace race (last writer
/// wins) and callers must not issue two biometric reads at once, since the
/// platform allows a single modal prompt per process.
pub struct SecureVault<S: ?Sized = dyn SecureStore> {
    store: Arc<S>,
    config: VaultConfig,
    namespaces: Namespaces,
}

impl<S: SecureStore + ?Sized> SecureVault<S> {
    pub fn new(store: Arc<S>, config: VaultConfig) -> Self {
        let namespaces = Namespaces::new(config.service_name.clone());
        Self {
            store,
            config,
            namespaces,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    // =========================================================================
    // Store plumbing
    // =========================================================================

    async fn put(
        &self,
        namespace: &str,
        account: &str,
        secret: &str,
        options: &WriteOptions,
    ) -> VaultOutcome<()> {
        let outcome: VaultOutcome<()> = self.store.write(namespace, account, secret, options).await.into();
        log_failure("save", namespace, &outcome);
        outcome
    }

    async fn fetch(&self, namespace: &str, options: &ReadOptions) -> VaultOutcome<StoredSecret> {
        let outcome = VaultOutcome::from_read(self.store.read(namespace, options).await);
        log_failure("read", namespace, &outcome);
        outcome
    }

    async fn remove(&self, namespace: &str) -> VaultOutcome<()> {
        let outcome: VaultOutcome<()> = self.store.reset(namespace).await.into();
        log_failure("delete", namespace, &outcome);
        outcome
    }

    /// Strong tier first, software tier if the device cannot do it.
    async fn put_tiered(&self, namespace: &str, account: &str, secret: &str) -> VaultOutcome<StoreTier> {
        let tier = match self
            .store
            .write(namespace, account, secret, &WriteOptions::strong_tier())
            .await
        {
            Ok(()) => {
                info!("Saved {} with hardware-backed biometric protection", namespace);
                StoreTier::Strong
            }
            Err(strong_err) => {
                warn!(
                    "Strong tier save to {} failed, using software fallback: {}",
                    namespace, strong_err
                );
                match self
                    .put(namespace, account, secret, &WriteOptions::software_tier())
                    .await
                {
                    VaultOutcome::Success(()) => StoreTier::Software,
                    failed => return failed.map(|()| StoreTier::Software),
                }
            }
        };

        let metadata = Namespaces::tier_metadata(namespace);
        let recorded = if self.config.persist_tier_metadata {
            match self
                .store
                .write(&metadata, TIER_ACCOUNT, tier.as_str(), &WriteOptions::when_unlocked())
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to record store tier for {}: {}", namespace, e);
                    false
                }
            }
        } else {
            false
        };
        if !recorded {
            // A leftover record would describe the previous write
            if let Err(e) = self.store.reset(&metadata).await {
                error!("Stale tier metadata for {} could not be removed: {}", namespace, e);
            }
        }

        VaultOutcome::Success(tier)
    }

    /// Recorded tier of a biometric write, if any.
    async fn tier_of(&self, namespace: &str) -> Option<StoreTier> {
        if !self.config.persist_tier_metadata {
            return None;
        }
        let metadata = Namespaces::tier_metadata(namespace);
        match self.store.read(&metadata, &ReadOptions::default()).await {
            Ok(Some(stored)) => match stored.secret.parse() {
                Ok(tier) => Some(tier),
                Err(e) => {
                    warn!("Ignoring unreadable tier metadata for {}: {}", namespace, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!("No tier metadata for {}: {}", namespace, e);
                None
            }
        }
    }

    /// Read a biometric namespace. Software-tier entries are read without a
    /// prompt; strong or unknown ones let the store enforce its policy.
    async fn fetch_gated(&self, namespace: &str, prompt: AuthenticationPrompt) -> VaultOutcome<StoredSecret> {
        let options = match self.tier_of(namespace).await {
            Some(StoreTier::Software) => ReadOptions::default(),
            _ => ReadOptions::with_prompt(prompt),
        };
        self.fetch(namespace, &options).await
    }

    /// Delete a biometric namespace together with its tier metadata.
    async fn remove_tiered(&self, namespace: &str) -> VaultOutcome<()> {
        let outcome = self.remove(namespace).await;
        if outcome.is_success() {
            if let Err(e) = self.store.reset(&Namespaces::tier_metadata(namespace)).await {
                warn!("Failed to delete tier metadata for {}: {}", namespace, e);
            }
        }
        outcome
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    pub async fn try_save_credential(
        &self,
        username: &str,
        password: &str,
        namespace: Option<&str>,
    ) -> VaultOutcome<()> {
        let namespace = self.namespaces.credentials(namespace);
        self.put(&namespace, username, password, &WriteOptions::plain()).await
    }

    pub async fn save_credential(&self, username: &str, password: &str, namespace: Option<&str>) -> bool {
        self.try_save_credential(username, password, namespace).await.is_success()
    }

    pub async fn try_get_credential(&self, namespace: Option<&str>) -> VaultOutcome<Credential> {
        let namespace = self.namespaces.credentials(namespace);
        self.fetch(&namespace, &ReadOptions::default())
            .await
            .map(|stored| Credential::new(stored.account, stored.secret))
    }

    pub async fn get_credential(&self, namespace: Option<&str>) -> Option<Credential> {
        self.try_get_credential(namespace).await.ok()
    }

    pub async fn try_delete_credential(&self, namespace: Option<&str>) -> VaultOutcome<()> {
        let namespace = self.namespaces.credentials(namespace);
        self.remove(&namespace).await
    }

    pub async fn delete_credential(&self, namespace: Option<&str>) -> bool {
        self.try_delete_credential(namespace).await.is_success()
    }

    // =========================================================================
    // Token
    // =========================================================================

    async fn put_token(&self, token: &str, expires_at: Option<&str>, options: &WriteOptions) -> VaultOutcome<()> {
        let data = AuthToken::new(token, expires_at.map(str::to_string));
        let encoded = match serde_json::to_string(&data) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Failed to serialize token: {}", e);
                return VaultOutcome::StoreError(e.to_string());
            }
        };
        self.put(&self.namespaces.token(), TOKEN_ACCOUNT, &encoded, options).await
    }

    /// A payload that does not parse counts as no token at all.
    fn parse_token(stored: StoredSecret) -> VaultOutcome<AuthToken> {
        match serde_json::from_str(&stored.secret) {
            Ok(token) => VaultOutcome::Success(token),
            Err(e) => {
                warn!("Stored token is not valid JSON, treating as absent: {}", e);
                VaultOutcome::NotFound
            }
        }
    }

    pub async fn try_save_token(&self, token: &str, expires_at: Option<&str>) -> VaultOutcome<()> {
        self.put_token(token, expires_at, &WriteOptions::plain()).await
    }

    pub async fn save_token(&self, token: &str, expires_at: Option<&str>) -> bool {
        self.try_save_token(token, expires_at).await.is_success()
    }

    pub async fn try_get_token(&self) -> VaultOutcome<AuthToken> {
        self.fetch(&self.namespaces.token(), &ReadOptions::default())
            .await
            .and_then(Self::parse_token)
    }

    pub async fn get_token(&self) -> Option<AuthToken> {
        self.try_get_token().await.ok()
    }

    pub async fn try_delete_token(&self) -> VaultOutcome<()> {
        self.remove(&self.namespaces.token()).await
    }

    pub async fn delete_token(&self) -> bool {
        self.try_delete_token().await.is_success()
    }

    /// Token in the software tier of the token namespace.
    pub async fn save_token_with_biometrics(&self, token: &str, expires_at: Option<&str>) -> bool {
        self.put_token(token, expires_at, &WriteOptions::software_tier())
            .await
            .is_success()
    }

    pub async fn try_get_token_with_biometrics(&self, prompt_message: Option<&str>) -> VaultOutcome<AuthToken> {
        let prompt = self.config.prompts.token.titled(prompt_message);
        self.fetch(&self.namespaces.token(), &ReadOptions::with_prompt(prompt))
            .await
            .and_then(Self::parse_token)
    }

    pub async fn get_token_with_biometrics(&self, prompt_message: Option<&str>) -> Option<AuthToken> {
        self.try_get_token_with_biometrics(prompt_message).await.ok()
    }

    // =========================================================================
    // MPIN
    // =========================================================================

    async fn put_mpin(&self, pin: &str, options: &WriteOptions) -> VaultOutcome<()> {
        if let Err(e) = validate_mpin(pin, &self.config) {
            warn!("Refusing to save MPIN: {}", e);
            return VaultOutcome::Invalid(e.to_string());
        }
        self.put(&self.namespaces.mpin(), MPIN_ACCOUNT, pin, options).await
    }

    pub async fn try_save_mpin(&self, pin: &str) -> VaultOutcome<()> {
        self.put_mpin(pin, &WriteOptions::when_unlocked()).await
    }

    pub async fn save_mpin(&self, pin: &str) -> bool {
        self.try_save_mpin(pin).await.is_success()
    }

    pub async fn try_get_mpin(&self) -> VaultOutcome<String> {
        self.fetch(&self.namespaces.mpin(), &ReadOptions::default())
            .await
            .map(|stored| stored.secret)
    }

    pub async fn get_mpin(&self) -> Option<String> {
        self.try_get_mpin().await.ok()
    }

    /// False whenever no MPIN is stored, whatever the candidate.
    pub async fn verify_mpin(&self, candidate: &str) -> bool {
        match self.try_get_mpin().await {
            VaultOutcome::Success(stored) => mpin_matches(&stored, candidate),
            _ => false,
        }
    }

    pub async fn try_delete_mpin(&self) -> VaultOutcome<()> {
        self.remove(&self.namespaces.mpin()).await
    }

    pub async fn delete_mpin(&self) -> bool {
        self.try_delete_mpin().await.is_success()
    }

    /// MPIN in the software tier of the MPIN namespace.
    pub async fn save_mpin_with_biometrics(&self, pin: &str) -> bool {
        self.put_mpin(pin, &WriteOptions::software_tier()).await.is_success()
    }

    pub async fn get_mpin_with_biometrics(&self, prompt_message: Option<&str>) -> Option<String> {
        let prompt = self.config.prompts.mpin.titled(prompt_message);
        self.fetch(&self.namespaces.mpin(), &ReadOptions::with_prompt(prompt))
            .await
            .map(|stored| stored.secret)
            .ok()
    }

    pub async fn verify_mpin_with_biometrics(&self, candidate: &str, prompt_message: Option<&str>) -> bool {
        self.get_mpin_with_biometrics(prompt_message)
            .await
            .map(|stored| mpin_matches(&stored, candidate))
            .unwrap_or(false)
    }

    // =========================================================================
    // Auth state
    // =========================================================================

    pub async fn try_save_auth_state(&self, logged_in: bool) -> VaultOutcome<()> {
        let value = if logged_in { "true" } else { "false" };
        self.put(&self.namespaces.auth_state(), AUTH_STATE_ACCOUNT, value, &WriteOptions::plain())
            .await
    }

    pub async fn save_auth_state(&self, logged_in: bool) -> bool {
        self.try_save_auth_state(logged_in).await.is_success()
    }

    pub async fn set_auth_state(&self, logged_in: bool) -> bool {
        self.save_auth_state(logged_in).await
    }

    pub async fn try_get_auth_state(&self) -> VaultOutcome<bool> {
        self.fetch(&self.namespaces.auth_state(), &ReadOptions::default())
            .await
            .map(|stored| stored.secret == "true")
    }

    /// False on absence or any failure.
    pub async fn get_auth_state(&self) -> bool {
        self.try_get_auth_state().await.ok().unwrap_or(false)
    }

    /// Leaves MPIN, token and credentials alone.
    pub async fn clear_auth_state(&self) -> bool {
        self.remove(&self.namespaces.auth_state()).await.is_success()
    }

    // =========================================================================
    // Biometrics
    // =========================================================================

    /// Fail-closed: a failing platform query reports no biometry.
    pub async fn get_supported_biometry_type(&self) -> BiometricSupport {
        match self.store.supported_biometry().await {
            Ok(kind) => {
                debug!("Supported biometry: {:?}", kind);
                BiometricSupport::from_kind(kind)
            }
            Err(e) => {
                error!("Error checking biometry support: {}", e);
                BiometricSupport::failed("Failed to check biometric support")
            }
        }
    }

    pub async fn try_save_credentials_with_biometrics(
        &self,
        username: &str,
        password: &str,
        namespace: Option<&str>,
    ) -> VaultOutcome<StoreTier> {
        let namespace = self.namespaces.biometric_credentials(namespace);
        self.put_tiered(&namespace, username, password).await
    }

    /// Does not say which tier took the write; use the `try_` form for that.
    pub async fn save_credentials_with_biometrics(
        &self,
        username: &str,
        password: &str,
        namespace: Option<&str>,
    ) -> bool {
        self.try_save_credentials_with_biometrics(username, password, namespace)
            .await
            .is_success()
    }

    pub async fn try_get_credentials_with_biometrics(
        &self,
        namespace: Option<&str>,
        prompt_message: Option<&str>,
    ) -> VaultOutcome<Credential> {
        let namespace = self.namespaces.biometric_credentials(namespace);
        let prompt = self.config.prompts.credentials.titled(prompt_message);
        debug!("Reading biometric credentials from {}", namespace);

        self.fetch_gated(&namespace, prompt).await.and_then(|stored| {
            if stored.account.is_empty() || stored.secret.is_empty() {
                debug!("Biometric entry in {} has an empty field", namespace);
                VaultOutcome::NotFound
            } else {
                VaultOutcome::Success(Credential::new(stored.account, stored.secret))
            }
        })
    }

    /// Cancelled, failed and absent all come back as `None`.
    pub async fn get_credentials_with_biometrics(
        &self,
        namespace: Option<&str>,
        prompt_message: Option<&str>,
    ) -> Option<Credential> {
        self.try_get_credentials_with_biometrics(namespace, prompt_message)
            .await
            .ok()
    }

    pub async fn try_delete_credentials_with_biometrics(&self, namespace: Option<&str>) -> VaultOutcome<()> {
        let namespace = self.namespaces.biometric_credentials(namespace);
        self.remove_tiered(&namespace).await
    }

    pub async fn delete_credentials_with_biometrics(&self, namespace: Option<&str>) -> bool {
        self.try_delete_credentials_with_biometrics(namespace)
            .await
            .is_success()
    }

    /// Whether readable biometric credentials exist, without showing a prompt.
    ///
    /// An entry the store refuses only because no prompt was attached still
    /// exists. One invalidated by an enrollment change can never be read
    /// again and counts as absent, as does any other failure.
    pub async fn has_biometric_credentials(&self) -> bool {
        let namespace = self.namespaces.biometric_credentials(None);
        match self.store.read(&namespace, &ReadOptions::default()).await {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(Error::BiometricEnrollmentChanged) => {
                info!("Biometric credentials in {} were invalidated by an enrollment change", namespace);
                false
            }
            Err(e @ Error::AuthenticationFailed(_)) => {
                debug!("Biometric credentials present but gated: {}", e);
                true
            }
            Err(e) => {
                debug!("No biometric credentials: {}", e);
                false
            }
        }
    }

    /// Tier recorded for the biometric credentials namespace.
    pub async fn stored_credentials_tier(&self, namespace: Option<&str>) -> Option<StoreTier> {
        self.tier_of(&self.namespaces.biometric_credentials(namespace)).await
    }

    /// Presence of the flag means the user opted into biometric quick-login.
    pub async fn is_biometric_enabled(&self) -> bool {
        let enabled = self
            .fetch(&self.namespaces.biometric_flag(), &ReadOptions::default())
            .await
            .is_success();
        debug!("Biometric login enabled: {}", enabled);
        enabled
    }

    pub async fn set_biometric_enabled(&self) -> bool {
        let saved = self
            .put(
                &self.namespaces.biometric_flag(),
                BIOMETRIC_FLAG_ACCOUNT,
                "true",
                &WriteOptions::plain(),
            )
            .await
            .is_success();
        if saved {
            info!("Biometric login flag set");
        }
        saved
    }

    pub async fn clear_biometric_enabled(&self) -> bool {
        self.remove(&self.namespaces.biometric_flag()).await.is_success()
    }

    // =========================================================================
    // Sensitive key-value data
    // =========================================================================

    /// Returns the tier for biometric saves, `None` for plain ones.
    pub async fn try_save_sensitive_data(
        &self,
        key: &str,
        value: &str,
        use_biometrics: bool,
    ) -> VaultOutcome<Option<StoreTier>> {
        let namespace = self.namespaces.sensitive(key, use_biometrics);
        if use_biometrics {
            self.put_tiered(&namespace, key, value).await.map(Some)
        } else {
            self.put(&namespace, key, value, &WriteOptions::when_unlocked())
                .await
                .map(|()| None)
        }
    }

    pub async fn save_sensitive_data(&self, key: &str, value: &str, use_biometrics: bool) -> bool {
        self.try_save_sensitive_data(key, value, use_biometrics)
            .await
            .is_success()
    }

    pub async fn try_get_sensitive_data(
        &self,
        key: &str,
        use_biometrics: bool,
        prompt_message: Option<&str>,
    ) -> VaultOutcome<String> {
        let namespace = self.namespaces.sensitive(key, use_biometrics);
        let stored = if use_biometrics {
            let prompt = self.config.prompts.sensitive_data.titled(prompt_message);
            self.fetch_gated(&namespace, prompt).await
        } else {
            self.fetch(&namespace, &ReadOptions::default()).await
        };
        stored.map(|stored| stored.secret)
    }

    pub async fn get_sensitive_data(
        &self,
        key: &str,
        use_biometrics: bool,
        prompt_message: Option<&str>,
    ) -> Option<String> {
        self.try_get_sensitive_data(key, use_biometrics, prompt_message)
            .await
            .ok()
    }

    /// Only the slot matching `use_biometrics` is touched.
    pub async fn try_delete_sensitive_data(&self, key: &str, use_biometrics: bool) -> VaultOutcome<()> {
        let namespace = self.namespaces.sensitive(key, use_biometrics);
        if use_biometrics {
            self.remove_tiered(&namespace).await
        } else {
            self.remove(&namespace).await
        }
    }

    pub async fn delete_sensitive_data(&self, key: &str, use_biometrics: bool) -> bool {
        self.try_delete_sensitive_data(key, use_biometrics)
            .await
            .is_success()
    }

    /// Tier recorded for the biometric slot of `key`.
    pub async fn stored_tier(&self, key: &str) -> Option<StoreTier> {
        self.tier_of(&self.namespaces.sensitive(key, true)).await
    }

    // =========================================================================
    // Internet credentials
    // =========================================================================

    pub async fn try_save_internet_credentials(
        &self,
        server: Option<&str>,
        username: &str,
        password: &str,
    ) -> VaultOutcome<()> {
        let server = self.namespaces.internet(server);
        let outcome: VaultOutcome<()> = self.store.write_internet(&server, username, password).await.into();
        log_failure("save internet credentials", &server, &outcome);
        outcome
    }

    pub async fn save_internet_credentials(&self, server: Option<&str>, username: &str, password: &str) -> bool {
        self.try_save_internet_credentials(server, username, password)
            .await
            .is_success()
    }

    pub async fn try_get_internet_credentials(&self, server: Option<&str>) -> VaultOutcome<Credential> {
        let server = self.namespaces.internet(server);
        let outcome = VaultOutcome::from_read(self.store.read_internet(&server).await);
        log_failure("read internet credentials", &server, &outcome);
        outcome.and_then(|stored| {
            if stored.account.is_empty() || stored.secret.is_empty() {
                VaultOutcome::NotFound
            } else {
                VaultOutcome::Success(Credential::new(stored.account, stored.secret))
            }
        })
    }

    pub async fn get_internet_credentials(&self, server: Option<&str>) -> Option<Credential> {
        self.try_get_internet_credentials(server).await.ok()
    }

    pub async fn try_delete_internet_credentials(&self, server: Option<&str>) -> VaultOutcome<()> {
        let server = self.namespaces.internet(server);
        let outcome: VaultOutcome<()> = self.store.reset_internet(&server).await.into();
        log_failure("delete internet credentials", &server, &outcome);
        outcome
    }

    pub async fn delete_internet_credentials(&self, server: Option<&str>) -> bool {
        self.try_delete_internet_credentials(server)
            .await
            .is_success()
    }
}

/// Log a failed operation. Secret values never reach the log.
fn log_failure<T>(operation: &str, namespace: &str, outcome: &VaultOutcome<T>) {
    match outcome {
        VaultOutcome::Success(_) => {}
        VaultOutcome::NotFound => debug!("{}: nothing stored in {}", operation, namespace),
        VaultOutcome::Cancelled => info!("{}: user cancelled authentication for {}", operation, namespace),
        VaultOutcome::Denied(reason) | VaultOutcome::Unsupported(reason) => {
            warn!("{} failed for {} ({}): {}", operation, namespace, outcome.kind(), reason)
        }
        VaultOutcome::StoreError(reason) | VaultOutcome::Invalid(reason) => {
            error!("Error during {} for {}: {}", operation, namespace, reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::BiometryType;
    use crate::store::{MemoryStore, PromptResponse};

    fn vault_on(store: MemoryStore) -> (Arc<MemoryStore>, SecureVault<MemoryStore>) {
        let store = Arc::new(store);
        let config = VaultConfig::default().with_service_name("TestVault");
        (Arc::clone(&store), SecureVault::new(store, config))
    }

    fn vault() -> (Arc<MemoryStore>, SecureVault<MemoryStore>) {
        vault_on(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_credential_lifecycle() {
        let (_, vault) = vault();
        assert!(vault.save_credential("alice", "p@ss1", None).await);
        assert_eq!(
            vault.get_credential(None).await,
            Some(Credential::new("alice", "p@ss1"))
        );

        assert!(vault.delete_credential(None).await);
        assert_eq!(vault.get_credential(None).await, None);
        // Idempotent delete
        assert!(vault.delete_credential(None).await);
    }

    #[tokio::test]
    async fn test_credential_overwrite_and_override_namespace() {
        let (store, vault) = vault();
        vault.save_credential("alice", "one", None).await;
        vault.save_credential("bob", "two", None).await;
        vault.save_credential("carol", "three", Some("Other")).await;

        assert_eq!(vault.get_credential(None).await.unwrap().username, "bob");
        assert_eq!(vault.get_credential(Some("Other")).await.unwrap().username, "carol");
        assert!(store.contains("Other").await);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let (store, vault) = vault();
        vault.save_credential("alice", "pw", None).await;
        store.set_outage(Some(Error::Io("keystore crashed".into()))).await;

        assert!(!vault.save_credential("bob", "pw", None).await);
        assert_eq!(vault.get_credential(None).await, None);
        assert!(!vault.delete_credential(None).await);
        assert!(!vault.get_auth_state().await);
        assert!(matches!(
            vault.try_get_credential(None).await,
            VaultOutcome::StoreError(_)
        ));
    }

    #[tokio::test]
    async fn test_token_round_trip() {
        let (_, vault) = vault();
        assert!(vault.save_token("tok-123", Some("2025-01-01T00:00:00Z")).await);
        assert_eq!(
            vault.get_token().await,
            Some(AuthToken::new("tok-123", Some("2025-01-01T00:00:00Z".into())))
        );

        assert!(vault.save_token("tok-456", None).await);
        assert_eq!(vault.get_token().await.unwrap().expires_at, None);

        assert!(vault.delete_token().await);
        assert_eq!(vault.get_token().await, None);
    }

    #[tokio::test]
    async fn test_corrupt_token_reads_as_absent() {
        let (store, vault) = vault();
        store
            .write("TestVault_TOKEN", "auth_token", "{not json", &WriteOptions::plain())
            .await
            .unwrap();
        assert_eq!(vault.try_get_token().await, VaultOutcome::NotFound);
        assert_eq!(vault.get_token().await, None);
    }

    #[tokio::test]
    async fn test_mpin_scenario() {
        let (store, vault) = vault();
        assert!(!vault.verify_mpin("1234").await);
        assert!(!vault.verify_mpin("").await);

        assert!(vault.save_mpin("1234").await);
        assert!(vault.verify_mpin("1234").await);
        assert!(!vault.verify_mpin("0000").await);
        assert_eq!(vault.get_mpin().await.as_deref(), Some("1234"));
        assert_eq!(
            store.write_options("TestVault_MPIN").await.unwrap(),
            WriteOptions::when_unlocked()
        );

        assert!(vault.delete_mpin().await);
        assert!(!vault.verify_mpin("1234").await);
    }

    #[tokio::test]
    async fn test_invalid_mpin_is_not_saved() {
        let (store, vault) = vault();
        assert!(!vault.save_mpin("12").await);
        assert!(!vault.save_mpin("12ab").await);
        assert!(matches!(vault.try_save_mpin("1234567").await, VaultOutcome::Invalid(_)));
        assert!(!store.contains("TestVault_MPIN").await);
    }

    #[tokio::test]
    async fn test_auth_state_last_write_wins() {
        let (_, vault) = vault();
        assert!(!vault.get_auth_state().await);

        vault.save_auth_state(true).await;
        assert!(vault.get_auth_state().await);
        vault.set_auth_state(false).await;
        assert!(!vault.get_auth_state().await);
        vault.set_auth_state(true).await;
        assert!(vault.get_auth_state().await);
    }

    #[tokio::test]
    async fn test_clearing_auth_state_keeps_mpin() {
        let (_, vault) = vault();
        vault.save_mpin("4321").await;
        vault.save_auth_state(true).await;

        assert!(vault.clear_auth_state().await);
        assert!(!vault.get_auth_state().await);
        assert!(vault.verify_mpin("4321").await);
    }

    #[tokio::test]
    async fn test_supported_biometry_fails_closed() {
        let (store, vault) = vault_on(MemoryStore::new().with_biometry(Some(BiometryType::FaceID)));
        let support = vault.get_supported_biometry_type().await;
        assert!(support.available);
        assert_eq!(support.biometry_type, Some(BiometryType::FaceID));

        store.fail_biometry_query("LAContext error").await;
        let support = vault.get_supported_biometry_type().await;
        assert!(!support.available);
        assert!(support.error.is_some());

        let (_, vault) = vault_on(MemoryStore::new().with_biometry(None));
        let support = vault.get_supported_biometry_type().await;
        assert!(!support.available);
        assert_eq!(support.error, None);
    }

    #[tokio::test]
    async fn test_biometric_credentials_use_strong_tier_when_possible() {
        let (store, vault) = vault();
        assert_eq!(
            vault.try_save_credentials_with_biometrics("alice", "pw", None).await,
            VaultOutcome::Success(StoreTier::Strong)
        );
        assert_eq!(
            store.write_options("TestVault_BIOMETRIC").await.unwrap(),
            WriteOptions::strong_tier()
        );
        assert_eq!(vault.stored_credentials_tier(None).await, Some(StoreTier::Strong));

        let cred = vault
            .get_credentials_with_biometrics(None, Some("Login with Fingerprint"))
            .await
            .unwrap();
        assert_eq!(cred, Credential::new("alice", "pw"));

        let prompts = store.prompts_shown().await;
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].title, "Login with Fingerprint");
        assert_eq!(prompts[0].subtitle, "Biometric authentication required");
    }

    #[tokio::test]
    async fn test_biometric_credentials_fall_back_to_software_tier() {
        let (store, vault) = vault_on(MemoryStore::new().with_secure_hardware(false));
        assert!(vault.save_credentials_with_biometrics("alice", "pw", None).await);
        assert_eq!(
            store.write_options("TestVault_BIOMETRIC").await.unwrap(),
            WriteOptions::software_tier()
        );
        assert_eq!(vault.stored_credentials_tier(None).await, Some(StoreTier::Software));

        // Software tier entries are read without a prompt
        assert!(vault.get_credentials_with_biometrics(None, None).await.is_some());
        assert!(store.prompts_shown().await.is_empty());
    }

    #[tokio::test]
    async fn test_tier_metadata_can_be_disabled() {
        let store = Arc::new(MemoryStore::new().with_secure_hardware(false));
        let mut config = VaultConfig::default().with_service_name("NoMeta");
        config.persist_tier_metadata = false;
        let vault = SecureVault::new(Arc::clone(&store), config);

        assert_eq!(
            vault.try_save_sensitive_data("k", "v", true).await,
            VaultOutcome::Success(Some(StoreTier::Software))
        );
        assert_eq!(vault.stored_tier("k").await, None);
        assert_eq!(store.namespaces().await, vec!["NoMeta_K_BIO".to_string()]);
        // Without metadata the prompt is always attached; the store ignores it
        assert_eq!(vault.get_sensitive_data("k", true, None).await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_disabled_metadata_ignores_and_clears_stale_tier() {
        let store = Arc::new(MemoryStore::new());
        store
            .write("NoMeta_K_BIO.tier", "tier", "software", &WriteOptions::when_unlocked())
            .await
            .unwrap();
        let mut config = VaultConfig::default().with_service_name("NoMeta");
        config.persist_tier_metadata = false;
        let vault = SecureVault::new(Arc::clone(&store), config);

        assert_eq!(
            vault.try_save_sensitive_data("k", "v", true).await,
            VaultOutcome::Success(Some(StoreTier::Strong))
        );
        assert!(!store.contains("NoMeta_K_BIO.tier").await);
        assert_eq!(vault.try_get_sensitive_data("k", true, None).await, VaultOutcome::Success("v".into()));
        assert_eq!(store.prompts_shown().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_tier_record_drops_the_old_one() {
        let (store, vault) = vault();
        store
            .write("TestVault_K_BIO.tier", "tier", "software", &WriteOptions::when_unlocked())
            .await
            .unwrap();
        store.fail_next_write("TestVault_K_BIO.tier", Error::Io("flaky".into())).await;

        assert_eq!(
            vault.try_save_sensitive_data("k", "new", true).await,
            VaultOutcome::Success(Some(StoreTier::Strong))
        );
        assert_eq!(vault.stored_tier("k").await, None);
        // Unknown tier attaches the prompt, so the strong entry stays readable
        assert_eq!(vault.get_sensitive_data("k", true, None).await.as_deref(), Some("new"));
        assert_eq!(store.prompts_shown().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_fail_and_absent_all_collapse_to_none() {
        let (store, vault) = vault();
        assert_eq!(vault.get_credentials_with_biometrics(None, None).await, None);

        vault.save_credentials_with_biometrics("alice", "pw", None).await;

        store.set_prompt_response(PromptResponse::Cancel).await;
        assert_eq!(vault.get_credentials_with_biometrics(None, None).await, None);
        assert_eq!(
            vault.try_get_credentials_with_biometrics(None, None).await,
            VaultOutcome::Cancelled
        );

        store.set_prompt_response(PromptResponse::Fail).await;
        assert_eq!(vault.get_credentials_with_biometrics(None, None).await, None);
        assert!(matches!(
            vault.try_get_credentials_with_biometrics(None, None).await,
            VaultOutcome::Denied(_)
        ));
    }

    #[tokio::test]
    async fn test_enrollment_change_locks_out_strong_entries() {
        let (store, vault) = vault();
        vault.save_credentials_with_biometrics("alice", "pw", None).await;
        store.change_enrollment().await;

        assert!(matches!(
            vault.try_get_credentials_with_biometrics(None, None).await,
            VaultOutcome::Denied(_)
        ));
    }

    #[tokio::test]
    async fn test_invalidated_credentials_are_not_reported_as_present() {
        let (store, vault) = vault();
        vault.save_credentials_with_biometrics("alice", "pw", None).await;
        assert!(vault.has_biometric_credentials().await);

        store.change_enrollment().await;
        assert_eq!(vault.get_credentials_with_biometrics(None, None).await, None);
        assert!(!vault.has_biometric_credentials().await);
    }

    #[tokio::test]
    async fn test_biometric_save_fails_when_both_tiers_fail() {
        let (store, vault) = vault();
        store.set_outage(Some(Error::Internal("keystore wedged".into()))).await;
        assert!(!vault.save_credentials_with_biometrics("a", "b", None).await);
        assert!(matches!(
            vault.try_save_credentials_with_biometrics("a", "b", None).await,
            VaultOutcome::StoreError(_)
        ));
    }

    #[tokio::test]
    async fn test_has_biometric_credentials_never_prompts() {
        let (store, vault) = vault();
        assert!(!vault.has_biometric_credentials().await);

        vault.save_credentials_with_biometrics("alice", "pw", None).await;
        assert!(vault.has_biometric_credentials().await);
        assert!(store.prompts_shown().await.is_empty());

        assert!(vault.delete_credentials_with_biometrics(None).await);
        assert!(!vault.has_biometric_credentials().await);
        assert_eq!(vault.stored_credentials_tier(None).await, None);
    }

    #[tokio::test]
    async fn test_sensitive_data_namespaces_are_bifurcated() {
        let (store, vault) = vault();
        assert!(vault.save_sensitive_data("api_key", "sk-1", true).await);
        assert_eq!(vault.get_sensitive_data("api_key", false, None).await, None);
        assert_eq!(
            vault.get_sensitive_data("api_key", true, None).await.as_deref(),
            Some("sk-1")
        );

        assert!(vault.save_sensitive_data("api_key", "plain", false).await);
        assert_eq!(
            store.write_options("TestVault_API_KEY").await.unwrap(),
            WriteOptions::when_unlocked()
        );

        // Deleting the plain slot leaves the biometric one alone
        assert!(vault.delete_sensitive_data("api_key", false).await);
        assert_eq!(vault.get_sensitive_data("api_key", false, None).await, None);
        assert_eq!(
            vault.get_sensitive_data("api_key", true, None).await.as_deref(),
            Some("sk-1")
        );

        assert!(vault.delete_sensitive_data("api_key", true).await);
        assert_eq!(vault.get_sensitive_data("api_key", true, None).await, None);
        assert!(store.namespaces().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_sensitive_read_looks_like_nothing_saved() {
        let (store, vault) = vault();
        assert_eq!(
            vault.try_save_sensitive_data("api_key", "sk-1", true).await,
            VaultOutcome::Success(Some(StoreTier::Strong))
        );
        store.set_prompt_response(PromptResponse::Cancel).await;

        let cancelled = vault.get_sensitive_data("api_key", true, Some("Unlock API key")).await;
        let never_saved = vault.get_sensitive_data("other", true, None).await;
        assert_eq!(cancelled, None);
        assert_eq!(cancelled, never_saved);
        assert_eq!(store.prompts_shown().await[0].title, "Unlock API key");
    }

    #[tokio::test]
    async fn test_plain_sensitive_reads_never_prompt() {
        let (store, vault) = vault();
        vault.save_sensitive_data("note", "hello", false).await;
        assert_eq!(vault.get_sensitive_data("note", false, Some("ignored")).await.as_deref(), Some("hello"));
        assert!(store.prompts_shown().await.is_empty());
        assert_eq!(vault.try_save_sensitive_data("n2", "v", false).await, VaultOutcome::Success(None));
    }

    #[tokio::test]
    async fn test_internet_credentials() {
        let (_, vault) = vault();
        assert!(vault.save_internet_credentials(Some("api.example.com"), "bob", "pw").await);
        assert!(vault.save_internet_credentials(None, "anon", "pw1").await);
        assert!(vault.save_internet_credentials(None, "anon2", "pw2").await);

        assert_eq!(
            vault.get_internet_credentials(Some("api.example.com")).await,
            Some(Credential::new("bob", "pw"))
        );
        // Serverless credentials share one slot
        assert_eq!(vault.get_internet_credentials(None).await.unwrap().username, "anon2");

        assert!(vault.delete_internet_credentials(Some("api.example.com")).await);
        assert_eq!(vault.get_internet_credentials(Some("api.example.com")).await, None);
        assert!(vault.get_internet_credentials(None).await.is_some());
    }

    #[tokio::test]
    async fn test_biometric_enabled_flag_is_independent() {
        let (_, vault) = vault();
        assert!(!vault.is_biometric_enabled().await);
        assert!(vault.set_biometric_enabled().await);
        assert!(vault.is_biometric_enabled().await);
        assert!(!vault.has_biometric_credentials().await);

        assert!(vault.clear_biometric_enabled().await);
        assert!(!vault.is_biometric_enabled().await);
    }

    #[tokio::test]
    async fn test_token_and_mpin_biometric_variants() {
        let (store, vault) = vault();
        assert!(vault.save_token_with_biometrics("tok", None).await);
        assert_eq!(
            store.write_options("TestVault_TOKEN").await.unwrap(),
            WriteOptions::software_tier()
        );
        assert_eq!(vault.get_token_with_biometrics(None).await.unwrap().token, "tok");
        // The plain reader sees the same slot
        assert_eq!(vault.get_token().await.unwrap().token, "tok");

        assert!(vault.save_mpin_with_biometrics("2468").await);
        assert!(vault.verify_mpin_with_biometrics("2468", None).await);
        assert!(!vault.verify_mpin_with_biometrics("1357", None).await);
        assert!(vault.verify_mpin("2468").await);
    }

    #[tokio::test]
    async fn test_service_names_isolate_vaults() {
        let store = Arc::new(MemoryStore::new());
        let a = SecureVault::new(Arc::clone(&store), VaultConfig::default().with_service_name("RunA"));
        let b = SecureVault::new(Arc::clone(&store), VaultConfig::default().with_service_name("RunB"));

        a.save_credential("alice", "pw", None).await;
        assert_eq!(b.get_credential(None).await, None);
        assert!(a.get_credential(None).await.is_some());
    }

    #[tokio::test]
    async fn test_works_through_trait_object() {
        let store: Arc<dyn SecureStore> = Arc::new(MemoryStore::new());
        let vault: SecureVault = SecureVault::new(store, VaultConfig::default());
        assert!(vault.save_sensitive_data("k", "v", false).await);
        assert_eq!(vault.get_sensitive_data("k", false, None).await.as_deref(), Some("v"));
    }
}
