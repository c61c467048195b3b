//! Namespace construction.
//!
//! Every slot the vault uses is `<service>` or `<service>_<SUFFIX>`. Sensitive
//! data keys are uppercased, and the biometric variant of a key gets its own
//! `_BIO` slot: the two are independent entries, never synced.

pub(crate) const TOKEN_ACCOUNT: &str = "auth_token";
pub(crate) const MPIN_ACCOUNT: &str = "mpin";
pub(crate) const AUTH_STATE_ACCOUNT: &str = "auth_state";
pub(crate) const BIOMETRIC_FLAG_ACCOUNT: &str = "biometric_enabled";
pub(crate) const TIER_ACCOUNT: &str = "store_tier";

/// Lowercase, so it can never be produced by an uppercased sensitive-data key.
const TIER_SUFFIX: &str = ".tier";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    service: String,
}

impl Namespaces {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service: service_name.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn suffixed(&self, suffix: &str) -> String {
        format!("{}_{}", self.service, suffix)
    }

    pub fn credentials(&self, namespace_override: Option<&str>) -> String {
        namespace_override
            .map(str::to_string)
            .unwrap_or_else(|| self.service.clone())
    }

    pub fn biometric_credentials(&self, namespace_override: Option<&str>) -> String {
        namespace_override
            .map(str::to_string)
            .unwrap_or_else(|| self.suffixed("BIOMETRIC"))
    }

    pub fn token(&self) -> String {
        self.suffixed("TOKEN")
    }

    pub fn mpin(&self) -> String {
        self.suffixed("MPIN")
    }

    pub fn auth_state(&self) -> String {
        self.suffixed("AUTH_STATE")
    }

    pub fn biometric_flag(&self) -> String {
        self.suffixed("BIOMETRIC_FLAG")
    }

    /// All serverless internet credentials share this one slot.
    pub fn internet(&self, server: Option<&str>) -> String {
        server
            .map(str::to_string)
            .unwrap_or_else(|| self.suffixed("INTERNET"))
    }

    pub fn sensitive(&self, key: &str, use_biometrics: bool) -> String {
        let key = key.to_uppercase();
        if use_biometrics {
            self.suffixed(&format!("{}_BIO", key))
        } else {
            self.suffixed(&key)
        }
    }

    /// Where the tier that accepted a biometric write to `namespace` is recorded.
    pub fn tier_metadata(namespace: &str) -> String {
        format!("{}{}", namespace, TIER_SUFFIX)
    }
}
