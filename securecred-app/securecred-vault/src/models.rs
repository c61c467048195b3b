//! Data types shared by the vault, its stores and its callers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The backend a store writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecretStorageMethod {
    /// In-process simulation of a mobile keystore.
    MemorySimulation,
    /// macOS Keychain.
    MacOSKeychain,
    /// Windows Credential Manager.
    WindowsCredentialManager,
    /// Linux kernel keyutils.
    LinuxKeyutils,
    /// AES-256-GCM encrypted file with a passphrase-derived key.
    EncryptedFile,
}

/// Kind of biometric sensor the platform reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BiometryType {
    TouchID,
    FaceID,
    OpticID,
    Fingerprint,
    Face,
    Iris,
}

impl BiometryType {
    /// Human-readable name used in prompt texts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::TouchID => "Touch ID",
            Self::FaceID => "Face ID",
            Self::OpticID => "Optic ID",
            Self::Fingerprint => "Fingerprint",
            Self::Face => "Face Recognition",
            Self::Iris => "Iris Recognition",
        }
    }
}

impl fmt::Display for BiometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Result of asking the platform which biometry it supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricSupport {
    /// True iff the platform reported a biometry kind.
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biometry_type: Option<BiometryType>,
    /// Why the query itself failed (fail-closed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BiometricSupport {
    /// Build from the platform answer; `None` means no biometry.
    pub fn from_kind(kind: Option<BiometryType>) -> Self {
        Self {
            available: kind.is_some(),
            biometry_type: kind,
            error: None,
        }
    }

    /// The platform query failed.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            biometry_type: None,
            error: Some(reason.into()),
        }
    }

    /// Name for prompt texts, "Biometrics" when the kind is unknown.
    pub fn display_name(&self) -> &'static str {
        self.biometry_type
            .as_ref()
            .map(BiometryType::display_name)
            .unwrap_or("Biometrics")
    }
}

/// A username/password pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// A session token with optional advisory expiry.
///
/// Stored as the JSON `{"token": .., "expiresAt": ..}` in the token namespace.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl AuthToken {
    pub fn new(token: impl Into<String>, expires_at: Option<String>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Token expiring `hours` from now, timestamp in ISO-8601 UTC with millis.
    ///
    /// `None` when the expiry is not representable.
    pub fn expiring_in(token: impl Into<String>, hours: i64) -> Option<Self> {
        let expiry = TimeDelta::try_hours(hours).and_then(|ttl| Utc::now().checked_add_signed(ttl))?;
        Some(Self::new(token, Some(expiry.to_rfc3339_opts(SecondsFormat::Millis, true))))
    }

    /// Whether the advisory expiry lies before `now`.
    ///
    /// Tokens without an expiry, or with one that does not parse, never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|expiry| expiry.with_timezone(&Utc) < now)
            .unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Raw entry as returned by a store read.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSecret {
    /// Account label written alongside the secret (username, "mpin", ...).
    pub account: String,
    pub secret: String,
}

impl fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSecret")
            .field("account", &self.account)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Which tier accepted a biometric write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreTier {
    /// Hardware-backed, gated by the current biometric enrollment.
    Strong,
    /// Software-encrypted fallback, not necessarily gated on read.
    Software,
}

impl StoreTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "strong",
            Self::Software => "software",
        }
    }
}

impl fmt::Display for StoreTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strong" => Ok(Self::Strong),
            "software" => Ok(Self::Software),
            other => Err(Error::Serialization(format!("Unknown store tier: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_json_shape() {
        let token = AuthToken::new("tok-123", Some("2025-01-01T00:00:00Z".into()));
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, r#"{"token":"tok-123","expiresAt":"2025-01-01T00:00:00Z"}"#);

        let bare: AuthToken = serde_json::from_str(r#"{"token":"abc"}"#).unwrap();
        assert_eq!(bare.expires_at, None);
        assert_eq!(serde_json::to_string(&bare).unwrap(), r#"{"token":"abc"}"#);
    }

    #[test]
    fn test_token_expiry_is_advisory() {
        let now = DateTime::parse_from_rfc3339("2025-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let old = AuthToken::new("a", Some("2025-01-01T00:00:00Z".into()));
        assert!(old.is_expired_at(now));

        let future = AuthToken::new("b", Some("2026-01-01T00:00:00.000Z".into()));
        assert!(!future.is_expired_at(now));

        assert!(!AuthToken::new("c", None).is_expired_at(now));
        assert!(!AuthToken::new("d", Some("not a date".into())).is_expired_at(now));
    }

    #[test]
    fn test_expiring_in_is_in_the_future() {
        let token = AuthToken::expiring_in("t", 24).unwrap();
        assert!(!token.is_expired());
        assert!(token.expires_at.unwrap().ends_with('Z'));
    }

    #[test]
    fn test_expiring_in_out_of_range_is_none() {
        assert_eq!(AuthToken::expiring_in("t", i64::MAX), None);
        assert_eq!(AuthToken::expiring_in("t", i64::MIN), None);
        assert!(AuthToken::expiring_in("t", 0).is_some());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cred = Credential::new("alice", "p@ss1");
        let debug = format!("{:?}", cred);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("p@ss1"));
    }

    #[test]
    fn test_biometric_support_names() {
        let face = BiometricSupport::from_kind(Some(BiometryType::FaceID));
        assert!(face.available);
        assert_eq!(face.display_name(), "Face ID");

        let none = BiometricSupport::from_kind(None);
        assert!(!none.available);
        assert_eq!(none.display_name(), "Biometrics");

        let failed = BiometricSupport::failed("query failed");
        assert!(!failed.available);
        assert_eq!(failed.error.as_deref(), Some("query failed"));
    }

    #[test]
    fn test_store_tier_round_trips_through_str() {
        for tier in [StoreTier::Strong, StoreTier::Software] {
            assert_eq!(tier.as_str().parse::<StoreTier>().unwrap(), tier);
        }
        assert!("hardware".parse::<StoreTier>().is_err());
    }
}
