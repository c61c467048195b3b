//! MPIN format rules and comparison.

use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::VaultConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MpinError {
    #[error("Please enter your MPIN")]
    Empty,

    #[error("MPIN must be {min}-{max} digits")]
    Length { min: usize, max: usize },

    #[error("MPIN must contain only numbers")]
    NotNumeric,

    #[error("MPINs do not match")]
    Mismatch,
}

/// Check that `pin` is all ASCII digits within the configured length bounds.
pub fn validate_mpin(pin: &str, config: &VaultConfig) -> Result<(), MpinError> {
    if pin.is_empty() {
        return Err(MpinError::Empty);
    }
    if pin.len() < config.mpin_min_len || pin.len() > config.mpin_max_len {
        return Err(MpinError::Length {
            min: config.mpin_min_len,
            max: config.mpin_max_len,
        });
    }
    if !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MpinError::NotNumeric);
    }
    Ok(())
}

/// Exact equality, in constant time for equal-length inputs.
pub(crate) fn mpin_matches(stored: &str, candidate: &str) -> bool {
    stored.len() == candidate.len() && bool::from(stored.as_bytes().ct_eq(candidate.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_mpin() {
        let config = VaultConfig::default();
        assert_eq!(validate_mpin("1234", &config), Ok(()));
        assert_eq!(validate_mpin("123456", &config), Ok(()));
        assert_eq!(validate_mpin("", &config), Err(MpinError::Empty));
        assert_eq!(
            validate_mpin("123", &config),
            Err(MpinError::Length { min: 4, max: 6 })
        );
        assert!(validate_mpin("1234567", &config).is_err());
        assert_eq!(validate_mpin("12a4", &config), Err(MpinError::NotNumeric));
        assert_eq!(
            MpinError::Length { min: 4, max: 6 }.to_string(),
            "MPIN must be 4-6 digits"
        );
    }

    #[test]
    fn test_mpin_matches_is_exact() {
        assert!(mpin_matches("1234", "1234"));
        assert!(!mpin_matches("1234", "0000"));
        assert!(!mpin_matches("1234", "12345"));
        assert!(!mpin_matches("1234", ""));
    }
}
