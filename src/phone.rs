//! E.164 phone number normalization.

use once_cell::sync::Lazy;
use regex::Regex;

static E164: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9][0-9]{7,14}$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhoneError {
    #[error("phone number is required")]
    Empty,
    #[error("phone number must be in international format with country code (e.g. +15551234567)")]
    Invalid,
}

/// Strip common separators and check the result is a valid E.164 number.
/// `" +1 (555) 123-4567 "` becomes `"+15551234567"`.
pub fn normalize_phone(raw: &str) -> Result<String, PhoneError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() { return Err(PhoneError::Empty); }
    let compact: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')' | '\t'))
        .collect();
    if E164.is_match(&compact) { Ok(compact) } else { Err(PhoneError::Invalid) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_separators() {
        assert_eq!(normalize_phone(" +1 (555) 123-4567 ").unwrap(), "+15551234567");
        assert_eq!(normalize_phone("+44.20.7946.0958").unwrap(), "+442079460958");
    }

    #[test]
    fn rejects_missing_country_code_and_garbage() {
        assert_eq!(normalize_phone(""), Err(PhoneError::Empty));
        assert_eq!(normalize_phone("   "), Err(PhoneError::Empty));
        assert_eq!(normalize_phone("5551234567"), Err(PhoneError::Invalid));
        assert_eq!(normalize_phone("+0123456789"), Err(PhoneError::Invalid));
        assert_eq!(normalize_phone("+1555abc4567"), Err(PhoneError::Invalid));
        assert_eq!(normalize_phone("+1234567"), Err(PhoneError::Invalid));
        assert_eq!(normalize_phone("+1234567890123456"), Err(PhoneError::Invalid));
    }

    #[test]
    fn boundary_lengths() {
        assert!(normalize_phone("+12345678").is_ok());
        assert!(normalize_phone("+123456789012345").is_ok());
    }
}
