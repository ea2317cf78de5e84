//! # Validation Module
//!
//! Input validation rules for Stockbridge.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Settings surface (out of scope here)                         │
//! │  └── Basic format checks before persisting options                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── PKCE verifier shape (length, charset)                             │
//! │  └── Binding sanity (ids present and plausible)                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Remote marketplace                                           │
//! │  └── Rejects anything the API considers invalid                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockbridge_core::validation::validate_code_verifier;
//!
//! validate_code_verifier("dBjftJeZ4CVPmB92K27uhbUJU1p1rwW1gFWFOEjXkAB").unwrap();
//! ```

use crate::error::ValidationError;
use crate::types::Binding;
use crate::{MAX_CODE_VERIFIER_LEN, MIN_CODE_VERIFIER_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// PKCE Validators
// =============================================================================

/// Validates a PKCE code verifier.
///
/// ## Rules
/// - Length between 43 and 128 characters (RFC 7636 §4.1)
/// - Characters drawn only from `[A-Za-z0-9]` (the generator never emits the
///   RFC's `-._~` extras, and the validator holds it to that)
pub fn validate_code_verifier(verifier: &str) -> ValidationResult<()> {
    let len = verifier.chars().count();
    if !(MIN_CODE_VERIFIER_LEN..=MAX_CODE_VERIFIER_LEN).contains(&len) {
        return Err(ValidationError::VerifierLength {
            actual: len,
            min: MIN_CODE_VERIFIER_LEN,
            max: MAX_CODE_VERIFIER_LEN,
        });
    }

    if let Some(bad) = verifier.chars().find(|c| !c.is_ascii_alphanumeric()) {
        return Err(ValidationError::VerifierCharset(bad));
    }

    Ok(())
}

// =============================================================================
// Binding Validators
// =============================================================================

/// Validates a single binding.
///
/// Duplicate local product ids across bindings are allowed; this only checks
/// that one binding is internally plausible.
pub fn validate_binding(binding: &Binding) -> ValidationResult<()> {
    if binding.local_product_id <= 0 {
        return Err(ValidationError::NonPositiveProductId(
            binding.local_product_id,
        ));
    }

    if binding.remote_offer_id.trim().is_empty() {
        return Err(ValidationError::EmptyOfferId(binding.local_product_id));
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_length_bounds() {
        let short = "a".repeat(42);
        let min = "a".repeat(43);
        let max = "a".repeat(128);
        let long = "a".repeat(129);

        assert!(matches!(
            validate_code_verifier(&short),
            Err(ValidationError::VerifierLength { actual: 42, .. })
        ));
        assert!(validate_code_verifier(&min).is_ok());
        assert!(validate_code_verifier(&max).is_ok());
        assert!(matches!(
            validate_code_verifier(&long),
            Err(ValidationError::VerifierLength { actual: 129, .. })
        ));
    }

    #[test]
    fn test_verifier_charset() {
        let mut verifier = "a".repeat(42);
        verifier.push('-');
        assert_eq!(
            validate_code_verifier(&verifier),
            Err(ValidationError::VerifierCharset('-'))
        );

        let mixed = "Abc123".repeat(8); // 48 chars, all alnum
        assert!(validate_code_verifier(&mixed).is_ok());
    }

    #[test]
    fn test_binding_validation() {
        assert!(validate_binding(&Binding::new(1, "OFFER")).is_ok());
        assert_eq!(
            validate_binding(&Binding::new(0, "OFFER")),
            Err(ValidationError::NonPositiveProductId(0))
        );
        assert_eq!(
            validate_binding(&Binding::new(7, "  ")),
            Err(ValidationError::EmptyOfferId(7))
        );
    }
}
