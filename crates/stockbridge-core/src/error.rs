//! # Error Types
//!
//! Domain-specific error types for stockbridge-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockbridge-core errors (this file)                                   │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockbridge-store errors (separate crate)                             │
//! │  └── StoreError       - State file / journal failures                  │
//! │                                                                         │
//! │  stockbridge-sync errors (separate crate)                              │
//! │  └── SyncError        - Token, client and engine failures              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product id, offer id, ...)
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A domain invariant was violated.
    #[error("Invariant violated: {0}")]
    InvariantViolated(String),

    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// PKCE code verifier has the wrong length.
    #[error("Code verifier length {actual} outside allowed range {min}..={max}")]
    VerifierLength {
        actual: usize,
        min: usize,
        max: usize,
    },

    /// PKCE code verifier contains a disallowed character.
    #[error("Code verifier contains disallowed character {0:?}")]
    VerifierCharset(char),

    /// Binding references an empty remote offer id.
    #[error("Binding for local product {0} has an empty remote offer id")]
    EmptyOfferId(i64),

    /// Binding references a non-positive local product id.
    #[error("Binding has non-positive local product id {0}")]
    NonPositiveProductId(i64),
}
