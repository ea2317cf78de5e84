//! # stockbridge-core: Pure Domain Model for Stockbridge
//!
//! This crate contains the domain types shared by every other Stockbridge
//! crate, expressed as pure data with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Stockbridge Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 stockbridge-sync (engine)                       │   │
//! │  │      TokenManager ── SyncEngine ── OrderWatcher                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ stockbridge-core (THIS CRATE) ★                 │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  Binding  │  │ Credential │  │  Notice   │  │ validation│  │   │
//! │  │   │ local↔    │  │ token pair │  │ one-shot  │  │  rules    │  │   │
//! │  │   │ remote id │  │ + expiry   │  │ banner    │  │  checks   │  │   │
//! │  │   └───────────┘  └────────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Binding, Credential, PendingAuthorization, ...)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation rules (PKCE verifier, bindings)
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Network, file system and clock access is FORBIDDEN here;
//!    functions that need "now" take it as an argument
//! 3. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{CoreError, ValidationError};
pub use types::{
    Binding, Credential, LocalOrder, LocalOrderLine, LogEntry, Notice, NoticeKind,
    PendingAuthorization, Severity,
};

/// Minimum PKCE code verifier length (RFC 7636 §4.1).
pub const MIN_CODE_VERIFIER_LEN: usize = 43;

/// Maximum PKCE code verifier length (RFC 7636 §4.1).
pub const MAX_CODE_VERIFIER_LEN: usize = 128;
