//! # Sync Error Types
//!
//! Error taxonomy for the sync engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌──────────────────┐  ┌───────────────────────┐  │
//! │  │  Configuration  │  │  Authorization   │  │       Token           │  │
//! │  │                 │  │      Flow        │  │                       │  │
//! │  │  MissingClientId│  │  MissingAuthCode │  │  TokenExchangeFailed  │  │
//! │  │  MissingCreds   │  │  NoPendingAuth   │  │  TokenRefreshFailed   │  │
//! │  │  InvalidUrl     │  │  MissingState    │  │  NoRefreshToken       │  │
//! │  │  ConfigLoad/Save│  │  StateMismatch   │  │  Unauthenticated      │  │
//! │  └─────────────────┘  └──────────────────┘  └───────────────────────┘  │
//! │                                                                         │
//! │  ┌──────────────────────────────┐  ┌───────────────────────────────┐   │
//! │  │         Per-binding          │  │          Internal             │   │
//! │  │                              │  │                               │   │
//! │  │  LocalProductNotFound        │  │  Transport                    │   │
//! │  │  RemoteOfferNotFound         │  │  Store                        │   │
//! │  │  RemoteRequestFailed         │  │  Serialization                │   │
//! │  │  SyncAborted (batch)         │  │  MalformedOffer               │   │
//! │  └──────────────────────────────┘  └───────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error is recovered at an operation boundary; nothing here is ever
//! allowed to escalate into a process crash.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all engine failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors (operator action required, never retried)
    // =========================================================================
    /// Client ID is unset; the authorization flow cannot start.
    #[error("Marketplace client ID is not configured")]
    MissingClientId,

    /// Client ID and/or secret unset; token endpoints cannot be called.
    #[error("Marketplace client ID and/or secret is not configured")]
    MissingCredentials,

    /// A configured URL does not parse.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save the config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Authorization-Flow Errors (abort the flow, safe to re-initiate)
    // =========================================================================
    /// The callback arrived without an authorization code.
    #[error("Authorization callback carried no code")]
    MissingAuthCode,

    /// No pending authorization is stored for this callback.
    #[error("No pending authorization to complete")]
    NoPendingAuthorization,

    /// The callback arrived without the anti-CSRF state.
    #[error("Authorization callback carried no state")]
    MissingState,

    /// The returned state does not match the stored one.
    #[error("Authorization state mismatch")]
    StateMismatch,

    // =========================================================================
    // Token Errors (credential left unchanged)
    // =========================================================================
    /// The authorization-code exchange failed.
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// The refresh-token grant failed; the old token stays in place.
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// No refresh token is stored.
    #[error("No refresh token stored; re-link the marketplace account")]
    NoRefreshToken,

    /// No access token is available for a marketplace call.
    #[error("Not authenticated with the marketplace")]
    Unauthenticated,

    // =========================================================================
    // Per-Binding Errors
    // =========================================================================
    /// The bound product does not exist in the local store.
    #[error("Product {0} not found in the local store")]
    LocalProductNotFound(i64),

    /// The bound offer does not exist on the marketplace (HTTP 404).
    #[error("Offer \"{0}\" not found on the marketplace")]
    RemoteOfferNotFound(String),

    /// The marketplace answered with an unexpected status.
    #[error("Marketplace request failed with HTTP {status}: {detail}")]
    RemoteRequestFailed { status: u16, detail: String },

    /// A batch operation stopped at a failing binding (fail-fast policy).
    #[error(
        "Sync aborted at binding {local_product_id} (local) / \"{remote_offer_id}\" (remote) \
         after {processed} synced: {source}"
    )]
    SyncAborted {
        local_product_id: i64,
        remote_offer_id: String,
        processed: usize,
        #[source]
        source: Box<SyncError>,
    },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// The offer document is missing the stock.available field.
    #[error("Offer \"{0}\" has no stock.available field")]
    MalformedOffer(String),

    /// HTTP transport failure (connect, timeout, TLS, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Persisted-state failure.
    #[error("State store error: {0}")]
    Store(#[from] stockbridge_store::StoreError),

    /// JSON (de)serialization failure.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if this error requires operator action (missing
    /// credentials or broken configuration) and must never be retried.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::MissingClientId
                | SyncError::MissingCredentials
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error aborted an authorization flow; the flow is
    /// safe to retry by re-initiating from the start.
    pub fn is_auth_flow_error(&self) -> bool {
        matches!(
            self,
            SyncError::MissingAuthCode
                | SyncError::NoPendingAuthorization
                | SyncError::MissingState
                | SyncError::StateMismatch
        )
    }

    /// Returns true if the operation may succeed on a plain retry.
    ///
    /// Only transport-level failures qualify. HTTP status results, not-found
    /// conditions and configuration problems are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport(_))
    }

    /// Returns true if a missing or stale access token caused the failure.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            SyncError::Unauthenticated
                | SyncError::NoRefreshToken
                | SyncError::TokenExchangeFailed(_)
                | SyncError::TokenRefreshFailed(_)
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
