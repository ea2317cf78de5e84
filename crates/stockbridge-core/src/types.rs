//! # Domain Types
//!
//! Core domain types used throughout Stockbridge.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────────┐   ┌────────────────┐  │
//! │  │     Binding      │   │      Credential      │   │     Notice     │  │
//! │  │  ──────────────  │   │  ──────────────────  │   │  ────────────  │  │
//! │  │  local_product_id│   │  access_token        │   │  kind          │  │
//! │  │  remote_offer_id │   │  refresh_token       │   │  message       │  │
//! │  │                  │   │  expires_in          │   │  (one-shot)    │  │
//! │  │  serialized as   │   │  issued_at           │   └────────────────┘  │
//! │  │  [id, "offer"]   │   └──────────────────────┘                       │
//! │  └──────────────────┘                                                  │
//! │                                                                         │
//! │  ┌──────────────────────┐   ┌──────────────────┐   ┌────────────────┐  │
//! │  │ PendingAuthorization │   │    LocalOrder    │   │    LogEntry    │  │
//! │  │  ──────────────────  │   │  ──────────────  │   │  ────────────  │  │
//! │  │  code_verifier       │   │  id              │   │  timestamp     │  │
//! │  │  state               │   │  line_items      │   │  operation     │  │
//! │  │  (consumed once)     │   └──────────────────┘   │  severity      │  │
//! │  └──────────────────────┘                          └────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Binding
// =============================================================================

/// A declared pairing between one local product and one remote offer.
///
/// The binding is the unit of synchronization: every sync operation moves the
/// stock quantity of exactly one binding in one direction.
///
/// ## Persisted Form
/// Bindings are serialized as 2-element `[localId, "remoteId"]` pairs, which
/// is the shape the settings layer stores and the shape older installations
/// already have on disk.
///
/// ## Duplicates
/// Uniqueness of `local_product_id` is deliberately NOT enforced. Duplicate
/// bindings are processed independently, so one local product may feed several
/// remote offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i64, String)", into = "(i64, String)")]
pub struct Binding {
    /// Identifier of the product in the local store.
    pub local_product_id: i64,

    /// Identifier of the offer on the remote marketplace.
    pub remote_offer_id: String,
}

impl Binding {
    /// Creates a new binding.
    pub fn new(local_product_id: i64, remote_offer_id: impl Into<String>) -> Self {
        Binding {
            local_product_id,
            remote_offer_id: remote_offer_id.into(),
        }
    }
}

impl From<(i64, String)> for Binding {
    fn from((local_product_id, remote_offer_id): (i64, String)) -> Self {
        Binding {
            local_product_id,
            remote_offer_id,
        }
    }
}

impl From<Binding> for (i64, String) {
    fn from(binding: Binding) -> Self {
        (binding.local_product_id, binding.remote_offer_id)
    }
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (local) <-> {} (remote)",
            self.local_product_id, self.remote_offer_id
        )
    }
}

// =============================================================================
// Credential
// =============================================================================

/// The single shared OAuth2 credential for the remote marketplace.
///
/// ## Invariant
/// `access_token` and `issued_at` are either both present or both absent.
/// [`Credential::store_tokens`] is the only mutation that sets them, and it
/// always sets both.
///
/// ## Lifecycle
/// ```text
/// install          authorization exchange        refresh
///   │                      │                        │
///   ▼                      ▼                        ▼
/// empty ──────────► populated (issued_at=now) ──► refreshed in place
///                                                 (issued_at reset)
/// ```
/// The credential is never deleted except by re-authorization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token for marketplace API calls. Empty when unauthorized.
    #[serde(default)]
    pub access_token: String,

    /// Token used to obtain a fresh access token. Empty when unauthorized.
    #[serde(default)]
    pub refresh_token: String,

    /// Access token lifetime in seconds, as reported by the token endpoint.
    #[serde(default)]
    pub expires_in: i64,

    /// When the current access token was issued. `None` when unauthorized.
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Returns true if an access token is present.
    pub fn is_authorized(&self) -> bool {
        !self.access_token.is_empty() && self.issued_at.is_some()
    }

    /// Seconds elapsed since the token was issued, or `None` when unauthorized.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.issued_at.map(|issued| (now - issued).num_seconds())
    }

    /// Returns true if the token has reached the end of its reported lifetime.
    ///
    /// Expiry is inclusive: a token with `expires_in = 3600` is expired at
    /// exactly 3600 elapsed seconds.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.elapsed_secs(now) {
            Some(elapsed) => elapsed >= self.expires_in,
            None => false,
        }
    }

    /// Stores a fresh token pair, resetting the issue timestamp.
    ///
    /// Used identically by the authorization-code exchange and the refresh
    /// path, so both uphold the access_token/issued_at invariant.
    pub fn store_tokens(
        &mut self,
        access_token: String,
        refresh_token: String,
        expires_in: i64,
        issued_at: DateTime<Utc>,
    ) {
        self.access_token = access_token;
        self.refresh_token = refresh_token;
        self.expires_in = expires_in;
        self.issued_at = Some(issued_at);
    }
}

// =============================================================================
// Pending Authorization
// =============================================================================

/// Ephemeral state for an in-flight PKCE authorization-code flow.
///
/// Created when the flow is initiated and consumed (deleted) exactly once when
/// the callback arrives. One-shot consumption is what prevents both replay of
/// an authorization code and CSRF via a forged callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    /// PKCE code verifier, 43-128 characters from `[A-Za-z0-9]`.
    pub code_verifier: String,

    /// Anti-CSRF state, 128 bits hex-encoded.
    pub state: String,
}

// =============================================================================
// Local Order
// =============================================================================

/// An order placed in the local store, as seen by the order hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalOrder {
    /// Order identifier in the local store.
    pub id: i64,

    /// Ordered line items.
    pub line_items: Vec<LocalOrderLine>,
}

/// One line of a local order. Only the product reference matters for sync;
/// quantities are re-read from the product itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalOrderLine {
    /// Product ordered on this line.
    pub product_id: i64,
}

// =============================================================================
// Journal Types
// =============================================================================

/// Severity of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Routine progress message.
    Info,

    /// An operation completed successfully.
    Success,

    /// An operation failed.
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Success => write!(f, "SUCCESS"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// One entry of the append-only journal.
///
/// The journal is a write-only side effect of every engine operation; nothing
/// reads it back for control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,

    /// Operation the message originates from (e.g. `token.refresh`).
    pub operation: String,

    /// Human-readable message.
    pub message: String,

    /// Entry severity.
    pub severity: Severity,
}

impl LogEntry {
    /// Renders the entry as one journal line.
    ///
    /// Format: `[<ISO8601>] (<SEVERITY>) <operation> '<message>'`
    pub fn render(&self) -> String {
        format!(
            "[{}] ({}) {} '{}'",
            self.timestamp.to_rfc3339(),
            self.severity,
            self.operation,
            self.message
        )
    }
}

// =============================================================================
// Notices
// =============================================================================

/// Kind of a one-shot settings notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Green "it worked" banner.
    Success,

    /// Red "see the logs" banner.
    Error,
}

/// A one-shot user-facing notice for the settings surface.
///
/// Engine operations enqueue at most one notice; the (out-of-scope) admin
/// surface consumes it on next render. Only the first notice sticks until it
/// is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Banner kind.
    pub kind: NoticeKind,

    /// Banner text.
    pub message: String,
}

impl Notice {
    /// Creates a success notice.
    pub fn success(message: impl Into<String>) -> Self {
        Notice {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    /// Creates an error notice.
    pub fn error(message: impl Into<String>) -> Self {
        Notice {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_binding_serializes_as_pair() {
        let binding = Binding::new(42, "ABC123");
        let json = serde_json::to_string(&binding).unwrap();
        assert_eq!(json, r#"[42,"ABC123"]"#);

        let back: Binding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, binding);
    }

    #[test]
    fn test_binding_list_roundtrip() {
        let json = r#"[[1,"A"],[2,"B"],[1,"C"]]"#;
        let bindings: Vec<Binding> = serde_json::from_str(json).unwrap();
        assert_eq!(bindings.len(), 3);
        // Duplicate local ids survive deserialization untouched.
        assert_eq!(bindings[0].local_product_id, 1);
        assert_eq!(bindings[2].local_product_id, 1);
        assert_eq!(serde_json::to_string(&bindings).unwrap(), json);
    }

    #[test]
    fn test_credential_empty_is_unauthorized() {
        let credential = Credential::default();
        assert!(!credential.is_authorized());
        assert!(!credential.is_expired(Utc::now()));
        assert_eq!(credential.elapsed_secs(Utc::now()), None);
    }

    #[test]
    fn test_credential_expiry_is_inclusive() {
        let issued = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut credential = Credential::default();
        credential.store_tokens("at".into(), "rt".into(), 3600, issued);

        assert!(credential.is_authorized());
        assert!(!credential.is_expired(issued + chrono::Duration::seconds(3599)));
        assert!(credential.is_expired(issued + chrono::Duration::seconds(3600)));
    }

    #[test]
    fn test_log_entry_render() {
        let entry = LogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            operation: "token.refresh".into(),
            message: "Token refreshed successfully".into(),
            severity: Severity::Success,
        };
        assert_eq!(
            entry.render(),
            "[2024-06-01T12:00:00+00:00] (SUCCESS) token.refresh 'Token refreshed successfully'"
        );
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Info.to_string(), "INFO");
        assert_eq!(Severity::Success.to_string(), "SUCCESS");
        assert_eq!(Severity::Error.to_string(), "ERROR");
    }
}
