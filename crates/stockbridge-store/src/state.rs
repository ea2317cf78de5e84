//! # State Store
//!
//! The handful of options the sync engine owns, persisted as one JSON file.
//!
//! ## Persisted Surface
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          state.json                                     │
//! │                                                                         │
//! │  credential               access/refresh token, expires_in, issued_at  │
//! │  pending_authorization    code verifier + anti-CSRF state (one-shot)   │
//! │  bindings                 ordered list of [localId, "remoteId"] pairs  │
//! │  last_orders_processed    order-poll watermark (monotonic)             │
//! │  notice                   one-shot settings banner                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Write Model
//! The file is loaded once at construction and rewritten after every
//! mutation, so a crash never loses more than the operation in flight.
//! Mutators take `&self`; interior mutability keeps one lock around the
//! in-memory copy.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use stockbridge_core::{Binding, Credential, Notice, PendingAuthorization};

use crate::error::{StoreError, StoreResult};

// =============================================================================
// Persisted Shape
// =============================================================================

/// On-disk shape of the state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedState {
    /// The single shared marketplace credential.
    #[serde(default)]
    credential: Credential,

    /// In-flight PKCE authorization, if any.
    #[serde(default)]
    pending_authorization: Option<PendingAuthorization>,

    /// Ordered binding list. Order is irrelevant to correctness but kept
    /// deterministic for sync reporting.
    #[serde(default)]
    bindings: Vec<Binding>,

    /// Timestamp of the last order-poll cycle. Absent means the next poll is
    /// a forced full catch-up.
    #[serde(default)]
    last_orders_processed: Option<DateTime<Utc>>,

    /// Pending one-shot settings notice.
    #[serde(default)]
    notice: Option<Notice>,
}

// =============================================================================
// State Store
// =============================================================================

/// Persisted engine state with flush-on-write semantics.
pub struct StateStore {
    /// Path of the backing JSON file.
    path: PathBuf,

    /// In-memory copy of the persisted state.
    state: RwLock<PersistedState>,
}

impl StateStore {
    /// Opens the state file, creating an empty state if it does not exist.
    ///
    /// A present-but-unparsable file is an error rather than silently reset:
    /// resetting would drop the stored credential and force re-authorization.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let state = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "State file absent, starting empty");
                PersistedState::default()
            }
            Err(source) => {
                return Err(StoreError::LoadFailed {
                    path: path.clone(),
                    source,
                })
            }
        };

        Ok(StateStore {
            path,
            state: RwLock::new(state),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, PersistedState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PersistedState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Serializes the current state and rewrites the backing file.
    fn flush(&self, state: &PersistedState) -> StoreResult<()> {
        let raw = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| StoreError::SaveFailed {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }

        fs::write(&self.path, raw).map_err(|source| StoreError::SaveFailed {
            path: self.path.clone(),
            source,
        })
    }

    // =========================================================================
    // Credential
    // =========================================================================

    /// Returns a snapshot of the stored credential.
    pub fn credential(&self) -> Credential {
        self.read().credential.clone()
    }

    /// Replaces the stored credential and flushes.
    pub fn set_credential(&self, credential: Credential) -> StoreResult<()> {
        let mut state = self.write();
        state.credential = credential;
        self.flush(&state)
    }

    // =========================================================================
    // Pending Authorization
    // =========================================================================

    /// Stores a new pending authorization, replacing any previous one.
    ///
    /// Re-initiating the flow invalidates the older verifier/state pair.
    pub fn set_pending_authorization(&self, pending: PendingAuthorization) -> StoreResult<()> {
        let mut state = self.write();
        if state.pending_authorization.is_some() {
            warn!("Replacing an unconsumed pending authorization");
        }
        state.pending_authorization = Some(pending);
        self.flush(&state)
    }

    /// Consumes the pending authorization, if any.
    ///
    /// One-shot: a second take returns `None`, which is what defeats code
    /// replay and CSRF via repeated callbacks.
    pub fn take_pending_authorization(&self) -> StoreResult<Option<PendingAuthorization>> {
        let mut state = self.write();
        let pending = state.pending_authorization.take();
        if pending.is_some() {
            self.flush(&state)?;
        }
        Ok(pending)
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    /// Returns the ordered binding list.
    pub fn bindings(&self) -> Vec<Binding> {
        self.read().bindings.clone()
    }

    /// Replaces the binding list and flushes.
    ///
    /// Duplicates are stored as given; the engine processes them
    /// independently.
    pub fn set_bindings(&self, bindings: Vec<Binding>) -> StoreResult<()> {
        let mut state = self.write();
        state.bindings = bindings;
        self.flush(&state)
    }

    // =========================================================================
    // Order Watermark
    // =========================================================================

    /// Returns the order-poll watermark, if one has ever been recorded.
    pub fn order_watermark(&self) -> Option<DateTime<Utc>> {
        self.read().last_orders_processed
    }

    /// Advances the order-poll watermark.
    ///
    /// Monotonic: an attempt to move the watermark backward keeps the current
    /// value. Returns the effective watermark after the call.
    pub fn advance_order_watermark(&self, to: DateTime<Utc>) -> StoreResult<DateTime<Utc>> {
        let mut state = self.write();
        let effective = match state.last_orders_processed {
            Some(current) if current > to => {
                warn!(%current, attempted = %to, "Refusing to move order watermark backward");
                current
            }
            _ => to,
        };
        state.last_orders_processed = Some(effective);
        self.flush(&state)?;
        Ok(effective)
    }

    // =========================================================================
    // Notices
    // =========================================================================

    /// Enqueues a one-shot settings notice.
    ///
    /// If a notice is already pending the new one is dropped; the first
    /// unconsumed banner wins, matching the settings layer's add-only option
    /// semantics.
    pub fn push_notice(&self, notice: Notice) -> StoreResult<()> {
        let mut state = self.write();
        if state.notice.is_some() {
            debug!("Notice already pending, keeping the first one");
            return Ok(());
        }
        state.notice = Some(notice);
        self.flush(&state)
    }

    /// Consumes the pending notice, if any.
    pub fn take_notice(&self) -> StoreResult<Option<Notice>> {
        let mut state = self.write();
        let notice = state.notice.take();
        if notice.is_some() {
            self.flush(&state)?;
        }
        Ok(notice)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> StateStore {
        StateStore::open(dir.path().join("state.json")).unwrap()
    }

    #[test]
    fn test_open_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        assert!(!store.credential().is_authorized());
        assert!(store.bindings().is_empty());
        assert_eq!(store.order_watermark(), None);
    }

    #[test]
    fn test_credential_roundtrip_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let issued = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        {
            let store = StateStore::open(&path).unwrap();
            let mut credential = Credential::default();
            credential.store_tokens("at".into(), "rt".into(), 3600, issued);
            store.set_credential(credential).unwrap();
        }

        let store = StateStore::open(&path).unwrap();
        let credential = store.credential();
        assert_eq!(credential.access_token, "at");
        assert_eq!(credential.refresh_token, "rt");
        assert_eq!(credential.issued_at, Some(issued));
    }

    #[test]
    fn test_pending_authorization_is_one_shot() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store
            .set_pending_authorization(PendingAuthorization {
                code_verifier: "v".repeat(43),
                state: "abcd".into(),
            })
            .unwrap();

        let first = store.take_pending_authorization().unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().state, "abcd");

        let second = store.take_pending_authorization().unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_watermark_never_moves_backward() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let later = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        assert_eq!(store.advance_order_watermark(later).unwrap(), later);
        assert_eq!(store.advance_order_watermark(earlier).unwrap(), later);
        assert_eq!(store.order_watermark(), Some(later));
    }

    #[test]
    fn test_first_notice_wins_until_consumed() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.push_notice(Notice::error("first")).unwrap();
        store.push_notice(Notice::success("second")).unwrap();

        let notice = store.take_notice().unwrap().unwrap();
        assert_eq!(notice.message, "first");
        assert!(store.take_notice().unwrap().is_none());

        // After consumption a new notice can be enqueued.
        store.push_notice(Notice::success("third")).unwrap();
        assert_eq!(store.take_notice().unwrap().unwrap().message, "third");
    }

    #[test]
    fn test_bindings_keep_order_and_duplicates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = StateStore::open(&path).unwrap();
            store
                .set_bindings(vec![
                    Binding::new(2, "B"),
                    Binding::new(1, "A"),
                    Binding::new(2, "C"),
                ])
                .unwrap();
        }

        let store = StateStore::open(&path).unwrap();
        let bindings = store.bindings();
        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings[0], Binding::new(2, "B"));
        assert_eq!(bindings[2], Binding::new(2, "C"));
    }

    #[test]
    fn test_corrupt_state_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            StateStore::open(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
