//! # Token Manager
//!
//! Owns the OAuth2 PKCE authorization-code exchange and the refresh cycle
//! for the single shared marketplace credential.
//!
//! ## Credential State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Credential Lifecycle                                 │
//! │                                                                         │
//! │   Unauthorized ──begin_authorization──► Authorizing                     │
//! │        ▲                                    │                           │
//! │        │ validation/exchange failure        │ complete_authorization    │
//! │        └────────────────────────────────────┤                           │
//! │                                             ▼                           │
//! │                                        Authorized                       │
//! │                                             │                           │
//! │                         elapsed >= expires_in (checked each tick)       │
//! │                                             │                           │
//! │                                             ▼                           │
//! │                      refresh ── success ──► Authorized (issued_at reset)│
//! │                          │                                              │
//! │                          └───── failure ──► old token left in place;    │
//! │                                             dependent calls fail with   │
//! │                                             Unauthenticated/401 later   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//! Every credential read and mutation goes through one `tokio::sync::Mutex`.
//! Concurrent triggers (a manual link callback, the scheduled refresh tick,
//! an order-hook sync) therefore serialize instead of racing on the shared
//! token. `bearer()` takes the same mutex, so a sync operation can never read
//! a half-refreshed credential.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use url::Url;

use stockbridge_core::{Credential, Notice, PendingAuthorization};
use stockbridge_store::{Journal, StateStore};

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::market::MarketClient;
use crate::pkce;

/// Query parameters stripped from the callback URL when deriving the
/// canonical redirect URI. These are transient state of the settings surface
/// and must not be echoed back to the authorization server.
const TRANSIENT_PARAMS: &[&str] = &["tab", "code", "state", "settings-updated", "action"];

/// Journal operation names.
const OP_LINK: &str = "token.link";
const OP_EXCHANGE: &str = "token.exchange";
const OP_REFRESH: &str = "token.refresh";

/// Banner texts for the settings surface.
const MSG_LINK_FAILED: &str = "Could not link to the marketplace. See the journal for more information";
const MSG_LINK_OK: &str = "Linked to the marketplace successfully";
const MSG_REFRESH_FAILED: &str = "Could not refresh the token. See the journal for more information";
const MSG_REFRESH_NO_TOKEN: &str = "Could not refresh the token. Try to remove the app from \
                                    linked apps in the marketplace settings and link it again.";
const MSG_REFRESH_NO_CREDS: &str = "Could not refresh the token. Try to fill in the Client ID \
                                    and/or Secret field(s)";

/// Strips transient query parameters from a callback URL, yielding the
/// canonical redirect URI used in every grant.
pub fn canonical_redirect_uri(callback_url: &str) -> SyncResult<String> {
    let mut url = Url::parse(callback_url)?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !TRANSIENT_PARAMS.contains(&name.as_ref()))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (name, value) in &kept {
            pairs.append_pair(name, value);
        }
    }

    Ok(url.to_string())
}

// =============================================================================
// Token Manager
// =============================================================================

/// Manages the shared marketplace credential.
pub struct TokenManager {
    config: Arc<SyncConfig>,
    market: Arc<MarketClient>,
    store: Arc<StateStore>,
    journal: Arc<Journal>,
    clock: Arc<dyn Clock>,

    /// Single mutual-exclusion domain for all credential reads and writes.
    guard: Mutex<()>,
}

impl TokenManager {
    /// Creates a token manager over the given stores and client.
    pub fn new(
        config: Arc<SyncConfig>,
        market: Arc<MarketClient>,
        store: Arc<StateStore>,
        journal: Arc<Journal>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        TokenManager {
            config,
            market,
            store,
            journal,
            clock,
            guard: Mutex::new(()),
        }
    }

    /// Returns true if an access token is stored.
    pub async fn is_authorized(&self) -> bool {
        let _guard = self.guard.lock().await;
        self.store.credential().is_authorized()
    }

    /// Returns the current access token for a marketplace call.
    ///
    /// Taken under the credential mutex so a refresh cannot interleave with
    /// the read. Callers hold only a snapshot; a 401 on a subsequent request
    /// is a hard failure of that operation, not a crash.
    pub async fn bearer(&self) -> SyncResult<String> {
        let _guard = self.guard.lock().await;
        let credential = self.store.credential();
        if credential.access_token.is_empty() {
            return Err(SyncError::Unauthenticated);
        }
        Ok(credential.access_token)
    }

    // =========================================================================
    // Authorization Flow
    // =========================================================================

    /// Initiates the PKCE authorization-code flow.
    ///
    /// Generates the verifier/challenge/state triple, persists it as the
    /// pending authorization and returns the redirect URL for the
    /// marketplace's authorization endpoint.
    ///
    /// Fails with [`SyncError::MissingClientId`] when the client ID is unset;
    /// the settings surface keeps the link button locked in that case, so no
    /// banner is enqueued.
    pub async fn begin_authorization(&self) -> SyncResult<Url> {
        let _guard = self.guard.lock().await;
        self.journal.info(OP_LINK, "Started linking to the marketplace");

        if self.config.marketplace.client_id.is_empty() {
            self.journal
                .error(OP_LINK, "Client ID does not exist or is empty");
            return Err(SyncError::MissingClientId);
        }

        let code_verifier = pkce::generate_code_verifier();
        let code_challenge = pkce::code_challenge(&code_verifier);
        let state = pkce::generate_state();

        self.store.set_pending_authorization(PendingAuthorization {
            code_verifier,
            state: state.clone(),
        })?;

        let redirect_uri = canonical_redirect_uri(&self.config.marketplace.redirect_uri)?;
        let url = self.market.authorize_url(
            &self.config.marketplace.client_id,
            &code_challenge,
            &state,
            &redirect_uri,
        )?;

        self.journal
            .info(OP_LINK, "URL for linking to the marketplace prepared successfully");
        Ok(url)
    }

    /// Completes the authorization-code flow from the callback parameters.
    ///
    /// The pending authorization is consumed exactly once: a replayed
    /// callback fails with [`SyncError::NoPendingAuthorization`] no matter
    /// what it carries.
    pub async fn complete_authorization(
        &self,
        code: Option<&str>,
        returned_state: Option<&str>,
    ) -> SyncResult<()> {
        let _guard = self.guard.lock().await;
        self.journal.info(OP_EXCHANGE, "Started getting a token");

        let code = match code.filter(|c| !c.is_empty()) {
            Some(code) => code,
            None => {
                return Err(self.flow_failure(
                    SyncError::MissingAuthCode,
                    "Auth code does not exist or is empty",
                ))
            }
        };

        // One-shot consumption happens here, before any further validation,
        // so every callback (valid or not) burns the stored verifier/state.
        let pending = match self.store.take_pending_authorization()? {
            Some(pending) => pending,
            None => {
                return Err(self.flow_failure(
                    SyncError::NoPendingAuthorization,
                    "There was no saved code verifier and state",
                ))
            }
        };

        let returned_state = match returned_state.filter(|s| !s.is_empty()) {
            Some(state) => state,
            None => {
                return Err(self.flow_failure(
                    SyncError::MissingState,
                    "Server has not returned the state",
                ))
            }
        };

        if returned_state != pending.state {
            return Err(self.flow_failure(
                SyncError::StateMismatch,
                "State returned by server is invalid",
            ));
        }

        if !self.config.marketplace.has_credentials() {
            return Err(self.flow_failure(
                SyncError::MissingCredentials,
                "Client ID and/or Secret does not exist or is empty",
            ));
        }

        let redirect_uri = canonical_redirect_uri(&self.config.marketplace.redirect_uri)?;
        let tokens = match self
            .market
            .exchange_code(
                &self.config.marketplace.client_id,
                &self.config.marketplace.client_secret,
                code,
                &pending.code_verifier,
                &redirect_uri,
            )
            .await
        {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!(%err, "Authorization-code exchange failed");
                return Err(self.flow_failure(err, "Token endpoint rejected the exchange"));
            }
        };

        let mut credential = Credential::default();
        credential.store_tokens(
            tokens.access_token,
            tokens.refresh_token,
            tokens.expires_in,
            self.clock.now(),
        );
        self.store.set_credential(credential)?;

        self.journal
            .success(OP_EXCHANGE, "Token obtained successfully");
        self.store.push_notice(Notice::success(MSG_LINK_OK))?;
        info!("Linked to the marketplace");
        Ok(())
    }

    /// Journals an authorization-flow failure, enqueues the error banner and
    /// hands the error back. The credential is untouched: the flow ends in
    /// `Unauthorized` exactly as it started.
    fn flow_failure(&self, err: SyncError, detail: &str) -> SyncError {
        self.journal.error(OP_EXCHANGE, detail);
        if let Err(store_err) = self.store.push_notice(Notice::error(MSG_LINK_FAILED)) {
            warn!(%store_err, "Could not enqueue settings notice");
        }
        err
    }

    // =========================================================================
    // Refresh Cycle
    // =========================================================================

    /// Refreshes the access token when it has outlived `expires_in`.
    ///
    /// Called on every process tick, not only before an API call; refresh is
    /// proactive, never lazy-on-401.
    pub async fn ensure_fresh(&self) -> SyncResult<()> {
        let _guard = self.guard.lock().await;
        let credential = self.store.credential();

        if credential.is_authorized() && credential.is_expired(self.clock.now()) {
            return self.refresh_locked().await;
        }
        Ok(())
    }

    /// Forces a refresh regardless of expiry.
    pub async fn refresh(&self) -> SyncResult<()> {
        let _guard = self.guard.lock().await;
        self.refresh_locked().await
    }

    /// Refresh body; caller must hold the credential mutex.
    async fn refresh_locked(&self) -> SyncResult<()> {
        self.journal.info(OP_REFRESH, "Started refreshing the token");
        let credential = self.store.credential();

        if credential.refresh_token.is_empty() {
            self.journal
                .error(OP_REFRESH, "Refresh token does not exist or is empty");
            self.store.push_notice(Notice::error(MSG_REFRESH_NO_TOKEN))?;
            return Err(SyncError::NoRefreshToken);
        }

        if !self.config.marketplace.has_credentials() {
            self.journal
                .error(OP_REFRESH, "Client ID and/or Secret does not exist or is empty");
            self.store.push_notice(Notice::error(MSG_REFRESH_NO_CREDS))?;
            return Err(SyncError::MissingCredentials);
        }

        let redirect_uri = canonical_redirect_uri(&self.config.marketplace.redirect_uri)?;
        let tokens = match self
            .market
            .refresh_token(
                &self.config.marketplace.client_id,
                &self.config.marketplace.client_secret,
                &credential.refresh_token,
                &redirect_uri,
            )
            .await
        {
            Ok(tokens) => tokens,
            Err(err) => {
                // The old (possibly expired) token stays in place; dependent
                // operations will fail with Unauthenticated/401 and say so.
                self.journal
                    .error(OP_REFRESH, &format!("Token endpoint rejected the refresh: {}", err));
                self.store.push_notice(Notice::error(MSG_REFRESH_FAILED))?;
                return Err(err);
            }
        };

        let mut updated = credential;
        updated.store_tokens(
            tokens.access_token,
            tokens.refresh_token,
            tokens.expires_in,
            self.clock.now(),
        );
        self.store.set_credential(updated)?;

        self.journal
            .success(OP_REFRESH, "Token refreshed successfully");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
