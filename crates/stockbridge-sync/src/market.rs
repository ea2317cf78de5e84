//! # Marketplace Client
//!
//! Thin REST wrapper for the remote marketplace: the OAuth2 token endpoints,
//! the offer read/write endpoints and the order-event feed.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Marketplace Surface                                │
//! │                                                                         │
//! │  POST {auth}/auth/oauth/token      grant_type=authorization_code |     │
//! │                                    refresh_token (Basic auth)          │
//! │  GET  {auth}/auth/oauth/authorize  redirect-only, PKCE parameters      │
//! │  GET  {api}/sale/offers/{id}       read an offer document              │
//! │  PUT  {api}/sale/offers/{id}       write an offer document             │
//! │  GET  {api}/order/events           order-event feed (single page)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Offer documents are carried as raw JSON: the engine reads and mutates only
//! `stock.available` and must never synthesize the rest of the body, so the
//! document round-trips untouched.
//!
//! Transport failures are retried with bounded exponential backoff; HTTP
//! status results are never retried here.

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// Vendor media type required by the marketplace API.
const MEDIA_TYPE: &str = "application/vnd.allegro.public.v1+json";

// =============================================================================
// Wire Types
// =============================================================================

/// Token endpoint response for both grant types.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token for API calls.
    pub access_token: String,

    /// Token for the next refresh.
    pub refresh_token: String,

    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// One page of the order-event feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEventsPage {
    /// Events, oldest first as delivered by the feed.
    pub events: Vec<OrderEvent>,
}

/// A single order event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    /// When the event occurred on the marketplace.
    #[serde(rename = "occurredAt")]
    pub occurred_at: DateTime<Utc>,

    /// The order the event refers to.
    pub order: RemoteOrder,
}

/// Order payload inside an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteOrder {
    /// Ordered line items.
    #[serde(rename = "lineItems")]
    pub line_items: Vec<RemoteLineItem>,
}

/// One line of a remote order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLineItem {
    /// The offer this line refers to.
    pub offer: OfferRef,
}

/// Offer reference inside a line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRef {
    /// Marketplace offer identifier.
    pub id: String,
}

// =============================================================================
// Offer Document Helpers
// =============================================================================

/// Reads `stock.available` out of a raw offer document.
pub fn offer_stock_available(offer: &Value, offer_id: &str) -> SyncResult<i64> {
    offer
        .pointer("/stock/available")
        .and_then(Value::as_i64)
        .ok_or_else(|| SyncError::MalformedOffer(offer_id.to_string()))
}

/// Overwrites `stock.available` in a raw offer document, leaving every other
/// field exactly as retrieved.
pub fn set_offer_stock_available(offer: &mut Value, offer_id: &str, quantity: i64) -> SyncResult<()> {
    match offer.pointer_mut("/stock/available") {
        Some(slot) => {
            *slot = Value::from(quantity);
            Ok(())
        }
        None => Err(SyncError::MalformedOffer(offer_id.to_string())),
    }
}

// =============================================================================
// Market Client
// =============================================================================

/// REST client for the remote marketplace.
pub struct MarketClient {
    /// Shared HTTP client with the per-request timeout baked in.
    http: reqwest::Client,

    /// Authorization host (token + authorize endpoints).
    auth_base: String,

    /// API host (offers + order events).
    api_base: String,

    /// Retry budget for transient transport errors.
    retry_max_elapsed: Duration,
}

impl MarketClient {
    /// Creates a client from the engine configuration.
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.sync.http_timeout_secs))
            .build()?;

        Ok(MarketClient {
            http,
            auth_base: config.marketplace.auth_url().trim_end_matches('/').to_string(),
            api_base: config.marketplace.api_url().trim_end_matches('/').to_string(),
            retry_max_elapsed: Duration::from_secs(config.sync.retry_max_elapsed_secs),
        })
    }

    /// Sends a request, retrying transient transport failures with bounded
    /// exponential backoff. The closure rebuilds the request per attempt.
    async fn send_with_retry<F>(&self, build: F) -> SyncResult<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let policy = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(self.retry_max_elapsed))
            .build();

        backoff::future::retry(policy, || async {
            build().send().await.map_err(|err| {
                let transient = err.is_connect() || err.is_timeout();
                let mapped = SyncError::from(err);
                if transient {
                    warn!(%mapped, "Transient transport error, will retry");
                    backoff::Error::transient(mapped)
                } else {
                    backoff::Error::permanent(mapped)
                }
            })
        })
        .await
    }

    // =========================================================================
    // OAuth2 Endpoints
    // =========================================================================

    /// Builds the authorization redirect URL for the PKCE flow.
    pub fn authorize_url(
        &self,
        client_id: &str,
        code_challenge: &str,
        state: &str,
        redirect_uri: &str,
    ) -> SyncResult<Url> {
        let mut url = Url::parse(&format!("{}/auth/oauth/authorize", self.auth_base))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("code_challenge_method", "S256")
            .append_pair("code_challenge", code_challenge)
            .append_pair("prompt", "confirm")
            .append_pair("state", state)
            .append_pair("redirect_uri", redirect_uri);
        Ok(url)
    }

    /// Exchanges an authorization code + verifier for a token pair.
    ///
    /// Grant parameters travel in the query string and the client credentials
    /// as HTTP Basic auth, which is the shape the marketplace token endpoint
    /// accepts.
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> SyncResult<TokenResponse> {
        let url = format!("{}/auth/oauth/token", self.auth_base);
        debug!("Exchanging authorization code for tokens");

        let response = self
            .send_with_retry(|| {
                self.http
                    .post(&url)
                    .basic_auth(client_id, Some(client_secret))
                    .query(&[
                        ("grant_type", "authorization_code"),
                        ("code", code),
                        ("code_verifier", code_verifier),
                        ("redirect_uri", redirect_uri),
                    ])
            })
            .await
            .map_err(|err| SyncError::TokenExchangeFailed(err.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::TokenExchangeFailed(format!(
                "http_code=\"{}\" body=\"{}\"",
                status.as_u16(),
                body
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|err| SyncError::TokenExchangeFailed(err.to_string()))
    }

    /// Trades a refresh token for a fresh token pair.
    pub async fn refresh_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
        redirect_uri: &str,
    ) -> SyncResult<TokenResponse> {
        let url = format!("{}/auth/oauth/token", self.auth_base);
        debug!("Refreshing access token");

        let response = self
            .send_with_retry(|| {
                self.http
                    .post(&url)
                    .basic_auth(client_id, Some(client_secret))
                    .query(&[
                        ("grant_type", "refresh_token"),
                        ("refresh_token", refresh_token),
                        ("redirect_uri", redirect_uri),
                    ])
            })
            .await
            .map_err(|err| SyncError::TokenRefreshFailed(err.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::TokenRefreshFailed(format!(
                "http_code=\"{}\" body=\"{}\"",
                status.as_u16(),
                body
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|err| SyncError::TokenRefreshFailed(err.to_string()))
    }

    // =========================================================================
    // Offer Endpoints
    // =========================================================================

    /// Reads a full offer document.
    pub async fn get_offer(&self, access_token: &str, offer_id: &str) -> SyncResult<Value> {
        let url = format!("{}/sale/offers/{}", self.api_base, offer_id);

        let response = self
            .send_with_retry(|| {
                self.http
                    .get(&url)
                    .bearer_auth(access_token)
                    .header(reqwest::header::ACCEPT, MEDIA_TYPE)
            })
            .await?;

        match response.status() {
            reqwest::StatusCode::OK => Ok(response.json::<Value>().await?),
            reqwest::StatusCode::NOT_FOUND => {
                Err(SyncError::RemoteOfferNotFound(offer_id.to_string()))
            }
            status => Err(SyncError::RemoteRequestFailed {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Writes back a full offer document.
    pub async fn put_offer(
        &self,
        access_token: &str,
        offer_id: &str,
        offer: &Value,
    ) -> SyncResult<()> {
        let url = format!("{}/sale/offers/{}", self.api_base, offer_id);

        let response = self
            .send_with_retry(|| {
                self.http
                    .put(&url)
                    .bearer_auth(access_token)
                    .header(reqwest::header::ACCEPT, MEDIA_TYPE)
                    .header(reqwest::header::CONTENT_TYPE, MEDIA_TYPE)
                    .json(offer)
            })
            .await?;

        match response.status() {
            reqwest::StatusCode::OK => Ok(()),
            reqwest::StatusCode::NOT_FOUND => {
                Err(SyncError::RemoteOfferNotFound(offer_id.to_string()))
            }
            status => Err(SyncError::RemoteRequestFailed {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            }),
        }
    }

    // =========================================================================
    // Order Events
    // =========================================================================

    /// Fetches the order-event feed (single page, unbounded).
    pub async fn order_events(&self, access_token: &str) -> SyncResult<OrderEventsPage> {
        let url = format!("{}/order/events", self.api_base);

        let response = self
            .send_with_retry(|| {
                self.http
                    .get(&url)
                    .bearer_auth(access_token)
                    .header(reqwest::header::ACCEPT, MEDIA_TYPE)
            })
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(SyncError::RemoteRequestFailed {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json::<OrderEventsPage>().await?)
    }
}

// =============================================================================
// Tests
// =============================================================================
