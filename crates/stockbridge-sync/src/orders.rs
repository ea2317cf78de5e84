//! # Order Watcher
//!
//! Reacts to orders on both sides of a binding.
//!
//! ## Remote Polling
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Remote Order Poll                                  │
//! │                                                                         │
//! │  tick ─► ensure token fresh ─► read watermark                           │
//! │             │                                                           │
//! │             ├─ no watermark ──► advance watermark, fetch event feed,    │
//! │             │                   treat every returned event as new       │
//! │             │                                                           │
//! │             └─ watermark ─────► advance watermark, fetch event feed,    │
//! │                                 pull each binding referenced by an      │
//! │                                 event at or after the old watermark     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The watermark advances BEFORE any event is processed. A crash mid-run
//! therefore skips the remainder of that batch instead of replaying it:
//! delivery is at-most-once, and a full pull can always reconcile.
//!
//! ## Local Order Hook
//! When an order is placed in the local store, every bound line item pushes
//! its (already decremented) local quantity to the marketplace.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use stockbridge_core::Binding;
use stockbridge_store::{Journal, StateStore};

use crate::clock::Clock;
use crate::config::{BatchPolicy, SyncConfig};
use crate::engine::{SyncEngine, SyncReport};
use crate::error::{SyncError, SyncResult};
use crate::local::LocalStore;
use crate::market::{MarketClient, OrderEvent};
use crate::token::TokenManager;

/// Journal operation names.
const OP_POLL: &str = "order.poll";
const OP_LOCAL: &str = "order.local";

// =============================================================================
// Order Watcher
// =============================================================================

/// Order-driven sync triggers: the remote event poll and the local hook.
pub struct OrderWatcher {
    config: Arc<SyncConfig>,
    tokens: Arc<TokenManager>,
    engine: Arc<SyncEngine>,
    market: Arc<MarketClient>,
    local: Arc<dyn LocalStore>,
    store: Arc<StateStore>,
    journal: Arc<Journal>,
    clock: Arc<dyn Clock>,
}

impl OrderWatcher {
    /// Creates a watcher over the given collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<SyncConfig>,
        tokens: Arc<TokenManager>,
        engine: Arc<SyncEngine>,
        market: Arc<MarketClient>,
        local: Arc<dyn LocalStore>,
        store: Arc<StateStore>,
        journal: Arc<Journal>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        OrderWatcher {
            config,
            tokens,
            engine,
            market,
            local,
            store,
            journal,
            clock,
        }
    }

    // =========================================================================
    // Remote Order Poll
    // =========================================================================

    /// Polls the marketplace order-event feed once.
    ///
    /// Only bindings referenced by a fresh event are pulled. An event is
    /// fresh when it occurred at or after the previous watermark; without a
    /// stored watermark every returned event counts as fresh.
    pub async fn poll_remote_orders(&self) -> SyncResult<SyncReport> {
        self.journal
            .info(OP_POLL, "Started processing marketplace orders");

        if !self.tokens.is_authorized().await {
            self.journal.error(OP_POLL, "Not linked to the marketplace");
            return Err(SyncError::Unauthenticated);
        }

        let previous = self.store.order_watermark();
        // Advance first: a crash below must not replay this batch.
        let now = self.store.advance_order_watermark(self.clock.now())?;

        if previous.is_none() {
            self.journal.info(
                OP_POLL,
                "No record of previously processed orders, treating every event as new",
            );
        }

        let token = self.tokens.bearer().await?;
        let page = self.market.order_events(&token).await?;

        // Inclusive lower bound: an event stamped exactly at the watermark
        // belongs to this cycle. Re-pulling it next cycle is harmless since
        // pulls are idempotent.
        let fresh: Vec<&OrderEvent> = page
            .events
            .iter()
            .filter(|event| {
                event.occurred_at <= now
                    && previous.map_or(true, |watermark| event.occurred_at >= watermark)
            })
            .collect();
        debug!(
            total = page.events.len(),
            fresh = fresh.len(),
            "Fetched order events"
        );

        let bindings = self.store.bindings();
        let mut report = SyncReport::default();

        for binding in &bindings {
            let referenced = fresh.iter().any(|event| {
                event
                    .order
                    .line_items
                    .iter()
                    .any(|line| line.offer.id == binding.remote_offer_id)
            });
            if !referenced {
                continue;
            }

            report.attempted += 1;
            match self.engine.pull_one(binding).await {
                Ok(()) => {
                    report.synced += 1;
                    self.journal.info(
                        OP_POLL,
                        &format!(
                            "Synchronized product '{}' from ordered offer '{}'",
                            binding.local_product_id, binding.remote_offer_id
                        ),
                    );
                }
                Err(err) => {
                    self.journal.error(
                        OP_POLL,
                        &format!(
                            "Could not synchronize product '{}' from offer '{}': {}",
                            binding.local_product_id, binding.remote_offer_id, err
                        ),
                    );
                    match self.config.sync.batch_policy {
                        BatchPolicy::FailFast => {
                            return Err(SyncError::SyncAborted {
                                local_product_id: binding.local_product_id,
                                remote_offer_id: binding.remote_offer_id.clone(),
                                processed: report.synced,
                                source: Box::new(err),
                            });
                        }
                        BatchPolicy::ContinueOnError => {
                            warn!(binding = %binding, %err, "Binding failed, continuing");
                            report.failures.push((binding.clone(), err));
                        }
                    }
                }
            }
        }

        self.journal.success(
            OP_POLL,
            &format!("Processed marketplace orders, {} bindings updated", report.synced),
        );
        Ok(report)
    }

    // =========================================================================
    // Local Order Hook
    // =========================================================================

    /// Pushes stock for every bound line item of a newly placed local order.
    ///
    /// The local store has already decremented its own stock by the time this
    /// runs, so the push carries the post-order quantity. A missing order is
    /// journaled and swallowed; the caller's checkout flow must never fail on
    /// a sync problem.
    pub async fn on_local_order_placed(&self, order_id: i64) -> SyncResult<SyncReport> {
        self.journal
            .info(OP_LOCAL, &format!("Started processing local order '{order_id}'"));

        let order = match self.local.order(order_id).await? {
            Some(order) => order,
            None => {
                self.journal
                    .error(OP_LOCAL, &format!("Order '{order_id}' does not exist"));
                return Ok(SyncReport::default());
            }
        };

        let bindings = self.store.bindings();
        let mut report = SyncReport::default();

        for binding in &bindings {
            let ordered = order
                .line_items
                .iter()
                .any(|line| line.product_id == binding.local_product_id);
            if !ordered {
                continue;
            }

            report.attempted += 1;
            match self.engine.push_one(binding).await {
                Ok(()) => {
                    report.synced += 1;
                    self.journal.info(
                        OP_LOCAL,
                        &format!(
                            "Synchronized product '{}' to offer '{}'",
                            binding.local_product_id, binding.remote_offer_id
                        ),
                    );
                }
                Err(err) => {
                    self.journal.error(
                        OP_LOCAL,
                        &format!(
                            "Could not synchronize product '{}' to offer '{}': {}",
                            binding.local_product_id, binding.remote_offer_id, err
                        ),
                    );
                    match self.config.sync.batch_policy {
                        BatchPolicy::FailFast => {
                            return Err(SyncError::SyncAborted {
                                local_product_id: binding.local_product_id,
                                remote_offer_id: binding.remote_offer_id.clone(),
                                processed: report.synced,
                                source: Box::new(err),
                            });
                        }
                        BatchPolicy::ContinueOnError => {
                            report.failures.push((binding.clone(), err));
                        }
                    }
                }
            }
        }

        self.journal.success(
            OP_LOCAL,
            &format!("Processed local order '{order_id}', {} offers updated", report.synced),
        );
        Ok(report)
    }

    // =========================================================================
    // Poll Loop
    // =========================================================================

    /// Runs the periodic token-refresh + order-poll loop until shutdown.
    ///
    /// Tick failures are logged and the loop keeps going; only the shutdown
    /// signal ends it.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = StdDuration::from_secs(self.config.sync.poll_interval_secs);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(period_secs = period.as_secs(), "Order watcher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.tokens.ensure_fresh().await {
                        error!(%err, "Token refresh failed");
                        continue;
                    }
                    match self.poll_remote_orders().await {
                        Ok(report) => {
                            debug!(synced = report.synced, "Order poll finished");
                        }
                        Err(err) => {
                            error!(%err, "Order poll failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Order watcher stopping");
                        break;
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::local::MemoryLocalStore;
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;
    use stockbridge_core::{Credential, LocalOrder, LocalOrderLine};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        watcher: OrderWatcher,
        local: Arc<MemoryLocalStore>,
        store: Arc<StateStore>,
        clock: Arc<ManualClock>,
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn fixture(server: &mockito::ServerGuard, authorized: bool) -> Fixture {
        let dir = TempDir::new().unwrap();

        let mut config = SyncConfig::default();
        config.marketplace.client_id = "id".into();
        config.marketplace.client_secret = "secret".into();
        config.marketplace.auth_url = Some(server.url());
        config.marketplace.api_url = Some(server.url());
        config.sync.retry_max_elapsed_secs = 0;
        let config = Arc::new(config);

        let market = Arc::new(MarketClient::new(&config).unwrap());
        let store = Arc::new(StateStore::open(dir.path().join("state.json")).unwrap());
        let journal = Arc::new(Journal::open(dir.path().join("journal.log")).unwrap());
        let clock = Arc::new(ManualClock::at(now()));

        if authorized {
            let mut credential = Credential::default();
            credential.store_tokens("TOKEN".into(), "RT".into(), 3600, now());
            store.set_credential(credential).unwrap();
        }

        let tokens = Arc::new(TokenManager::new(
            Arc::clone(&config),
            Arc::clone(&market),
            Arc::clone(&store),
            Arc::clone(&journal),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));

        let local = Arc::new(MemoryLocalStore::new());
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&config),
            Arc::clone(&tokens),
            Arc::clone(&market),
            Arc::clone(&local) as Arc<dyn LocalStore>,
            Arc::clone(&store),
            Arc::clone(&journal),
        ));

        let watcher = OrderWatcher::new(
            config,
            tokens,
            engine,
            market,
            Arc::clone(&local) as Arc<dyn LocalStore>,
            Arc::clone(&store),
            journal,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );

        Fixture {
            _dir: dir,
            watcher,
            local,
            store,
            clock,
        }
    }

    fn binding(product: i64, offer: &str) -> Binding {
        Binding {
            local_product_id: product,
            remote_offer_id: offer.into(),
        }
    }

    fn offer_body(id: &str, available: i64) -> String {
        serde_json::json!({"id": id, "stock": {"available": available}}).to_string()
    }

    #[tokio::test]
    async fn test_first_poll_treats_every_event_as_new() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/order/events")
            .with_status(200)
            .with_body(
                r#"{"events":[
                    {"occurredAt":"2024-06-01T09:00:00Z",
                     "order":{"lineItems":[{"offer":{"id":"A"}}]}}
                ]}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/sale/offers/A")
            .with_status(200)
            .with_body(offer_body("A", 4))
            .create_async()
            .await;
        // Offer B is bound but referenced by no event, so even the catch-up
        // cycle leaves it alone.
        let unreferenced = server
            .mock("GET", "/sale/offers/B")
            .expect(0)
            .create_async()
            .await;

        let fx = fixture(&server, true);
        fx.local.put_product(1, 0);
        fx.local.put_product(2, 0);
        fx.store
            .set_bindings(vec![binding(1, "A"), binding(2, "B")])
            .unwrap();

        let report = fx.watcher.poll_remote_orders().await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.synced, 1);
        assert_eq!(fx.local.stock_quantity(1).await.unwrap(), Some(4));
        assert_eq!(fx.local.stock_quantity(2).await.unwrap(), Some(0));
        assert_eq!(fx.store.order_watermark(), Some(now()));
        unreferenced.assert_async().await;
    }

    #[tokio::test]
    async fn test_event_exactly_at_watermark_is_processed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/order/events")
            .with_status(200)
            .with_body(
                r#"{"events":[
                    {"occurredAt":"2024-06-01T11:00:00Z",
                     "order":{"lineItems":[{"offer":{"id":"A"}}]}}
                ]}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/sale/offers/A")
            .with_status(200)
            .with_body(offer_body("A", 6))
            .create_async()
            .await;

        let fx = fixture(&server, true);
        fx.local.put_product(1, 0);
        fx.store.set_bindings(vec![binding(1, "A")]).unwrap();
        // Watermark coincides with the event timestamp; the bound is
        // inclusive, so the event still counts.
        fx.store
            .advance_order_watermark(Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap())
            .unwrap();

        let report = fx.watcher.poll_remote_orders().await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.synced, 1);
        assert_eq!(fx.local.stock_quantity(1).await.unwrap(), Some(6));
    }

    #[tokio::test]
    async fn test_poll_processes_only_events_after_watermark() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/order/events")
            .with_status(200)
            .with_body(
                r#"{"events":[
                    {"occurredAt":"2024-06-01T10:00:00Z",
                     "order":{"lineItems":[{"offer":{"id":"A"}}]}},
                    {"occurredAt":"2024-06-01T11:30:00Z",
                     "order":{"lineItems":[{"offer":{"id":"B"}}]}}
                ]}"#,
            )
            .create_async()
            .await;
        // Offer A's event predates the watermark.
        let stale = server
            .mock("GET", "/sale/offers/A")
            .expect(0)
            .create_async()
            .await;
        server
            .mock("GET", "/sale/offers/B")
            .with_status(200)
            .with_body(offer_body("B", 9))
            .create_async()
            .await;

        let fx = fixture(&server, true);
        fx.local.put_product(1, 5);
        fx.local.put_product(2, 5);
        fx.store
            .set_bindings(vec![binding(1, "A"), binding(2, "B")])
            .unwrap();
        // Watermark sits between the two events.
        fx.store
            .advance_order_watermark(Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap())
            .unwrap();

        let report = fx.watcher.poll_remote_orders().await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.synced, 1);
        assert_eq!(fx.local.stock_quantity(1).await.unwrap(), Some(5));
        assert_eq!(fx.local.stock_quantity(2).await.unwrap(), Some(9));
        stale.assert_async().await;
    }

    #[tokio::test]
    async fn test_watermark_advances_even_when_processing_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/order/events")
            .with_status(200)
            .with_body(
                r#"{"events":[
                    {"occurredAt":"2024-06-01T11:30:00Z",
                     "order":{"lineItems":[{"offer":{"id":"A"}}]}}
                ]}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/sale/offers/A")
            .with_status(500)
            .create_async()
            .await;

        let fx = fixture(&server, true);
        fx.local.put_product(1, 5);
        fx.store.set_bindings(vec![binding(1, "A")]).unwrap();
        fx.store
            .advance_order_watermark(Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap())
            .unwrap();

        let err = fx.watcher.poll_remote_orders().await.unwrap_err();
        assert!(matches!(err, SyncError::SyncAborted { .. }));

        // At-most-once: the batch is marked consumed before processing.
        assert_eq!(fx.store.order_watermark(), Some(fx.clock.now()));
    }

    #[tokio::test]
    async fn test_poll_requires_authorization() {
        let server = mockito::Server::new_async().await;
        let fx = fixture(&server, false);

        let err = fx.watcher.poll_remote_orders().await.unwrap_err();
        assert!(matches!(err, SyncError::Unauthenticated));
        assert_eq!(fx.store.order_watermark(), None);
    }

    #[tokio::test]
    async fn test_local_order_pushes_bound_lines_only() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sale/offers/A")
            .with_status(200)
            .with_body(offer_body("A", 10))
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/sale/offers/A")
            .match_body(Matcher::PartialJson(
                serde_json::json!({"stock": {"available": 3}}),
            ))
            .with_status(200)
            .create_async()
            .await;

        let fx = fixture(&server, true);
        // Product 7 is ordered too but has no binding.
        fx.local.put_product(42, 3);
        fx.local.put_order(LocalOrder {
            id: 500,
            line_items: vec![
                LocalOrderLine { product_id: 42 },
                LocalOrderLine { product_id: 7 },
            ],
        });
        fx.store.set_bindings(vec![binding(42, "A")]).unwrap();

        let report = fx.watcher.on_local_order_placed(500).await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.synced, 1);
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_local_order_is_swallowed() {
        let server = mockito::Server::new_async().await;
        let fx = fixture(&server, true);
        fx.store.set_bindings(vec![binding(42, "A")]).unwrap();

        let report = fx.watcher.on_local_order_placed(404).await.unwrap();
        assert_eq!(report.attempted, 0);
    }
}
