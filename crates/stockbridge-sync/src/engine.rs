//! # Sync Engine
//!
//! Moves stock quantities across bindings, in either direction.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Per-Binding Sync                                │
//! │                                                                         │
//! │  push (local → remote)                                                  │
//! │    local.stock_quantity(product_id)                                     │
//! │       └─► GET offer ─► mutate stock.available ─► PUT offer             │
//! │                                                                         │
//! │  pull (remote → local)                                                  │
//! │    GET offer ─► read stock.available                                    │
//! │       └─► local.set_stock_quantity(product_id)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Offer writes are read-modify-write on the full document: the engine never
//! synthesizes an offer body, it only overwrites `stock.available` in what it
//! just fetched.
//!
//! Batch runs walk the binding list in stored order. Under the fail-fast
//! policy the first failing binding aborts the run and later bindings are
//! never attempted; under continue-on-error every binding is attempted and
//! the failures are collected in the report.

use std::sync::Arc;

use tracing::{debug, info, warn};

use stockbridge_core::{Binding, Notice};
use stockbridge_store::{Journal, StateStore};

use crate::config::{BatchPolicy, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::local::LocalStore;
use crate::market::{self, MarketClient};
use crate::token::TokenManager;

/// Journal operation names.
const OP_PUSH: &str = "sync.push";
const OP_PULL: &str = "sync.pull";

/// Banner texts for batch runs.
const MSG_SYNC_OK: &str = "Stock synchronized successfully";
const MSG_SYNC_FAILED: &str = "Could not synchronize stock. See the journal for more information";

/// Direction of a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Local store is the source of truth.
    Push,
    /// Marketplace is the source of truth.
    Pull,
}

impl Direction {
    fn op(self) -> &'static str {
        match self {
            Direction::Push => OP_PUSH,
            Direction::Pull => OP_PULL,
        }
    }
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Bindings attempted before the run ended.
    pub attempted: usize,

    /// Bindings that synchronized successfully.
    pub synced: usize,

    /// Failing bindings with their errors (continue-on-error only; a
    /// fail-fast run surfaces its single failure as [`SyncError::SyncAborted`]).
    pub failures: Vec<(Binding, SyncError)>,
}

impl SyncReport {
    /// Returns true if every attempted binding synchronized.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Binding-driven stock synchronizer.
pub struct SyncEngine {
    config: Arc<SyncConfig>,
    tokens: Arc<TokenManager>,
    market: Arc<MarketClient>,
    local: Arc<dyn LocalStore>,
    store: Arc<StateStore>,
    journal: Arc<Journal>,
}

impl SyncEngine {
    /// Creates an engine over the given collaborators.
    pub fn new(
        config: Arc<SyncConfig>,
        tokens: Arc<TokenManager>,
        market: Arc<MarketClient>,
        local: Arc<dyn LocalStore>,
        store: Arc<StateStore>,
        journal: Arc<Journal>,
    ) -> Self {
        SyncEngine {
            config,
            tokens,
            market,
            local,
            store,
            journal,
        }
    }

    // =========================================================================
    // Single-Binding Operations
    // =========================================================================

    /// Pushes the local stock quantity of one binding to its offer.
    pub async fn push_one(&self, binding: &Binding) -> SyncResult<()> {
        let quantity = self
            .local
            .stock_quantity(binding.local_product_id)
            .await?
            .ok_or(SyncError::LocalProductNotFound(binding.local_product_id))?;

        self.push_remote_quantity(binding, quantity).await
    }

    /// Pulls the offer's available stock of one binding into the local store.
    pub async fn pull_one(&self, binding: &Binding) -> SyncResult<()> {
        let token = self.tokens.bearer().await?;

        let offer = self.market.get_offer(&token, &binding.remote_offer_id).await?;
        let quantity = market::offer_stock_available(&offer, &binding.remote_offer_id)?;

        self.local
            .set_stock_quantity(binding.local_product_id, quantity)
            .await?;

        debug!(binding = %binding, quantity, "Pulled stock from marketplace");
        Ok(())
    }

    /// Writes an absolute quantity to a binding's offer via read-modify-write.
    pub async fn push_remote_quantity(&self, binding: &Binding, quantity: i64) -> SyncResult<()> {
        let token = self.tokens.bearer().await?;

        let mut offer = self.market.get_offer(&token, &binding.remote_offer_id).await?;
        market::set_offer_stock_available(&mut offer, &binding.remote_offer_id, quantity)?;
        self.market
            .put_offer(&token, &binding.remote_offer_id, &offer)
            .await?;

        debug!(binding = %binding, quantity, "Pushed stock to marketplace");
        Ok(())
    }

    // =========================================================================
    // Batch Operations
    // =========================================================================

    /// Pushes every binding's local stock to the marketplace.
    pub async fn push_all(&self) -> SyncResult<SyncReport> {
        self.run_batch(Direction::Push).await
    }

    /// Pulls every binding's offer stock into the local store.
    pub async fn pull_all(&self) -> SyncResult<SyncReport> {
        self.run_batch(Direction::Pull).await
    }

    async fn run_batch(&self, direction: Direction) -> SyncResult<SyncReport> {
        let op = direction.op();
        self.journal.info(op, "Started synchronizing stock");

        // Fail fast before touching any binding when there is no token at
        // all; a mid-run 401 is still possible and handled per binding.
        if !self.tokens.is_authorized().await {
            self.journal.error(op, "Not linked to the marketplace");
            self.store.push_notice(Notice::error(MSG_SYNC_FAILED))?;
            return Err(SyncError::Unauthenticated);
        }

        let bindings = self.store.bindings();
        let mut report = SyncReport::default();

        for binding in &bindings {
            report.attempted += 1;

            let outcome = match direction {
                Direction::Push => self.push_one(binding).await,
                Direction::Pull => self.pull_one(binding).await,
            };

            match outcome {
                Ok(()) => {
                    report.synced += 1;
                    self.journal.info(
                        op,
                        &format!(
                            "Synchronized product '{}' and offer '{}'",
                            binding.local_product_id, binding.remote_offer_id
                        ),
                    );
                }
                Err(err) => {
                    self.journal.error(
                        op,
                        &format!(
                            "Could not synchronize product '{}' and offer '{}': {}",
                            binding.local_product_id, binding.remote_offer_id, err
                        ),
                    );

                    match self.config.sync.batch_policy {
                        BatchPolicy::FailFast => {
                            self.store.push_notice(Notice::error(MSG_SYNC_FAILED))?;
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

        if report.is_clean() {
            self.journal.success(op, "Stock synchronized successfully");
            self.store.push_notice(Notice::success(MSG_SYNC_OK))?;
        } else {
            self.journal.error(
                op,
                &format!(
                    "Synchronized {} of {} bindings",
                    report.synced, report.attempted
                ),
            );
            self.store.push_notice(Notice::error(MSG_SYNC_FAILED))?;
        }

        info!(
            attempted = report.attempted,
            synced = report.synced,
            failed = report.failures.len(),
            "Batch sync finished"
        );
        Ok(report)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::local::MemoryLocalStore;
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;
    use stockbridge_core::{Credential, NoticeKind};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        engine: SyncEngine,
        local: Arc<MemoryLocalStore>,
        store: Arc<StateStore>,
    }

    fn fixture(server: &mockito::ServerGuard, policy: BatchPolicy, authorized: bool) -> Fixture {
        let dir = TempDir::new().unwrap();

        let mut config = SyncConfig::default();
        config.marketplace.client_id = "id".into();
        config.marketplace.client_secret = "secret".into();
        config.marketplace.auth_url = Some(server.url());
        config.marketplace.api_url = Some(server.url());
        config.sync.batch_policy = policy;
        config.sync.retry_max_elapsed_secs = 0;
        let config = Arc::new(config);

        let market = Arc::new(MarketClient::new(&config).unwrap());
        let store = Arc::new(StateStore::open(dir.path().join("state.json")).unwrap());
        let journal = Arc::new(Journal::open(dir.path().join("journal.log")).unwrap());
        let clock = Arc::new(ManualClock::at(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));

        if authorized {
            let mut credential = Credential::default();
            credential.store_tokens("TOKEN".into(), "RT".into(), 3600, clock.now());
            store.set_credential(credential).unwrap();
        }

        let tokens = Arc::new(TokenManager::new(
            Arc::clone(&config),
            Arc::clone(&market),
            Arc::clone(&store),
            Arc::clone(&journal),
            clock as Arc<dyn Clock>,
        ));

        let local = Arc::new(MemoryLocalStore::new());
        let engine = SyncEngine::new(
            config,
            tokens,
            market,
            Arc::clone(&local) as Arc<dyn LocalStore>,
            Arc::clone(&store),
            journal,
        );

        Fixture {
            _dir: dir,
            engine,
            local,
            store,
        }
    }

    fn offer_body(id: &str, available: i64) -> String {
        serde_json::json!({
            "id": id,
            "name": "listing",
            "stock": {"available": available, "unit": "UNIT"}
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_push_one_read_modify_write() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sale/offers/ABC123")
            .match_header("authorization", "Bearer TOKEN")
            .with_status(200)
            .with_body(offer_body("ABC123", 3))
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/sale/offers/ABC123")
            .match_body(Matcher::Json(serde_json::json!({
                "id": "ABC123",
                "name": "listing",
                "stock": {"available": 7, "unit": "UNIT"}
            })))
            .with_status(200)
            .create_async()
            .await;

        let fx = fixture(&server, BatchPolicy::FailFast, true);
        fx.local.put_product(42, 7);

        fx.engine
            .push_one(&Binding {
                local_product_id: 42,
                remote_offer_id: "ABC123".into(),
            })
            .await
            .unwrap();

        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_pull_one_sets_local_quantity() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sale/offers/ABC123")
            .with_status(200)
            .with_body(offer_body("ABC123", 5))
            .create_async()
            .await;

        let fx = fixture(&server, BatchPolicy::FailFast, true);
        fx.local.put_product(42, 0);

        let binding = Binding {
            local_product_id: 42,
            remote_offer_id: "ABC123".into(),
        };
        fx.engine.pull_one(&binding).await.unwrap();
        assert_eq!(fx.local.stock_quantity(42).await.unwrap(), Some(5));

        // Pull is idempotent: a second run converges to the same state.
        fx.engine.pull_one(&binding).await.unwrap();
        assert_eq!(fx.local.stock_quantity(42).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_push_one_missing_product() {
        let server = mockito::Server::new_async().await;
        let fx = fixture(&server, BatchPolicy::FailFast, true);

        let err = fx
            .engine
            .push_one(&Binding {
                local_product_id: 9,
                remote_offer_id: "X".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::LocalProductNotFound(9)));
    }

    #[tokio::test]
    async fn test_push_all_fail_fast_stops_at_first_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sale/offers/A")
            .with_status(200)
            .with_body(offer_body("A", 0))
            .create_async()
            .await;
        server
            .mock("PUT", "/sale/offers/A")
            .with_status(200)
            .create_async()
            .await;
        // Offer C must never be touched once B fails.
        let untouched = server
            .mock("GET", "/sale/offers/C")
            .expect(0)
            .create_async()
            .await;

        let fx = fixture(&server, BatchPolicy::FailFast, true);
        fx.local.put_product(1, 10);
        fx.local.put_product(3, 30);
        // Product 2 does not exist locally.
        fx.store
            .set_bindings(vec![
                Binding {
                    local_product_id: 1,
                    remote_offer_id: "A".into(),
                },
                Binding {
                    local_product_id: 2,
                    remote_offer_id: "B".into(),
                },
                Binding {
                    local_product_id: 3,
                    remote_offer_id: "C".into(),
                },
            ])
            .unwrap();

        let err = fx.engine.push_all().await.unwrap_err();
        match err {
            SyncError::SyncAborted {
                local_product_id,
                remote_offer_id,
                processed,
                source,
            } => {
                assert_eq!(local_product_id, 2);
                assert_eq!(remote_offer_id, "B");
                assert_eq!(processed, 1);
                assert!(matches!(*source, SyncError::LocalProductNotFound(2)));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        untouched.assert_async().await;
        assert_eq!(
            fx.store.take_notice().unwrap().unwrap().kind,
            NoticeKind::Error
        );
    }

    #[tokio::test]
    async fn test_push_all_continue_on_error_collects_failures() {
        let mut server = mockito::Server::new_async().await;
        for offer in ["A", "C"] {
            server
                .mock("GET", format!("/sale/offers/{offer}").as_str())
                .with_status(200)
                .with_body(offer_body(offer, 0))
                .create_async()
                .await;
            server
                .mock("PUT", format!("/sale/offers/{offer}").as_str())
                .with_status(200)
                .create_async()
                .await;
        }

        let fx = fixture(&server, BatchPolicy::ContinueOnError, true);
        fx.local.put_product(1, 10);
        fx.local.put_product(3, 30);
        fx.store
            .set_bindings(vec![
                Binding {
                    local_product_id: 1,
                    remote_offer_id: "A".into(),
                },
                Binding {
                    local_product_id: 2,
                    remote_offer_id: "B".into(),
                },
                Binding {
                    local_product_id: 3,
                    remote_offer_id: "C".into(),
                },
            ])
            .unwrap();

        let report = fx.engine.push_all().await.unwrap();
        assert_eq!(report.attempted, 3);
        assert_eq!(report.synced, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0.local_product_id, 2);
    }

    #[tokio::test]
    async fn test_batch_requires_authorization() {
        let mut server = mockito::Server::new_async().await;
        let untouched = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let fx = fixture(&server, BatchPolicy::FailFast, false);
        fx.store
            .set_bindings(vec![Binding {
                local_product_id: 1,
                remote_offer_id: "A".into(),
            }])
            .unwrap();

        let err = fx.engine.push_all().await.unwrap_err();
        assert!(matches!(err, SyncError::Unauthenticated));
        untouched.assert_async().await;
    }

    #[tokio::test]
    async fn test_clean_batch_enqueues_success_notice() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sale/offers/A")
            .with_status(200)
            .with_body(offer_body("A", 2))
            .create_async()
            .await;

        let fx = fixture(&server, BatchPolicy::FailFast, true);
        fx.local.put_product(1, 0);
        fx.store
            .set_bindings(vec![Binding {
                local_product_id: 1,
                remote_offer_id: "A".into(),
            }])
            .unwrap();

        let report = fx.engine.pull_all().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(fx.local.stock_quantity(1).await.unwrap(), Some(2));
        assert_eq!(
            fx.store.take_notice().unwrap().unwrap().kind,
            NoticeKind::Success
        );
    }
}
