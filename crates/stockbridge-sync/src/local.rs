//! # Local Store Client
//!
//! The local platform collaborator: read/write stock quantity by product id
//! and load an order's line items. The engine only ever needs these three
//! operations, so they live behind a trait and the HTTP implementation stays
//! swappable for the in-memory fake in tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use stockbridge_core::LocalOrder;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Trait
// =============================================================================

/// Narrow view of the local store.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Returns the stock quantity of a product, or `None` if the product
    /// does not exist.
    async fn stock_quantity(&self, product_id: i64) -> SyncResult<Option<i64>>;

    /// Sets the absolute stock quantity of a product.
    ///
    /// Fails with [`SyncError::LocalProductNotFound`] if the product does not
    /// exist.
    async fn set_stock_quantity(&self, product_id: i64, quantity: i64) -> SyncResult<()>;

    /// Loads an order, or `None` if it does not exist.
    async fn order(&self, order_id: i64) -> SyncResult<Option<LocalOrder>>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// Product representation exposed by the local store's stock API.
#[derive(Debug, Serialize, Deserialize)]
struct ProductDoc {
    id: i64,
    stock_quantity: i64,
}

/// Body for stock updates.
#[derive(Debug, Serialize)]
struct StockUpdate {
    stock_quantity: i64,
}

/// REST client for the local store's stock API.
///
/// ```text
/// GET {base}/products/{id}   -> { "id": 42, "stock_quantity": 7 }
/// PUT {base}/products/{id}   <- { "stock_quantity": 7 }
/// GET {base}/orders/{id}     -> { "id": 1, "line_items": [{ "product_id": 42 }] }
/// ```
pub struct HttpLocalStore {
    http: reqwest::Client,
    base: String,
}

impl HttpLocalStore {
    /// Creates a client from the engine configuration.
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.sync.http_timeout_secs))
            .build()?;

        Ok(HttpLocalStore {
            http,
            base: config.local.api_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LocalStore for HttpLocalStore {
    async fn stock_quantity(&self, product_id: i64) -> SyncResult<Option<i64>> {
        let url = format!("{}/products/{}", self.base, product_id);
        let response = self.http.get(&url).send().await?;

        match response.status() {
            reqwest::StatusCode::OK => {
                let doc = response.json::<ProductDoc>().await?;
                Ok(Some(doc.stock_quantity))
            }
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => Err(SyncError::RemoteRequestFailed {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn set_stock_quantity(&self, product_id: i64, quantity: i64) -> SyncResult<()> {
        let url = format!("{}/products/{}", self.base, product_id);
        debug!(product_id, quantity, "Writing local stock quantity");

        let response = self
            .http
            .put(&url)
            .json(&StockUpdate {
                stock_quantity: quantity,
            })
            .send()
            .await?;

        match response.status() {
            reqwest::StatusCode::OK => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Err(SyncError::LocalProductNotFound(product_id)),
            status => Err(SyncError::RemoteRequestFailed {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn order(&self, order_id: i64) -> SyncResult<Option<LocalOrder>> {
        let url = format!("{}/orders/{}", self.base, order_id);
        let response = self.http.get(&url).send().await?;

        match response.status() {
            reqwest::StatusCode::OK => Ok(Some(response.json::<LocalOrder>().await?)),
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => Err(SyncError::RemoteRequestFailed {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

// =============================================================================
// In-Memory Implementation
// =============================================================================

/// In-memory local store for tests and demos.
#[derive(Default)]
pub struct MemoryLocalStore {
    products: Mutex<HashMap<i64, i64>>,
    orders: Mutex<HashMap<i64, LocalOrder>>,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a product with the given stock quantity.
    pub fn put_product(&self, product_id: i64, quantity: i64) {
        self.products
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(product_id, quantity);
    }

    /// Inserts or replaces an order.
    pub fn put_order(&self, order: LocalOrder) {
        self.orders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(order.id, order);
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn stock_quantity(&self, product_id: i64) -> SyncResult<Option<i64>> {
        Ok(self
            .products
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&product_id)
            .copied())
    }

    async fn set_stock_quantity(&self, product_id: i64, quantity: i64) -> SyncResult<()> {
        let mut products = self.products.lock().unwrap_or_else(|e| e.into_inner());
        match products.get_mut(&product_id) {
            Some(slot) => {
                *slot = quantity;
                Ok(())
            }
            None => Err(SyncError::LocalProductNotFound(product_id)),
        }
    }

    async fn order(&self, order_id: i64) -> SyncResult<Option<LocalOrder>> {
        Ok(self
            .orders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&order_id)
            .cloned())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use stockbridge_core::LocalOrderLine;

    fn http_store(server: &mockito::ServerGuard) -> HttpLocalStore {
        let mut config = SyncConfig::default();
        config.local.api_url = server.url();
        HttpLocalStore::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_http_stock_quantity() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/products/42")
            .with_status(200)
            .with_body(r#"{"id":42,"stock_quantity":7}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/products/99")
            .with_status(404)
            .create_async()
            .await;

        let store = http_store(&server);
        assert_eq!(store.stock_quantity(42).await.unwrap(), Some(7));
        assert_eq!(store.stock_quantity(99).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_http_set_stock_quantity() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/products/42")
            .match_body(mockito::Matcher::Json(
                serde_json::json!({"stock_quantity": 3}),
            ))
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("PUT", "/products/99")
            .with_status(404)
            .create_async()
            .await;

        let store = http_store(&server);
        store.set_stock_quantity(42, 3).await.unwrap();
        mock.assert_async().await;

        assert!(matches!(
            store.set_stock_quantity(99, 3).await.unwrap_err(),
            SyncError::LocalProductNotFound(99)
        ));
    }

    #[tokio::test]
    async fn test_http_order_lookup() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/orders/5")
            .with_status(200)
            .with_body(r#"{"id":5,"line_items":[{"product_id":42},{"product_id":7}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/orders/6")
            .with_status(404)
            .create_async()
            .await;

        let store = http_store(&server);
        let order = store.order(5).await.unwrap().unwrap();
        assert_eq!(order.line_items.len(), 2);
        assert_eq!(order.line_items[0].product_id, 42);

        assert!(store.order(6).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_behaves_like_the_contract() {
        let store = MemoryLocalStore::new();
        store.put_product(1, 10);
        store.put_order(LocalOrder {
            id: 99,
            line_items: vec![LocalOrderLine { product_id: 1 }],
        });

        assert_eq!(store.stock_quantity(1).await.unwrap(), Some(10));
        assert_eq!(store.stock_quantity(2).await.unwrap(), None);

        store.set_stock_quantity(1, 4).await.unwrap();
        assert_eq!(store.stock_quantity(1).await.unwrap(), Some(4));
        assert!(matches!(
            store.set_stock_quantity(2, 4).await.unwrap_err(),
            SyncError::LocalProductNotFound(2)
        ));

        assert!(store.order(99).await.unwrap().is_some());
        assert!(store.order(1).await.unwrap().is_none());
    }
}
