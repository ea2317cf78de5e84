//! # Stockbridge Sync
//!
//! Bidirectional stock synchronization between a local store and a remote
//! marketplace, driven by product-to-offer bindings.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Topology                                   │
//! │                                                                         │
//! │  ┌─────────────┐      ┌──────────────────────────┐     ┌─────────────┐ │
//! │  │ Local Store │◄────►│       SyncEngine         │◄───►│ Marketplace │ │
//! │  │ (stock API) │      │  push / pull per binding │     │ (REST API)  │ │
//! │  └─────────────┘      └──────────┬───────────────┘     └──────┬──────┘ │
//! │         ▲                        │                            │        │
//! │         │                 ┌──────┴──────┐              ┌──────┴──────┐ │
//! │   order hook              │ OrderWatcher│              │ TokenManager│ │
//! │         └─────────────────┤ poll + hook │              │ PKCE + refr.│ │
//! │                           └──────┬──────┘              └──────┬──────┘ │
//! │                                  │                            │        │
//! │                           ┌──────┴────────────────────────────┴──────┐ │
//! │                           │      StateStore + Journal                │ │
//! │                           │  bindings, credential, watermark, notice │ │
//! │                           └──────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every remote operation goes through [`TokenManager`] for the bearer token
//! and through [`MarketClient`] for the wire; every state transition lands in
//! the [`stockbridge_store::Journal`].

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod local;
pub mod market;
pub mod orders;
pub mod pkce;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BatchPolicy, SyncConfig};
pub use engine::{SyncEngine, SyncReport};
pub use error::{SyncError, SyncResult};
pub use local::{HttpLocalStore, LocalStore, MemoryLocalStore};
pub use market::MarketClient;
pub use orders::OrderWatcher;
pub use token::TokenManager;
