//! # stockbridge-store: Persisted State and Journal
//!
//! Persistence layer for the sync engine: a small JSON state file for the
//! handful of options the engine owns, and the append-only journal.
//!
//! The engine never touches a bare global: both surfaces are explicit store
//! objects injected into the token manager, sync engine and order watcher,
//! with a lifecycle of process start (load) to process stop (flush-on-write).
//!
//! ## Modules
//!
//! - [`state`] - `StateStore`: credential, pending authorization, bindings,
//!   order watermark and the one-shot settings notice
//! - [`journal`] - `Journal`: append-only text log
//! - [`error`] - Store error types

pub mod error;
pub mod journal;
pub mod state;

pub use error::{StoreError, StoreResult};
pub use journal::Journal;
pub use state::StateStore;
