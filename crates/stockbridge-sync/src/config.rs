//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOCKBRIDGE_CLIENT_ID=...                                          │
//! │     STOCKBRIDGE_CLIENT_SECRET=...                                      │
//! │     STOCKBRIDGE_SANDBOX=true                                           │
//! │     STOCKBRIDGE_BATCH_POLICY=continue_on_error                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/stockbridge/stockbridge.toml (Linux)                     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     production marketplace hosts, hourly polling, fail-fast batches    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # stockbridge.toml
//! [marketplace]
//! client_id = "abc123"
//! client_secret = "s3cret"
//! sandbox = false
//! redirect_uri = "https://shop.example/admin/stockbridge/callback"
//!
//! [local]
//! api_url = "https://shop.example/wp-json/stock/v1"
//!
//! [sync]
//! batch_policy = "fail_fast"   # fail_fast | continue_on_error
//! poll_interval_secs = 3600
//! http_timeout_secs = 30
//! retry_max_elapsed_secs = 20
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Marketplace Hosts
// =============================================================================

/// Production authorization host.
const AUTH_URL: &str = "https://allegro.pl";

/// Production API host.
const API_URL: &str = "https://api.allegro.pl";

/// Sandbox authorization host.
const SANDBOX_AUTH_URL: &str = "https://allegro.pl.allegrosandbox.pl";

/// Sandbox API host.
const SANDBOX_API_URL: &str = "https://api.allegro.pl.allegrosandbox.pl";

// =============================================================================
// Batch Policy
// =============================================================================

/// Iteration policy for whole-set sync operations.
///
/// The original integration stops at the first failed binding. Continuing
/// past failures is equally legitimate, so the choice is an explicit
/// configuration flag rather than a silent behavior change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// First per-binding failure aborts the remaining iteration.
    #[default]
    FailFast,

    /// Every binding is attempted; failures are collected in the report.
    ContinueOnError,
}

impl std::fmt::Display for BatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchPolicy::FailFast => write!(f, "fail_fast"),
            BatchPolicy::ContinueOnError => write!(f, "continue_on_error"),
        }
    }
}

impl std::str::FromStr for BatchPolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail_fast" | "failfast" | "abort" => Ok(BatchPolicy::FailFast),
            "continue_on_error" | "continue" | "best_effort" => Ok(BatchPolicy::ContinueOnError),
            other => Err(SyncError::ConfigLoadFailed(format!(
                "Unknown batch policy: '{}'. Valid options: fail_fast, continue_on_error",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Marketplace (remote platform) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    /// OAuth2 client ID issued by the marketplace.
    #[serde(default)]
    pub client_id: String,

    /// OAuth2 client secret issued by the marketplace.
    #[serde(default)]
    pub client_secret: String,

    /// Use the marketplace sandbox hosts instead of production.
    #[serde(default)]
    pub sandbox: bool,

    /// Canonical OAuth2 callback URL of this installation.
    #[serde(default)]
    pub redirect_uri: String,

    /// Override for the authorization host (mainly for tests).
    #[serde(default)]
    pub auth_url: Option<String>,

    /// Override for the API host (mainly for tests).
    #[serde(default)]
    pub api_url: Option<String>,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        MarketplaceConfig {
            client_id: String::new(),
            client_secret: String::new(),
            sandbox: false,
            redirect_uri: String::new(),
            auth_url: None,
            api_url: None,
        }
    }
}

impl MarketplaceConfig {
    /// Effective authorization host, honoring overrides and the sandbox flag.
    pub fn auth_url(&self) -> &str {
        match &self.auth_url {
            Some(url) => url,
            None if self.sandbox => SANDBOX_AUTH_URL,
            None => AUTH_URL,
        }
    }

    /// Effective API host, honoring overrides and the sandbox flag.
    pub fn api_url(&self) -> &str {
        match &self.api_url {
            Some(url) => url,
            None if self.sandbox => SANDBOX_API_URL,
            None => API_URL,
        }
    }

    /// Returns true if both client credentials are configured.
    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// Local store (local platform) settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Base URL of the local store's stock API.
    #[serde(default)]
    pub api_url: String,
}

/// Engine timing and policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Whole-set iteration policy.
    #[serde(default)]
    pub batch_policy: BatchPolicy,

    /// Interval between order-poll ticks, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Per-request HTTP timeout, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Retry budget for transient transport errors, in seconds. Zero
    /// disables retries entirely.
    #[serde(default = "default_retry_max_elapsed_secs")]
    pub retry_max_elapsed_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    3600 // hourly, like the original's scheduled event
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_retry_max_elapsed_secs() -> u64 {
    20
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            batch_policy: BatchPolicy::default(),
            poll_interval_secs: default_poll_interval_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            retry_max_elapsed_secs: default_retry_max_elapsed_secs(),
        }
    }
}

/// Storage locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// State file path. Defaults to the platform data directory.
    #[serde(default)]
    pub state_path: Option<PathBuf>,

    /// Journal file path. Defaults to the platform data directory.
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
}

// =============================================================================
// Sync Config
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Marketplace settings.
    #[serde(default)]
    pub marketplace: MarketplaceConfig,

    /// Local store settings.
    #[serde(default)]
    pub local: LocalConfig,

    /// Engine settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Storage locations.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl SyncConfig {
    /// Loads configuration from the given path (or the default location),
    /// falling back to defaults when no file exists, then applies
    /// environment-variable overrides.
    pub fn load_or_default(path: Option<PathBuf>) -> SyncResult<Self> {
        let path = match path {
            Some(p) => p,
            None => Self::default_config_path()?,
        };

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| SyncError::ConfigLoadFailed(e.to_string()))?;
            let config: SyncConfig =
                toml::from_str(&raw).map_err(|e| SyncError::ConfigLoadFailed(e.to_string()))?;
            info!(path = %path.display(), "Loaded configuration");
            config
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            SyncConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Writes the configuration to the given path.
    pub fn save(&self, path: &PathBuf) -> SyncResult<()> {
        let raw =
            toml::to_string_pretty(self).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        std::fs::write(path, raw).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))
    }

    /// Applies `STOCKBRIDGE_*` environment overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("STOCKBRIDGE_CLIENT_ID") {
            self.marketplace.client_id = id;
        }
        if let Ok(secret) = std::env::var("STOCKBRIDGE_CLIENT_SECRET") {
            self.marketplace.client_secret = secret;
        }
        if let Ok(sandbox) = std::env::var("STOCKBRIDGE_SANDBOX") {
            self.marketplace.sandbox = sandbox != "false" && sandbox != "0";
        }
        if let Ok(policy) = std::env::var("STOCKBRIDGE_BATCH_POLICY") {
            if let Ok(parsed) = policy.parse() {
                self.sync.batch_policy = parsed;
            }
        }
    }

    /// Default config file location.
    pub fn default_config_path() -> SyncResult<PathBuf> {
        let dirs = directories::ProjectDirs::from("com", "stockbridge", "stockbridge")
            .ok_or_else(|| {
                SyncError::ConfigLoadFailed("Cannot determine config directory".into())
            })?;
        Ok(dirs.config_dir().join("stockbridge.toml"))
    }

    /// Effective state file path.
    pub fn state_path(&self) -> SyncResult<PathBuf> {
        if let Some(path) = &self.storage.state_path {
            return Ok(path.clone());
        }
        let dirs = directories::ProjectDirs::from("com", "stockbridge", "stockbridge")
            .ok_or_else(|| SyncError::ConfigLoadFailed("Cannot determine data directory".into()))?;
        Ok(dirs.data_dir().join("state.json"))
    }

    /// Effective journal file path.
    pub fn journal_path(&self) -> SyncResult<PathBuf> {
        if let Some(path) = &self.storage.journal_path {
            return Ok(path.clone());
        }
        let dirs = directories::ProjectDirs::from("com", "stockbridge", "stockbridge")
            .ok_or_else(|| SyncError::ConfigLoadFailed("Cannot determine data directory".into()))?;
        Ok(dirs.data_dir().join("stockbridge.log"))
    }
}

// =============================================================================
// Tests
// =============================================================================
