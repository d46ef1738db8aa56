//! # Tracker Configuration Module
//!
//! Provides configuration management for the route tracker core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `TrackerConfig` holding the injected host bridges together with the sync
//! and storage settings. `build()` validates everything up front so that a
//! misconfigured tracker fails at startup instead of on the first sync.
//!
//! ## Bridges
//!
//! - `HttpClient` - Required for any remote command
//! - `KeyValueStore` - Optional; without it route state lives in memory only
//! - `NetworkMonitor` - Optional; required when network awareness is enabled
//! - `Clock` - Optional; defaults to [`SystemClock`]
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::TrackerConfig;
//! use std::sync::Arc;
//!
//! let config = TrackerConfig::builder()
//!     .script_url("https://script.google.com/macros/s/DEPLOYMENT/exec")
//!     .http_client(Arc::new(my_http_client))
//!     .key_value_store(Arc::new(my_store))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, KeyValueStore, NetworkMonitor, RetryPolicy, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const ENV_SCRIPT_URL: &str = "ROUTE_TRACKER_SCRIPT_URL";
pub const ENV_SHEETS_ID: &str = "ROUTE_TRACKER_SHEETS_ID";
pub const ENV_DB_PATH: &str = "ROUTE_TRACKER_DB_PATH";

/// Timing and batching parameters for talking to the spreadsheet API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Upper bound for a single request attempt
    pub request_timeout: Duration,
    /// Total attempts per request, including the first one
    pub retry_attempts: u32,
    /// Base retry delay; attempt `n` waits `n × retry_delay`
    pub retry_delay: Duration,
    pub auto_sync_interval: Duration,
    /// Pending changes processed per batch
    pub batch_size: usize,
    /// Pause between two items of a batch
    pub item_delay: Duration,
    /// Pause between two batches
    pub batch_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(20),
            retry_attempts: 2,
            retry_delay: Duration::from_millis(1500),
            auto_sync_interval: Duration::from_secs(10 * 60),
            batch_size: 5,
            item_delay: Duration::from_millis(300),
            batch_delay: Duration::from_secs(1),
        }
    }
}

impl SyncSettings {
    /// Retry policy derived from these settings
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(self.retry_attempts, self.retry_delay)
    }
}

/// Local persistence parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    /// Prefix shared by every storage key
    pub namespace: String,
    /// Schema version tag appended to every storage key
    pub version: String,
    /// Pending changes older than this are dropped by the maintenance sweep
    pub pending_ttl: Duration,
    pub cleanup_interval: Duration,
    /// Database file for the desktop SQLite store
    pub database_path: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            namespace: "rotas_cd_pa".to_string(),
            version: "v25".to_string(),
            pending_ttl: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
            database_path: None,
        }
    }
}

/// Feature flags control optional background behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Periodically push pending changes while online
    pub enable_auto_sync: bool,

    /// Follow host online/offline transitions (requires NetworkMonitor)
    pub enable_network_awareness: bool,

    /// Hourly sweep of expired pending changes
    pub enable_maintenance: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_auto_sync: true,
            enable_network_awareness: false,
            enable_maintenance: true,
        }
    }
}

/// Core configuration for the route tracker.
///
/// Use [`TrackerConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct TrackerConfig {
    /// Deployed spreadsheet script endpoint
    pub script_url: Option<String>,

    /// Spreadsheet identifier, informational only
    pub spreadsheet_id: Option<String>,

    pub sync: SyncSettings,

    pub storage: StorageSettings,

    pub features: FeatureFlags,

    pub http_client: Option<Arc<dyn HttpClient>>,

    /// Durable storage; `None` keeps route state in memory only
    pub key_value_store: Option<Arc<dyn KeyValueStore>>,

    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerConfig")
            .field(
                "script_url",
                &self.script_url.as_deref().map(crate::logging::redact_url),
            )
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("sync", &self.sync)
            .field("storage", &self.storage)
            .field("features", &self.features)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field(
                "key_value_store",
                &self
                    .key_value_store
                    .as_ref()
                    .map(|_| "KeyValueStore { ... }"),
            )
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .finish()
    }
}

impl TrackerConfig {
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    /// Whether a remote endpoint is configured
    pub fn is_remote_configured(&self) -> bool {
        self.script_url.is_some()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The script URL, when set, is an absolute http(s) URL
    /// - Timeouts, attempts and batch size are non-zero
    /// - Feature flags are consistent with available bridges
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.script_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(Error::Config(
                    "Script URL must start with http:// or https://".to_string(),
                ));
            }
            if self.http_client.is_none() {
                return Err(Error::CapabilityMissing {
                    capability: "HttpClient".to_string(),
                    message: "A script URL is configured but no HttpClient was provided. \
                              Desktop: enable the 'desktop-shims' feature. \
                              Other hosts: inject a platform HTTP adapter."
                        .to_string(),
                });
            }
        }

        if self.sync.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        if self.sync.retry_attempts == 0 {
            return Err(Error::Config(
                "Retry attempts must be at least 1".to_string(),
            ));
        }

        if self.sync.batch_size == 0 {
            return Err(Error::Config(
                "Sync batch size must be greater than 0".to_string(),
            ));
        }

        if self.features.enable_auto_sync && self.sync.auto_sync_interval.is_zero() {
            return Err(Error::Config(
                "Auto-sync enabled with a zero interval".to_string(),
            ));
        }

        if self.features.enable_maintenance && self.storage.cleanup_interval.is_zero() {
            return Err(Error::Config(
                "Maintenance enabled with a zero cleanup interval".to_string(),
            ));
        }

        if self.storage.namespace.trim().is_empty() {
            return Err(Error::Config(
                "Storage namespace cannot be empty".to_string(),
            ));
        }

        if self.features.enable_network_awareness && self.network_monitor.is_none() {
            return Err(Error::Config(
                "Network awareness enabled but no NetworkMonitor provided. \
                 Disable the feature or inject a NetworkMonitor implementation."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for constructing [`TrackerConfig`] instances.
#[derive(Default)]
pub struct TrackerConfigBuilder {
    script_url: Option<String>,
    spreadsheet_id: Option<String>,
    sync: SyncSettings,
    storage: StorageSettings,
    features: FeatureFlags,
    http_client: Option<Arc<dyn HttpClient>>,
    key_value_store: Option<Arc<dyn KeyValueStore>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Option<Arc<dyn Clock>>,
}

impl TrackerConfigBuilder {
    /// Builder preloaded from `ROUTE_TRACKER_*` environment variables.
    ///
    /// Unset or blank variables leave the corresponding field empty.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builder preloaded through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut builder = Self::default();
        builder.script_url = read(ENV_SCRIPT_URL);
        builder.spreadsheet_id = read(ENV_SHEETS_ID);
        builder.storage.database_path = read(ENV_DB_PATH).map(PathBuf::from);
        builder
    }

    pub fn script_url(mut self, url: impl Into<String>) -> Self {
        self.script_url = Some(url.into());
        self
    }

    pub fn spreadsheet_id(mut self, id: impl Into<String>) -> Self {
        self.spreadsheet_id = Some(id.into());
        self
    }

    /// Sets the database file used by the desktop store.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage.database_path = Some(path.into());
        self
    }

    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = settings;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.sync.request_timeout = timeout;
        self
    }

    /// Sets the total attempt count and the linear base delay.
    pub fn retry(mut self, attempts: u32, base_delay: Duration) -> Self {
        self.sync.retry_attempts = attempts;
        self.sync.retry_delay = base_delay;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.sync.batch_size = size;
        self
    }

    pub fn auto_sync_interval(mut self, interval: Duration) -> Self {
        self.sync.auto_sync_interval = interval;
        self
    }

    pub fn storage_settings(mut self, settings: StorageSettings) -> Self {
        self.storage = settings;
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the durable store. Without one, state is kept in memory only.
    pub fn key_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.key_value_store = Some(store);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn enable_auto_sync(mut self, enabled: bool) -> Self {
        self.features.enable_auto_sync = enabled;
        self
    }

    /// Requires a `NetworkMonitor` to be provided.
    pub fn enable_network_awareness(mut self, enabled: bool) -> Self {
        self.features.enable_network_awareness = enabled;
        self
    }

    pub fn enable_maintenance(mut self, enabled: bool) -> Self {
        self.features.enable_maintenance = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn has_http_client(&self) -> bool {
        self.http_client.is_some()
    }

    pub fn has_key_value_store(&self) -> bool {
        self.key_value_store.is_some()
    }

    pub fn has_network_monitor(&self) -> bool {
        self.network_monitor.is_some()
    }

    pub fn database_path_ref(&self) -> Option<&PathBuf> {
        self.storage.database_path.as_ref()
    }

    /// Builds the final `TrackerConfig` instance.
    ///
    /// Returns an error with an actionable message if values are invalid or
    /// feature flags are inconsistent with the injected bridges.
    pub fn build(self) -> Result<TrackerConfig> {
        let config = TrackerConfig {
            script_url: self.script_url,
            spreadsheet_id: self.spreadsheet_id,
            sync: self.sync,
            storage: self.storage,
            features: self.features,
            http_client: self.http_client,
            key_value_store: self.key_value_store,
            network_monitor: self.network_monitor,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
