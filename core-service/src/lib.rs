//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, key-value
//! storage, network monitoring, clock) into the route tracker core and
//! exposes the result as a [`RouteTracker`]. Desktop apps typically enable
//! the `desktop-shims` feature (which depends on `bridge-desktop`) and call
//! [`bootstrap_desktop`]; other hosts inject their own adapters through
//! [`TrackerConfig`] and call [`RouteTracker::start`].

pub mod diagnostics;
pub mod error;
pub mod status;
pub mod tracker;

pub use diagnostics::{ConfigSummary, DiagnosticsConsole, SystemStatus};
pub use error::{CoreError, Result};
pub use status::{StatusBoard, StatusLevel, StatusMessage};
pub use tracker::{DashboardSnapshot, RouteTracker};

pub use core_routes::{
    ApiStatus, ConnectionStatus, Route, RouteChange, RouteDraft, RouteFilter, RoutePatch,
    RouteStatus, Sequence, Statistics,
};
pub use core_runtime::config::{TrackerConfig, TrackerConfigBuilder};
pub use core_runtime::events::{CoreEvent, EventBus};
pub use core_sync::{ConnectionTest, ErrorKind, SyncError, SyncReport};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
use bridge_desktop::{DesktopNetworkMonitor, ReqwestHttpClient, SqliteKeyValueStore};
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
use std::sync::Arc;

/// Fill every bridge the builder is missing with its desktop adapter.
///
/// The SQLite store is only opened when a database path is configured;
/// without one the tracker stays memory-only.
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub async fn with_desktop_defaults(mut builder: TrackerConfigBuilder) -> Result<TrackerConfigBuilder> {
    if !builder.has_http_client() {
        let client = ReqwestHttpClient::new()
            .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
        builder = builder.http_client(Arc::new(client));
    }

    if !builder.has_key_value_store() {
        if let Some(path) = builder.database_path_ref().cloned() {
            let store = SqliteKeyValueStore::new(path)
                .await
                .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
            builder = builder.key_value_store(Arc::new(store));
        }
    }

    if !builder.has_network_monitor() {
        builder = builder.network_monitor(Arc::new(DesktopNetworkMonitor::new()));
    }

    Ok(builder)
}

/// Convenience bootstrapper for desktop hosts.
///
/// ```ignore
/// use core_service::{bootstrap_desktop, TrackerConfig};
///
/// let builder = TrackerConfig::builder()
///     .script_url("https://script.google.com/macros/s/DEPLOYMENT/exec")
///     .database_path("route-tracker.db")
///     .enable_network_awareness(true);
/// let tracker = bootstrap_desktop(builder).await?;
/// println!("{} routes", tracker.snapshot().routes.len());
/// ```
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub async fn bootstrap_desktop(builder: TrackerConfigBuilder) -> Result<RouteTracker> {
    let config = with_desktop_defaults(builder).await?.build()?;
    RouteTracker::start(config).await
}
