//! # Route Tracker
//!
//! The presentation-facing façade. One [`RouteTracker`] owns the route
//! state manager, the sync orchestrator and the background tasks for the
//! lifetime of a host session.
//!
//! Hosts read state through [`RouteTracker::snapshot`] and react to changes
//! either synchronously ([`RouteTracker::subscribe`]) or through the event
//! bus ([`RouteTracker::events`]). Commands mirror the dashboard actions and
//! post a transient [`StatusMessage`] describing their outcome.

use crate::diagnostics::{ConfigSummary, DiagnosticsConsole};
use crate::error::Result;
use crate::status::{StatusBoard, StatusLevel, StatusMessage, LONG_MESSAGE_TTL, SHORT_MESSAGE_TTL};
use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use core_routes::transfer::{self, ImportReport};
use core_routes::{
    ApiStatus, ConnectionStatus, PersistentStore, Route, RouteChange, RouteDraft, RouteFilter,
    RoutePatch, RouteStateManager, RouteStatus, Statistics, StorageKeys, Subscription,
};
use core_runtime::config::TrackerConfig;
use core_runtime::events::{ConnectivityEvent, CoreEvent, EventBus, RouteEvent};
use core_sync::{
    spawn_auto_sync, spawn_network_watcher, ConnectionTest, NetworkState, SheetClient, SyncError,
    SyncOrchestrator, SyncReport,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything the dashboard renders, read in one go.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub routes: Vec<Route>,
    pub statistics: Statistics,
    pub connection_status: ConnectionStatus,
    pub api_status: ApiStatus,
    pub is_online: bool,
    pub is_offline_mode: bool,
    pub pending_changes: usize,
    pub has_pending_changes: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub message: Option<StatusMessage>,
    pub error: Option<String>,
}

/// Stand-in transport when the host provided none; every call fails.
struct UnavailableHttpClient;

#[async_trait]
impl HttpClient for UnavailableHttpClient {
    async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
        Err(BridgeError::NotAvailable(
            "no HTTP client configured".to_string(),
        ))
    }
}

/// Translate a manager notification into a bus event.
fn bus_event(change: &RouteChange) -> Option<CoreEvent> {
    let event = match change {
        RouteChange::Added { route_id } => CoreEvent::Routes(RouteEvent::Added {
            route_id: *route_id,
        }),
        RouteChange::Updated { route_id } => CoreEvent::Routes(RouteEvent::Updated {
            route_id: *route_id,
        }),
        RouteChange::Deleted { route_id } => CoreEvent::Routes(RouteEvent::Deleted {
            route_id: *route_id,
        }),
        RouteChange::Replaced { count } => {
            CoreEvent::Routes(RouteEvent::Replaced { count: *count })
        }
        RouteChange::Synced { .. } => CoreEvent::Routes(RouteEvent::PendingCleared { count: 1 }),
        RouteChange::PendingCleared { count } => {
            CoreEvent::Routes(RouteEvent::PendingCleared { count: *count })
        }
        RouteChange::PendingExpired { count } => {
            CoreEvent::Routes(RouteEvent::PendingExpired { count: *count })
        }
        RouteChange::ApiStatus(status) => {
            CoreEvent::Connectivity(ConnectivityEvent::ApiStatusChanged {
                status: status.as_str().to_string(),
            })
        }
        RouteChange::OfflineMode(offline) => {
            CoreEvent::Connectivity(ConnectivityEvent::OfflineModeChanged { offline: *offline })
        }
        RouteChange::LastSync(_) => return None,
    };
    Some(event)
}

pub struct RouteTracker {
    manager: Arc<RouteStateManager>,
    orchestrator: Arc<SyncOrchestrator>,
    events: EventBus,
    network: Arc<NetworkState>,
    status: StatusBoard,
    last_error: Mutex<Option<String>>,
    config: ConfigSummary,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    _bus_bridge: Subscription,
}

impl RouteTracker {
    /// Wire the core from `config` and start the enabled background tasks.
    ///
    /// Without a key-value store the tracker runs memory-only on the default
    /// dataset. Without a script URL every remote command fails with
    /// [`SyncError::NotConfigured`].
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        let clock = config.clock.clone();
        let storage = &config.storage;

        let manager = Arc::new(match &config.key_value_store {
            Some(store) => {
                let store = PersistentStore::new(store.clone(), StorageKeys::from_settings(storage));
                RouteStateManager::open(store, clock.clone(), storage.pending_ttl).await
            }
            None => {
                info!("No key-value store configured, route state is memory-only");
                RouteStateManager::in_memory(clock.clone(), storage.pending_ttl)
            }
        });

        let events = EventBus::default();
        let bus_bridge = {
            let events = events.clone();
            manager.subscribe(move |change| {
                if let Some(event) = bus_event(change) {
                    let _ = events.emit(event);
                }
            })
        };

        let http = config
            .http_client
            .clone()
            .unwrap_or_else(|| Arc::new(UnavailableHttpClient) as Arc<dyn HttpClient>);
        let client = SheetClient::new(http, config.script_url.clone(), &config.sync)
            .with_status_sink(manager.clone());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::new(client),
            manager.clone(),
            events.clone(),
            config.sync.clone(),
            clock,
        ));

        let network = Arc::new(NetworkState::default());
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        if config.features.enable_network_awareness {
            if let Some(monitor) = config.network_monitor.clone() {
                match monitor.get_network_info().await {
                    Ok(info) => {
                        network.set_online(info.is_online());
                    }
                    Err(e) => warn!(error = %e, "Initial network probe failed"),
                }
                tasks.push(spawn_network_watcher(
                    monitor,
                    manager.clone(),
                    network.clone(),
                    events.clone(),
                    cancel.child_token(),
                ));
            }
        }

        if config.features.enable_maintenance {
            tasks.push(manager.spawn_maintenance(storage.cleanup_interval, cancel.child_token()));
        }

        if config.features.enable_auto_sync {
            tasks.push(spawn_auto_sync(
                orchestrator.clone(),
                network.clone(),
                config.sync.auto_sync_interval,
                cancel.child_token(),
            ));
        }

        info!(
            remote = config.is_remote_configured(),
            persistent = manager.is_persistent(),
            background_tasks = tasks.len(),
            "Route tracker started"
        );

        Ok(Self {
            status: StatusBoard::new(config.clock.clone()),
            config: ConfigSummary::from_config(&config),
            manager,
            orchestrator,
            events,
            network,
            last_error: Mutex::new(None),
            cancel,
            tasks: Mutex::new(tasks),
            _bus_bridge: bus_bridge,
        })
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Route tracker stopped");
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    pub fn manager(&self) -> &Arc<RouteStateManager> {
        &self.manager
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    /// Same-cycle notification after every state mutation.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RouteChange) + Send + Sync + 'static,
    {
        self.manager.subscribe(listener)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus::derive(
            self.manager.is_offline_mode(),
            self.network.is_online(),
            self.manager.api_status(),
        )
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        let routes = self.manager.routes();
        let pending_changes = self.manager.pending_count();

        DashboardSnapshot {
            statistics: self.manager.statistics(),
            connection_status: self.connection_status(),
            api_status: self.manager.api_status(),
            is_online: self.network.is_online(),
            is_offline_mode: self.manager.is_offline_mode(),
            pending_changes,
            has_pending_changes: pending_changes > 0,
            last_sync: self.manager.last_sync(),
            message: self.status.current(),
            error: self.error(),
            routes,
        }
    }

    pub fn filter(&self, filter: &RouteFilter) -> Vec<Route> {
        self.manager.filter(filter)
    }

    pub fn status_message(&self) -> Option<StatusMessage> {
        self.status.current()
    }

    pub fn error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_error(&self) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn set_error(&self, message: String) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }

    pub fn console(&self) -> DiagnosticsConsole {
        DiagnosticsConsole::new(
            self.manager.clone(),
            self.orchestrator.clone(),
            self.network.clone(),
            self.config.clone(),
        )
    }

    // ------------------------------------------------------------------
    // Local edits
    // ------------------------------------------------------------------

    pub async fn add_route(&self, draft: RouteDraft) -> i64 {
        let id = self.manager.add_route(draft).await;
        self.status
            .post(format!("Route {id} created"), StatusLevel::Success, SHORT_MESSAGE_TTL);
        id
    }

    pub async fn update_route(&self, id: i64, patch: RoutePatch) -> bool {
        let updated = self.manager.update_route(id, patch).await;
        if updated {
            self.status
                .post(format!("Route {id} updated"), StatusLevel::Success, SHORT_MESSAGE_TTL);
        }
        updated
    }

    pub async fn set_route_status(&self, id: i64, status: RouteStatus) -> bool {
        let updated = self.manager.update_route(id, RoutePatch::status(status)).await;
        if updated {
            self.status.post(
                format!("Route {id} status set to {}", status.label()),
                StatusLevel::Success,
                SHORT_MESSAGE_TTL,
            );
        }
        updated
    }

    pub async fn delete_route(&self, id: i64) -> bool {
        let deleted = self.manager.delete_route(id).await;
        if deleted {
            self.status
                .post(format!("Route {id} deleted"), StatusLevel::Success, SHORT_MESSAGE_TTL);
        }
        deleted
    }

    pub async fn set_offline_mode(&self, offline: bool) {
        self.manager.set_offline_mode(offline).await;
    }

    /// Append the routes of an exported document as new routes.
    pub async fn import_json(&self, json: &str) -> Result<ImportReport> {
        let report = transfer::import_json(&self.manager, json).await?;
        let level = if report.errors.is_empty() {
            StatusLevel::Success
        } else {
            StatusLevel::Warning
        };
        self.status.post(
            format!(
                "{} routes imported, {} rejected",
                report.imported,
                report.errors.len()
            ),
            level,
            SHORT_MESSAGE_TTL,
        );
        Ok(report)
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(transfer::export_json(&self.manager)?)
    }

    pub fn backup_json(&self) -> Result<String> {
        Ok(transfer::backup_json(&self.manager)?)
    }

    pub async fn restore_backup(&self, json: &str) -> Result<usize> {
        let restored = transfer::restore_backup(&self.manager, json).await?;
        self.status.post(
            format!("{restored} routes restored from backup"),
            StatusLevel::Success,
            SHORT_MESSAGE_TTL,
        );
        Ok(restored)
    }

    // ------------------------------------------------------------------
    // Remote commands
    // ------------------------------------------------------------------

    /// Push pending changes, then refresh from the sheet after a clean run.
    ///
    /// # Errors
    ///
    /// [`SyncError::OfflineMode`] in forced offline mode, otherwise any
    /// error surfaced by the orchestrator.
    pub async fn sync_with_sheet(&self) -> Result<SyncReport> {
        self.status
            .post("Syncing with the sheet...", StatusLevel::Info, LONG_MESSAGE_TTL);

        match self.orchestrator.sync_with_sheet().await {
            Ok(report) => {
                self.clear_error();
                let (text, level) = if report.success_count > 0 {
                    (
                        format!("{} changes synced", report.success_count),
                        StatusLevel::Success,
                    )
                } else if report.failure_count > 0 {
                    (
                        format!("{} changes failed to sync", report.failure_count),
                        StatusLevel::Warning,
                    )
                } else {
                    ("No changes to sync".to_string(), StatusLevel::Info)
                };
                self.status.post(text, level, LONG_MESSAGE_TTL);
                Ok(report)
            }
            Err(err) => {
                self.fail_remote(&err, "Sync failed", LONG_MESSAGE_TTL);
                Err(err.into())
            }
        }
    }

    /// Replace local routes with the sheet contents.
    pub async fn reload_from_sheet(&self) -> Result<usize> {
        self.status
            .post("Reloading routes from the sheet...", StatusLevel::Info, SHORT_MESSAGE_TTL);

        match self.orchestrator.reload_from_sheet().await {
            Ok(count) => {
                self.clear_error();
                self.status.post(
                    format!("{count} routes reloaded from the sheet"),
                    StatusLevel::Success,
                    SHORT_MESSAGE_TTL,
                );
                Ok(count)
            }
            Err(err) => {
                self.fail_remote(&err, "Reload failed", SHORT_MESSAGE_TTL);
                Err(err.into())
            }
        }
    }

    pub async fn test_connection(&self) -> ConnectionTest {
        self.status
            .post("Testing connection...", StatusLevel::Info, LONG_MESSAGE_TTL);

        let result = self.orchestrator.test_connection().await;
        if result.success {
            self.clear_error();
            self.status.post(
                "Connection to the sheet script is working",
                StatusLevel::Success,
                LONG_MESSAGE_TTL,
            );
        } else {
            let message = result
                .error
                .clone()
                .unwrap_or_else(|| "connection test failed".to_string());
            self.status.post(
                format!("Connection test failed: {message}"),
                StatusLevel::Error,
                LONG_MESSAGE_TTL,
            );
            self.set_error(message);
        }
        result
    }

    fn fail_remote(&self, err: &SyncError, prefix: &str, ttl: std::time::Duration) {
        // Offline mode is a refusal, not a failure worth keeping on screen.
        if *err != SyncError::OfflineMode {
            self.set_error(err.to_string());
        }
        self.status
            .post(format!("{prefix}: {err}"), StatusLevel::Error, ttl);
    }
}

impl Drop for RouteTracker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
