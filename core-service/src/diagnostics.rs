//! # Diagnostics Console
//!
//! Introspection and test-harness calls for operators and tooling. Nothing
//! here is reachable from the dashboard surface; hosts wire it to a debug
//! command line or a support screen.

use core_routes::transfer::{self, Backup, EXPORT_VERSION};
use core_routes::{
    ApiStatus, ConnectionStatus, Diagnostics, PendingChanges, Route, RouteDraft, RouteStateManager,
    RouteStatus, Sequence, Statistics,
};
use core_runtime::config::TrackerConfig;
use core_runtime::logging::redact_url;
use core_sync::{ConnectionTest, CycleStatus, NetworkState, SyncOrchestrator, SyncReport};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;

/// Effective configuration, safe to print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub version: &'static str,
    /// Script endpoint with its deployment path redacted
    pub script_url: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub request_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub auto_sync_interval_ms: u64,
    pub batch_size: usize,
    pub storage_namespace: String,
    pub storage_version: String,
    pub pending_ttl_ms: u64,
    pub auto_sync: bool,
    pub network_awareness: bool,
    pub maintenance: bool,
}

impl ConfigSummary {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            version: EXPORT_VERSION,
            script_url: config.script_url.as_deref().map(redact_url),
            spreadsheet_id: config.spreadsheet_id.clone(),
            request_timeout_ms: config.sync.request_timeout.as_millis() as u64,
            retry_attempts: config.sync.retry_attempts,
            retry_delay_ms: config.sync.retry_delay.as_millis() as u64,
            auto_sync_interval_ms: config.sync.auto_sync_interval.as_millis() as u64,
            batch_size: config.sync.batch_size,
            storage_namespace: config.storage.namespace.clone(),
            storage_version: config.storage.version.clone(),
            pending_ttl_ms: config.storage.pending_ttl.as_millis() as u64,
            auto_sync: config.features.enable_auto_sync,
            network_awareness: config.features.enable_network_awareness,
            maintenance: config.features.enable_maintenance,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    #[serde(flatten)]
    pub diagnostics: Diagnostics,
    pub connection_status: ConnectionStatus,
    pub network_online: bool,
    pub cycle_status: CycleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report: Option<SyncReport>,
}

#[derive(Clone)]
pub struct DiagnosticsConsole {
    manager: Arc<RouteStateManager>,
    orchestrator: Arc<SyncOrchestrator>,
    network: Arc<NetworkState>,
    config: ConfigSummary,
}

impl DiagnosticsConsole {
    pub fn new(
        manager: Arc<RouteStateManager>,
        orchestrator: Arc<SyncOrchestrator>,
        network: Arc<NetworkState>,
        config: ConfigSummary,
    ) -> Self {
        Self {
            manager,
            orchestrator,
            network,
            config,
        }
    }

    pub fn diagnose(&self) -> Diagnostics {
        self.manager.diagnostics()
    }

    pub async fn test_connection(&self) -> ConnectionTest {
        self.orchestrator.test_connection().await
    }

    pub fn routes(&self) -> Vec<Route> {
        self.manager.routes()
    }

    pub fn pending_changes(&self) -> PendingChanges {
        self.manager.pending_changes()
    }

    pub fn statistics(&self) -> Statistics {
        self.manager.statistics()
    }

    /// Run one sync cycle, ignoring offline mode.
    pub async fn sync_changes(&self) -> Result<SyncReport> {
        Ok(self.orchestrator.sync_pending().await?)
    }

    /// Replace local routes with the sheet contents, ignoring offline mode.
    pub async fn fetch_from_sheet(&self) -> Result<usize> {
        Ok(self.orchestrator.reload_all().await?)
    }

    pub async fn clear_pending(&self) -> usize {
        self.manager.clear_all_pending().await
    }

    pub async fn reset_to_default(&self) -> usize {
        self.manager.reset_to_default().await
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(transfer::export_json(&self.manager)?)
    }

    pub fn create_backup(&self) -> Backup {
        transfer::create_backup(&self.manager)
    }

    pub fn config(&self) -> &ConfigSummary {
        &self.config
    }

    /// Flip offline mode and return the new value.
    pub async fn toggle_offline_mode(&self) -> bool {
        let offline = !self.manager.is_offline_mode();
        self.manager.set_offline_mode(offline).await;
        info!(offline, "Offline mode toggled from console");
        offline
    }

    /// Delete every persisted key. The in-memory state stays until restart.
    pub async fn clear_storage(&self) -> Result<()> {
        Ok(self.manager.clear_storage().await?)
    }

    pub async fn simulate_network_error(&self) {
        info!("Simulating a network error");
        self.manager.set_api_status(ApiStatus::Error).await;
    }

    pub async fn simulate_offline(&self) {
        info!("Simulating offline mode");
        self.manager.set_offline_mode(true).await;
    }

    /// Add a scheduled first-sequence route with a random number in
    /// `100..1100`.
    pub async fn add_sample_route(&self) -> i64 {
        let route_number = 100 + (Uuid::new_v4().as_u128() % 1000) as i64;
        let id = self
            .manager
            .add_route(RouteDraft {
                sequence: Sequence::First.label().to_string(),
                route_number,
                finish_time: "08:00".to_string(),
                check_time: "09:00".to_string(),
                status: RouteStatus::Scheduled,
            })
            .await;
        info!(id, route_number, "Sample route added");
        id
    }

    pub fn system_status(&self) -> SystemStatus {
        let diagnostics = self.manager.diagnostics();
        let network_online = self.network.is_online();
        let last_cycle = self.orchestrator.last_cycle();

        SystemStatus {
            connection_status: ConnectionStatus::derive(
                diagnostics.offline_mode,
                network_online,
                diagnostics.api_status,
            ),
            network_online,
            cycle_status: last_cycle
                .as_ref()
                .map_or(CycleStatus::Idle, |cycle| cycle.status),
            last_report: last_cycle.map(|cycle| cycle.report),
            diagnostics,
        }
    }
}
