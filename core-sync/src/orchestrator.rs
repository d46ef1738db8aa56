//! # Sync Orchestrator
//!
//! Drives reconciliation between the local route state and the spreadsheet.
//!
//! ## Overview
//!
//! [`SyncOrchestrator::sync_pending`] snapshots the pending-change queue and
//! walks it in fixed-size batches, strictly one request at a time:
//!
//! - `delete` entries become a remote delete of the route id
//! - `create` and `update` entries upload the *current* route, not the diff
//!
//! Every item is isolated; a failing item is recorded and the walk goes on.
//! Short pauses separate items and longer ones separate batches. When the
//! cycle ends with at least one success and no failure the whole snapshot
//! is cleared, otherwise only the confirmed ids are. Entries edited again
//! while the cycle ran stay queued.
//!
//! [`SyncOrchestrator::reload_all`] replaces the local collection with the
//! remote one. Pending changes survive a reload but local route edits that
//! were not queued are overwritten.

use crate::client::SheetClient;
use crate::error::{Result, SyncError};
use crate::job::{CycleStatus, ItemOutcome, SyncCycle, SyncReport};
use crate::protocol::{ApiRequest, ApiResponse};
use bridge_traits::time::Clock;
use core_routes::{ChangeAction, PendingChanges, RouteStateManager};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, instrument, warn};

/// Result of a connection probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ApiResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct SyncOrchestrator {
    client: Arc<SheetClient>,
    manager: Arc<RouteStateManager>,
    events: EventBus,
    settings: SyncSettings,
    clock: Arc<dyn Clock>,
    last_cycle: Mutex<Option<SyncCycle>>,
}

impl SyncOrchestrator {
    pub fn new(
        client: Arc<SheetClient>,
        manager: Arc<RouteStateManager>,
        events: EventBus,
        settings: SyncSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            manager,
            events,
            settings,
            clock,
            last_cycle: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &SheetClient {
        &self.client
    }

    pub fn manager(&self) -> &Arc<RouteStateManager> {
        &self.manager
    }

    /// Most recent cycle, if any ran.
    pub fn last_cycle(&self) -> Option<SyncCycle> {
        self.last_cycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Status of the most recent cycle; `Idle` before the first one.
    pub fn cycle_status(&self) -> CycleStatus {
        self.last_cycle()
            .map_or(CycleStatus::Idle, |cycle| cycle.status)
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.emit(CoreEvent::Sync(event));
    }

    fn ensure_online(&self) -> Result<()> {
        if self.manager.is_offline_mode() {
            return Err(SyncError::OfflineMode);
        }
        Ok(())
    }

    /// Push every pending change to the spreadsheet.
    ///
    /// Returns immediately with zero counts, without any network call, when
    /// the queue is empty.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotConfigured`] when changes are pending but no endpoint
    /// is set. Per-item failures are reported in the [`SyncReport`].
    #[instrument(skip(self))]
    pub async fn sync_pending(&self) -> Result<SyncReport> {
        let pending = self.manager.pending_changes();
        if pending.is_empty() {
            debug!("No pending changes to sync");
            return Ok(SyncReport::default());
        }
        if !self.client.is_configured() {
            return Err(SyncError::NotConfigured);
        }

        let ids: Vec<i64> = pending.keys().copied().collect();
        let total = ids.len();
        let mut cycle = SyncCycle::new(total).start(self.clock.now())?;
        let cycle_id = cycle.id.to_string();
        info!(cycle_id = %cycle_id, pending = total, "Sync cycle started");
        self.emit(SyncEvent::Started {
            cycle_id: cycle_id.clone(),
            pending: total,
        });

        let batch_size = self.settings.batch_size.max(1);
        let batch_count = ids.chunks(batch_size).len();

        for (batch_index, batch) in ids.chunks(batch_size).enumerate() {
            for id in batch {
                let Some(change) = pending.get(id) else {
                    continue;
                };

                let outcome = self.push_change(*id, change.action).await;
                if !outcome.is_success() {
                    warn!(route_id = id, outcome = ?outcome.status, error = ?outcome.error, "Pending change not synced");
                }
                cycle.record(outcome)?;

                self.emit(SyncEvent::Progress {
                    cycle_id: cycle_id.clone(),
                    processed: cycle.processed,
                    total,
                    percent: cycle.percent(),
                });

                tokio::time::sleep(self.settings.item_delay).await;
            }

            if batch_index + 1 < batch_count {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
        }

        let report = cycle.report.clone();
        // A clean cycle confirms the whole snapshot; otherwise only the
        // succeeded ids. Entries edited mid-cycle survive either way.
        let confirmed: PendingChanges = if report.is_clean() {
            pending
        } else {
            let succeeded: HashSet<i64> = report.succeeded_ids().collect();
            pending
                .into_iter()
                .filter(|(id, _)| succeeded.contains(id))
                .collect()
        };
        if !confirmed.is_empty() {
            self.manager.clear_synced(&confirmed).await;
        }
        if report.success_count > 0 {
            self.manager.record_sync().await;
        }

        let now = self.clock.now();
        let cycle = if report.all_errored() {
            let message = report
                .details
                .iter()
                .find_map(|o| o.error.clone())
                .unwrap_or_else(|| "all requests failed".to_string());
            error!(cycle_id = %cycle_id, error = %message, "Sync cycle failed");
            self.emit(SyncEvent::Failed {
                cycle_id: cycle_id.clone(),
                message: message.clone(),
            });
            cycle.fail(message, now)?
        } else {
            let cycle = cycle.complete(now)?;
            info!(
                cycle_id = %cycle_id,
                succeeded = report.success_count,
                failed = report.failure_count,
                "Sync cycle completed"
            );
            self.emit(SyncEvent::Completed {
                cycle_id: cycle_id.clone(),
                succeeded: report.success_count,
                failed: report.failure_count,
                duration_ms: cycle.duration_ms().unwrap_or(0),
            });
            cycle
        };

        *self
            .last_cycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(cycle);
        Ok(report)
    }

    async fn push_change(&self, id: i64, action: ChangeAction) -> ItemOutcome {
        let request = match action {
            ChangeAction::Delete => ApiRequest::DeleteRoute { route_id: id },
            ChangeAction::Create | ChangeAction::Update => match self.manager.route(id) {
                Some(route) => ApiRequest::UpdateRoute { route_data: route },
                None => return ItemOutcome::failure(id, "route no longer exists locally"),
            },
        };

        match self.client.send(&request).await {
            Ok(response) if response.success => ItemOutcome::success(id),
            Ok(response) => ItemOutcome::failure(id, response.error_message()),
            Err(e) => ItemOutcome::error(id, e.to_string()),
        }
    }

    /// Replace the local collection with the remote one. Returns the number
    /// of routes kept.
    ///
    /// # Errors
    ///
    /// Transport errors from the client, [`SyncError::Application`] when the
    /// remote refuses, and [`SyncError::Protocol`] when `data` is not an
    /// array.
    #[instrument(skip(self))]
    pub async fn reload_all(&self) -> Result<usize> {
        let response = self.client.send(&ApiRequest::GetAllRoutes).await?;
        if !response.success {
            return Err(SyncError::Application(response.error_message()));
        }
        let records: &[Value] = response.records().ok_or_else(|| SyncError::Protocol {
            message: "getAllRoutes returned no route array".to_string(),
            attempts: 1,
        })?;

        let count = self.manager.replace_all(records).await;
        self.manager.record_sync().await;
        info!(received = records.len(), kept = count, "Routes reloaded from spreadsheet");
        self.emit(SyncEvent::Reloaded { count });
        Ok(count)
    }

    /// Manual sync: refuses in offline mode, and refreshes the collection
    /// after a clean cycle that left the queue empty. A failed refresh is
    /// only logged.
    pub async fn sync_with_sheet(&self) -> Result<SyncReport> {
        self.ensure_online()?;
        let report = self.sync_pending().await?;

        if report.is_clean() {
            if self.manager.has_pending_changes() {
                info!(
                    pending = self.manager.pending_count(),
                    "Changes queued during sync, skipping reload"
                );
            } else if let Err(e) = self.reload_all().await {
                warn!(error = %e, "Sync succeeded but reloading routes failed");
            }
        }
        Ok(report)
    }

    /// Manual reload; refuses in offline mode.
    pub async fn reload_from_sheet(&self) -> Result<usize> {
        self.ensure_online()?;
        self.reload_all().await
    }

    /// Health probe. Never touches route data and never fails.
    pub async fn test_connection(&self) -> ConnectionTest {
        match self.client.send(&ApiRequest::Test).await {
            Ok(response) => {
                info!(success = response.success, "Connection test answered");
                ConnectionTest {
                    success: true,
                    response: Some(response),
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Connection test failed");
                ConnectionTest {
                    success: false,
                    response: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiStatusSink;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
    use bridge_traits::time::SystemClock;
    use bytes::Bytes;
    use core_routes::{ApiStatus, RouteDraft, RoutePatch, RouteStatus};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers according to the request action and counts calls.
    struct ScriptedSheet {
        calls: AtomicUsize,
        reject_ids: Vec<i64>,
        routes: Value,
    }

    impl ScriptedSheet {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                reject_ids: Vec::new(),
                routes: serde_json::json!([]),
            }
        }
    }

    fn ok(body: Value) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: HashMap::from([("content-type".into(), "application/json".into())]),
            body: Bytes::from(body.to_string()),
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedSheet {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body: Value = serde_json::from_slice(request.body.as_deref().unwrap_or(b"{}".as_slice()))
                .unwrap_or(Value::Null);

            let id = body["routeData"]["id"]
                .as_i64()
                .or_else(|| body["routeId"].as_i64());

            let response = match body["action"].as_str() {
                Some("getAllRoutes") => {
                    serde_json::json!({ "success": true, "data": self.routes.clone() })
                }
                Some(_) if id.is_some_and(|id| self.reject_ids.contains(&id)) => {
                    serde_json::json!({ "success": false, "error": "row locked" })
                }
                _ => serde_json::json!({ "success": true }),
            };
            Ok(ok(response))
        }
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            item_delay: Duration::from_millis(300),
            batch_delay: Duration::from_secs(1),
            ..SyncSettings::default()
        }
    }

    fn orchestrator(sheet: Arc<ScriptedSheet>) -> (SyncOrchestrator, Arc<RouteStateManager>) {
        let manager = Arc::new(RouteStateManager::in_memory(
            Arc::new(SystemClock),
            Duration::from_secs(86_400),
        ));
        let client = SheetClient::new(
            sheet,
            Some("https://script.example.com/exec".into()),
            &settings(),
        )
        .with_status_sink(manager.clone() as Arc<dyn ApiStatusSink>);

        let orchestrator = SyncOrchestrator::new(
            Arc::new(client),
            manager.clone(),
            EventBus::default(),
            settings(),
            Arc::new(SystemClock),
        );
        (orchestrator, manager)
    }

    #[tokio::test]
    async fn test_empty_queue_makes_no_calls() {
        let sheet = Arc::new(ScriptedSheet::new());
        let (orchestrator, _) = orchestrator(sheet.clone());

        let report = orchestrator.sync_pending().await.unwrap();

        assert_eq!(report, SyncReport::default());
        assert_eq!(sheet.calls.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.cycle_status(), CycleStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_clears_only_successes() {
        let sheet = Arc::new(ScriptedSheet {
            reject_ids: vec![2, 4],
            ..ScriptedSheet::new()
        });
        let (orchestrator, manager) = orchestrator(sheet.clone());
        for id in 1..=5 {
            manager
                .update_route(id, RoutePatch::status(RouteStatus::Completed))
                .await;
        }

        let report = orchestrator.sync_pending().await.unwrap();

        assert_eq!(report.success_count, 3);
        assert_eq!(report.failure_count, 2);
        let remaining: Vec<i64> = manager.pending_changes().keys().copied().collect();
        assert_eq!(remaining, vec![2, 4]);
        assert_eq!(sheet.calls.load(Ordering::SeqCst), 5);
        assert_eq!(orchestrator.cycle_status(), CycleStatus::Completed);
        assert!(manager.last_sync().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_cycle_clears_queue_and_paces_batches() {
        let sheet = Arc::new(ScriptedSheet::new());
        let (orchestrator, manager) = orchestrator(sheet.clone());
        for id in 1..=6 {
            manager.delete_route(id).await;
        }
        manager
            .add_route(RouteDraft {
                sequence: "1ª ROTA".into(),
                route_number: 900,
                finish_time: "10:00".into(),
                check_time: "11:00".into(),
                status: RouteStatus::Scheduled,
            })
            .await;

        let started = tokio::time::Instant::now();
        let report = orchestrator.sync_pending().await.unwrap();

        assert_eq!(report.success_count, 7);
        assert!(manager.pending_changes().is_empty());
        // 7 item pauses and one pause between the two batches
        assert!(started.elapsed() >= Duration::from_millis(7 * 300 + 1000));
        assert_eq!(manager.api_status(), ApiStatus::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_local_route_is_a_failure() {
        let sheet = Arc::new(ScriptedSheet::new());
        let (orchestrator, manager) = orchestrator(sheet.clone());
        manager
            .update_route(3, RoutePatch::status(RouteStatus::Active))
            .await;
        manager.replace_routes(Vec::new()).await;

        let report = orchestrator.sync_pending().await.unwrap();

        assert_eq!(report.failure_count, 1);
        assert_eq!(sheet.calls.load(Ordering::SeqCst), 0);
        assert!(manager.pending_changes().contains_key(&3));
    }

    fn late_route() -> RouteDraft {
        RouteDraft {
            sequence: "3ª ROTA".into(),
            route_number: 777,
            finish_time: "18:00".into(),
            check_time: "19:00".into(),
            status: RouteStatus::Scheduled,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_during_cycle_stay_queued() {
        let sheet = Arc::new(ScriptedSheet::new());
        let (orchestrator, manager) = orchestrator(sheet.clone());
        let orchestrator = Arc::new(orchestrator);
        manager
            .update_route(1, RoutePatch::status(RouteStatus::Active))
            .await;
        manager
            .update_route(3, RoutePatch::status(RouteStatus::Active))
            .await;

        let cycle = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.sync_pending().await }
        });
        // route 1 is pushed, the cycle now waits out the item delay
        tokio::time::sleep(Duration::from_millis(100)).await;
        let created = manager.add_route(late_route()).await;
        manager
            .update_route(2, RoutePatch::status(RouteStatus::Delayed))
            .await;
        manager
            .update_route(3, RoutePatch::status(RouteStatus::Completed))
            .await;

        let report = cycle.await.unwrap().unwrap();

        assert_eq!(report.success_count, 2);
        assert!(report.is_clean());
        let pending = manager.pending_changes();
        let remaining: Vec<i64> = pending.keys().copied().collect();
        assert_eq!(remaining, vec![2, 3, created]);
        assert_eq!(pending[&created].action, ChangeAction::Create);
        assert_eq!(pending[&3].fields.status, Some(RouteStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_with_sheet_skips_reload_when_edits_arrive() {
        let sheet = Arc::new(ScriptedSheet::new());
        let (orchestrator, manager) = orchestrator(sheet.clone());
        let orchestrator = Arc::new(orchestrator);
        manager
            .update_route(1, RoutePatch::status(RouteStatus::Active))
            .await;

        let cycle = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.sync_with_sheet().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        let created = manager.add_route(late_route()).await;

        let report = cycle.await.unwrap().unwrap();

        assert_eq!(report.success_count, 1);
        // one push, no getAllRoutes
        assert_eq!(sheet.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.route(created).unwrap().route_number, 777);
        assert_eq!(manager.routes().len(), 18);
        assert!(manager.pending_changes().contains_key(&created));
    }

    #[tokio::test]
    async fn test_pending_changes_without_endpoint_are_refused() {
        let sheet = Arc::new(ScriptedSheet::new());
        let manager = Arc::new(RouteStateManager::in_memory(
            Arc::new(SystemClock),
            Duration::from_secs(86_400),
        ));
        let client = SheetClient::new(sheet.clone(), None, &settings());
        let orchestrator = SyncOrchestrator::new(
            Arc::new(client),
            manager.clone(),
            EventBus::default(),
            settings(),
            Arc::new(SystemClock),
        );
        manager
            .update_route(7, RoutePatch::status(RouteStatus::Delayed))
            .await;

        assert_eq!(
            orchestrator.sync_pending().await.unwrap_err(),
            SyncError::NotConfigured
        );
        assert_eq!(sheet.calls.load(Ordering::SeqCst), 0);
        assert_eq!(manager.pending_count(), 1);
        assert_eq!(orchestrator.cycle_status(), CycleStatus::Idle);
    }

    #[tokio::test]
    async fn test_reload_replaces_routes() {
        let sheet = Arc::new(ScriptedSheet {
            routes: serde_json::json!([
                {"id": 40, "sequencia": "2ª ROTA", "rota": 1, "hrFinalizar": "01:00", "hrConferencia": "02:00", "status": "active"},
                {"id": 41, "sequencia": "2ª ROTA", "rota": "bad"}
            ]),
            ..ScriptedSheet::new()
        });
        let (orchestrator, manager) = orchestrator(sheet);
        let mut events = orchestrator.events.subscribe();

        let kept = orchestrator.reload_from_sheet().await.unwrap();

        assert_eq!(kept, 1);
        assert_eq!(manager.routes()[0].id, 40);
        assert!(manager.last_sync().is_some());
        assert_eq!(
            events.try_recv().unwrap(),
            CoreEvent::Sync(SyncEvent::Reloaded { count: 1 })
        );
    }

    #[tokio::test]
    async fn test_offline_mode_blocks_manual_commands() {
        let sheet = Arc::new(ScriptedSheet::new());
        let (orchestrator, manager) = orchestrator(sheet.clone());
        manager.set_offline_mode(true).await;

        assert_eq!(
            orchestrator.sync_with_sheet().await.unwrap_err(),
            SyncError::OfflineMode
        );
        assert_eq!(
            orchestrator.reload_from_sheet().await.unwrap_err(),
            SyncError::OfflineMode
        );
        assert_eq!(sheet.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connection_probe_leaves_routes_alone() {
        let sheet = Arc::new(ScriptedSheet::new());
        let (orchestrator, manager) = orchestrator(sheet);
        let before = manager.routes();

        let result = orchestrator.test_connection().await;

        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(manager.routes(), before);
    }
}
