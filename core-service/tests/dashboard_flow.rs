//! Dashboard flows against a real SQLite store and a scripted sheet.

use async_trait::async_trait;
use bridge_desktop::SqliteKeyValueStore;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::storage::KeyValueStore;
use bytes::Bytes;
use core_service::{
    ConnectionStatus, CoreEvent, RouteDraft, RoutePatch, RouteStatus,
    RouteTracker, StatusLevel, TrackerConfig,
};
use core_runtime::config::SyncSettings;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Accepts every write and serves two routes on reload.
#[derive(Default)]
struct ScriptedSheet {
    writes: AtomicUsize,
    reloads: AtomicUsize,
}

#[async_trait]
impl HttpClient for ScriptedSheet {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let body: serde_json::Value =
            serde_json::from_slice(request.body.as_deref().unwrap_or_default())
                .unwrap_or_default();
        let payload = match body["action"].as_str() {
            Some("getAllRoutes") => {
                self.reloads.fetch_add(1, Ordering::SeqCst);
                r#"{"success":true,"data":[
                    {"id":9,"sequencia":"4ª ROTA","rota":607,"hrFinalizar":"21:30","hrConferencia":"22:30","status":"completed"},
                    {"id":10,"sequencia":"4ª ROTA","rota":606,"hrFinalizar":"21:30","hrConferencia":"22:30","status":"pending"}
                ]}"#
            }
            _ => {
                self.writes.fetch_add(1, Ordering::SeqCst);
                r#"{"success":true}"#
            }
        };
        Ok(HttpResponse {
            status: 200,
            headers: HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
            body: Bytes::from(payload),
        })
    }
}

fn fast_sync() -> SyncSettings {
    SyncSettings {
        item_delay: Duration::ZERO,
        batch_delay: Duration::ZERO,
        ..SyncSettings::default()
    }
}

#[tokio::test]
async fn edit_sync_and_reload_survive_restart() {
    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::in_memory().await.unwrap());
    let sheet = Arc::new(ScriptedSheet::default());

    let config = TrackerConfig::builder()
        .script_url("https://script.google.com/macros/s/deployment/exec")
        .sync_settings(fast_sync())
        .http_client(sheet.clone())
        .key_value_store(store.clone())
        .enable_auto_sync(false)
        .enable_maintenance(false)
        .build()
        .unwrap();
    let tracker = RouteTracker::start(config.clone()).await.unwrap();
    let mut events = tracker.subscribe_events();

    assert_eq!(tracker.snapshot().statistics.total(), 17);
    assert!(tracker.update_route(9, RoutePatch::status(RouteStatus::Completed)).await);
    assert_eq!(tracker.snapshot().pending_changes, 1);

    let report = tracker.sync_with_sheet().await.unwrap();
    assert_eq!(report.success_count, 1);
    assert_eq!(sheet.writes.load(Ordering::SeqCst), 1);
    assert_eq!(sheet.reloads.load(Ordering::SeqCst), 1);

    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.routes.len(), 2);
    assert_eq!(snapshot.pending_changes, 0);
    assert_eq!(snapshot.connection_status, ConnectionStatus::Connected);
    assert!(snapshot.last_sync.is_some());
    let message = snapshot.message.unwrap();
    assert_eq!(message.text, "1 changes synced");
    assert_eq!(message.level, StatusLevel::Success);

    let mut saw_sync = false;
    while let Ok(event) = events.try_recv() {
        saw_sync |= matches!(event, CoreEvent::Sync(_));
    }
    assert!(saw_sync);

    tracker.shutdown().await;
    drop(tracker);

    let reopened = RouteTracker::start(config).await.unwrap();
    let snapshot = reopened.snapshot();
    assert_eq!(snapshot.routes.len(), 2);
    assert_eq!(snapshot.api_status, core_service::ApiStatus::Online);
    assert!(snapshot.last_sync.is_some());
}

#[cfg(feature = "desktop-shims")]
#[tokio::test]
async fn desktop_bootstrap_persists_to_file() {
    use core_service::bootstrap_desktop;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("route-tracker.db");
    let builder = || {
        TrackerConfig::builder()
            .database_path(&path)
            .enable_auto_sync(false)
            .enable_maintenance(false)
    };

    let tracker = bootstrap_desktop(builder()).await.unwrap();
    let id = tracker
        .add_route(RouteDraft {
            sequence: "7ª ROTA".to_string(),
            route_number: 321,
            finish_time: "23:00".to_string(),
            check_time: "23:45".to_string(),
            status: RouteStatus::Scheduled,
        })
        .await;
    assert_eq!(id, 18);
    assert!(tracker.manager().is_persistent());
    tracker.shutdown().await;
    drop(tracker);

    let reopened = bootstrap_desktop(builder()).await.unwrap();
    let snapshot = reopened.snapshot();
    assert_eq!(snapshot.routes.len(), 18);
    assert_eq!(snapshot.pending_changes, 1);
}
