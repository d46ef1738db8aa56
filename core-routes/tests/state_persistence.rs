//! Route state scenarios against the SQLite key-value adapter.

use bridge_desktop::SqliteKeyValueStore;
use bridge_traits::storage::KeyValueStore;
use bridge_traits::time::SystemClock;
use core_routes::{
    ApiStatus, ChangeAction, PersistentStore, RoutePatch, RouteStateManager, RouteStatus,
    StorageKeys,
};
use core_runtime::config::StorageSettings;
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(24 * 60 * 60);

async fn open(backend: Arc<SqliteKeyValueStore>) -> RouteStateManager {
    let keys = StorageKeys::from_settings(&StorageSettings::default());
    let store = PersistentStore::new(backend, keys);
    RouteStateManager::open(store, Arc::new(SystemClock), TTL).await
}

#[tokio::test]
async fn seeded_statistics_follow_a_status_update() {
    let backend = Arc::new(SqliteKeyValueStore::in_memory().await.unwrap());
    let manager = open(backend).await;

    let stats = manager.statistics();
    assert_eq!(stats.total(), 17);
    assert_eq!(stats.count(RouteStatus::Completed), 2);

    assert!(
        manager
            .update_route(9, RoutePatch::status(RouteStatus::Completed))
            .await
    );

    assert_eq!(manager.statistics().count(RouteStatus::Completed), 3);
    let pending = manager.pending_changes();
    assert_eq!(pending[&9].action, ChangeAction::Update);
}

#[tokio::test]
async fn state_survives_reopening_the_store() {
    let backend = Arc::new(SqliteKeyValueStore::in_memory().await.unwrap());

    let first = open(backend.clone()).await;
    let new_id = first
        .add_route(core_routes::RouteDraft {
            sequence: "3ª ROTA".to_string(),
            route_number: 808,
            finish_time: "22:00".to_string(),
            check_time: "23:00".to_string(),
            status: RouteStatus::Pending,
        })
        .await;
    first.delete_route(5).await;
    first.set_api_status(ApiStatus::Online).await;
    first.set_offline_mode(true).await;
    first.record_sync().await;
    drop(first);

    let second = open(backend.clone()).await;

    assert_eq!(second.routes().len(), 17);
    assert!(second.route(5).is_none());
    assert_eq!(second.route(new_id).unwrap().route_number, 808);

    let pending = second.pending_changes();
    assert_eq!(pending[&new_id].action, ChangeAction::Create);
    assert_eq!(pending[&5].action, ChangeAction::Delete);
    assert_eq!(second.api_status(), ApiStatus::Online);
    assert!(second.is_offline_mode());
    assert!(second.last_sync().is_some());

    let next = second
        .add_route(core_routes::RouteDraft {
            sequence: "3ª ROTA".to_string(),
            route_number: 809,
            finish_time: "22:00".to_string(),
            check_time: "23:00".to_string(),
            status: RouteStatus::Pending,
        })
        .await;
    assert!(next > new_id);
}

#[tokio::test]
async fn clearing_storage_reseeds_on_next_open() {
    let backend = Arc::new(SqliteKeyValueStore::in_memory().await.unwrap());

    let first = open(backend.clone()).await;
    first.delete_route(1).await;
    first.clear_storage().await.unwrap();
    assert!(backend.list_keys().await.unwrap().is_empty());

    let second = open(backend).await;
    assert_eq!(second.routes().len(), 17);
    assert!(second.pending_changes().is_empty());
}
