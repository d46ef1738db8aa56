//! # Route State Manager
//!
//! The single in-process authority over the route collection and the
//! pending-change queue.
//!
//! ## Overview
//!
//! `RouteStateManager` owns the authoritative in-memory copy of every route
//! and pending change. All mutations go through it so that it can:
//!
//! - assign ids that are never reused for the lifetime of the process
//! - collapse repeated edits of one route into a single pending change
//! - persist after every mutation (best effort, failures are only logged)
//! - notify registered observers synchronously once the mutation is applied
//!
//! The in-memory update happens under a short, non-suspending lock, so a
//! mutation is atomic with respect to every other reader. Persistence then
//! writes a fresh snapshot under a separate async lock, which keeps the
//! durable copy ordered even when mutations race.
//!
//! Without a [`PersistentStore`] the manager runs purely in memory, seeded
//! with the default dataset.
//!
//! ## Usage
//!
//! ```no_run
//! use bridge_traits::SystemClock;
//! use core_routes::{RouteDraft, RouteStateManager, RouteStatus};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let manager = RouteStateManager::in_memory(Arc::new(SystemClock), Duration::from_secs(86_400));
//!
//! let _subscription = manager.subscribe(|change| println!("{change:?}"));
//!
//! let id = manager
//!     .add_route(RouteDraft {
//!         sequence: "1ª ROTA".into(),
//!         route_number: 700,
//!         finish_time: "08:00".into(),
//!         check_time: "09:00".into(),
//!         status: RouteStatus::Scheduled,
//!     })
//!     .await;
//! assert!(manager.pending_changes().contains_key(&id));
//! # }
//! ```

use crate::filter::RouteFilter;
use crate::models::{
    ApiStatus, ChangeAction, PendingChange, PendingChanges, Route, RouteDraft, RoutePatch,
};
use crate::seed::default_routes;
use crate::stats::Statistics;
use crate::store::{PersistentStore, StoredState};
use crate::validation::{is_valid, sanitize, sanitize_route};
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a mutation changed, delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteChange {
    Added { route_id: i64 },
    Updated { route_id: i64 },
    Deleted { route_id: i64 },
    Replaced { count: usize },
    Synced { route_id: i64 },
    PendingCleared { count: usize },
    PendingExpired { count: usize },
    ApiStatus(ApiStatus),
    OfflineMode(bool),
    LastSync(DateTime<Utc>),
}

type Listener = Arc<dyn Fn(&RouteChange) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Keeps an observer registered; dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<ListenerRegistry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Operational snapshot of the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub routes: usize,
    pub pending_changes: usize,
    pub api_status: ApiStatus,
    pub offline_mode: bool,
    pub last_sync: Option<DateTime<Utc>>,
    /// Whether state is backed by durable storage
    pub persistent: bool,
}

struct State {
    routes: Vec<Route>,
    pending: PendingChanges,
    api_status: ApiStatus,
    offline_mode: bool,
    last_sync: Option<DateTime<Utc>>,
    /// Next id to hand out; only ever grows
    next_id: i64,
}

impl State {
    fn from_stored(stored: StoredState) -> Self {
        let mut state = Self {
            routes: stored.routes,
            pending: stored.pending,
            api_status: stored.api_status,
            offline_mode: stored.offline_mode,
            last_sync: stored.last_sync,
            next_id: 1,
        };
        state.raise_next_id();
        state
    }

    fn raise_next_id(&mut self) {
        let highest = self
            .routes
            .iter()
            .map(|r| r.id)
            .chain(self.pending.keys().copied())
            .max()
            .unwrap_or(0);
        self.next_id = self.next_id.max(highest + 1);
    }

    fn index_of(&self, id: i64) -> Option<usize> {
        self.routes.iter().position(|r| r.id == id)
    }

    fn to_stored(&self) -> StoredState {
        StoredState {
            routes: self.routes.clone(),
            pending: self.pending.clone(),
            api_status: self.api_status,
            offline_mode: self.offline_mode,
            last_sync: self.last_sync,
        }
    }
}

pub struct RouteStateManager {
    state: RwLock<State>,
    store: Option<PersistentStore>,
    persist_lock: tokio::sync::Mutex<()>,
    listeners: Arc<Mutex<ListenerRegistry>>,
    clock: Arc<dyn Clock>,
    pending_ttl: Duration,
}

impl RouteStateManager {
    /// Memory-only manager seeded with the default dataset.
    pub fn in_memory(clock: Arc<dyn Clock>, pending_ttl: Duration) -> Self {
        Self::with_state(StoredState::seeded(), None, clock, pending_ttl)
    }

    /// Load state from `store`. A failing backend leaves the manager running
    /// on the default dataset; later saves still target the store.
    pub async fn open(store: PersistentStore, clock: Arc<dyn Clock>, pending_ttl: Duration) -> Self {
        let stored = match store.load().await {
            Ok(stored) => stored,
            Err(e) => {
                error!(error = %e, "Failed to load route state, using default dataset");
                StoredState::seeded()
            }
        };

        info!(
            routes = stored.routes.len(),
            pending = stored.pending.len(),
            "Route state loaded"
        );
        Self::with_state(stored, Some(store), clock, pending_ttl)
    }

    fn with_state(
        stored: StoredState,
        store: Option<PersistentStore>,
        clock: Arc<dyn Clock>,
        pending_ttl: Duration,
    ) -> Self {
        Self {
            state: RwLock::new(State::from_stored(stored)),
            store,
            persist_lock: tokio::sync::Mutex::new(()),
            listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
            clock,
            pending_ttl,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Register `listener`; it runs inline after every mutation until the
    /// returned [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RouteChange) + Send + Sync + 'static,
    {
        let mut registry = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.push((id, Arc::new(listener)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }

    fn notify(&self, change: RouteChange) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&change))).is_err() {
                error!(change = ?change, "Route listener panicked");
            }
        }
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };

        let _guard = self.persist_lock.lock().await;
        let snapshot = self.read().to_stored();
        if let Err(e) = store.save(&snapshot).await {
            error!(error = %e, "Failed to persist route state");
        }
    }

    async fn commit(&self, change: RouteChange) {
        self.persist().await;
        self.notify(change);
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn routes(&self) -> Vec<Route> {
        self.read().routes.clone()
    }

    pub fn route(&self, id: i64) -> Option<Route> {
        self.read().routes.iter().find(|r| r.id == id).cloned()
    }

    pub fn filter(&self, filter: &RouteFilter) -> Vec<Route> {
        filter.apply(&self.read().routes)
    }

    pub fn pending_changes(&self) -> PendingChanges {
        self.read().pending.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.read().pending.len()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.read().pending.is_empty()
    }

    pub fn api_status(&self) -> ApiStatus {
        self.read().api_status
    }

    pub fn is_offline_mode(&self) -> bool {
        self.read().offline_mode
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.read().last_sync
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    pub fn statistics(&self) -> Statistics {
        Statistics::compute(&self.read().routes, self.clock.now())
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let state = self.read();
        Diagnostics {
            routes: state.routes.len(),
            pending_changes: state.pending.len(),
            api_status: state.api_status,
            offline_mode: state.offline_mode,
            last_sync: state.last_sync,
            persistent: self.store.is_some(),
        }
    }

    pub fn snapshot(&self) -> StoredState {
        self.read().to_stored()
    }

    // ------------------------------------------------------------------
    // Route mutations
    // ------------------------------------------------------------------

    /// Append a new route and queue its creation. Returns the assigned id.
    pub async fn add_route(&self, draft: RouteDraft) -> i64 {
        let id = {
            let mut state = self.write();
            let id = state.next_id;
            state.next_id += 1;

            let route = sanitize_route(&draft.into_route(id));
            state.pending.insert(
                id,
                PendingChange {
                    action: ChangeAction::Create,
                    fields: RoutePatch::from(&route),
                    timestamp: self.clock.unix_timestamp_millis(),
                },
            );
            state.routes.push(route);
            id
        };

        debug!(route_id = id, "Route added");
        self.commit(RouteChange::Added { route_id: id }).await;
        id
    }

    /// Merge `patch` into route `id`. Returns `false` when the id is unknown.
    ///
    /// A pending `create` stays a `create`; anything else becomes `update`.
    pub async fn update_route(&self, id: i64, patch: RoutePatch) -> bool {
        {
            let mut state = self.write();
            let Some(index) = state.index_of(id) else {
                return false;
            };

            let mut route = state.routes[index].clone();
            route.apply(&patch);
            state.routes[index] = sanitize_route(&route);

            let mut fields = patch;
            fields.id = None;
            let timestamp = self.clock.unix_timestamp_millis();

            state
                .pending
                .entry(id)
                .and_modify(|existing| {
                    existing.fields.merge(&fields);
                    if existing.action != ChangeAction::Create {
                        existing.action = ChangeAction::Update;
                    }
                    existing.timestamp = timestamp;
                })
                .or_insert_with(|| PendingChange {
                    action: ChangeAction::Update,
                    fields: fields.clone(),
                    timestamp,
                });
        }

        debug!(route_id = id, "Route updated");
        self.commit(RouteChange::Updated { route_id: id }).await;
        true
    }

    /// Remove route `id`. Returns `false` when the id is unknown.
    ///
    /// Deleting a route whose creation was never synced drops the pending
    /// entry instead of queuing a remote delete.
    pub async fn delete_route(&self, id: i64) -> bool {
        {
            let mut state = self.write();
            let Some(index) = state.index_of(id) else {
                return false;
            };
            state.routes.remove(index);

            let was_local_create = state
                .pending
                .get(&id)
                .is_some_and(|change| change.action == ChangeAction::Create);

            if was_local_create {
                state.pending.remove(&id);
            } else {
                state.pending.insert(
                    id,
                    PendingChange {
                        action: ChangeAction::Delete,
                        fields: RoutePatch::default(),
                        timestamp: self.clock.unix_timestamp_millis(),
                    },
                );
            }
        }

        debug!(route_id = id, "Route deleted");
        self.commit(RouteChange::Deleted { route_id: id }).await;
        true
    }

    /// Replace the whole collection with raw records, typically a remote
    /// refresh. Invalid records, non-positive ids and duplicate ids are
    /// dropped. Pending changes are left untouched. Returns the number of
    /// routes kept.
    pub async fn replace_all(&self, records: &[Value]) -> usize {
        let routes = records
            .iter()
            .filter(|record| is_valid(record))
            .map(sanitize)
            .collect();
        self.replace_routes(routes).await
    }

    /// Typed variant of [`replace_all`](Self::replace_all).
    pub async fn replace_routes(&self, routes: Vec<Route>) -> usize {
        let mut seen = HashSet::new();
        let routes: Vec<Route> = routes
            .iter()
            .map(sanitize_route)
            .filter(|route| route.id > 0 && seen.insert(route.id))
            .collect();
        let count = routes.len();

        {
            let mut state = self.write();
            state.routes = routes;
            state.raise_next_id();
        }

        info!(count, "Route collection replaced");
        self.commit(RouteChange::Replaced { count }).await;
        count
    }

    /// Reload the default dataset.
    pub async fn reset_to_default(&self) -> usize {
        self.replace_routes(default_routes()).await
    }

    // ------------------------------------------------------------------
    // Pending-change bookkeeping
    // ------------------------------------------------------------------

    /// Drop the pending entry for `id` after a confirmed remote write.
    pub async fn mark_synced(&self, id: i64) {
        let removed = self.write().pending.remove(&id).is_some();
        if removed {
            debug!(route_id = id, "Pending change synced");
        }
        self.commit(RouteChange::Synced { route_id: id }).await;
    }

    /// Drop the entries of `synced` that are still queued unchanged. An entry
    /// edited again since `synced` was taken stays queued for the next cycle.
    /// Returns how many were dropped.
    pub async fn clear_synced(&self, synced: &PendingChanges) -> usize {
        let (count, kept) = {
            let mut state = self.write();
            let mut count = 0;
            let mut kept = 0;
            for (id, change) in synced {
                if state.pending.get(id) == Some(change) {
                    state.pending.remove(id);
                    count += 1;
                } else if state.pending.contains_key(id) {
                    kept += 1;
                }
            }
            (count, kept)
        };

        if kept > 0 {
            debug!(kept, "Pending changes edited during sync stay queued");
        }
        info!(count, "Synced pending changes cleared");
        self.commit(RouteChange::PendingCleared { count }).await;
        count
    }

    pub async fn clear_all_pending(&self) -> usize {
        let count = {
            let mut state = self.write();
            let count = state.pending.len();
            state.pending.clear();
            count
        };

        info!(count, "Pending changes cleared");
        self.commit(RouteChange::PendingCleared { count }).await;
        count
    }

    /// Remove pending entries older than the configured TTL. Returns how many
    /// were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.unix_timestamp_millis();
        let ttl = i64::try_from(self.pending_ttl.as_millis()).unwrap_or(i64::MAX);

        let expired: Vec<i64> = {
            let mut state = self.write();
            let expired: Vec<i64> = state
                .pending
                .iter()
                .filter(|(_, change)| change.is_expired(now, ttl))
                .map(|(id, _)| *id)
                .collect();
            for id in &expired {
                state.pending.remove(id);
            }
            expired
        };

        for id in &expired {
            warn!(route_id = id, "Dropping expired pending change");
        }

        self.persist().await;
        if !expired.is_empty() {
            self.notify(RouteChange::PendingExpired {
                count: expired.len(),
            });
        }
        expired.len()
    }

    /// Run [`purge_expired`](Self::purge_expired) every `interval` until
    /// `cancel` fires. The first sweep happens one interval after start.
    pub fn spawn_maintenance(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Maintenance task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let purged = manager.purge_expired().await;
                        debug!(purged, "Maintenance sweep finished");
                    }
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Connectivity flags
    // ------------------------------------------------------------------

    /// Persists and notifies only when the status actually changes.
    pub async fn set_api_status(&self, status: ApiStatus) {
        let changed = {
            let mut state = self.write();
            let changed = state.api_status != status;
            state.api_status = status;
            changed
        };

        if changed {
            info!(status = status.as_str(), "API status changed");
            self.commit(RouteChange::ApiStatus(status)).await;
        }
    }

    pub async fn set_offline_mode(&self, offline: bool) {
        self.write().offline_mode = offline;
        info!(offline, "Offline mode set");
        self.commit(RouteChange::OfflineMode(offline)).await;
    }

    /// Stamp the current time as the last confirmed remote round-trip.
    pub async fn record_sync(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        self.write().last_sync = Some(now);
        self.commit(RouteChange::LastSync(now)).await;
        now
    }

    /// Delete every persisted record. In-memory state is kept.
    pub async fn clear_storage(&self) -> crate::error::Result<()> {
        if let Some(store) = &self.store {
            let _guard = self.persist_lock.lock().await;
            store.clear().await?;
            info!("Persisted route state cleared");
        }
        Ok(())
    }
}
