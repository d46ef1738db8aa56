//! Durable persistence of route state over a [`KeyValueStore`].
//!
//! Five records are kept, each under its own namespaced key: the route
//! collection, the pending-change map, the last-sync timestamp, the api
//! status and the offline-mode flag. Writes go through
//! [`KeyValueStore::set_many`] so backends with transactions apply them
//! together.

use crate::error::Result;
use crate::models::{ApiStatus, PendingChange, PendingChanges, Route};
use crate::seed::default_routes;
use crate::validation::{is_valid, sanitize};
use bridge_traits::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use core_runtime::config::StorageSettings;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Storage keys derived from a namespace and schema version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub routes: String,
    pub pending: String,
    pub last_sync: String,
    pub api_status: String,
    pub offline_mode: String,
}

impl StorageKeys {
    pub fn new(namespace: &str, version: &str) -> Self {
        Self {
            routes: format!("{namespace}_{version}"),
            pending: format!("{namespace}_pending_{version}"),
            last_sync: format!("{namespace}_last_sync_{version}"),
            api_status: format!("{namespace}_api_status_{version}"),
            offline_mode: format!("{namespace}_offline_mode_{version}"),
        }
    }

    pub fn from_settings(settings: &StorageSettings) -> Self {
        Self::new(&settings.namespace, &settings.version)
    }

    pub fn all(&self) -> [&str; 5] {
        [
            &self.routes,
            &self.pending,
            &self.last_sync,
            &self.api_status,
            &self.offline_mode,
        ]
    }
}

/// Everything the state manager persists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredState {
    pub routes: Vec<Route>,
    pub pending: PendingChanges,
    pub api_status: ApiStatus,
    pub offline_mode: bool,
    pub last_sync: Option<DateTime<Utc>>,
}

impl StoredState {
    /// Fresh state holding the default dataset.
    pub fn seeded() -> Self {
        Self {
            routes: default_routes(),
            ..Default::default()
        }
    }
}

pub struct PersistentStore {
    store: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
}

impl PersistentStore {
    pub fn new(store: Arc<dyn KeyValueStore>, keys: StorageKeys) -> Self {
        Self { store, keys }
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    /// Read all persisted records.
    ///
    /// Missing or unparsable route data is replaced by the default dataset,
    /// which is written back immediately. Unparsable pending entries and
    /// status values fall back to empty and `offline` without affecting the
    /// routes already read. Only backend read failures are returned.
    pub async fn load(&self) -> Result<StoredState> {
        let routes = match self.store.get_string(&self.keys.routes).await? {
            Some(raw) => parse_routes(&raw),
            None => None,
        };

        let pending = match self.store.get_string(&self.keys.pending).await? {
            Some(raw) => parse_pending(&raw),
            None => PendingChanges::new(),
        };

        let api_status = self
            .store
            .get_string(&self.keys.api_status)
            .await?
            .map(|raw| ApiStatus::parse_lossy(&raw))
            .unwrap_or_default();

        let offline_mode = self
            .store
            .get_string(&self.keys.offline_mode)
            .await?
            .is_some_and(|raw| raw == "true");

        let last_sync = self
            .store
            .get_string(&self.keys.last_sync)
            .await?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|ts| ts.with_timezone(&Utc));

        let mut state = StoredState {
            routes: Vec::new(),
            pending,
            api_status,
            offline_mode,
            last_sync,
        };

        match routes {
            Some(routes) => {
                debug!(
                    routes = routes.len(),
                    pending = state.pending.len(),
                    "Loaded route state"
                );
                state.routes = routes;
            }
            None => {
                info!("No usable stored routes, seeding default dataset");
                state.routes = default_routes();
                if let Err(e) = self.save(&state).await {
                    warn!(error = %e, "Failed to persist default dataset");
                }
            }
        }

        Ok(state)
    }

    /// Overwrite every record with `state`.
    pub async fn save(&self, state: &StoredState) -> Result<()> {
        let mut entries = vec![
            (
                self.keys.routes.clone(),
                serde_json::to_string(&state.routes)?,
            ),
            (
                self.keys.pending.clone(),
                serde_json::to_string(&state.pending)?,
            ),
            (
                self.keys.api_status.clone(),
                state.api_status.as_str().to_string(),
            ),
            (
                self.keys.offline_mode.clone(),
                state.offline_mode.to_string(),
            ),
        ];
        if let Some(last_sync) = state.last_sync {
            entries.push((self.keys.last_sync.clone(), last_sync.to_rfc3339()));
        }

        self.store.set_many(&entries).await?;
        Ok(())
    }

    /// Remove every record owned by this store.
    pub async fn clear(&self) -> Result<()> {
        for key in self.keys.all() {
            self.store.delete(key).await?;
        }
        Ok(())
    }
}

/// Valid records only, sanitized. `None` when the payload is not a JSON array.
fn parse_routes(raw: &str) -> Option<Vec<Route>> {
    let values: Vec<Value> = serde_json::from_str(raw).ok()?;
    Some(values.iter().filter(|v| is_valid(v)).map(sanitize).collect())
}

/// Entries that fail to parse are dropped one by one.
fn parse_pending(raw: &str) -> PendingChanges {
    let Ok(entries) = serde_json::from_str::<serde_json::Map<String, Value>>(raw) else {
        warn!("Stored pending changes are unreadable, starting empty");
        return PendingChanges::new();
    };

    entries
        .into_iter()
        .filter_map(|(id, value)| {
            let id = id.parse::<i64>().ok()?;
            match serde_json::from_value::<PendingChange>(value) {
                Ok(change) => Some((id, change)),
                Err(e) => {
                    warn!(route_id = id, error = %e, "Dropping unreadable pending change");
                    None
                }
            }
        })
        .collect()
}
