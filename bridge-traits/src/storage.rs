//! Key-Value Storage Abstraction
//!
//! Durable string storage used to persist route state between runs.

use async_trait::async_trait;

use crate::error::Result;

/// Key-value storage trait
///
/// Abstracts platform-specific durable storage:
/// - Desktop: SQLite table
/// - Mobile: SharedPreferences / UserDefaults
/// - Web: localStorage
///
/// Values are opaque strings; callers serialize structured data themselves.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::KeyValueStore;
///
/// async fn remember_mode(store: &dyn KeyValueStore, offline: bool) -> Result<()> {
///     store.set_string("offline_mode", if offline { "true" } else { "false" }).await
/// }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store a string value, replacing any previous value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a value. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a key exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List all stored keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Clear all values
    async fn clear_all(&self) -> Result<()>;

    /// Begin a transaction for atomic updates
    async fn begin_transaction(&self) -> Result<Box<dyn KeyValueTransaction + Send>>;

    /// Write several entries atomically.
    ///
    /// Either every entry is stored or none is.
    async fn set_many(&self, entries: &[(String, String)]) -> Result<()> {
        let mut tx = self.begin_transaction().await?;
        for (key, value) in entries {
            if let Err(e) = tx.set_string(key, value).await {
                tx.rollback().await?;
                return Err(e);
            }
        }
        tx.commit().await
    }
}

/// Transaction for atomic key-value updates
#[async_trait]
pub trait KeyValueTransaction: Send {
    /// Set a value within the transaction
    async fn set_string(&mut self, key: &str, value: &str) -> Result<()>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct StagedStore {
        values: Arc<Mutex<HashMap<String, String>>>,
        reject_key: Option<String>,
    }

    struct StagedTx {
        target: Arc<Mutex<HashMap<String, String>>>,
        staged: Vec<(String, String)>,
        reject_key: Option<String>,
    }

    #[async_trait]
    impl KeyValueTransaction for StagedTx {
        async fn set_string(&mut self, key: &str, value: &str) -> Result<()> {
            if self.reject_key.as_deref() == Some(key) {
                return Err(BridgeError::DatabaseError(format!("rejected {}", key)));
            }
            self.staged.push((key.to_string(), value.to_string()));
            Ok(())
        }

        async fn commit(self: Box<Self>) -> Result<()> {
            let mut values = self.target.lock().unwrap();
            values.extend(self.staged);
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl KeyValueStore for StagedStore {
        async fn set_string(&self, key: &str, value: &str) -> Result<()> {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get_string(&self, key: &str) -> Result<Option<String>> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }

        async fn list_keys(&self) -> Result<Vec<String>> {
            Ok(self.values.lock().unwrap().keys().cloned().collect())
        }

        async fn clear_all(&self) -> Result<()> {
            self.values.lock().unwrap().clear();
            Ok(())
        }

        async fn begin_transaction(&self) -> Result<Box<dyn KeyValueTransaction + Send>> {
            Ok(Box::new(StagedTx {
                target: Arc::clone(&self.values),
                staged: Vec::new(),
                reject_key: self.reject_key.clone(),
            }))
        }
    }

    fn entries(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_set_many_commits_all_entries() {
        let store = StagedStore::default();
        store
            .set_many(&entries(&[("a", "1"), ("b", "2")]))
            .await
            .unwrap();

        assert_eq!(store.get_string("a").await.unwrap(), Some("1".to_string()));
        assert!(store.has_key("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_many_is_all_or_nothing() {
        let store = StagedStore {
            reject_key: Some("b".to_string()),
            ..Default::default()
        };

        let result = store.set_many(&entries(&[("a", "1"), ("b", "2")])).await;

        assert!(result.is_err());
        assert!(!store.has_key("a").await.unwrap());
    }
}
