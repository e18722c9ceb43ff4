//! Key-value persistence for users, channels and teams.
//!
//! Objects are free-form JSON carrying a string `id`. The store performs no
//! locking across calls: a `get` followed by a `save` is last-writer-wins.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::warn;

use crate::error::StorageError;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Value>, StorageError>;

    /// Insert or replace `object` under its `id` field.
    async fn save(&self, object: Value) -> Result<(), StorageError>;

    async fn all(&self) -> Result<Vec<Value>, StorageError>;

    async fn delete(&self, id: &str) -> Result<(), StorageError>;
}

/// Process-local store; everything is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn object_id(object: &Value) -> Result<String, StorageError> {
    object
        .get("id")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or(StorageError::MissingId)
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Value>, StorageError> {
        let objects = self.objects.read().map_err(|_| StorageError::Poisoned)?;
        Ok(objects.get(id).cloned())
    }

    async fn save(&self, object: Value) -> Result<(), StorageError> {
        let id = object_id(&object)?;
        self.objects
            .write()
            .map_err(|_| StorageError::Poisoned)?
            .insert(id, object);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Value>, StorageError> {
        let objects = self.objects.read().map_err(|_| StorageError::Poisoned)?;
        Ok(objects.values().cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.objects
            .write()
            .map_err(|_| StorageError::Poisoned)?
            .remove(id);
        Ok(())
    }
}

#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn Store>,
    pub channels: Arc<dyn Store>,
    pub teams: Arc<dyn Store>,
}

impl Storage {
    pub const fn new(users: Arc<dyn Store>, channels: Arc<dyn Store>, teams: Arc<dyn Store>) -> Self {
        Self {
            users,
            channels,
            teams,
        }
    }

    /// In-memory storage for all three collections.
    #[must_use]
    pub fn memory() -> Self {
        warn!("No storage configured; using in-memory storage, data will not persist");
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
        )
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn save_get_all_delete() {
        let store = MemoryStore::new();
        store
            .save(json!({"id": "U1", "name": "Ada"}))
            .await
            .unwrap();
        store
            .save(json!({"id": "U2", "name": "Grace"}))
            .await
            .unwrap();

        let ada = store.get("U1").await.unwrap().unwrap();
        assert_eq!(ada["name"], "Ada");
        assert_eq!(store.all().await.unwrap().len(), 2);

        store.delete("U1").await.unwrap();
        assert!(store.get("U1").await.unwrap().is_none());
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn save_requires_string_id() {
        let store = MemoryStore::new();
        let err = store.save(json!({"name": "nobody"})).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingId));
        let err = store.save(json!({"id": 7})).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingId));
    }

    #[tokio::test]
    async fn later_save_wins() {
        let storage = Storage::memory();
        storage.teams.save(json!({"id": "T1", "v": 1})).await.unwrap();
        storage.teams.save(json!({"id": "T1", "v": 2})).await.unwrap();
        assert_eq!(storage.teams.get("T1").await.unwrap().unwrap()["v"], 2);
        assert!(storage.users.get("T1").await.unwrap().is_none());
    }
}
