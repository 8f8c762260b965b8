//! In-memory `LocalStorage` for ephemeral sessions and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::traits::LocalStorage;
use crate::error::DatabaseError;

#[derive(Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail, mimicking a full quota.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl LocalStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query(format!("quota exceeded writing {key}")));
        }
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), DatabaseError> {
        self.items.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let storage = MemoryStorage::new();
        assert!(storage.get_item("k").await.unwrap().is_none());

        storage.set_item("k", "1").await.unwrap();
        storage.set_item("k", "2").await.unwrap();
        assert_eq!(storage.get_item("k").await.unwrap().as_deref(), Some("2"));
        assert_eq!(storage.len().await, 1);

        storage.remove_item("k").await.unwrap();
        storage.remove_item("k").await.unwrap();
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn failing_writes_surface_errors() {
        let storage = MemoryStorage::new();
        storage.set_fail_writes(true);
        assert!(storage.set_item("k", "v").await.is_err());
        assert!(storage.get_item("k").await.unwrap().is_none());
    }
}
