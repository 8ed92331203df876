//! In-memory object store
//!
//! Behaves like the S3 adapter for the operations the workflow uses. Used
//! by tests across the workspace.

use crate::error::{CloudError, Result};
use crate::provider::ObjectStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    buckets: BTreeSet<String>,
    objects: BTreeMap<(String, String), Vec<u8>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::new();
        store.create_bucket(bucket);
        store
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.lock().buckets.insert(bucket.to_string());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not wedge the others.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Inner {
    fn require_bucket(&self, bucket: &str) -> Result<()> {
        if self.buckets.contains(bucket) {
            Ok(())
        } else {
            Err(CloudError::StorageError(format!(
                "NoSuchBucket: {bucket}"
            )))
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.lock().buckets.contains(bucket))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let inner = self.lock();
        inner.require_bucket(bucket)?;
        Ok(inner
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        let mut inner = self.lock();
        inner.require_bucket(bucket)?;
        inner
            .objects
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn put_object_if_absent(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<bool> {
        let mut inner = self.lock();
        inner.require_bucket(bucket)?;
        let id = (bucket.to_string(), key.to_string());
        if inner.objects.contains_key(&id) {
            return Ok(false);
        }
        inner.objects.insert(id, body);
        Ok(true)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.require_bucket(bucket)?;
        inner
            .objects
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_conditional_put() {
        let store = MemoryObjectStore::with_bucket("b");
        assert!(store.put_object_if_absent("b", "k", b"1".to_vec()).await.unwrap());
        assert!(!store.put_object_if_absent("b", "k", b"2".to_vec()).await.unwrap());
        assert_eq!(store.object("b", "k").unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_missing_bucket() {
        let store = MemoryObjectStore::new();
        assert!(!store.bucket_exists("b").await.unwrap());
        assert!(store.put_object("b", "k", Vec::new()).await.is_err());
    }
}
