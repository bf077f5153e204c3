use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by plain record stores.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordStoreError {
    /// Underlying storage failure.
    #[error("record storage failure: {reason}")]
    Storage { reason: String },
}

/// Unauthenticated, namespace-scoped string store. Values written here must
/// already be encrypted; this layer adds no confidentiality.
#[async_trait]
pub trait PlainRecordStore: Send + Sync {
    fn namespace(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>, RecordStoreError>;

    /// Persist a value under a key, overwriting any existing record.
    async fn set(&self, key: &str, value: &str) -> Result<(), RecordStoreError>;

    /// Remove a record (idempotent).
    async fn remove(&self, key: &str) -> Result<(), RecordStoreError>;

    /// Remove every record in the namespace.
    async fn clear_namespace(&self) -> Result<(), RecordStoreError>;

    /// Keys of all records in the namespace, sorted.
    async fn keys(&self) -> Result<Vec<String>, RecordStoreError>;
}

/// In-memory record store. Clones share the same backing map; namespaces
/// opened with [`InMemoryRecordStore::scoped`] are isolated from each other.
#[derive(Debug, Clone)]
pub struct InMemoryRecordStore {
    namespace: String,
    inner: Arc<Mutex<HashMap<String, BTreeMap<String, String>>>>,
}

impl InMemoryRecordStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            inner: Arc::default(),
        }
    }

    pub fn scoped(&self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            inner: Arc::clone(&self.inner),
        }
    }

    fn with_records<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> T,
    ) -> Result<T, RecordStoreError> {
        let mut map = self.inner.lock().map_err(|err| RecordStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(f(map.entry(self.namespace.clone()).or_default()))
    }
}

#[async_trait]
impl PlainRecordStore for InMemoryRecordStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(&self, key: &str) -> Result<Option<String>, RecordStoreError> {
        self.with_records(|records| records.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RecordStoreError> {
        self.with_records(|records| {
            records.insert(key.to_string(), value.to_string());
        })
    }

    async fn remove(&self, key: &str) -> Result<(), RecordStoreError> {
        self.with_records(|records| {
            records.remove(key);
        })
    }

    async fn clear_namespace(&self) -> Result<(), RecordStoreError> {
        self.with_records(BTreeMap::clear)
    }

    async fn keys(&self) -> Result<Vec<String>, RecordStoreError> {
        self.with_records(|records| records.keys().cloned().collect())
    }
}
