use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by secure key-store backends.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyStoreError {
    /// An entry with the same service and account already exists.
    #[error("duplicate entry for account: {account}")]
    Duplicate { account: String },
    /// Requested entry does not exist.
    #[error("no entry for account: {account}")]
    NotFound { account: String },
    /// Underlying store rejected the operation.
    #[error("key store failure (status {status}): {reason}")]
    Backend { status: i32, reason: String },
}

impl KeyStoreError {
    /// Numeric status for logs. Mirrors the OS keychain convention of
    /// negative codes; `0` is never returned.
    pub fn status(&self) -> i32 {
        match self {
            KeyStoreError::Duplicate { .. } => -25299,
            KeyStoreError::NotFound { .. } => -25300,
            KeyStoreError::Backend { status, .. } => *status,
        }
    }
}

/// When an entry may be read. Entries written with one attribute can only be
/// updated in place by a writer using the same attribute, which is why vault
/// upserts delete and re-insert instead of updating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Accessibility {
    #[default]
    AfterFirstUnlock,
    WhenUnlocked,
}

/// OS-protected store for small secret entries, scoped to one service name.
#[async_trait]
pub trait KeySecureStore: Send + Sync {
    /// Service namespace every entry of this store lives under.
    fn service(&self) -> &str;

    /// Add a new entry. Fails with [`KeyStoreError::Duplicate`] if the account exists.
    async fn insert(
        &self,
        account: &str,
        value: &[u8],
        access_group: Option<&str>,
    ) -> Result<(), KeyStoreError>;

    /// Read an entry, regardless of its accessibility attribute.
    async fn load(&self, account: &str) -> Result<Vec<u8>, KeyStoreError>;

    /// Remove exactly one entry without matching on accessibility.
    async fn delete(&self, account: &str) -> Result<(), KeyStoreError>;

    /// Remove every entry of the service.
    async fn delete_all(&self) -> Result<(), KeyStoreError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    accessibility: Accessibility,
    access_group: Option<String>,
}

type Keychain = HashMap<(String, String), Entry>;

/// In-memory key store for tests and ephemeral sessions.
///
/// Clones share the same backing map, and [`InMemoryKeyStore::scoped`] opens another
/// service on that map, much like two services on one device keychain.
#[derive(Debug, Clone)]
pub struct InMemoryKeyStore {
    service: String,
    accessibility: Accessibility,
    inner: Arc<Mutex<Keychain>>,
    reject_writes: Arc<AtomicBool>,
}

impl InMemoryKeyStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            accessibility: Accessibility::default(),
            inner: Arc::default(),
            reject_writes: Arc::default(),
        }
    }

    /// Same backing map, different service.
    pub fn scoped(&self, service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..self.clone()
        }
    }

    /// Same backing map, new entries written with `accessibility`.
    pub fn with_accessibility(&self, accessibility: Accessibility) -> Self {
        Self {
            accessibility,
            ..self.clone()
        }
    }

    /// Make every subsequent insert fail with a backend error.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Accessibility and access group of an entry, if present.
    pub fn attributes(&self, account: &str) -> Option<(Accessibility, Option<String>)> {
        let map = self.inner.lock().ok()?;
        map.get(&self.entry_key(account))
            .map(|entry| (entry.accessibility, entry.access_group.clone()))
    }

    /// Number of entries held for this service.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .map(|map| map.keys().filter(|(svc, _)| svc == &self.service).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry_key(&self, account: &str) -> (String, String) {
        (self.service.clone(), account.to_string())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Keychain>, KeyStoreError> {
        self.inner.lock().map_err(|err| KeyStoreError::Backend {
            status: -1,
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl KeySecureStore for InMemoryKeyStore {
    fn service(&self) -> &str {
        &self.service
    }

    async fn insert(
        &self,
        account: &str,
        value: &[u8],
        access_group: Option<&str>,
    ) -> Result<(), KeyStoreError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(KeyStoreError::Backend {
                status: -25308,
                reason: "interaction not allowed".to_string(),
            });
        }

        let mut map = self.lock()?;
        let key = self.entry_key(account);
        if map.contains_key(&key) {
            return Err(KeyStoreError::Duplicate {
                account: account.to_string(),
            });
        }
        map.insert(
            key,
            Entry {
                value: value.to_vec(),
                accessibility: self.accessibility,
                access_group: access_group.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn load(&self, account: &str) -> Result<Vec<u8>, KeyStoreError> {
        let map = self.lock()?;
        map.get(&self.entry_key(account))
            .map(|entry| entry.value.clone())
            .ok_or_else(|| KeyStoreError::NotFound {
                account: account.to_string(),
            })
    }

    async fn delete(&self, account: &str) -> Result<(), KeyStoreError> {
        let mut map = self.lock()?;
        map.remove(&self.entry_key(account))
            .map(|_| ())
            .ok_or_else(|| KeyStoreError::NotFound {
                account: account.to_string(),
            })
    }

    async fn delete_all(&self) -> Result<(), KeyStoreError> {
        let mut map = self.lock()?;
        map.retain(|(service, _), _| service != &self.service);
        Ok(())
    }
}
