use strongbox_core::{
    naming::{iv_entry_name, key_entry_name},
    storage::{KeySecureStore, PlainRecordStore, RecordStoreError},
    StoredValue,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    cipher::{self, CipherError},
    key_vault::{KeyVault, VaultError},
};

/// Errors surfaced to callers of [`SecureStorage`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Caller left out a required argument. Raised before any I/O.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("value could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Records(#[from] RecordStoreError),
    #[error("encryption failed: {0}")]
    Cipher(#[from] CipherError),
}

/// Why a read produced no value. [`SecureStorage::get`] folds all but
/// `Records` into an absent value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadFailure {
    #[error("no record stored")]
    Missing,
    #[error("record has no paired key material")]
    KeyMaterialMissing,
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("decryption failed: {0}")]
    Decryption(#[from] CipherError),
    #[error(transparent)]
    Records(#[from] RecordStoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecureStorageOptions {
    /// Access group applied to newly created key material.
    pub access_group: Option<String>,
    /// Fail `set` when new key material could not be written to the vault,
    /// instead of storing a record nobody can decrypt later.
    pub require_key_persistence: bool,
}

/// Encrypted key-value storage: ciphertext in a [`PlainRecordStore`], per-key
/// material in a [`KeyVault`].
///
/// A storage key is either absent from both stores or present in both. The
/// stores are not updated transactionally, so an interrupted call can leave
/// unused key material behind; `remove` and `clear` reclaim it.
pub struct SecureStorage<K: KeySecureStore, R: PlainRecordStore> {
    vault: KeyVault<K>,
    records: R,
    options: SecureStorageOptions,
}

impl<K: KeySecureStore, R: PlainRecordStore> SecureStorage<K, R> {
    pub fn new(key_store: K, records: R) -> Self {
        Self::with_options(key_store, records, SecureStorageOptions::default())
    }

    pub fn with_options(key_store: K, records: R, options: SecureStorageOptions) -> Self {
        let vault = KeyVault::new(key_store).with_access_group(options.access_group.clone());
        Self {
            vault,
            records,
            options,
        }
    }

    pub fn vault(&self) -> &KeyVault<K> {
        &self.vault
    }

    pub fn records(&self) -> &R {
        &self.records
    }

    /// Check both backends respond. Creates nothing.
    #[instrument(skip_all)]
    pub async fn init(&self) -> Result<(), StorageError> {
        self.records.keys().await?;
        self.vault.load(&key_entry_name(".probe")).await?;
        info!(
            service = self.vault.service(),
            namespace = self.records.namespace(),
            "secure storage ready"
        );
        Ok(())
    }

    /// Encrypt `value` and store it under `key`, creating key material on first use.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn set(&self, key: &str, value: &StoredValue) -> Result<(), StorageError> {
        let plaintext = value.to_plaintext()?;

        let material = self
            .vault
            .obtain_material(key, self.options.require_key_persistence)
            .await?;
        let ciphertext = cipher::encrypt(&plaintext, material.key(), material.iv())?;

        // Quoted so readers that JSON-parse the raw record get a string back.
        self.records.set(key, &format!("\"{ciphertext}\"")).await?;
        debug!("record written");
        Ok(())
    }

    /// Decrypted value for `key`, or `None` when it is missing or unreadable.
    /// Only record-store I/O errors are returned as errors.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        match self.read(key).await {
            Ok(value) => Ok(Some(value)),
            Err(ReadFailure::Missing) => Ok(None),
            Err(ReadFailure::Records(err)) => Err(err.into()),
            Err(failure) => {
                warn!("record unreadable, reporting no value: {failure}");
                Ok(None)
            }
        }
    }

    /// Like [`SecureStorage::get`] but reports why no value was produced.
    pub async fn read(&self, key: &str) -> Result<StoredValue, ReadFailure> {
        let raw = self.records.get(key).await?.ok_or(ReadFailure::Missing)?;
        let ciphertext = unwrap_record(&raw);

        let material = self
            .vault
            .existing_material(key)
            .await?
            .ok_or(ReadFailure::KeyMaterialMissing)?;
        let plaintext = cipher::decrypt(ciphertext, material.key(), material.iv())?;
        Ok(StoredValue::from_plaintext(&plaintext))
    }

    /// Delete the record and both key material entries. All three deletions are
    /// attempted; the first failure is returned afterwards.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let record = self.records.remove(key).await.map_err(StorageError::from);
        let key_entry = self.vault.delete(&key_entry_name(key)).await;
        let iv_entry = self.vault.delete(&iv_entry_name(key)).await;

        record?;
        key_entry?;
        iv_entry?;
        Ok(())
    }

    /// Delete every record in the namespace and every vault entry in the service.
    #[instrument(skip_all, fields(namespace = %self.records.namespace()))]
    pub async fn clear(&self) -> Result<(), StorageError> {
        let records = self.records.clear_namespace().await.map_err(StorageError::from);
        let vault = self.vault.clear_all().await;

        records?;
        vault?;
        info!("secure storage cleared");
        Ok(())
    }

    /// Storage keys that currently hold a record, sorted. Key material without
    /// a record is not listed.
    pub async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.records.keys().await?)
    }
}

fn unwrap_record(raw: &str) -> &str {
    raw.trim().trim_matches('"')
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use strongbox_core::storage::{InMemoryKeyStore, InMemoryRecordStore};

    use super::*;

    /// Record store whose deletions always fail.
    struct StuckRecords(InMemoryRecordStore);

    fn stuck() -> RecordStoreError {
        RecordStoreError::Storage {
            reason: "disk full".to_string(),
        }
    }

    #[async_trait]
    impl PlainRecordStore for StuckRecords {
        fn namespace(&self) -> &str {
            self.0.namespace()
        }

        async fn get(&self, key: &str) -> Result<Option<String>, RecordStoreError> {
            self.0.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), RecordStoreError> {
            self.0.set(key, value).await
        }

        async fn remove(&self, _key: &str) -> Result<(), RecordStoreError> {
            Err(stuck())
        }

        async fn clear_namespace(&self) -> Result<(), RecordStoreError> {
            Err(stuck())
        }

        async fn keys(&self) -> Result<Vec<String>, RecordStoreError> {
            self.0.keys().await
        }
    }

    fn storage() -> SecureStorage<InMemoryKeyStore, InMemoryRecordStore> {
        SecureStorage::new(
            InMemoryKeyStore::new("svc"),
            InMemoryRecordStore::new("group.test"),
        )
    }

    #[tokio::test]
    async fn set_then_get_returns_string() {
        let storage = storage();
        storage.set("token", &"abc123".into()).await.expect("set");
        assert_eq!(
            storage.get("token").await.expect("get"),
            Some(StoredValue::String("abc123".into()))
        );
    }

    #[tokio::test]
    async fn record_is_quoted_base64() {
        let storage = storage();
        storage.set("token", &"abc123".into()).await.unwrap();

        let raw = storage.records().get("token").await.unwrap().expect("record");
        assert!(raw.starts_with('"') && raw.ends_with('"'));
        assert!(!raw.contains("abc123"));
        assert!(serde_json::from_str::<String>(&raw).is_ok());
    }

    #[tokio::test]
    async fn overwrite_reuses_key_material() {
        let storage = storage();
        storage.set("token", &"one".into()).await.unwrap();
        let before = storage.vault().existing_material("token").await.unwrap();
        storage.set("token", &"two".into()).await.unwrap();
        let after = storage.vault().existing_material("token").await.unwrap();

        assert!(before.is_some());
        assert_eq!(before, after);
        assert_eq!(storage.get("token").await.unwrap(), Some("two".into()));
    }

    #[tokio::test]
    async fn missing_key_material_reads_as_absent() {
        let storage = storage();
        storage.set("token", &"abc123".into()).await.unwrap();
        storage.vault().delete("token-iv").await.unwrap();

        assert_eq!(
            storage.read("token").await,
            Err(ReadFailure::KeyMaterialMissing)
        );
        assert_eq!(storage.get("token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unreadable_record_reads_as_absent() {
        let storage = storage();
        storage.set("token", &"abc123".into()).await.unwrap();
        storage.records().set("token", "\"%%%\"").await.unwrap();

        assert!(matches!(
            storage.read("token").await,
            Err(ReadFailure::Decryption(CipherError::InvalidBase64(_)))
        ));
        assert_eq!(storage.get("token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn blank_keys_are_ordinary_storage_keys() {
        let storage = storage();
        for key in [" ", ""] {
            storage.set(key, &"v".into()).await.expect("set");
            assert_eq!(storage.get(key).await.unwrap(), Some("v".into()));
        }
        assert_eq!(storage.keys().await.unwrap(), vec!["", " "]);

        storage.remove(" ").await.expect("remove");
        assert_eq!(storage.get(" ").await.unwrap(), None);
        assert_eq!(storage.vault().load(" -key").await.unwrap(), None);
        assert_eq!(storage.get("").await.unwrap(), Some("v".into()));
    }

    #[tokio::test]
    async fn strict_mode_refuses_unsaved_key_material() {
        let key_store = InMemoryKeyStore::new("svc");
        key_store.reject_writes(true);
        let storage = SecureStorage::with_options(
            key_store,
            InMemoryRecordStore::new("ns"),
            SecureStorageOptions {
                access_group: None,
                require_key_persistence: true,
            },
        );

        let err = storage.set("token", &"v".into()).await.expect_err("strict");
        assert!(matches!(err, StorageError::Vault(VaultError::WriteFailed { .. })));
        assert_eq!(storage.records().get("token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn best_effort_mode_writes_record_with_unsaved_material() {
        let key_store = InMemoryKeyStore::new("svc");
        key_store.reject_writes(true);
        let storage = SecureStorage::new(key_store, InMemoryRecordStore::new("ns"));

        storage.set("token", &"v".into()).await.expect("best effort");
        assert!(storage.records().get("token").await.unwrap().is_some());
        // The material was never stored, so the value cannot be recovered.
        assert_eq!(storage.get("token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_purges_record_and_material() {
        let storage = storage();
        storage.set("token", &"abc123".into()).await.unwrap();
        storage.remove("token").await.expect("remove");

        assert_eq!(storage.get("token").await.unwrap(), None);
        assert_eq!(storage.vault().load("token-key").await.unwrap(), None);
        assert_eq!(storage.vault().load("token-iv").await.unwrap(), None);
        storage.remove("token").await.expect("remove again");
    }

    #[tokio::test]
    async fn remove_still_deletes_material_when_record_delete_fails() {
        let storage = SecureStorage::new(
            InMemoryKeyStore::new("svc"),
            StuckRecords(InMemoryRecordStore::new("ns")),
        );
        storage.set("token", &"abc123".into()).await.unwrap();

        let err = storage.remove("token").await.expect_err("record delete fails");
        assert!(matches!(
            err,
            StorageError::Records(RecordStoreError::Storage { ref reason }) if reason == "disk full"
        ));
        assert!(storage.vault().store().is_empty());
    }

    #[tokio::test]
    async fn clear_still_wipes_vault_when_record_clear_fails() {
        let storage = SecureStorage::new(
            InMemoryKeyStore::new("svc"),
            StuckRecords(InMemoryRecordStore::new("ns")),
        );
        storage.set("a", &"1".into()).await.unwrap();
        storage.set("b", &"2".into()).await.unwrap();

        let err = storage.clear().await.expect_err("record clear fails");
        assert!(matches!(err, StorageError::Records(_)));
        assert!(storage.vault().store().is_empty());
    }

    #[tokio::test]
    async fn clear_leaves_other_namespaces_alone() {
        let key_store = InMemoryKeyStore::new("svc");
        let records = InMemoryRecordStore::new("ns");
        let storage = SecureStorage::new(key_store.clone(), records.clone());
        let neighbour = SecureStorage::new(key_store.scoped("other"), records.scoped("other"));

        storage.set("a", &"1".into()).await.unwrap();
        neighbour.set("a", &json!({"keep": true}).into()).await.unwrap();
        storage.clear().await.expect("clear");

        assert!(storage.keys().await.unwrap().is_empty());
        assert!(storage.vault().store().is_empty());
        assert_eq!(
            neighbour.get("a").await.unwrap(),
            Some(StoredValue::Json(json!({"keep": true})))
        );
    }

    #[tokio::test]
    async fn init_creates_nothing() {
        let storage = storage();
        storage.init().await.expect("init");
        assert!(storage.vault().store().is_empty());
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[test]
    fn unwrap_record_strips_quotes_and_whitespace() {
        assert_eq!(unwrap_record("\"YWJj\"\n"), "YWJj");
        assert_eq!(unwrap_record("YWJj"), "YWJj");
    }
}
