use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use strongbox_core::storage::{PlainRecordStore, RecordStoreError};
use tempfile::NamedTempFile;
use tracing::instrument;

type Records = BTreeMap<String, String>;

/// File-backed record store: one JSON object per namespace under `root`.
/// Values are written as given; callers encrypt before they get here.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    root: PathBuf,
    namespace: String,
    lock: Arc<Mutex<()>>,
}

impl FileRecordStore {
    pub fn new(root: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            namespace: namespace.into(),
            lock: Arc::default(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.root
            .join(format!("{}.json", sanitize_namespace(&self.namespace)))
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>, RecordStoreError> {
        self.lock.lock().map_err(|err| RecordStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }

    fn modify(&self, f: impl FnOnce(&mut Records)) -> Result<(), RecordStoreError> {
        let _guard = self.guard()?;
        let path = self.path();
        let mut records = read_records(&path)?;
        f(&mut records);
        write_records(&path, &records)
    }
}

#[async_trait]
impl PlainRecordStore for FileRecordStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn get(&self, key: &str) -> Result<Option<String>, RecordStoreError> {
        let _guard = self.guard()?;
        Ok(read_records(&self.path())?.remove(key))
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn set(&self, key: &str, value: &str) -> Result<(), RecordStoreError> {
        self.modify(|records| {
            records.insert(key.to_string(), value.to_string());
        })
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn remove(&self, key: &str) -> Result<(), RecordStoreError> {
        self.modify(|records| {
            records.remove(key);
        })
    }

    #[instrument(skip_all, fields(namespace = %self.namespace))]
    async fn clear_namespace(&self) -> Result<(), RecordStoreError> {
        let _guard = self.guard()?;
        match fs::remove_file(self.path()) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_err(err)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, RecordStoreError> {
        let _guard = self.guard()?;
        Ok(read_records(&self.path())?.into_keys().collect())
    }
}

fn read_records(path: &Path) -> Result<Records, RecordStoreError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Records::new()),
        Err(err) => return Err(storage_err(err)),
    };

    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(storage_err)?;
    if buf.is_empty() {
        return Ok(Records::new());
    }
    serde_json::from_slice(&buf).map_err(storage_err)
}

fn write_records(path: &Path, records: &Records) -> Result<(), RecordStoreError> {
    let parent = path.parent().ok_or_else(|| RecordStoreError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    let json = serde_json::to_vec(records).map_err(storage_err)?;
    tmp.write_all(&json).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn sanitize_namespace(namespace: &str) -> String {
    URL_SAFE_NO_PAD.encode(namespace)
}

fn storage_err<E: ToString>(err: E) -> RecordStoreError {
    RecordStoreError::Storage {
        reason: err.to_string(),
    }
}
