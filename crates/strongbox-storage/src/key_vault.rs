use std::fmt;

use strongbox_core::{
    naming::{iv_entry_name, key_entry_name, IV_LENGTH, KEY_LENGTH},
    storage::{KeySecureStore, KeyStoreError},
};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::kdf::{KeyDerivationService, MaterialKind};

/// The (symmetric key, IV) pair bound to one storage key.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    key: [u8; KEY_LENGTH],
    iv: [u8; IV_LENGTH],
}

impl KeyMaterial {
    /// Build from raw vault entries; `None` when either has the wrong length.
    pub fn from_slices(key: &[u8], iv: &[u8]) -> Option<Self> {
        Some(Self {
            key: key.try_into().ok()?,
            iv: iv.try_into().ok()?,
        })
    }

    pub fn key(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_LENGTH] {
        &self.iv
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial([REDACTED])")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    /// Insert was rejected even after the duplicate-entry retry.
    #[error("vault write failed for {name} (status {status})")]
    WriteFailed { name: String, status: i32 },
    #[error("vault read failed for {name} (status {status})")]
    ReadFailed { name: String, status: i32 },
    #[error("vault delete failed for {name} (status {status})")]
    DeleteFailed { name: String, status: i32 },
    #[error("vault clear failed for service {service} (status {status})")]
    ClearFailed { service: String, status: i32 },
    #[error("stored material for {name} has {got} bytes, expected {expected}")]
    InvalidLength {
        name: String,
        expected: usize,
        got: usize,
    },
}

/// Named secret entries over a [`KeySecureStore`], with lazy creation of new
/// material.
///
/// Nothing here is transactional: concurrent creators of the same entry may
/// both generate material, and the last successful upsert wins.
pub struct KeyVault<S: KeySecureStore> {
    store: S,
    kdf: KeyDerivationService,
    access_group: Option<String>,
}

impl<S: KeySecureStore> KeyVault<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            kdf: KeyDerivationService::default(),
            access_group: None,
        }
    }

    /// Share entries created through [`KeyVault::get_or_create`] with an access group.
    pub fn with_access_group(mut self, access_group: Option<String>) -> Self {
        self.access_group = access_group;
        self
    }

    pub fn with_derivation(mut self, kdf: KeyDerivationService) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn service(&self) -> &str {
        self.store.service()
    }

    /// Read an entry. Missing and empty entries are both `None`.
    #[instrument(skip(self))]
    pub async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, VaultError> {
        match self.store.load(name).await {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(KeyStoreError::NotFound { .. }) => {
                debug!("nothing stored");
                Ok(None)
            }
            Err(err) => {
                warn!(status = err.status(), "vault read failed: {err}");
                Err(VaultError::ReadFailed {
                    name: name.to_string(),
                    status: err.status(),
                })
            }
        }
    }

    /// Insert or replace an entry.
    ///
    /// The replace path is two steps: a duplicate insert deletes the existing
    /// entry and inserts again. This also replaces entries written with other
    /// accessibility attributes. Readers may briefly see the entry missing.
    #[instrument(skip(self, value))]
    pub async fn save(
        &self,
        name: &str,
        value: &[u8],
        access_group: Option<&str>,
    ) -> Result<(), VaultError> {
        let mut result = self.store.insert(name, value, access_group).await;

        if let Err(KeyStoreError::Duplicate { .. }) = result {
            debug!("entry exists, replacing");
            result = match self.store.delete(name).await {
                Ok(()) | Err(KeyStoreError::NotFound { .. }) => {
                    self.store.insert(name, value, access_group).await
                }
                Err(err) => Err(err),
            };
        }

        result.map_err(|err| {
            error!(status = err.status(), "vault add/delete failed: {err}");
            VaultError::WriteFailed {
                name: name.to_string(),
                status: err.status(),
            }
        })
    }

    /// Return the stored entry, creating `byte_length` fresh bytes on a miss.
    /// Names ending in `-iv` are generated as IVs, all others as keys.
    ///
    /// A failed write is logged and the fresh bytes are still returned: the
    /// material is then not guaranteed to survive. Use
    /// [`KeyVault::get_or_create_persisted`] to turn that into an error.
    pub async fn get_or_create(&self, name: &str, byte_length: usize) -> Result<Vec<u8>, VaultError> {
        self.obtain(name, MaterialKind::for_entry(name), byte_length, false)
            .await
    }

    /// Like [`KeyVault::get_or_create`] but fails when new material could not be stored.
    pub async fn get_or_create_persisted(
        &self,
        name: &str,
        byte_length: usize,
    ) -> Result<Vec<u8>, VaultError> {
        self.obtain(name, MaterialKind::for_entry(name), byte_length, true)
            .await
    }

    #[instrument(skip(self))]
    async fn obtain(
        &self,
        name: &str,
        kind: MaterialKind,
        byte_length: usize,
        require_persisted: bool,
    ) -> Result<Vec<u8>, VaultError> {
        if let Some(existing) = self.load(name).await? {
            return Ok(existing);
        }

        let fresh = self.kdf.generate(kind, byte_length);
        match self.save(name, &fresh, self.access_group.as_deref()).await {
            Ok(()) => debug!("created new material"),
            Err(err) if require_persisted => return Err(err),
            Err(err) => warn!("continuing with unsaved material: {err}"),
        }
        Ok(fresh)
    }

    /// Remove one entry. Returns whether anything was removed.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<bool, VaultError> {
        match self.store.delete(name).await {
            Ok(()) => Ok(true),
            Err(KeyStoreError::NotFound { .. }) => Ok(false),
            Err(err) => {
                error!(status = err.status(), "vault delete failed: {err}");
                Err(VaultError::DeleteFailed {
                    name: name.to_string(),
                    status: err.status(),
                })
            }
        }
    }

    /// Remove every entry in the vault's service.
    #[instrument(skip(self), fields(service = %self.service()))]
    pub async fn clear_all(&self) -> Result<(), VaultError> {
        self.store.delete_all().await.map_err(|err| {
            error!(status = err.status(), "vault clear failed: {err}");
            VaultError::ClearFailed {
                service: self.service().to_string(),
                status: err.status(),
            }
        })
    }

    /// Key material for `storage_key`, created on first use.
    pub async fn obtain_material(
        &self,
        storage_key: &str,
        require_persisted: bool,
    ) -> Result<KeyMaterial, VaultError> {
        let key_name = key_entry_name(storage_key);
        let iv_name = iv_entry_name(storage_key);
        let key = self
            .obtain(&key_name, MaterialKind::Key, KEY_LENGTH, require_persisted)
            .await?;
        let iv = self
            .obtain(&iv_name, MaterialKind::Iv, IV_LENGTH, require_persisted)
            .await?;
        material(&key_name, &key, &iv_name, &iv)
    }

    /// Key material for `storage_key` if both entries exist. Never creates.
    pub async fn existing_material(&self, storage_key: &str) -> Result<Option<KeyMaterial>, VaultError> {
        let key_name = key_entry_name(storage_key);
        let iv_name = iv_entry_name(storage_key);
        let (Some(key), Some(iv)) = (self.load(&key_name).await?, self.load(&iv_name).await?) else {
            return Ok(None);
        };
        material(&key_name, &key, &iv_name, &iv).map(Some)
    }
}

fn material(key_name: &str, key: &[u8], iv_name: &str, iv: &[u8]) -> Result<KeyMaterial, VaultError> {
    KeyMaterial::from_slices(key, iv).ok_or_else(|| {
        if key.len() != KEY_LENGTH {
            VaultError::InvalidLength {
                name: key_name.to_string(),
                expected: KEY_LENGTH,
                got: key.len(),
            }
        } else {
            VaultError::InvalidLength {
                name: iv_name.to_string(),
                expected: IV_LENGTH,
                got: iv.len(),
            }
        }
    })
}
