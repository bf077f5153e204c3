use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keyring::Entry;
use strongbox_core::storage::{KeySecureStore, KeyStoreError};
use tracing::{instrument, warn};

/// Account holding the JSON list of accounts this backend created. OS
/// credential stores cannot be searched by service, so `delete_all` walks it.
const MANIFEST_ACCOUNT: &str = ".strongbox-accounts";

/// OS keyring-backed key store. Uses the `keyring` crate; every entry lives
/// under `service` with the vault entry name as account.
#[derive(Debug, Clone)]
pub struct KeyringKeyStore {
    service: String,
    // Serializes manifest read-modify-write within this process.
    manifest_lock: Arc<Mutex<()>>,
}

impl KeyringKeyStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            manifest_lock: Arc::default(),
        }
    }

    /// Run blocking keyring calls off the async executor.
    async fn blocking<T, F>(&self, f: F) -> Result<T, KeyStoreError>
    where
        F: FnOnce(Keychain) -> Result<T, KeyStoreError> + Send + 'static,
        T: Send + 'static,
    {
        let keychain = Keychain {
            service: self.service.clone(),
            manifest_lock: Arc::clone(&self.manifest_lock),
        };
        tokio::task::spawn_blocking(move || f(keychain))
            .await
            .map_err(|e| KeyStoreError::Backend {
                status: STATUS_TASK,
                reason: format!("keyring task failed: {e}"),
            })?
    }
}

#[async_trait]
impl KeySecureStore for KeyringKeyStore {
    fn service(&self) -> &str {
        &self.service
    }

    #[instrument(skip_all, fields(account = %account))]
    async fn insert(
        &self,
        account: &str,
        value: &[u8],
        access_group: Option<&str>,
    ) -> Result<(), KeyStoreError> {
        if let Some(group) = access_group {
            warn!(group, "access groups are not supported by the OS keyring backend; ignoring");
        }
        let account = account.to_string();
        let value = value.to_vec();
        self.blocking(move |keychain| keychain.insert(&account, &value))
            .await
    }

    #[instrument(skip_all, fields(account = %account))]
    async fn load(&self, account: &str) -> Result<Vec<u8>, KeyStoreError> {
        let account = account.to_string();
        self.blocking(move |keychain| {
            keychain
                .entry(&account)?
                .get_secret()
                .map_err(|e| map_keyring_error(&account, e))
        })
        .await
    }

    #[instrument(skip_all, fields(account = %account))]
    async fn delete(&self, account: &str) -> Result<(), KeyStoreError> {
        let account = account.to_string();
        self.blocking(move |keychain| keychain.delete(&account)).await
    }

    #[instrument(skip_all, fields(service = %self.service))]
    async fn delete_all(&self) -> Result<(), KeyStoreError> {
        self.blocking(|keychain| keychain.delete_all()).await
    }
}

/// Owned handle moved into blocking tasks.
struct Keychain {
    service: String,
    manifest_lock: Arc<Mutex<()>>,
}

impl Keychain {
    fn entry(&self, account: &str) -> Result<Entry, KeyStoreError> {
        Entry::new(&self.service, account).map_err(|e| map_keyring_error(account, e))
    }

    fn insert(&self, account: &str, value: &[u8]) -> Result<(), KeyStoreError> {
        let entry = self.entry(account)?;
        match entry.get_secret() {
            Ok(_) => {
                return Err(KeyStoreError::Duplicate {
                    account: account.to_string(),
                })
            }
            Err(keyring::Error::NoEntry) => {}
            Err(e) => return Err(map_keyring_error(account, e)),
        }
        entry
            .set_secret(value)
            .map_err(|e| map_keyring_error(account, e))?;

        self.update_manifest(|accounts| {
            if !accounts.iter().any(|a| a == account) {
                accounts.push(account.to_string());
            }
        })
    }

    fn delete(&self, account: &str) -> Result<(), KeyStoreError> {
        self.entry(account)?
            .delete_credential()
            .map_err(|e| map_keyring_error(account, e))?;
        self.update_manifest(|accounts| accounts.retain(|a| a != account))
    }

    fn delete_all(&self) -> Result<(), KeyStoreError> {
        let _guard = self.lock_manifest()?;
        for account in self.read_manifest()? {
            match self.entry(&account)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => return Err(map_keyring_error(&account, e)),
            }
        }
        match self.entry(MANIFEST_ACCOUNT)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(MANIFEST_ACCOUNT, e)),
        }
    }

    fn update_manifest(&self, f: impl FnOnce(&mut Vec<String>)) -> Result<(), KeyStoreError> {
        let _guard = self.lock_manifest()?;
        let mut accounts = self.read_manifest()?;
        f(&mut accounts);
        let body = serde_json::to_string(&accounts).map_err(|e| KeyStoreError::Backend {
            status: STATUS_ENCODING,
            reason: format!("manifest encode failed: {e}"),
        })?;
        self.entry(MANIFEST_ACCOUNT)?
            .set_password(&body)
            .map_err(|e| map_keyring_error(MANIFEST_ACCOUNT, e))
    }

    fn read_manifest(&self) -> Result<Vec<String>, KeyStoreError> {
        match self.entry(MANIFEST_ACCOUNT)?.get_password() {
            Ok(body) => serde_json::from_str(&body).map_err(|e| KeyStoreError::Backend {
                status: STATUS_ENCODING,
                reason: format!("manifest decode failed: {e}"),
            }),
            Err(keyring::Error::NoEntry) => Ok(Vec::new()),
            Err(e) => Err(map_keyring_error(MANIFEST_ACCOUNT, e)),
        }
    }

    fn lock_manifest(&self) -> Result<std::sync::MutexGuard<'_, ()>, KeyStoreError> {
        self.manifest_lock.lock().map_err(|err| KeyStoreError::Backend {
            status: STATUS_TASK,
            reason: format!("lock poisoned: {err}"),
        })
    }
}

const STATUS_PLATFORM: i32 = -1;
const STATUS_NO_ACCESS: i32 = -2;
const STATUS_ENCODING: i32 = -3;
const STATUS_INVALID: i32 = -4;
const STATUS_TASK: i32 = -5;

fn map_keyring_error(account: &str, err: keyring::Error) -> KeyStoreError {
    let status = match &err {
        keyring::Error::NoEntry => {
            return KeyStoreError::NotFound {
                account: account.to_string(),
            }
        }
        keyring::Error::PlatformFailure(_) => STATUS_PLATFORM,
        keyring::Error::NoStorageAccess(_) => STATUS_NO_ACCESS,
        keyring::Error::BadEncoding(_) => STATUS_ENCODING,
        _ => STATUS_INVALID,
    };
    KeyStoreError::Backend {
        status,
        reason: err.to_string(),
    }
}
