use std::path::PathBuf;

use crate::config::Config;
use color_eyre::Result;
use dirs::data_dir;
use strongbox_core::storage::{InMemoryKeyStore, InMemoryRecordStore};
use strongbox_storage::{
    file_record_store::FileRecordStore, keyring_store::KeyringKeyStore, SecureStorage,
    SecureStorageOptions,
};
use tracing::debug;

/// Resolve the default data directory for Strongbox records.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("strongbox"))
}

fn options(config: &Config) -> SecureStorageOptions {
    SecureStorageOptions {
        access_group: config.access_group.clone(),
        require_key_persistence: config.require_key_persistence,
    }
}

/// Build storage backed by the OS keyring and the on-disk record store.
pub fn storage_from_config(
    config: &Config,
) -> Result<SecureStorage<KeyringKeyStore, FileRecordStore>> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    debug!(?root, service = %config.service, "initializing secure storage");
    Ok(SecureStorage::with_options(
        KeyringKeyStore::new(&config.service),
        FileRecordStore::new(root, &config.namespace),
        options(config),
    ))
}

/// Storage that lives for one process only.
pub fn ephemeral_storage(config: &Config) -> SecureStorage<InMemoryKeyStore, InMemoryRecordStore> {
    SecureStorage::with_options(
        InMemoryKeyStore::new(&config.service),
        InMemoryRecordStore::new(&config.namespace),
        options(config),
    )
}
