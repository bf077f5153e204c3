//! Concrete storage implementations with encryption at rest.
//! Values are encrypted with AES-256-CBC under per-key material held in the OS
//! keyring (or test doubles); ciphertext lives in a plain record store.

pub mod cipher;
pub mod file_record_store;
pub mod kdf;
pub mod key_vault;
pub mod keyring_store;
pub mod request;
pub mod secure_storage;

pub use key_vault::{KeyMaterial, KeyVault, VaultError};
pub use request::{StorageRequest, StorageResponse};
pub use secure_storage::{ReadFailure, SecureStorage, SecureStorageOptions, StorageError};
