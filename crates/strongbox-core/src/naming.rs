//! Fixed protocol constants and the mapping from a storage key to its vault entries.

/// Length of the per-key symmetric key material, in bytes.
pub const KEY_LENGTH: usize = 16;

/// Length of the per-key IV material, in bytes.
pub const IV_LENGTH: usize = 8;

/// Iteration count used when deriving fresh key material.
pub const DERIVATION_ITERATIONS: u32 = 1001;

pub const KEY_ENTRY_SUFFIX: &str = "-key";
pub const IV_ENTRY_SUFFIX: &str = "-iv";

/// Vault entry holding the symmetric key for `storage_key`.
pub fn key_entry_name(storage_key: &str) -> String {
    format!("{storage_key}{KEY_ENTRY_SUFFIX}")
}

/// Vault entry holding the IV for `storage_key`.
pub fn iv_entry_name(storage_key: &str) -> String {
    format!("{storage_key}{IV_ENTRY_SUFFIX}")
}
