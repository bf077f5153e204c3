//! PBKDF2-HMAC-SHA1 derivation used as the entropy source for new key material.
//!
//! The salt is random and discarded, so derivation cannot be repeated: callers
//! persist the derived bytes themselves.

use chrono::Local;
use rand::{rngs::OsRng, RngCore};
use sha1::Sha1;
use strongbox_core::naming::{DERIVATION_ITERATIONS, IV_ENTRY_SUFFIX};

pub const KEY_PASSWORD_PREFIX: &str = "password_secure_key_fix_value";
pub const IV_PASSWORD_PREFIX: &str = "password_secure_iv_fix_value";

const SALT_LENGTH: usize = 8;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Derive `byte_length` bytes from `password` and `salt`.
pub fn derive(password: &str, salt: &[u8], byte_length: usize, iterations: u32) -> Vec<u8> {
    let mut out = vec![0u8; byte_length];
    pbkdf2::pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, iterations, &mut out);
    out
}

/// Which half of a key material pair is being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Key,
    Iv,
}

impl MaterialKind {
    /// Kind implied by a vault entry name: `-iv` entries are IVs, all others keys.
    pub fn for_entry(name: &str) -> Self {
        if name.ends_with(IV_ENTRY_SUFFIX) {
            MaterialKind::Iv
        } else {
            MaterialKind::Key
        }
    }

    pub fn password_prefix(self) -> &'static str {
        match self {
            MaterialKind::Key => KEY_PASSWORD_PREFIX,
            MaterialKind::Iv => IV_PASSWORD_PREFIX,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyDerivationService {
    iterations: u32,
}

impl Default for KeyDerivationService {
    fn default() -> Self {
        Self {
            iterations: DERIVATION_ITERATIONS,
        }
    }
}

impl KeyDerivationService {
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Fresh, unrepeatable bytes for one half of a key material pair.
    pub fn generate(&self, kind: MaterialKind, byte_length: usize) -> Vec<u8> {
        let password = password(kind);
        let mut salt = [0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);
        derive(&password, &salt, byte_length, self.iterations)
    }
}

fn password(kind: MaterialKind) -> String {
    format!(
        "{}{}",
        kind.password_prefix(),
        Local::now().format(TIMESTAMP_FORMAT)
    )
}
