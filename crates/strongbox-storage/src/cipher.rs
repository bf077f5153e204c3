//! AES-256-CBC with PKCS#7 padding over per-key material.
//!
//! The stored key (16 bytes) and IV (8 bytes) are expanded to cipher inputs by
//! lowercase hex encoding, giving a 32-byte AES-256 key and a 16-byte CBC IV.
//! Existing records depend on this expansion; do not change it.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use strongbox_core::naming::{IV_LENGTH, KEY_LENGTH};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("cipher init failed: {0}")]
    Init(String),
    #[error("ciphertext is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("bad padding or mismatched key material")]
    Padding,
    #[error("plaintext is not valid utf-8")]
    Utf8,
}

/// Encrypt `plaintext` and return standard base64 ciphertext.
pub fn encrypt(
    plaintext: &str,
    key: &[u8; KEY_LENGTH],
    iv: &[u8; IV_LENGTH],
) -> Result<String, CipherError> {
    let (key, iv) = expand(key, iv);
    let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), iv.as_bytes())
        .map_err(|e| CipherError::Init(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    Ok(STANDARD.encode(ciphertext))
}

/// Decrypt base64 ciphertext produced by [`encrypt`].
///
/// A wrong key usually surfaces as [`CipherError::Padding`], but CBC cannot
/// detect every mismatch; callers must not treat `Ok` as proof of authenticity.
pub fn decrypt(
    ciphertext: &str,
    key: &[u8; KEY_LENGTH],
    iv: &[u8; IV_LENGTH],
) -> Result<String, CipherError> {
    let bytes = STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| CipherError::InvalidBase64(e.to_string()))?;

    let (key, iv) = expand(key, iv);
    let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), iv.as_bytes())
        .map_err(|e| CipherError::Init(e.to_string()))?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&bytes)
        .map_err(|_| CipherError::Padding)?;

    String::from_utf8(plaintext).map_err(|_| CipherError::Utf8)
}

fn expand(key: &[u8; KEY_LENGTH], iv: &[u8; IV_LENGTH]) -> (String, String) {
    (hex::encode(key), hex::encode(iv))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LENGTH] = *b"0123456789abcdef";
    const IV: [u8; IV_LENGTH] = *b"ivivivi!";

    #[test]
    fn round_trips_text() {
        let long = "x".repeat(100);
        for plaintext in ["", "abc123", "ünïcødé ✓", long.as_str()] {
            let ciphertext = encrypt(plaintext, &KEY, &IV).expect("encrypt");
            assert_ne!(ciphertext, plaintext);
            assert_eq!(decrypt(&ciphertext, &KEY, &IV).expect("decrypt"), plaintext);
        }
    }

    #[test]
    fn output_is_padded_to_block_size() {
        let ciphertext = encrypt("sixteen bytes!!!", &KEY, &IV).unwrap();
        let raw = STANDARD.decode(ciphertext).unwrap();
        assert_eq!(raw.len(), 32);
    }

    #[test]
    fn key_is_expanded_through_hex() {
        // Independent AES-256-CBC over the hex text must produce the same bytes.
        let expected = Aes256CbcEnc::new_from_slices(
            hex::encode(KEY).as_bytes(),
            hex::encode(IV).as_bytes(),
        )
        .unwrap()
        .encrypt_padded_vec_mut::<Pkcs7>(b"abc123");
        assert_eq!(encrypt("abc123", &KEY, &IV).unwrap(), STANDARD.encode(expected));
    }

    #[test]
    fn wrong_key_never_yields_plaintext() {
        let ciphertext = encrypt("abc123", &KEY, &IV).unwrap();
        let other_key = *b"fedcba9876543210";
        assert_ne!(
            decrypt(&ciphertext, &other_key, &IV).ok().as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            decrypt("not base64!", &KEY, &IV),
            Err(CipherError::InvalidBase64(_))
        ));
        // Valid base64 but not a whole number of blocks.
        assert_eq!(decrypt("YWJj", &KEY, &IV), Err(CipherError::Padding));
    }
}
