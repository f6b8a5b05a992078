//! Legacy passphrase decryption
//!
//! Key files written by the original validator tooling are sealed with
//! AES-256-GCM under a key derived from the passphrase:
//!
//! ```text
//! key  = lowercase_hex(MD5(passphrase))      // 32 ASCII bytes
//! blob = nonce (12 bytes) || ciphertext || tag (16 bytes)
//! file = hex(blob)                           // canonical
//!      | blob                                // older raw-binary files
//! ```
//!
//! # Security Notes
//!
//! - MD5 key derivation is reproduced only to read existing files. Nothing in
//!   this crate encrypts with it; new keys go through the KMS envelope path.
//! - The hex form is canonical. When both forms fail, the hex error is
//!   reported because it describes what the caller most likely supplied.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use md5::{Digest, Md5};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::memory::SecretBytes;

/// Nonce length for AES-GCM
pub const NONCE_LEN: usize = 12;

/// Authentication tag length for AES-GCM
pub const TAG_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum LegacyError {
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("Encrypted blob too short: {len} bytes, need at least {}", NONCE_LEN + TAG_LEN)]
    Truncated { len: usize },
    #[error("Authentication failed: wrong passphrase or corrupted key file")]
    Authentication,
}

/// Decrypt a legacy key blob with a passphrase.
///
/// Trailing `\n` characters are stripped from the passphrase first, so input
/// read from a terminal or a file behaves like the bare passphrase.
///
/// Tries the canonical hex form, then the raw-binary form. If both fail the
/// hex-path error is returned.
pub fn decrypt(blob: &[u8], passphrase: &[u8]) -> Result<SecretBytes, LegacyError> {
    let cipher = legacy_cipher(strip_trailing_newlines(passphrase));

    let canonical_err = match decode_hex_blob(blob) {
        Ok(raw) => match open(&cipher, &raw) {
            Ok(plaintext) => return Ok(plaintext),
            Err(e) => e,
        },
        Err(e) => e,
    };

    match open(&cipher, blob) {
        Ok(plaintext) => {
            log::debug!("legacy key blob decrypted via raw-binary fallback");
            Ok(plaintext)
        }
        Err(_) => Err(canonical_err),
    }
}

/// Remove every trailing `\n` from a passphrase.
pub fn strip_trailing_newlines(passphrase: &[u8]) -> &[u8] {
    let end = passphrase
        .iter()
        .rposition(|&b| b != b'\n')
        .map_or(0, |i| i + 1);
    &passphrase[..end]
}

/// Build the AES-256-GCM cipher for a passphrase.
///
/// The key is the ASCII hex rendering of the MD5 digest, not the raw digest.
pub(crate) fn legacy_cipher(passphrase: &[u8]) -> Aes256Gcm {
    let key = Zeroizing::new(hex::encode(Md5::digest(passphrase)));
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

fn decode_hex_blob(blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, LegacyError> {
    let trimmed = trim_ascii_end(blob);
    Ok(Zeroizing::new(hex::decode(trimmed)?))
}

/// Drop trailing ASCII whitespace, e.g. a newline appended by an editor.
pub(crate) fn trim_ascii_end(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

fn open(cipher: &Aes256Gcm, raw: &[u8]) -> Result<SecretBytes, LegacyError> {
    if raw.len() < NONCE_LEN + TAG_LEN {
        return Err(LegacyError::Truncated { len: raw.len() });
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map(SecretBytes::new)
        .map_err(|_| LegacyError::Authentication)
}
