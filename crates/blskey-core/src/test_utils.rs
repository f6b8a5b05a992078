//! Shared test utilities for blskey tests.
//!
//! Provides an in-memory key management service that behaves like KMS for
//! the three envelope operations, and a sealer that produces legacy
//! passphrase-encrypted blobs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;

use crate::envelope::{KmsClient, KmsError};
use crate::legacy::{legacy_cipher, NONCE_LEN};
use crate::memory::SecretBytes;

/// Seal `plaintext` the way the legacy tooling did. Returns the raw
/// (non-hex) blob: nonce followed by ciphertext and tag.
pub fn legacy_seal(plaintext: &[u8], passphrase: &str) -> Vec<u8> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = legacy_cipher(passphrase.as_bytes())
        .encrypt(&nonce, plaintext)
        .expect("AES-GCM encryption cannot fail for in-memory input");
    let mut blob = nonce.to_vec();
    blob.extend_from_slice(&ciphertext);
    blob
}

/// A fake KMS holding named AES-256-GCM keys in memory.
///
/// Blob layout: `[id_len: u8][key id][nonce: 12][ciphertext + tag]`.
/// Each operation is counted so tests can assert which calls a workflow made.
#[derive(Default)]
pub struct InMemoryKms {
    keys: HashMap<String, [u8; 32]>,
    offline: bool,
    encrypt_calls: AtomicUsize,
    decrypt_calls: AtomicUsize,
    re_encrypt_calls: AtomicUsize,
}

impl InMemoryKms {
    /// A service with one random key per id.
    pub fn with_keys(key_ids: &[&str]) -> Self {
        let mut kms = Self::default();
        for id in key_ids {
            kms.add_key(id);
        }
        kms
    }

    /// A service whose every call fails, as if the endpoint were unreachable.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn add_key(&mut self, key_id: &str) {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        self.keys.insert(key_id.to_owned(), key);
    }

    /// Remove a key, as if it had been scheduled for deletion.
    pub fn revoke_key(&mut self, key_id: &str) {
        self.keys.remove(key_id);
    }

    /// The key id a blob was wrapped under, if the blob is well formed.
    pub fn key_id_of(&self, blob: &[u8]) -> Option<String> {
        split_blob(blob).map(|(id, _, _)| id.to_owned())
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypt_calls.load(Ordering::SeqCst)
    }

    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }

    pub fn re_encrypt_calls(&self) -> usize {
        self.re_encrypt_calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), KmsError> {
        if self.offline {
            return Err(KmsError::Service("dispatch failure: connection refused".into()));
        }
        Ok(())
    }

    fn cipher(&self, key_id: &str) -> Result<Aes256Gcm, KmsError> {
        self.keys
            .get(key_id)
            .map(|key| Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)))
            .ok_or_else(|| KmsError::Service(format!("NotFoundException: key {} does not exist", key_id)))
    }

    fn seal(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        let cipher = self.cipher(key_id)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| KmsError::Service(e.to_string()))?;

        let id = key_id.as_bytes();
        let id_len = u8::try_from(id.len())
            .map_err(|_| KmsError::Service("ValidationException: key id too long".into()))?;
        let mut blob = Vec::with_capacity(1 + id.len() + NONCE_LEN + ciphertext.len());
        blob.push(id_len);
        blob.extend_from_slice(id);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn unseal(&self, blob: &[u8]) -> Result<SecretBytes, KmsError> {
        let (key_id, nonce, ciphertext) = split_blob(blob)
            .ok_or_else(|| KmsError::Service("InvalidCiphertextException".into()))?;
        self.cipher(key_id)?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map(SecretBytes::new)
            .map_err(|_| KmsError::Service("InvalidCiphertextException".into()))
    }
}

impl KmsClient for InMemoryKms {
    fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        self.seal(key_id, plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<SecretBytes, KmsError> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        self.unseal(ciphertext)
    }

    fn re_encrypt(&self, ciphertext: &[u8], destination_key_id: &str) -> Result<Vec<u8>, KmsError> {
        self.re_encrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        // Server-side: the plaintext never crosses the trait boundary.
        let plaintext = self.unseal(ciphertext)?;
        self.seal(destination_key_id, plaintext.as_slice())
    }
}

fn split_blob(blob: &[u8]) -> Option<(&str, &[u8], &[u8])> {
    let (&id_len, rest) = blob.split_first()?;
    let id_len = id_len as usize;
    if rest.len() < id_len + NONCE_LEN {
        return None;
    }
    let (id, rest) = rest.split_at(id_len);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
    Some((std::str::from_utf8(id).ok()?, nonce, ciphertext))
}
