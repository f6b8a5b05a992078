//! Envelope encryption through a key management service
//!
//! The service holds the wrapping keys; this side only ever sees opaque
//! ciphertext blobs and, for `decrypt`, the plaintext private key.
//!
//! [`KmsClient`] is the raw three-operation contract a backend implements
//! (AWS KMS in production, an in-memory fake in tests). [`EnvelopeService`]
//! wraps a client with the input and output checks every caller needs.

use thiserror::Error;

use crate::memory::SecretBytes;

#[derive(Error, Debug)]
pub enum KmsError {
    #[error("Key id must not be empty")]
    EmptyKeyId,
    #[error("Refusing to encrypt an empty plaintext")]
    EmptyPlaintext,
    #[error("Ciphertext blob must not be empty")]
    EmptyCiphertext,
    #[error("Key management service returned no {0}")]
    MissingOutput(&'static str),
    #[error("Key management service error: {0}")]
    Service(String),
}

/// The raw operations of a key management service.
///
/// Implementations perform one synchronous round-trip per call and never
/// retry on their own.
pub trait KmsClient {
    /// Encrypt `plaintext` under `key_id`, returning an opaque blob.
    fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, KmsError>;

    /// Decrypt a blob produced by `encrypt` or `re_encrypt`.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<SecretBytes, KmsError>;

    /// Re-wrap a blob under `destination_key_id` entirely inside the service.
    fn re_encrypt(&self, ciphertext: &[u8], destination_key_id: &str) -> Result<Vec<u8>, KmsError>;
}

impl<C: KmsClient + ?Sized> KmsClient for &C {
    fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        (**self).encrypt(key_id, plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<SecretBytes, KmsError> {
        (**self).decrypt(ciphertext)
    }

    fn re_encrypt(&self, ciphertext: &[u8], destination_key_id: &str) -> Result<Vec<u8>, KmsError> {
        (**self).re_encrypt(ciphertext, destination_key_id)
    }
}

impl<C: KmsClient + ?Sized> KmsClient for Box<C> {
    fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        (**self).encrypt(key_id, plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<SecretBytes, KmsError> {
        (**self).decrypt(ciphertext)
    }

    fn re_encrypt(&self, ciphertext: &[u8], destination_key_id: &str) -> Result<Vec<u8>, KmsError> {
        (**self).re_encrypt(ciphertext, destination_key_id)
    }
}

/// Validating front for a [`KmsClient`], handed to every workflow.
pub struct EnvelopeService<C> {
    client: C,
}

impl<C: KmsClient> EnvelopeService<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        require_key_id(key_id)?;
        if plaintext.is_empty() {
            return Err(KmsError::EmptyPlaintext);
        }
        let blob = self.client.encrypt(key_id, plaintext)?;
        non_empty(blob, "ciphertext")
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<SecretBytes, KmsError> {
        require_ciphertext(ciphertext)?;
        let plaintext = self.client.decrypt(ciphertext)?;
        if plaintext.is_empty() {
            return Err(KmsError::MissingOutput("plaintext"));
        }
        Ok(plaintext)
    }

    pub fn re_encrypt(&self, ciphertext: &[u8], destination_key_id: &str) -> Result<Vec<u8>, KmsError> {
        require_ciphertext(ciphertext)?;
        require_key_id(destination_key_id)?;
        let blob = self.client.re_encrypt(ciphertext, destination_key_id)?;
        non_empty(blob, "ciphertext")
    }
}

fn require_key_id(key_id: &str) -> Result<(), KmsError> {
    if key_id.trim().is_empty() {
        return Err(KmsError::EmptyKeyId);
    }
    Ok(())
}

fn require_ciphertext(ciphertext: &[u8]) -> Result<(), KmsError> {
    if ciphertext.is_empty() {
        return Err(KmsError::EmptyCiphertext);
    }
    Ok(())
}

fn non_empty(blob: Vec<u8>, what: &'static str) -> Result<Vec<u8>, KmsError> {
    if blob.is_empty() {
        return Err(KmsError::MissingOutput(what));
    }
    Ok(blob)
}
