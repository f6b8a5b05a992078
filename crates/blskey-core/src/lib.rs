//! BLS key utility core
//!
//! Protection of validator BLS private keys at rest.
//!
//! # Key Protection
//!
//! - New keys are wrapped by a key management service (envelope encryption)
//!   and stored as hex key files.
//! - Legacy key files sealed with a passphrase (AES-GCM) can be read and
//!   converted to the envelope form.
//! - Rotation re-wraps inside the key management service; the private key is
//!   never decrypted locally.
//!
//! Plaintext keys only ever live in [`memory::SecretBytes`] buffers or the BLS
//! library's own zeroizing key type.

pub mod envelope;
pub mod keyfile;
pub mod keys;
pub mod legacy;
pub mod memory;
pub mod passphrase;
pub mod workflow;

#[cfg(feature = "aws")]
pub mod aws;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use envelope::{EnvelopeService, KmsClient, KmsError};
pub use keys::{KeyError, PrivateKey, PublicKey};
pub use memory::SecretBytes;
pub use passphrase::{Passphrase, PassphraseError, PassphraseSource};
pub use workflow::{GeneratedKey, WorkflowError};

#[cfg(feature = "aws")]
pub use aws::{AwsKms, AwsSettings};
