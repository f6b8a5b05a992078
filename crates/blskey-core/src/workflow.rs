//! Key management commands
//!
//! Each command is a straight pipeline with nothing persisted between steps:
//!
//! - `generate`: new key → KMS encrypt → `<pubkey>.bls`
//! - `convert`: passphrase → legacy decrypt → KMS encrypt → new key file
//! - `rotate`: key file → KMS re-encrypt → new key file (no plaintext here)
//! - `pubkey`: key file → KMS decrypt → public key
//!
//! Commands return typed results; printing is left to the caller.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::envelope::{EnvelopeService, KmsClient, KmsError};
use crate::keyfile::{self, KeyFileError};
use crate::keys::{KeyError, PrivateKey, PublicKey};
use crate::legacy::{self, LegacyError};
use crate::passphrase::{PassphraseError, PassphraseSource};

/// Process exit status for service, key file and configuration failures
pub const EXIT_INFRASTRUCTURE: i32 = 1;

/// Process exit status for usage errors and missing arguments
pub const EXIT_USAGE: i32 = 2;

/// Process exit status for bad passphrases, undecryptable legacy files and
/// invalid key material
pub const EXIT_BAD_INPUT: i32 = 100;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Missing required argument --{0}")]
    MissingArgument(&'static str),
    #[error("Failed to read passphrase: {0}")]
    Passphrase(#[from] PassphraseError),
    #[error("Failed to decrypt legacy key file {}: {source}", path.display())]
    LegacyDecrypt {
        path: PathBuf,
        #[source]
        source: LegacyError,
    },
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    KeyFile(#[from] KeyFileError),
    #[error(transparent)]
    Service(#[from] KmsError),
}

impl WorkflowError {
    /// Exit status separating bad input from bad infrastructure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingArgument(_) => EXIT_USAGE,
            Self::Passphrase(_) | Self::LegacyDecrypt { .. } | Self::Key(_) => EXIT_BAD_INPUT,
            Self::KeyFile(_) | Self::Service(_) => EXIT_INFRASTRUCTURE,
        }
    }
}

/// Result of `generate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKey {
    pub public_key: PublicKey,
    pub path: PathBuf,
}

/// Generate a new key, wrap it under `key_id` and store it as
/// `<out_dir>/<public key hex>.bls`.
pub fn generate<C: KmsClient>(
    service: &EnvelopeService<C>,
    key_id: &str,
    out_dir: &Path,
) -> Result<GeneratedKey, WorkflowError> {
    require_str("key-id", key_id)?;
    let private_key = PrivateKey::generate()?;
    generate_with(service, key_id, out_dir, &private_key)
}

/// `generate` with a caller-supplied key instead of a random one.
pub fn generate_with<C: KmsClient>(
    service: &EnvelopeService<C>,
    key_id: &str,
    out_dir: &Path,
    private_key: &PrivateKey,
) -> Result<GeneratedKey, WorkflowError> {
    require_str("key-id", key_id)?;
    let public_key = private_key.public_key();

    let blob = service.encrypt(key_id, private_key.to_bytes().as_slice())?;

    let path = out_dir.join(keyfile::generated_file_name(&public_key.to_hex()));
    keyfile::write(&path, &blob)?;
    log::info!("generated key {} under KMS key {}", public_key, key_id);

    Ok(GeneratedKey { public_key, path })
}

/// Re-protect a legacy passphrase-encrypted key file under a KMS key.
pub fn convert<C: KmsClient>(
    service: &EnvelopeService<C>,
    legacy_file: &Path,
    passphrase_source: &str,
    out_file: &Path,
    key_id: &str,
) -> Result<PublicKey, WorkflowError> {
    require_path("legacy-blskey-file", legacy_file)?;
    require_str("blspass", passphrase_source)?;
    require_path("cms-blskey-file", out_file)?;
    require_str("key-id", key_id)?;

    let passphrase = passphrase_source.parse::<PassphraseSource>()?.resolve()?;
    convert_with_passphrase(service, legacy_file, passphrase.as_bytes(), out_file, key_id)
}

/// `convert` with an already-resolved passphrase.
pub fn convert_with_passphrase<C: KmsClient>(
    service: &EnvelopeService<C>,
    legacy_file: &Path,
    passphrase: &[u8],
    out_file: &Path,
    key_id: &str,
) -> Result<PublicKey, WorkflowError> {
    require_path("legacy-blskey-file", legacy_file)?;
    require_path("cms-blskey-file", out_file)?;
    require_str("key-id", key_id)?;

    let sealed = keyfile::read_raw(legacy_file)?;
    let plaintext =
        legacy::decrypt(&sealed, passphrase).map_err(|source| WorkflowError::LegacyDecrypt {
            path: legacy_file.to_path_buf(),
            source,
        })?;

    // Legacy files hold the key as hex text.
    let text = std::str::from_utf8(plaintext.as_slice()).map_err(|_| {
        KeyError::InvalidPrivateKey("legacy plaintext is not hex text".to_owned())
    })?;
    let private_key = PrivateKey::from_hex(text)?;
    drop(plaintext);

    let public_key = private_key.public_key();
    let blob = service.encrypt(key_id, private_key.to_bytes().as_slice())?;
    drop(private_key);

    keyfile::write(out_file, &blob)?;
    log::info!(
        "converted legacy key {} to {} under KMS key {}",
        public_key,
        out_file.display(),
        key_id
    );
    Ok(public_key)
}

/// Re-wrap a KMS-protected key file under `key_id`.
///
/// The key management service does the re-encryption; the private key is
/// never decrypted in this process.
pub fn rotate<C: KmsClient>(
    service: &EnvelopeService<C>,
    old_file: &Path,
    new_file: &Path,
    key_id: &str,
) -> Result<(), WorkflowError> {
    require_path("old-blskey-file", old_file)?;
    require_path("new-blskey-file", new_file)?;
    require_str("new-key-id", key_id)?;

    let blob = keyfile::read(old_file)?;
    let rotated = service.re_encrypt(&blob, key_id)?;
    keyfile::write(new_file, &rotated)?;

    log::info!(
        "rotated {} to {} under KMS key {}",
        old_file.display(),
        new_file.display(),
        key_id
    );
    Ok(())
}

/// Decrypt a KMS-protected key file and derive its public key.
pub fn pubkey<C: KmsClient>(
    service: &EnvelopeService<C>,
    key_file: &Path,
) -> Result<PublicKey, WorkflowError> {
    require_path("blskey-file", key_file)?;

    let blob = keyfile::read(key_file)?;
    let public_key = {
        let plaintext = service.decrypt(&blob)?;
        PrivateKey::from_bytes(plaintext.as_slice())?.public_key()
    };

    log::debug!("derived public key for {}", key_file.display());
    Ok(public_key)
}

fn require_str(flag: &'static str, value: &str) -> Result<(), WorkflowError> {
    if value.trim().is_empty() {
        return Err(WorkflowError::MissingArgument(flag));
    }
    Ok(())
}

fn require_path(flag: &'static str, value: &Path) -> Result<(), WorkflowError> {
    if value.as_os_str().is_empty() {
        return Err(WorkflowError::MissingArgument(flag));
    }
    Ok(())
}
