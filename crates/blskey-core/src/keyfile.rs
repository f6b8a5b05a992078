//! Key files on disk
//!
//! A key file is the hex encoding of an encrypted blob and nothing else: no
//! header, no trailing newline. Writes go through a temporary file in the
//! destination directory that is fsync'ed and then renamed into place, so a
//! crash never leaves a truncated file under the final name.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::legacy::trim_ascii_end;

/// Extension used for key files created by `generate`
pub const KEY_FILE_EXTENSION: &str = "bls";

#[derive(Error, Debug)]
pub enum KeyFileError {
    #[error("Cannot read key file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Cannot write key file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Key file {} is not valid hex: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: hex::FromHexError,
    },
    #[error("Key file {} is empty", path.display())]
    Empty { path: PathBuf },
}

/// Hex-encode `blob` and store it at `path`, replacing any existing file.
pub fn write(path: &Path, blob: &[u8]) -> Result<(), KeyFileError> {
    let write_err = |source: io::Error| KeyFileError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // NamedTempFile is created 0600 on Unix, and the mode survives the rename.
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(hex::encode(blob).as_bytes()).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    sync_dir(dir);
    log::debug!("wrote {} byte blob to {}", blob.len(), path.display());
    Ok(())
}

/// Read and hex-decode a key file.
pub fn read(path: &Path) -> Result<Vec<u8>, KeyFileError> {
    let raw = read_raw(path)?;
    let text = trim_ascii_end(&raw);
    if text.is_empty() {
        return Err(KeyFileError::Empty {
            path: path.to_path_buf(),
        });
    }
    hex::decode(text).map_err(|source| KeyFileError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a key file without decoding, for the legacy hex-or-binary codec.
pub fn read_raw(path: &Path) -> Result<Vec<u8>, KeyFileError> {
    fs::read(path).map_err(|source| KeyFileError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// File name for a freshly generated key: `<public key hex>.bls`.
pub fn generated_file_name(public_key_hex: &str) -> String {
    format!("{}.{}", public_key_hex, KEY_FILE_EXTENSION)
}

/// Make the rename durable. Best effort: not every platform can open a
/// directory for syncing.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
            log::debug!("could not sync directory {}: {}", dir.display(), e);
        }
    }

    #[cfg(not(unix))]
    {
        let _ = dir;
    }
}
