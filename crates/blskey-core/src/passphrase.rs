//! Passphrase sources
//!
//! A passphrase is named by a descriptor rather than passed on the command
//! line directly:
//!
//! | Descriptor      | Reads                                   |
//! |-----------------|-----------------------------------------|
//! | `stdin`         | standard input until end of stream      |
//! | `pass:<text>`   | `<text>` itself (may contain `:`)       |
//! | `env:<name>`    | environment variable `<name>`           |
//! | `file:<path>`   | the whole file at `<path>`              |
//! | `fd:<n>`        | inherited file descriptor `<n>` (Unix)  |
//!
//! The resolved secret is returned as-is; consumers strip trailing newlines
//! at the point of use.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Error, Debug)]
pub enum PassphraseError {
    #[error("Invalid passphrase source {0:?}: expected stdin, pass:, env:, file: or fd:")]
    InvalidSourceSpec(String),
    #[error("Environment variable {0:?} is not defined")]
    UndefinedVariable(String),
    #[error("Invalid file descriptor {0:?}")]
    InvalidDescriptor(String),
    #[error("Cannot read passphrase from {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: io::Error,
    },
}

/// Where to read a passphrase from.
#[derive(Clone, PartialEq, Eq)]
pub enum PassphraseSource {
    Stdin,
    Literal(Zeroizing<String>),
    Env(String),
    File(PathBuf),
    Fd(u32),
}

impl FromStr for PassphraseSource {
    type Err = PassphraseError;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        if descriptor == "stdin" {
            return Ok(Self::Stdin);
        }

        let (method, arg) = descriptor
            .split_once(':')
            .ok_or_else(|| PassphraseError::InvalidSourceSpec(redact(descriptor)))?;

        match method {
            "pass" => Ok(Self::Literal(Zeroizing::new(arg.to_owned()))),
            "env" => Ok(Self::Env(arg.to_owned())),
            "file" => Ok(Self::File(PathBuf::from(arg))),
            "fd" => parse_fd(arg).map(Self::Fd),
            _ => Err(PassphraseError::InvalidSourceSpec(redact(descriptor))),
        }
    }
}

impl fmt::Debug for PassphraseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => f.write_str("Stdin"),
            Self::Literal(_) => f.write_str("Literal(***SECRET***)"),
            Self::Env(name) => f.debug_tuple("Env").field(name).finish(),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Fd(fd) => f.debug_tuple("Fd").field(fd).finish(),
        }
    }
}

impl PassphraseSource {
    /// Resolve the passphrase, reading the process's standard input for `stdin`.
    pub fn resolve(&self) -> Result<Passphrase, PassphraseError> {
        self.resolve_with_stdin(io::stdin().lock())
    }

    /// Resolve the passphrase, using `stdin` as the standard input stream.
    pub fn resolve_with_stdin<R: Read>(&self, stdin: R) -> Result<Passphrase, PassphraseError> {
        match self {
            Self::Stdin => read_all(stdin, "stdin"),
            Self::Literal(text) => Ok(Passphrase::from(text.as_bytes())),
            Self::Env(name) => std::env::var_os(name)
                .map(|value| Passphrase::from(value.as_encoded_bytes()))
                .ok_or_else(|| PassphraseError::UndefinedVariable(name.clone())),
            Self::File(path) => {
                let origin = format!("file {}", path.display());
                let file = File::open(path).map_err(|source| PassphraseError::Io {
                    origin: origin.clone(),
                    source,
                })?;
                read_all(file, &origin)
            }
            Self::Fd(fd) => read_fd(*fd),
        }
    }
}

/// A resolved passphrase. Wiped from memory on drop.
#[derive(Clone)]
pub struct Passphrase(Zeroizing<Vec<u8>>);

impl Passphrase {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Passphrase {
    fn from(bytes: &[u8]) -> Self {
        Self(Zeroizing::new(bytes.to_vec()))
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(***SECRET***)")
    }
}

/// Only the method is echoed back in errors. A descriptor without a method is
/// most likely a passphrase typed in the wrong place, so it is not echoed.
fn redact(descriptor: &str) -> String {
    match descriptor.split_once(':') {
        Some((method, _)) => format!("{}:…", method),
        None => "<redacted>".to_owned(),
    }
}

fn parse_fd(arg: &str) -> Result<u32, PassphraseError> {
    arg.parse::<u32>()
        .ok()
        .filter(|&fd| i32::try_from(fd).is_ok())
        .ok_or_else(|| PassphraseError::InvalidDescriptor(arg.to_owned()))
}

fn read_all<R: Read>(mut reader: R, origin: &str) -> Result<Passphrase, PassphraseError> {
    let mut buf = Zeroizing::new(Vec::new());
    reader
        .read_to_end(&mut buf)
        .map_err(|source| PassphraseError::Io {
            origin: origin.to_owned(),
            source,
        })?;
    Ok(Passphrase(buf))
}

#[cfg(unix)]
fn read_fd(fd: u32) -> Result<Passphrase, PassphraseError> {
    use std::os::fd::{FromRawFd, RawFd};

    let origin = format!("fd {}", fd);
    let raw = RawFd::try_from(fd).map_err(|_| PassphraseError::InvalidDescriptor(fd.to_string()))?;

    // Taking ownership of a descriptor that is not open would be undefined
    // behaviour for `File`, so probe it first.
    // SAFETY: F_GETFD only inspects the descriptor table.
    if unsafe { libc::fcntl(raw, libc::F_GETFD) } == -1 {
        return Err(PassphraseError::Io {
            origin,
            source: io::Error::last_os_error(),
        });
    }

    // SAFETY: the descriptor is open and was handed to us for this purpose;
    // the `File` closes it when dropped on every path out of `read_all`.
    let file = unsafe { File::from_raw_fd(raw) };
    read_all(file, &origin)
}

#[cfg(not(unix))]
fn read_fd(fd: u32) -> Result<Passphrase, PassphraseError> {
    Err(PassphraseError::InvalidDescriptor(format!(
        "{} (file descriptors are only supported on Unix)",
        fd
    )))
}
