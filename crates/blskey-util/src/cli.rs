//! Command-line interface
//!
//! Older scripts spell flags with underscores (`--blskey_file`), newer ones
//! with dashes (`--blskey-file`); both are accepted as aliases.

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};

use crate::config::AwsSection;

const AFTER_HELP: &str = "\
PASSPHRASE SOURCES (--blspass):
    stdin | pass:<text> | env:<var> | file:<path> | fd:<n>

ENVIRONMENT:
    BLSKEY_AWS_ACCESS_KEY_ID, BLSKEY_AWS_SECRET_ACCESS_KEY, BLSKEY_AWS_REGION,
    BLSKEY_LOG_LEVEL, RUST_LOG

EXIT STATUS:
    0 success, 1 service/file/config failure, 2 usage error,
    100 bad passphrase, legacy file or key material";

/// Manage KMS-protected validator BLS keys
#[derive(Parser, Debug)]
#[command(name = "bls-key-util", version, about, long_about = None)]
#[command(propagate_version = true, after_help = AFTER_HELP)]
pub struct Cli {
    #[command(flatten)]
    pub options: Options,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags that apply to every command.
#[derive(Args, Debug, Default, PartialEq, Eq)]
pub struct Options {
    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// off, error, warn, info, debug or trace
    #[arg(long, global = true, alias = "log_level")]
    pub log_level: Option<String>,

    /// Used only together with the secret key and region
    #[arg(long, global = true, alias = "aws_access_key_id")]
    pub aws_access_key_id: Option<String>,

    #[arg(long, global = true, alias = "aws_secret_access_key")]
    pub aws_secret_access_key: Option<String>,

    #[arg(long, global = true, alias = "aws_region")]
    pub aws_region: Option<String>,

    /// Read one JSON settings line from stdin first
    #[arg(long, global = true, alias = "aws_settings_stdin")]
    pub aws_settings_stdin: bool,
}

impl Options {
    pub fn aws_flags(&self) -> AwsSection {
        AwsSection {
            access_key_id: self.aws_access_key_id.clone(),
            secret_access_key: self.aws_secret_access_key.clone(),
            region: self.aws_region.clone(),
        }
    }
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Create a new key and store it as ./<public key>.bls
    Generate {
        /// KMS key to wrap under
        #[arg(long, aliases = ["key_id", "enc-key-id", "enc_key_id"])]
        key_id: String,
    },
    /// Move a passphrase-encrypted legacy key under KMS
    Convert {
        /// KMS key to wrap under
        #[arg(long, aliases = ["key_id", "enc-key-id", "enc_key_id"])]
        key_id: String,
        /// Legacy key file
        #[arg(long = "legacy-blskey-file", alias = "legacy_blskey_file")]
        legacy_file: PathBuf,
        /// Passphrase source
        #[arg(long)]
        blspass: String,
        /// Output key file
        #[arg(long = "cms-blskey-file", alias = "cms_blskey_file")]
        out_file: PathBuf,
    },
    /// Re-wrap a key file under another KMS key
    Rotate {
        /// Destination KMS key
        #[arg(long = "new-key-id", aliases = ["new_key_id", "key-id", "key_id"])]
        key_id: String,
        /// Existing key file
        #[arg(long = "old-blskey-file", alias = "old_blskey_file")]
        old_file: PathBuf,
        /// Output key file
        #[arg(long = "new-blskey-file", alias = "new_blskey_file")]
        new_file: PathBuf,
    },
    /// Print the public key of a key file
    Pubkey {
        /// Key file
        #[arg(long = "blskey-file", alias = "blskey_file")]
        key_file: PathBuf,
    },
}

impl Command {
    /// KMS key the command wraps under, if it names one.
    pub fn key_id(&self) -> Option<&str> {
        match self {
            Self::Generate { key_id } | Self::Convert { key_id, .. } | Self::Rotate { key_id, .. } => {
                Some(key_id.as_str())
            }
            Self::Pubkey { .. } => None,
        }
    }

    fn reads_passphrase_from_stdin(&self) -> bool {
        matches!(self, Self::Convert { blspass, .. } if blspass == "stdin")
    }
}

impl Cli {
    /// Stdin can carry the AWS settings line or the passphrase, not both.
    pub fn check_stdin_use(&self) -> Result<(), clap::Error> {
        if self.options.aws_settings_stdin && self.command.reads_passphrase_from_stdin() {
            return Err(Self::command().error(
                ErrorKind::ArgumentConflict,
                "--aws-settings-stdin cannot be combined with --blspass stdin",
            ));
        }
        Ok(())
    }

    pub fn render_help() -> String {
        Self::command().render_help().to_string()
    }
}
