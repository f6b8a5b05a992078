//! bls-key-util: manage KMS-protected validator BLS keys
//!
//! # Usage
//!
//! ```bash
//! bls-key-util generate --key-id alias/validator
//! bls-key-util convert --key-id alias/validator --legacy-blskey-file old.key \
//!     --blspass env:BLS_PASS --cms-blskey-file new.bls
//! bls-key-util rotate --new-key-id alias/next --old-blskey-file a.bls --new-blskey-file b.bls
//! bls-key-util pubkey --blskey-file a.bls
//! ```

mod cli;
mod config;

use std::path::Path;

use anyhow::{Context, Result};
use blskey_core::workflow::{self, EXIT_INFRASTRUCTURE, EXIT_USAGE};
use blskey_core::{AwsKms, EnvelopeService, WorkflowError};
use clap::Parser;

use cli::{Cli, Command, Options};
use config::UtilConfig;

fn main() {
    // Security hardening: keep key material out of core files
    blskey_core::memory::disable_core_dumps();

    let cli = Cli::parse();
    if let Err(e) = cli.check_stdin_use() {
        e.exit();
    }
    let Cli { options, command } = cli;

    if let Some(flag) = first_missing_argument(&command) {
        eprintln!("Error: missing required argument --{}", flag);
        eprintln!("{}", Cli::render_help());
        std::process::exit(EXIT_USAGE);
    }

    let config = match load_config(&options) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(EXIT_INFRASTRUCTURE);
        }
    };

    init_logging(&options, &config);
    config.warn_on_partial_aws();

    if let Err(e) = run(&config, command) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        if matches!(e, WorkflowError::MissingArgument(_)) {
            eprintln!("{}", Cli::render_help());
        }
        std::process::exit(e.exit_code());
    }
}

/// Config file, then environment, then stdin JSON, then flags.
fn load_config(options: &Options) -> Result<UtilConfig> {
    let mut config = match &options.config {
        Some(path) => UtilConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => UtilConfig::default(),
    };

    config.apply_env_overrides();

    if options.aws_settings_stdin {
        match config::read_stdin_line(config::STDIN_SETTINGS_TIMEOUT) {
            Some(line) => config.apply_stdin_json(&line)?,
            None => eprintln!(
                "No AWS settings on stdin within {:?}; continuing without them.",
                config::STDIN_SETTINGS_TIMEOUT
            ),
        }
    }

    config.apply_flags(options.aws_flags(), options.log_level.clone());

    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

/// `--log-level` wins over `RUST_LOG`, which wins over the configured level.
fn init_logging(options: &Options, config: &UtilConfig) {
    let level = config.logging.level.to_ascii_lowercase();
    let mut builder = match options.log_level {
        Some(_) => {
            let mut builder = env_logger::Builder::new();
            builder.parse_filters(&level);
            builder
        }
        None => env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)),
    };
    builder.target(env_logger::Target::Stderr).init();
}

fn run(config: &UtilConfig, command: Command) -> Result<(), WorkflowError> {
    let kms = AwsKms::connect(&config.aws.to_settings(), command.key_id())?;
    let service = EnvelopeService::new(kms);

    match command {
        Command::Generate { key_id } => {
            let generated = workflow::generate(&service, &key_id, Path::new("."))?;
            println!("{}", generated.public_key);
            println!("Wrote {}", generated.path.display());
        }
        Command::Convert {
            key_id,
            legacy_file,
            blspass,
            out_file,
        } => {
            let public_key =
                workflow::convert(&service, &legacy_file, &blspass, &out_file, &key_id)?;
            println!("{}", public_key);
            println!("Wrote {}", out_file.display());
        }
        Command::Rotate {
            key_id,
            old_file,
            new_file,
        } => {
            workflow::rotate(&service, &old_file, &new_file, &key_id)?;
            println!("Wrote {}", new_file.display());
        }
        Command::Pubkey { key_file } => {
            let public_key = workflow::pubkey(&service, &key_file)?;
            println!("{}", public_key);
        }
    }
    Ok(())
}

/// The first required flag left empty, checked before contacting KMS.
fn first_missing_argument(command: &Command) -> Option<&'static str> {
    fn empty_path(p: &Path) -> bool {
        p.as_os_str().is_empty()
    }

    let missing = match command {
        Command::Generate { key_id } => [(key_id.is_empty(), "key-id")].to_vec(),
        Command::Convert {
            key_id,
            legacy_file,
            blspass,
            out_file,
        } => [
            (key_id.is_empty(), "key-id"),
            (empty_path(legacy_file), "legacy-blskey-file"),
            (blspass.is_empty(), "blspass"),
            (empty_path(out_file), "cms-blskey-file"),
        ]
        .to_vec(),
        Command::Rotate {
            key_id,
            old_file,
            new_file,
        } => [
            (key_id.is_empty(), "new-key-id"),
            (empty_path(old_file), "old-blskey-file"),
            (empty_path(new_file), "new-blskey-file"),
        ]
        .to_vec(),
        Command::Pubkey { key_file } => [(empty_path(key_file), "blskey-file")].to_vec(),
    };
    missing
        .into_iter()
        .find_map(|(is_missing, flag)| is_missing.then_some(flag))
}
