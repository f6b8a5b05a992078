//! Utility configuration: TOML file + environment variables + optional JSON
//! settings line on stdin + command-line flags.
//!
//! Priority: flags > stdin JSON > environment variables > config file > defaults.

use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use blskey_core::AwsSettings;
use serde::{Deserialize, Serialize};

/// How long to wait for the optional JSON settings line on stdin
pub const STDIN_SETTINGS_TIMEOUT: Duration = Duration::from_secs(1);

const LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UtilConfig {
    /// AWS KMS access
    #[serde(default)]
    pub aws: AwsSection,

    /// Logging
    #[serde(default)]
    pub logging: LoggingSection,
}

/// AWS credentials and region. Used only when all three are set.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AwsSection {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: Option<String>,
}

impl std::fmt::Debug for AwsSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.to_settings(), f)
    }
}

impl AwsSection {
    pub fn to_settings(&self) -> AwsSettings {
        AwsSettings {
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            region: self.region.clone(),
        }
    }

    /// Overwrite each field that `other` sets to a non-blank value.
    fn merge(&mut self, other: AwsSection) {
        fn take(slot: &mut Option<String>, value: Option<String>) {
            if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
                *slot = Some(v);
            }
        }
        take(&mut self.access_key_id, other.access_key_id);
        take(&mut self.secret_access_key, other.secret_access_key);
        take(&mut self.region, other.region);
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level (off, error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// AWS settings as supplied on stdin, one JSON object per line.
#[derive(Debug, Default, Deserialize)]
pub struct StdinAwsSettings {
    #[serde(default)]
    pub aws_access_key_id: Option<String>,
    #[serde(default)]
    pub aws_secret_access_key: Option<String>,
    #[serde(default)]
    pub aws_region: Option<String>,
}

impl From<StdinAwsSettings> for AwsSection {
    fn from(s: StdinAwsSettings) -> Self {
        Self {
            access_key_id: s.aws_access_key_id,
            secret_access_key: s.aws_secret_access_key,
            region: s.aws_region,
        }
    }
}

impl UtilConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: UtilConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `BLSKEY_AWS_ACCESS_KEY_ID`
    /// - `BLSKEY_AWS_SECRET_ACCESS_KEY`
    /// - `BLSKEY_AWS_REGION`
    /// - `BLSKEY_LOG_LEVEL`
    pub fn apply_env_overrides(&mut self) {
        self.aws.merge(AwsSection {
            access_key_id: std::env::var("BLSKEY_AWS_ACCESS_KEY_ID").ok(),
            secret_access_key: std::env::var("BLSKEY_AWS_SECRET_ACCESS_KEY").ok(),
            region: std::env::var("BLSKEY_AWS_REGION").ok(),
        });
        if let Ok(v) = std::env::var("BLSKEY_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    /// Apply a JSON settings line read from stdin.
    pub fn apply_stdin_json(&mut self, line: &str) -> Result<()> {
        let settings: StdinAwsSettings = serde_json::from_str(line.trim())
            .context("stdin settings are not a valid JSON object for AWS configuration")?;
        self.aws.merge(settings.into());
        Ok(())
    }

    /// Apply command-line flag overrides.
    pub fn apply_flags(&mut self, aws: AwsSection, log_level: Option<String>) {
        self.aws.merge(aws);
        if let Some(level) = log_level {
            self.logging.level = level;
        }
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        let level = self.logging.level.to_ascii_lowercase();
        anyhow::ensure!(
            LOG_LEVELS.contains(&level.as_str()),
            "logging.level must be one of {}, got {:?}",
            LOG_LEVELS.join(", "),
            self.logging.level
        );
        Ok(())
    }

    /// Warn about settings that will silently fall back to defaults.
    pub fn warn_on_partial_aws(&self) {
        if self.aws.to_settings().is_partial() {
            log::warn!(
                "AWS access key, secret key and region must be given together; \
                 ignoring the explicit values"
            );
        }
    }
}

/// Read the JSON settings line from the process's standard input.
///
/// Goes through the process-wide stdin buffer so whatever follows the line
/// stays readable for later stdin consumers.
pub fn read_stdin_line(timeout: Duration) -> Option<String> {
    read_line_with_timeout(|line| io::stdin().read_line(line), timeout)
}

/// Run `read_line` once, giving up after `timeout`.
///
/// The read runs on a blocking thread and races a timer; whichever finishes
/// first wins. A read that loses the race is abandoned, not cancelled.
pub fn read_line_with_timeout<F>(read_line: F, timeout: Duration) -> Option<String>
where
    F: FnOnce(&mut String) -> io::Result<usize> + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .ok()?;

    let line = runtime.block_on(async move {
        let read = tokio::task::spawn_blocking(move || {
            let mut line = String::new();
            match read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line),
            }
        });

        tokio::select! {
            joined = read => joined.ok().flatten(),
            _ = tokio::time::sleep(timeout) => {
                log::debug!("no settings on stdin within {:?}", timeout);
                None
            }
        }
    });

    // Do not wait for an abandoned read.
    runtime.shutdown_background();
    line
}
