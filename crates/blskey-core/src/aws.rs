//! AWS KMS backend for [`EnvelopeService`](crate::envelope::EnvelopeService)
//!
//! The SDK is async; each call is driven to completion on a private
//! current-thread runtime so the workflows stay synchronous.

use std::fmt;

use aws_config::BehaviorVersion;
use aws_sdk_kms::config::{Credentials, Region};
use aws_sdk_kms::error::DisplayErrorContext;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::Client;
use tokio::runtime::Runtime;

use crate::envelope::{KmsClient, KmsError};
use crate::memory::SecretBytes;

/// Provider name recorded on explicitly supplied credentials
const CREDENTIALS_PROVIDER: &str = "bls-key-util";

/// Explicit AWS settings. All three must be present for them to be used.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AwsSettings {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: Option<String>,
}

impl AwsSettings {
    /// `(access key, secret key, region)` when every field is non-blank.
    pub fn static_credentials(&self) -> Option<(&str, &str, &str)> {
        fn field(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.trim().is_empty())
        }
        Some((
            field(&self.access_key_id)?,
            field(&self.secret_access_key)?,
            field(&self.region)?,
        ))
    }

    /// Whether some, but not all, fields are set.
    pub fn is_partial(&self) -> bool {
        let set = [&self.access_key_id, &self.secret_access_key, &self.region]
            .iter()
            .filter(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
            .count();
        set > 0 && set < 3
    }
}

impl fmt::Debug for AwsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSettings")
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "***SECRET***"),
            )
            .field("region", &self.region)
            .finish()
    }
}

/// Region named by a key ARN (`arn:aws:kms:<region>:<account>:key/<id>`).
///
/// Aliases and bare key ids carry no region.
pub fn region_from_key_id(key_id: &str) -> Option<&str> {
    if !key_id.starts_with("arn:") {
        return None;
    }
    key_id.splitn(5, ':').nth(3).filter(|region| !region.is_empty())
}

/// KMS client bound to one region and credential set.
pub struct AwsKms {
    runtime: Runtime,
    client: Client,
}

impl AwsKms {
    /// Build a client from explicit settings, or from the SDK's default
    /// provider chain when they are incomplete.
    ///
    /// When neither resolves a region, the region of `key_id` is used if it
    /// is a key ARN.
    pub fn connect(settings: &AwsSettings, key_id: Option<&str>) -> Result<Self, KmsError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| KmsError::Service(format!("cannot start async runtime: {}", e)))?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        match settings.static_credentials() {
            Some((access_key_id, secret_access_key, region)) => {
                log::debug!("using explicit AWS credentials for region {}", region);
                loader = loader
                    .credentials_provider(Credentials::new(
                        access_key_id,
                        secret_access_key,
                        None,
                        None,
                        CREDENTIALS_PROVIDER,
                    ))
                    .region(Region::new(region.to_owned()));
            }
            None => {
                log::info!(
                    "AWS access key, secret key and region not all provided; \
                     using the default credential provider chain"
                );
            }
        }

        let sdk_config = runtime.block_on(loader.load());
        let mut kms_config = aws_sdk_kms::config::Builder::from(&sdk_config);
        if sdk_config.region().is_none() {
            let region = key_id.and_then(region_from_key_id).ok_or_else(|| {
                KmsError::Service(
                    "no AWS region configured (use --aws-region, AWS_REGION, a profile \
                     or a key ARN)"
                        .into(),
                )
            })?;
            log::debug!("using region {} from key ARN", region);
            kms_config = kms_config.region(Region::new(region.to_owned()));
        }
        let client = Client::from_conf(kms_config.build());
        Ok(Self { runtime, client })
    }
}

impl KmsClient for AwsKms {
    fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        log::debug!("KMS Encrypt with key {}", key_id);
        let output = self
            .runtime
            .block_on(
                self.client
                    .encrypt()
                    .key_id(key_id)
                    .plaintext(Blob::new(plaintext))
                    .send(),
            )
            .map_err(|e| KmsError::Service(DisplayErrorContext(&e).to_string()))?;
        output
            .ciphertext_blob
            .map(Blob::into_inner)
            .ok_or(KmsError::MissingOutput("ciphertext"))
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<SecretBytes, KmsError> {
        log::debug!("KMS Decrypt of {} byte blob", ciphertext.len());
        let output = self
            .runtime
            .block_on(
                self.client
                    .decrypt()
                    .ciphertext_blob(Blob::new(ciphertext))
                    .send(),
            )
            .map_err(|e| KmsError::Service(DisplayErrorContext(&e).to_string()))?;
        output
            .plaintext
            .map(|blob| SecretBytes::new(blob.into_inner()))
            .ok_or(KmsError::MissingOutput("plaintext"))
    }

    fn re_encrypt(&self, ciphertext: &[u8], destination_key_id: &str) -> Result<Vec<u8>, KmsError> {
        log::debug!("KMS ReEncrypt to key {}", destination_key_id);
        let output = self
            .runtime
            .block_on(
                self.client
                    .re_encrypt()
                    .ciphertext_blob(Blob::new(ciphertext))
                    .destination_key_id(destination_key_id)
                    .send(),
            )
            .map_err(|e| KmsError::Service(DisplayErrorContext(&e).to_string()))?;
        output
            .ciphertext_blob
            .map(Blob::into_inner)
            .ok_or(KmsError::MissingOutput("ciphertext"))
    }
}
