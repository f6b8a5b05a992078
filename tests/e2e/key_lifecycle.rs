//! End-to-end key lifecycle against the in-memory KMS.
//!
//! Exercises the four commands the way an operator chains them:
//!
//! 1. generate a key file under one KMS key
//! 2. convert a legacy passphrase-protected key to a KMS key file
//! 3. rotate a key file to another KMS key
//! 4. read the public key back from every file produced
//!
//! Run with: cargo test --test key_lifecycle

use std::fs;
use std::path::Path;

use blskey_core::keyfile;
use blskey_core::test_utils::{legacy_seal, InMemoryKms};
use blskey_core::workflow::{self, EXIT_BAD_INPUT, EXIT_INFRASTRUCTURE, EXIT_USAGE};
use blskey_core::{EnvelopeService, KmsClient, PrivateKey, WorkflowError};
use tempfile::TempDir;

const VALIDATOR_KEY: [u8; 32] = [0x01; 32];

fn service(key_ids: &[&str]) -> EnvelopeService<InMemoryKms> {
    EnvelopeService::new(InMemoryKms::with_keys(key_ids))
}

/// Write a legacy key file the way the old tooling did: hex of
/// nonce || AES-GCM(hex private key).
fn write_legacy_file(path: &Path, key: &PrivateKey, passphrase: &str) {
    let plaintext = hex::encode(key.to_bytes().as_slice());
    let sealed = legacy_seal(plaintext.as_bytes(), passphrase);
    fs::write(path, hex::encode(sealed)).unwrap();
}

// ============================================================================
// generate
// ============================================================================

#[test]
fn test_generate_writes_file_named_after_public_key() {
    let dir = TempDir::new().unwrap();
    let service = service(&["test-key"]);
    let key = PrivateKey::from_bytes(&VALIDATOR_KEY).unwrap();

    let generated = workflow::generate_with(&service, "test-key", dir.path(), &key).unwrap();

    let expected_name = format!("{}.bls", key.public_key().to_hex());
    assert_eq!(generated.path, dir.path().join(&expected_name));
    assert_eq!(generated.public_key, key.public_key());

    // The file is hex of a blob that unwraps to exactly the generated key.
    let contents = fs::read_to_string(&generated.path).unwrap();
    let blob = hex::decode(contents.trim()).unwrap();
    let unwrapped = service.client().decrypt(&blob).unwrap();
    assert_eq!(unwrapped.as_slice(), &VALIDATOR_KEY);
    assert_eq!(service.client().key_id_of(&blob).as_deref(), Some("test-key"));
}

#[test]
fn test_generate_random_key_then_pubkey() {
    let dir = TempDir::new().unwrap();
    let service = service(&["test-key"]);

    let generated = workflow::generate(&service, "test-key", dir.path()).unwrap();
    let public_key = workflow::pubkey(&service, &generated.path).unwrap();

    assert_eq!(public_key, generated.public_key);
    assert_eq!(public_key.to_hex().len(), 96);
}

#[test]
fn test_generate_twice_gives_distinct_keys() {
    let dir = TempDir::new().unwrap();
    let service = service(&["test-key"]);

    let a = workflow::generate(&service, "test-key", dir.path()).unwrap();
    let b = workflow::generate(&service, "test-key", dir.path()).unwrap();

    assert_ne!(a.public_key, b.public_key);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
fn test_generate_with_unknown_key_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let service = service(&["test-key"]);

    let err = workflow::generate(&service, "no-such-key", dir.path()).unwrap_err();

    assert!(matches!(err, WorkflowError::Service(_)));
    assert_eq!(err.exit_code(), EXIT_INFRASTRUCTURE);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

// ============================================================================
// convert
// ============================================================================

#[test]
fn test_convert_then_pubkey_matches_direct_derivation() {
    let dir = TempDir::new().unwrap();
    let service = service(&["test-key"]);
    let key = PrivateKey::from_bytes(&VALIDATOR_KEY).unwrap();

    let legacy = dir.path().join("validator.key");
    let converted = dir.path().join("validator.bls");
    write_legacy_file(&legacy, &key, "hunter2");

    let public_key =
        workflow::convert(&service, &legacy, "pass:hunter2", &converted, "test-key").unwrap();
    assert_eq!(public_key, key.public_key());

    let read_back = workflow::pubkey(&service, &converted).unwrap();
    assert_eq!(read_back, key.public_key());
}

#[test]
fn test_convert_with_passphrase_from_file_with_trailing_newline() {
    let dir = TempDir::new().unwrap();
    let service = service(&["test-key"]);
    let key = PrivateKey::from_bytes(&VALIDATOR_KEY).unwrap();

    let legacy = dir.path().join("validator.key");
    let converted = dir.path().join("validator.bls");
    let pass_file = dir.path().join("pass.txt");
    write_legacy_file(&legacy, &key, "hunter2");
    fs::write(&pass_file, "hunter2\n").unwrap();

    let source = format!("file:{}", pass_file.display());
    let public_key = workflow::convert(&service, &legacy, &source, &converted, "test-key").unwrap();
    assert_eq!(public_key, key.public_key());
}

#[test]
fn test_convert_binary_legacy_file() {
    let dir = TempDir::new().unwrap();
    let service = service(&["test-key"]);
    let key = PrivateKey::from_bytes(&VALIDATOR_KEY).unwrap();

    // Some legacy files were written as raw bytes instead of hex.
    let legacy = dir.path().join("validator.key");
    let plaintext = hex::encode(key.to_bytes().as_slice());
    fs::write(&legacy, legacy_seal(plaintext.as_bytes(), "hunter2")).unwrap();

    let converted = dir.path().join("validator.bls");
    let public_key = workflow::convert_with_passphrase(
        &service,
        &legacy,
        b"hunter2",
        &converted,
        "test-key",
    )
    .unwrap();
    assert_eq!(public_key, key.public_key());
}

#[test]
fn test_convert_reads_legacy_scalar_low_byte_first() {
    let dir = TempDir::new().unwrap();
    let service = service(&["test-key"]);

    // Scalar 1 as the old tooling stored it; the public key is the G1 generator.
    let legacy = dir.path().join("validator.key");
    let plaintext = format!("01{}", "00".repeat(31));
    fs::write(
        &legacy,
        hex::encode(legacy_seal(plaintext.as_bytes(), "hunter2")),
    )
    .unwrap();

    let converted = dir.path().join("validator.bls");
    let public_key =
        workflow::convert(&service, &legacy, "pass:hunter2", &converted, "test-key").unwrap();
    assert_eq!(
        public_key.to_hex(),
        "bbc622db0af03afbef1a7af93fe8556c58ac1b173f3a4ea105b974974f8c68c30faca94f8c63952694d79731a7d3f197"
    );

    // KMS holds the same little-endian bytes.
    let blob = keyfile::read(&converted).unwrap();
    let unwrapped = service.client().decrypt(&blob).unwrap();
    assert_eq!(hex::encode(unwrapped.as_slice()), plaintext);
}

#[test]
fn test_convert_wrong_passphrase_is_bad_input() {
    let dir = TempDir::new().unwrap();
    let service = service(&["test-key"]);
    let key = PrivateKey::from_bytes(&VALIDATOR_KEY).unwrap();

    let legacy = dir.path().join("validator.key");
    let converted = dir.path().join("validator.bls");
    write_legacy_file(&legacy, &key, "hunter2");

    let err =
        workflow::convert(&service, &legacy, "pass:hunter3", &converted, "test-key").unwrap_err();

    assert!(matches!(err, WorkflowError::LegacyDecrypt { .. }));
    assert_eq!(err.exit_code(), EXIT_BAD_INPUT);
    assert!(!converted.exists());
    assert_eq!(service.client().encrypt_calls(), 0);
}

#[test]
fn test_convert_undefined_env_passphrase_is_bad_input() {
    let dir = TempDir::new().unwrap();
    let service = service(&["test-key"]);
    let key = PrivateKey::from_bytes(&VALIDATOR_KEY).unwrap();

    let legacy = dir.path().join("validator.key");
    write_legacy_file(&legacy, &key, "hunter2");

    let err = workflow::convert(
        &service,
        &legacy,
        "env:BLSKEY_E2E_UNSET_PASSPHRASE",
        &dir.path().join("out.bls"),
        "test-key",
    )
    .unwrap_err();

    assert!(matches!(err, WorkflowError::Passphrase(_)));
    assert_eq!(err.exit_code(), EXIT_BAD_INPUT);
}

#[test]
fn test_convert_missing_argument_is_usage_error() {
    let dir = TempDir::new().unwrap();
    let service = service(&["test-key"]);

    let err = workflow::convert(
        &service,
        &dir.path().join("validator.key"),
        "",
        &dir.path().join("out.bls"),
        "test-key",
    )
    .unwrap_err();

    assert!(matches!(err, WorkflowError::MissingArgument("blspass")));
    assert_eq!(err.exit_code(), EXIT_USAGE);
}

// ============================================================================
// rotate
// ============================================================================

#[test]
fn test_rotate_never_decrypts_locally() {
    let dir = TempDir::new().unwrap();
    let service = service(&["old-key", "new-key"]);
    let key = PrivateKey::from_bytes(&VALIDATOR_KEY).unwrap();

    let generated = workflow::generate_with(&service, "old-key", dir.path(), &key).unwrap();
    let rotated = dir.path().join("rotated.bls");

    workflow::rotate(&service, &generated.path, &rotated, "new-key").unwrap();

    assert_eq!(service.client().decrypt_calls(), 0);
    assert_eq!(service.client().re_encrypt_calls(), 1);

    let blob = keyfile::read(&rotated).unwrap();
    assert_eq!(service.client().key_id_of(&blob).as_deref(), Some("new-key"));

    // The old file is left in place.
    assert!(generated.path.exists());
}

#[test]
fn test_rotated_file_survives_old_key_revocation() {
    let dir = TempDir::new().unwrap();
    let mut kms = InMemoryKms::with_keys(&["old-key", "new-key"]);
    let key = PrivateKey::from_bytes(&VALIDATOR_KEY).unwrap();

    let (old_path, rotated) = {
        let service = EnvelopeService::new(&kms);
        let generated = workflow::generate_with(&service, "old-key", dir.path(), &key).unwrap();
        let rotated = dir.path().join("rotated.bls");
        workflow::rotate(&service, &generated.path, &rotated, "new-key").unwrap();
        (generated.path, rotated)
    };

    kms.revoke_key("old-key");
    let service = EnvelopeService::new(&kms);

    assert!(workflow::pubkey(&service, &old_path).is_err());
    assert_eq!(workflow::pubkey(&service, &rotated).unwrap(), key.public_key());
}

#[test]
fn test_full_lifecycle_convert_rotate_pubkey() {
    let dir = TempDir::new().unwrap();
    let service = service(&["stage-1", "stage-2"]);
    let key = PrivateKey::from_bytes(&VALIDATOR_KEY).unwrap();

    let legacy = dir.path().join("validator.key");
    let converted = dir.path().join("stage1.bls");
    let rotated = dir.path().join("stage2.bls");
    write_legacy_file(&legacy, &key, "correct horse battery staple");

    workflow::convert(
        &service,
        &legacy,
        "pass:correct horse battery staple",
        &converted,
        "stage-1",
    )
    .unwrap();
    workflow::rotate(&service, &converted, &rotated, "stage-2").unwrap();

    assert_eq!(workflow::pubkey(&service, &converted).unwrap(), key.public_key());
    assert_eq!(workflow::pubkey(&service, &rotated).unwrap(), key.public_key());
}

// ============================================================================
// pubkey
// ============================================================================

#[test]
fn test_pubkey_unavailable_service() {
    let dir = TempDir::new().unwrap();
    let key = PrivateKey::from_bytes(&VALIDATOR_KEY).unwrap();
    let generated =
        workflow::generate_with(&service(&["test-key"]), "test-key", dir.path(), &key).unwrap();

    let offline = EnvelopeService::new(InMemoryKms::offline());
    let err = workflow::pubkey(&offline, &generated.path).unwrap_err();

    assert!(matches!(err, WorkflowError::Service(_)));
    assert_eq!(err.exit_code(), EXIT_INFRASTRUCTURE);
}

#[test]
fn test_pubkey_of_non_hex_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let service = service(&["test-key"]);
    let path = dir.path().join("garbage.bls");
    fs::write(&path, "this is not hex").unwrap();

    let err = workflow::pubkey(&service, &path).unwrap_err();
    assert!(matches!(err, WorkflowError::KeyFile(_)));
    assert_eq!(service.client().decrypt_calls(), 0);
}
