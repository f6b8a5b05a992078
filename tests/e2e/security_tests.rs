//! Security-specific tests.
//!
//! These tests verify:
//! 1. Legacy decryption rejects tampered and malformed input
//! 2. Secrets never show up in Debug output or error messages
//! 3. Malformed inputs don't panic
//! 4. Key files are private to the owner

use std::fs;

use blskey_core::legacy::{self, LegacyError, NONCE_LEN, TAG_LEN};
use blskey_core::test_utils::{legacy_seal, InMemoryKms};
use blskey_core::workflow;
use blskey_core::{
    EnvelopeService, KmsClient, PassphraseSource, PrivateKey, PublicKey, SecretBytes,
};
use rand::{Rng, RngCore};
use tempfile::TempDir;

const KEY_HEX: &str = "0101010101010101010101010101010101010101010101010101010101010101";

// ============================================================================
// 1. Legacy Decryption
// ============================================================================

#[test]
fn test_wrong_passphrase_fails_decryption() {
    let sealed = hex::encode(legacy_seal(KEY_HEX.as_bytes(), "correct horse"));
    let result = legacy::decrypt(sealed.as_bytes(), b"wrong horse");
    assert!(matches!(result, Err(LegacyError::Authentication)));
}

#[test]
fn test_passphrase_trailing_newlines_are_ignored() {
    let sealed = hex::encode(legacy_seal(KEY_HEX.as_bytes(), "hunter2"));
    let plaintext = legacy::decrypt(sealed.as_bytes(), b"hunter2\n\n").unwrap();
    assert_eq!(plaintext.as_slice(), KEY_HEX.as_bytes());

    // Only newlines: a trailing space is part of the passphrase.
    assert!(legacy::decrypt(sealed.as_bytes(), b"hunter2 ").is_err());
}

#[test]
fn test_every_tampered_byte_fails_decryption() {
    let raw = legacy_seal(KEY_HEX.as_bytes(), "hunter2");
    for i in 0..raw.len() {
        let mut tampered = raw.clone();
        tampered[i] ^= 0x01;
        let result = legacy::decrypt(hex::encode(&tampered).as_bytes(), b"hunter2");
        assert!(result.is_err(), "flipping byte {} should fail", i);
    }
}

#[test]
fn test_truncated_blob_fails() {
    let raw = legacy_seal(KEY_HEX.as_bytes(), "hunter2");
    let short = hex::encode(&raw[..NONCE_LEN + TAG_LEN - 1]);
    assert!(matches!(
        legacy::decrypt(short.as_bytes(), b"hunter2"),
        Err(LegacyError::Truncated { .. })
    ));
}

#[test]
fn test_legacy_random_input_never_panics() {
    let mut rng = rand::thread_rng();
    for _ in 0..500 {
        let len = rng.gen_range(0..200);
        let mut data = vec![0u8; len];
        rng.fill_bytes(&mut data);
        assert!(legacy::decrypt(&data, b"hunter2").is_err());
    }
}

// ============================================================================
// 2. Secret Leakage
// ============================================================================

#[test]
fn test_private_key_debug_is_redacted() {
    let key = PrivateKey::from_hex(KEY_HEX).unwrap();
    let rendered = format!("{:?}", key);
    assert!(!rendered.contains(KEY_HEX));
    assert!(!rendered.contains("0101"));
}

#[test]
fn test_secret_bytes_debug_is_redacted() {
    let secret = SecretBytes::copy_from(b"very secret bytes");
    let rendered = format!("{:?}", secret);
    assert!(!rendered.contains("very secret"));
}

#[test]
fn test_literal_passphrase_not_in_debug_or_errors() {
    let source: PassphraseSource = "pass:hunter2".parse().unwrap();
    assert!(!format!("{:?}", source).contains("hunter2"));

    let err = "nope:hunter2".parse::<PassphraseSource>().unwrap_err();
    assert!(!err.to_string().contains("hunter2"));
}

#[test]
fn test_wrong_passphrase_error_does_not_echo_passphrase() {
    let dir = TempDir::new().unwrap();
    let service = EnvelopeService::new(InMemoryKms::with_keys(&["test-key"]));

    let legacy_file = dir.path().join("validator.key");
    fs::write(
        &legacy_file,
        hex::encode(legacy_seal(KEY_HEX.as_bytes(), "hunter2")),
    )
    .unwrap();

    let err = workflow::convert(
        &service,
        &legacy_file,
        "pass:not-the-passphrase",
        &dir.path().join("out.bls"),
        "test-key",
    )
    .unwrap_err();

    let message = err.to_string();
    assert!(!message.contains("not-the-passphrase"));
    assert!(!message.contains("hunter2"));
}

#[test]
fn test_key_file_never_contains_plaintext_key() {
    let dir = TempDir::new().unwrap();
    let service = EnvelopeService::new(InMemoryKms::with_keys(&["test-key"]));
    let key = PrivateKey::from_hex(KEY_HEX).unwrap();

    let generated = workflow::generate_with(&service, "test-key", dir.path(), &key).unwrap();
    let contents = fs::read_to_string(&generated.path).unwrap();
    assert!(!contents.contains(KEY_HEX));

    let blob = hex::decode(&contents).unwrap();
    assert!(!blob.windows(32).any(|w| w == [0x01; 32]));
    assert_eq!(service.client().encrypt_calls(), 1);
}

// ============================================================================
// 3. Malformed Input
// ============================================================================

#[test]
fn test_private_key_rejects_bad_lengths_and_scalars() {
    assert!(PrivateKey::from_bytes(&[]).is_err());
    assert!(PrivateKey::from_bytes(&[0x01; 31]).is_err());
    assert!(PrivateKey::from_bytes(&[0x01; 33]).is_err());
    assert!(PrivateKey::from_bytes(&[0x00; 32]).is_err());
    assert!(PrivateKey::from_bytes(&[0xFF; 32]).is_err());
    assert!(PrivateKey::from_hex("zz").is_err());
}

#[test]
fn test_public_key_random_bytes_never_panic() {
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let len = rng.gen_range(0..100);
        let mut data = vec![0u8; len];
        rng.fill_bytes(&mut data);
        let _ = PublicKey::from_bytes(&data);
    }
}

#[test]
fn test_passphrase_descriptor_garbage_never_panics() {
    for descriptor in [
        "", ":", "pass", "pass:", "env:", "file:", "fd:", "fd:-1", "fd:x", "fd:99999999999",
        "stdin:", "STDIN", "\u{0}", "fd:\u{663}", "ünïcødé:x",
    ] {
        let _ = descriptor.parse::<PassphraseSource>();
    }
}

// ============================================================================
// 4. Key File Permissions
// ============================================================================

#[cfg(unix)]
#[test]
fn test_generated_key_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let service = EnvelopeService::new(InMemoryKms::with_keys(&["test-key"]));
    let generated = workflow::generate(&service, "test-key", dir.path()).unwrap();

    let mode = fs::metadata(&generated.path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
