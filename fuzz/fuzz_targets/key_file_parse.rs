#![no_main]

use std::io::Write;

use blskey_core::{keyfile, PrivateKey, PublicKey};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Key material parsers must reject garbage without panicking.
    let _ = PrivateKey::from_bytes(data);
    let _ = PublicKey::from_bytes(data);
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = PrivateKey::from_hex(text);
    }

    // Same for the key file reader.
    let Ok(mut file) = tempfile::NamedTempFile::new() else {
        return;
    };
    if file.write_all(data).is_ok() {
        let _ = keyfile::read(file.path());
    }
});
