#![no_main]

use blskey_core::legacy;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Split the input into a passphrase and a blob. Decryption must always
    // return Ok or Err, whatever the blob looks like.
    let (passphrase, blob) = match data.split_first() {
        Some((&n, rest)) => rest.split_at((n as usize).min(rest.len())),
        None => return,
    };
    let _ = legacy::decrypt(blob, passphrase);
});
