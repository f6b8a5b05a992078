#![no_main]

use blskey_core::PassphraseSource;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Descriptor parsing must never panic, and a literal passphrase must
    // never show up in Debug output.
    let Ok(descriptor) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(source @ PassphraseSource::Literal(_)) = descriptor.parse::<PassphraseSource>() {
        let secret = &descriptor["pass:".len()..];
        if secret.len() > 24 {
            assert!(!format!("{:?}", source).contains(secret));
        }
    }
});
