//! BLS12-381 validator keys
//!
//! Thin wrapper over `blst` (min-pk variant: 32-byte secret scalars, 48-byte
//! compressed G1 public keys). The private key never implements `Display`
//! and its `Debug` output is redacted.
//!
//! # Serialization
//!
//! Keys are serialized the way Harmony's BLS library (mcl) does it, not in
//! the zcash/IETF layout `blst` uses natively:
//!
//! ```text
//! private key = scalar, 32 bytes little-endian
//! public key  = x coordinate, 48 bytes little-endian,
//!               top bit of the last byte set when y is odd
//! ```
//!
//! Conversion happens only at this boundary; everything inside `blst` stays
//! big-endian.

use std::fmt;

use blst::min_pk::{PublicKey as BlstPublicKey, SecretKey as BlstSecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::memory::SecretBytes;

/// Serialized private key length (little-endian scalar)
pub const PRIVATE_KEY_LEN: usize = 32;

/// Compressed public key length
pub const PUBLIC_KEY_LEN: usize = 48;

/// Input keying material fed to the BLS key generator
const IKM_LEN: usize = 32;

/// Parity flag in the last byte of a serialized public key
const ODD_Y_FLAG: u8 = 0x80;

/// zcash compressed-point flags, first byte of a `blst` compressed key
const ZCASH_COMPRESSED: u8 = 0x80;
const ZCASH_LARGER_Y: u8 = 0x20;
const ZCASH_FLAG_MASK: u8 = 0xE0;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Key generation failed: {0}")]
    GenerationFailed(String),
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}

/// A BLS private key held only for the duration of one operation.
pub struct PrivateKey {
    inner: BlstSecretKey,
}

impl PrivateKey {
    /// Generate a fresh key from OS randomness.
    pub fn generate() -> Result<Self, KeyError> {
        let mut ikm = Zeroizing::new([0u8; IKM_LEN]);
        OsRng.fill_bytes(&mut ikm[..]);
        let inner = BlstSecretKey::key_gen(&ikm[..], &[])
            .map_err(|e| KeyError::GenerationFailed(format!("{:?}", e)))?;
        Ok(Self { inner })
    }

    /// Deserialize a 32-byte little-endian scalar. Zero and values not
    /// below the group order are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(KeyError::InvalidPrivateKey(format!(
                "expected {} bytes, got {}",
                PRIVATE_KEY_LEN,
                bytes.len()
            )));
        }
        let mut big_endian = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
        big_endian.copy_from_slice(bytes);
        big_endian.reverse();

        let inner = BlstSecretKey::from_bytes(&big_endian[..])
            .map_err(|e| KeyError::InvalidPrivateKey(format!("{:?}", e)))?;
        Ok(Self { inner })
    }

    /// Deserialize the hex text form stored inside legacy key files.
    ///
    /// Surrounding whitespace is ignored.
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(text.trim())
            .map(Zeroizing::new)
            .map_err(|e| KeyError::InvalidPrivateKey(format!("not valid hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Serialize (little-endian) into a locked, self-wiping buffer.
    pub fn to_bytes(&self) -> SecretBytes {
        let mut bytes = Zeroizing::new(self.inner.to_bytes());
        bytes.reverse();
        SecretBytes::copy_from(&bytes[..])
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_point(&self.inner.sk_to_pk())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("inner", &"***SECRET***")
            .finish()
    }
}

/// A compressed BLS public key in Harmony's serialization. Safe to print
/// and log.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    bytes: [u8; PUBLIC_KEY_LEN],
}

impl PublicKey {
    fn from_point(point: &BlstPublicKey) -> Self {
        // Uncompressed blst form: x (48 bytes BE) || y (48 bytes BE).
        let affine = point.serialize();
        let (x, y) = affine.split_at(PUBLIC_KEY_LEN);

        let mut bytes = [0u8; PUBLIC_KEY_LEN];
        bytes.copy_from_slice(x);
        bytes.reverse();
        if y[PUBLIC_KEY_LEN - 1] & 1 == 1 {
            bytes[PUBLIC_KEY_LEN - 1] |= ODD_Y_FLAG;
        }
        Self { bytes }
    }

    /// Parse a serialized public key, checking it is a valid, non-identity
    /// group element in canonical encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let invalid = |what: &str| KeyError::InvalidPublicKey(what.to_owned());

        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(KeyError::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                PUBLIC_KEY_LEN,
                bytes.len()
            )));
        }

        let odd_y = bytes[PUBLIC_KEY_LEN - 1] & ODD_Y_FLAG != 0;
        let mut zcash = [0u8; PUBLIC_KEY_LEN];
        zcash.copy_from_slice(bytes);
        zcash[PUBLIC_KEY_LEN - 1] &= !ODD_Y_FLAG;
        zcash.reverse();
        if zcash[0] & ZCASH_FLAG_MASK != 0 {
            return Err(invalid("x coordinate out of range"));
        }
        zcash[0] |= ZCASH_COMPRESSED;

        // zcash picks y by size, mcl by parity: try the smaller root and
        // switch if its parity is wrong (p is odd, so -y flips parity).
        let mut point = BlstPublicKey::uncompress(&zcash)
            .map_err(|e| KeyError::InvalidPublicKey(format!("{:?}", e)))?;
        if Self::from_point(&point).has_odd_y() != odd_y {
            zcash[0] |= ZCASH_LARGER_Y;
            point = BlstPublicKey::uncompress(&zcash)
                .map_err(|e| KeyError::InvalidPublicKey(format!("{:?}", e)))?;
        }
        point
            .validate()
            .map_err(|e| KeyError::InvalidPublicKey(format!("{:?}", e)))?;

        let parsed = Self::from_point(&point);
        if parsed.bytes[..] != bytes[..] {
            return Err(invalid("non-canonical encoding"));
        }
        Ok(parsed)
    }

    fn has_odd_y(&self) -> bool {
        self.bytes[PUBLIC_KEY_LEN - 1] & ODD_Y_FLAG != 0
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.bytes
    }

    /// Lowercase hex, as used in key file names.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}
