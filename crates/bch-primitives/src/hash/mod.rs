//! Hash function primitives.
//!
//! Provides SHA-1, SHA-256, double SHA-256, RIPEMD-160, Hash160, SHA-512
//! and HMAC-SHA256 as free functions, plus the capability traits through
//! which the virtual machine and compiler consume hashing. Callers inject
//! an implementation of each trait; [`NativeHash`] is the default bundle
//! backed by the RustCrypto crates.

use hmac::{Hmac, Mac};
use ripemd::Ripemd160 as Ripemd160Hasher;
use sha1::Sha1 as Sha1Hasher;
use sha2::{Digest, Sha256 as Sha256Hasher, Sha512 as Sha512Hasher};

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// A SHA-1 implementation.
pub trait Sha1: Send + Sync {
    /// Hash `input`, returning the 20-byte digest.
    fn hash(&self, input: &[u8]) -> [u8; 20];
}

/// A SHA-256 implementation.
pub trait Sha256: Send + Sync {
    /// Hash `input`, returning the 32-byte digest.
    fn hash(&self, input: &[u8]) -> [u8; 32];
}

/// A SHA-512 implementation.
pub trait Sha512: Send + Sync {
    /// Hash `input`, returning the 64-byte digest.
    fn hash(&self, input: &[u8]) -> [u8; 64];
}

/// A RIPEMD-160 implementation.
pub trait Ripemd160: Send + Sync {
    /// Hash `input`, returning the 20-byte digest.
    fn hash(&self, input: &[u8]) -> [u8; 20];
}

/// The default hash provider, implementing every hash capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeHash;

impl Sha1 for NativeHash {
    fn hash(&self, input: &[u8]) -> [u8; 20] {
        sha1(input)
    }
}

impl Sha256 for NativeHash {
    fn hash(&self, input: &[u8]) -> [u8; 32] {
        sha256(input)
    }
}

impl Sha512 for NativeHash {
    fn hash(&self, input: &[u8]) -> [u8; 64] {
        sha512(input)
    }
}

impl Ripemd160 for NativeHash {
    fn hash(&self, input: &[u8]) -> [u8; 20] {
        ripemd160(input)
    }
}

/// Double SHA-256 through an injected [`Sha256`] capability.
pub fn hash256_with(sha256: &dyn Sha256, data: &[u8]) -> [u8; 32] {
    sha256.hash(&sha256.hash(data))
}

/// RIPEMD-160 of SHA-256 through injected capabilities.
pub fn hash160_with(sha256: &dyn Sha256, ripemd160: &dyn Ripemd160, data: &[u8]) -> [u8; 20] {
    ripemd160.hash(&sha256.hash(data))
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Compute SHA-1 hash of the input data.
///
/// # Arguments
/// * `data` - Byte slice to hash.
///
/// # Returns
/// A 20-byte SHA-1 digest.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1Hasher::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute SHA-256 hash of the input data.
///
/// # Arguments
/// * `data` - Byte slice to hash.
///
/// # Returns
/// A 32-byte SHA-256 digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256Hasher::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute double SHA-256 (SHA-256d) hash of the input data.
///
/// This is the hash used for transaction identifiers, signing
/// serialization digests and `OP_HASH256`.
///
/// # Arguments
/// * `data` - Byte slice to hash.
///
/// # Returns
/// A 32-byte double-SHA-256 digest.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Compute RIPEMD-160 hash of the input data.
///
/// # Arguments
/// * `data` - Byte slice to hash.
///
/// # Returns
/// A 20-byte RIPEMD-160 digest.
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    let mut hasher = Ripemd160Hasher::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute Hash160: RIPEMD-160(SHA-256(data)).
///
/// Used by P2PKH and P2SH20 locking bytecode.
///
/// # Arguments
/// * `data` - Byte slice to hash.
///
/// # Returns
/// A 20-byte Hash160 digest.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(&sha256(data))
}

/// Compute SHA-512 hash of the input data.
///
/// # Arguments
/// * `data` - Byte slice to hash.
///
/// # Returns
/// A 64-byte SHA-512 digest.
pub fn sha512(data: &[u8]) -> [u8; 64] {
    let mut hasher = Sha512Hasher::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute HMAC-SHA256 of the input data with the given key.
///
/// # Arguments
/// * `key` - The HMAC key bytes.
/// * `data` - The message bytes to authenticate.
///
/// # Returns
/// A 32-byte HMAC-SHA256 tag.
pub fn sha256_hmac(key: &[u8], data: &[u8]) -> [u8; 32] {
    type HmacSha256 = Hmac<Sha256Hasher>;
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}
