//! Elliptic curve operations on secp256k1.
//!
//! The virtual machine and compiler never call the curve implementation
//! directly: they receive a [`Secp256k1`] capability. [`NativeSecp256k1`]
//! is the default implementation backed by `k256`.

pub mod schnorr;
pub mod signature;

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, ProjectivePoint, PublicKey, Scalar};

pub use signature::DerSignature;

use crate::PrimitivesError;

/// The signature scheme capability consumed by the VM and compiler.
///
/// All message hashes are 32-byte digests. Public keys are SEC1-encoded
/// (compressed or uncompressed) and private keys are 32-byte scalars.
pub trait Secp256k1: Send + Sync {
    /// Verify a 64-byte BCH Schnorr signature.
    fn verify_signature_schnorr(&self, signature: &[u8], public_key: &[u8], message_hash: &[u8]) -> bool;

    /// Verify a DER-encoded ECDSA signature, rejecting high-S values.
    fn verify_signature_der_low_s(&self, signature: &[u8], public_key: &[u8], message_hash: &[u8]) -> bool;

    /// Derive the 33-byte compressed public key for a private key.
    fn derive_public_key_compressed(&self, private_key: &[u8]) -> Result<Vec<u8>, PrimitivesError>;

    /// Produce a 64-byte BCH Schnorr signature.
    fn sign_message_hash_schnorr(&self, private_key: &[u8], message_hash: &[u8]) -> Result<Vec<u8>, PrimitivesError>;

    /// Produce a low-S DER-encoded ECDSA signature.
    fn sign_message_hash_der(&self, private_key: &[u8], message_hash: &[u8]) -> Result<Vec<u8>, PrimitivesError>;

    /// Compute `(private_key + tweak) mod n`.
    fn add_tweak_private_key(&self, private_key: &[u8], tweak: &[u8]) -> Result<Vec<u8>, PrimitivesError>;

    /// Compute `P + tweak * G`, returning the compressed encoding.
    fn add_tweak_public_key_compressed(&self, public_key: &[u8], tweak: &[u8]) -> Result<Vec<u8>, PrimitivesError>;
}

/// The default `k256`-backed implementation of [`Secp256k1`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSecp256k1;

impl Secp256k1 for NativeSecp256k1 {
    fn verify_signature_schnorr(&self, signature: &[u8], public_key: &[u8], message_hash: &[u8]) -> bool {
        schnorr::verify(signature, public_key, message_hash)
    }

    fn verify_signature_der_low_s(&self, signature: &[u8], public_key: &[u8], message_hash: &[u8]) -> bool {
        match DerSignature::from_der(signature) {
            Ok(parsed) => parsed.is_low_s() && parsed.verify(message_hash, public_key),
            Err(_) => false,
        }
    }

    fn derive_public_key_compressed(&self, private_key: &[u8]) -> Result<Vec<u8>, PrimitivesError> {
        derive_public_key_compressed(private_key)
    }

    fn sign_message_hash_schnorr(&self, private_key: &[u8], message_hash: &[u8]) -> Result<Vec<u8>, PrimitivesError> {
        schnorr::sign(private_key, message_hash).map(|signature| signature.to_vec())
    }

    fn sign_message_hash_der(&self, private_key: &[u8], message_hash: &[u8]) -> Result<Vec<u8>, PrimitivesError> {
        DerSignature::sign(message_hash, private_key).map(|signature| signature.to_der())
    }

    fn add_tweak_private_key(&self, private_key: &[u8], tweak: &[u8]) -> Result<Vec<u8>, PrimitivesError> {
        let key = parse_scalar(private_key)
            .ok_or_else(|| PrimitivesError::InvalidPrivateKey("out of range".to_string()))?;
        let tweak = parse_scalar(tweak)
            .ok_or_else(|| PrimitivesError::InvalidTweak("out of range".to_string()))?;
        let sum = key + tweak;
        if bool::from(sum.is_zero()) {
            return Err(PrimitivesError::InvalidTweak("tweaked key is zero".to_string()));
        }
        Ok(sum.to_bytes().to_vec())
    }

    fn add_tweak_public_key_compressed(&self, public_key: &[u8], tweak: &[u8]) -> Result<Vec<u8>, PrimitivesError> {
        let point = PublicKey::from_sec1_bytes(public_key)
            .map_err(|e| PrimitivesError::InvalidPublicKey(e.to_string()))?;
        let tweak = parse_scalar(tweak)
            .ok_or_else(|| PrimitivesError::InvalidTweak("out of range".to_string()))?;
        let tweaked = point.to_projective() + ProjectivePoint::GENERATOR * tweak;
        let encoded = tweaked.to_affine().to_encoded_point(true);
        if encoded.is_identity() {
            return Err(PrimitivesError::InvalidTweak("tweaked key is infinity".to_string()));
        }
        Ok(encoded.as_bytes().to_vec())
    }
}

/// Derive the compressed public key for a 32-byte private key.
///
/// # Arguments
/// * `private_key` - The 32-byte private key.
///
/// # Returns
/// The 33-byte compressed SEC1 public key, or an error if the key is zero
/// or not less than the curve order.
pub fn derive_public_key_compressed(private_key: &[u8]) -> Result<Vec<u8>, PrimitivesError> {
    let scalar = parse_scalar(private_key)
        .filter(|scalar| !bool::from(scalar.is_zero()))
        .ok_or_else(|| PrimitivesError::InvalidPrivateKey("out of range".to_string()))?;
    let point = (ProjectivePoint::GENERATOR * scalar).to_affine();
    Ok(point.to_encoded_point(true).as_bytes().to_vec())
}

fn parse_scalar(bytes: &[u8]) -> Option<Scalar> {
    if bytes.len() != 32 {
        return None;
    }
    Option::from(Scalar::from_repr(*FieldBytes::from_slice(bytes)))
}
