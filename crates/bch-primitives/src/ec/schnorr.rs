//! Bitcoin Cash Schnorr signatures over secp256k1.
//!
//! Signatures are 64 bytes: the x coordinate of the nonce point `R`
//! followed by `s`. The challenge is `SHA256(R.x || P || m)` where `P` is
//! the compressed public key, and `R.y` must be a quadratic residue.
//! Nonces are derived deterministically with RFC6979 HMAC-SHA256 using the
//! additional data `"Schnorr+SHA256  "`.

use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{AffinePoint, FieldBytes, ProjectivePoint, PublicKey, Scalar, U256};
use num_bigint::BigUint;
use num_traits::One;

use crate::hash::{sha256, sha256_hmac};
use crate::PrimitivesError;

/// Length of a Schnorr signature without a signing serialization type.
pub const SCHNORR_SIGNATURE_LENGTH: usize = 64;

const NONCE_ALGORITHM: &[u8; 16] = b"Schnorr+SHA256  ";

/// The secp256k1 field prime.
const FIELD_PRIME: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE, 0xFF, 0xFF,
    0xFC, 0x2F,
];

/// Sign a 32-byte message hash.
///
/// # Arguments
/// * `private_key` - The 32-byte private key.
/// * `message_hash` - The 32-byte message hash.
///
/// # Returns
/// The 64-byte signature, or an error if the private key is invalid.
pub fn sign(private_key: &[u8], message_hash: &[u8]) -> Result<[u8; 64], PrimitivesError> {
    let secret = parse_private_key(private_key)?;
    let public_key = compressed_point(&(ProjectivePoint::GENERATOR * secret).to_affine())?;

    let mut attempt = 0u32;
    loop {
        let k = rfc6979_nonce(private_key, message_hash, attempt);
        attempt += 1;
        let Some(mut nonce) = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(k))) else {
            continue;
        };
        if bool::from(nonce.is_zero()) {
            continue;
        }
        let r_point = (ProjectivePoint::GENERATOR * nonce).to_affine();
        let (r_x, r_y) = affine_coordinates(&r_point)?;
        if !is_quadratic_residue(&r_y) {
            nonce = -nonce;
        }
        let e = challenge(&r_x, &public_key, message_hash);
        let s = nonce + e * secret;

        let mut signature = [0u8; 64];
        signature[..32].copy_from_slice(&r_x);
        signature[32..].copy_from_slice(&s.to_bytes());
        return Ok(signature);
    }
}

/// Verify a 64-byte signature against a SEC1-encoded public key.
///
/// # Returns
/// `true` if the signature is valid, `false` otherwise.
pub fn verify(signature: &[u8], public_key: &[u8], message_hash: &[u8]) -> bool {
    if signature.len() != SCHNORR_SIGNATURE_LENGTH {
        return false;
    }
    let Ok(point) = PublicKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let mut r_x = [0u8; 32];
    r_x.copy_from_slice(&signature[..32]);
    if r_x >= FIELD_PRIME {
        return false;
    }
    let Some(s) = Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(
        &signature[32..],
    ))) else {
        return false;
    };

    let Ok(compressed) = compressed_point(point.as_affine()) else {
        return false;
    };
    let e = challenge(&r_x, &compressed, message_hash);
    let r_point = (ProjectivePoint::GENERATOR * s - point.to_projective() * e).to_affine();
    let Ok((x, y)) = affine_coordinates(&r_point) else {
        return false;
    };
    is_quadratic_residue(&y) && x == r_x
}

fn parse_private_key(private_key: &[u8]) -> Result<Scalar, PrimitivesError> {
    if private_key.len() != 32 {
        return Err(PrimitivesError::InvalidPrivateKey(format!(
            "expected 32 bytes, got {}",
            private_key.len()
        )));
    }
    let scalar = Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(private_key)))
        .ok_or_else(|| PrimitivesError::InvalidPrivateKey("out of range".to_string()))?;
    if bool::from(scalar.is_zero()) {
        return Err(PrimitivesError::InvalidPrivateKey("zero".to_string()));
    }
    Ok(scalar)
}

fn challenge(r_x: &[u8; 32], public_key: &[u8], message_hash: &[u8]) -> Scalar {
    let mut preimage = Vec::with_capacity(32 + public_key.len() + message_hash.len());
    preimage.extend_from_slice(r_x);
    preimage.extend_from_slice(public_key);
    preimage.extend_from_slice(message_hash);
    let digest = sha256(&preimage);
    <Scalar as Reduce<U256>>::reduce(U256::from_be_slice(&digest))
}

fn compressed_point(point: &AffinePoint) -> Result<Vec<u8>, PrimitivesError> {
    let encoded = point.to_encoded_point(true);
    if encoded.is_identity() {
        return Err(PrimitivesError::InvalidPublicKey("point at infinity".to_string()));
    }
    Ok(encoded.as_bytes().to_vec())
}

fn affine_coordinates(point: &AffinePoint) -> Result<([u8; 32], [u8; 32]), PrimitivesError> {
    let encoded = point.to_encoded_point(false);
    match (encoded.x(), encoded.y()) {
        (Some(x), Some(y)) => {
            let mut out_x = [0u8; 32];
            let mut out_y = [0u8; 32];
            out_x.copy_from_slice(x);
            out_y.copy_from_slice(y);
            Ok((out_x, out_y))
        }
        _ => Err(PrimitivesError::InvalidPublicKey("point at infinity".to_string())),
    }
}

/// Euler's criterion: `y^((p - 1) / 2) == 1 (mod p)`.
fn is_quadratic_residue(y: &[u8; 32]) -> bool {
    let p = BigUint::from_bytes_be(&FIELD_PRIME);
    let exponent = (&p - BigUint::one()) >> 1;
    BigUint::from_bytes_be(y).modpow(&exponent, &p).is_one()
}

/// RFC6979 HMAC-SHA256 nonce generation, skipping `attempt` candidates.
fn rfc6979_nonce(private_key: &[u8], message_hash: &[u8], attempt: u32) -> [u8; 32] {
    let mut seed = Vec::with_capacity(32 + message_hash.len() + NONCE_ALGORITHM.len());
    seed.extend_from_slice(private_key);
    seed.extend_from_slice(message_hash);
    seed.extend_from_slice(NONCE_ALGORITHM);

    let mut v = [0x01u8; 32];
    let mut k = [0x00u8; 32];
    for marker in [0x00u8, 0x01] {
        let mut data = Vec::with_capacity(33 + seed.len());
        data.extend_from_slice(&v);
        data.push(marker);
        data.extend_from_slice(&seed);
        k = sha256_hmac(&k, &data);
        v = sha256_hmac(&k, &v);
    }

    for _ in 0..attempt {
        let mut data = v.to_vec();
        data.push(0x00);
        k = sha256_hmac(&k, &data);
        v = sha256_hmac(&k, &v);
    }
    sha256_hmac(&k, &v)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE_KEY: [u8; 32] = [
        0x12, 0xb0, 0x04, 0xff, 0xf7, 0xf4, 0xb6, 0x9e, 0xf8, 0x65, 0x0e, 0x76, 0x7f, 0x18, 0xf1,
        0x1e, 0xde, 0x15, 0x81, 0x48, 0xb4, 0x25, 0x66, 0x07, 0x23, 0xb9, 0xf9, 0xa6, 0x6e, 0x61,
        0xf7, 0x47,
    ];

    fn public_key() -> Vec<u8> {
        crate::ec::derive_public_key_compressed(&PRIVATE_KEY).unwrap()
    }

    #[test]
    fn test_sign_then_verify() {
        let hash = sha256(b"schnorr");
        let signature = sign(&PRIVATE_KEY, &hash).unwrap();
        assert!(verify(&signature, &public_key(), &hash));
    }

    #[test]
    fn test_signing_is_deterministic() {
        let hash = sha256(b"deterministic");
        assert_eq!(
            sign(&PRIVATE_KEY, &hash).unwrap(),
            sign(&PRIVATE_KEY, &hash).unwrap()
        );
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let hash = sha256(b"schnorr");
        let mut signature = sign(&PRIVATE_KEY, &hash).unwrap();
        assert!(!verify(&signature, &public_key(), &sha256(b"other")));
        signature[63] ^= 0x01;
        assert!(!verify(&signature, &public_key(), &hash));
        assert!(!verify(&signature[..63], &public_key(), &hash));
    }

    #[test]
    fn test_verify_with_uncompressed_key() {
        let hash = sha256(b"uncompressed");
        let signature = sign(&PRIVATE_KEY, &hash).unwrap();
        let point = PublicKey::from_sec1_bytes(&public_key()).unwrap();
        let uncompressed = point.to_encoded_point(false);
        assert!(verify(&signature, uncompressed.as_bytes(), &hash));
    }

    #[test]
    fn test_invalid_private_key() {
        assert!(sign(&[0u8; 32], &[0u8; 32]).is_err());
        assert!(sign(&[1u8; 31], &[0u8; 32]).is_err());
    }
}
