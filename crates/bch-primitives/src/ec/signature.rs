//! ECDSA signatures with DER serialization and low-S rules.
//!
//! Supports DER encoding/decoding, low-S detection and normalization,
//! RFC6979 deterministic signing and verification of 32-byte message
//! hashes.

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{self, SigningKey, VerifyingKey};

use crate::PrimitivesError;

/// The secp256k1 curve order N.
/// N = FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141
pub(crate) const CURVE_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFE, 0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36,
    0x41, 0x41,
];

/// Half of the secp256k1 curve order (N/2), the largest low-S value.
const HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B,
    0x20, 0xA0,
];

/// An ECDSA signature with R and S components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerSignature {
    r: [u8; 32],
    s: [u8; 32],
}

impl DerSignature {
    /// Create a signature from raw R and S 32-byte arrays.
    pub fn new(r: [u8; 32], s: [u8; 32]) -> Self {
        DerSignature { r, s }
    }

    /// The R component (32 bytes, big-endian).
    pub fn r(&self) -> &[u8; 32] {
        &self.r
    }

    /// The S component (32 bytes, big-endian).
    pub fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// Parse a DER-encoded ECDSA signature.
    ///
    /// Expected format: 0x30 <len> 0x02 <r_len> <r> 0x02 <s_len> <s>
    ///
    /// # Arguments
    /// * `bytes` - DER-encoded signature bytes (without a signing serialization type).
    ///
    /// # Returns
    /// `Ok(DerSignature)` on success, or an error if the DER encoding is malformed
    /// or either component is out of range.
    pub fn from_der(bytes: &[u8]) -> Result<Self, PrimitivesError> {
        if bytes.len() < 8 {
            return Err(PrimitivesError::InvalidSignature(
                "malformed signature: too short".to_string(),
            ));
        }
        if bytes[0] != 0x30 {
            return Err(PrimitivesError::InvalidSignature(
                "malformed signature: no header magic".to_string(),
            ));
        }
        let sig_len = bytes[1] as usize;
        if sig_len + 2 != bytes.len() {
            return Err(PrimitivesError::InvalidSignature(
                "malformed signature: bad length".to_string(),
            ));
        }

        let mut idx = 2;
        let r_bytes = read_der_integer(bytes, &mut idx, "R")?;
        let s_bytes = read_der_integer(bytes, &mut idx, "S")?;
        if idx != bytes.len() {
            return Err(PrimitivesError::InvalidSignature(
                "malformed signature: trailing bytes".to_string(),
            ));
        }

        let r = to_32_bytes(r_bytes)?;
        let s = to_32_bytes(s_bytes)?;
        if is_zero(&r) || is_zero(&s) {
            return Err(PrimitivesError::InvalidSignature(
                "signature component is zero".to_string(),
            ));
        }
        if !is_less_than(&r, &CURVE_ORDER) || !is_less_than(&s, &CURVE_ORDER) {
            return Err(PrimitivesError::InvalidSignature(
                "signature component is >= curve.N".to_string(),
            ));
        }
        Ok(DerSignature { r, s })
    }

    /// Return `true` if S is in the lower half of the curve order.
    pub fn is_low_s(&self) -> bool {
        !is_greater_than(&self.s, &HALF_ORDER)
    }

    /// Serialize the signature in DER format with low-S normalization.
    pub fn to_der(&self) -> Vec<u8> {
        let s = if self.is_low_s() {
            self.s
        } else {
            subtract_from_order(&self.s)
        };

        let rb = canonicalize_int(&self.r);
        let sb = canonicalize_int(&s);

        let total_len = 6 + rb.len() + sb.len();
        let mut out = Vec::with_capacity(total_len);
        out.push(0x30);
        out.push((total_len - 2) as u8);
        out.push(0x02);
        out.push(rb.len() as u8);
        out.extend_from_slice(&rb);
        out.push(0x02);
        out.push(sb.len() as u8);
        out.extend_from_slice(&sb);
        out
    }

    /// Sign a 32-byte message hash using RFC6979 deterministic nonces.
    ///
    /// # Arguments
    /// * `message_hash` - The 32-byte digest to sign.
    /// * `private_key` - The 32-byte private key.
    ///
    /// # Returns
    /// A low-S normalized signature, or an error if the key is invalid.
    pub fn sign(message_hash: &[u8], private_key: &[u8]) -> Result<Self, PrimitivesError> {
        let signing_key = SigningKey::from_slice(private_key)
            .map_err(|e| PrimitivesError::InvalidPrivateKey(e.to_string()))?;
        let signature: ecdsa::Signature = signing_key
            .sign_prehash(message_hash)
            .map_err(|e| PrimitivesError::InvalidSignature(e.to_string()))?;
        let signature = signature.normalize_s().unwrap_or(signature);
        let (r_bytes, s_bytes) = signature.split_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&r_bytes);
        s.copy_from_slice(&s_bytes);
        Ok(DerSignature { r, s })
    }

    /// Verify this signature against a message hash and SEC1-encoded public key.
    ///
    /// # Returns
    /// `true` if the signature is valid, `false` otherwise.
    pub fn verify(&self, message_hash: &[u8], public_key: &[u8]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(public_key) else {
            return false;
        };
        let Ok(signature) = ecdsa::Signature::from_scalars(
            k256::FieldBytes::from(self.r),
            k256::FieldBytes::from(self.s),
        ) else {
            return false;
        };
        verifying_key.verify_prehash(message_hash, &signature).is_ok()
    }
}

fn read_der_integer<'a>(
    data: &'a [u8],
    idx: &mut usize,
    name: &str,
) -> Result<&'a [u8], PrimitivesError> {
    if data.get(*idx) != Some(&0x02) {
        return Err(PrimitivesError::InvalidSignature(format!(
            "malformed signature: no {} int marker",
            name
        )));
    }
    let len = *data.get(*idx + 1).ok_or_else(|| {
        PrimitivesError::InvalidSignature(format!("malformed signature: missing {} length", name))
    })? as usize;
    let start = *idx + 2;
    if len == 0 || start + len > data.len() {
        return Err(PrimitivesError::InvalidSignature(format!(
            "malformed signature: bogus {} length",
            name
        )));
    }
    *idx = start + len;
    Ok(&data[start..start + len])
}

/// Convert a variable-length big-endian integer to a fixed 32-byte array.
fn to_32_bytes(bytes: &[u8]) -> Result<[u8; 32], PrimitivesError> {
    let trimmed = match bytes.iter().position(|&b| b != 0) {
        Some(pos) => &bytes[pos..],
        None => &[],
    };
    if trimmed.len() > 32 {
        return Err(PrimitivesError::InvalidSignature(
            "signature component too large".to_string(),
        ));
    }
    let mut out = [0u8; 32];
    out[32 - trimmed.len()..].copy_from_slice(trimmed);
    Ok(out)
}

/// Strip leading zeros and add a 0x00 pad if the high bit is set.
fn canonicalize_int(val: &[u8; 32]) -> Vec<u8> {
    let start = val.iter().position(|&b| b != 0).unwrap_or(31);
    let mut out = Vec::with_capacity(33);
    if val[start] & 0x80 != 0 {
        out.push(0x00);
    }
    out.extend_from_slice(&val[start..]);
    out
}

fn is_zero(val: &[u8; 32]) -> bool {
    val.iter().all(|&b| b == 0)
}

pub(crate) fn is_less_than(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a < b
}

fn is_greater_than(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a > b
}

/// Compute N - val for low-S normalization.
fn subtract_from_order(val: &[u8; 32]) -> [u8; 32] {
    let mut result = [0u8; 32];
    let mut borrow: i16 = 0;
    for i in (0..32).rev() {
        let diff = CURVE_ORDER[i] as i16 - val[i] as i16 - borrow;
        if diff < 0 {
            result[i] = (diff + 256) as u8;
            borrow = 1;
        } else {
            result[i] = diff as u8;
            borrow = 0;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE_KEY: [u8; 32] = [1u8; 32];

    fn public_key() -> Vec<u8> {
        crate::ec::derive_public_key_compressed(&PRIVATE_KEY).unwrap()
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let hash = crate::hash::sha256(b"message");
        let sig = DerSignature::sign(&hash, &PRIVATE_KEY).unwrap();
        assert!(sig.is_low_s());
        assert!(sig.verify(&hash, &public_key()));
        let other = crate::hash::sha256(b"other");
        assert!(!sig.verify(&other, &public_key()));
    }

    #[test]
    fn test_der_roundtrip() {
        let hash = crate::hash::sha256(b"der");
        let sig = DerSignature::sign(&hash, &PRIVATE_KEY).unwrap();
        let der = sig.to_der();
        assert_eq!(DerSignature::from_der(&der).unwrap(), sig);
    }

    #[test]
    fn test_high_s_detected() {
        let hash = crate::hash::sha256(b"high");
        let sig = DerSignature::sign(&hash, &PRIVATE_KEY).unwrap();
        let high = DerSignature::new(*sig.r(), subtract_from_order(sig.s()));
        assert!(!high.is_low_s());
        assert_eq!(high.to_der(), sig.to_der());
    }

    #[test]
    fn test_from_der_rejects_garbage() {
        assert!(DerSignature::from_der(&[0x30, 0x01]).is_err());
        assert!(DerSignature::from_der(&[0x31, 6, 2, 1, 1, 2, 1, 1]).is_err());
        assert!(DerSignature::from_der(&[0x30, 6, 2, 1, 0, 2, 1, 1]).is_err());
        assert!(DerSignature::from_der(&[0x30, 7, 2, 1, 1, 2, 1, 1]).is_err());
    }
}
