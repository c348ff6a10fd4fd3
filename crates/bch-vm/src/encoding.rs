//! Public key and signature encoding rules.

use bch_transaction::signing_serialization::is_defined_signing_serialization_type;

/// The length of a BCH Schnorr signature (without a type byte).
pub const SCHNORR_SIGNATURE_LENGTH: usize = 64;

const DER_MINIMUM_LENGTH: usize = 8;
const DER_MAXIMUM_LENGTH: usize = 72;
const SEQUENCE_TAG: u8 = 0x30;
const INTEGER_TAG: u8 = 0x02;
/// Sequence tag + length, both integer tags + lengths, and one byte of `s`.
const MINIMUM_NON_R_VALUE_BYTES: usize = 7;

/// Whether `public_key` is a 33-byte compressed or 65-byte uncompressed
/// SEC1 encoding.
pub fn is_valid_public_key_encoding(public_key: &[u8]) -> bool {
    match public_key {
        [0x02 | 0x03, ..] => public_key.len() == 33,
        [0x04, ..] => public_key.len() == 65,
        _ => false,
    }
}

fn is_negative(byte: u8) -> bool {
    byte & 0x80 != 0
}

fn is_valid_integer(signature: &[u8], tag_index: usize, length: usize, value_index: usize) -> bool {
    let first = signature.get(value_index).copied().unwrap_or(0);
    let second = signature.get(value_index + 1).copied().unwrap_or(0);
    let unnecessary_padding = length > 1 && first == 0 && !is_negative(second);
    signature.get(tag_index) == Some(&INTEGER_TAG) && length != 0 && !is_negative(first) && !unnecessary_padding
}

/// Whether `signature` is a strictly-encoded DER signature.
pub fn is_valid_signature_encoding_der(signature: &[u8]) -> bool {
    let length = signature.len();
    if length <= DER_MINIMUM_LENGTH || length >= DER_MAXIMUM_LENGTH {
        return false;
    }
    if signature[0] != SEQUENCE_TAG || signature[1] as usize != length - 2 {
        return false;
    }
    let r_length = signature[3] as usize;
    if r_length > length - MINIMUM_NON_R_VALUE_BYTES || !is_valid_integer(signature, 2, r_length, 4) {
        return false;
    }
    let s_tag_index = 4 + r_length;
    let Some(&s_length) = signature.get(s_tag_index + 1) else {
        return false;
    };
    let s_length = s_length as usize;
    let s_value_index = s_tag_index + 2;
    s_value_index + s_length == length && is_valid_integer(signature, s_tag_index, s_length, s_value_index)
}

/// Whether `signature` is a valid transaction signature: empty, or a
/// Schnorr or DER signature followed by an allowed signing serialization
/// type byte.
pub fn is_valid_signature_encoding_transaction(signature: &[u8], allowed_types: &[u8]) -> bool {
    let Some((&signing_serialization_type, raw)) = signature.split_last() else {
        return true;
    };
    is_defined_signing_serialization_type(signing_serialization_type, allowed_types)
        && (raw.len() == SCHNORR_SIGNATURE_LENGTH || is_valid_signature_encoding_der(raw))
}

/// Whether `signature` is a valid data signature: empty, Schnorr or DER.
pub fn is_valid_signature_encoding_raw(signature: &[u8]) -> bool {
    signature.is_empty() || signature.len() == SCHNORR_SIGNATURE_LENGTH || is_valid_signature_encoding_der(signature)
}

/// Split a transaction signature into its raw signature and type byte.
pub fn decode_transaction_signature(signature: &[u8]) -> (&[u8], u8) {
    match signature.split_last() {
        Some((&signing_serialization_type, raw)) => (raw, signing_serialization_type),
        None => (signature, 0),
    }
}
