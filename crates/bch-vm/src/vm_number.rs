//! VM number encoding.
//!
//! Numbers on the evaluation stack are little-endian sign-magnitude
//! integers: the highest bit of the last byte is the sign. Zero is the empty
//! byte sequence. Values are handled as `BigInt` so that instruction sets
//! with larger number widths share the same code.

use num_bigint::{BigInt, Sign};
use num_traits::Zero;
use thiserror::Error;

/// The VM number width of the BCH 2022 and 2023 instruction sets.
pub const DEFAULT_MAXIMUM_VM_NUMBER_LENGTH: usize = 8;

/// Reasons a stack item cannot be read as a VM number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VmNumberError {
    #[error("Failed to decode VM Number: overflows VM Number range.")]
    OutOfRange,
    #[error("Failed to decode VM Number: the number is not minimally-encoded.")]
    RequiresMinimal,
}

/// Decode a VM number.
///
/// # Arguments
/// * `bytes` - The encoded number.
/// * `maximum_length` - The longest accepted encoding, in bytes.
/// * `require_minimal` - Reject encodings with unnecessary padding.
pub fn decode_vm_number(bytes: &[u8], maximum_length: usize, require_minimal: bool) -> Result<BigInt, VmNumberError> {
    if bytes.len() > maximum_length {
        return Err(VmNumberError::OutOfRange);
    }
    let Some(&last) = bytes.last() else {
        return Ok(BigInt::zero());
    };
    if require_minimal && !is_minimally_encoded_vm_number(bytes) {
        return Err(VmNumberError::RequiresMinimal);
    }
    let mut magnitude = bytes.to_vec();
    let last_index = magnitude.len() - 1;
    magnitude[last_index] = last & 0x7f;
    let value = BigInt::from_bytes_le(Sign::Plus, &magnitude);
    if last & 0x80 != 0 {
        Ok(-value)
    } else {
        Ok(value)
    }
}

/// Whether `bytes` is the shortest encoding of the number it represents.
///
/// The last byte may only be `0x00` or `0x80` when the byte before it has
/// its high bit set (the extra byte carries the sign).
pub fn is_minimally_encoded_vm_number(bytes: &[u8]) -> bool {
    match bytes {
        [] => true,
        [.., last] if last & 0x7f != 0 => true,
        [_] => false,
        [.., second_to_last, _] => second_to_last & 0x80 != 0,
    }
}

/// Encode `value` as a minimal VM number.
pub fn encode_vm_number(value: &BigInt) -> Vec<u8> {
    if value.is_zero() {
        return Vec::new();
    }
    let (sign, mut bytes) = value.to_bytes_le();
    let negative = sign == Sign::Minus;
    match bytes.last_mut() {
        Some(last) if *last & 0x80 != 0 => bytes.push(if negative { 0x80 } else { 0x00 }),
        Some(last) if negative => *last |= 0x80,
        _ => {}
    }
    bytes
}

/// Encode a machine integer as a minimal VM number.
pub fn encode_vm_number_i64(value: i64) -> Vec<u8> {
    encode_vm_number(&BigInt::from(value))
}

/// Whether a stack item is "truthy".
///
/// Any non-zero byte makes the item true, except that a final `0x80`
/// following only zero bytes is negative zero, which is false.
pub fn stack_item_is_truthy(item: &[u8]) -> bool {
    for (index, &byte) in item.iter().enumerate() {
        if byte != 0 {
            return !(index == item.len() - 1 && byte == 0x80);
        }
    }
    false
}

/// `1` for true and the empty item for false.
pub fn boolean_to_vm_number(value: bool) -> Vec<u8> {
    if value {
        vec![1]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(hex_str: &str) -> Result<BigInt, VmNumberError> {
        decode_vm_number(&hex::decode(hex_str).unwrap(), 8, true)
    }

    #[test]
    fn test_decode_values() {
        assert_eq!(decode("").unwrap(), BigInt::from(0));
        assert_eq!(decode("01").unwrap(), BigInt::from(1));
        assert_eq!(decode("81").unwrap(), BigInt::from(-1));
        assert_eq!(decode("7f").unwrap(), BigInt::from(127));
        assert_eq!(decode("8000").unwrap(), BigInt::from(128));
        assert_eq!(decode("8080").unwrap(), BigInt::from(-128));
        assert_eq!(decode("ffffffffffffff7f").unwrap(), BigInt::from(i64::MAX));
        assert_eq!(decode("ffffffffffffffff").unwrap(), BigInt::from(-i64::MAX));
    }

    #[test]
    fn test_decode_rejects_non_minimal() {
        assert_eq!(decode("00"), Err(VmNumberError::RequiresMinimal));
        assert_eq!(decode("80"), Err(VmNumberError::RequiresMinimal));
        assert_eq!(decode("0100"), Err(VmNumberError::RequiresMinimal));
        assert_eq!(decode("0180"), Err(VmNumberError::RequiresMinimal));
        assert_eq!(
            decode_vm_number(&[0x01, 0x00], 8, false).unwrap(),
            BigInt::from(1)
        );
        assert_eq!(
            decode_vm_number(&[0x00, 0x80], 8, false).unwrap(),
            BigInt::from(0)
        );
    }

    #[test]
    fn test_decode_rejects_long_encodings() {
        assert_eq!(decode("000000000000000001"), Err(VmNumberError::OutOfRange));
        assert!(decode_vm_number(&[0x01; 9], 9, true).is_ok());
    }

    #[test]
    fn test_encode_values() {
        assert_eq!(encode_vm_number_i64(0), Vec::<u8>::new());
        assert_eq!(encode_vm_number_i64(1), vec![0x01]);
        assert_eq!(encode_vm_number_i64(-1), vec![0x81]);
        assert_eq!(encode_vm_number_i64(127), vec![0x7f]);
        assert_eq!(encode_vm_number_i64(128), vec![0x80, 0x00]);
        assert_eq!(encode_vm_number_i64(-128), vec![0x80, 0x80]);
        assert_eq!(encode_vm_number_i64(-255), vec![0xff, 0x80]);
        assert_eq!(encode_vm_number_i64(256), vec![0x00, 0x01]);
    }

    #[test]
    fn test_truthiness() {
        assert!(!stack_item_is_truthy(&[]));
        assert!(!stack_item_is_truthy(&[0x00]));
        assert!(!stack_item_is_truthy(&[0x00, 0x00]));
        assert!(!stack_item_is_truthy(&[0x80]));
        assert!(!stack_item_is_truthy(&[0x00, 0x80]));
        assert!(stack_item_is_truthy(&[0x01]));
        assert!(stack_item_is_truthy(&[0x80, 0x00]));
        assert!(stack_item_is_truthy(&[0x00, 0x81]));
    }
}
