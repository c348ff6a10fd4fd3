//! Utility types for binary serialization.
//!
//! Provides CompactUint encoding/decoding plus the `BchReader` and
//! `BchWriter` cursors used to read and write the little-endian wire
//! format of transactions, outputs and signing serializations.

use crate::PrimitivesError;

// ---------------------------------------------------------------------------
// CompactUint
// ---------------------------------------------------------------------------

/// The protocol's variable-length unsigned integer.
///
/// Values up to `0xfc` are encoded as a single byte. Larger values use a
/// one-byte marker (`0xfd`, `0xfe` or `0xff`) followed by 2, 4 or 8
/// little-endian bytes. Decoding rejects encodings that could have used a
/// shorter form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompactUint(pub u64);

impl CompactUint {
    /// Decode a minimally-encoded CompactUint from the start of `data`.
    ///
    /// # Arguments
    /// * `data` - Byte slice starting with a CompactUint encoding.
    ///
    /// # Returns
    /// A tuple of `(CompactUint, bytes_consumed)`, or an error if the data is
    /// truncated or the encoding is not minimal.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), PrimitivesError> {
        let prefix = *data.first().ok_or(PrimitivesError::CompactUintNoPrefix)?;
        let size = Self::prefix_to_size(prefix);
        if data.len() < size {
            return Err(PrimitivesError::CompactUintInsufficientBytes {
                prefix,
                required: size,
                remaining: data.len(),
            });
        }
        let value = match size {
            1 => prefix as u64,
            3 => u16::from_le_bytes([data[1], data[2]]) as u64,
            5 => u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as u64,
            _ => u64::from_le_bytes([
                data[1], data[2], data[3], data[4], data[5], data[6], data[7], data[8],
            ]),
        };
        let decoded = CompactUint(value);
        if decoded.length() != size {
            return Err(PrimitivesError::CompactUintNonMinimal);
        }
        Ok((decoded, size))
    }

    /// Decode a CompactUint that must occupy all of `data`.
    pub fn from_exact_bytes(data: &[u8]) -> Result<Self, PrimitivesError> {
        let (value, consumed) = Self::from_bytes(data)?;
        if consumed != data.len() {
            return Err(PrimitivesError::CompactUintExcessiveBytes);
        }
        Ok(value)
    }

    /// Return the total encoded size implied by a prefix byte.
    pub fn prefix_to_size(prefix: u8) -> usize {
        match prefix {
            0xfd => 3,
            0xfe => 5,
            0xff => 9,
            _ => 1,
        }
    }

    /// Return the wire-format byte length of this CompactUint.
    ///
    /// # Returns
    /// 1, 3, 5, or 9 depending on the value.
    pub fn length(&self) -> usize {
        if self.0 <= 0xfc {
            1
        } else if self.0 <= 0xffff {
            3
        } else if self.0 <= 0xffff_ffff {
            5
        } else {
            9
        }
    }

    /// Encode the CompactUint into a new byte vector.
    ///
    /// # Returns
    /// A `Vec<u8>` of 1, 3, 5, or 9 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let v = self.0;
        let mut buf = Vec::with_capacity(self.length());
        match self.length() {
            1 => buf.push(v as u8),
            3 => {
                buf.push(0xfd);
                buf.extend_from_slice(&(v as u16).to_le_bytes());
            }
            5 => {
                buf.push(0xfe);
                buf.extend_from_slice(&(v as u32).to_le_bytes());
            }
            _ => {
                buf.push(0xff);
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        buf
    }

    /// Return the underlying u64 value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for CompactUint {
    fn from(v: u64) -> Self {
        CompactUint(v)
    }
}

impl From<usize> for CompactUint {
    fn from(v: usize) -> Self {
        CompactUint(v as u64)
    }
}

// ---------------------------------------------------------------------------
// BchReader
// ---------------------------------------------------------------------------

/// A cursor-based reader for wire-format binary data.
///
/// Wraps a byte slice and maintains a read position, providing methods
/// to read fixed-size integers and CompactUint values in little-endian order.
pub struct BchReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BchReader<'a> {
    /// Create a new reader over the given byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        BchReader { data, pos: 0 }
    }

    /// Read `n` bytes and advance the position.
    ///
    /// # Arguments
    /// * `n` - Number of bytes to read.
    ///
    /// # Returns
    /// A byte slice of length `n`, or an error if insufficient data remains.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], PrimitivesError> {
        if n > self.remaining() {
            return Err(PrimitivesError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read exactly `N` bytes into a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], PrimitivesError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Read a single byte and advance the position.
    pub fn read_u8(&mut self) -> Result<u8, PrimitivesError> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    /// Read a little-endian u16 and advance the position by 2 bytes.
    pub fn read_u16_le(&mut self) -> Result<u16, PrimitivesError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian u32 and advance the position by 4 bytes.
    pub fn read_u32_le(&mut self) -> Result<u32, PrimitivesError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian u64 and advance the position by 8 bytes.
    pub fn read_u64_le(&mut self) -> Result<u64, PrimitivesError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read a minimally-encoded CompactUint and advance past it.
    pub fn read_compact_uint(&mut self) -> Result<CompactUint, PrimitivesError> {
        let (value, consumed) = CompactUint::from_bytes(&self.data[self.pos..])?;
        self.pos += consumed;
        Ok(value)
    }

    /// Read a CompactUint length prefix followed by that many bytes.
    pub fn read_length_prefixed(&mut self) -> Result<&'a [u8], PrimitivesError> {
        let length = self.read_compact_uint()?.value();
        let length = usize::try_from(length).map_err(|_| PrimitivesError::UnexpectedEof)?;
        self.read_bytes(length)
    }

    /// Look at the next byte without consuming it.
    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Return the current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Return the number of bytes remaining.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

// ---------------------------------------------------------------------------
// BchWriter
// ---------------------------------------------------------------------------

/// A buffer-based writer for wire-format binary data.
///
/// Wraps a `Vec<u8>` and provides methods to append fixed-size integers
/// and CompactUint values in little-endian order.
#[derive(Debug, Default)]
pub struct BchWriter {
    buf: Vec<u8>,
}

impl BchWriter {
    /// Create a new empty writer.
    pub fn new() -> Self {
        BchWriter { buf: Vec::new() }
    }

    /// Create a new writer with a pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        BchWriter {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Append raw bytes to the buffer.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append a single byte to the buffer.
    pub fn write_u8(&mut self, val: u8) {
        self.buf.push(val);
    }

    /// Append a little-endian u16 (2 bytes) to the buffer.
    pub fn write_u16_le(&mut self, val: u16) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    /// Append a little-endian u32 (4 bytes) to the buffer.
    pub fn write_u32_le(&mut self, val: u32) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    /// Append a little-endian u64 (8 bytes) to the buffer.
    pub fn write_u64_le(&mut self, val: u64) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    /// Append a CompactUint to the buffer.
    pub fn write_compact_uint(&mut self, value: CompactUint) {
        self.buf.extend_from_slice(&value.to_bytes());
    }

    /// Append a CompactUint length prefix followed by `bytes`.
    pub fn write_length_prefixed(&mut self, bytes: &[u8]) {
        self.write_compact_uint(CompactUint::from(bytes.len()));
        self.write_bytes(bytes);
    }

    /// Consume the writer and return the accumulated bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Return a reference to the current buffer contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Return the current length of the buffer.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_uint_boundaries() {
        let cases: &[(u64, &str)] = &[
            (0, "00"),
            (0xfc, "fc"),
            (0xfd, "fdfd00"),
            (0xffff, "fdffff"),
            (0x10000, "fe00000100"),
            (0xffff_ffff, "feffffffff"),
            (0x1_0000_0000, "ff0000000001000000"),
            (u64::MAX, "ffffffffffffffffff"),
        ];
        for (value, expected) in cases {
            let encoded = CompactUint(*value).to_bytes();
            assert_eq!(hex::encode(&encoded), *expected, "encoding {}", value);
            let (decoded, consumed) = CompactUint::from_bytes(&encoded).unwrap();
            assert_eq!(decoded.0, *value);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn test_compact_uint_rejects_non_minimal() {
        let err = CompactUint::from_bytes(&[0xfd, 0x01, 0x00]).unwrap_err();
        assert_eq!(err, PrimitivesError::CompactUintNonMinimal);
        let err = CompactUint::from_bytes(&[0xfe, 0xff, 0xff, 0x00, 0x00]).unwrap_err();
        assert_eq!(err, PrimitivesError::CompactUintNonMinimal);
        let err = CompactUint::from_bytes(&[0xff, 1, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err, PrimitivesError::CompactUintNonMinimal);
    }

    #[test]
    fn test_compact_uint_truncated() {
        assert_eq!(
            CompactUint::from_bytes(&[]).unwrap_err(),
            PrimitivesError::CompactUintNoPrefix
        );
        assert_eq!(
            CompactUint::from_bytes(&[0xfe, 0x00]).unwrap_err(),
            PrimitivesError::CompactUintInsufficientBytes {
                prefix: 0xfe,
                required: 5,
                remaining: 2
            }
        );
    }

    #[test]
    fn test_compact_uint_exact() {
        assert_eq!(CompactUint::from_exact_bytes(&[0x05]).unwrap(), CompactUint(5));
        assert_eq!(
            CompactUint::from_exact_bytes(&[0x05, 0x00]).unwrap_err(),
            PrimitivesError::CompactUintExcessiveBytes
        );
    }

    #[test]
    fn test_reader_writer() {
        let mut w = BchWriter::new();
        w.write_u8(0xab);
        w.write_u16_le(0x1234);
        w.write_u32_le(0xdeadbeef);
        w.write_u64_le(42);
        w.write_length_prefixed(&[1, 2, 3]);
        let bytes = w.into_bytes();

        let mut r = BchReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 0xab);
        assert_eq!(r.read_u16_le().unwrap(), 0x1234);
        assert_eq!(r.read_u32_le().unwrap(), 0xdeadbeef);
        assert_eq!(r.read_u64_le().unwrap(), 42);
        assert_eq!(r.read_length_prefixed().unwrap(), &[1, 2, 3]);
        assert_eq!(r.remaining(), 0);
        assert!(r.read_u8().is_err());
    }
}
