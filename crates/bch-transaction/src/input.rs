//! Transaction input spending a previous output.

use serde::{Deserialize, Serialize};

use bch_primitives::util::{BchReader, BchWriter};

use crate::TransactionError;

/// Sequence number which disables locktime for an input.
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// A single input in a transaction.
///
/// # Wire format
///
/// | Field                     | Size             |
/// |---------------------------|------------------|
/// | outpoint_transaction_hash | 32 bytes         |
/// | outpoint_index            | 4 bytes (LE)     |
/// | bytecode length           | CompactUint      |
/// | unlocking_bytecode        | variable         |
/// | sequence_number           | 4 bytes (LE)     |
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Input {
    /// Index of the spent output within its transaction.
    pub outpoint_index: u32,

    /// Hash of the transaction containing the spent output, in user
    /// interface byte order. The wire format stores it reversed.
    #[serde(with = "crate::serde_hex::hash")]
    pub outpoint_transaction_hash: [u8; 32],

    /// The sequence number (A.K.A. `nSequence`).
    pub sequence_number: u32,

    /// The bytecode which satisfies the spent output's locking bytecode.
    #[serde(with = "crate::serde_hex::bytes")]
    pub unlocking_bytecode: Vec<u8>,
}

impl Input {
    /// Deserialize an `Input` from a `BchReader`.
    ///
    /// # Arguments
    /// * `reader` - The reader positioned at the start of an encoded input.
    ///
    /// # Returns
    /// `Ok(Input)` on success, or a `TransactionError` if the data is
    /// truncated or malformed.
    pub fn read_from(reader: &mut BchReader) -> Result<Self, TransactionError> {
        let mut outpoint_transaction_hash = reader.read_array::<32>().map_err(|e| {
            TransactionError::SerializationError(format!("reading outpoint transaction hash: {}", e))
        })?;
        outpoint_transaction_hash.reverse();

        let outpoint_index = reader.read_u32_le().map_err(|e| {
            TransactionError::SerializationError(format!("reading outpoint index: {}", e))
        })?;

        let unlocking_bytecode = reader.read_length_prefixed().map_err(|e| {
            TransactionError::SerializationError(format!("reading unlocking bytecode: {}", e))
        })?;

        let sequence_number = reader.read_u32_le().map_err(|e| {
            TransactionError::SerializationError(format!("reading sequence number: {}", e))
        })?;

        Ok(Input {
            outpoint_index,
            outpoint_transaction_hash,
            sequence_number,
            unlocking_bytecode: unlocking_bytecode.to_vec(),
        })
    }

    /// Serialize this input into a `BchWriter`.
    pub fn write_to(&self, writer: &mut BchWriter) {
        writer.write_bytes(&self.outpoint_wire_hash());
        writer.write_u32_le(self.outpoint_index);
        writer.write_length_prefixed(&self.unlocking_bytecode);
        writer.write_u32_le(self.sequence_number);
    }

    /// Serialize this input to a byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BchWriter::with_capacity(41 + self.unlocking_bytecode.len());
        self.write_to(&mut writer);
        writer.into_bytes()
    }

    /// The outpoint transaction hash in wire byte order.
    pub fn outpoint_wire_hash(&self) -> [u8; 32] {
        let mut hash = self.outpoint_transaction_hash;
        hash.reverse();
        hash
    }
}
