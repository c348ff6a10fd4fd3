//! Core transaction type.
//!
//! Represents a complete transaction with version, inputs, outputs, and
//! locktime. Supports binary and hex serialization, transaction hash
//! computation and the component encodings committed to by signing
//! serializations.

use serde::{Deserialize, Serialize};

use bch_primitives::hash::sha256d;
use bch_primitives::util::{BchReader, BchWriter, CompactUint};

use crate::input::Input;
use crate::output::Output;
use crate::TransactionError;

/// A transaction consisting of a version, a set of inputs, a set of
/// outputs, and a locktime.
///
/// # Wire format
///
/// | Field        | Size                      |
/// |--------------|---------------------------|
/// | version      | 4 bytes (LE)              |
/// | input count  | CompactUint               |
/// | inputs       | variable (per input)      |
/// | output count | CompactUint               |
/// | outputs      | variable (per output)     |
/// | locktime     | 4 bytes (LE)              |
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    /// Ordered list of transaction inputs.
    pub inputs: Vec<Input>,

    /// Locktime. Values below 500,000,000 are block heights, others are
    /// UNIX timestamps.
    pub locktime: u32,

    /// Ordered list of transaction outputs.
    pub outputs: Vec<Output>,

    /// Transaction format version.
    pub version: u32,
}

impl Transaction {
    /// Create a new empty transaction with version 2 and locktime 0.
    pub fn new() -> Self {
        Transaction {
            inputs: Vec::new(),
            locktime: 0,
            outputs: Vec::new(),
            version: 2,
        }
    }

    // -----------------------------------------------------------------
    // Deserialization
    // -----------------------------------------------------------------

    /// Parse a transaction from a hex-encoded string.
    ///
    /// # Arguments
    /// * `hex_str` - A hex string of the raw transaction bytes.
    ///
    /// # Returns
    /// `Ok(Transaction)` on success, or a `TransactionError` if the hex is
    /// invalid or the bytes do not form a valid transaction.
    pub fn from_hex(hex_str: &str) -> Result<Self, TransactionError> {
        let bytes = hex::decode(hex_str).map_err(|e| {
            TransactionError::SerializationError(format!("invalid hex: {}", e))
        })?;
        Self::from_bytes(&bytes)
    }

    /// Parse a transaction from raw bytes.
    ///
    /// The byte slice must contain exactly one complete transaction with no
    /// trailing data.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
        let mut reader = BchReader::new(bytes);
        let tx = Self::read_from(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(TransactionError::SerializationError(format!(
                "the provided input includes unexpected bytes after the encoded transaction: encoded transaction ends at index {}, leaving {} remaining bytes",
                reader.position() - 1,
                reader.remaining()
            )));
        }
        Ok(tx)
    }

    /// Deserialize a transaction from a `BchReader`.
    ///
    /// # Arguments
    /// * `reader` - The reader positioned at the start of a serialized transaction.
    ///
    /// # Returns
    /// `Ok(Transaction)` on success, or a `TransactionError` on truncated or
    /// malformed data.
    pub fn read_from(reader: &mut BchReader) -> Result<Self, TransactionError> {
        let version = reader.read_u32_le().map_err(|e| {
            TransactionError::SerializationError(format!("reading version: {}", e))
        })?;

        let input_count = reader.read_compact_uint().map_err(|e| {
            TransactionError::SerializationError(format!("reading input count: {}", e))
        })?;
        // Each input occupies at least 41 bytes; never pre-allocate beyond that.
        let mut inputs = Vec::with_capacity(bounded_capacity(input_count, reader.remaining() / 41));
        for _ in 0..input_count.value() {
            inputs.push(Input::read_from(reader)?);
        }

        let output_count = reader.read_compact_uint().map_err(|e| {
            TransactionError::SerializationError(format!("reading output count: {}", e))
        })?;
        let mut outputs = Vec::with_capacity(bounded_capacity(output_count, reader.remaining() / 9));
        for _ in 0..output_count.value() {
            outputs.push(Output::read_from(reader)?);
        }

        let locktime = reader.read_u32_le().map_err(|e| {
            TransactionError::SerializationError(format!("reading locktime: {}", e))
        })?;

        Ok(Transaction {
            inputs,
            locktime,
            outputs,
            version,
        })
    }

    // -----------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------

    /// Serialize this transaction to raw bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BchWriter::with_capacity(256);
        writer.write_u32_le(self.version);

        writer.write_compact_uint(CompactUint::from(self.inputs.len()));
        for input in &self.inputs {
            input.write_to(&mut writer);
        }

        writer.write_compact_uint(CompactUint::from(self.outputs.len()));
        for output in &self.outputs {
            output.write_to(&mut writer);
        }

        writer.write_u32_le(self.locktime);
        writer.into_bytes()
    }

    /// Serialize this transaction to a lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Return the size of this transaction in bytes.
    pub fn size(&self) -> usize {
        self.to_bytes().len()
    }

    // -----------------------------------------------------------------
    // Transaction hash
    // -----------------------------------------------------------------

    /// Compute the transaction hash in P2P network (wire) byte order.
    ///
    /// This is the byte order produced by `OP_HASH256`.
    pub fn hash_wire_order(&self) -> [u8; 32] {
        sha256d(&self.to_bytes())
    }

    /// Compute the transaction hash (A.K.A. "TXID") in user interface
    /// byte order, as displayed by wallets and block explorers.
    pub fn hash(&self) -> [u8; 32] {
        let mut id = self.hash_wire_order();
        id.reverse();
        id
    }

    /// The transaction hash as a hex string in user interface byte order.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash())
    }

    // -----------------------------------------------------------------
    // Signing serialization components
    // -----------------------------------------------------------------

    /// Encode all input outpoints (wire-order hash followed by index).
    pub fn encode_outpoints(&self) -> Vec<u8> {
        let mut writer = BchWriter::with_capacity(self.inputs.len() * 36);
        for input in &self.inputs {
            writer.write_bytes(&input.outpoint_wire_hash());
            writer.write_u32_le(input.outpoint_index);
        }
        writer.into_bytes()
    }

    /// Encode all input sequence numbers.
    pub fn encode_sequence_numbers(&self) -> Vec<u8> {
        let mut writer = BchWriter::with_capacity(self.inputs.len() * 4);
        for input in &self.inputs {
            writer.write_u32_le(input.sequence_number);
        }
        writer.into_bytes()
    }

    /// Encode all outputs without a count prefix.
    ///
    /// This differs from the output list inside [`Transaction::to_bytes`],
    /// which is prefixed by the number of outputs.
    pub fn encode_outputs_for_signing(&self) -> Vec<u8> {
        encode_outputs(&self.outputs)
    }

    /// Encode the output at `index`, if it exists.
    pub fn encode_corresponding_output(&self, index: usize) -> Option<Vec<u8>> {
        self.outputs.get(index).map(Output::to_bytes)
    }
}

/// Encode a list of outputs without a count prefix.
///
/// Used for `transaction_outputs` and, with the spent outputs of each input,
/// for the `SIGHASH_UTXOS` commitment.
pub fn encode_outputs(outputs: &[Output]) -> Vec<u8> {
    let mut writer = BchWriter::new();
    for output in outputs {
        output.write_to(&mut writer);
    }
    writer.into_bytes()
}

fn bounded_capacity(count: CompactUint, limit: usize) -> usize {
    usize::try_from(count.value()).unwrap_or(usize::MAX).min(limit)
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Transaction {
    /// Display the transaction as its hex-encoded serialization.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
