//! Transaction output with a satoshi value, locking bytecode and optional
//! CashTokens data.

use serde::{Deserialize, Serialize};

use bch_primitives::util::{BchReader, BchWriter, CompactUint};

use crate::token::{encode_token_prefix, read_token_prefix, Token};
use crate::TransactionError;

/// A single output in a transaction.
///
/// # Wire format
///
/// | Field                    | Size           |
/// |--------------------------|----------------|
/// | value_satoshis           | 8 bytes (LE)   |
/// | field length             | CompactUint    |
/// | token prefix             | variable       |
/// | locking_bytecode         | variable       |
///
/// The token prefix and locking bytecode share a single length-prefixed
/// field, so token-unaware software sees the prefix as part of the bytecode.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Output {
    /// The bytecode which must be satisfied to spend this output.
    #[serde(with = "crate::serde_hex::bytes")]
    pub locking_bytecode: Vec<u8>,

    /// The tokens held by this output, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,

    /// The value of this output in satoshis.
    pub value_satoshis: u64,
}

impl Output {
    /// Create a token-less output.
    pub fn new(value_satoshis: u64, locking_bytecode: Vec<u8>) -> Self {
        Output {
            locking_bytecode,
            token: None,
            value_satoshis,
        }
    }

    /// Deserialize an `Output` from a `BchReader`.
    ///
    /// # Arguments
    /// * `reader` - The reader positioned at the start of an encoded output.
    ///
    /// # Returns
    /// `Ok(Output)` on success, or a `TransactionError` if the data is
    /// truncated or the token prefix is invalid.
    pub fn read_from(reader: &mut BchReader) -> Result<Self, TransactionError> {
        let value_satoshis = reader.read_u64_le().map_err(|e| {
            TransactionError::SerializationError(format!("reading output value: {}", e))
        })?;
        let field = reader.read_length_prefixed().map_err(|e| {
            TransactionError::SerializationError(format!("reading locking bytecode length: {}", e))
        })?;
        let (token, prefix_length) = read_token_prefix(field)?;
        Ok(Output {
            locking_bytecode: field[prefix_length..].to_vec(),
            token,
            value_satoshis,
        })
    }

    /// Serialize this output into a `BchWriter`.
    pub fn write_to(&self, writer: &mut BchWriter) {
        writer.write_u64_le(self.value_satoshis);
        let prefix = encode_token_prefix(self.token.as_ref());
        writer.write_compact_uint(CompactUint::from(prefix.len() + self.locking_bytecode.len()));
        writer.write_bytes(&prefix);
        writer.write_bytes(&self.locking_bytecode);
    }

    /// Serialize this output to a byte vector.
    ///
    /// This encoding is also the one committed to by signing serializations
    /// (`transaction_outputs` and `corresponding_output`).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BchWriter::with_capacity(9 + self.locking_bytecode.len());
        self.write_to(&mut writer);
        writer.into_bytes()
    }

    /// Decode an output which must occupy all of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
        let mut reader = BchReader::new(bytes);
        let output = Self::read_from(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(TransactionError::SerializationError(format!(
                "trailing {} bytes after output",
                reader.remaining()
            )));
        }
        Ok(output)
    }

    /// The token prefix of this output (empty when it holds no tokens).
    pub fn token_prefix(&self) -> Vec<u8> {
        encode_token_prefix(self.token.as_ref())
    }
}
