//! Signing serialization (A.K.A. "sighash" preimage) generation.
//!
//! Computes the exact bytes which are double-SHA256 hashed and signed to
//! authorize spending a transaction input, following the replay-protected
//! BIP143-style digest algorithm extended by `SIGHASH_UTXOS` and CashTokens.
//!
//! The serialization consists of:
//! 1. version (4 bytes LE)
//! 2. hashPrevouts (32 bytes), zeroed with `ANYONECANPAY`
//! 3. hashUtxos (32 bytes), present only with `SIGHASH_UTXOS`
//! 4. hashSequence (32 bytes), zeroed with `ANYONECANPAY`, `SINGLE` or `NONE`
//! 5. outpoint transaction hash (32 bytes, wire order) and index (4 bytes LE)
//! 6. the spent output's token prefix, if it holds tokens
//! 7. covered bytecode (CompactUint length + bytes)
//! 8. spent output value (8 bytes LE)
//! 9. sequence number (4 bytes LE)
//! 10. hashOutputs (32 bytes), see [`hash_outputs`]
//! 11. locktime (4 bytes LE)
//! 12. signing serialization type (1 byte) followed by the 3-byte fork ID

use bch_primitives::hash::{hash256_with, Sha256};
use bch_primitives::util::{BchWriter, CompactUint};

use crate::program::AuthenticationProgram;
use crate::transaction::encode_outputs;
use crate::TransactionError;

// -----------------------------------------------------------------------
// Signing serialization flags
// -----------------------------------------------------------------------

/// A.K.A. `SIGHASH_ALL`: sign all outputs.
pub const SIGHASH_ALL: u8 = 0x01;

/// A.K.A. `SIGHASH_NONE`: sign no outputs.
pub const SIGHASH_NONE: u8 = 0x02;

/// A.K.A. `SIGHASH_SINGLE`: sign only the output at the input's index.
pub const SIGHASH_SINGLE: u8 = 0x03;

/// A.K.A. `SIGHASH_UTXOS`: commit to every output spent by the transaction.
pub const SIGHASH_UTXOS: u8 = 0x20;

/// A.K.A. `SIGHASH_FORKID`: replay protection, required by all signatures.
pub const SIGHASH_FORKID: u8 = 0x40;

/// A.K.A. `ANYONECANPAY`: sign only the current input.
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;

/// Mask extracting the base type (ALL, NONE or SINGLE).
const SIGHASH_MASK: u8 = 0x1f;

/// The fork ID appended to the signing serialization type.
const FORK_ID: [u8; 3] = [0, 0, 0];

// -----------------------------------------------------------------------
// Signing serialization types
// -----------------------------------------------------------------------

pub const ALL_OUTPUTS: u8 = SIGHASH_ALL | SIGHASH_FORKID;
pub const ALL_OUTPUTS_ALL_UTXOS: u8 = ALL_OUTPUTS | SIGHASH_UTXOS;
pub const ALL_OUTPUTS_SINGLE_INPUT: u8 = ALL_OUTPUTS | SIGHASH_ANYONECANPAY;
pub const CORRESPONDING_OUTPUT: u8 = SIGHASH_SINGLE | SIGHASH_FORKID;
pub const CORRESPONDING_OUTPUT_ALL_UTXOS: u8 = CORRESPONDING_OUTPUT | SIGHASH_UTXOS;
pub const CORRESPONDING_OUTPUT_SINGLE_INPUT: u8 = CORRESPONDING_OUTPUT | SIGHASH_ANYONECANPAY;
pub const NO_OUTPUTS: u8 = SIGHASH_NONE | SIGHASH_FORKID;
pub const NO_OUTPUTS_ALL_UTXOS: u8 = NO_OUTPUTS | SIGHASH_UTXOS;
pub const NO_OUTPUTS_SINGLE_INPUT: u8 = NO_OUTPUTS | SIGHASH_ANYONECANPAY;

/// Signing serialization types accepted before `SIGHASH_UTXOS`.
pub const SIGNING_SERIALIZATION_TYPES_BCH_2022: [u8; 6] = [
    ALL_OUTPUTS,
    NO_OUTPUTS,
    CORRESPONDING_OUTPUT,
    ALL_OUTPUTS_SINGLE_INPUT,
    NO_OUTPUTS_SINGLE_INPUT,
    CORRESPONDING_OUTPUT_SINGLE_INPUT,
];

/// Signing serialization types accepted since the 2023 upgrade.
///
/// `SIGHASH_UTXOS` may not be combined with `ANYONECANPAY`.
pub const SIGNING_SERIALIZATION_TYPES_BCH_2023: [u8; 9] = [
    ALL_OUTPUTS,
    NO_OUTPUTS,
    CORRESPONDING_OUTPUT,
    ALL_OUTPUTS_SINGLE_INPUT,
    NO_OUTPUTS_SINGLE_INPUT,
    CORRESPONDING_OUTPUT_SINGLE_INPUT,
    ALL_OUTPUTS_ALL_UTXOS,
    NO_OUTPUTS_ALL_UTXOS,
    CORRESPONDING_OUTPUT_ALL_UTXOS,
];

/// Return `true` if `byte` is one of the `allowed` signing serialization types.
pub fn is_defined_signing_serialization_type(byte: u8, allowed: &[u8]) -> bool {
    allowed.contains(&byte)
}

fn single_input(signing_serialization_type: u8) -> bool {
    signing_serialization_type & SIGHASH_ANYONECANPAY != 0
}

fn all_utxos(signing_serialization_type: u8) -> bool {
    signing_serialization_type & SIGHASH_UTXOS != 0
}

fn corresponding_output(signing_serialization_type: u8) -> bool {
    signing_serialization_type & SIGHASH_MASK == SIGHASH_SINGLE
}

fn no_outputs(signing_serialization_type: u8) -> bool {
    signing_serialization_type & SIGHASH_MASK == SIGHASH_NONE
}

// -----------------------------------------------------------------------
// Components
// -----------------------------------------------------------------------

/// The transaction-derived values from which a signing serialization is built.
///
/// These are also exposed individually to the compiler's
/// `signing_serialization.<component>` operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningSerializationComponents {
    /// The encoded output at the same index as the input, if one exists.
    pub corresponding_output: Option<Vec<u8>>,
    pub locktime: u32,
    pub outpoint_index: u32,
    /// The outpoint transaction hash in user interface byte order.
    pub outpoint_transaction_hash: [u8; 32],
    /// The token prefix of the spent output (empty if it holds no tokens).
    pub output_token_prefix: Vec<u8>,
    pub output_value: u64,
    pub sequence_number: u32,
    pub transaction_outpoints: Vec<u8>,
    pub transaction_outputs: Vec<u8>,
    pub transaction_sequence_numbers: Vec<u8>,
    /// Every spent output, encoded as for `transaction_outputs`.
    pub transaction_utxos: Vec<u8>,
    pub version: u32,
}

impl SigningSerializationComponents {
    /// Extract the components for the input under evaluation.
    ///
    /// # Returns
    /// An error if `input_index` has no matching input or source output.
    pub fn from_program(program: &AuthenticationProgram) -> Result<Self, TransactionError> {
        let index = program.input_index;
        let transaction = &program.transaction;
        let input = transaction.inputs.get(index).ok_or_else(|| {
            TransactionError::InvalidTransaction(format!(
                "input index {} out of range (transaction has {} inputs)",
                index,
                transaction.inputs.len()
            ))
        })?;
        let source_output = program.source_outputs.get(index).ok_or_else(|| {
            TransactionError::InvalidTransaction(format!(
                "missing source output for input index {}",
                index
            ))
        })?;
        Ok(SigningSerializationComponents {
            corresponding_output: transaction.encode_corresponding_output(index),
            locktime: transaction.locktime,
            outpoint_index: input.outpoint_index,
            outpoint_transaction_hash: input.outpoint_transaction_hash,
            output_token_prefix: source_output.token_prefix(),
            output_value: source_output.value_satoshis,
            sequence_number: input.sequence_number,
            transaction_outpoints: transaction.encode_outpoints(),
            transaction_outputs: transaction.encode_outputs_for_signing(),
            transaction_sequence_numbers: transaction.encode_sequence_numbers(),
            transaction_utxos: encode_outputs(&program.source_outputs),
            version: transaction.version,
        })
    }
}

// -----------------------------------------------------------------------
// Digests
// -----------------------------------------------------------------------

/// The `hashPrevouts` value for a signing serialization type.
pub fn hash_prevouts(sha256: &dyn Sha256, signing_serialization_type: u8, transaction_outpoints: &[u8]) -> [u8; 32] {
    if single_input(signing_serialization_type) {
        [0u8; 32]
    } else {
        hash256_with(sha256, transaction_outpoints)
    }
}

/// The `hashUtxos` value, or `None` if the type does not commit to UTXOs.
pub fn hash_utxos(sha256: &dyn Sha256, signing_serialization_type: u8, transaction_utxos: &[u8]) -> Option<[u8; 32]> {
    all_utxos(signing_serialization_type).then(|| hash256_with(sha256, transaction_utxos))
}

/// The `hashSequence` value for a signing serialization type.
pub fn hash_sequence(
    sha256: &dyn Sha256,
    signing_serialization_type: u8,
    transaction_sequence_numbers: &[u8],
) -> [u8; 32] {
    if single_input(signing_serialization_type)
        || corresponding_output(signing_serialization_type)
        || no_outputs(signing_serialization_type)
    {
        [0u8; 32]
    } else {
        hash256_with(sha256, transaction_sequence_numbers)
    }
}

/// The `hashOutputs` value for a signing serialization type.
///
/// All outputs are hashed unless the type is `NONE` or `SINGLE`. With
/// `SINGLE`, only the corresponding output is hashed, or zeros if the input
/// has no corresponding output.
pub fn hash_outputs(
    sha256: &dyn Sha256,
    signing_serialization_type: u8,
    transaction_outputs: &[u8],
    corresponding: Option<&[u8]>,
) -> [u8; 32] {
    if corresponding_output(signing_serialization_type) {
        return corresponding
            .map(|output| hash256_with(sha256, output))
            .unwrap_or([0u8; 32]);
    }
    if no_outputs(signing_serialization_type) {
        return [0u8; 32];
    }
    hash256_with(sha256, transaction_outputs)
}

// -----------------------------------------------------------------------
// Serialization
// -----------------------------------------------------------------------

/// Serialize the signature-protected properties of a transaction.
///
/// # Arguments
/// * `components` - The values extracted from the transaction context.
/// * `covered_bytecode` - The bytecode being executed, starting after the
///   last executed `OP_CODESEPARATOR`.
/// * `signing_serialization_type` - The type byte of the signature.
/// * `sha256` - The SHA-256 capability used for the intermediate digests.
///
/// # Returns
/// The raw serialization (not yet hashed).
pub fn generate_signing_serialization(
    components: &SigningSerializationComponents,
    covered_bytecode: &[u8],
    signing_serialization_type: u8,
    sha256: &dyn Sha256,
) -> Vec<u8> {
    let mut writer = BchWriter::with_capacity(200 + covered_bytecode.len());
    writer.write_u32_le(components.version);
    writer.write_bytes(&hash_prevouts(
        sha256,
        signing_serialization_type,
        &components.transaction_outpoints,
    ));
    if let Some(utxos) = hash_utxos(sha256, signing_serialization_type, &components.transaction_utxos) {
        writer.write_bytes(&utxos);
    }
    writer.write_bytes(&hash_sequence(
        sha256,
        signing_serialization_type,
        &components.transaction_sequence_numbers,
    ));

    let mut outpoint_hash = components.outpoint_transaction_hash;
    outpoint_hash.reverse();
    writer.write_bytes(&outpoint_hash);
    writer.write_u32_le(components.outpoint_index);

    writer.write_bytes(&components.output_token_prefix);
    writer.write_compact_uint(CompactUint::from(covered_bytecode.len()));
    writer.write_bytes(covered_bytecode);
    writer.write_u64_le(components.output_value);
    writer.write_u32_le(components.sequence_number);
    writer.write_bytes(&hash_outputs(
        sha256,
        signing_serialization_type,
        &components.transaction_outputs,
        components.corresponding_output.as_deref(),
    ));
    writer.write_u32_le(components.locktime);
    writer.write_u8(signing_serialization_type);
    writer.write_bytes(&FORK_ID);
    writer.into_bytes()
}

/// Generate the signing serialization for the input under evaluation.
pub fn generate_signing_serialization_for_program(
    program: &AuthenticationProgram,
    covered_bytecode: &[u8],
    signing_serialization_type: u8,
    sha256: &dyn Sha256,
) -> Result<Vec<u8>, TransactionError> {
    let components = SigningSerializationComponents::from_program(program)?;
    Ok(generate_signing_serialization(
        &components,
        covered_bytecode,
        signing_serialization_type,
        sha256,
    ))
}
