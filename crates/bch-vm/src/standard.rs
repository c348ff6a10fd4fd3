//! Locking bytecode patterns and standardness rules.

use bch_transaction::Output;

use crate::encoding::is_valid_public_key_encoding;
use crate::instruction::{decode_authentication_instructions, is_push_only, push_number_opcode_to_number};
use crate::opcodes::{
    OP_0, OP_1, OP_16, OP_CHECKMULTISIG, OP_CHECKSIG, OP_DUP, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160, OP_HASH256,
    OP_PUSHBYTES_20, OP_PUSHBYTES_32, OP_PUSHBYTES_33, OP_PUSHBYTES_65, OP_RETURN,
};

const P2PKH_INPUT_LENGTH: usize = 148;
const MINIMUM_FEE_MULTIPLE: u64 = 3;
/// The default dust relay fee, in satoshis per kilobyte.
pub const STANDARD_DUST_RELAY_FEE: u64 = 1000;
const MAXIMUM_STANDARD_MULTISIG_KEYS: i64 = 3;

/// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
pub fn is_pay_to_public_key_hash(bytecode: &[u8]) -> bool {
    bytecode.len() == 25
        && bytecode[0] == OP_DUP
        && bytecode[1] == OP_HASH160
        && bytecode[2] == OP_PUSHBYTES_20
        && bytecode[23] == OP_EQUALVERIFY
        && bytecode[24] == OP_CHECKSIG
}

/// `OP_HASH160 <20 bytes> OP_EQUAL`
pub fn is_pay_to_script_hash20(bytecode: &[u8]) -> bool {
    bytecode.len() == 23 && bytecode[0] == OP_HASH160 && bytecode[1] == OP_PUSHBYTES_20 && bytecode[22] == OP_EQUAL
}

/// `OP_HASH256 <32 bytes> OP_EQUAL`
pub fn is_pay_to_script_hash32(bytecode: &[u8]) -> bool {
    bytecode.len() == 35 && bytecode[0] == OP_HASH256 && bytecode[1] == OP_PUSHBYTES_32 && bytecode[34] == OP_EQUAL
}

/// `<public key> OP_CHECKSIG`, with a compressed or uncompressed key.
pub fn is_pay_to_public_key(bytecode: &[u8]) -> bool {
    match bytecode.len() {
        35 => bytecode[0] == OP_PUSHBYTES_33 && bytecode[34] == OP_CHECKSIG && is_valid_public_key_encoding(&bytecode[1..34]),
        67 => bytecode[0] == OP_PUSHBYTES_65 && bytecode[66] == OP_CHECKSIG && is_valid_public_key_encoding(&bytecode[1..66]),
        _ => false,
    }
}

/// `OP_RETURN` followed only by pushes.
pub fn is_arbitrary_data_output(bytecode: &[u8]) -> bool {
    bytecode.first() == Some(&OP_RETURN) && is_push_only(&bytecode[1..])
}

/// The properties of a bare multisig locking bytecode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultisigProperties {
    /// Required signatures.
    pub m: i64,
    /// Listed public keys.
    pub n: i64,
    pub public_keys: Vec<Vec<u8>>,
}

/// Parse `OP_m <public keys...> OP_n OP_CHECKMULTISIG`.
pub fn is_simple_multisig(bytecode: &[u8]) -> Option<MultisigProperties> {
    let decoded = decode_authentication_instructions(bytecode);
    if decoded.is_malformed() {
        return None;
    }
    let instructions = decoded.instructions;
    if instructions.len() < 4 || instructions[instructions.len() - 1].opcode != OP_CHECKMULTISIG {
        return None;
    }
    let m = push_number_opcode_to_number(instructions[0].opcode)?;
    let n = push_number_opcode_to_number(instructions[instructions.len() - 2].opcode)?;
    let public_keys = instructions[1..instructions.len() - 2]
        .iter()
        .map(|instruction| instruction.data.clone())
        .collect::<Option<Vec<_>>>()?;
    if !public_keys.iter().all(|key| is_valid_public_key_encoding(key)) {
        return None;
    }
    Some(MultisigProperties { m, n, public_keys })
}

/// A bare multisig with 1 to 3 keys and `1 <= m <= n`.
pub fn is_standard_multisig(bytecode: &[u8]) -> bool {
    is_simple_multisig(bytecode)
        .map(|MultisigProperties { m, n, .. }| (1..=MAXIMUM_STANDARD_MULTISIG_KEYS).contains(&n) && m >= 1 && m <= n)
        .unwrap_or(false)
}

/// Standard output patterns of the BCH 2022 instruction set.
pub fn is_standard_output_bytecode(bytecode: &[u8]) -> bool {
    is_pay_to_public_key_hash(bytecode)
        || is_pay_to_script_hash20(bytecode)
        || is_pay_to_public_key(bytecode)
        || is_arbitrary_data_output(bytecode)
        || is_standard_multisig(bytecode)
}

/// Standard output patterns of the BCH 2023 instruction set, which adds
/// P2SH32.
pub fn is_standard_output_bytecode_2023(bytecode: &[u8]) -> bool {
    is_standard_output_bytecode(bytecode) || is_pay_to_script_hash32(bytecode)
}

/// Whether `bytecode` looks like a segwit program: a version push
/// (`OP_0` or `OP_1`..`OP_16`) followed by a single push whose length
/// accounts for the rest of the bytecode, 4 to 42 bytes in total.
pub fn is_witness_program(bytecode: &[u8]) -> bool {
    let correct_length = (4..=42).contains(&bytecode.len());
    let valid_version = matches!(bytecode.first(), Some(&version) if version == OP_0 || (OP_1..=OP_16).contains(&version));
    let correct_length_byte = bytecode
        .get(1)
        .map_or(false, |&length| length as usize + 2 == bytecode.len());
    correct_length && valid_version && correct_length_byte
}

/// The minimum fee for a transaction of `length` bytes at `fee_rate`
/// satoshis per kilobyte; never less than 1 for a non-empty transaction.
pub fn get_minimum_fee(length: u64, fee_rate: u64) -> u64 {
    if length < 1 {
        return 0;
    }
    (length.saturating_mul(fee_rate) / 1000).max(1)
}

/// The dust threshold for an encoded output of `output_length` bytes.
pub fn get_dust_threshold_for_length(output_length: usize, dust_relay_fee: u64) -> u64 {
    MINIMUM_FEE_MULTIPLE * get_minimum_fee((output_length + P2PKH_INPUT_LENGTH) as u64, dust_relay_fee)
}

/// The minimum value of `output`; zero for arbitrary data outputs.
pub fn get_dust_threshold(output: &Output) -> u64 {
    if is_arbitrary_data_output(&output.locking_bytecode) {
        return 0;
    }
    get_dust_threshold_for_length(output.to_bytes().len(), STANDARD_DUST_RELAY_FEE)
}

/// Whether `output` carries less value than its dust threshold.
pub fn is_dust_output(output: &Output) -> bool {
    output.value_satoshis < get_dust_threshold(output)
}
