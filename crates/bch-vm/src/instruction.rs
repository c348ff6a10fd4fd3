//! Instruction decoding, encoding and disassembly.
//!
//! Decoding is total: bytecode whose final push is truncated decodes to the
//! well-formed prefix plus a [`MalformedInstruction`], which re-encodes to
//! exactly the original bytes.

use std::collections::HashMap;

use crate::opcodes::{opcode_name, OP_0, OP_16, OP_1NEGATE, OP_PUSHBYTES_75, OP_PUSHDATA_1, OP_PUSHDATA_2, OP_PUSHDATA_4};

/// A decoded instruction: an opcode and, for push operations, its data.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: u8,
    pub data: Option<Vec<u8>>,
}

impl Instruction {
    /// A non-push operation.
    pub fn operation(opcode: u8) -> Self {
        Instruction { opcode, data: None }
    }

    /// A push operation with its (already-sliced) data.
    pub fn push(opcode: u8, data: Vec<u8>) -> Self {
        Instruction {
            opcode,
            data: Some(data),
        }
    }
}

/// A final push instruction which runs past the end of the bytecode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MalformedInstruction {
    /// The length bytes of a `OP_PUSHDATA_N` are truncated.
    Length {
        opcode: u8,
        expected_length_bytes: usize,
        length: Vec<u8>,
    },
    /// The pushed data is truncated.
    Data {
        opcode: u8,
        expected_data_bytes: usize,
        data: Vec<u8>,
    },
}

impl MalformedInstruction {
    pub fn opcode(&self) -> u8 {
        match self {
            MalformedInstruction::Length { opcode, .. } | MalformedInstruction::Data { opcode, .. } => *opcode,
        }
    }
}

/// The result of decoding bytecode.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodedInstructions {
    pub instructions: Vec<Instruction>,
    /// Set when the bytecode ends inside a push.
    pub malformed: Option<MalformedInstruction>,
}

impl DecodedInstructions {
    pub fn is_malformed(&self) -> bool {
        self.malformed.is_some()
    }

    /// Re-encode the instructions, including any malformed suffix.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytecode = encode_authentication_instructions(&self.instructions);
        if let Some(malformed) = &self.malformed {
            bytecode.extend(encode_malformed_instruction(malformed));
        }
        bytecode
    }
}

/// The number of little-endian length bytes following a push opcode.
pub fn opcode_to_push_length(opcode: u8) -> usize {
    match opcode {
        OP_PUSHDATA_1 => 1,
        OP_PUSHDATA_2 => 2,
        OP_PUSHDATA_4 => 4,
        _ => 0,
    }
}

fn read_little_endian(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rev()
        .fold(0usize, |value, &byte| (value << 8) | byte as usize)
}

/// Decode `bytecode` into instructions.
///
/// # Arguments
/// * `bytecode` - The raw bytecode.
///
/// # Returns
/// Every well-formed instruction, and the trailing malformed instruction
/// if the bytecode ends inside a push.
pub fn decode_authentication_instructions(bytecode: &[u8]) -> DecodedInstructions {
    let mut decoded = DecodedInstructions::default();
    let mut index = 0;
    while index < bytecode.len() {
        let opcode = bytecode[index];
        if opcode > OP_PUSHDATA_4 {
            decoded.instructions.push(Instruction::operation(opcode));
            index += 1;
            continue;
        }
        let length_bytes = opcode_to_push_length(opcode);
        if length_bytes != 0 && index + length_bytes >= bytecode.len() {
            decoded.malformed = Some(MalformedInstruction::Length {
                opcode,
                expected_length_bytes: length_bytes,
                length: bytecode[index + 1..].to_vec(),
            });
            break;
        }
        let data_bytes = if length_bytes == 0 {
            opcode as usize
        } else {
            read_little_endian(&bytecode[index + 1..index + 1 + length_bytes])
        };
        let data_start = index + 1 + length_bytes;
        let data_end = data_start.saturating_add(data_bytes);
        if data_end > bytecode.len() {
            decoded.malformed = Some(MalformedInstruction::Data {
                opcode,
                expected_data_bytes: data_bytes,
                data: bytecode[data_start..].to_vec(),
            });
            break;
        }
        decoded
            .instructions
            .push(Instruction::push(opcode, bytecode[data_start..data_end].to_vec()));
        index = data_end;
    }
    decoded
}

fn encode_push_length(opcode: u8, length: usize) -> Vec<u8> {
    match opcode_to_push_length(opcode) {
        1 => vec![length as u8],
        2 => (length as u16).to_le_bytes().to_vec(),
        4 => (length as u32).to_le_bytes().to_vec(),
        _ => Vec::new(),
    }
}

/// Encode a single instruction.
pub fn encode_authentication_instruction(instruction: &Instruction) -> Vec<u8> {
    let mut bytecode = vec![instruction.opcode];
    if let Some(data) = &instruction.data {
        bytecode.extend(encode_push_length(instruction.opcode, data.len()));
        bytecode.extend_from_slice(data);
    }
    bytecode
}

/// Encode a malformed instruction exactly as it was decoded.
pub fn encode_malformed_instruction(instruction: &MalformedInstruction) -> Vec<u8> {
    match instruction {
        MalformedInstruction::Length { opcode, length, .. } => {
            let mut bytecode = vec![*opcode];
            bytecode.extend_from_slice(length);
            bytecode
        }
        MalformedInstruction::Data {
            opcode,
            expected_data_bytes,
            data,
        } => {
            let mut bytecode = vec![*opcode];
            bytecode.extend(encode_push_length(*opcode, *expected_data_bytes));
            bytecode.extend_from_slice(data);
            bytecode
        }
    }
}

/// Encode a sequence of instructions.
pub fn encode_authentication_instructions(instructions: &[Instruction]) -> Vec<u8> {
    instructions
        .iter()
        .flat_map(encode_authentication_instruction)
        .collect()
}

fn is_push_data(opcode: u8) -> bool {
    (OP_PUSHDATA_1..=OP_PUSHDATA_4).contains(&opcode)
}

fn format_push_hex(data: &[u8]) -> String {
    if data.is_empty() {
        String::new()
    } else {
        format!("0x{}", hex::encode(data))
    }
}

fn format_missing_bytes(missing: usize) -> String {
    format!("[missing {} byte{}]", missing, if missing == 1 { "" } else { "s" })
}

/// Disassemble one instruction, e.g. `OP_PUSHBYTES_2 0x0102` or
/// `OP_PUSHDATA_1 3 0x010203`.
pub fn disassemble_instruction(names: fn(u8) -> &'static str, instruction: &Instruction) -> String {
    let name = names(instruction.opcode);
    match &instruction.data {
        Some(data) if instruction.opcode != OP_0 => {
            if is_push_data(instruction.opcode) {
                format!("{} {} {}", name, data.len(), format_push_hex(data))
            } else {
                format!("{} {}", name, format_push_hex(data))
            }
        }
        _ => name.to_string(),
    }
}

/// Disassemble a malformed instruction, e.g.
/// `OP_PUSHBYTES_3 0x01[missing 2 bytes]`.
pub fn disassemble_malformed_instruction(names: fn(u8) -> &'static str, instruction: &MalformedInstruction) -> String {
    let name = names(instruction.opcode());
    match instruction {
        MalformedInstruction::Length {
            expected_length_bytes,
            length,
            ..
        } => format!(
            "{} {}{}",
            name,
            format_push_hex(length),
            format_missing_bytes(expected_length_bytes - length.len())
        ),
        MalformedInstruction::Data {
            opcode,
            expected_data_bytes,
            data,
        } => {
            let declared = if is_push_data(*opcode) {
                format!("{} ", expected_data_bytes)
            } else {
                String::new()
            };
            format!(
                "{} {}{}{}",
                name,
                declared,
                format_push_hex(data),
                format_missing_bytes(expected_data_bytes - data.len())
            )
        }
    }
}

/// Disassemble decoded instructions, space-separated.
pub fn disassemble_instructions(names: fn(u8) -> &'static str, decoded: &DecodedInstructions) -> String {
    let mut parts: Vec<String> = decoded
        .instructions
        .iter()
        .map(|instruction| disassemble_instruction(names, instruction))
        .collect();
    if let Some(malformed) = &decoded.malformed {
        parts.push(disassemble_malformed_instruction(names, malformed));
    }
    parts.join(" ")
}

/// Disassemble bytecode using an opcode naming function.
pub fn disassemble_bytecode(names: fn(u8) -> &'static str, bytecode: &[u8]) -> String {
    disassemble_instructions(names, &decode_authentication_instructions(bytecode))
}

/// Disassemble bytecode using BCH opcode names.
pub fn disassemble_bytecode_bch(bytecode: &[u8]) -> String {
    disassemble_bytecode(opcode_name, bytecode)
}

/// Map every opcode name to its single-byte bytecode.
pub fn generate_bytecode_map(names: fn(u8) -> &'static str) -> HashMap<String, Vec<u8>> {
    (0..=u8::MAX)
        .map(|opcode| (names(opcode).to_string(), vec![opcode]))
        .collect()
}

/// The minimal instruction pushing `data`.
///
/// Single bytes from 1 to 16 and `0x81` use `OP_1`..`OP_16` and
/// `OP_1NEGATE`. Other data is prefixed with the shortest push opcode and
/// length.
pub fn encode_data_push(data: &[u8]) -> Vec<u8> {
    let length = data.len();
    let mut bytecode = match length {
        0 => return vec![OP_0],
        1 if data[0] != 0 && data[0] <= 16 => return vec![data[0] + 0x50],
        1 if data[0] == 0x81 => return vec![OP_1NEGATE],
        _ if length <= OP_PUSHBYTES_75 as usize => vec![length as u8],
        _ if length <= 0xff => vec![OP_PUSHDATA_1, length as u8],
        _ if length <= 0xffff => {
            let mut prefix = vec![OP_PUSHDATA_2];
            prefix.extend((length as u16).to_le_bytes());
            prefix
        }
        _ => {
            let mut prefix = vec![OP_PUSHDATA_4];
            prefix.extend((length as u32).to_le_bytes());
            prefix
        }
    };
    bytecode.extend_from_slice(data);
    bytecode
}

/// Whether `opcode` is the minimal way to push `data`.
pub fn is_minimal_data_push(opcode: u8, data: &[u8]) -> bool {
    match data.len() {
        0 => opcode == OP_0,
        1 if (1..=16).contains(&data[0]) => opcode == data[0] + 0x50,
        1 if data[0] == 0x81 => opcode == OP_1NEGATE,
        1 => opcode == 1,
        length if length <= OP_PUSHBYTES_75 as usize => opcode as usize == length,
        length if length <= 0xff => opcode == OP_PUSHDATA_1,
        length if length <= 0xffff => opcode == OP_PUSHDATA_2,
        _ => true,
    }
}

/// Whether every instruction in `bytecode` is a push (`OP_16` or lower).
///
/// `OP_RESERVED` falls within the push range and is accepted.
pub fn is_push_only(bytecode: &[u8]) -> bool {
    let decoded = decode_authentication_instructions(bytecode);
    decoded
        .instructions
        .iter()
        .all(|instruction| instruction.opcode <= OP_16)
        && decoded
            .malformed
            .as_ref()
            .map_or(true, |malformed| malformed.opcode() <= OP_16)
}

/// The number pushed by `OP_0`, `OP_1NEGATE` or `OP_1`..`OP_16`.
pub fn push_number_opcode_to_number(opcode: u8) -> Option<i64> {
    match opcode {
        OP_0 => Some(0),
        OP_1NEGATE => Some(-1),
        0x51..=OP_16 => Some(opcode as i64 - 0x50),
        _ => None,
    }
}
