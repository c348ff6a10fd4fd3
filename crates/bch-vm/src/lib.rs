//! Bitcoin Cash SDK - authentication virtual machine.
//!
//! Decodes, disassembles and evaluates Bitcoin Cash bytecode. Evaluation
//! is driven by the [`AuthenticationVirtualMachine`] over one of the
//! [`InstructionSet`]s:
//! - [`InstructionSetBch2022`]: the rules in effect since May 2022
//! - [`InstructionSetBch2023`]: adds CashTokens and P2SH32
//! - [`InstructionSetChips`]: a draft set with loops and relaxed limits
//!
//! Evaluation failures are values: they are stored on the
//! [`ProgramState`] as an [`AuthenticationError`] rather than returned.

pub mod consensus;
pub mod encoding;
pub mod error;
pub mod instruction;
pub mod instruction_set;
pub mod opcodes;
pub mod operations;
pub mod standard;
pub mod state;
pub mod token_validation;
pub mod vm;
pub mod vm_number;

pub use consensus::{Capabilities, Consensus};
pub use error::{AuthenticationError, AuthenticationErrorCode};
pub use instruction::{
    decode_authentication_instructions, disassemble_bytecode, disassemble_bytecode_bch,
    encode_authentication_instructions, encode_data_push, DecodedInstructions, Instruction,
    MalformedInstruction,
};
pub use instruction_set::{InstructionSet, InstructionSetBch2022, InstructionSetBch2023, InstructionSetChips};
pub use state::{ControlItem, ProgramState, SignedMessage};
pub use token_validation::verify_transaction_tokens;
pub use vm::{AuthenticationVirtualMachine, ResolvedTransaction};
pub use vm_number::{decode_vm_number, encode_vm_number, VmNumberError};

#[cfg(test)]
mod tests;
