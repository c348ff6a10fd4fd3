//! Instruction sets: the operation table and consensus rules of one
//! protocol upgrade.
//!
//! An instruction set never holds evaluation state. The virtual machine
//! drives evaluation by calling [`InstructionSet::evaluate`], which in turn
//! calls back into the machine to run each bytecode segment to completion.

pub mod bch_2022;
pub mod bch_2023;
pub mod chips;

use std::sync::Arc;

use bch_transaction::{AuthenticationProgram, Output, Transaction};

use crate::consensus::{Capabilities, Consensus};
use crate::error::{AuthenticationError, AuthenticationErrorCode};
use crate::instruction::{
    decode_authentication_instructions, disassemble_malformed_instruction, is_push_only, Instruction,
};
use crate::opcodes::opcode_name;
use crate::operations::{operation, Operation};
use crate::state::ProgramState;

pub use bch_2022::InstructionSetBch2022;
pub use bch_2023::InstructionSetBch2023;
pub use chips::InstructionSetChips;

/// The rules of one protocol upgrade.
pub trait InstructionSet: Send + Sync {
    /// The operation for `opcode`.
    fn operation(&self, opcode: u8) -> &Operation;

    fn capabilities(&self) -> &Capabilities;

    fn consensus(&self) -> &Consensus;

    /// Whether standardness rules are enforced in addition to consensus.
    fn standard(&self) -> bool;

    /// Create a state for evaluating `instructions`.
    fn create_state(
        &self,
        program: Arc<AuthenticationProgram>,
        instructions: Vec<Instruction>,
        stack: Vec<Vec<u8>>,
    ) -> ProgramState {
        ProgramState::new(program, instructions, stack, *self.consensus())
    }

    /// Whether evaluation of `state` should take another step.
    fn should_continue(&self, state: &ProgramState) -> bool {
        state.error.is_none() && state.ip < state.instructions.len()
    }

    /// Resource limits checked after every step.
    fn every(&self, state: &mut ProgramState) {
        check_resource_limits(state);
    }

    /// The final judgement of a completed evaluation.
    fn success(&self, state: &ProgramState) -> Result<(), AuthenticationError>;

    /// Evaluate the unlocking, locking and (for P2SH) redeem bytecode of
    /// `program`, calling `evaluate_segment` to run each state to
    /// completion.
    fn evaluate(
        &self,
        program: Arc<AuthenticationProgram>,
        evaluate_segment: &mut dyn FnMut(ProgramState) -> ProgramState,
    ) -> ProgramState;

    /// Verify a transaction against consensus (and, if enabled,
    /// standardness) rules. `evaluate_input` evaluates one input index and
    /// reports its success.
    fn verify(
        &self,
        transaction: &Transaction,
        source_outputs: &[Output],
        evaluate_input: &mut dyn FnMut(usize) -> Result<(), AuthenticationError>,
    ) -> Result<(), String>;
}

/// Check the stack depth, operation count and hashing limits.
pub fn check_resource_limits(state: &mut ProgramState) {
    let consensus = state.consensus;
    if state.stack.len() + state.alternate_stack.len() > consensus.maximum_stack_depth {
        state.apply_error(AuthenticationError::with_details(
            AuthenticationErrorCode::ExceededMaximumStackDepth,
            format!("Maximum stack depth: {}.", consensus.maximum_stack_depth),
        ));
    }
    if let Some(maximum) = consensus.maximum_operation_count {
        if state.operation_count > maximum {
            state.apply_error(AuthenticationErrorCode::ExceededMaximumOperationCount.into());
        }
    }
    if let Some(maximum) = state.maximum_hash_digest_iterations {
        if state.hash_digest_iterations > maximum {
            let required = state.hash_digest_iterations;
            state.apply_error(AuthenticationError::with_details(
                AuthenticationErrorCode::ExcessiveHashing,
                format!(
                    "Maximum hash digest iterations: {}; required cumulative iterations: {}.",
                    maximum, required
                ),
            ));
        }
    }
}

/// A state for `program` which failed before evaluating any instruction.
pub(crate) fn failed_state(
    set: &dyn InstructionSet,
    program: Arc<AuthenticationProgram>,
    error: AuthenticationError,
) -> ProgramState {
    let mut state = set.create_state(program, Vec::new(), Vec::new());
    state.apply_error(error);
    state
}

/// The decoded unlocking and locking bytecode of a program.
pub(crate) struct DecodedProgram {
    pub unlocking: Vec<Instruction>,
    pub locking: Vec<Instruction>,
    pub locking_bytecode: Vec<u8>,
}

/// Decode the unlocking and locking bytecode of `program`, rejecting
/// missing indexes, oversized or malformed bytecode and unlocking bytecode
/// which is not push-only.
pub(crate) fn decode_program(
    program: &AuthenticationProgram,
    consensus: &Consensus,
) -> Result<DecodedProgram, AuthenticationError> {
    let input = program.input().ok_or_else(|| {
        AuthenticationError::with_details(
            AuthenticationErrorCode::InvalidTransactionInputIndex,
            format!("Input index: {}.", program.input_index),
        )
    })?;
    let source_output = program.source_output().ok_or_else(|| {
        AuthenticationError::with_details(
            AuthenticationErrorCode::InvalidTransactionUtxoIndex,
            format!("Input index: {}.", program.input_index),
        )
    })?;
    let unlocking_bytecode = &input.unlocking_bytecode;
    let locking_bytecode = &source_output.locking_bytecode;

    if unlocking_bytecode.len() > consensus.maximum_bytecode_length {
        return Err(AuthenticationError::with_details(
            AuthenticationErrorCode::ExceededMaximumBytecodeLengthUnlocking,
            format!(
                "Maximum bytecode length: {} bytes. Unlocking bytecode length: {} bytes.",
                consensus.maximum_bytecode_length,
                unlocking_bytecode.len()
            ),
        ));
    }
    let unlocking = decode_authentication_instructions(unlocking_bytecode);
    if let Some(malformed) = &unlocking.malformed {
        return Err(AuthenticationError::with_details(
            AuthenticationErrorCode::MalformedUnlockingBytecode,
            format!(
                "Malformed instruction: {}.",
                disassemble_malformed_instruction(opcode_name, malformed)
            ),
        ));
    }
    if !is_push_only(unlocking_bytecode) {
        return Err(AuthenticationErrorCode::RequiresPushOnly.into());
    }
    if locking_bytecode.len() > consensus.maximum_bytecode_length {
        return Err(AuthenticationError::with_details(
            AuthenticationErrorCode::ExceededMaximumBytecodeLengthLocking,
            format!(
                "Maximum bytecode length: {} bytes. Locking bytecode length: {} bytes.",
                consensus.maximum_bytecode_length,
                locking_bytecode.len()
            ),
        ));
    }
    let locking = decode_authentication_instructions(locking_bytecode);
    if let Some(malformed) = &locking.malformed {
        return Err(AuthenticationError::with_details(
            AuthenticationErrorCode::MalformedLockingBytecode,
            format!(
                "Malformed instruction: {}.",
                disassemble_malformed_instruction(opcode_name, malformed)
            ),
        ));
    }
    Ok(DecodedProgram {
        unlocking: unlocking.instructions,
        locking: locking.instructions,
        locking_bytecode: locking_bytecode.clone(),
    })
}

/// Wrap a state-only operation method.
pub(crate) fn state_op(f: fn(&mut ProgramState) -> Result<(), AuthenticationError>) -> Operation {
    operation(move |state, _| f(state))
}

/// Wrap an operation method which uses the injected capabilities.
pub(crate) fn capability_op(
    f: fn(&mut ProgramState, &Capabilities) -> Result<(), AuthenticationError>,
) -> Operation {
    operation(f)
}

/// The data carrier bytes of a transaction: each arbitrary data output
/// counts its locking bytecode length plus one.
pub(crate) fn data_carrier_bytes(transaction: &Transaction) -> usize {
    transaction
        .outputs
        .iter()
        .filter(|output| crate::standard::is_arbitrary_data_output(&output.locking_bytecode))
        .map(|output| output.locking_bytecode.len() + 1)
        .sum()
}
