//! A draft instruction set combining BCH 2023 with proposed upgrades:
//! `OP_BEGIN`/`OP_UNTIL` loops, 10,000-byte stack items and VM numbers,
//! and density-based hashing limits in place of the operation count limit.

use std::sync::Arc;

use bch_transaction::{AuthenticationProgram, Output, Transaction};

use super::bch_2023::{evaluate_bch_2023, operations_bch_2023, success_bch_2023, verify_bch_2023};
use super::InstructionSet;
use crate::consensus::{Capabilities, Consensus};
use crate::error::AuthenticationError;
use crate::instruction::Instruction;
use crate::opcodes::{OP_0, OP_BEGIN, OP_PUSHDATA_4, OP_UNTIL};
use crate::operations::{operation, Operation};
use crate::state::ProgramState;

/// Fixed per-input bytes counted towards the hashing density budget: the
/// outpoint, sequence number and the smallest unlocking bytecode length
/// prefix.
const INPUT_OVERHEAD_BYTES: usize = 41;
const CONSENSUS_ITERATIONS_PER_BYTE: usize = 4;

/// The hash digest iterations a single input may perform: half an
/// iteration per spending byte under standardness, four under consensus.
///
/// # Arguments
/// * `unlocking_bytecode_length` - Length of the input's unlocking bytecode.
/// * `standard` - Apply the standard (stricter) density.
pub fn maximum_hash_digest_iterations(unlocking_bytecode_length: usize, standard: bool) -> usize {
    let spending_bytes = INPUT_OVERHEAD_BYTES + unlocking_bytecode_length;
    if standard {
        spending_bytes / 2
    } else {
        spending_bytes * CONSENSUS_ITERATIONS_PER_BYTE
    }
}

pub struct InstructionSetChips {
    capabilities: Capabilities,
    consensus: Consensus,
    operations: Vec<Operation>,
    standard: bool,
}

impl InstructionSetChips {
    pub fn new(capabilities: Capabilities, standard: bool) -> Self {
        InstructionSetChips {
            capabilities,
            consensus: Consensus::chips(),
            operations: operations_chips(standard),
            standard,
        }
    }
}

/// The BCH 2023 table with loops. Oversized pushes report the stack item
/// length, and loop control runs in unexecuted branches so that nesting is
/// tracked.
fn operations_chips(standard: bool) -> Vec<Operation> {
    let mut table = operations_bch_2023(standard);
    let push = operation(|state, _| state.op_push_data(true));
    for opcode in OP_0..=OP_PUSHDATA_4 {
        table[usize::from(opcode)] = push.clone();
    }
    table[usize::from(OP_BEGIN)] = operation(|state, _| state.op_begin());
    table[usize::from(OP_UNTIL)] = operation(|state, _| state.op_until());
    table
}

impl InstructionSet for InstructionSetChips {
    fn operation(&self, opcode: u8) -> &Operation {
        &self.operations[usize::from(opcode)]
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn consensus(&self) -> &Consensus {
        &self.consensus
    }

    fn standard(&self) -> bool {
        self.standard
    }

    fn create_state(
        &self,
        program: Arc<AuthenticationProgram>,
        instructions: Vec<Instruction>,
        stack: Vec<Vec<u8>>,
    ) -> ProgramState {
        let unlocking_bytecode_length = program.input().map_or(0, |input| input.unlocking_bytecode.len());
        let mut state = ProgramState::new(program, instructions, stack, self.consensus);
        state.maximum_hash_digest_iterations =
            Some(maximum_hash_digest_iterations(unlocking_bytecode_length, self.standard));
        state
    }

    fn success(&self, state: &ProgramState) -> Result<(), AuthenticationError> {
        success_bch_2023(state)
    }

    fn evaluate(
        &self,
        program: Arc<AuthenticationProgram>,
        evaluate_segment: &mut dyn FnMut(ProgramState) -> ProgramState,
    ) -> ProgramState {
        evaluate_bch_2023(self, program, evaluate_segment)
    }

    fn verify(
        &self,
        transaction: &Transaction,
        source_outputs: &[Output],
        evaluate_input: &mut dyn FnMut(usize) -> Result<(), AuthenticationError>,
    ) -> Result<(), String> {
        verify_bch_2023(&self.consensus, self.standard, transaction, source_outputs, evaluate_input)
    }
}
