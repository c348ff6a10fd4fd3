//! The authentication virtual machine: drives an [`InstructionSet`] over
//! program states.

use std::sync::Arc;

use bch_transaction::{AuthenticationProgram, Output, Transaction};
use tracing::{debug, trace, warn};

use crate::consensus::Capabilities;
use crate::error::AuthenticationError;
use crate::instruction_set::{InstructionSet, InstructionSetBch2022, InstructionSetBch2023, InstructionSetChips};
use crate::state::ProgramState;

/// A transaction together with the outputs spent by each of its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTransaction {
    pub transaction: Transaction,
    pub source_outputs: Vec<Output>,
}

/// Evaluates and verifies programs under one instruction set.
pub struct AuthenticationVirtualMachine {
    instruction_set: Box<dyn InstructionSet>,
}

impl AuthenticationVirtualMachine {
    pub fn new(instruction_set: Box<dyn InstructionSet>) -> Self {
        AuthenticationVirtualMachine { instruction_set }
    }

    /// A BCH 2022 machine using the native capabilities.
    pub fn bch_2022(standard: bool) -> Self {
        Self::new(Box::new(InstructionSetBch2022::new(Capabilities::native(), standard)))
    }

    /// A BCH 2023 machine using the native capabilities.
    pub fn bch_2023(standard: bool) -> Self {
        Self::new(Box::new(InstructionSetBch2023::new(Capabilities::native(), standard)))
    }

    /// A machine for the draft CHIPs instruction set using the native
    /// capabilities.
    pub fn chips(standard: bool) -> Self {
        Self::new(Box::new(InstructionSetChips::new(Capabilities::native(), standard)))
    }

    pub fn instruction_set(&self) -> &dyn InstructionSet {
        self.instruction_set.as_ref()
    }

    /// Whether `state` should take another step.
    pub fn state_continue(&self, state: &ProgramState) -> bool {
        self.instruction_set.should_continue(state)
    }

    /// Execute the instruction at `state.ip` in place, then apply the
    /// per-step resource limits.
    pub fn state_step_mutate(&self, state: &mut ProgramState) {
        let Some(opcode) = state.instructions.get(state.ip).map(|instruction| instruction.opcode) else {
            return;
        };
        let operation = self.instruction_set.operation(opcode);
        if let Err(error) = operation(state, self.instruction_set.capabilities()) {
            state.apply_error(error);
        }
        self.instruction_set.every(state);
        state.ip += 1;
    }

    /// Return the state following one step of `state`.
    pub fn state_step(&self, state: &ProgramState) -> ProgramState {
        let mut next = state.clone();
        self.state_step_mutate(&mut next);
        next
    }

    /// Step `state` until it errors or runs out of instructions.
    pub fn state_evaluate(&self, mut state: ProgramState) -> ProgramState {
        while self.state_continue(&state) {
            self.state_step_mutate(&mut state);
        }
        state
    }

    /// Step `state` to completion, returning the initial state followed by
    /// the state after every step.
    pub fn state_debug(&self, state: ProgramState) -> Vec<ProgramState> {
        let mut states = Vec::new();
        self.debug_segment(state, &mut states);
        states
    }

    fn debug_segment(&self, mut state: ProgramState, states: &mut Vec<ProgramState>) -> ProgramState {
        states.push(state.clone());
        while self.state_continue(&state) {
            let ip = state.ip;
            self.state_step_mutate(&mut state);
            trace!(
                ip,
                depth = state.stack.len(),
                error = ?state.error,
                "stepped program state"
            );
            states.push(state.clone());
        }
        state
    }

    /// The final judgement of `state` under the instruction set's rules.
    pub fn state_success(&self, state: &ProgramState) -> Result<(), AuthenticationError> {
        self.instruction_set.success(state)
    }

    /// Evaluate `program` and return its final state.
    pub fn evaluate(&self, program: AuthenticationProgram) -> ProgramState {
        let input_index = program.input_index;
        let state = self
            .instruction_set
            .evaluate(Arc::new(program), &mut |state| self.state_evaluate(state));
        debug!(input_index, error = ?state.error, "evaluated program");
        state
    }

    /// Evaluate `program`, returning every intermediate state of every
    /// bytecode segment followed by the final evaluation result.
    pub fn debug(&self, program: AuthenticationProgram) -> Vec<ProgramState> {
        let mut states = Vec::new();
        let result = self
            .instruction_set
            .evaluate(Arc::new(program), &mut |state| self.debug_segment(state, &mut states));
        debug!(steps = states.len(), error = ?result.error, "debugged program");
        states.push(result);
        states
    }

    /// Verify a transaction: whole-transaction rules first, then the
    /// evaluation of every input.
    ///
    /// # Returns
    /// `Ok(())` if the transaction is valid, otherwise a human-readable
    /// reason naming the failing rule or input index.
    pub fn verify(&self, resolved: &ResolvedTransaction) -> Result<(), String> {
        let result = self.instruction_set.verify(
            &resolved.transaction,
            &resolved.source_outputs,
            &mut |input_index| {
                let program = AuthenticationProgram::new(
                    resolved.transaction.clone(),
                    resolved.source_outputs.clone(),
                    input_index,
                );
                self.state_success(&self.evaluate(program))
            },
        );
        if let Err(reason) = &result {
            warn!(%reason, "transaction verification failed");
        }
        result
    }
}
