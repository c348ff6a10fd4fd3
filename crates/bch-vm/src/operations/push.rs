//! Push operations.

use num_bigint::BigInt;

use crate::error::{AuthenticationError, AuthenticationErrorCode};
use crate::instruction::is_minimal_data_push;
use crate::state::ProgramState;

impl ProgramState {
    /// Push the data of the current instruction.
    ///
    /// The push length is checked even in unexecuted branches. When
    /// `report_item_length` is set, an oversized push is reported as an
    /// excessive stack item rather than an excessive push.
    pub(crate) fn op_push_data(&mut self, report_item_length: bool) -> Result<(), AuthenticationError> {
        let Some(instruction) = self.instructions.get(self.ip) else {
            return Ok(());
        };
        let data = instruction.data.as_deref().unwrap_or(&[]);
        let maximum = self.consensus.maximum_stack_item_length;
        if data.len() > maximum {
            return Err(if report_item_length {
                AuthenticationError::with_details(
                    AuthenticationErrorCode::ExceededMaximumStackItemLength,
                    format!("Maximum stack item length: {}; item length: {} bytes.", maximum, data.len()),
                )
            } else {
                AuthenticationErrorCode::ExceedsMaximumPush.into()
            });
        }
        if !self.is_executing() {
            return Ok(());
        }
        if !is_minimal_data_push(instruction.opcode, data) {
            return Err(AuthenticationErrorCode::NonMinimalPush.into());
        }
        let item = data.to_vec();
        self.stack.push(item);
        Ok(())
    }

    /// `OP_1NEGATE` and `OP_1` through `OP_16`.
    pub(crate) fn op_push_number(&mut self, value: i64) -> Result<(), AuthenticationError> {
        self.push_vm_number(&BigInt::from(value))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bch_transaction::{AuthenticationProgram, Input, Output, Transaction};

    use crate::consensus::Consensus;
    use crate::instruction::Instruction;
    use crate::opcodes::{OP_PUSHBYTES_1, OP_PUSHDATA_1};
    use crate::state::{ControlItem, ProgramState};
    use crate::error::AuthenticationErrorCode;

    fn state_with(instruction: Instruction, consensus: Consensus) -> ProgramState {
        let mut transaction = Transaction::new();
        transaction.inputs.push(Input::default());
        let program = AuthenticationProgram::new(transaction, vec![Output::new(0, vec![])], 0);
        ProgramState::new(Arc::new(program), vec![instruction], vec![], consensus)
    }

    #[test]
    fn test_push_data() {
        let mut state = state_with(Instruction::push(OP_PUSHBYTES_1, vec![0x42]), Consensus::bch_2022());
        state.op_push_data(false).unwrap();
        assert_eq!(state.stack, vec![vec![0x42]]);
    }

    #[test]
    fn test_push_requires_minimal_encoding() {
        let mut state = state_with(Instruction::push(OP_PUSHDATA_1, vec![0x42]), Consensus::bch_2022());
        let error = state.op_push_data(false).unwrap_err();
        assert_eq!(error.code, AuthenticationErrorCode::NonMinimalPush);
    }

    #[test]
    fn test_oversized_push_fails_in_unexecuted_branch() {
        let mut state = state_with(Instruction::push(0x4d, vec![0; 521]), Consensus::bch_2022());
        state.control_stack.push(ControlItem::Branch(false));
        let error = state.op_push_data(false).unwrap_err();
        assert_eq!(error.code, AuthenticationErrorCode::ExceedsMaximumPush);

        let mut chips = state_with(Instruction::push(0x4d, vec![0; 10_001]), Consensus::chips());
        let error = chips.op_push_data(true).unwrap_err();
        assert_eq!(error.code, AuthenticationErrorCode::ExceededMaximumStackItemLength);
    }

    #[test]
    fn test_non_minimal_push_ignored_when_not_executing() {
        let mut state = state_with(Instruction::push(OP_PUSHDATA_1, vec![0x42]), Consensus::bch_2022());
        state.control_stack.push(ControlItem::Branch(false));
        assert!(state.op_push_data(false).is_ok());
        assert!(state.stack.is_empty());
    }
}
