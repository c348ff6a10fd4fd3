//! `OP_BEGIN` ... `OP_UNTIL` loops.

use crate::consensus::MAXIMUM_BYTECODE_LENGTH;
use crate::error::{AuthenticationError, AuthenticationErrorCode};
use crate::instruction::encode_authentication_instructions;
use crate::state::{ControlItem, ProgramState};

impl ProgramState {
    pub(crate) fn op_begin(&mut self) -> Result<(), AuthenticationError> {
        let start = self.is_executing().then_some(self.ip);
        self.control_stack.push(ControlItem::Loop(start));
        Ok(())
    }

    /// `OP_UNTIL`: pop an item and jump back to the matching `OP_BEGIN`
    /// unless it is exactly `0x01`.
    ///
    /// Each iteration adds the length of the loop body to the repeated
    /// bytes counter, which together with the bytecode length may not
    /// exceed the maximum bytecode length.
    pub(crate) fn op_until(&mut self) -> Result<(), AuthenticationError> {
        let start = match self.control_stack.pop() {
            Some(ControlItem::Loop(start)) => start,
            _ => return Err(AuthenticationErrorCode::UnexpectedUntil.into()),
        };
        let Some(start) = start else {
            return Ok(());
        };
        if !self.is_executing() {
            return Err(AuthenticationErrorCode::UnexpectedUntilMissingEndIf.into());
        }
        let body = self.instructions.get(start..self.ip).unwrap_or(&[]);
        self.repeated_bytes += encode_authentication_instructions(body).len();
        let active_bytecode_length = encode_authentication_instructions(&self.instructions).len();
        if self.repeated_bytes + active_bytecode_length > MAXIMUM_BYTECODE_LENGTH {
            return Err(AuthenticationError::with_details(
                AuthenticationErrorCode::ExcessiveLooping,
                format!(
                    "Repeated bytes: {}; active bytecode length: {}",
                    self.repeated_bytes, active_bytecode_length
                ),
            ));
        }
        if self.pop()? != [0x01] {
            self.control_stack.push(ControlItem::Loop(Some(start)));
            self.ip = start;
        }
        Ok(())
    }
}
