//! Bitwise logic and equality.

use crate::error::{AuthenticationError, AuthenticationErrorCode};
use crate::state::ProgramState;

impl ProgramState {
    /// `OP_AND`, `OP_OR` and `OP_XOR`: combine two equal-length items
    /// byte by byte.
    pub(crate) fn op_bitwise(&mut self, combine: fn(u8, u8) -> u8) -> Result<(), AuthenticationError> {
        let [a, b] = self.pop_items::<2>()?;
        if a.len() != b.len() {
            return Err(AuthenticationErrorCode::MismatchedBitwiseOperandLength.into());
        }
        let result = a.iter().zip(&b).map(|(&x, &y)| combine(x, y)).collect();
        self.push(result);
        Ok(())
    }

    pub(crate) fn op_equal(&mut self) -> Result<(), AuthenticationError> {
        let [a, b] = self.pop_items::<2>()?;
        self.push_bool(a == b);
        Ok(())
    }

    pub(crate) fn op_equal_verify(&mut self) -> Result<(), AuthenticationError> {
        self.op_equal()?;
        self.op_verify()
    }
}
