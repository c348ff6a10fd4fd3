//! Flow control operations.

use crate::error::{AuthenticationError, AuthenticationErrorCode};
use crate::state::{ControlItem, ProgramState};

impl ProgramState {
    /// `OP_IF` (`invert = false`) and `OP_NOTIF` (`invert = true`).
    ///
    /// In an unexecuted branch nothing is popped and an untaken branch is
    /// opened, so that the matching `OP_ENDIF` stays balanced.
    pub(crate) fn op_if(&mut self, invert: bool) -> Result<(), AuthenticationError> {
        let taken = if self.is_executing() {
            self.pop_bool()? != invert
        } else {
            false
        };
        self.control_stack.push(ControlItem::Branch(taken));
        Ok(())
    }

    pub(crate) fn op_else(&mut self) -> Result<(), AuthenticationError> {
        match self.control_stack.last_mut() {
            Some(ControlItem::Branch(taken)) => {
                *taken = !*taken;
                Ok(())
            }
            _ => Err(AuthenticationErrorCode::UnexpectedElse.into()),
        }
    }

    pub(crate) fn op_endif(&mut self) -> Result<(), AuthenticationError> {
        match self.control_stack.last() {
            Some(ControlItem::Branch(_)) => {
                self.control_stack.pop();
                Ok(())
            }
            _ => Err(AuthenticationErrorCode::UnexpectedEndIf.into()),
        }
    }

    pub(crate) fn op_verify(&mut self) -> Result<(), AuthenticationError> {
        if self.pop_bool()? {
            Ok(())
        } else {
            Err(AuthenticationErrorCode::FailedVerify.into())
        }
    }

    pub(crate) fn op_return(&mut self) -> Result<(), AuthenticationError> {
        Err(AuthenticationErrorCode::CalledReturn.into())
    }

    pub(crate) fn op_reserved(&mut self) -> Result<(), AuthenticationError> {
        Err(AuthenticationErrorCode::CalledReserved.into())
    }

    pub(crate) fn op_disabled(&mut self) -> Result<(), AuthenticationError> {
        Err(AuthenticationErrorCode::DisabledOpcode.into())
    }

    pub(crate) fn op_unknown(&mut self) -> Result<(), AuthenticationError> {
        Err(AuthenticationErrorCode::UnknownOpcode.into())
    }

    pub(crate) fn op_nop(&mut self) -> Result<(), AuthenticationError> {
        Ok(())
    }

    /// `OP_NOP1` and `OP_NOP4`..`OP_NOP10`: disallowed by standardness.
    pub(crate) fn op_upgradable_nop(&mut self, standard: bool) -> Result<(), AuthenticationError> {
        if standard {
            Err(AuthenticationErrorCode::CalledUpgradableNop.into())
        } else {
            Ok(())
        }
    }
}
