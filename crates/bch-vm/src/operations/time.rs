//! Locktime operations.

use bch_transaction::input::SEQUENCE_FINAL;
use num_traits::{Signed, ToPrimitive};

use crate::consensus::LOCKTIME_THRESHOLD;
use crate::error::{AuthenticationError, AuthenticationErrorCode};
use crate::state::ProgramState;
use crate::vm_number::decode_vm_number;

const MAXIMUM_LOCKTIME_LENGTH: usize = 5;
const SEQUENCE_LOCKTIME_DISABLE_FLAG: i64 = 1 << 31;
const SEQUENCE_LOCKTIME_TYPE_FLAG: i64 = 1 << 22;
const SEQUENCE_LOCKTIME_MASK: i64 = 0x0000_ffff;
const MINIMUM_SEQUENCE_VERSION: u32 = 2;

impl ProgramState {
    /// Read (without popping) the required locktime from the top item.
    fn required_locktime(&self) -> Result<i64, AuthenticationError> {
        let item = self.peek(0)?;
        let value = decode_vm_number(item, MAXIMUM_LOCKTIME_LENGTH, true)
            .map_err(|e| AuthenticationError::with_details(AuthenticationErrorCode::InvalidVmNumber, e.to_string()))?;
        if value.is_negative() {
            return Err(AuthenticationErrorCode::NegativeLocktime.into());
        }
        value
            .to_i64()
            .ok_or_else(|| AuthenticationErrorCode::InvalidVmNumber.into())
    }

    fn current_sequence_number(&self) -> Result<u32, AuthenticationError> {
        self.program
            .input()
            .map(|input| input.sequence_number)
            .ok_or_else(|| AuthenticationErrorCode::InvalidTransactionInputIndex.into())
    }

    pub(crate) fn op_check_locktime_verify(&mut self) -> Result<(), AuthenticationError> {
        let required = self.required_locktime()?;
        let locktime = i64::from(self.program.transaction.locktime);
        let same_type = (required < LOCKTIME_THRESHOLD) == (locktime < LOCKTIME_THRESHOLD);
        if !same_type {
            return Err(AuthenticationErrorCode::IncompatibleLocktimeType.into());
        }
        if required > locktime {
            return Err(AuthenticationErrorCode::UnsatisfiedLocktime.into());
        }
        if self.current_sequence_number()? == SEQUENCE_FINAL {
            return Err(AuthenticationErrorCode::LocktimeDisabled.into());
        }
        Ok(())
    }

    pub(crate) fn op_check_sequence_verify(&mut self) -> Result<(), AuthenticationError> {
        let required = self.required_locktime()?;
        if required & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return Ok(());
        }
        if self.program.transaction.version < MINIMUM_SEQUENCE_VERSION {
            return Err(AuthenticationErrorCode::CheckSequenceUnavailable.into());
        }
        let sequence = i64::from(self.current_sequence_number()?);
        if sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return Err(AuthenticationErrorCode::UnmatchedSequenceDisable.into());
        }
        if (required & SEQUENCE_LOCKTIME_TYPE_FLAG) != (sequence & SEQUENCE_LOCKTIME_TYPE_FLAG) {
            return Err(AuthenticationErrorCode::IncompatibleSequenceType.into());
        }
        if (required & SEQUENCE_LOCKTIME_MASK) > (sequence & SEQUENCE_LOCKTIME_MASK) {
            return Err(AuthenticationErrorCode::UnsatisfiedSequenceNumber.into());
        }
        Ok(())
    }
}
