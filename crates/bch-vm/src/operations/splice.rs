//! Byte sequence operations.

use crate::error::{AuthenticationError, AuthenticationErrorCode};
use crate::state::ProgramState;
use crate::vm_number::{decode_vm_number, encode_vm_number};

impl ProgramState {
    pub(crate) fn op_cat(&mut self) -> Result<(), AuthenticationError> {
        let [mut a, b] = self.pop_items::<2>()?;
        a.extend(b);
        self.push_checked(a)
    }

    pub(crate) fn op_split(&mut self) -> Result<(), AuthenticationError> {
        let index = self.pop_vm_number()?;
        let item = self.pop()?;
        let split = usize::try_from(&index)
            .ok()
            .filter(|&split| split <= item.len())
            .ok_or_else(|| {
                AuthenticationError::with_details(
                    AuthenticationErrorCode::InvalidSplitIndex,
                    format!("stack item length: {}; requested split index: {}.", item.len(), index),
                )
            })?;
        let (left, right) = item.split_at(split);
        let (left, right) = (left.to_vec(), right.to_vec());
        self.push(left);
        self.push(right);
        Ok(())
    }

    /// `OP_NUM2BIN`: re-encode a number using exactly the requested byte
    /// length, moving the sign bit to the final byte.
    pub(crate) fn op_num2bin(&mut self) -> Result<(), AuthenticationError> {
        let requested = self.pop_vm_number()?;
        let item = self.pop()?;
        let maximum = self.consensus.maximum_stack_item_length;
        let length = usize::try_from(&requested)
            .ok()
            .filter(|&length| length <= maximum)
            .ok_or_else(|| {
                AuthenticationError::with_details(
                    AuthenticationErrorCode::ExceededMaximumStackItemLength,
                    format!("Maximum stack item length: {} bytes. Item length: {} bytes.", maximum, requested),
                )
            })?;
        let mut minimal = minimally_encode(&item);
        if minimal.len() > length {
            return Err(AuthenticationError::with_details(
                AuthenticationErrorCode::InsufficientLength,
                format!(
                    "Minimum necessary byte length: {}. Requested byte length: {}.",
                    minimal.len(),
                    length
                ),
            ));
        }
        let negative = minimal.last_mut().map_or(false, |last| {
            let negative = *last & 0x80 != 0;
            *last &= 0x7f;
            negative
        });
        minimal.resize(length, 0);
        if negative {
            if let Some(last) = minimal.last_mut() {
                *last |= 0x80;
            }
        }
        self.push(minimal);
        Ok(())
    }

    pub(crate) fn op_bin2num(&mut self) -> Result<(), AuthenticationError> {
        let item = self.pop()?;
        let minimal = minimally_encode(&item);
        if minimal.len() > self.consensus.maximum_vm_number_length {
            return Err(AuthenticationErrorCode::ExceededMaximumVmNumberByteLength.into());
        }
        self.push(minimal);
        Ok(())
    }

    pub(crate) fn op_size(&mut self) -> Result<(), AuthenticationError> {
        let length = self.peek(0)?.len();
        self.push_number(length as i64)
    }

    pub(crate) fn op_reverse_bytes(&mut self) -> Result<(), AuthenticationError> {
        let mut item = self.pop()?;
        item.reverse();
        self.push(item);
        Ok(())
    }
}

/// The minimal VM number encoding of an arbitrarily padded number.
fn minimally_encode(item: &[u8]) -> Vec<u8> {
    decode_vm_number(item, item.len(), false)
        .map(|value| encode_vm_number(&value))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bch_transaction::{AuthenticationProgram, Input, Output, Transaction};

    use crate::consensus::Consensus;
    use crate::error::AuthenticationErrorCode;
    use crate::state::ProgramState;

    fn state(stack: Vec<Vec<u8>>) -> ProgramState {
        let mut transaction = Transaction::new();
        transaction.inputs.push(Input::default());
        let program = AuthenticationProgram::new(transaction, vec![Output::new(0, vec![])], 0);
        ProgramState::new(Arc::new(program), vec![], stack, Consensus::bch_2022())
    }

    #[test]
    fn test_cat_and_split() {
        let mut s = state(vec![vec![1, 2], vec![3]]);
        s.op_cat().unwrap();
        assert_eq!(s.stack, vec![vec![1, 2, 3]]);
        s.stack.push(vec![1]);
        s.op_split().unwrap();
        assert_eq!(s.stack, vec![vec![1], vec![2, 3]]);
    }

    #[test]
    fn test_split_out_of_range() {
        let mut s = state(vec![vec![1, 2], vec![3]]);
        let error = s.op_split().unwrap_err();
        assert_eq!(error.code, AuthenticationErrorCode::InvalidSplitIndex);
        assert_eq!(error.details.as_deref(), Some("stack item length: 2; requested split index: 3."));
    }

    #[test]
    fn test_cat_exceeding_item_length() {
        let mut s = state(vec![vec![0; 300], vec![0; 300]]);
        let error = s.op_cat().unwrap_err();
        assert_eq!(error.code, AuthenticationErrorCode::ExceededMaximumStackItemLength);
    }

    #[test]
    fn test_num2bin() {
        let mut s = state(vec![vec![0x81], vec![4]]);
        s.op_num2bin().unwrap();
        assert_eq!(s.stack, vec![vec![0x01, 0x00, 0x00, 0x80]]);

        let mut s = state(vec![vec![], vec![2]]);
        s.op_num2bin().unwrap();
        assert_eq!(s.stack, vec![vec![0x00, 0x00]]);

        let mut s = state(vec![vec![0x00, 0x01], vec![1]]);
        let error = s.op_num2bin().unwrap_err();
        assert_eq!(error.code, AuthenticationErrorCode::InsufficientLength);
    }

    #[test]
    fn test_bin2num() {
        let mut s = state(vec![vec![0x01, 0x00, 0x00, 0x80]]);
        s.op_bin2num().unwrap();
        assert_eq!(s.stack, vec![vec![0x81]]);

        let mut s = state(vec![vec![0x01; 9]]);
        let error = s.op_bin2num().unwrap_err();
        assert_eq!(error.code, AuthenticationErrorCode::ExceededMaximumVmNumberByteLength);
    }

    #[test]
    fn test_size_and_reverse() {
        let mut s = state(vec![vec![1, 2, 3]]);
        s.op_size().unwrap();
        assert_eq!(s.stack, vec![vec![1, 2, 3], vec![3]]);
        s.stack.pop();
        s.op_reverse_bytes().unwrap();
        assert_eq!(s.stack, vec![vec![3, 2, 1]]);
    }
}
