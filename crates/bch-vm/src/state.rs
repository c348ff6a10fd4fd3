//! Program state shared by every instruction set.

use std::sync::Arc;

use bch_transaction::AuthenticationProgram;
use num_bigint::BigInt;

use crate::consensus::Consensus;
use crate::error::{AuthenticationError, AuthenticationErrorCode};
use crate::instruction::{encode_authentication_instructions, Instruction};
use crate::vm_number::{boolean_to_vm_number, decode_vm_number, encode_vm_number, stack_item_is_truthy};

/// An entry on the control stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlItem {
    /// An `OP_IF`/`OP_NOTIF` branch and whether it is taken.
    Branch(bool),
    /// An `OP_BEGIN` loop: the instruction pointer of the `OP_BEGIN`, or
    /// `None` when the loop was entered in an unexecuted branch.
    Loop(Option<usize>),
}

/// A message verified by a signature-checking operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    pub digest: [u8; 32],
    /// The signing serialization, or the raw message for data signatures.
    pub serialization: Vec<u8>,
}

/// The complete state of a program evaluation.
///
/// A state is created per bytecode (unlocking, locking, redeem) and stepped
/// until it errors or runs out of instructions.
#[derive(Debug, Clone)]
pub struct ProgramState {
    pub program: Arc<AuthenticationProgram>,
    pub instructions: Vec<Instruction>,
    /// Index of the next instruction.
    pub ip: usize,
    pub stack: Vec<Vec<u8>>,
    pub alternate_stack: Vec<Vec<u8>>,
    pub control_stack: Vec<ControlItem>,
    /// Index of the most recently executed `OP_CODESEPARATOR`.
    pub last_code_separator: Option<usize>,
    pub operation_count: usize,
    pub signed_messages: Vec<SignedMessage>,
    pub error: Option<AuthenticationError>,
    pub consensus: Consensus,
    pub hash_digest_iterations: usize,
    /// `None` when hashing is not limited.
    pub maximum_hash_digest_iterations: Option<usize>,
    pub repeated_bytes: usize,
}

impl ProgramState {
    /// Create a state positioned at the first instruction.
    pub fn new(
        program: Arc<AuthenticationProgram>,
        instructions: Vec<Instruction>,
        stack: Vec<Vec<u8>>,
        consensus: Consensus,
    ) -> Self {
        ProgramState {
            program,
            instructions,
            ip: 0,
            stack,
            alternate_stack: Vec::new(),
            control_stack: Vec::new(),
            last_code_separator: None,
            operation_count: 0,
            signed_messages: Vec::new(),
            error: None,
            consensus,
            hash_digest_iterations: 0,
            maximum_hash_digest_iterations: None,
            repeated_bytes: 0,
        }
    }

    /// Whether the current instruction executes: no enclosing branch is
    /// untaken.
    pub fn is_executing(&self) -> bool {
        !self.control_stack.contains(&ControlItem::Branch(false))
    }

    /// Record `error` unless an earlier error is already recorded.
    pub fn apply_error(&mut self, error: AuthenticationError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// The bytecode following the last executed `OP_CODESEPARATOR`.
    pub fn active_bytecode(&self) -> Vec<u8> {
        let start = self.last_code_separator.map_or(0, |index| index + 1);
        encode_authentication_instructions(self.instructions.get(start..).unwrap_or(&[]))
    }

    /// The top stack item, if any.
    pub fn top(&self) -> Option<&[u8]> {
        self.stack.last().map(Vec::as_slice)
    }

    pub(crate) fn pop(&mut self) -> Result<Vec<u8>, AuthenticationError> {
        self.stack.pop().ok_or_else(|| AuthenticationErrorCode::EmptyStack.into())
    }

    /// Pop `N` items, returned in stack order (the former top item last).
    pub(crate) fn pop_items<const N: usize>(&mut self) -> Result<[Vec<u8>; N], AuthenticationError> {
        if self.stack.len() < N {
            return Err(AuthenticationErrorCode::EmptyStack.into());
        }
        let items = self.stack.split_off(self.stack.len() - N);
        items
            .try_into()
            .map_err(|_| AuthenticationErrorCode::EmptyStack.into())
    }

    /// The item `depth` positions below the top (`0` is the top item).
    pub(crate) fn peek(&self, depth: usize) -> Result<&Vec<u8>, AuthenticationError> {
        depth
            .checked_add(1)
            .and_then(|offset| self.stack.len().checked_sub(offset))
            .and_then(|index| self.stack.get(index))
            .ok_or_else(|| AuthenticationErrorCode::EmptyStack.into())
    }

    pub(crate) fn pop_bool(&mut self) -> Result<bool, AuthenticationError> {
        self.pop().map(|item| stack_item_is_truthy(&item))
    }

    /// Decode the top item as a minimally-encoded VM number of at most
    /// `maximum_length` bytes, popping it only on success.
    pub(crate) fn pop_vm_number_with_length(&mut self, maximum_length: usize) -> Result<BigInt, AuthenticationError> {
        let item = self.peek(0)?;
        let value = decode_vm_number(item, maximum_length, true)
            .map_err(|e| AuthenticationError::with_details(AuthenticationErrorCode::InvalidVmNumber, e.to_string()))?;
        self.stack.pop();
        Ok(value)
    }

    pub(crate) fn pop_vm_number(&mut self) -> Result<BigInt, AuthenticationError> {
        self.pop_vm_number_with_length(self.consensus.maximum_vm_number_length)
    }

    /// Pop a VM number which must fit a non-negative `usize` (an index or a
    /// count); `code` is reported for values outside that range.
    pub(crate) fn pop_index(&mut self, code: AuthenticationErrorCode) -> Result<usize, AuthenticationError> {
        let value = self.pop_vm_number()?;
        usize::try_from(value).map_err(|_| code.into())
    }

    pub(crate) fn push(&mut self, item: Vec<u8>) {
        self.stack.push(item);
    }

    pub(crate) fn push_bool(&mut self, value: bool) {
        self.stack.push(boolean_to_vm_number(value));
    }

    /// Push `item`, failing if it exceeds the maximum stack item length.
    pub(crate) fn push_checked(&mut self, item: Vec<u8>) -> Result<(), AuthenticationError> {
        let maximum = self.consensus.maximum_stack_item_length;
        if item.len() > maximum {
            return Err(AuthenticationError::with_details(
                AuthenticationErrorCode::ExceededMaximumStackItemLength,
                format!("Maximum stack item length: {}; item length: {} bytes.", maximum, item.len()),
            ));
        }
        self.stack.push(item);
        Ok(())
    }

    /// Push `value`, failing if its encoding exceeds the VM number range.
    pub(crate) fn push_vm_number(&mut self, value: &BigInt) -> Result<(), AuthenticationError> {
        let encoded = encode_vm_number(value);
        let maximum = self.consensus.maximum_vm_number_length;
        if encoded.len() > maximum {
            return Err(AuthenticationError::with_details(
                AuthenticationErrorCode::OverflowsVmNumberRange,
                format!(
                    "Maximum VM number byte length: {}; encoded number length: {}.",
                    maximum,
                    encoded.len()
                ),
            ));
        }
        self.stack.push(encoded);
        Ok(())
    }

    pub(crate) fn push_number(&mut self, value: i64) -> Result<(), AuthenticationError> {
        self.push_vm_number(&BigInt::from(value))
    }

    /// Count the digest iterations of hashing a `message_length`-byte
    /// message, plus one when the digest is hashed again.
    pub(crate) fn count_hash_digest_iterations(&mut self, message_length: usize, double: bool) {
        self.hash_digest_iterations += hash_digest_iterations(message_length) + usize::from(double);
    }
}

/// The number of compression-function iterations required to hash a
/// message of `message_length` bytes with a 64-byte block hash function.
pub fn hash_digest_iterations(message_length: usize) -> usize {
    1 + (message_length + 8) / 64
}

#[cfg(test)]
mod tests {
    use super::*;
    use bch_transaction::{Input, Output, Transaction};

    fn empty_state(stack: Vec<Vec<u8>>) -> ProgramState {
        let mut transaction = Transaction::new();
        transaction.inputs.push(Input::default());
        transaction.outputs.push(Output::new(0, vec![]));
        let program = AuthenticationProgram::new(transaction, vec![Output::new(0, vec![])], 0);
        ProgramState::new(Arc::new(program), vec![], stack, Consensus::bch_2022())
    }

    #[test]
    fn test_is_executing() {
        let mut state = empty_state(vec![]);
        assert!(state.is_executing());
        state.control_stack.push(ControlItem::Branch(true));
        state.control_stack.push(ControlItem::Loop(Some(0)));
        assert!(state.is_executing());
        state.control_stack.push(ControlItem::Branch(false));
        assert!(!state.is_executing());
    }

    #[test]
    fn test_pop_vm_number_keeps_invalid_item() {
        let mut state = empty_state(vec![vec![0x01, 0x00]]);
        let error = state.pop_vm_number().unwrap_err();
        assert_eq!(error.code, AuthenticationErrorCode::InvalidVmNumber);
        assert_eq!(state.stack.len(), 1);
    }

    #[test]
    fn test_pop_items_order() {
        let mut state = empty_state(vec![vec![1], vec![2], vec![3]]);
        let [a, b] = state.pop_items::<2>().unwrap();
        assert_eq!((a, b), (vec![2], vec![3]));
        assert!(state.pop_items::<2>().is_err());
        assert_eq!(state.stack.len(), 1);
    }

    #[test]
    fn test_push_checked_limit() {
        let mut state = empty_state(vec![]);
        assert!(state.push_checked(vec![0; 520]).is_ok());
        let error = state.push_checked(vec![0; 521]).unwrap_err();
        assert_eq!(error.code, AuthenticationErrorCode::ExceededMaximumStackItemLength);
    }

    #[test]
    fn test_first_error_is_kept() {
        let mut state = empty_state(vec![]);
        state.apply_error(AuthenticationErrorCode::EmptyStack.into());
        state.apply_error(AuthenticationErrorCode::FailedVerify.into());
        assert_eq!(state.error.unwrap().code, AuthenticationErrorCode::EmptyStack);
    }

    #[test]
    fn test_hash_digest_iterations() {
        assert_eq!(hash_digest_iterations(0), 1);
        assert_eq!(hash_digest_iterations(55), 1);
        assert_eq!(hash_digest_iterations(56), 2);
        assert_eq!(hash_digest_iterations(119), 2);
        assert_eq!(hash_digest_iterations(120), 3);
    }
}
