//! Stack manipulation operations.

use crate::error::{AuthenticationError, AuthenticationErrorCode};
use crate::state::ProgramState;
use crate::vm_number::stack_item_is_truthy;

impl ProgramState {
    pub(crate) fn op_to_alt_stack(&mut self) -> Result<(), AuthenticationError> {
        let item = self.pop()?;
        self.alternate_stack.push(item);
        Ok(())
    }

    pub(crate) fn op_from_alt_stack(&mut self) -> Result<(), AuthenticationError> {
        let item = self
            .alternate_stack
            .pop()
            .ok_or(AuthenticationError::from(AuthenticationErrorCode::EmptyAlternateStack))?;
        self.push(item);
        Ok(())
    }

    pub(crate) fn op_2drop(&mut self) -> Result<(), AuthenticationError> {
        self.pop_items::<2>()?;
        Ok(())
    }

    pub(crate) fn op_2dup(&mut self) -> Result<(), AuthenticationError> {
        self.duplicate_top(2)
    }

    pub(crate) fn op_3dup(&mut self) -> Result<(), AuthenticationError> {
        self.duplicate_top(3)
    }

    pub(crate) fn op_2over(&mut self) -> Result<(), AuthenticationError> {
        let [a, b, c, d] = self.pop_items::<4>()?;
        let (copy_a, copy_b) = (a.clone(), b.clone());
        self.stack.extend([a, b, c, d, copy_a, copy_b]);
        Ok(())
    }

    pub(crate) fn op_2rot(&mut self) -> Result<(), AuthenticationError> {
        let [a, b, c, d, e, f] = self.pop_items::<6>()?;
        self.stack.extend([c, d, e, f, a, b]);
        Ok(())
    }

    pub(crate) fn op_2swap(&mut self) -> Result<(), AuthenticationError> {
        let [a, b, c, d] = self.pop_items::<4>()?;
        self.stack.extend([c, d, a, b]);
        Ok(())
    }

    pub(crate) fn op_ifdup(&mut self) -> Result<(), AuthenticationError> {
        let top = self.peek(0)?;
        if stack_item_is_truthy(top) {
            let copy = top.clone();
            self.push(copy);
        }
        Ok(())
    }

    pub(crate) fn op_depth(&mut self) -> Result<(), AuthenticationError> {
        self.push_number(self.stack.len() as i64)
    }

    pub(crate) fn op_drop(&mut self) -> Result<(), AuthenticationError> {
        self.pop().map(drop)
    }

    pub(crate) fn op_dup(&mut self) -> Result<(), AuthenticationError> {
        self.duplicate_top(1)
    }

    pub(crate) fn op_nip(&mut self) -> Result<(), AuthenticationError> {
        let [_, b] = self.pop_items::<2>()?;
        self.push(b);
        Ok(())
    }

    pub(crate) fn op_over(&mut self) -> Result<(), AuthenticationError> {
        let copy = self.peek(1)?.clone();
        self.push(copy);
        Ok(())
    }

    /// `OP_PICK` (`remove = false`) and `OP_ROLL` (`remove = true`).
    pub(crate) fn op_pick_or_roll(&mut self, remove: bool) -> Result<(), AuthenticationError> {
        let depth = self.pop_index(AuthenticationErrorCode::InvalidStackIndex)?;
        let index = depth
            .checked_add(1)
            .and_then(|offset| self.stack.len().checked_sub(offset))
            .ok_or(AuthenticationError::from(AuthenticationErrorCode::InvalidStackIndex))?;
        let item = if remove {
            self.stack.remove(index)
        } else {
            self.stack[index].clone()
        };
        self.push(item);
        Ok(())
    }

    pub(crate) fn op_rot(&mut self) -> Result<(), AuthenticationError> {
        let [a, b, c] = self.pop_items::<3>()?;
        self.stack.extend([b, c, a]);
        Ok(())
    }

    pub(crate) fn op_swap(&mut self) -> Result<(), AuthenticationError> {
        let [a, b] = self.pop_items::<2>()?;
        self.stack.extend([b, a]);
        Ok(())
    }

    pub(crate) fn op_tuck(&mut self) -> Result<(), AuthenticationError> {
        let [a, b] = self.pop_items::<2>()?;
        let copy = b.clone();
        self.stack.extend([copy, a, b]);
        Ok(())
    }

    fn duplicate_top(&mut self, count: usize) -> Result<(), AuthenticationError> {
        let start = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or(AuthenticationError::from(AuthenticationErrorCode::EmptyStack))?;
        let copies = self.stack[start..].to_vec();
        self.stack.extend(copies);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bch_transaction::{AuthenticationProgram, Input, Output, Transaction};

    use crate::consensus::Consensus;
    use crate::error::AuthenticationErrorCode;
    use crate::state::ProgramState;

    fn state(stack: &[u8]) -> ProgramState {
        let mut transaction = Transaction::new();
        transaction.inputs.push(Input::default());
        let program = AuthenticationProgram::new(transaction, vec![Output::new(0, vec![])], 0);
        let stack = stack.iter().map(|&byte| vec![byte]).collect();
        ProgramState::new(Arc::new(program), vec![], stack, Consensus::bch_2022())
    }

    fn items(state: &ProgramState) -> Vec<u8> {
        state.stack.iter().map(|item| item[0]).collect()
    }

    #[test]
    fn test_rotations() {
        let mut s = state(&[1, 2, 3]);
        s.op_rot().unwrap();
        assert_eq!(items(&s), vec![2, 3, 1]);

        let mut s = state(&[1, 2, 3, 4, 5, 6]);
        s.op_2rot().unwrap();
        assert_eq!(items(&s), vec![3, 4, 5, 6, 1, 2]);

        let mut s = state(&[1, 2, 3, 4]);
        s.op_2swap().unwrap();
        assert_eq!(items(&s), vec![3, 4, 1, 2]);
    }

    #[test]
    fn test_duplications() {
        let mut s = state(&[1, 2, 3]);
        s.op_3dup().unwrap();
        assert_eq!(items(&s), vec![1, 2, 3, 1, 2, 3]);

        let mut s = state(&[1, 2, 3, 4]);
        s.op_2over().unwrap();
        assert_eq!(items(&s), vec![1, 2, 3, 4, 1, 2]);

        let mut s = state(&[1, 2]);
        s.op_tuck().unwrap();
        assert_eq!(items(&s), vec![2, 1, 2]);
    }

    #[test]
    fn test_pick_and_roll() {
        let mut s = state(&[7, 8, 9]);
        s.stack.push(vec![2]);
        s.op_pick_or_roll(false).unwrap();
        assert_eq!(items(&s), vec![7, 8, 9, 7]);

        let mut s = state(&[7, 8, 9]);
        s.stack.push(vec![2]);
        s.op_pick_or_roll(true).unwrap();
        assert_eq!(items(&s), vec![8, 9, 7]);

        let mut s = state(&[7]);
        s.stack.push(vec![1]);
        let error = s.op_pick_or_roll(false).unwrap_err();
        assert_eq!(error.code, AuthenticationErrorCode::InvalidStackIndex);
    }

    #[test]
    fn test_alternate_stack() {
        let mut s = state(&[5]);
        s.op_to_alt_stack().unwrap();
        assert!(s.stack.is_empty());
        s.op_from_alt_stack().unwrap();
        assert_eq!(items(&s), vec![5]);
        let error = s.op_from_alt_stack().unwrap_err();
        assert_eq!(error.code, AuthenticationErrorCode::EmptyAlternateStack);
    }

    #[test]
    fn test_empty_stack_errors() {
        let mut s = state(&[1]);
        assert_eq!(s.op_swap().unwrap_err().code, AuthenticationErrorCode::EmptyStack);
        assert_eq!(items(&s), vec![1]);
        assert_eq!(s.op_2dup().unwrap_err().code, AuthenticationErrorCode::EmptyStack);
    }
}
