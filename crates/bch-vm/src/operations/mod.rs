//! The shared operation library.
//!
//! Each operation is implemented as a method on [`ProgramState`] returning
//! `Result<(), AuthenticationError>`. Instruction sets wrap these methods in
//! [`Operation`] closures and compose them with the combinators below.

mod arithmetic;
mod bitwise;
mod crypto;
mod flow;
mod inspection;
mod loops;
mod push;
mod splice;
mod stack;
mod time;
mod tokens;

use std::sync::Arc;

use crate::consensus::Capabilities;
use crate::error::AuthenticationError;
use crate::state::ProgramState;

pub use arithmetic::{BinaryArithmetic, UnaryArithmetic};
pub use crypto::HashFunction;
pub use inspection::Inspection;
pub use tokens::TokenInspection;

/// A state transition for one opcode.
pub type Operation =
    Arc<dyn Fn(&mut ProgramState, &Capabilities) -> Result<(), AuthenticationError> + Send + Sync>;

/// Wrap a closure as an [`Operation`].
pub fn operation<F>(f: F) -> Operation
where
    F: Fn(&mut ProgramState, &Capabilities) -> Result<(), AuthenticationError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Run `operation` only when the current branch is executing.
pub fn conditionally_evaluate(operation: Operation) -> Operation {
    Arc::new(move |state, capabilities| {
        if state.is_executing() {
            operation(state, capabilities)
        } else {
            Ok(())
        }
    })
}

/// Run `operation`, then count it towards the operation limit.
pub fn increment_operation_count(operation: Operation) -> Operation {
    Arc::new(move |state, capabilities| {
        let result = operation(state, capabilities);
        state.operation_count += 1;
        result
    })
}

/// Run `first`, then `second` if `first` succeeded.
pub fn combine_operations(first: Operation, second: Operation) -> Operation {
    Arc::new(move |state, capabilities| {
        first(state, capabilities)?;
        second(state, capabilities)
    })
}

/// Operation-counted, conditionally evaluated: the wrapping used for most
/// non-push opcodes.
pub fn counted(operation: Operation) -> Operation {
    increment_operation_count(conditionally_evaluate(operation))
}
