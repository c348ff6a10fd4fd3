//! The context of a single input evaluation.

use serde::{Deserialize, Serialize};

use crate::output::Output;
use crate::transaction::Transaction;

/// A transaction, the outputs it spends, and the index of the input under
/// evaluation.
///
/// `source_outputs[i]` is the output spent by `transaction.inputs[i]`. The
/// same structure serves as the compilation context used by the compiler to
/// produce signing serializations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationProgram {
    pub input_index: usize,
    pub source_outputs: Vec<Output>,
    pub transaction: Transaction,
}

impl AuthenticationProgram {
    pub fn new(transaction: Transaction, source_outputs: Vec<Output>, input_index: usize) -> Self {
        AuthenticationProgram {
            input_index,
            source_outputs,
            transaction,
        }
    }

    /// The output spent by the input under evaluation.
    pub fn source_output(&self) -> Option<&Output> {
        self.source_outputs.get(self.input_index)
    }

    /// The input under evaluation.
    pub fn input(&self) -> Option<&crate::input::Input> {
        self.transaction.inputs.get(self.input_index)
    }
}
