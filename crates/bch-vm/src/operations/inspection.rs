//! Transaction introspection.

use num_bigint::BigInt;

use crate::error::{AuthenticationError, AuthenticationErrorCode};
use crate::state::ProgramState;

/// The introspection opcodes, `OP_INPUTINDEX` through `OP_OUTPUTBYTECODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inspection {
    InputIndex,
    ActiveBytecode,
    TxVersion,
    TxInputCount,
    TxOutputCount,
    TxLocktime,
    UtxoValue,
    UtxoBytecode,
    OutpointTxHash,
    OutpointIndex,
    InputBytecode,
    InputSequenceNumber,
    OutputValue,
    OutputBytecode,
}

impl ProgramState {
    pub(crate) fn op_inspect(&mut self, inspection: Inspection) -> Result<(), AuthenticationError> {
        let program = self.program.clone();
        let transaction = &program.transaction;
        match inspection {
            Inspection::InputIndex => self.push_vm_number(&BigInt::from(program.input_index)),
            Inspection::ActiveBytecode => {
                let bytecode = self.active_bytecode();
                self.push_checked(bytecode)
            }
            Inspection::TxVersion => self.push_vm_number(&BigInt::from(transaction.version as i32)),
            Inspection::TxInputCount => self.push_vm_number(&BigInt::from(transaction.inputs.len())),
            Inspection::TxOutputCount => self.push_vm_number(&BigInt::from(transaction.outputs.len())),
            Inspection::TxLocktime => self.push_vm_number(&BigInt::from(transaction.locktime)),
            Inspection::UtxoValue | Inspection::UtxoBytecode => {
                let code = AuthenticationErrorCode::InvalidTransactionUtxoIndex;
                let index = self.pop_index(code)?;
                let utxo = program.source_outputs.get(index).ok_or(AuthenticationError::from(code))?;
                match inspection {
                    Inspection::UtxoValue => self.push_vm_number(&BigInt::from(utxo.value_satoshis)),
                    _ => self.push_checked(utxo.locking_bytecode.clone()),
                }
            }
            Inspection::OutpointTxHash
            | Inspection::OutpointIndex
            | Inspection::InputBytecode
            | Inspection::InputSequenceNumber => {
                let code = AuthenticationErrorCode::InvalidTransactionInputIndex;
                let index = self.pop_index(code)?;
                let input = transaction.inputs.get(index).ok_or(AuthenticationError::from(code))?;
                match inspection {
                    Inspection::OutpointTxHash => self.push_checked(input.outpoint_wire_hash().to_vec()),
                    Inspection::OutpointIndex => self.push_vm_number(&BigInt::from(input.outpoint_index)),
                    Inspection::InputBytecode => self.push_checked(input.unlocking_bytecode.clone()),
                    _ => self.push_vm_number(&BigInt::from(input.sequence_number)),
                }
            }
            Inspection::OutputValue | Inspection::OutputBytecode => {
                let code = AuthenticationErrorCode::InvalidTransactionOutputIndex;
                let index = self.pop_index(code)?;
                let output = transaction.outputs.get(index).ok_or(AuthenticationError::from(code))?;
                match inspection {
                    Inspection::OutputValue => self.push_vm_number(&BigInt::from(output.value_satoshis)),
                    _ => self.push_checked(output.locking_bytecode.clone()),
                }
            }
        }
    }
}
