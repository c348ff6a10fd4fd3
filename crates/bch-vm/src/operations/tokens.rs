//! CashToken introspection.

use bch_transaction::{NftCapability, Output};
use num_bigint::BigInt;

use crate::error::{AuthenticationError, AuthenticationErrorCode};
use crate::state::ProgramState;

const MUTABLE_CAPABILITY_BYTE: u8 = 0x01;
const MINTING_CAPABILITY_BYTE: u8 = 0x02;

/// The token introspection opcodes, `OP_UTXOTOKENCATEGORY` through
/// `OP_OUTPUTTOKENAMOUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenInspection {
    UtxoCategory,
    UtxoCommitment,
    UtxoAmount,
    OutputCategory,
    OutputCommitment,
    OutputAmount,
}

/// The token category in wire order, followed by a capability byte for
/// minting and mutable NFTs.
pub fn extended_token_category(output: &Output) -> Option<Vec<u8>> {
    let token = output.token.as_ref()?;
    let mut category = token.category_wire_order().to_vec();
    match token.nft.as_ref().map(|nft| nft.capability) {
        Some(NftCapability::Minting) => category.push(MINTING_CAPABILITY_BYTE),
        Some(NftCapability::Mutable) => category.push(MUTABLE_CAPABILITY_BYTE),
        _ => {}
    }
    Some(category)
}

impl ProgramState {
    pub(crate) fn op_token_inspect(&mut self, inspection: TokenInspection) -> Result<(), AuthenticationError> {
        let program = self.program.clone();
        let output = match inspection {
            TokenInspection::UtxoCategory | TokenInspection::UtxoCommitment | TokenInspection::UtxoAmount => {
                let code = AuthenticationErrorCode::InvalidTransactionUtxoIndex;
                let index = self.pop_index(code)?;
                program.source_outputs.get(index).ok_or(AuthenticationError::from(code))?
            }
            _ => {
                let code = AuthenticationErrorCode::InvalidTransactionOutputIndex;
                let index = self.pop_index(code)?;
                program.transaction.outputs.get(index).ok_or(AuthenticationError::from(code))?
            }
        };
        match inspection {
            TokenInspection::UtxoCategory | TokenInspection::OutputCategory => match extended_token_category(output) {
                Some(category) => self.push_checked(category),
                None => self.push_number(0),
            },
            TokenInspection::UtxoCommitment | TokenInspection::OutputCommitment => {
                match output.token.as_ref().and_then(|token| token.nft.as_ref()) {
                    Some(nft) => self.push_checked(nft.commitment.clone()),
                    None => self.push_number(0),
                }
            }
            TokenInspection::UtxoAmount | TokenInspection::OutputAmount => {
                let amount = output.token.as_ref().map_or(0, |token| token.amount);
                self.push_vm_number(&BigInt::from(amount))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bch_transaction::{AuthenticationProgram, Input, Token, Transaction};

    use super::*;
    use crate::consensus::Consensus;

    fn category() -> [u8; 32] {
        let mut category = [0u8; 32];
        category[0] = 0x01;
        category
    }

    fn state(stack: Vec<Vec<u8>>) -> ProgramState {
        let mut transaction = Transaction::new();
        transaction.inputs.push(Input::default());
        let mut output = Output::new(1000, vec![0x51]);
        output.token = Some(Token::non_fungible(category(), NftCapability::Minting, vec![0xbe, 0xef]));
        transaction.outputs.push(output);
        let mut utxo = Output::new(1000, vec![0x51]);
        utxo.token = Some(Token::fungible(category(), 300));
        let program = AuthenticationProgram::new(transaction, vec![utxo], 0);
        ProgramState::new(Arc::new(program), vec![], stack, Consensus::bch_2023())
    }

    #[test]
    fn test_extended_category() {
        let mut s = state(vec![vec![]]);
        s.op_token_inspect(TokenInspection::OutputCategory).unwrap();
        let item = &s.stack[0];
        assert_eq!(item.len(), 33);
        assert_eq!(item[31], 0x01);
        assert_eq!(item[32], MINTING_CAPABILITY_BYTE);

        let mut s = state(vec![vec![]]);
        s.op_token_inspect(TokenInspection::UtxoCategory).unwrap();
        assert_eq!(s.stack[0].len(), 32);
    }

    #[test]
    fn test_commitment_and_amount() {
        let mut s = state(vec![vec![]]);
        s.op_token_inspect(TokenInspection::OutputCommitment).unwrap();
        assert_eq!(s.stack, vec![vec![0xbe, 0xef]]);

        let mut s = state(vec![vec![]]);
        s.op_token_inspect(TokenInspection::UtxoCommitment).unwrap();
        assert_eq!(s.stack, vec![Vec::<u8>::new()]);

        let mut s = state(vec![vec![]]);
        s.op_token_inspect(TokenInspection::UtxoAmount).unwrap();
        assert_eq!(s.stack, vec![vec![0x2c, 0x01]]);

        let mut s = state(vec![vec![]]);
        s.op_token_inspect(TokenInspection::OutputAmount).unwrap();
        assert_eq!(s.stack, vec![Vec::<u8>::new()]);
    }

    #[test]
    fn test_invalid_index() {
        let mut s = state(vec![vec![1]]);
        let error = s.op_token_inspect(TokenInspection::OutputAmount).unwrap_err();
        assert_eq!(error.code, AuthenticationErrorCode::InvalidTransactionOutputIndex);
    }
}
