//! The BCH instruction set as of the May 2023 upgrade: CashTokens and
//! P2SH32.

use std::collections::HashSet;
use std::sync::Arc;

use bch_transaction::{AuthenticationProgram, Output, Transaction};

use super::bch_2022::operations_bch_2022;
use super::{data_carrier_bytes, decode_program, failed_state, InstructionSet};
use crate::consensus::{Capabilities, Consensus, MAXIMUM_MONEY_SATOSHIS};
use crate::error::{AuthenticationError, AuthenticationErrorCode};
use crate::instruction::{decode_authentication_instructions, is_push_only};
use crate::opcodes::*;
use crate::operations::{counted, operation, Operation, TokenInspection};
use crate::standard::{
    get_dust_threshold, is_dust_output, is_pay_to_script_hash20, is_pay_to_script_hash32,
    is_standard_output_bytecode_2023, is_witness_program,
};
use crate::state::ProgramState;
use crate::token_validation::verify_transaction_tokens;
use crate::vm_number::stack_item_is_truthy;

pub struct InstructionSetBch2023 {
    capabilities: Capabilities,
    consensus: Consensus,
    operations: Vec<Operation>,
    standard: bool,
}

impl InstructionSetBch2023 {
    pub fn new(capabilities: Capabilities, standard: bool) -> Self {
        InstructionSetBch2023 {
            capabilities,
            consensus: Consensus::bch_2023(),
            operations: operations_bch_2023(standard),
            standard,
        }
    }
}

impl InstructionSet for InstructionSetBch2023 {
    fn operation(&self, opcode: u8) -> &Operation {
        &self.operations[usize::from(opcode)]
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn consensus(&self) -> &Consensus {
        &self.consensus
    }

    fn standard(&self) -> bool {
        self.standard
    }

    fn success(&self, state: &ProgramState) -> Result<(), AuthenticationError> {
        success_bch_2023(state)
    }

    fn evaluate(
        &self,
        program: Arc<AuthenticationProgram>,
        evaluate_segment: &mut dyn FnMut(ProgramState) -> ProgramState,
    ) -> ProgramState {
        evaluate_bch_2023(self, program, evaluate_segment)
    }

    fn verify(
        &self,
        transaction: &Transaction,
        source_outputs: &[Output],
        evaluate_input: &mut dyn FnMut(usize) -> Result<(), AuthenticationError>,
    ) -> Result<(), String> {
        verify_bch_2023(&self.consensus, self.standard, transaction, source_outputs, evaluate_input)
    }
}

/// The BCH 2022 table with the token introspection opcodes.
pub(crate) fn operations_bch_2023(standard: bool) -> Vec<Operation> {
    let mut table = operations_bch_2022(standard);
    let token_operations = [
        (OP_UTXOTOKENCATEGORY, TokenInspection::UtxoCategory),
        (OP_UTXOTOKENCOMMITMENT, TokenInspection::UtxoCommitment),
        (OP_UTXOTOKENAMOUNT, TokenInspection::UtxoAmount),
        (OP_OUTPUTTOKENCATEGORY, TokenInspection::OutputCategory),
        (OP_OUTPUTTOKENCOMMITMENT, TokenInspection::OutputCommitment),
        (OP_OUTPUTTOKENAMOUNT, TokenInspection::OutputAmount),
    ];
    for (opcode, inspection) in token_operations {
        table[usize::from(opcode)] = counted(operation(move |state, _| state.op_token_inspect(inspection)));
    }
    table
}

/// Clean stack and control stack rules are enforced per bytecode during
/// evaluation, so success only requires a truthy top item.
pub(crate) fn success_bch_2023(state: &ProgramState) -> Result<(), AuthenticationError> {
    if let Some(error) = &state.error {
        return Err(error.clone());
    }
    match state.top() {
        None => Err(AuthenticationError::with_details(
            AuthenticationErrorCode::UnsuccessfulEvaluation,
            "Stack is empty.",
        )),
        Some(top) if !stack_item_is_truthy(top) => Err(AuthenticationError::with_details(
            AuthenticationErrorCode::UnsuccessfulEvaluation,
            format!("Top stack item: \"{}\".", hex::encode(top)),
        )),
        Some(_) => Ok(()),
    }
}

fn require_closed_control_stack(state: &mut ProgramState, code: AuthenticationErrorCode) -> bool {
    if state.control_stack.is_empty() {
        return true;
    }
    let depth = state.control_stack.len();
    state.apply_error(AuthenticationError::with_details(
        code,
        format!("Remaining control stack depth: {}.", depth),
    ));
    false
}

fn require_clean_stack(state: &mut ProgramState, code: AuthenticationErrorCode) {
    if state.stack.len() != 1 {
        let depth = state.stack.len();
        state.apply_error(AuthenticationError::with_details(
            code,
            format!("Remaining stack depth: {}.", depth),
        ));
    }
}

/// Evaluate a program with per-bytecode control stack and clean stack
/// checks, P2SH20 and P2SH32.
pub(crate) fn evaluate_bch_2023(
    set: &dyn InstructionSet,
    program: Arc<AuthenticationProgram>,
    evaluate_segment: &mut dyn FnMut(ProgramState) -> ProgramState,
) -> ProgramState {
    let decoded = match decode_program(&program, set.consensus()) {
        Ok(decoded) => decoded,
        Err(error) => return failed_state(set, program, error),
    };

    let mut unlocking_result = evaluate_segment(set.create_state(Arc::clone(&program), decoded.unlocking, Vec::new()));
    if unlocking_result.error.is_some()
        || !require_closed_control_stack(
            &mut unlocking_result,
            AuthenticationErrorCode::NonEmptyControlStackUnlockingBytecode,
        )
    {
        return unlocking_result;
    }

    let mut locking_state = set.create_state(Arc::clone(&program), decoded.locking, unlocking_result.stack.clone());
    locking_state.hash_digest_iterations = unlocking_result.hash_digest_iterations;
    let mut locking_result = evaluate_segment(locking_state);
    if !require_closed_control_stack(
        &mut locking_result,
        AuthenticationErrorCode::NonEmptyControlStackLockingBytecode,
    ) {
        return locking_result;
    }

    let p2sh20 = is_pay_to_script_hash20(&decoded.locking_bytecode);
    let p2sh32 = is_pay_to_script_hash32(&decoded.locking_bytecode);
    if !p2sh20 && !p2sh32 {
        require_clean_stack(&mut locking_result, AuthenticationErrorCode::RequiresCleanStackLockingBytecode);
        return locking_result;
    }
    if locking_result.error.is_some() {
        return locking_result;
    }
    if !locking_result.top().is_some_and(stack_item_is_truthy) {
        let details = format!(
            "Top stack item: \"{}\".",
            hex::encode(locking_result.top().unwrap_or_default())
        );
        locking_result.apply_error(AuthenticationError::with_details(
            AuthenticationErrorCode::UnmatchedP2shRedeemBytecode,
            details,
        ));
        return locking_result;
    }

    let mut redeem_stack = unlocking_result.stack;
    let redeem_bytecode = redeem_stack.pop().unwrap_or_default();
    if p2sh20 && redeem_stack.is_empty() && is_witness_program(&redeem_bytecode) {
        return locking_result;
    }
    let redeem = decode_authentication_instructions(&redeem_bytecode);
    if redeem.is_malformed() {
        locking_result.apply_error(AuthenticationErrorCode::MalformedP2shBytecode.into());
        return locking_result;
    }

    let mut redeem_state = set.create_state(program, redeem.instructions, redeem_stack);
    redeem_state.hash_digest_iterations = locking_result.hash_digest_iterations;
    let mut redeem_result = evaluate_segment(redeem_state);
    if require_closed_control_stack(
        &mut redeem_result,
        AuthenticationErrorCode::NonEmptyControlStackRedeemBytecode,
    ) {
        require_clean_stack(&mut redeem_result, AuthenticationErrorCode::RequiresCleanStackRedeemBytecode);
    }
    redeem_result
}

/// Verify a transaction under BCH 2023 rules: the 2022 checks, value
/// bounds, duplicate outpoints, consensus versions, dust and token
/// validation.
pub(crate) fn verify_bch_2023(
    consensus: &Consensus,
    standard: bool,
    transaction: &Transaction,
    source_outputs: &[Output],
    evaluate_input: &mut dyn FnMut(usize) -> Result<(), AuthenticationError>,
) -> Result<(), String> {
    if transaction.inputs.is_empty() {
        return Err("Transactions must have at least one input.".to_string());
    }
    if transaction.outputs.is_empty() {
        return Err("Transactions must have at least one output.".to_string());
    }
    if transaction.inputs.len() != source_outputs.len() {
        return Err(format!(
            "Unable to verify transaction: a single spent output must be provided for each transaction input. Transaction input count: {}; source outputs count: {}.",
            transaction.inputs.len(),
            source_outputs.len()
        ));
    }

    let transaction_size = transaction.size();
    if transaction_size < consensus.minimum_transaction_size {
        return Err(format!(
            "Transaction does not meet minimum size: the transaction is {} bytes, but transactions must be no smaller than {} bytes to prevent an exploit of the transaction Merkle tree design.",
            transaction_size, consensus.minimum_transaction_size
        ));
    }
    if transaction_size > consensus.maximum_transaction_size {
        return Err(format!(
            "Transaction exceeds maximum size: the transaction is {} bytes, but the maximum transaction size is {} bytes.",
            transaction_size, consensus.maximum_transaction_size
        ));
    }

    let input_value: u128 = source_outputs.iter().map(|output| u128::from(output.value_satoshis)).sum();
    let output_value: u128 = transaction
        .outputs
        .iter()
        .map(|output| u128::from(output.value_satoshis))
        .sum();
    let maximum_money = u128::from(MAXIMUM_MONEY_SATOSHIS);
    if input_value > maximum_money {
        return Err(format!(
            "Transaction inputs exceed the maximum supply. Maximum supply in satoshis: {}, cumulative input value: {}.",
            maximum_money, input_value
        ));
    }
    if output_value > maximum_money {
        return Err(format!(
            "Transaction outputs exceed the maximum supply. Maximum supply in satoshis: {}, cumulative output value: {}.",
            maximum_money, output_value
        ));
    }
    if output_value > input_value {
        return Err(format!(
            "Transaction outputs exceed transaction inputs. Cumulative input value: {}, cumulative output value: {}.",
            input_value, output_value
        ));
    }

    let mut outpoints = HashSet::new();
    for input in &transaction.inputs {
        if !outpoints.insert((input.outpoint_transaction_hash, input.outpoint_index)) {
            return Err(format!(
                "Transaction spends the same source output more than once. Outpoint transaction hash: {}, outpoint index: {}.",
                hex::encode(input.outpoint_transaction_hash),
                input.outpoint_index
            ));
        }
    }

    if transaction.version < consensus.minimum_consensus_version
        || transaction.version > consensus.maximum_consensus_version
    {
        return Err(format!(
            "Transaction version is invalid. Encoded version number: {}.",
            transaction.version
        ));
    }

    if standard {
        verify_standard_2023(consensus, transaction, transaction_size, source_outputs)?;
    }

    verify_transaction_tokens(transaction, source_outputs, consensus.maximum_commitment_length)?;

    for index in 0..transaction.inputs.len() {
        evaluate_input(index).map_err(|error| {
            format!(
                "Unable to verify transaction: error in evaluating input index {}: {}",
                index, error
            )
        })?;
    }
    Ok(())
}

fn verify_standard_2023(
    consensus: &Consensus,
    transaction: &Transaction,
    transaction_size: usize,
    source_outputs: &[Output],
) -> Result<(), String> {
    if transaction_size > consensus.maximum_standard_transaction_size {
        return Err(format!(
            "Transaction exceeds maximum standard size: this transaction is {} bytes, but the maximum standard transaction size is {} bytes.",
            transaction_size, consensus.maximum_standard_transaction_size
        ));
    }
    if let Some(index) = source_outputs
        .iter()
        .position(|output| !is_standard_output_bytecode_2023(&output.locking_bytecode))
    {
        return Err(format!(
            "Source output {} is non-standard: locking bytecode does not match a standard pattern: P2PKH, P2PK, P2SH, P2MS, or arbitrary data (OP_RETURN).",
            index
        ));
    }
    for (index, output) in transaction.outputs.iter().enumerate() {
        if !is_standard_output_bytecode_2023(&output.locking_bytecode) {
            return Err(format!(
                "Transaction output {} is non-standard: locking bytecode does not match a standard pattern: P2PKH, P2PK, P2SH, P2MS, or arbitrary data (OP_RETURN).",
                index
            ));
        }
        if is_dust_output(output) {
            return Err(format!(
                "Transaction output {} must have a value of at least {} satoshis. Current value: {}",
                index,
                get_dust_threshold(output),
                output.value_satoshis
            ));
        }
    }
    let arbitrary_data_bytes = data_carrier_bytes(transaction);
    if arbitrary_data_bytes > consensus.maximum_data_carrier_bytes {
        return Err(format!(
            "Standard transactions may carry no more than {} bytes in arbitrary data outputs; this transaction includes {} bytes of arbitrary data.",
            consensus.maximum_data_carrier_bytes, arbitrary_data_bytes
        ));
    }
    for (index, input) in transaction.inputs.iter().enumerate() {
        if input.unlocking_bytecode.len() > consensus.maximum_standard_unlocking_bytecode_length {
            return Err(format!(
                "The maximum standard unlocking bytecode length is {} bytes, but the unlocking bytecode at input index {} is {} bytes.",
                consensus.maximum_standard_unlocking_bytecode_length,
                index,
                input.unlocking_bytecode.len()
            ));
        }
        if !is_push_only(&input.unlocking_bytecode) {
            return Err(format!(
                "The unlocking bytecode at input index {} contains non-push operations.",
                index
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use bch_transaction::Input;

    use super::*;

    fn spending(unlocking: Vec<u8>) -> Transaction {
        let mut transaction = Transaction::new();
        transaction.inputs.push(Input {
            unlocking_bytecode: unlocking,
            ..Input::default()
        });
        let mut locking = vec![OP_DUP, OP_HASH160, 20];
        locking.extend([0u8; 20]);
        locking.extend([OP_EQUALVERIFY, OP_CHECKSIG]);
        transaction.outputs.push(Output::new(5_000, locking));
        transaction
    }

    #[test]
    fn test_token_opcodes_are_defined() {
        let set = InstructionSetBch2023::new(Capabilities::native(), true);
        let mut state = ProgramState::new(
            Arc::new(AuthenticationProgram::new(spending(vec![]), vec![Output::new(1, vec![])], 0)),
            vec![],
            vec![vec![]],
            Consensus::bch_2023(),
        );
        set.operation(OP_UTXOTOKENAMOUNT)(&mut state, set.capabilities()).unwrap();
        assert_eq!(state.stack, vec![Vec::<u8>::new()]);
        assert_eq!(state.operation_count, 1);
    }

    #[test]
    fn test_success_reports_top_item() {
        let mut state = ProgramState::new(
            Arc::new(AuthenticationProgram::new(spending(vec![]), vec![], 0)),
            vec![],
            vec![vec![0x00, 0x80]],
            Consensus::bch_2023(),
        );
        let error = success_bch_2023(&state).unwrap_err();
        assert_eq!(error.details.as_deref(), Some("Top stack item: \"0080\"."));
        state.stack.clear();
        let error = success_bch_2023(&state).unwrap_err();
        assert_eq!(error.details.as_deref(), Some("Stack is empty."));
    }

    #[test]
    fn test_verify_value_rules() {
        let transaction = spending(vec![OP_1]);
        let error = verify_bch_2023(
            &Consensus::bch_2023(),
            false,
            &transaction,
            &[Output::new(4_000, vec![OP_1])],
            &mut |_| Ok(()),
        )
        .unwrap_err();
        assert!(error.starts_with("Transaction outputs exceed transaction inputs."), "{}", error);
    }

    #[test]
    fn test_verify_duplicate_outpoints() {
        let mut transaction = spending(vec![OP_1]);
        transaction.inputs.push(transaction.inputs[0].clone());
        let spent = [Output::new(5_000, vec![OP_1]), Output::new(5_000, vec![OP_1])];
        let error = verify_bch_2023(&Consensus::bch_2023(), false, &transaction, &spent, &mut |_| Ok(())).unwrap_err();
        assert!(error.contains("same source output more than once"), "{}", error);
    }

    #[test]
    fn test_verify_reports_failing_input() {
        let transaction = spending(vec![OP_1]);
        let error = verify_bch_2023(
            &Consensus::bch_2023(),
            false,
            &transaction,
            &[Output::new(5_000, vec![OP_1])],
            &mut |_| Err(AuthenticationErrorCode::CalledReturn.into()),
        )
        .unwrap_err();
        assert_eq!(
            error,
            "Unable to verify transaction: error in evaluating input index 0: Program called an OP_RETURN operation."
        );
    }

    #[test]
    fn test_verify_dust_is_nonstandard() {
        let mut transaction = spending(vec![OP_1]);
        transaction.outputs[0].value_satoshis = 545;
        let error = verify_bch_2023(
            &Consensus::bch_2023(),
            true,
            &transaction,
            &[Output::new(5_000, transaction.outputs[0].locking_bytecode.clone())],
            &mut |_| Ok(()),
        )
        .unwrap_err();
        assert!(error.contains("at least 546 satoshis"), "{}", error);
    }
}
