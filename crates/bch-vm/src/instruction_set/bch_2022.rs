//! The BCH instruction set as of the May 2022 upgrade.

use std::sync::Arc;

use bch_transaction::{AuthenticationProgram, Output, Transaction};

use super::{capability_op, data_carrier_bytes, decode_program, failed_state, state_op, InstructionSet};
use crate::consensus::{Capabilities, Consensus};
use crate::error::{AuthenticationError, AuthenticationErrorCode};
use crate::instruction::{decode_authentication_instructions, is_push_only};
use crate::opcodes::*;
use crate::operations::{
    conditionally_evaluate, counted, increment_operation_count, operation, BinaryArithmetic, HashFunction,
    Inspection, Operation, UnaryArithmetic,
};
use crate::standard::{is_pay_to_script_hash20, is_standard_output_bytecode, is_witness_program};
use crate::state::ProgramState;
use crate::vm_number::stack_item_is_truthy;

/// BCH 2022: 520-byte stack items, 8-byte VM numbers, a 201 operation
/// limit and P2SH20.
pub struct InstructionSetBch2022 {
    capabilities: Capabilities,
    consensus: Consensus,
    operations: Vec<Operation>,
    standard: bool,
}

impl InstructionSetBch2022 {
    /// Create the instruction set.
    ///
    /// # Arguments
    /// * `capabilities` - Hash and signature implementations.
    /// * `standard` - Enforce standardness rules in addition to consensus.
    pub fn new(capabilities: Capabilities, standard: bool) -> Self {
        InstructionSetBch2022 {
            capabilities,
            consensus: Consensus::bch_2022(),
            operations: operations_bch_2022(standard),
            standard,
        }
    }
}

impl InstructionSet for InstructionSetBch2022 {
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
        success_bch_2022(state)
    }

    fn evaluate(
        &self,
        program: Arc<AuthenticationProgram>,
        evaluate_segment: &mut dyn FnMut(ProgramState) -> ProgramState,
    ) -> ProgramState {
        evaluate_bch_2022(self, program, evaluate_segment)
    }

    fn verify(
        &self,
        transaction: &Transaction,
        source_outputs: &[Output],
        evaluate_input: &mut dyn FnMut(usize) -> Result<(), AuthenticationError>,
    ) -> Result<(), String> {
        verify_bch_2022(&self.consensus, self.standard, transaction, source_outputs, evaluate_input)
    }
}

fn unary(op: UnaryArithmetic) -> Operation {
    counted(operation(move |state, _| state.op_unary_arithmetic(op)))
}

fn binary(op: BinaryArithmetic) -> Operation {
    counted(operation(move |state, _| state.op_binary_arithmetic(op)))
}

fn hash(function: HashFunction) -> Operation {
    counted(operation(move |state, capabilities| state.op_hash(function, capabilities)))
}

fn inspect(inspection: Inspection) -> Operation {
    counted(operation(move |state, _| state.op_inspect(inspection)))
}

/// The BCH 2022 operation table, indexed by opcode.
///
/// Pushes are never counted. Flow control and disabled opcodes run even in
/// unexecuted branches; everything else is skipped there.
pub(crate) fn operations_bch_2022(standard: bool) -> Vec<Operation> {
    let mut table = vec![conditionally_evaluate(state_op(ProgramState::op_unknown)); 256];

    let push = operation(|state, _| state.op_push_data(false));
    for opcode in OP_0..=OP_PUSHDATA_4 {
        table[usize::from(opcode)] = push.clone();
    }
    table[usize::from(OP_1NEGATE)] = conditionally_evaluate(operation(|state, _| state.op_push_number(-1)));
    table[usize::from(OP_RESERVED)] = conditionally_evaluate(state_op(ProgramState::op_reserved));
    for opcode in OP_1..=OP_16 {
        let number = i64::from(opcode - OP_1) + 1;
        table[usize::from(opcode)] = conditionally_evaluate(operation(move |state, _| state.op_push_number(number)));
    }

    let disabled = increment_operation_count(state_op(ProgramState::op_disabled));
    let upgradable_nop = counted(operation(move |state, _| state.op_upgradable_nop(standard)));

    let counted_operations: Vec<(u8, Operation)> = vec![
        (OP_NOP, counted(state_op(ProgramState::op_nop))),
        (OP_VER, counted(state_op(ProgramState::op_reserved))),
        (OP_IF, increment_operation_count(operation(|state, _| state.op_if(false)))),
        (OP_NOTIF, increment_operation_count(operation(|state, _| state.op_if(true)))),
        (OP_VERIF, increment_operation_count(state_op(ProgramState::op_reserved))),
        (OP_VERNOTIF, increment_operation_count(state_op(ProgramState::op_reserved))),
        (OP_ELSE, increment_operation_count(state_op(ProgramState::op_else))),
        (OP_ENDIF, increment_operation_count(state_op(ProgramState::op_endif))),
        (OP_VERIFY, counted(state_op(ProgramState::op_verify))),
        (OP_RETURN, counted(state_op(ProgramState::op_return))),
        (OP_TOALTSTACK, counted(state_op(ProgramState::op_to_alt_stack))),
        (OP_FROMALTSTACK, counted(state_op(ProgramState::op_from_alt_stack))),
        (OP_2DROP, counted(state_op(ProgramState::op_2drop))),
        (OP_2DUP, counted(state_op(ProgramState::op_2dup))),
        (OP_3DUP, counted(state_op(ProgramState::op_3dup))),
        (OP_2OVER, counted(state_op(ProgramState::op_2over))),
        (OP_2ROT, counted(state_op(ProgramState::op_2rot))),
        (OP_2SWAP, counted(state_op(ProgramState::op_2swap))),
        (OP_IFDUP, counted(state_op(ProgramState::op_ifdup))),
        (OP_DEPTH, counted(state_op(ProgramState::op_depth))),
        (OP_DROP, counted(state_op(ProgramState::op_drop))),
        (OP_DUP, counted(state_op(ProgramState::op_dup))),
        (OP_NIP, counted(state_op(ProgramState::op_nip))),
        (OP_OVER, counted(state_op(ProgramState::op_over))),
        (OP_PICK, counted(operation(|state, _| state.op_pick_or_roll(false)))),
        (OP_ROLL, counted(operation(|state, _| state.op_pick_or_roll(true)))),
        (OP_ROT, counted(state_op(ProgramState::op_rot))),
        (OP_SWAP, counted(state_op(ProgramState::op_swap))),
        (OP_TUCK, counted(state_op(ProgramState::op_tuck))),
        (OP_CAT, counted(state_op(ProgramState::op_cat))),
        (OP_SPLIT, counted(state_op(ProgramState::op_split))),
        (OP_NUM2BIN, counted(state_op(ProgramState::op_num2bin))),
        (OP_BIN2NUM, counted(state_op(ProgramState::op_bin2num))),
        (OP_SIZE, counted(state_op(ProgramState::op_size))),
        (OP_INVERT, disabled.clone()),
        (OP_AND, counted(operation(|state, _| state.op_bitwise(|a, b| a & b)))),
        (OP_OR, counted(operation(|state, _| state.op_bitwise(|a, b| a | b)))),
        (OP_XOR, counted(operation(|state, _| state.op_bitwise(|a, b| a ^ b)))),
        (OP_EQUAL, counted(state_op(ProgramState::op_equal))),
        (OP_EQUALVERIFY, counted(state_op(ProgramState::op_equal_verify))),
        (OP_RESERVED1, counted(state_op(ProgramState::op_reserved))),
        (OP_RESERVED2, counted(state_op(ProgramState::op_reserved))),
        (OP_1ADD, unary(UnaryArithmetic::Add1)),
        (OP_1SUB, unary(UnaryArithmetic::Sub1)),
        (OP_2MUL, disabled.clone()),
        (OP_2DIV, disabled.clone()),
        (OP_NEGATE, unary(UnaryArithmetic::Negate)),
        (OP_ABS, unary(UnaryArithmetic::Abs)),
        (OP_NOT, unary(UnaryArithmetic::Not)),
        (OP_0NOTEQUAL, unary(UnaryArithmetic::ZeroNotEqual)),
        (OP_ADD, binary(BinaryArithmetic::Add)),
        (OP_SUB, binary(BinaryArithmetic::Sub)),
        (OP_MUL, binary(BinaryArithmetic::Mul)),
        (OP_DIV, binary(BinaryArithmetic::Div)),
        (OP_MOD, binary(BinaryArithmetic::Mod)),
        (OP_LSHIFT, disabled.clone()),
        (OP_RSHIFT, disabled),
        (OP_BOOLAND, binary(BinaryArithmetic::BoolAnd)),
        (OP_BOOLOR, binary(BinaryArithmetic::BoolOr)),
        (OP_NUMEQUAL, binary(BinaryArithmetic::NumEqual)),
        (OP_NUMEQUALVERIFY, counted(state_op(ProgramState::op_num_equal_verify))),
        (OP_NUMNOTEQUAL, binary(BinaryArithmetic::NumNotEqual)),
        (OP_LESSTHAN, binary(BinaryArithmetic::LessThan)),
        (OP_GREATERTHAN, binary(BinaryArithmetic::GreaterThan)),
        (OP_LESSTHANOREQUAL, binary(BinaryArithmetic::LessThanOrEqual)),
        (OP_GREATERTHANOREQUAL, binary(BinaryArithmetic::GreaterThanOrEqual)),
        (OP_MIN, binary(BinaryArithmetic::Min)),
        (OP_MAX, binary(BinaryArithmetic::Max)),
        (OP_WITHIN, counted(state_op(ProgramState::op_within))),
        (OP_RIPEMD160, hash(HashFunction::Ripemd160)),
        (OP_SHA1, hash(HashFunction::Sha1)),
        (OP_SHA256, hash(HashFunction::Sha256)),
        (OP_HASH160, hash(HashFunction::Hash160)),
        (OP_HASH256, hash(HashFunction::Hash256)),
        (OP_CODESEPARATOR, counted(state_op(ProgramState::op_code_separator))),
        (OP_CHECKSIG, counted(capability_op(ProgramState::op_check_sig))),
        (OP_CHECKSIGVERIFY, counted(capability_op(ProgramState::op_check_sig_verify))),
        (OP_CHECKMULTISIG, counted(capability_op(ProgramState::op_check_multisig))),
        (OP_CHECKMULTISIGVERIFY, counted(capability_op(ProgramState::op_check_multisig_verify))),
        (OP_NOP1, upgradable_nop.clone()),
        (OP_CHECKLOCKTIMEVERIFY, counted(state_op(ProgramState::op_check_locktime_verify))),
        (OP_CHECKSEQUENCEVERIFY, counted(state_op(ProgramState::op_check_sequence_verify))),
        (OP_NOP4, upgradable_nop.clone()),
        (OP_NOP5, upgradable_nop.clone()),
        (OP_NOP6, upgradable_nop.clone()),
        (OP_NOP7, upgradable_nop.clone()),
        (OP_NOP8, upgradable_nop.clone()),
        (OP_NOP9, upgradable_nop.clone()),
        (OP_NOP10, upgradable_nop),
        (OP_CHECKDATASIG, counted(capability_op(ProgramState::op_check_data_sig))),
        (OP_CHECKDATASIGVERIFY, counted(capability_op(ProgramState::op_check_data_sig_verify))),
        (OP_REVERSEBYTES, counted(state_op(ProgramState::op_reverse_bytes))),
        (OP_INPUTINDEX, inspect(Inspection::InputIndex)),
        (OP_ACTIVEBYTECODE, inspect(Inspection::ActiveBytecode)),
        (OP_TXVERSION, inspect(Inspection::TxVersion)),
        (OP_TXINPUTCOUNT, inspect(Inspection::TxInputCount)),
        (OP_TXOUTPUTCOUNT, inspect(Inspection::TxOutputCount)),
        (OP_TXLOCKTIME, inspect(Inspection::TxLocktime)),
        (OP_UTXOVALUE, inspect(Inspection::UtxoValue)),
        (OP_UTXOBYTECODE, inspect(Inspection::UtxoBytecode)),
        (OP_OUTPOINTTXHASH, inspect(Inspection::OutpointTxHash)),
        (OP_OUTPOINTINDEX, inspect(Inspection::OutpointIndex)),
        (OP_INPUTBYTECODE, inspect(Inspection::InputBytecode)),
        (OP_INPUTSEQUENCENUMBER, inspect(Inspection::InputSequenceNumber)),
        (OP_OUTPUTVALUE, inspect(Inspection::OutputValue)),
        (OP_OUTPUTBYTECODE, inspect(Inspection::OutputBytecode)),
    ];
    for (opcode, operation) in counted_operations {
        table[usize::from(opcode)] = operation;
    }
    table
}

/// A completed evaluation succeeds with a closed control stack and a single
/// truthy stack item.
pub(crate) fn success_bch_2022(state: &ProgramState) -> Result<(), AuthenticationError> {
    if let Some(error) = &state.error {
        return Err(error.clone());
    }
    if !state.control_stack.is_empty() {
        return Err(AuthenticationErrorCode::NonEmptyControlStack.into());
    }
    if state.stack.len() != 1 {
        return Err(AuthenticationErrorCode::RequiresCleanStack.into());
    }
    if !state.stack.first().is_some_and(|item| stack_item_is_truthy(item)) {
        return Err(AuthenticationErrorCode::UnsuccessfulEvaluation.into());
    }
    Ok(())
}

/// Evaluate the unlocking bytecode, then the locking bytecode over the
/// resulting stack, then (for P2SH20) the redeem bytecode over the unlocking
/// stack without its top item.
pub(crate) fn evaluate_bch_2022(
    set: &dyn InstructionSet,
    program: Arc<AuthenticationProgram>,
    evaluate_segment: &mut dyn FnMut(ProgramState) -> ProgramState,
) -> ProgramState {
    let decoded = match decode_program(&program, set.consensus()) {
        Ok(decoded) => decoded,
        Err(error) => return failed_state(set, program, error),
    };

    let initial_state = set.create_state(Arc::clone(&program), decoded.unlocking, Vec::new());
    let unlocking_result = evaluate_segment(initial_state.clone());
    if unlocking_result.error.is_some() {
        return unlocking_result;
    }
    if !unlocking_result.control_stack.is_empty() {
        let mut state = initial_state;
        state.apply_error(AuthenticationErrorCode::NonEmptyControlStack.into());
        return state;
    }

    let locking_result = evaluate_segment(set.create_state(
        Arc::clone(&program),
        decoded.locking,
        unlocking_result.stack.clone(),
    ));
    if !is_pay_to_script_hash20(&decoded.locking_bytecode) || !redeem_bytecode_matches(&locking_result) {
        return locking_result;
    }

    let mut redeem_stack = unlocking_result.stack;
    let redeem_bytecode = redeem_stack.pop().unwrap_or_default();
    if redeem_stack.is_empty() && is_witness_program(&redeem_bytecode) {
        return locking_result;
    }
    let redeem = decode_authentication_instructions(&redeem_bytecode);
    if redeem.is_malformed() {
        let mut state = locking_result;
        state.apply_error(AuthenticationErrorCode::MalformedP2shBytecode.into());
        return state;
    }
    evaluate_segment(set.create_state(program, redeem.instructions, redeem_stack))
}

/// Whether a P2SH locking evaluation completed and matched the redeem
/// bytecode.
fn redeem_bytecode_matches(locking_result: &ProgramState) -> bool {
    locking_result.error.is_none() && locking_result.top().is_some_and(stack_item_is_truthy)
}

/// Verify a transaction under BCH 2022 rules.
pub(crate) fn verify_bch_2022(
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
        return Err(
            "Unable to verify transaction: a single spent output must be provided for each transaction input."
                .to_string(),
        );
    }

    let transaction_size = transaction.size();
    if transaction_size < consensus.minimum_transaction_size {
        return Err(format!(
            "Transaction does not meet minimum size: the transaction is {} bytes, but the minimum transaction size is {} bytes.",
            transaction_size, consensus.minimum_transaction_size
        ));
    }
    if transaction_size > consensus.maximum_transaction_size {
        return Err(format!(
            "Transaction exceeds maximum size: the transaction is {} bytes, but the maximum transaction size is {} bytes.",
            transaction_size, consensus.maximum_transaction_size
        ));
    }

    if standard {
        if transaction.version < 1 || transaction.version > consensus.maximum_standard_version {
            return Err(format!(
                "Standard transactions must have a version no less than 1 and no greater than {}.",
                consensus.maximum_standard_version
            ));
        }
        if transaction_size > consensus.maximum_standard_transaction_size {
            return Err(format!(
                "Transaction exceeds maximum standard size: this transaction is {} bytes, but the maximum standard transaction size is {} bytes.",
                transaction_size, consensus.maximum_standard_transaction_size
            ));
        }
        if let Some(index) = source_outputs
            .iter()
            .position(|output| !is_standard_output_bytecode(&output.locking_bytecode))
        {
            return Err(format!(
                "Standard transactions may only spend standard output types, but source output {} is non-standard.",
                index
            ));
        }
        if let Some(index) = transaction
            .outputs
            .iter()
            .position(|output| !is_standard_output_bytecode(&output.locking_bytecode))
        {
            return Err(format!(
                "Standard transactions may only create standard output types, but transaction output {} is non-standard.",
                index
            ));
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
                    "Input index {} is non-standard: the unlocking bytecode ({} bytes) exceeds the maximum standard unlocking bytecode length ({} bytes).",
                    index,
                    input.unlocking_bytecode.len(),
                    consensus.maximum_standard_unlocking_bytecode_length
                ));
            }
            if !is_push_only(&input.unlocking_bytecode) {
                return Err(format!(
                    "Input index {} is non-standard: unlocking bytecode may contain only push operations.",
                    index
                ));
            }
        }
    }

    for index in 0..transaction.inputs.len() {
        evaluate_input(index).map_err(|error| format!("Error in evaluating input index {}: {}", index, error))?;
    }
    Ok(())
}
