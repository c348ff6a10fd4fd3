//! End-to-end evaluation tests for the bch-vm crate.
//!
//! Covers complete program evaluation across instruction sets, signature
//! checking against real signing serializations, P2SH, resource limits,
//! loops and whole-transaction verification.

use bch_primitives::ec::{NativeSecp256k1, Secp256k1};
use bch_primitives::hash::{hash160, sha256d, NativeHash};
use bch_transaction::signing_serialization::{generate_signing_serialization_for_program, ALL_OUTPUTS};
use bch_transaction::{AuthenticationProgram, Input, Output, Transaction};

use crate::error::AuthenticationErrorCode;
use crate::instruction::encode_data_push;
use crate::opcodes::*;
use crate::vm::{AuthenticationVirtualMachine, ResolvedTransaction};
use crate::vm_number::encode_vm_number_i64;

const PRIVATE_KEY: [u8; 32] = [0x07; 32];

fn p2pkh(public_key_hash: &[u8]) -> Vec<u8> {
    let mut bytecode = vec![OP_DUP, OP_HASH160, OP_PUSHBYTES_20];
    bytecode.extend_from_slice(public_key_hash);
    bytecode.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    bytecode
}

fn p2sh20(redeem_bytecode: &[u8]) -> Vec<u8> {
    let mut bytecode = vec![OP_HASH160, OP_PUSHBYTES_20];
    bytecode.extend_from_slice(&hash160(redeem_bytecode));
    bytecode.push(OP_EQUAL);
    bytecode
}

fn push(data: &[u8]) -> Vec<u8> {
    encode_data_push(data)
}

fn transaction(unlocking: Vec<u8>) -> Transaction {
    let mut transaction = Transaction::new();
    transaction.inputs.push(Input {
        outpoint_transaction_hash: [0x11; 32],
        unlocking_bytecode: unlocking,
        ..Input::default()
    });
    transaction.outputs.push(Output::new(10_000, p2pkh(&[0xaa; 20])));
    transaction
}

fn program(unlocking: Vec<u8>, locking: Vec<u8>) -> AuthenticationProgram {
    AuthenticationProgram::new(transaction(unlocking), vec![Output::new(20_000, locking)], 0)
}

fn error_code(vm: &AuthenticationVirtualMachine, unlocking: Vec<u8>, locking: Vec<u8>) -> Option<AuthenticationErrorCode> {
    let state = vm.evaluate(program(unlocking, locking));
    vm.state_success(&state).err().map(|error| error.code)
}

/// Sign the first input of a program spending `locking`, with the signing
/// serialization type appended.
fn sign(locking: &[u8], schnorr: bool) -> Vec<u8> {
    let unsigned = program(vec![], locking.to_vec());
    let serialization = generate_signing_serialization_for_program(&unsigned, locking, ALL_OUTPUTS, &NativeHash).unwrap();
    let digest = sha256d(&serialization);
    let mut signature = if schnorr {
        NativeSecp256k1.sign_message_hash_schnorr(&PRIVATE_KEY, &digest).unwrap()
    } else {
        NativeSecp256k1.sign_message_hash_der(&PRIVATE_KEY, &digest).unwrap()
    };
    signature.push(ALL_OUTPUTS);
    signature
}

fn public_key() -> Vec<u8> {
    NativeSecp256k1.derive_public_key_compressed(&PRIVATE_KEY).unwrap()
}

// -----------------------------------------------------------------------
// Basic evaluation
// -----------------------------------------------------------------------

#[test]
fn test_arithmetic_program() {
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    let state = vm.evaluate(program(vec![OP_1, OP_2], vec![OP_ADD, OP_3, OP_EQUAL]));
    assert!(vm.state_success(&state).is_ok(), "{:?}", state.error);
    assert_eq!(state.stack, vec![vec![1]]);
}

#[test]
fn test_op_return_fails() {
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    assert_eq!(
        error_code(&vm, vec![OP_1], vec![OP_RETURN]),
        Some(AuthenticationErrorCode::CalledReturn)
    );
}

#[test]
fn test_unbalanced_conditional() {
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    assert_eq!(
        error_code(&vm, vec![OP_1], vec![OP_IF, OP_1]),
        Some(AuthenticationErrorCode::NonEmptyControlStackLockingBytecode)
    );
    let vm = AuthenticationVirtualMachine::bch_2022(true);
    assert_eq!(
        error_code(&vm, vec![OP_1], vec![OP_IF, OP_1]),
        Some(AuthenticationErrorCode::NonEmptyControlStack)
    );
    assert_eq!(
        error_code(&vm, vec![OP_1], vec![OP_ENDIF]),
        Some(AuthenticationErrorCode::UnexpectedEndIf)
    );
}

#[test]
fn test_unexecuted_branch_must_balance() {
    let vm = AuthenticationVirtualMachine::bch_2022(true);
    assert_eq!(
        error_code(&vm, vec![], vec![OP_0, OP_IF, OP_IF, OP_ENDIF, OP_1]),
        Some(AuthenticationErrorCode::NonEmptyControlStack)
    );
    assert_eq!(
        error_code(&vm, vec![], vec![OP_0, OP_IF, OP_ENDIF, OP_ENDIF, OP_1]),
        Some(AuthenticationErrorCode::UnexpectedEndIf)
    );
    assert_eq!(
        error_code(&vm, vec![], vec![OP_0, OP_IF, OP_IF, OP_ENDIF, OP_ENDIF, OP_1]),
        None
    );
}

#[test]
fn test_malformed_locking_bytecode() {
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    let state = vm.evaluate(program(vec![OP_1], vec![OP_PUSHBYTES_1 + 2, 0x01]));
    let error = state.error.unwrap();
    assert_eq!(error.code, AuthenticationErrorCode::MalformedLockingBytecode);
    assert_eq!(
        error.details.as_deref(),
        Some("Malformed instruction: OP_PUSHBYTES_3 0x01[missing 2 bytes].")
    );
}

#[test]
fn test_invalid_input_index() {
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    let mut invalid = program(vec![OP_1], vec![OP_1]);
    invalid.input_index = 3;
    let state = vm.evaluate(invalid);
    assert_eq!(
        state.error.map(|error| error.code),
        Some(AuthenticationErrorCode::InvalidTransactionInputIndex)
    );
}

#[test]
fn test_locktime_program() {
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    let mut locking = push(&encode_vm_number_i64(100));
    locking.extend([OP_CHECKLOCKTIMEVERIFY, OP_DROP, OP_1]);
    let mut spending = program(vec![], locking.clone());
    spending.transaction.locktime = 200;
    assert!(vm.state_success(&vm.evaluate(spending)).is_ok());

    let mut early = program(vec![], locking);
    early.transaction.locktime = 50;
    let state = vm.evaluate(early);
    assert_eq!(
        state.error.map(|error| error.code),
        Some(AuthenticationErrorCode::UnsatisfiedLocktime)
    );
}

// -----------------------------------------------------------------------
// Signatures
// -----------------------------------------------------------------------

#[test]
fn test_pay_to_public_key_hash_schnorr_and_ecdsa() {
    let locking = p2pkh(&hash160(&public_key()));
    for schnorr in [true, false] {
        let mut unlocking = push(&sign(&locking, schnorr));
        unlocking.extend(push(&public_key()));
        let vm = AuthenticationVirtualMachine::bch_2023(true);
        let state = vm.evaluate(program(unlocking, locking.clone()));
        assert!(vm.state_success(&state).is_ok(), "{:?}", state.error);
        assert_eq!(state.signed_messages.len(), 1);
    }
}

#[test]
fn test_wrong_signature_fails_nullfail() {
    let locking = p2pkh(&hash160(&public_key()));
    let mut signature = sign(&locking, true);
    signature[10] ^= 0x01;
    let mut unlocking = push(&signature);
    unlocking.extend(push(&public_key()));
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    assert_eq!(
        error_code(&vm, unlocking, locking),
        Some(AuthenticationErrorCode::NonNullSignatureFailure)
    );
}

#[test]
fn test_legacy_multisig() {
    let mut locking = vec![OP_1];
    locking.extend(push(&public_key()));
    locking.extend([OP_1, OP_CHECKMULTISIG]);
    let mut unlocking = vec![OP_0];
    unlocking.extend(push(&sign(&locking, false)));
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    let state = vm.evaluate(program(unlocking, locking));
    assert!(vm.state_success(&state).is_ok(), "{:?}", state.error);
}

#[test]
fn test_multisig_requires_null_dummy_for_ecdsa() {
    let mut locking = vec![OP_1];
    locking.extend(push(&public_key()));
    locking.extend([OP_1, OP_CHECKMULTISIG]);
    let mut unlocking = vec![OP_1];
    unlocking.extend(push(&sign(&locking, false)));
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    assert!(error_code(&vm, unlocking, locking).is_some());
}

// -----------------------------------------------------------------------
// P2SH
// -----------------------------------------------------------------------

#[test]
fn test_pay_to_script_hash() {
    let redeem = vec![OP_2, OP_3, OP_ADD, OP_5, OP_EQUAL];
    for vm in [
        AuthenticationVirtualMachine::bch_2022(true),
        AuthenticationVirtualMachine::bch_2023(true),
    ] {
        let state = vm.evaluate(program(push(&redeem), p2sh20(&redeem)));
        assert!(vm.state_success(&state).is_ok(), "{:?}", state.error);
    }
}

#[test]
fn test_pay_to_script_hash_mismatch() {
    let redeem = vec![OP_2, OP_3, OP_ADD, OP_5, OP_EQUAL];
    let other = vec![OP_1];
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    assert_eq!(
        error_code(&vm, push(&other), p2sh20(&redeem)),
        Some(AuthenticationErrorCode::UnmatchedP2shRedeemBytecode)
    );
    let vm = AuthenticationVirtualMachine::bch_2022(true);
    assert_eq!(
        error_code(&vm, push(&other), p2sh20(&redeem)),
        Some(AuthenticationErrorCode::UnsuccessfulEvaluation)
    );
}

#[test]
fn test_pay_to_script_hash_requires_clean_redeem_stack() {
    let redeem = vec![OP_1, OP_1];
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    assert_eq!(
        error_code(&vm, push(&redeem), p2sh20(&redeem)),
        Some(AuthenticationErrorCode::RequiresCleanStackRedeemBytecode)
    );
}

// -----------------------------------------------------------------------
// Limits
// -----------------------------------------------------------------------

#[test]
fn test_stack_depth_limit() {
    let vm = AuthenticationVirtualMachine::chips(false);
    assert_eq!(
        error_code(&vm, vec![OP_1], vec![OP_DUP; 1000]),
        Some(AuthenticationErrorCode::ExceededMaximumStackDepth)
    );
}

#[test]
fn test_stack_item_limits_differ_by_instruction_set() {
    let item = vec![0x01; 600];
    let mut locking = push(&item);
    locking.extend([OP_DROP, OP_1]);
    let vm = AuthenticationVirtualMachine::bch_2023(false);
    assert_eq!(
        error_code(&vm, vec![], locking.clone()),
        Some(AuthenticationErrorCode::ExceedsMaximumPush)
    );
    let vm = AuthenticationVirtualMachine::chips(false);
    assert_eq!(error_code(&vm, vec![], locking), None);
}

#[test]
fn test_pick_with_huge_index_fails() {
    let vm = AuthenticationVirtualMachine::chips(false);
    let mut locking = vec![0x09];
    locking.extend([0xff; 8]);
    locking.extend([0x00, OP_PICK]);
    assert_eq!(
        error_code(&vm, vec![OP_1], locking.clone()),
        Some(AuthenticationErrorCode::InvalidStackIndex)
    );
    *locking.last_mut().unwrap() = OP_ROLL;
    assert_eq!(
        error_code(&vm, vec![OP_1], locking),
        Some(AuthenticationErrorCode::InvalidStackIndex)
    );
}

#[test]
fn test_hashing_limit() {
    let vm = AuthenticationVirtualMachine::chips(true);
    let mut locking = vec![OP_SHA256; 22];
    locking.extend([OP_DROP, OP_1]);
    let state = vm.evaluate(program(vec![OP_1], locking));
    let error = state.error.unwrap();
    assert_eq!(error.code, AuthenticationErrorCode::ExcessiveHashing);
    assert_eq!(
        error.details.as_deref(),
        Some("Maximum hash digest iterations: 21; required cumulative iterations: 22.")
    );
}

// -----------------------------------------------------------------------
// Loops
// -----------------------------------------------------------------------

#[test]
fn test_loop_counts_to_five() {
    let vm = AuthenticationVirtualMachine::chips(true);
    let locking = vec![OP_BEGIN, OP_1ADD, OP_DUP, OP_5, OP_EQUAL, OP_UNTIL, OP_5, OP_EQUAL];
    let state = vm.evaluate(program(vec![OP_0], locking));
    assert!(vm.state_success(&state).is_ok(), "{:?}", state.error);
    assert!(state.repeated_bytes > 0);
}

#[test]
fn test_loop_opcodes_unknown_before_chips() {
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    assert_eq!(
        error_code(&vm, vec![OP_1], vec![OP_BEGIN, OP_1, OP_UNTIL]),
        Some(AuthenticationErrorCode::UnknownOpcode)
    );
}

#[test]
fn test_excessive_looping() {
    let vm = AuthenticationVirtualMachine::chips(false);
    let locking = vec![OP_BEGIN, OP_0, OP_UNTIL, OP_1];
    assert_eq!(
        error_code(&vm, vec![], locking),
        Some(AuthenticationErrorCode::ExcessiveLooping)
    );
}

// -----------------------------------------------------------------------
// Debugging and verification
// -----------------------------------------------------------------------

#[test]
fn test_debug_trace() {
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    let trace = vm.debug(program(vec![OP_1], vec![OP_1, OP_ADD, OP_2, OP_EQUAL]));
    assert_eq!(trace.len(), 8);
    assert_eq!(trace[0].ip, 0);
    let last = trace.last().unwrap();
    assert_eq!(last.stack, vec![vec![1]]);
    assert!(vm.state_success(last).is_ok());
}

#[test]
fn test_state_step() {
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    let state = vm.evaluate(program(vec![], vec![OP_1]));
    let initial = crate::state::ProgramState::new(
        state.program.clone(),
        vec![crate::instruction::Instruction::operation(OP_2)],
        vec![],
        state.consensus,
    );
    assert!(vm.state_continue(&initial));
    let next = vm.state_step(&initial);
    assert_eq!(next.stack, vec![vec![2]]);
    assert!(!vm.state_continue(&next));
}

#[test]
fn test_verify_transaction() {
    let locking = p2pkh(&hash160(&public_key()));
    let mut unlocking = push(&sign(&locking, true));
    unlocking.extend(push(&public_key()));
    let resolved = ResolvedTransaction {
        transaction: transaction(unlocking),
        source_outputs: vec![Output::new(20_000, locking)],
    };
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    assert_eq!(vm.verify(&resolved), Ok(()));
}

#[test]
fn test_verify_reports_input_failure() {
    let resolved = ResolvedTransaction {
        transaction: transaction(vec![OP_0]),
        source_outputs: vec![Output::new(20_000, p2pkh(&[0xbb; 20]))],
    };
    let vm = AuthenticationVirtualMachine::bch_2023(true);
    let reason = vm.verify(&resolved).unwrap_err();
    assert!(
        reason.starts_with("Unable to verify transaction: error in evaluating input index 0:"),
        "{}",
        reason
    );
}
