//! Tests for the bch-transaction crate.
//!
//! Covers transaction parsing and serialization round trips, token-carrying
//! outputs, transaction hashes and signing serialization layout.

use bch_primitives::hash::{sha256d, NativeHash};

use crate::input::{Input, SEQUENCE_FINAL};
use crate::output::Output;
use crate::program::AuthenticationProgram;
use crate::signing_serialization::{self, SigningSerializationComponents};
use crate::token::{NftCapability, Token};
use crate::transaction::Transaction;
use crate::TransactionError;

// -----------------------------------------------------------------------
// Raw transaction vectors
// -----------------------------------------------------------------------

/// A single-input transaction with a P2PKH and a data-carrying output.
const SOURCE_RAW_TX: &str = "010000000138c7c61c14ffb063c3bb2664041a3e29ea6ea0412a0c18ff725ba4e9e12afae2030000006a47304402203e9ab8e4c14addf3b4741540b556cfb0e0efb67dc1a7b5ce84c3ac56b3fd447802203c9f49f7bd893ebd7060176dfc36bcaff9d2c443d9a0dd6cd2d59b372c024d20412102798913bc057b344de675dac34faafe3dc2f312c758cd9068209f810877306d66ffffffff02dc050000000000002076a914eb0bd5edba389198e73f8efabddfc61666969ff788ac6a0568656c6c6faa0d0000000000001976a914eb0bd5edba389198e73f8efabddfc61666969ff788ac00000000";

/// A three-input, two-output transaction with a non-zero locktime.
const MULTI_INPUT_TX_HEX: &str = "0200000003a9bc457fdc6a54d99300fb137b23714d860c350a9d19ff0f571e694a419ff3a0010000006b48304502210086c83beb2b2663e4709a583d261d75be538aedcafa7766bd983e5c8db2f8b2fc02201a88b178624ab0ad1748b37c875f885930166237c88f5af78ee4e61d337f935f412103e8be830d98bb3b007a0343ee5c36daa48796ae8bb57946b1e87378ad6e8a090dfeffffff0092bb9a47e27bf64fc98f557c530c04d9ac25e2f2a8b600e92a0b1ae7c89c20010000006b483045022100f06b3db1c0a11af348401f9cebe10ae2659d6e766a9dcd9e3a04690ba10a160f02203f7fbd7dfcfc70863aface1a306fcc91bbadf6bc884c21a55ef0d32bd6b088c8412103e8be830d98bb3b007a0343ee5c36daa48796ae8bb57946b1e87378ad6e8a090dfeffffff9d0d4554fa692420a0830ca614b6c60f1bf8eaaa21afca4aa8c99fb052d9f398000000006b483045022100d920f2290548e92a6235f8b2513b7f693a64a0d3fa699f81a034f4b4608ff82f0220767d7d98025aff3c7bd5f2a66aab6a824f5990392e6489aae1e1ae3472d8dffb412103e8be830d98bb3b007a0343ee5c36daa48796ae8bb57946b1e87378ad6e8a090dfeffffff02807c814a000000001976a9143a6bf34ebfcf30e8541bbb33a7882845e5a29cb488ac76b0e60e000000001976a914bd492b67f90cb85918494767ebb23102c4f06b7088ac67000000";

fn p2pkh(byte: u8) -> Vec<u8> {
    let mut bytecode = vec![0x76, 0xa9, 0x14];
    bytecode.extend_from_slice(&[byte; 20]);
    bytecode.extend_from_slice(&[0x88, 0xac]);
    bytecode
}

fn sample_program(token: Option<Token>) -> AuthenticationProgram {
    let transaction = Transaction {
        inputs: vec![
            Input {
                outpoint_index: 1,
                outpoint_transaction_hash: [0x11; 32],
                sequence_number: 0,
                unlocking_bytecode: vec![0x51],
            },
            Input {
                outpoint_index: 2,
                outpoint_transaction_hash: [0x22; 32],
                sequence_number: SEQUENCE_FINAL,
                unlocking_bytecode: vec![],
            },
        ],
        locktime: 500,
        outputs: vec![Output::new(1_000, p2pkh(0xaa))],
        version: 2,
    };
    let mut spent = Output::new(10_000, p2pkh(0xbb));
    spent.token = token;
    AuthenticationProgram::new(transaction, vec![spent, Output::new(20_000, p2pkh(0xcc))], 0)
}

// -----------------------------------------------------------------------
// Transaction parsing and serialization
// -----------------------------------------------------------------------

#[test]
fn test_from_hex_roundtrip() {
    let tx = Transaction::from_hex(SOURCE_RAW_TX).expect("should parse source tx hex");
    assert_eq!(tx.version, 1);
    assert_eq!(tx.inputs.len(), 1);
    assert_eq!(tx.outputs.len(), 2);
    assert_eq!(tx.locktime, 0);
    assert_eq!(tx.inputs[0].sequence_number, SEQUENCE_FINAL);
    assert_eq!(tx.outputs[0].value_satoshis, 1500);
    assert!(tx.outputs.iter().all(|output| output.token.is_none()));
    assert_eq!(tx.to_hex(), SOURCE_RAW_TX);
}

#[test]
fn test_multi_input_roundtrip() {
    let tx = Transaction::from_hex(MULTI_INPUT_TX_HEX).expect("should parse multi-input tx");
    assert_eq!(tx.version, 2);
    assert_eq!(tx.inputs.len(), 3);
    assert_eq!(tx.outputs.len(), 2);
    assert_eq!(tx.locktime, 103);
    assert_eq!(tx.to_hex(), MULTI_INPUT_TX_HEX);
    assert_eq!(tx.size(), MULTI_INPUT_TX_HEX.len() / 2);
}

#[test]
fn test_outpoint_hash_is_reversed_on_the_wire() {
    let tx = Transaction::from_hex(SOURCE_RAW_TX).unwrap();
    let hash = tx.inputs[0].outpoint_transaction_hash;
    assert_eq!(hash[0], 0xe2);
    assert_eq!(hash[31], 0x38);
    assert_eq!(tx.inputs[0].outpoint_index, 3);
}

#[test]
fn test_hash_orders() {
    let tx = Transaction::from_hex(SOURCE_RAW_TX).unwrap();
    let wire = tx.hash_wire_order();
    assert_eq!(wire, sha256d(&hex::decode(SOURCE_RAW_TX).unwrap()));
    let mut reversed = wire;
    reversed.reverse();
    assert_eq!(tx.hash(), reversed);
    assert_eq!(tx.hash_hex(), hex::encode(reversed));
}

#[test]
fn test_trailing_bytes_rejected() {
    let mut bytes = hex::decode(SOURCE_RAW_TX).unwrap();
    bytes.push(0x00);
    let err = Transaction::from_bytes(&bytes).unwrap_err();
    assert!(matches!(err, TransactionError::SerializationError(_)));
}

#[test]
fn test_truncated_transaction_rejected() {
    let bytes = hex::decode(SOURCE_RAW_TX).unwrap();
    for length in [0, 3, 5, 40, bytes.len() - 1] {
        assert!(Transaction::from_bytes(&bytes[..length]).is_err(), "length {}", length);
    }
}

#[test]
fn test_invalid_hex_rejected() {
    assert!(Transaction::from_hex("zz").is_err());
}

#[test]
fn test_token_output_roundtrip() {
    let mut output = Output::new(800, p2pkh(0x01));
    output.token = Some(Token::non_fungible([0x42; 32], NftCapability::Mutable, vec![1, 2, 3]));
    let bytes = output.to_bytes();
    // value (8) + length (1) + prefix (1 + 32 + 1 + 1 + 3) + bytecode (25)
    assert_eq!(bytes.len(), 8 + 1 + 38 + 25);
    assert_eq!(bytes[9], crate::token::PREFIX_TOKEN);
    assert_eq!(Output::from_bytes(&bytes).unwrap(), output);
}

#[test]
fn test_invalid_token_prefix_is_reported() {
    let mut field = vec![crate::token::PREFIX_TOKEN];
    field.extend_from_slice(&[0u8; 10]);
    let mut bytes = 0u64.to_le_bytes().to_vec();
    bytes.push(field.len() as u8);
    bytes.extend_from_slice(&field);
    let err = Output::from_bytes(&bytes).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Error reading token prefix. Invalid token prefix: insufficient length. The minimum possible length is 34. Missing bytes: 23"
    );
}

#[test]
fn test_serde_json_roundtrip() {
    let program = sample_program(Some(Token::fungible([0x07; 32], 99)));
    let json = serde_json::to_string(&program).unwrap();
    assert!(json.contains("\"locking_bytecode\":\"76a914"));
    let decoded: AuthenticationProgram = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, program);
}

// -----------------------------------------------------------------------
// Signing serialization
// -----------------------------------------------------------------------

#[test]
fn test_components() {
    let program = sample_program(None);
    let components = SigningSerializationComponents::from_program(&program).unwrap();
    assert_eq!(components.transaction_outpoints.len(), 72);
    assert_eq!(&components.transaction_outpoints[32..36], &[1, 0, 0, 0]);
    assert_eq!(components.transaction_sequence_numbers, vec![0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
    assert_eq!(components.corresponding_output, Some(program.transaction.outputs[0].to_bytes()));
    assert_eq!(components.output_value, 10_000);
    assert!(components.output_token_prefix.is_empty());

    let mut second = program.clone();
    second.input_index = 1;
    let components = SigningSerializationComponents::from_program(&second).unwrap();
    assert_eq!(components.corresponding_output, None);

    let mut invalid = program;
    invalid.input_index = 2;
    assert!(SigningSerializationComponents::from_program(&invalid).is_err());
}

#[test]
fn test_signing_serialization_layout() {
    let program = sample_program(None);
    let covered = p2pkh(0xbb);
    let serialization = signing_serialization::generate_signing_serialization_for_program(
        &program,
        &covered,
        signing_serialization::ALL_OUTPUTS,
        &NativeHash,
    )
    .unwrap();
    assert_eq!(serialization.len(), 4 + 32 + 32 + 36 + 1 + covered.len() + 8 + 4 + 32 + 4 + 4);
    assert_eq!(&serialization[..4], &[2, 0, 0, 0]);
    assert_eq!(&serialization[4..36], &sha256d(&program.transaction.encode_outpoints()));
    assert_eq!(&serialization[68..100], &[0x11; 32]);
    assert_eq!(serialization[104] as usize, covered.len());
    let tail = &serialization[serialization.len() - 8..];
    assert_eq!(tail, &[0xf4, 0x01, 0, 0, 0x41, 0, 0, 0]);
}

#[test]
fn test_single_input_zeroes_prevouts_and_sequences() {
    let program = sample_program(None);
    let serialization = signing_serialization::generate_signing_serialization_for_program(
        &program,
        &[],
        signing_serialization::ALL_OUTPUTS_SINGLE_INPUT,
        &NativeHash,
    )
    .unwrap();
    assert_eq!(&serialization[4..68], &[0u8; 64][..]);
}

#[test]
fn test_no_outputs_and_corresponding_output() {
    let program = sample_program(None);
    let components = SigningSerializationComponents::from_program(&program).unwrap();
    let none = signing_serialization::hash_outputs(
        &NativeHash,
        signing_serialization::NO_OUTPUTS,
        &components.transaction_outputs,
        components.corresponding_output.as_deref(),
    );
    assert_eq!(none, [0u8; 32]);
    let single = signing_serialization::hash_outputs(
        &NativeHash,
        signing_serialization::CORRESPONDING_OUTPUT,
        &components.transaction_outputs,
        components.corresponding_output.as_deref(),
    );
    assert_eq!(single, sha256d(&program.transaction.outputs[0].to_bytes()));
    let missing = signing_serialization::hash_outputs(
        &NativeHash,
        signing_serialization::CORRESPONDING_OUTPUT,
        &components.transaction_outputs,
        None,
    );
    assert_eq!(missing, [0u8; 32]);
}

#[test]
fn test_all_utxos_and_token_prefix_are_committed() {
    let plain = sample_program(None);
    let base = signing_serialization::generate_signing_serialization_for_program(
        &plain,
        &[],
        signing_serialization::ALL_OUTPUTS,
        &NativeHash,
    )
    .unwrap();
    let utxos = signing_serialization::generate_signing_serialization_for_program(
        &plain,
        &[],
        signing_serialization::ALL_OUTPUTS_ALL_UTXOS,
        &NativeHash,
    )
    .unwrap();
    assert_eq!(utxos.len(), base.len() + 32);
    let expected_utxos = sha256d(&crate::transaction::encode_outputs(&plain.source_outputs));
    assert_eq!(&utxos[36..68], &expected_utxos);

    let token = Token::fungible([0x07; 32], 1);
    let prefix = crate::token::encode_token_prefix(Some(&token));
    let with_token = signing_serialization::generate_signing_serialization_for_program(
        &sample_program(Some(token)),
        &[],
        signing_serialization::ALL_OUTPUTS,
        &NativeHash,
    )
    .unwrap();
    assert_eq!(with_token.len(), base.len() + prefix.len());
    assert_eq!(&with_token[104..104 + prefix.len()], prefix.as_slice());
}

#[test]
fn test_defined_signing_serialization_types() {
    use signing_serialization::*;
    assert!(is_defined_signing_serialization_type(0x41, &SIGNING_SERIALIZATION_TYPES_BCH_2022));
    assert!(!is_defined_signing_serialization_type(0x61, &SIGNING_SERIALIZATION_TYPES_BCH_2022));
    assert!(is_defined_signing_serialization_type(0x61, &SIGNING_SERIALIZATION_TYPES_BCH_2023));
    assert!(!is_defined_signing_serialization_type(0xe1, &SIGNING_SERIALIZATION_TYPES_BCH_2023));
    assert!(!is_defined_signing_serialization_type(0x01, &SIGNING_SERIALIZATION_TYPES_BCH_2023));
}
