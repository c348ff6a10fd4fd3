use num_bigint::BigInt;
use proptest::prelude::*;

use bch_transaction::{AuthenticationProgram, Input, Output, Transaction};
use bch_vm::{
    decode_authentication_instructions, decode_vm_number, encode_authentication_instructions, encode_data_push,
    encode_vm_number, AuthenticationVirtualMachine,
};

fn program(unlocking: Vec<u8>, locking: Vec<u8>) -> AuthenticationProgram {
    let mut transaction = Transaction::new();
    transaction.inputs.push(Input {
        unlocking_bytecode: unlocking,
        ..Input::default()
    });
    transaction.outputs.push(Output::new(1_000, vec![0x51]));
    AuthenticationProgram::new(transaction, vec![Output::new(2_000, locking)], 0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn vm_number_roundtrip(n in any::<i64>().prop_filter("out of range", |n| *n != i64::MIN)) {
        let value = BigInt::from(n);
        let encoded = encode_vm_number(&value);
        prop_assert!(encoded.len() <= 8);
        prop_assert_eq!(decode_vm_number(&encoded, 8, true).unwrap(), value);
    }

    #[test]
    fn data_push_decodes_to_single_instruction(data in prop::collection::vec(any::<u8>(), 0..600)) {
        let bytecode = encode_data_push(&data);
        let decoded = decode_authentication_instructions(&bytecode);
        prop_assert!(decoded.malformed.is_none());
        prop_assert_eq!(decoded.instructions.len(), 1);
        prop_assert_eq!(encode_authentication_instructions(&decoded.instructions), bytecode);
    }

    #[test]
    fn decoding_preserves_bytecode(bytecode in prop::collection::vec(any::<u8>(), 0..200)) {
        let decoded = decode_authentication_instructions(&bytecode);
        prop_assert_eq!(decoded.encode(), bytecode);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn evaluation_is_total(
        unlocking in prop::collection::vec(0u8..=0x60, 0..20),
        locking in prop::collection::vec(any::<u8>(), 0..60)
    ) {
        for vm in [
            AuthenticationVirtualMachine::bch_2022(true),
            AuthenticationVirtualMachine::bch_2023(false),
            AuthenticationVirtualMachine::chips(false),
        ] {
            let state = vm.evaluate(program(unlocking.clone(), locking.clone()));
            prop_assert!(state.ip <= state.instructions.len());
        }
    }
}
