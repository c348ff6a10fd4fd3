use proptest::prelude::*;

use bch_transaction::token::{encode_token_prefix, read_token_prefix, MAXIMUM_TOKEN_AMOUNT, PREFIX_TOKEN};
use bch_transaction::{Input, NftCapability, Output, Token, Transaction};

/// Strategy for a token that encodes to a non-empty prefix.
fn arb_token() -> impl Strategy<Value = Token> {
    let arb_nft = prop::option::of((
        prop_oneof![
            Just(NftCapability::None),
            Just(NftCapability::Mutable),
            Just(NftCapability::Minting),
        ],
        prop::collection::vec(any::<u8>(), 0..40),
    ));
    (
        prop::array::uniform32(any::<u8>()), // category
        0..=MAXIMUM_TOKEN_AMOUNT,
        arb_nft,
    )
        .prop_filter("token must encode something", |(_, amount, nft)| {
            *amount > 0 || nft.is_some()
        })
        .prop_map(|(category, amount, nft)| {
            let mut token = Token::fungible(category, amount);
            if let Some((capability, commitment)) = nft {
                token.nft = Some(bch_transaction::Nft { capability, commitment });
            }
            token
        })
}

/// Strategy to generate a valid random transaction.
fn arb_transaction() -> impl Strategy<Value = Transaction> {
    let arb_input = (
        prop::array::uniform32(any::<u8>()),       // outpoint hash
        any::<u32>(),                              // outpoint index
        prop::collection::vec(any::<u8>(), 0..64), // unlocking bytecode
        any::<u32>(),                              // sequence
    )
        .prop_map(|(hash, index, unlocking_bytecode, sequence_number)| Input {
            outpoint_index: index,
            outpoint_transaction_hash: hash,
            sequence_number,
            unlocking_bytecode,
        });

    // Locking bytecode starting with PREFIX_TOKEN would be read back as a token prefix.
    let arb_output = (
        any::<u64>(),
        prop::collection::vec(any::<u8>(), 0..64)
            .prop_filter("no token prefix byte", |bytecode| bytecode.first() != Some(&PREFIX_TOKEN)),
        prop::option::of(arb_token()),
    )
        .prop_map(|(value_satoshis, locking_bytecode, token)| Output {
            locking_bytecode,
            token,
            value_satoshis,
        });

    (
        any::<u32>(), // version
        prop::collection::vec(arb_input, 1..4),
        prop::collection::vec(arb_output, 1..4),
        any::<u32>(), // locktime
    )
        .prop_map(|(version, inputs, outputs, locktime)| Transaction {
            inputs,
            locktime,
            outputs,
            version,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn transaction_serialize_deserialize_roundtrip(tx in arb_transaction()) {
        let bytes = tx.to_bytes();
        let decoded = Transaction::from_bytes(&bytes).unwrap();
        prop_assert_eq!(&decoded, &tx);
        prop_assert_eq!(decoded.to_bytes(), bytes);
    }

    #[test]
    fn transaction_hex_roundtrip(tx in arb_transaction()) {
        let hex_str = tx.to_hex();
        let decoded = Transaction::from_hex(&hex_str).unwrap();
        prop_assert_eq!(decoded.hash(), tx.hash());
    }

    #[test]
    fn token_prefix_consumes_exactly_its_encoding(token in arb_token(), suffix in prop::collection::vec(any::<u8>(), 0..16)) {
        let mut field = encode_token_prefix(Some(&token));
        let prefix_length = field.len();
        field.extend_from_slice(&suffix);
        let (decoded, consumed) = read_token_prefix(&field).unwrap();
        prop_assert_eq!(consumed, prefix_length);
        prop_assert_eq!(decoded, Some(token));
    }
}
