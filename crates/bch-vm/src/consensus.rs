//! Consensus limits and injected capabilities.

use std::fmt;
use std::sync::Arc;

use bch_primitives::ec::{NativeSecp256k1, Secp256k1};
use bch_primitives::hash::{NativeHash, Ripemd160, Sha1, Sha256};
use bch_transaction::signing_serialization::{SIGNING_SERIALIZATION_TYPES_BCH_2022, SIGNING_SERIALIZATION_TYPES_BCH_2023};

/// The largest locking or unlocking bytecode accepted by consensus.
pub const MAXIMUM_BYTECODE_LENGTH: usize = 10_000;
pub const MAXIMUM_DATA_CARRIER_BYTES: usize = 223;
pub const MAXIMUM_OPERATION_COUNT: usize = 201;
pub const MAXIMUM_STACK_DEPTH: usize = 1000;
pub const MAXIMUM_STACK_ITEM_LENGTH: usize = 520;
pub const MAXIMUM_STANDARD_UNLOCKING_BYTECODE_LENGTH: usize = 1650;
pub const MAXIMUM_STANDARD_TRANSACTION_SIZE: usize = 100_000;
pub const MAXIMUM_TRANSACTION_SIZE: usize = 1_000_000;
pub const MAXIMUM_MULTISIG_PUBLIC_KEYS: usize = 20;
pub const MAXIMUM_TOKEN_COMMITMENT_LENGTH: usize = 40;
/// The largest total value any set of outputs may carry.
pub const MAXIMUM_MONEY_SATOSHIS: u64 = 2_100_000_000_000_000;
/// Locktime values at or above this threshold are UNIX timestamps.
pub const LOCKTIME_THRESHOLD: i64 = 500_000_000;

/// The consensus and standardness limits of an instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consensus {
    pub maximum_bytecode_length: usize,
    pub maximum_data_carrier_bytes: usize,
    /// `None` when operations are not counted.
    pub maximum_operation_count: Option<usize>,
    pub maximum_stack_depth: usize,
    pub maximum_stack_item_length: usize,
    pub maximum_standard_version: u32,
    pub maximum_standard_unlocking_bytecode_length: usize,
    pub minimum_transaction_size: usize,
    pub maximum_standard_transaction_size: usize,
    pub maximum_transaction_size: usize,
    pub maximum_vm_number_length: usize,
    pub maximum_multisig_public_keys: usize,
    pub minimum_consensus_version: u32,
    pub maximum_consensus_version: u32,
    pub maximum_commitment_length: usize,
    /// Signing serialization types accepted in transaction signatures.
    pub signing_serialization_types: &'static [u8],
}

impl Consensus {
    /// The limits in effect since the May 2022 upgrade.
    pub fn bch_2022() -> Self {
        Consensus {
            maximum_bytecode_length: MAXIMUM_BYTECODE_LENGTH,
            maximum_data_carrier_bytes: MAXIMUM_DATA_CARRIER_BYTES,
            maximum_operation_count: Some(MAXIMUM_OPERATION_COUNT),
            maximum_stack_depth: MAXIMUM_STACK_DEPTH,
            maximum_stack_item_length: MAXIMUM_STACK_ITEM_LENGTH,
            maximum_standard_version: 2,
            maximum_standard_unlocking_bytecode_length: MAXIMUM_STANDARD_UNLOCKING_BYTECODE_LENGTH,
            minimum_transaction_size: 100,
            maximum_standard_transaction_size: MAXIMUM_STANDARD_TRANSACTION_SIZE,
            maximum_transaction_size: MAXIMUM_TRANSACTION_SIZE,
            maximum_vm_number_length: 8,
            maximum_multisig_public_keys: MAXIMUM_MULTISIG_PUBLIC_KEYS,
            minimum_consensus_version: 1,
            maximum_consensus_version: 2,
            maximum_commitment_length: MAXIMUM_TOKEN_COMMITMENT_LENGTH,
            signing_serialization_types: &SIGNING_SERIALIZATION_TYPES_BCH_2022,
        }
    }

    /// The limits in effect since the May 2023 upgrade (CashTokens, P2SH32
    /// and a 65-byte minimum transaction size).
    pub fn bch_2023() -> Self {
        Consensus {
            minimum_transaction_size: 65,
            signing_serialization_types: &SIGNING_SERIALIZATION_TYPES_BCH_2023,
            ..Consensus::bch_2022()
        }
    }

    /// Proposed limits: 10,000-byte stack items and VM numbers, no
    /// operation count limit and a density-based hashing limit.
    pub fn chips() -> Self {
        Consensus {
            maximum_operation_count: None,
            maximum_stack_item_length: MAXIMUM_BYTECODE_LENGTH,
            maximum_vm_number_length: MAXIMUM_BYTECODE_LENGTH,
            ..Consensus::bch_2023()
        }
    }
}

/// The hashing and signature implementations used during evaluation.
#[derive(Clone)]
pub struct Capabilities {
    pub ripemd160: Arc<dyn Ripemd160>,
    pub sha1: Arc<dyn Sha1>,
    pub sha256: Arc<dyn Sha256>,
    pub secp256k1: Arc<dyn Secp256k1>,
}

impl Capabilities {
    /// The `bch-primitives` native implementations.
    pub fn native() -> Self {
        Capabilities {
            ripemd160: Arc::new(NativeHash),
            sha1: Arc::new(NativeHash),
            sha256: Arc::new(NativeHash),
            secp256k1: Arc::new(NativeSecp256k1),
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::native()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consensus_presets() {
        let bch_2022 = Consensus::bch_2022();
        assert_eq!(bch_2022.minimum_transaction_size, 100);
        assert_eq!(bch_2022.maximum_operation_count, Some(201));

        let bch_2023 = Consensus::bch_2023();
        assert_eq!(bch_2023.minimum_transaction_size, 65);
        assert_eq!(bch_2023.maximum_stack_item_length, 520);
        assert_eq!(bch_2023.signing_serialization_types.len(), 9);

        let chips = Consensus::chips();
        assert_eq!(chips.maximum_operation_count, None);
        assert_eq!(chips.maximum_stack_item_length, 10_000);
        assert_eq!(chips.maximum_vm_number_length, 10_000);
        assert_eq!(chips.minimum_transaction_size, 65);
    }
}
