//! Compiler operations shared by every compiler: address and wallet data,
//! block height and time, signing serialization components and public
//! keys.

use std::collections::BTreeMap;

use bch_primitives::hash::hash256_with;
use bch_primitives::util::CompactUint;
use bch_transaction::signing_serialization::SigningSerializationComponents;
use bch_vm::vm_number::encode_vm_number_i64;

use crate::compiler::helpers::{
    attempt_bytecode_resolution, derive_hd_private_node, generate_covered_bytecode, hd_key_variable, instance_index,
    is_valid_hd_public_key_derivation_path, missing_address_index, operation, require_configuration, require_data,
    unknown_entity, variable_id, Attempt, HD_KEY_HD_PUBLIC_KEY_DERIVATION_PATH, HD_KEY_PRIVATE_DERIVATION_PATH,
};
use crate::compiler::types::{
    CompilationData, CompilerOperation, CompilerOperationResult, CompilerOperations, HdKeyDerivationError,
    OperationGroup,
};

fn data_variable(type_name: &'static str) -> CompilerOperation {
    operation(move |identifier, data, _| {
        let bytecode = require_data(data.bytecode.as_ref(), identifier, "bytecode")?;
        Ok(match bytecode.get(identifier) {
            Some(value) => CompilerOperationResult::success(value.clone()),
            None => CompilerOperationResult::recoverable(format!(
                "Identifier \"{}\" refers to {}, but \"{}\" was not provided in the CompilationData \"bytecode\".",
                identifier, type_name, identifier
            )),
        })
    })
}

/// Resolves `AddressData` variables from the compilation data's bytecode.
pub fn address_data() -> CompilerOperation {
    data_variable("an AddressData")
}

/// Resolves `WalletData` variables from the compilation data's bytecode.
pub fn wallet_data() -> CompilerOperation {
    data_variable("a WalletData")
}

/// `current_block_height`, encoded as a VM number.
pub fn current_block_height() -> CompilerOperation {
    operation(|identifier, data, _| {
        let height = require_data(data.current_block_height.as_ref(), identifier, "currentBlockHeight")?;
        Ok(CompilerOperationResult::success(encode_vm_number_i64(i64::from(*height))))
    })
}

/// `current_block_time`, encoded as a 4-byte little-endian integer.
pub fn current_block_time() -> CompilerOperation {
    operation(|identifier, data, _| {
        let time = require_data(data.current_block_time.as_ref(), identifier, "currentBlockTime")?;
        Ok(CompilerOperationResult::success(time.to_le_bytes().to_vec()))
    })
}

/// The signing serialization components of the compilation context.
pub(crate) fn signing_serialization_components(
    identifier: &str,
    data: &CompilationData,
) -> Attempt<SigningSerializationComponents> {
    let context = require_data(data.compilation_context.as_ref(), identifier, "compilationContext")?;
    SigningSerializationComponents::from_program(context).map_err(|error| {
        CompilerOperationResult::error(format!(
            "Cannot resolve \"{}\" - the compilation context is invalid: {}",
            identifier, error
        ))
    })
}

fn component(extract: fn(&SigningSerializationComponents) -> Vec<u8>) -> CompilerOperation {
    operation(move |identifier, data, _| {
        let components = signing_serialization_components(identifier, data)?;
        Ok(CompilerOperationResult::success(extract(&components)))
    })
}

fn hashed_component(extract: fn(&SigningSerializationComponents) -> Vec<u8>) -> CompilerOperation {
    operation(move |identifier, data, configuration| {
        let sha256 = require_configuration(configuration.sha256.as_deref(), identifier, "sha256")?;
        let components = signing_serialization_components(identifier, data)?;
        Ok(CompilerOperationResult::success(
            hash256_with(sha256, &extract(&components)).to_vec(),
        ))
    })
}

fn covered_bytecode(encode: fn(Vec<u8>) -> Vec<u8>) -> CompilerOperation {
    operation(move |identifier, data, configuration| {
        let source_script_ids = require_configuration(
            configuration.source_script_ids.as_deref(),
            identifier,
            "sourceScriptIds",
        )?;
        let unlocking_scripts = require_configuration(
            configuration.unlocking_scripts.as_ref(),
            identifier,
            "unlockingScripts",
        )?;
        require_data(data.compilation_context.as_ref(), identifier, "compilationContext")?;
        let covered = generate_covered_bytecode(identifier, data, configuration, source_script_ids, unlocking_scripts)?;
        Ok(CompilerOperationResult::success(encode(covered)))
    })
}

fn corresponding_output(components: &SigningSerializationComponents) -> Vec<u8> {
    components.corresponding_output.clone().unwrap_or_default()
}

/// The `signing_serialization.<component>` operations.
pub fn signing_serialization_operations() -> BTreeMap<String, CompilerOperation> {
    let operations: [(&str, CompilerOperation); 17] = [
        ("corresponding_output", component(corresponding_output)),
        ("corresponding_output_hash", hashed_component(corresponding_output)),
        ("covered_bytecode", covered_bytecode(|covered| covered)),
        (
            "covered_bytecode_length",
            covered_bytecode(|covered| CompactUint::from(covered.len()).to_bytes()),
        ),
        ("locktime", component(|c| c.locktime.to_le_bytes().to_vec())),
        ("outpoint_index", component(|c| c.outpoint_index.to_le_bytes().to_vec())),
        ("outpoint_transaction_hash", component(|c| c.outpoint_transaction_hash.to_vec())),
        ("output_token_prefix", component(|c| c.output_token_prefix.clone())),
        ("output_value", component(|c| c.output_value.to_le_bytes().to_vec())),
        ("sequence_number", component(|c| c.sequence_number.to_le_bytes().to_vec())),
        ("transaction_outpoints", component(|c| c.transaction_outpoints.clone())),
        ("transaction_outpoints_hash", hashed_component(|c| c.transaction_outpoints.clone())),
        ("transaction_outputs", component(|c| c.transaction_outputs.clone())),
        ("transaction_outputs_hash", hashed_component(|c| c.transaction_outputs.clone())),
        (
            "transaction_sequence_numbers",
            component(|c| c.transaction_sequence_numbers.clone()),
        ),
        (
            "transaction_sequence_numbers_hash",
            hashed_component(|c| c.transaction_sequence_numbers.clone()),
        ),
        ("version", component(|c| c.version.to_le_bytes().to_vec())),
    ];
    operations
        .into_iter()
        .map(|(id, operation)| (id.to_string(), operation))
        .collect()
}

/// `<key>.public_key`: an existing public key from the compilation data's
/// bytecode, or the public key of the variable's private key.
pub fn key_public_key() -> CompilerOperation {
    operation(|identifier, data, configuration| {
        if let Some(bytecode) = attempt_bytecode_resolution(identifier, data) {
            return Ok(CompilerOperationResult::success(bytecode));
        }
        let secp256k1 = require_configuration(configuration.secp256k1.as_deref(), identifier, "secp256k1")?;
        let keys = require_data(data.keys.as_ref(), identifier, "keys")?;
        let variable_id = variable_id(identifier);

        let Some(private_key) = keys.private_keys.as_ref().and_then(|keys| keys.get(variable_id)) else {
            return Ok(CompilerOperationResult::recoverable(format!(
                "Identifier \"{}\" refers to a public key, but no public or private keys for \"{}\" were provided in the compilation data.",
                identifier, variable_id
            )));
        };
        Ok(match secp256k1.derive_public_key_compressed(private_key) {
            Ok(public_key) => CompilerOperationResult::success(public_key),
            Err(error) => CompilerOperationResult::error(format!(
                "Could not derive the public key of \"{}\": {}",
                variable_id, error
            )),
        })
    })
}

/// `<hd_key>.public_key`: derived from the owning entity's HD private key
/// if available, otherwise from its HD public key.
pub fn hd_key_public_key() -> CompilerOperation {
    operation(|identifier, data, configuration| {
        if let Some(bytecode) = attempt_bytecode_resolution(identifier, data) {
            return Ok(CompilerOperationResult::success(bytecode));
        }
        let entity_ownership = require_configuration(
            configuration.entity_ownership.as_ref(),
            identifier,
            "entityOwnership",
        )?;
        let derivation = require_configuration(
            configuration.hd_key_derivation.as_deref(),
            identifier,
            "hdKeyDerivation",
        )?;
        let secp256k1 = require_configuration(configuration.secp256k1.as_deref(), identifier, "secp256k1")?;
        let variables = require_configuration(configuration.variables.as_ref(), identifier, "variables")?;
        let hd_keys = require_data(data.hd_keys.as_ref(), identifier, "hdKeys")?;

        let variable_id = variable_id(identifier);
        let entity_id = entity_ownership
            .get(variable_id)
            .ok_or_else(|| unknown_entity(identifier, variable_id))?;
        let address_index = hd_keys
            .address_index
            .ok_or_else(|| missing_address_index(identifier))?;
        let hd_key = hd_key_variable(variables, variable_id);

        if let Some(hd_private_key) = hd_keys.hd_private_keys.as_ref().and_then(|keys| keys.get(entity_id)) {
            let private_key =
                derive_hd_private_node(derivation, identifier, entity_id, hd_private_key, address_index, &hd_key)?;
            return Ok(match secp256k1.derive_public_key_compressed(&private_key) {
                Ok(public_key) => CompilerOperationResult::success(public_key),
                Err(error) => CompilerOperationResult::error(format!(
                    "Could not generate \"{}\" - the derived private key is invalid: {}",
                    identifier, error
                )),
            });
        }

        let Some(hd_public_key) = hd_keys.hd_public_keys.as_ref().and_then(|keys| keys.get(entity_id)) else {
            return Ok(CompilerOperationResult::recoverable(format!(
                "Identifier \"{}\" refers to an HdKey owned by \"{}\", but an HD private key or HD public key for this entity was not provided in the compilation data.",
                identifier, entity_id
            )));
        };

        let private_derivation_path = hd_key
            .private_derivation_path
            .as_deref()
            .unwrap_or(HD_KEY_PRIVATE_DERIVATION_PATH);
        let hd_public_key_derivation_path = hd_key
            .hd_public_key_derivation_path
            .as_deref()
            .unwrap_or(HD_KEY_HD_PUBLIC_KEY_DERIVATION_PATH);
        let public_derivation_path = hd_key
            .public_derivation_path
            .clone()
            .unwrap_or_else(|| private_derivation_path.replacen("m/", "", 1));

        if !is_valid_hd_public_key_derivation_path(hd_public_key_derivation_path) {
            return Ok(CompilerOperationResult::error(format!(
                "Could not generate \"{}\" - \"hdPublicKeyDerivationPath\" (\"{}\") must be a fixed (no \"i\" characters), valid absolute derivation path.",
                identifier, hd_public_key_derivation_path
            )));
        }

        let expected_private_path = if hd_public_key_derivation_path.is_empty() {
            public_derivation_path.clone()
        } else {
            format!("{}/{}", hd_public_key_derivation_path, public_derivation_path)
        };
        if expected_private_path != private_derivation_path {
            return Ok(CompilerOperationResult::error(format!(
                "Could not generate \"{}\" - \"privateDerivationPath\" (\"{}\") is expected to be the combination of \"hdPublicKeyDerivationPath\" and \"publicDerivationPath\": \"{}\".",
                identifier, private_derivation_path, expected_private_path
            )));
        }

        let decode_error = |reason: String| {
            CompilerOperationResult::error(format!(
                "Could not generate \"{}\" - the HD public key provided for {} could not be decoded: {}",
                identifier, entity_id, reason
            ))
        };
        let depth = derivation.public_key_depth(hd_public_key).map_err(|error| decode_error(error.to_string()))?;
        let expected_depth = hd_public_key_derivation_path.split('/').count() - 1;
        if usize::from(depth) != expected_depth {
            return Ok(CompilerOperationResult::error(format!(
                "Could not generate \"{}\" - the HD public key derivation path (\"{}\") indicates an expected depth of {}, but the provided HD public key has a depth of {}.",
                identifier, hd_public_key_derivation_path, expected_depth, depth
            )));
        }

        let instance_path = public_derivation_path.replacen('i', &instance_index(address_index, &hd_key).to_string(), 1);
        Ok(match derivation.derive_public_key(hd_public_key, &instance_path) {
            Ok(public_key) => CompilerOperationResult::success(public_key),
            Err(HdKeyDerivationError::InvalidKey(reason)) => decode_error(reason),
            Err(HdKeyDerivationError::InvalidPath(reason)) => CompilerOperationResult::error(format!(
                "Could not generate \"{}\" - the path \"{}\" could not be derived for entity \"{}\": {}",
                identifier, instance_path, entity_id, reason
            )),
        })
    })
}

/// The operations shared by every compiler. `Key` and `HdKey` variables
/// support only `public_key`.
pub fn operations_common() -> CompilerOperations {
    CompilerOperations {
        address_data: Some(OperationGroup::Single(address_data())),
        current_block_height: Some(OperationGroup::Single(current_block_height())),
        current_block_time: Some(OperationGroup::Single(current_block_time())),
        hd_key: Some(OperationGroup::ById(
            [("public_key".to_string(), hd_key_public_key())].into_iter().collect(),
        )),
        key: Some(OperationGroup::ById(
            [("public_key".to_string(), key_public_key())].into_iter().collect(),
        )),
        signing_serialization: Some(OperationGroup::ById(signing_serialization_operations())),
        wallet_data: Some(OperationGroup::Single(wallet_data())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::types::CompilerConfiguration;

    fn run(operation: &CompilerOperation, identifier: &str, data: &CompilationData) -> CompilerOperationResult {
        operation(identifier, data, &CompilerConfiguration::default())
    }

    #[test]
    fn test_address_data() {
        let data = CompilationData::with_bytecode([("nonce", vec![0x01, 0x02])]);
        assert_eq!(
            run(&address_data(), "nonce", &data),
            CompilerOperationResult::success(vec![0x01, 0x02])
        );
        assert_eq!(
            run(&address_data(), "other", &data),
            CompilerOperationResult::recoverable(
                "Identifier \"other\" refers to an AddressData, but \"other\" was not provided in the CompilationData \"bytecode\"."
            )
        );
        assert_eq!(
            run(&wallet_data(), "other", &data),
            CompilerOperationResult::recoverable(
                "Identifier \"other\" refers to a WalletData, but \"other\" was not provided in the CompilationData \"bytecode\"."
            )
        );
    }

    #[test]
    fn test_block_height_and_time() {
        let data = CompilationData {
            current_block_height: Some(650_000),
            current_block_time: Some(1_600_000_000),
            ..CompilationData::default()
        };
        assert_eq!(
            run(&current_block_height(), "current_block_height", &data),
            CompilerOperationResult::success(vec![0x10, 0xeb, 0x09])
        );
        assert_eq!(
            run(&current_block_time(), "current_block_time", &data),
            CompilerOperationResult::success(1_600_000_000u32.to_le_bytes().to_vec())
        );
        assert_eq!(
            run(&current_block_height(), "current_block_height", &CompilationData::default()),
            CompilerOperationResult::error(
                "Cannot resolve \"current_block_height\" - the \"currentBlockHeight\" property was not provided in the compilation data."
            )
        );
    }

    #[test]
    fn test_key_public_key_requires_key() {
        let configuration = CompilerConfiguration {
            secp256k1: Some(std::sync::Arc::new(bch_primitives::ec::NativeSecp256k1)),
            ..CompilerConfiguration::default()
        };
        let data = CompilationData::with_private_keys([("alice", vec![1u8; 32])]);
        assert_eq!(
            key_public_key()("bob.public_key", &data, &configuration),
            CompilerOperationResult::recoverable(
                "Identifier \"bob.public_key\" refers to a public key, but no public or private keys for \"bob\" were provided in the compilation data."
            )
        );
        match key_public_key()("alice.public_key", &data, &configuration) {
            CompilerOperationResult::Success { bytecode, .. } => assert_eq!(bytecode.len(), 33),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_signing_serialization_operation_names() {
        let operations = signing_serialization_operations();
        assert!(operations.contains_key("version"));
        assert!(operations.contains_key("covered_bytecode_length"));
        assert!(operations.contains_key("transaction_outputs_hash"));
        assert_eq!(operations.len(), 17);
    }
}
