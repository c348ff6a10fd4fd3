//! The BCH compiler: the common operations plus transaction signatures,
//! data signatures and full signing serializations.

use std::collections::BTreeMap;
use std::sync::Arc;

use bch_primitives::ec::{NativeSecp256k1, Secp256k1};
use bch_primitives::hash::{hash256_with, NativeHash, Sha256};
use bch_primitives::PrimitivesError;
use bch_transaction::signing_serialization::{
    generate_signing_serialization_for_program, ALL_OUTPUTS, ALL_OUTPUTS_ALL_UTXOS, ALL_OUTPUTS_SINGLE_INPUT,
    CORRESPONDING_OUTPUT, CORRESPONDING_OUTPUT_ALL_UTXOS, CORRESPONDING_OUTPUT_SINGLE_INPUT, NO_OUTPUTS,
    NO_OUTPUTS_ALL_UTXOS, NO_OUTPUTS_SINGLE_INPUT, SIGHASH_UTXOS,
};
use bch_transaction::AuthenticationProgram;
use bch_vm::instruction::generate_bytecode_map;
use bch_vm::opcodes::opcode_name_chips;
use bch_vm::AuthenticationVirtualMachine;

use crate::compiler::helpers::{
    attempt_bytecode_resolution, compile_script, derive_hd_key_private, generate_covered_bytecode, operation,
    require_configuration, require_data, variable_id, Attempt,
};
use crate::compiler::operations::operations_common;
use crate::compiler::types::{
    CompilationData, CompilerConfiguration, CompilerOperation, CompilerOperationResult, CompilerOperations,
    OperationGroup,
};
use crate::compiler::utils::{
    create_authentication_program_evaluation_common, wallet_template_to_compiler_configuration, Compiler,
};
use crate::language::types::ResolutionSignature;
use crate::template::WalletTemplate;

/// Signing serialization algorithm names and their type bytes.
///
/// The `_INVALID_all_utxos` variants combine `SIGHASH_UTXOS` with
/// `SIGHASH_ANYONECANPAY`, producing signatures the VM rejects; they exist
/// for testing.
pub const SIGNING_SERIALIZATION_ALGORITHMS: [(&str, u8); 13] = [
    ("all_outputs", ALL_OUTPUTS),
    ("all_outputs_all_utxos", ALL_OUTPUTS_ALL_UTXOS),
    ("all_outputs_single_input", ALL_OUTPUTS_SINGLE_INPUT),
    (
        "all_outputs_single_input_INVALID_all_utxos",
        ALL_OUTPUTS_SINGLE_INPUT | SIGHASH_UTXOS,
    ),
    ("corresponding_output", CORRESPONDING_OUTPUT),
    ("corresponding_output_all_utxos", CORRESPONDING_OUTPUT_ALL_UTXOS),
    ("corresponding_output_single_input", CORRESPONDING_OUTPUT_SINGLE_INPUT),
    (
        "corresponding_output_single_input_INVALID_all_utxos",
        CORRESPONDING_OUTPUT_SINGLE_INPUT | SIGHASH_UTXOS,
    ),
    ("default", ALL_OUTPUTS_ALL_UTXOS),
    ("no_outputs", NO_OUTPUTS),
    ("no_outputs_all_utxos", NO_OUTPUTS_ALL_UTXOS),
    ("no_outputs_single_input", NO_OUTPUTS_SINGLE_INPUT),
    (
        "no_outputs_single_input_INVALID_all_utxos",
        NO_OUTPUTS_SINGLE_INPUT | SIGHASH_UTXOS,
    ),
];

/// The type byte of a signing serialization algorithm name, after removing
/// `prefix`.
pub fn signing_serialization_type(algorithm: &str, prefix: &str) -> Option<u8> {
    let name = algorithm.strip_prefix(prefix)?;
    SIGNING_SERIALIZATION_ALGORITHMS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, byte)| *byte)
}

type Signer = fn(&dyn Secp256k1, &[u8], &[u8]) -> Result<Vec<u8>, PrimitivesError>;

fn sign_ecdsa(secp256k1: &dyn Secp256k1, private_key: &[u8], digest: &[u8]) -> Result<Vec<u8>, PrimitivesError> {
    secp256k1.sign_message_hash_der(private_key, digest)
}

fn sign_schnorr(secp256k1: &dyn Secp256k1, private_key: &[u8], digest: &[u8]) -> Result<Vec<u8>, PrimitivesError> {
    secp256k1.sign_message_hash_schnorr(private_key, digest)
}

fn unknown_component(identifier: &str, fragment: &str) -> CompilerOperationResult {
    CompilerOperationResult::error(format!(
        "Unknown component in \"{}\" - the fragment \"{}\" is not recognized.",
        identifier, fragment
    ))
}

fn signing_error(identifier: &str, error: PrimitivesError) -> CompilerOperationResult {
    CompilerOperationResult::error(format!("Could not sign \"{}\": {}", identifier, error))
}

/// The type byte named by `[variable_id].[operation].[algorithm]`.
fn signature_type(identifier: &str, operation_name: &str) -> Attempt<u8> {
    let mut parts = identifier.split('.').skip(2);
    let algorithm = parts.next();
    if let Some(unknown) = parts.next() {
        return Err(unknown_component(identifier, unknown));
    }
    let Some(algorithm) = algorithm else {
        return Err(CompilerOperationResult::error(format!(
            "Invalid signature identifier. Signatures must be of the form: \"[variable_id].{}.[signing_serialization_type]\".",
            operation_name
        )));
    };
    signing_serialization_type(algorithm, "").ok_or_else(|| {
        CompilerOperationResult::error(format!(
            "Unknown signing serialization algorithm, \"{}\".",
            algorithm
        ))
    })
}

/// Sign the transaction of `context`, appending the type byte.
#[allow(clippy::too_many_arguments)]
fn compute_signature(
    identifier: &str,
    signing_serialization_type: u8,
    covered_bytecode: &[u8],
    context: &AuthenticationProgram,
    private_key: &[u8],
    sha256: &dyn Sha256,
    secp256k1: &dyn Secp256k1,
    sign: Signer,
) -> CompilerOperationResult {
    let serialization =
        match generate_signing_serialization_for_program(context, covered_bytecode, signing_serialization_type, sha256)
        {
            Ok(serialization) => serialization,
            Err(error) => {
                return CompilerOperationResult::error(format!(
                    "Cannot resolve \"{}\" - the compilation context is invalid: {}",
                    identifier, error
                ))
            }
        };
    let digest = hash256_with(sha256, &serialization);
    match sign(secp256k1, private_key, &digest) {
        Ok(mut signature) => {
            signature.push(signing_serialization_type);
            CompilerOperationResult::Success {
                bytecode: signature,
                signature: Some(ResolutionSignature::Serialization(serialization)),
            }
        }
        Err(error) => signing_error(identifier, error),
    }
}

/// The target script named by `[variable_id].[operation].[script_id]`.
fn data_signature_target<'a>(identifier: &'a str, operation_name: &str) -> Attempt<&'a str> {
    let mut parts = identifier.split('.').skip(2);
    let script_id = parts.next();
    if let Some(unknown) = parts.next() {
        return Err(unknown_component(identifier, unknown));
    }
    script_id.ok_or_else(|| {
        CompilerOperationResult::error(format!(
            "Invalid data signature identifier. Data signatures must be of the form: \"[variable_id].{}.[target_script_id]\".",
            operation_name
        ))
    })
}

/// Sign the SHA-256 digest of the compiled target script. No type byte is
/// appended.
#[allow(clippy::too_many_arguments)]
fn compute_data_signature(
    identifier: &str,
    operation_name: &str,
    data: &CompilationData,
    configuration: &CompilerConfiguration,
    private_key: &[u8],
    sha256: &dyn Sha256,
    secp256k1: &dyn Secp256k1,
    sign: Signer,
) -> Attempt<CompilerOperationResult> {
    let script_id = data_signature_target(identifier, operation_name)?;
    let message = compile_script(script_id, data, configuration).unwrap_or_else(|| {
        Err(CompilerOperationResult::error(format!(
            "Data signature tried to sign an unknown target script, \"{}\".",
            script_id
        )))
    })?;
    let digest = sha256.hash(&message);
    Ok(match sign(secp256k1, private_key, &digest) {
        Ok(signature) => CompilerOperationResult::Success {
            bytecode: signature,
            signature: Some(ResolutionSignature::Data {
                digest: digest.to_vec(),
                message,
            }),
        },
        Err(error) => signing_error(identifier, error),
    })
}

fn missing_key(identifier: &str) -> CompilerOperationResult {
    CompilerOperationResult::recoverable(format!(
        "Identifier \"{}\" refers to a Key, but a private key for \"{}\" (or an existing signature) was not provided in the compilation data.",
        identifier,
        variable_id(identifier)
    ))
}

fn private_key<'a>(identifier: &str, data: &'a CompilationData) -> Attempt<&'a Vec<u8>> {
    let keys = require_data(data.keys.as_ref(), identifier, "keys")?;
    keys.private_keys
        .as_ref()
        .and_then(|keys| keys.get(variable_id(identifier)))
        .ok_or_else(|| missing_key(identifier))
}

/// `<key>.signature.<algorithm>` and `<key>.schnorr_signature.<algorithm>`.
pub fn key_signature(operation_name: &'static str, sign: Signer) -> CompilerOperation {
    operation(move |identifier, data, configuration| {
        if let Some(bytecode) = attempt_bytecode_resolution(identifier, data) {
            return Ok(CompilerOperationResult::success(bytecode));
        }
        let sha256 = require_configuration(configuration.sha256.as_deref(), identifier, "sha256")?;
        let secp256k1 = require_configuration(configuration.secp256k1.as_deref(), identifier, "secp256k1")?;
        let unlocking_scripts = require_configuration(
            configuration.unlocking_scripts.as_ref(),
            identifier,
            "unlockingScripts",
        )?;
        let source_script_ids = require_configuration(
            configuration.source_script_ids.as_deref(),
            identifier,
            "sourceScriptIds",
        )?;
        let context = require_data(data.compilation_context.as_ref(), identifier, "compilationContext")?;
        let private_key = private_key(identifier, data)?;

        let covered = generate_covered_bytecode(identifier, data, configuration, source_script_ids, unlocking_scripts)?;
        let signing_serialization_type = signature_type(identifier, operation_name)?;
        Ok(compute_signature(
            identifier,
            signing_serialization_type,
            &covered,
            context,
            private_key,
            sha256,
            secp256k1,
            sign,
        ))
    })
}

/// `<hd_key>.signature.<algorithm>` and
/// `<hd_key>.schnorr_signature.<algorithm>`.
pub fn hd_key_signature(operation_name: &'static str, sign: Signer) -> CompilerOperation {
    operation(move |identifier, data, configuration| {
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
        let sha256 = require_configuration(configuration.sha256.as_deref(), identifier, "sha256")?;
        let variables = require_configuration(configuration.variables.as_ref(), identifier, "variables")?;
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
        let hd_keys = require_data(data.hd_keys.as_ref(), identifier, "hdKeys")?;
        let context = require_data(data.compilation_context.as_ref(), identifier, "compilationContext")?;

        let private_key = derive_hd_key_private(identifier, hd_keys, entity_ownership, variables, derivation)?;
        let covered = generate_covered_bytecode(identifier, data, configuration, source_script_ids, unlocking_scripts)?;
        let signing_serialization_type = signature_type(identifier, operation_name)?;
        Ok(compute_signature(
            identifier,
            signing_serialization_type,
            &covered,
            context,
            &private_key,
            sha256,
            secp256k1,
            sign,
        ))
    })
}

/// `<key>.data_signature.<script>` and
/// `<key>.schnorr_data_signature.<script>`.
pub fn key_data_signature(operation_name: &'static str, sign: Signer) -> CompilerOperation {
    operation(move |identifier, data, configuration| {
        if let Some(bytecode) = attempt_bytecode_resolution(identifier, data) {
            return Ok(CompilerOperationResult::success(bytecode));
        }
        let sha256 = require_configuration(configuration.sha256.as_deref(), identifier, "sha256")?;
        let secp256k1 = require_configuration(configuration.secp256k1.as_deref(), identifier, "secp256k1")?;
        let private_key = private_key(identifier, data)?;
        compute_data_signature(
            identifier,
            operation_name,
            data,
            configuration,
            private_key,
            sha256,
            secp256k1,
            sign,
        )
    })
}

/// `<hd_key>.data_signature.<script>` and
/// `<hd_key>.schnorr_data_signature.<script>`.
pub fn hd_key_data_signature(operation_name: &'static str, sign: Signer) -> CompilerOperation {
    operation(move |identifier, data, configuration| {
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
        let sha256 = require_configuration(configuration.sha256.as_deref(), identifier, "sha256")?;
        let variables = require_configuration(configuration.variables.as_ref(), identifier, "variables")?;
        let hd_keys = require_data(data.hd_keys.as_ref(), identifier, "hdKeys")?;

        let private_key = derive_hd_key_private(identifier, hd_keys, entity_ownership, variables, derivation)?;
        compute_data_signature(
            identifier,
            operation_name,
            data,
            configuration,
            &private_key,
            sha256,
            secp256k1,
            sign,
        )
    })
}

/// `signing_serialization.full_<algorithm>`: the complete signing
/// serialization a signature of that algorithm would cover.
pub fn signing_serialization_full() -> CompilerOperation {
    operation(|identifier, data, configuration| {
        let sha256 = require_configuration(configuration.sha256.as_deref(), identifier, "sha256")?;
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
        let context = require_data(data.compilation_context.as_ref(), identifier, "compilationContext")?;

        let mut parts = identifier.split('.').skip(1);
        let Some(algorithm) = parts.next() else {
            return Ok(CompilerOperationResult::error(
                "Invalid signing serialization operation. Include the desired component or algorithm, e.g. \"signing_serialization.version\".",
            ));
        };
        if let Some(unknown) = parts.next() {
            return Ok(unknown_component(identifier, unknown));
        }
        let Some(signing_serialization_type) = signing_serialization_type(algorithm, "full_") else {
            return Ok(CompilerOperationResult::error(format!(
                "Unknown signing serialization algorithm, \"{}\".",
                algorithm
            )));
        };

        let covered = generate_covered_bytecode(identifier, data, configuration, source_script_ids, unlocking_scripts)?;
        Ok(
            match generate_signing_serialization_for_program(context, &covered, signing_serialization_type, sha256) {
                Ok(serialization) => CompilerOperationResult::success(serialization),
                Err(error) => CompilerOperationResult::error(format!(
                    "Cannot resolve \"{}\" - the compilation context is invalid: {}",
                    identifier, error
                )),
            },
        )
    })
}

fn with_signatures(
    group: Option<OperationGroup>,
    signature: fn(&'static str, Signer) -> CompilerOperation,
    data_signature: fn(&'static str, Signer) -> CompilerOperation,
) -> OperationGroup {
    let mut operations = match group {
        Some(OperationGroup::ById(operations)) => operations,
        _ => BTreeMap::new(),
    };
    let signers: [(&'static str, Signer, bool); 6] = [
        ("signature", sign_ecdsa, false),
        ("ecdsa_signature", sign_ecdsa, false),
        ("schnorr_signature", sign_schnorr, false),
        ("data_signature", sign_ecdsa, true),
        ("ecdsa_data_signature", sign_ecdsa, true),
        ("schnorr_data_signature", sign_schnorr, true),
    ];
    for (name, sign, is_data) in signers {
        let operation = if is_data {
            data_signature(name, sign)
        } else {
            signature(name, sign)
        };
        operations.insert(name.to_string(), operation);
    }
    OperationGroup::ById(operations)
}

/// The BCH operation table: the common operations with signatures added to
/// `Key` and `HdKey` variables and `full_<algorithm>` signing
/// serializations.
pub fn operations_bch() -> CompilerOperations {
    let common = operations_common();

    let mut signing_serialization = match common.signing_serialization {
        Some(OperationGroup::ById(operations)) => operations,
        _ => BTreeMap::new(),
    };
    for (name, _) in SIGNING_SERIALIZATION_ALGORITHMS {
        signing_serialization.insert(format!("full_{}", name), signing_serialization_full());
    }

    CompilerOperations {
        hd_key: Some(with_signatures(common.hd_key, hd_key_signature, hd_key_data_signature)),
        key: Some(with_signatures(common.key, key_signature, key_data_signature)),
        signing_serialization: Some(OperationGroup::ById(signing_serialization)),
        ..common
    }
}

/// Fill every property not set in `configuration` with its BCH default:
/// BCH opcodes including the CHIPs additions, the BCH operations, native
/// hashing and secp256k1, a BCH 2023 VM and the common evaluation program.
pub fn compiler_configuration_bch(configuration: CompilerConfiguration) -> CompilerConfiguration {
    let mut configuration = configuration;
    if configuration.create_authentication_program.is_none() {
        configuration.create_authentication_program = Some(Arc::new(create_authentication_program_evaluation_common));
    }
    if configuration.opcodes.is_none() {
        configuration.opcodes = Some(generate_bytecode_map(opcode_name_chips));
    }
    if configuration.operations.is_none() {
        configuration.operations = Some(operations_bch());
    }
    if configuration.sha256.is_none() {
        configuration.sha256 = Some(Arc::new(NativeHash));
    }
    if configuration.secp256k1.is_none() {
        configuration.secp256k1 = Some(Arc::new(NativeSecp256k1));
    }
    if configuration.vm.is_none() {
        configuration.vm = Some(Arc::new(AuthenticationVirtualMachine::bch_2023(true)));
    }
    configuration
}

/// Create a BCH compiler; see [`compiler_configuration_bch`] for the
/// defaults applied to `configuration`.
pub fn create_compiler_bch(configuration: CompilerConfiguration) -> Compiler {
    Compiler::new(compiler_configuration_bch(configuration))
}

/// Create a BCH compiler for the scripts and variables of a wallet
/// template.
pub fn wallet_template_to_compiler_bch(template: &WalletTemplate) -> Compiler {
    create_compiler_bch(wallet_template_to_compiler_configuration(template))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_serialization_types() {
        assert_eq!(signing_serialization_type("all_outputs", ""), Some(0x41));
        assert_eq!(signing_serialization_type("default", ""), Some(0x61));
        assert_eq!(signing_serialization_type("no_outputs_single_input", ""), Some(0xc2));
        assert_eq!(
            signing_serialization_type("corresponding_output_single_input_INVALID_all_utxos", ""),
            Some(0xe3)
        );
        assert_eq!(signing_serialization_type("full_all_outputs", "full_"), Some(0x41));
        assert_eq!(signing_serialization_type("all_outputs", "full_"), None);
        assert_eq!(signing_serialization_type("everything", ""), None);
    }

    #[test]
    fn test_signature_identifier_errors() {
        assert_eq!(
            signature_type("owner.signature", "signature"),
            Err(CompilerOperationResult::error(
                "Invalid signature identifier. Signatures must be of the form: \"[variable_id].signature.[signing_serialization_type]\"."
            ))
        );
        assert_eq!(
            signature_type("owner.signature.all_outputs.extra", "signature"),
            Err(CompilerOperationResult::error(
                "Unknown component in \"owner.signature.all_outputs.extra\" - the fragment \"extra\" is not recognized."
            ))
        );
        assert_eq!(
            signature_type("owner.signature.some_outputs", "signature"),
            Err(CompilerOperationResult::error(
                "Unknown signing serialization algorithm, \"some_outputs\"."
            ))
        );
        assert_eq!(
            data_signature_target("owner.data_signature", "data_signature"),
            Err(CompilerOperationResult::error(
                "Invalid data signature identifier. Data signatures must be of the form: \"[variable_id].data_signature.[target_script_id]\"."
            ))
        );
    }

    #[test]
    fn test_operations_bch_adds_signatures() {
        let operations = operations_bch();
        let Some(OperationGroup::ById(key)) = operations.key else {
            panic!("expected key operations by ID");
        };
        for name in [
            "public_key",
            "signature",
            "schnorr_signature",
            "data_signature",
            "schnorr_data_signature",
            "ecdsa_signature",
            "ecdsa_data_signature",
        ] {
            assert!(key.contains_key(name), "{}", name);
        }
        let Some(OperationGroup::ById(signing_serialization)) = operations.signing_serialization else {
            panic!("expected signing serialization operations by ID");
        };
        assert!(signing_serialization.contains_key("full_all_outputs"));
        assert!(signing_serialization.contains_key("version"));
    }

    #[test]
    fn test_create_compiler_bch_keeps_overrides() {
        let configuration = compiler_configuration_bch(CompilerConfiguration {
            opcodes: Some(Default::default()),
            ..CompilerConfiguration::with_scripts([("lock", "OP_1")])
        });
        assert!(configuration.opcodes.as_ref().is_some_and(|opcodes| opcodes.is_empty()));
        assert!(configuration.vm.is_some());
        assert!(configuration.sha256.is_some());
        assert_eq!(configuration.scripts["lock"], "OP_1");
    }
}
