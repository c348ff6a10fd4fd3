//! Building blocks shared by the compiler operations.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::compiler::types::{
    CompilationData, CompilerConfiguration, CompilerOperation, CompilerOperationResult, HdKeyDerivation,
    HdKeyDerivationError, HdKeys,
};
use crate::language::resolve::resolve_script_identifier;
use crate::template::{HdKeyVariable, WalletTemplateVariable};

/// If unset, each `HdKey` uses this address offset.
pub const HD_KEY_ADDRESS_OFFSET: u32 = 0;

/// If unset, each `HdKey` uses this HD public key derivation path.
pub const HD_KEY_HD_PUBLIC_KEY_DERIVATION_PATH: &str = "m";

/// If unset, each `HdKey` uses this private derivation path.
pub const HD_KEY_PRIVATE_DERIVATION_PATH: &str = "m/i";

/// An intermediate value of an operation, or the result to return early.
pub(crate) type Attempt<T> = Result<T, CompilerOperationResult>;

/// Wrap a function returning an [`Attempt`] as a [`CompilerOperation`].
pub(crate) fn operation<F>(function: F) -> CompilerOperation
where
    F: Fn(&str, &CompilationData, &CompilerConfiguration) -> Attempt<CompilerOperationResult> + Send + Sync + 'static,
{
    Arc::new(move |identifier, data, configuration| match function(identifier, data, configuration) {
        Ok(result) | Err(result) => result,
    })
}

/// Require a configuration property.
///
/// # Arguments
/// * `value` - The property, if provided.
/// * `identifier` - The identifier being resolved.
/// * `property` - The property's name, as reported in the error.
pub(crate) fn require_configuration<'a, T: ?Sized>(
    value: Option<&'a T>,
    identifier: &str,
    property: &str,
) -> Attempt<&'a T> {
    value.ok_or_else(|| {
        CompilerOperationResult::error(format!(
            "Cannot resolve \"{}\" - the \"{}\" property was not provided in the compiler configuration.",
            identifier, property
        ))
    })
}

/// Require a compilation data property.
pub(crate) fn require_data<'a, T: ?Sized>(value: Option<&'a T>, identifier: &str, property: &str) -> Attempt<&'a T> {
    value.ok_or_else(|| {
        CompilerOperationResult::error(format!(
            "Cannot resolve \"{}\" - the \"{}\" property was not provided in the compilation data.",
            identifier, property
        ))
    })
}

/// Bytecode provided directly in the compilation data for `identifier`,
/// such as an existing signature or public key.
pub(crate) fn attempt_bytecode_resolution(identifier: &str, data: &CompilationData) -> Option<Vec<u8>> {
    data.bytecode.as_ref()?.get(identifier).cloned()
}

/// The variable ID of an identifier: its first `.`-separated segment.
pub(crate) fn variable_id(identifier: &str) -> &str {
    identifier.split('.').next().unwrap_or(identifier)
}

pub(crate) fn unknown_entity(identifier: &str, variable_id: &str) -> CompilerOperationResult {
    CompilerOperationResult::error(format!(
        "Identifier \"{}\" refers to an HdKey, but the \"entityOwnership\" for \"{}\" is not available in this compiler configuration.",
        identifier, variable_id
    ))
}

pub(crate) fn missing_address_index(identifier: &str) -> CompilerOperationResult {
    CompilerOperationResult::error(format!(
        "Identifier \"{}\" refers to an HdKey, but \"hdKeys.addressIndex\" was not provided in the compilation data.",
        identifier
    ))
}

/// The declaration of an `HdKey` variable. Declarations of another type
/// fall back to the defaults.
pub(crate) fn hd_key_variable(variables: &BTreeMap<String, WalletTemplateVariable>, variable_id: &str) -> HdKeyVariable {
    match variables.get(variable_id) {
        Some(WalletTemplateVariable::HdKey(hd_key)) => hd_key.clone(),
        _ => HdKeyVariable::default(),
    }
}

fn is_digits(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|byte| byte.is_ascii_digit())
}

/// `m` followed by any number of `/<index>` segments, where each index is a
/// number or `i`, optionally hardened with `'`.
pub(crate) fn is_valid_private_derivation_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('m') else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    let Some(rest) = rest.strip_prefix('/') else {
        return false;
    };
    rest.split('/').all(|segment| {
        let index = segment.strip_suffix('\'').unwrap_or(segment);
        index == "i" || is_digits(index)
    })
}

/// A fixed derivation path: `m` or a number, followed by numeric segments,
/// each optionally hardened.
pub(crate) fn is_valid_hd_public_key_derivation_path(path: &str) -> bool {
    let mut segments = path.split('/').map(|segment| segment.strip_suffix('\'').unwrap_or(segment));
    match segments.next() {
        Some(first) if first == "m" || is_digits(first) => segments.all(is_digits),
        _ => false,
    }
}

/// The instance index of an HD key: the address index plus the variable's
/// address offset.
pub(crate) fn instance_index(address_index: u32, hd_key: &HdKeyVariable) -> u64 {
    u64::from(address_index) + u64::from(hd_key.address_offset.unwrap_or(HD_KEY_ADDRESS_OFFSET))
}

/// Derive the private key of an `HdKey` instance from the owning entity's
/// HD private key.
pub(crate) fn derive_hd_private_node(
    derivation: &dyn HdKeyDerivation,
    identifier: &str,
    entity_id: &str,
    entity_hd_private_key: &str,
    address_index: u32,
    hd_key: &HdKeyVariable,
) -> Attempt<Vec<u8>> {
    let private_derivation_path = hd_key
        .private_derivation_path
        .as_deref()
        .unwrap_or(HD_KEY_PRIVATE_DERIVATION_PATH);
    if !is_valid_private_derivation_path(private_derivation_path) {
        return Err(CompilerOperationResult::error(format!(
            "Could not generate {} - the path \"{}\" is not a valid \"privateDerivationPath\".",
            identifier, private_derivation_path
        )));
    }

    let index = instance_index(address_index, hd_key);
    let instance_path = private_derivation_path.replacen('i', &index.to_string(), 1);

    derivation
        .derive_private_key(entity_hd_private_key, &instance_path)
        .map_err(|error| match error {
            HdKeyDerivationError::InvalidKey(reason) => CompilerOperationResult::error(format!(
                "Could not generate {} - the HD private key provided for {} could not be decoded: {}",
                identifier, entity_id, reason
            )),
            HdKeyDerivationError::InvalidPath(reason) => CompilerOperationResult::error(format!(
                "Could not generate {} - the path \"{}\" could not be derived for entity \"{}\": {}",
                identifier, instance_path, entity_id, reason
            )),
        })
}

/// Derive the private key of the `HdKey` referenced by `identifier`, or
/// return a recoverable error if the owning entity's HD private key is
/// missing.
pub(crate) fn derive_hd_key_private(
    identifier: &str,
    hd_keys: &HdKeys,
    entity_ownership: &BTreeMap<String, String>,
    variables: &BTreeMap<String, WalletTemplateVariable>,
    derivation: &dyn HdKeyDerivation,
) -> Attempt<Vec<u8>> {
    let variable_id = variable_id(identifier);
    let entity_id = entity_ownership
        .get(variable_id)
        .ok_or_else(|| unknown_entity(identifier, variable_id))?;
    let address_index = hd_keys
        .address_index
        .ok_or_else(|| missing_address_index(identifier))?;
    let entity_hd_private_key = hd_keys
        .hd_private_keys
        .as_ref()
        .and_then(|keys| keys.get(entity_id))
        .ok_or_else(|| {
            CompilerOperationResult::recoverable(format!(
                "Identifier \"{}\" refers to an HdKey owned by \"{}\", but an HD private key for this entity (or an existing signature) was not provided in the compilation data.",
                identifier, entity_id
            ))
        })?;

    let hd_key = hd_key_variable(variables, variable_id);
    derive_hd_private_node(
        derivation,
        identifier,
        entity_id,
        entity_hd_private_key,
        address_index,
        &hd_key,
    )
}

/// Compile another script of the same configuration.
///
/// # Returns
/// `None` if `target_script_id` is not a known script, otherwise its
/// bytecode or a fatal error describing why it failed to compile.
pub(crate) fn compile_script(
    target_script_id: &str,
    data: &CompilationData,
    configuration: &CompilerConfiguration,
) -> Option<Attempt<Vec<u8>>> {
    resolve_script_identifier(target_script_id, data, configuration).map(|result| {
        result
            .map(|success| success.bytecode)
            .map_err(CompilerOperationResult::error)
    })
}

/// The bytecode covered by a signature in the script being compiled: the
/// compiled locking script unlocked by the current unlocking script.
pub(crate) fn generate_covered_bytecode(
    identifier: &str,
    data: &CompilationData,
    configuration: &CompilerConfiguration,
    source_script_ids: &[String],
    unlocking_scripts: &BTreeMap<String, String>,
) -> Attempt<Vec<u8>> {
    let current_script_id = source_script_ids.last().ok_or_else(|| {
        CompilerOperationResult::error(format!(
            "Identifier \"{}\" requires a signing serialization, but \"coveredBytecode\" cannot be determined because the compiler configuration's \"sourceScriptIds\" is empty.",
            identifier
        ))
    })?;

    let target_locking_script_id = unlocking_scripts.get(current_script_id).ok_or_else(|| {
        CompilerOperationResult::error(format!(
            "Identifier \"{}\" requires a signing serialization, but \"coveredBytecode\" cannot be determined because \"{}\" is not present in the compiler configuration's \"unlockingScripts\".",
            identifier, current_script_id
        ))
    })?;

    compile_script(target_locking_script_id, data, configuration).unwrap_or_else(|| {
        Err(CompilerOperationResult::error(format!(
            "Identifier \"{}\" requires a signing serialization that covers an unknown locking script, \"{}\".",
            identifier, target_locking_script_id
        )))
    })
}
