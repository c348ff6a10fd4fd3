//! Script compilation with time-lock checks and P2SH transformations.

use tracing::debug;

use bch_vm::instruction::generate_bytecode_map;
use bch_vm::opcodes::opcode_name;

use crate::compiler::operations::operations_common;
use crate::compiler::types::{CompilationData, CompilerConfiguration};
use crate::language::resolve::compile_script_raw;
use crate::language::types::{CompilationFailure, CompilationResult, Range, Transformation};
use crate::template::{LockingType, TimeLockType, VariableInfo, WalletTemplateVariable};

/// Sequence number disabling locktime for an input.
pub const LOCKTIME_DISABLING_SEQUENCE_NUMBER: u32 = 0xffff_ffff;

/// Locktimes from this value up are timestamps; below it, block heights.
pub const LOCKTIME_TIMESTAMP_THRESHOLD: u32 = 500_000_000;

const P2SH20_LOCKING: &str = "p2sh20Locking";
const P2SH32_LOCKING: &str = "p2sh32Locking";
const P2SH_UNLOCKING: &str = "p2shUnlocking";
const LOCKING_BYTECODE: &str = "lockingBytecode";
const UNLOCKING_BYTECODE: &str = "unlockingBytecode";

/// A configuration compiling fixed wrapper scripts over `AddressData`
/// variables, for the P2SH transformations.
fn wrapper_configuration(
    configuration: &CompilerConfiguration,
    scripts: &[(&str, &str)],
    variables: &[&str],
) -> CompilerConfiguration {
    CompilerConfiguration {
        scripts: scripts
            .iter()
            .map(|(id, script)| (id.to_string(), script.to_string()))
            .collect(),
        opcodes: Some(generate_bytecode_map(opcode_name)),
        variables: Some(
            variables
                .iter()
                .map(|id| (id.to_string(), WalletTemplateVariable::AddressData(VariableInfo::default())))
                .collect(),
        ),
        operations: Some(operations_common()),
        vm: configuration.vm.clone(),
        create_authentication_program: configuration.create_authentication_program.clone(),
        ..CompilerConfiguration::default()
    }
}

/// Wrap compiled locking bytecode in a P2SH template: `OP_HASH160` (or
/// `OP_HASH256`) of the bytecode, followed by `OP_EQUAL`.
pub fn compile_script_p2sh_locking(
    locking_bytecode: Vec<u8>,
    locking_type: LockingType,
    configuration: &CompilerConfiguration,
) -> CompilationResult {
    let script_id = match locking_type {
        LockingType::P2sh32 => P2SH32_LOCKING,
        _ => P2SH20_LOCKING,
    };
    let wrapper = wrapper_configuration(
        configuration,
        &[
            (
                P2SH20_LOCKING,
                "OP_HASH160 <$(<lockingBytecode> OP_HASH160)> OP_EQUAL",
            ),
            (
                P2SH32_LOCKING,
                "OP_HASH256 <$(<lockingBytecode> OP_HASH256)> OP_EQUAL",
            ),
        ],
        &[LOCKING_BYTECODE],
    );
    let data = CompilationData::with_bytecode([(LOCKING_BYTECODE, locking_bytecode)]);
    compile_script_raw(script_id, &data, &wrapper)
}

/// Append the push of the redeemed locking bytecode to compiled unlocking
/// bytecode.
pub fn compile_script_p2sh_unlocking(
    locking_bytecode: Vec<u8>,
    unlocking_bytecode: Vec<u8>,
    configuration: &CompilerConfiguration,
) -> CompilationResult {
    let wrapper = wrapper_configuration(
        configuration,
        &[(P2SH_UNLOCKING, "unlockingBytecode <lockingBytecode>")],
        &[LOCKING_BYTECODE, UNLOCKING_BYTECODE],
    );
    let data = CompilationData::with_bytecode([
        (LOCKING_BYTECODE, locking_bytecode),
        (UNLOCKING_BYTECODE, unlocking_bytecode),
    ]);
    compile_script_raw(P2SH_UNLOCKING, &data, &wrapper)
}

fn is_p2sh(locking_type: Option<&LockingType>) -> Option<LockingType> {
    match locking_type {
        Some(locking_type @ (LockingType::P2sh20 | LockingType::P2sh32)) => Some(*locking_type),
        _ => None,
    }
}

/// Check the time-lock requirement of `script_id` against the compilation
/// context's transaction, if any.
fn check_time_lock(script_id: &str, data: &CompilationData, configuration: &CompilerConfiguration) -> Option<String> {
    let context = data.compilation_context.as_ref()?;
    let time_lock_type = configuration
        .unlocking_script_time_lock_types
        .as_ref()
        .and_then(|types| types.get(script_id))?;
    let locktime = context.transaction.locktime;

    match time_lock_type {
        TimeLockType::Height if locktime >= LOCKTIME_TIMESTAMP_THRESHOLD => {
            return Some(format!(
                "The script \"{}\" requires a height-based locktime (less than 500,000,000), but this transaction uses a timestamp-based locktime (\"{}\").",
                script_id, locktime
            ));
        }
        TimeLockType::Timestamp if locktime < LOCKTIME_TIMESTAMP_THRESHOLD => {
            return Some(format!(
                "The script \"{}\" requires a timestamp-based locktime (greater than or equal to 500,000,000), but this transaction uses a height-based locktime (\"{}\").",
                script_id, locktime
            ));
        }
        _ => {}
    }

    let sequence_number = context
        .transaction
        .inputs
        .get(context.input_index)
        .map(|input| input.sequence_number);
    (sequence_number == Some(LOCKTIME_DISABLING_SEQUENCE_NUMBER)).then(|| {
        format!(
            "The script \"{}\" requires a locktime, but this input's sequence number is set to disable transaction locktime (0xffffffff). This will cause the OP_CHECKLOCKTIMEVERIFY operation to error when the transaction is verified. To be valid, this input must use a sequence number that does not disable locktime.",
            script_id
        )
    })
}

/// Compile the script `script_id`.
///
/// Unlocking scripts with a time-lock type are checked against the
/// compilation context's locktime and sequence number. P2SH locking
/// scripts are wrapped in their P2SH template, and unlocking scripts of
/// P2SH locking scripts are followed by the push of the redeemed locking
/// bytecode; `transformed` records which.
///
/// # Arguments
/// * `script_id` - The ID of the script in `configuration.scripts`.
/// * `data` - The values used to resolve variables.
/// * `configuration` - The compiler configuration.
pub fn compile_script(script_id: &str, data: &CompilationData, configuration: &CompilerConfiguration) -> CompilationResult {
    if let Some(error) = check_time_lock(script_id, data, configuration) {
        debug!(script_id, "time-lock requirement not met");
        return CompilationFailure::parse(error, Range::empty()).into();
    }

    let mut success = match compile_script_raw(script_id, data, configuration) {
        CompilationResult::Success(success) => success,
        failure => {
            debug!(script_id, error_type = ?failure.error_type(), "compilation failed");
            return failure;
        }
    };

    let locking_script_types = configuration.locking_script_types.as_ref();
    let locking_type = |id: &str| is_p2sh(locking_script_types.and_then(|types| types.get(id)));

    if let Some(locking_type) = locking_type(script_id) {
        return match compile_script_p2sh_locking(success.bytecode.clone(), locking_type, configuration) {
            CompilationResult::Success(wrapped) => {
                success.bytecode = wrapped.bytecode;
                success.transformed = Some(match locking_type {
                    LockingType::P2sh32 => Transformation::P2sh32Locking,
                    _ => Transformation::P2sh20Locking,
                });
                CompilationResult::Success(success)
            }
            failure => failure,
        };
    }

    let unlocked = configuration
        .unlocking_scripts
        .as_ref()
        .and_then(|unlocking_scripts| unlocking_scripts.get(script_id));
    if let Some((unlocked, locking_type)) =
        unlocked.and_then(|unlocked| locking_type(unlocked).map(|locking_type| (unlocked, locking_type)))
    {
        let locking_bytecode = match compile_script_raw(unlocked, data, configuration) {
            CompilationResult::Success(locking) => locking.bytecode,
            failure => return failure,
        };
        return match compile_script_p2sh_unlocking(locking_bytecode, success.bytecode.clone(), configuration) {
            CompilationResult::Success(wrapped) => {
                success.bytecode = wrapped.bytecode;
                success.transformed = Some(match locking_type {
                    LockingType::P2sh32 => Transformation::P2sh32Unlocking,
                    _ => Transformation::P2sh20Unlocking,
                });
                CompilationResult::Success(success)
            }
            failure => failure,
        };
    }

    CompilationResult::Success(success)
}
