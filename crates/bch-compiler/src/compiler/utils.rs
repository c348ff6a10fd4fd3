//! Compiler construction, CashAssembly assembly helpers and wallet
//! template import.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bch_primitives::ec::NativeSecp256k1;
use bch_primitives::hash::NativeHash;
use bch_transaction::{AuthenticationProgram, Input, Output, Transaction};
use bch_vm::instruction::generate_bytecode_map;
use bch_vm::opcodes::opcode_name;

use crate::compiler::operations::operations_common;
use crate::compiler::types::{CompilationData, CompilerConfiguration, CompilerOperations};
use crate::error::CompilerError;
use crate::language::compile::compile_script;
use crate::language::types::{BytecodeGenerationError, CompilationResult};
use crate::template::{LockingType, WalletTemplate, WalletTemplateScript};

/// A compiler: a configuration and the operations to compile its scripts.
#[derive(Debug, Clone)]
pub struct Compiler {
    configuration: CompilerConfiguration,
}

impl Compiler {
    /// Create a compiler using `configuration` as is; no defaults are
    /// applied.
    pub fn new(configuration: CompilerConfiguration) -> Self {
        Compiler { configuration }
    }

    pub fn configuration(&self) -> &CompilerConfiguration {
        &self.configuration
    }

    /// Compile a script, returning the full result with every intermediate
    /// stage.
    pub fn compile(&self, script_id: &str, data: &CompilationData) -> CompilationResult {
        compile_script(script_id, data, &self.configuration)
    }

    /// Compile a script to bytecode.
    ///
    /// # Arguments
    /// * `script_id` - The ID of the script to compile.
    /// * `data` - The values used to resolve variables.
    ///
    /// # Returns
    /// The compiled bytecode, or the failing stage and its errors.
    pub fn generate_bytecode(&self, script_id: &str, data: &CompilationData) -> Result<Vec<u8>, BytecodeGenerationError> {
        match self.compile(script_id, data) {
            CompilationResult::Success(success) => Ok(success.bytecode),
            CompilationResult::Error(failure) => Err(BytecodeGenerationError {
                error_type: failure.error_type,
                errors: failure.errors,
            }),
        }
    }
}

/// The authentication program an evaluation runs in: a version 0
/// transaction with one empty input and one empty output, spending an
/// output whose locking bytecode is the evaluation's bytecode.
pub fn create_authentication_program_evaluation_common(evaluation_bytecode: Vec<u8>) -> AuthenticationProgram {
    let transaction = Transaction {
        inputs: vec![Input {
            outpoint_index: 0,
            outpoint_transaction_hash: [0u8; 32],
            sequence_number: 0,
            unlocking_bytecode: Vec::new(),
        }],
        locktime: 0,
        outputs: vec![Output::new(0, Vec::new())],
        version: 0,
    };
    AuthenticationProgram::new(transaction, vec![Output::new(0, evaluation_bytecode)], 0)
}

/// Fill every property not set in `configuration` with its common
/// default: BCH opcodes, the common operations, native hashing and
/// secp256k1 and the common evaluation program. No VM is provided, so
/// evaluations fail unless `configuration` includes one.
pub fn compiler_configuration_common(configuration: CompilerConfiguration) -> CompilerConfiguration {
    let mut configuration = configuration;
    if configuration.create_authentication_program.is_none() {
        configuration.create_authentication_program = Some(Arc::new(create_authentication_program_evaluation_common));
    }
    if configuration.opcodes.is_none() {
        configuration.opcodes = Some(generate_bytecode_map(opcode_name));
    }
    if configuration.operations.is_none() {
        configuration.operations = Some(operations_common());
    }
    if configuration.sha256.is_none() {
        configuration.sha256 = Some(Arc::new(NativeHash));
    }
    if configuration.secp256k1.is_none() {
        configuration.secp256k1 = Some(Arc::new(NativeSecp256k1));
    }
    configuration
}

/// Create a compiler with the common defaults; see
/// [`compiler_configuration_common`].
pub fn create_compiler_common(configuration: CompilerConfiguration) -> Compiler {
    Compiler::new(compiler_configuration_common(configuration))
}

/// Compile a CashAssembly script containing only literals and pushes: no
/// opcodes, variables or evaluations.
///
/// # Returns
/// The bytecode, or `CompilerError::Compilation` listing each error with
/// its position.
pub fn compile_cash_assembly(script: &str) -> Result<Vec<u8>, CompilerError> {
    let compiler = create_compiler_common(CompilerConfiguration {
        opcodes: Some(HashMap::new()),
        operations: Some(CompilerOperations::default()),
        ..CompilerConfiguration::with_scripts([("script", script)])
    });
    compiler
        .generate_bytecode("script", &CompilationData::default())
        .map_err(|failure| {
            let errors: String = failure
                .errors
                .iter()
                .map(|error| {
                    format!(
                        " [{}, {}]: {}",
                        error.range.start_line_number, error.range.start_column, error.error
                    )
                })
                .collect();
            CompilerError::Compilation(format!("CashAssembly compilation error:{}", errors))
        })
}

/// Assemble disassembled bytecode (or any CashAssembly using only the
/// given opcodes, literals, pushes and evaluations) to bytecode.
pub fn assemble_bytecode(
    opcodes: HashMap<String, Vec<u8>>,
    disassembled_bytecode: &str,
) -> Result<Vec<u8>, BytecodeGenerationError> {
    create_compiler_common(CompilerConfiguration {
        opcodes: Some(opcodes),
        ..CompilerConfiguration::with_scripts([("asm", disassembled_bytecode)])
    })
    .generate_bytecode("asm", &CompilationData::default())
}

/// Assemble disassembled BCH bytecode. Pushes are re-encoded minimally.
pub fn assemble_bytecode_bch(disassembled_bytecode: &str) -> Result<Vec<u8>, BytecodeGenerationError> {
    assemble_bytecode(generate_bytecode_map(opcode_name), disassembled_bytecode)
}

/// Assemble BCH CashAssembly, collapsing any failure to a single message.
pub fn cash_assembly_to_bin(script: &str) -> Result<Vec<u8>, CompilerError> {
    assemble_bytecode_bch(script).map_err(|failure| {
        let errors: Vec<&str> = failure.errors.iter().map(|error| error.error.as_str()).collect();
        CompilerError::Compilation(format!(
            "CashAssembly compilation {} error: {}",
            failure.error_type,
            errors.join(" ")
        ))
    })
}

/// The scripts of a template including its virtualized tests.
///
/// Each test of a tested script becomes three scripts: `{id}.{test}.check`
/// (the test's check), `{id}.{test}.lock` (a P2SH20 locking script running
/// the tested script, or pushing it if `pushed`, then the check) and
/// `{id}.{test}.unlock` (the test's setup, unlocking the lock).
fn virtualized_scripts(template: &WalletTemplate) -> BTreeMap<String, WalletTemplateScript> {
    let mut scripts = template.scripts.clone();
    for (script_id, script) in &template.scripts {
        let Some(tests) = &script.tests else {
            continue;
        };
        for (test_id, test) in tests {
            let check_id = format!("{}.{}.check", script_id, test_id);
            let lock_id = format!("{}.{}.lock", script_id, test_id);
            let unlock_id = format!("{}.{}.unlock", script_id, test_id);
            let lock = if script.pushed == Some(true) {
                format!("<{}> {}", script_id, check_id)
            } else {
                format!("{} {}", script_id, check_id)
            };
            scripts.insert(check_id, WalletTemplateScript::new(test.check.clone()));
            scripts.insert(
                lock_id.clone(),
                WalletTemplateScript {
                    locking_type: Some(LockingType::P2sh20),
                    ..WalletTemplateScript::new(lock)
                },
            );
            scripts.insert(
                unlock_id,
                WalletTemplateScript {
                    unlocks: Some(lock_id),
                    ..WalletTemplateScript::new(test.setup.clone().unwrap_or_default())
                },
            );
        }
    }
    scripts
}

/// Extract the scripts, variables, entity ownership, unlocking
/// relationships, locking types, time-lock types and scenarios of a
/// wallet template as a compiler configuration.
pub fn wallet_template_to_compiler_configuration(template: &WalletTemplate) -> CompilerConfiguration {
    let scripts = virtualized_scripts(template);

    let mut variables = BTreeMap::new();
    let mut entity_ownership = BTreeMap::new();
    for (entity_id, entity) in &template.entities {
        for (variable_id, variable) in entity.variables.iter().flatten() {
            variables.insert(variable_id.clone(), variable.clone());
            entity_ownership.insert(variable_id.clone(), entity_id.clone());
        }
    }

    let unlocking_scripts = scripts
        .iter()
        .filter_map(|(id, script)| Some((id.clone(), script.unlocks.clone()?)))
        .collect();
    let unlocking_script_time_lock_types = scripts
        .iter()
        .filter_map(|(id, script)| Some((id.clone(), script.time_lock_type?)))
        .collect();
    let locking_script_types = scripts
        .iter()
        .filter_map(|(id, script)| Some((id.clone(), script.locking_type?)))
        .collect();

    CompilerConfiguration {
        scripts: scripts
            .into_iter()
            .map(|(id, script)| (id, script.script))
            .collect(),
        variables: Some(variables),
        entity_ownership: Some(entity_ownership),
        unlocking_scripts: Some(unlocking_scripts),
        locking_script_types: Some(locking_script_types),
        unlocking_script_time_lock_types: Some(unlocking_script_time_lock_types),
        scenarios: template.scenarios.clone(),
        ..CompilerConfiguration::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::WalletTemplateScriptTest;

    #[test]
    fn test_compile_cash_assembly() {
        assert_eq!(
            compile_cash_assembly("<'abc'> 0x51 <1>").unwrap(),
            vec![0x03, 0x61, 0x62, 0x63, 0x51, 0x51]
        );
        let error = compile_cash_assembly("OP_1").unwrap_err().to_string();
        assert_eq!(error, "CashAssembly compilation error: [1, 1]: Unknown identifier \"OP_1\".");
    }

    #[test]
    fn test_assemble_bytecode_bch() {
        assert_eq!(
            assemble_bytecode_bch("OP_DUP OP_HASH160 OP_PUSHBYTES_2 0x0102 OP_EQUAL").unwrap(),
            vec![0x76, 0xa9, 0x02, 0x01, 0x02, 0x87]
        );
        assert_eq!(
            cash_assembly_to_bin("OP_NOT_AN_OPCODE").unwrap_err().to_string(),
            "CashAssembly compilation resolve error: Unknown identifier \"OP_NOT_AN_OPCODE\"."
        );
    }

    #[test]
    fn test_evaluation_program_shape() {
        let program = create_authentication_program_evaluation_common(vec![0x51]);
        assert_eq!(program.input_index, 0);
        assert_eq!(program.transaction.version, 0);
        assert_eq!(program.transaction.inputs.len(), 1);
        assert_eq!(program.transaction.inputs[0].sequence_number, 0);
        assert_eq!(program.source_outputs[0].locking_bytecode, vec![0x51]);
        assert_eq!(program.transaction.outputs[0].value_satoshis, 0);
    }

    #[test]
    fn test_wallet_template_virtualizes_tests() {
        let json = r#"{
            "entities": {
                "owner": { "variables": { "key": { "type": "Key" }, "nonce": { "type": "AddressData" } } }
            },
            "scripts": {
                "lock": { "lockingType": "p2sh20", "script": "<key.public_key> OP_CHECKSIG" },
                "unlock": { "script": "<key.signature.all_outputs>", "unlocks": "lock", "timeLockType": "height" },
                "add": {
                    "script": "OP_ADD",
                    "tests": { "sum": { "check": "<3> OP_EQUAL", "setup": "<1> <2>" } }
                }
            }
        }"#;
        let template = WalletTemplate::from_json(json).unwrap();
        let configuration = wallet_template_to_compiler_configuration(&template);

        assert_eq!(configuration.scripts["add.sum.check"], "<3> OP_EQUAL");
        assert_eq!(configuration.scripts["add.sum.lock"], "add add.sum.check");
        assert_eq!(configuration.scripts["add.sum.unlock"], "<1> <2>");
        let unlocking_scripts = configuration.unlocking_scripts.as_ref().unwrap();
        assert_eq!(unlocking_scripts["unlock"], "lock");
        assert_eq!(unlocking_scripts["add.sum.unlock"], "add.sum.lock");
        let locking_script_types = configuration.locking_script_types.as_ref().unwrap();
        assert_eq!(locking_script_types["add.sum.lock"], LockingType::P2sh20);
        assert_eq!(locking_script_types["lock"], LockingType::P2sh20);
        assert_eq!(configuration.entity_ownership.as_ref().unwrap()["nonce"], "owner");
        assert_eq!(configuration.variables.as_ref().unwrap().len(), 2);
        assert!(configuration.scenarios.is_none());
    }

    #[test]
    fn test_pushed_tests_push_the_tested_script() {
        let mut script = WalletTemplateScript::new("OP_1");
        script.pushed = Some(true);
        script.tests = Some(BTreeMap::from([(
            "check".to_string(),
            WalletTemplateScriptTest {
                check: "OP_SIZE <1> OP_EQUAL".to_string(),
                ..WalletTemplateScriptTest::default()
            },
        )]));
        let template = WalletTemplate {
            schema: None,
            name: None,
            description: None,
            entities: BTreeMap::new(),
            scripts: BTreeMap::from([("one".to_string(), script)]),
            scenarios: None,
            supported: Vec::new(),
            version: 0,
        };
        let configuration = wallet_template_to_compiler_configuration(&template);
        assert_eq!(configuration.scripts["one.check.lock"], "<one> one.check.check");
        assert_eq!(configuration.scripts["one.check.unlock"], "");
    }
}
