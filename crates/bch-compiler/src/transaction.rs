//! Transaction generation.
//!
//! Builds a complete transaction from templates whose locking and
//! unlocking bytecode is either given directly or compiled. Unlocking
//! bytecode is compiled with a compilation context for its input, so
//! signatures cover the final outputs.
//!
//! Recoverable failures (variables another entity must provide) are
//! collected with [`extract_missing_variables`]; once the values arrive,
//! [`safely_extend_compilation_data`] adds exactly those values to the
//! compilation data before generation is retried.

use std::collections::BTreeMap;
use std::fmt;

use bch_transaction::{AuthenticationProgram, Input, Output, Token, Transaction};
use tracing::debug;

use crate::compiler::types::CompilationData;
use crate::compiler::utils::Compiler;
use crate::language::types::{CompilationError, CompilationErrorType, CompilationResult, ResolvedScript};
use crate::language::utils::stringify_errors;

// -----------------------------------------------------------------------
// Templates
// -----------------------------------------------------------------------

/// A script to compile and the data to compile it with.
#[derive(Clone)]
pub struct CompilationDirective<'a> {
    pub compiler: &'a Compiler,
    pub script: String,
    pub data: CompilationData,
}

/// Bytecode given directly or produced by a [`CompilationDirective`].
#[derive(Clone)]
pub enum BytecodeTemplate<'a> {
    Fixed(Vec<u8>),
    Compiled(CompilationDirective<'a>),
}

#[derive(Clone)]
pub struct OutputTemplate<'a> {
    pub locking_bytecode: BytecodeTemplate<'a>,
    pub token: Option<Token>,
    pub value_satoshis: u64,
}

#[derive(Clone)]
pub struct InputTemplate<'a> {
    pub outpoint_index: u32,
    pub outpoint_transaction_hash: [u8; 32],
    pub sequence_number: u32,
    /// The output spent by this input. Every signing context includes the
    /// spent outputs, so it is required even for fixed unlocking bytecode.
    pub source_output: OutputTemplate<'a>,
    /// Compiled unlocking bytecode gets a compilation context for this
    /// input, replacing any context in the directive's data.
    pub unlocking_bytecode: BytecodeTemplate<'a>,
}

/// Configuration for [`generate_transaction`].
#[derive(Clone)]
pub struct TransactionTemplate<'a> {
    pub inputs: Vec<InputTemplate<'a>>,
    pub locktime: u32,
    pub outputs: Vec<OutputTemplate<'a>>,
    pub version: u32,
}

// -----------------------------------------------------------------------
// Errors
// -----------------------------------------------------------------------

/// The stage at which transaction generation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    Outputs,
    Inputs,
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationStage::Outputs => write!(f, "outputs"),
            GenerationStage::Inputs => write!(f, "inputs"),
        }
    }
}

/// The failed compilation of one input or output.
#[derive(Debug, Clone)]
pub struct GenerationError {
    /// The index of the input or output.
    pub index: usize,
    pub errors: Vec<CompilationError>,
    /// The resolution of the failing script; absent for parse errors.
    pub resolved: Option<ResolvedScript>,
}

/// Every failed compilation of the first stage which failed.
#[derive(Debug, Clone)]
pub struct TransactionGenerationError {
    pub stage: GenerationStage,
    pub errors: Vec<GenerationError>,
}

impl TransactionGenerationError {
    /// Every compilation error across all failed inputs or outputs.
    pub fn compilation_errors(&self) -> impl Iterator<Item = &CompilationError> {
        self.errors.iter().flat_map(|error| error.errors.iter())
    }
}

impl fmt::Display for TransactionGenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors: Vec<CompilationError> = self.compilation_errors().cloned().collect();
        write!(
            f,
            "Failed to generate transaction {}: {}",
            self.stage,
            stringify_errors(&errors, "; ")
        )
    }
}

impl std::error::Error for TransactionGenerationError {}

// -----------------------------------------------------------------------
// Generation
// -----------------------------------------------------------------------

fn compile_directive(
    directive: &CompilationDirective<'_>,
    data: &CompilationData,
    index: usize,
    describe: impl Fn(&str) -> String,
) -> Result<Vec<u8>, GenerationError> {
    match directive.compiler.compile(&directive.script, data) {
        CompilationResult::Success(success) => Ok(success.bytecode),
        CompilationResult::Error(failure) => {
            let failure = *failure;
            let resolved = match failure.error_type {
                CompilationErrorType::Parse => None,
                _ => failure.resolve,
            };
            let errors = failure
                .errors
                .into_iter()
                .map(|mut error| {
                    error.error = describe(&error.error);
                    error
                })
                .collect();
            Err(GenerationError {
                index,
                errors,
                resolved,
            })
        }
    }
}

/// Compile the locking bytecode of an output.
///
/// # Arguments
/// * `template` - The output template.
/// * `index` - The index reported in errors.
pub fn compile_output_template(template: &OutputTemplate<'_>, index: usize) -> Result<Output, GenerationError> {
    let locking_bytecode = match &template.locking_bytecode {
        BytecodeTemplate::Fixed(bytecode) => bytecode.clone(),
        BytecodeTemplate::Compiled(directive) => compile_directive(directive, &directive.data, index, |error| {
            format!("Failed compilation of locking directive at index \"{}\": {}", index, error)
        })?,
    };
    Ok(Output {
        locking_bytecode,
        token: template.token.clone(),
        value_satoshis: template.value_satoshis,
    })
}

/// Compile the unlocking bytecode of an input.
///
/// # Arguments
/// * `template` - The input template.
/// * `index` - The index of the input.
/// * `unsigned` - The transaction with every output and with empty
///   unlocking bytecode, used as the compilation context.
/// * `source_outputs` - The compiled outputs spent by every input.
pub fn compile_input_template(
    template: &InputTemplate<'_>,
    index: usize,
    unsigned: &Transaction,
    source_outputs: &[Output],
) -> Result<Input, GenerationError> {
    let unlocking_bytecode = match &template.unlocking_bytecode {
        BytecodeTemplate::Fixed(bytecode) => bytecode.clone(),
        BytecodeTemplate::Compiled(directive) => {
            let data = CompilationData {
                compilation_context: Some(AuthenticationProgram::new(
                    unsigned.clone(),
                    source_outputs.to_vec(),
                    index,
                )),
                ..directive.data.clone()
            };
            compile_directive(directive, &data, index, |error| format!("Input {}: {}", index, error))?
        }
    };
    Ok(Input {
        outpoint_index: template.outpoint_index,
        outpoint_transaction_hash: template.outpoint_transaction_hash,
        sequence_number: template.sequence_number,
        unlocking_bytecode,
    })
}

fn collect_stage<T>(
    stage: GenerationStage,
    results: impl Iterator<Item = Result<T, GenerationError>>,
) -> Result<Vec<T>, TransactionGenerationError> {
    let mut values = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(error) => errors.push(error),
        }
    }
    if errors.is_empty() {
        Ok(values)
    } else {
        debug!(%stage, failed = errors.len(), "transaction generation failed");
        Err(TransactionGenerationError { stage, errors })
    }
}

/// Generate a transaction from a template.
///
/// Outputs are compiled first; if any fail, generation stops with the
/// `Outputs` stage. Then the outputs spent by the inputs are compiled,
/// followed by the unlocking bytecode of every input. Failures of either
/// are reported with the `Inputs` stage.
///
/// # Returns
/// The transaction, or every failed compilation of the failing stage.
pub fn generate_transaction(template: &TransactionTemplate<'_>) -> Result<Transaction, TransactionGenerationError> {
    let outputs = collect_stage(
        GenerationStage::Outputs,
        template
            .outputs
            .iter()
            .enumerate()
            .map(|(index, output)| compile_output_template(output, index)),
    )?;

    let source_outputs = collect_stage(
        GenerationStage::Inputs,
        template
            .inputs
            .iter()
            .enumerate()
            .map(|(index, input)| compile_output_template(&input.source_output, index)),
    )?;

    let unsigned = Transaction {
        inputs: template
            .inputs
            .iter()
            .map(|input| Input {
                outpoint_index: input.outpoint_index,
                outpoint_transaction_hash: input.outpoint_transaction_hash,
                sequence_number: input.sequence_number,
                unlocking_bytecode: Vec::new(),
            })
            .collect(),
        locktime: template.locktime,
        outputs,
        version: template.version,
    };

    let inputs = collect_stage(
        GenerationStage::Inputs,
        template
            .inputs
            .iter()
            .enumerate()
            .map(|(index, input)| compile_input_template(input, index, &unsigned, &source_outputs)),
    )?;

    debug!(
        inputs = inputs.len(),
        outputs = unsigned.outputs.len(),
        "generated transaction"
    );
    Ok(Transaction { inputs, ..unsigned })
}

// -----------------------------------------------------------------------
// Recovery
// -----------------------------------------------------------------------

/// The variables missing from a failed generation, by full identifier,
/// with the entity which owns each (if known).
///
/// # Returns
/// `None` if any error cannot be fixed by supplying a variable.
pub fn extract_missing_variables(error: &TransactionGenerationError) -> Option<BTreeMap<String, Option<String>>> {
    let mut missing = BTreeMap::new();
    for compilation_error in error.compilation_errors() {
        let identifier = compilation_error.missing_identifier.clone()?;
        missing.insert(identifier, compilation_error.owning_entity.clone());
    }
    Some(missing)
}

/// Add the bytecode of exactly the variables missing from a failed
/// generation to `data`, taking each from `available`.
///
/// Only missing identifiers are copied, and existing values in `data`
/// are never replaced, so values supplied by another entity cannot
/// change anything the compiling entity already provides.
///
/// # Returns
/// `false` (leaving `data` unchanged) if an error is not recoverable or
/// a missing variable is not in `available`.
pub fn safely_extend_compilation_data(
    error: &TransactionGenerationError,
    data: &mut CompilationData,
    available: &BTreeMap<String, Vec<u8>>,
) -> bool {
    let Some(missing) = extract_missing_variables(error) else {
        return false;
    };
    if missing.keys().any(|identifier| !available.contains_key(identifier)) {
        return false;
    }
    let bytecode = data.bytecode.get_or_insert_with(BTreeMap::new);
    for identifier in missing.keys() {
        if let Some(value) = available.get(identifier) {
            bytecode.entry(identifier.clone()).or_insert_with(|| value.clone());
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use bch_primitives::ec::{NativeSecp256k1, Secp256k1};
    use bch_vm::AuthenticationVirtualMachine;

    use super::*;
    use crate::compiler::bch::create_compiler_bch;
    use crate::compiler::types::CompilerConfiguration;
    use crate::language::types::Range;
    use crate::language::utils::extract_resolved_variable_bytecode_map;
    use crate::template::{KeyVariable, WalletTemplateVariable};

    const ALICE_KEY: [u8; 32] = [0x11; 32];
    const BOB_KEY: [u8; 32] = [0x22; 32];

    /// A 2-of-2 lock: Alice and Bob each sign with their own key.
    fn two_of_two_compiler() -> Compiler {
        let key = || WalletTemplateVariable::Key(KeyVariable::default());
        create_compiler_bch(CompilerConfiguration {
            variables: Some(BTreeMap::from([("alice".to_string(), key()), ("bob".to_string(), key())])),
            entity_ownership: Some(BTreeMap::from([
                ("alice".to_string(), "alice_entity".to_string()),
                ("bob".to_string(), "bob_entity".to_string()),
            ])),
            unlocking_scripts: Some(BTreeMap::from([("unlock".to_string(), "lock".to_string())])),
            ..CompilerConfiguration::with_scripts([
                ("lock", "<alice.public_key> OP_CHECKSIGVERIFY <bob.public_key> OP_CHECKSIG"),
                (
                    "unlock",
                    "<bob.schnorr_signature.all_outputs> <alice.schnorr_signature.all_outputs>",
                ),
            ])
        })
    }

    /// Data held by one signer: their private key and the other signer's
    /// public key.
    fn signer_data(own: &str, key: [u8; 32], other: &str, other_key: [u8; 32]) -> CompilationData {
        let other_public_key = NativeSecp256k1.derive_public_key_compressed(&other_key).unwrap();
        CompilationData {
            bytecode: Some(BTreeMap::from([(format!("{}.public_key", other), other_public_key)])),
            ..CompilationData::with_private_keys([(own, key.to_vec())])
        }
    }

    fn spend_template(compiler: &Compiler, data: CompilationData) -> TransactionTemplate<'_> {
        TransactionTemplate {
            inputs: vec![InputTemplate {
                outpoint_index: 0,
                outpoint_transaction_hash: [0xab; 32],
                sequence_number: 0,
                source_output: OutputTemplate {
                    locking_bytecode: BytecodeTemplate::Compiled(CompilationDirective {
                        compiler,
                        script: "lock".to_string(),
                        data: data.clone(),
                    }),
                    token: None,
                    value_satoshis: 10_000,
                },
                unlocking_bytecode: BytecodeTemplate::Compiled(CompilationDirective {
                    compiler,
                    script: "unlock".to_string(),
                    data,
                }),
            }],
            locktime: 0,
            outputs: vec![OutputTemplate {
                locking_bytecode: BytecodeTemplate::Fixed(vec![0x6a]),
                token: None,
                value_satoshis: 9_000,
            }],
            version: 2,
        }
    }

    #[test]
    fn test_fixed_template() {
        let template = TransactionTemplate {
            inputs: vec![InputTemplate {
                outpoint_index: 3,
                outpoint_transaction_hash: [0x01; 32],
                sequence_number: 0xffff_fffe,
                source_output: OutputTemplate {
                    locking_bytecode: BytecodeTemplate::Fixed(vec![0x51]),
                    token: None,
                    value_satoshis: 1_000,
                },
                unlocking_bytecode: BytecodeTemplate::Fixed(vec![0x00]),
            }],
            locktime: 500,
            outputs: vec![OutputTemplate {
                locking_bytecode: BytecodeTemplate::Fixed(vec![0x6a]),
                token: None,
                value_satoshis: 0,
            }],
            version: 2,
        };
        let transaction = generate_transaction(&template).unwrap();
        assert_eq!(transaction.version, 2);
        assert_eq!(transaction.locktime, 500);
        assert_eq!(transaction.inputs[0].outpoint_index, 3);
        assert_eq!(transaction.inputs[0].sequence_number, 0xffff_fffe);
        assert_eq!(transaction.inputs[0].unlocking_bytecode, vec![0x00]);
        assert_eq!(transaction.outputs, vec![Output::new(0, vec![0x6a])]);
    }

    #[test]
    fn test_output_failure_stops_generation() {
        let compiler = create_compiler_bch(CompilerConfiguration::with_scripts([("bad", "no_such_identifier")]));
        let mut template = spend_template(&compiler, CompilationData::default());
        template.outputs.push(OutputTemplate {
            locking_bytecode: BytecodeTemplate::Compiled(CompilationDirective {
                compiler: &compiler,
                script: "bad".to_string(),
                data: CompilationData::default(),
            }),
            token: None,
            value_satoshis: 0,
        });

        let error = generate_transaction(&template).unwrap_err();
        assert_eq!(error.stage, GenerationStage::Outputs);
        assert_eq!(error.errors.len(), 1);
        assert_eq!(error.errors[0].index, 1);
        assert!(error.errors[0].resolved.is_some());
        assert_eq!(
            error.errors[0].errors[0].error,
            "Failed compilation of locking directive at index \"1\": Unknown identifier \"no_such_identifier\"."
        );
        assert!(extract_missing_variables(&error).is_none());

        let mut data = CompilationData::default();
        assert!(!safely_extend_compilation_data(&error, &mut data, &BTreeMap::new()));
        assert_eq!(data, CompilationData::default());
    }

    #[test]
    fn test_two_signers_exchange_missing_signatures() {
        let compiler = two_of_two_compiler();
        let alice_data = signer_data("alice", ALICE_KEY, "bob", BOB_KEY);
        let bob_data = signer_data("bob", BOB_KEY, "alice", ALICE_KEY);

        let alice_error = generate_transaction(&spend_template(&compiler, alice_data.clone())).unwrap_err();
        assert_eq!(alice_error.stage, GenerationStage::Inputs);
        assert!(alice_error.errors[0].errors[0].error.starts_with("Input 0: "));
        assert_eq!(
            extract_missing_variables(&alice_error),
            Some(BTreeMap::from([(
                "bob.schnorr_signature.all_outputs".to_string(),
                Some("bob_entity".to_string())
            )]))
        );

        let bob_error = generate_transaction(&spend_template(&compiler, bob_data)).unwrap_err();
        let bob_resolved = bob_error.errors[0].resolved.as_ref().unwrap();
        let bob_variables = extract_resolved_variable_bytecode_map(bob_resolved);
        assert!(bob_variables.contains_key("bob.schnorr_signature.all_outputs"));

        let mut data = alice_data.clone();
        assert!(safely_extend_compilation_data(&alice_error, &mut data, &bob_variables));
        let transaction = generate_transaction(&spend_template(&compiler, data)).unwrap();
        assert_eq!(transaction.inputs[0].unlocking_bytecode.len(), 132);

        let lock = compiler.generate_bytecode("lock", &alice_data).unwrap();
        let vm = AuthenticationVirtualMachine::bch_2023(true);
        let state = vm.evaluate(AuthenticationProgram::new(
            transaction,
            vec![Output::new(10_000, lock)],
            0,
        ));
        assert!(vm.state_success(&state).is_ok(), "{:?}", state.error);
    }

    #[test]
    fn test_safe_extension_only_adds_missing_values() {
        let missing = |identifier: &str| CompilationError {
            error: format!("{} is missing", identifier),
            range: Range::empty(),
            missing_identifier: Some(identifier.to_string()),
            owning_entity: None,
        };
        let error = TransactionGenerationError {
            stage: GenerationStage::Inputs,
            errors: vec![GenerationError {
                index: 0,
                errors: vec![missing("a"), missing("b")],
                resolved: None,
            }],
        };
        let mut data = CompilationData::with_bytecode([("b", vec![0x02])]);

        let partial = BTreeMap::from([("a".to_string(), vec![0xaa])]);
        assert!(!safely_extend_compilation_data(&error, &mut data, &partial));
        assert_eq!(data, CompilationData::with_bytecode([("b", vec![0x02])]));

        let available = BTreeMap::from([
            ("a".to_string(), vec![0xaa]),
            ("b".to_string(), vec![0xbb]),
            ("c".to_string(), vec![0xcc]),
        ]);
        assert!(safely_extend_compilation_data(&error, &mut data, &available));
        assert_eq!(
            data.bytecode,
            Some(BTreeMap::from([("a".to_string(), vec![0xaa]), ("b".to_string(), vec![0x02])]))
        );
        assert_eq!(
            error.to_string(),
            "Failed to generate transaction inputs: [0, 0] a is missing; [0, 0] b is missing"
        );
    }
}
