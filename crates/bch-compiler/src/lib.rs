//! Bitcoin Cash SDK - CashAssembly compiler.
//!
//! Compiles CashAssembly scripts to bytecode in three stages:
//! - parse: source text to a parse tree ([`parse_script`])
//! - resolve: identifiers to bytecode via opcodes, variables and other
//!   scripts ([`resolve_script_segment`])
//! - reduce: resolved segments to bytecode, running evaluations in a
//!   virtual machine ([`reduce_script`])
//!
//! Variables are resolved by the [`CompilerOperations`] of the
//! [`CompilerConfiguration`]. Most users start from
//! [`create_compiler_bch`] or [`wallet_template_to_compiler_bch`].
//!
//! Compilation failures are values: [`CompilationResult::Error`] carries
//! every error with its source range. [`generate_transaction`] builds whole
//! transactions from compiled inputs and outputs.

pub mod compiler;
pub mod error;
pub mod language;
pub mod template;
pub mod transaction;

pub use compiler::bch::{
    compiler_configuration_bch, create_compiler_bch, operations_bch, signing_serialization_type,
    wallet_template_to_compiler_bch, SIGNING_SERIALIZATION_ALGORITHMS,
};
pub use compiler::operations::operations_common;
pub use compiler::types::{
    CompilationData, CompilerConfiguration, CompilerOperation, CompilerOperationResult, CompilerOperations,
    CompilerVirtualMachine, CreateAuthenticationProgram, HdKeyDerivation, HdKeyDerivationError, HdKeys, Keys,
    OperationGroup,
};
pub use compiler::utils::{
    assemble_bytecode, assemble_bytecode_bch, cash_assembly_to_bin, compile_cash_assembly,
    compiler_configuration_common, create_authentication_program_evaluation_common, create_compiler_common,
    wallet_template_to_compiler_configuration, Compiler,
};
pub use error::CompilerError;
pub use language::compile::{compile_script, compile_script_p2sh_locking, compile_script_p2sh_unlocking};
pub use language::parse::{describe_expected_input, parse_script};
pub use language::reduce::reduce_script;
pub use language::resolve::{compile_script_contents, compile_script_raw, resolve_script_segment};
pub use language::types::{
    BytecodeGenerationError, BytecodeSource, CompilationError, CompilationErrorType, CompilationFailure,
    CompilationResult, CompilationSuccess, Range, ResolutionSignature, ResolvedKind, ResolvedScript,
    ResolvedSegment, ScriptReduction, ScriptSegment, Transformation,
};
pub use language::utils::{
    all_errors_are_recoverable, contains_range, extract_bytecode_resolutions, extract_evaluation_samples,
    extract_evaluation_samples_recursive, extract_resolved_variable_bytecode_map, extract_unexecuted_ranges,
    merge_ranges, stringify_debug_trace_summary, stringify_errors, summarize_debug_trace, summarize_stack,
    EvaluationSample, InternalState, SampleExtraction,
};
pub use transaction::{
    compile_input_template, compile_output_template, extract_missing_variables, generate_transaction,
    safely_extend_compilation_data, BytecodeTemplate, CompilationDirective, GenerationError, GenerationStage,
    InputTemplate, OutputTemplate, TransactionGenerationError, TransactionTemplate,
};
pub use template::{
    LockingType, TimeLockType, WalletTemplate, WalletTemplateEntity, WalletTemplateScript, WalletTemplateVariable,
};
