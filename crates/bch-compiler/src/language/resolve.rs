//! Identifier resolution: replaces every identifier and literal in a parse
//! tree with bytecode, or with an error segment.
//!
//! Identifiers are tried as opcodes, then variables (built-in variables
//! first, then declared ones), then other scripts of the configuration.

use num_bigint::BigInt;

use bch_vm::encode_vm_number;

use crate::compiler::types::{
    CompilationData, CompilerConfiguration, CompilerOperationResult, CompilerOperations, OperationGroup,
};
use crate::language::parse::{describe_expected_input, parse_script};
use crate::language::reduce::reduce_script;
use crate::language::types::{
    BytecodeSource, CompilationErrorType, CompilationFailure, CompilationResult,
    CompilationSuccess, LiteralType, NodeKind, Range, ResolvedKind, ResolvedScript, ResolvedSegment, ScriptSegment,
};
use crate::language::utils::{get_resolution_errors, stringify_errors};
use crate::template::WalletTemplateVariable;

/// The built-in variable holding the current block height.
pub const CURRENT_BLOCK_HEIGHT: &str = "current_block_height";
/// The built-in variable holding the current block time.
pub const CURRENT_BLOCK_TIME: &str = "current_block_time";
/// The built-in variable exposing signing serialization components.
pub const SIGNING_SERIALIZATION: &str = "signing_serialization";

const DEFAULT_OPERATION_EXAMPLE: &str = "operation_identifier";

fn remove_numeric_separators(literal: &str) -> String {
    literal.replace('_', "")
}

/// Decode a string of binary digits, 8 digits per byte. A shorter final
/// group is read as its own value.
fn decode_binary_digits(digits: &str) -> Option<Vec<u8>> {
    digits
        .as_bytes()
        .chunks(8)
        .map(|chunk| {
            let text = std::str::from_utf8(chunk).ok()?;
            u8::from_str_radix(text, 2).ok()
        })
        .collect()
}

fn literal_segment(range: Range, literal: &str, literal_type: LiteralType) -> ResolvedSegment {
    let value = match literal_type {
        LiteralType::BigInt => remove_numeric_separators(literal)
            .parse::<BigInt>()
            .ok()
            .map(|number| encode_vm_number(&number)),
        LiteralType::Binary => decode_binary_digits(&remove_numeric_separators(literal)),
        LiteralType::Hex => hex::decode(remove_numeric_separators(literal)).ok(),
        LiteralType::Utf8 => Some(literal.as_bytes().to_vec()),
    };
    let kind = match value {
        Some(value) => ResolvedKind::Bytecode {
            value,
            source: BytecodeSource::Literal {
                literal: literal.to_string(),
                literal_type,
            },
        },
        None => ResolvedKind::Error {
            message: format!("Invalid {}: \"{}\".", literal_type, literal),
            missing_identifier: None,
            owning_entity: None,
        },
    };
    ResolvedSegment { range, kind }
}

/// Resolve every node of a parse tree segment.
///
/// # Arguments
/// * `segment` - The segment to resolve.
/// * `resolve_identifier` - Resolves a single identifier to a bytecode or
///   error segment kind.
///
/// # Returns
/// The resolved segments. An empty segment resolves to a single empty
/// comment spanning the segment.
pub fn resolve_script_segment(
    segment: &ScriptSegment,
    resolve_identifier: &dyn Fn(&str) -> ResolvedKind,
) -> ResolvedScript {
    let resolved: ResolvedScript = segment
        .children
        .iter()
        .map(|node| {
            let range = node.range();
            match &node.kind {
                NodeKind::Identifier(identifier) => ResolvedSegment {
                    range,
                    kind: resolve_identifier(identifier),
                },
                NodeKind::Push(inner) => ResolvedSegment {
                    range,
                    kind: ResolvedKind::Push(resolve_script_segment(inner, resolve_identifier)),
                },
                NodeKind::Evaluation(inner) => ResolvedSegment {
                    range,
                    kind: ResolvedKind::Evaluation(resolve_script_segment(inner, resolve_identifier)),
                },
                NodeKind::BigIntLiteral(literal) => literal_segment(range, literal, LiteralType::BigInt),
                NodeKind::BinaryLiteral(literal) => literal_segment(range, literal, LiteralType::Binary),
                NodeKind::HexLiteral(literal) => literal_segment(range, literal, LiteralType::Hex),
                NodeKind::Utf8Literal(literal) => literal_segment(range, literal, LiteralType::Utf8),
                NodeKind::Comment(text) => ResolvedSegment {
                    range,
                    kind: ResolvedKind::Comment(text.clone()),
                },
            }
        })
        .collect();

    if resolved.is_empty() {
        vec![ResolvedSegment {
            range: segment.range(),
            kind: ResolvedKind::Comment(String::new()),
        }]
    } else {
        resolved
    }
}

/// Run the operation matching `operation_id` from an operation group.
#[allow(clippy::too_many_arguments)]
fn attempt_compiler_operation(
    identifier: &str,
    data: &CompilationData,
    configuration: &CompilerConfiguration,
    operations: Option<&OperationGroup>,
    operation_id: Option<&str>,
    variable_id: &str,
    variable_type: &str,
    operation_example: &str,
) -> CompilerOperationResult {
    let Some(operations) = operations else {
        return CompilerOperationResult::error(format!(
            "The \"{}\" variable type can not be resolved because the \"{}\" operation has not been included in this compiler's configuration.",
            variable_id, variable_type
        ));
    };
    let operations = match operations {
        OperationGroup::Single(operation) => return operation(identifier, data, configuration),
        OperationGroup::ById(operations) => operations,
    };
    let Some(operation_id) = operation_id else {
        return CompilerOperationResult::error(format!(
            "This \"{}\" variable could not be resolved because this compiler's \"{}\" operations require an operation identifier, e.g. '{}.{}'.",
            variable_id, variable_type, variable_id, operation_example
        ));
    };
    match operations.get(operation_id) {
        Some(operation) => operation(identifier, data, configuration),
        None => CompilerOperationResult::error(format!(
            "The identifier \"{}\" could not be resolved because the \"{}.{}\" operation is not available to this compiler.",
            identifier, variable_id, operation_id
        )),
    }
}

/// Resolve `identifier` as a built-in or declared variable.
///
/// # Returns
/// `CompilerOperationResult::Skip` if `identifier` is not a variable.
pub fn resolve_variable_identifier(
    identifier: &str,
    data: &CompilationData,
    configuration: &CompilerConfiguration,
) -> CompilerOperationResult {
    let mut parts = identifier.split('.');
    let variable_id = parts.next().unwrap_or(identifier);
    let operation_id = parts.next();

    let operations = configuration.operations.as_ref();
    let group = |select: fn(&CompilerOperations) -> Option<&OperationGroup>| operations.and_then(select);

    let (operations, variable_type, example) = match variable_id {
        CURRENT_BLOCK_HEIGHT => (
            group(|ops| ops.current_block_height.as_ref()),
            "currentBlockHeight",
            DEFAULT_OPERATION_EXAMPLE,
        ),
        CURRENT_BLOCK_TIME => (
            group(|ops| ops.current_block_time.as_ref()),
            "currentBlockTime",
            DEFAULT_OPERATION_EXAMPLE,
        ),
        SIGNING_SERIALIZATION => (
            group(|ops| ops.signing_serialization.as_ref()),
            "signingSerialization",
            "version",
        ),
        _ => {
            let Some(variable) = configuration
                .variables
                .as_ref()
                .and_then(|variables| variables.get(variable_id))
            else {
                return CompilerOperationResult::Skip;
            };
            match variable {
                WalletTemplateVariable::AddressData(_) => (
                    group(|ops| ops.address_data.as_ref()),
                    "addressData",
                    DEFAULT_OPERATION_EXAMPLE,
                ),
                WalletTemplateVariable::HdKey(_) => (group(|ops| ops.hd_key.as_ref()), "hdKey", "public_key"),
                WalletTemplateVariable::Key(_) => (group(|ops| ops.key.as_ref()), "key", "public_key"),
                WalletTemplateVariable::WalletData(_) => (
                    group(|ops| ops.wallet_data.as_ref()),
                    "walletData",
                    DEFAULT_OPERATION_EXAMPLE,
                ),
            }
        }
    };

    attempt_compiler_operation(
        identifier,
        data,
        configuration,
        operations,
        operation_id,
        variable_id,
        variable_type,
        example,
    )
}

/// Compile the script `identifier` of the configuration.
///
/// # Returns
/// `None` if no script has that ID, otherwise the successful compilation
/// or a message describing its errors.
pub fn resolve_script_identifier(
    identifier: &str,
    data: &CompilationData,
    configuration: &CompilerConfiguration,
) -> Option<Result<Box<CompilationSuccess>, String>> {
    if !configuration.scripts.contains_key(identifier) {
        return None;
    }
    Some(match compile_script_raw(identifier, data, configuration) {
        CompilationResult::Success(success) => Ok(success),
        CompilationResult::Error(failure) => Err(format!(
            "Compilation error in resolved script \"{}\": {}",
            identifier,
            stringify_errors(&failure.errors, "; ")
        )),
    })
}

/// Resolve a single identifier against the opcodes, variables and scripts
/// of `configuration`.
pub fn resolve_identifier(identifier: &str, data: &CompilationData, configuration: &CompilerConfiguration) -> ResolvedKind {
    if let Some(bytecode) = configuration
        .opcodes
        .as_ref()
        .and_then(|opcodes| opcodes.get(identifier))
    {
        return ResolvedKind::Bytecode {
            value: bytecode.clone(),
            source: BytecodeSource::Opcode(identifier.to_string()),
        };
    }

    match resolve_variable_identifier(identifier, data, configuration) {
        CompilerOperationResult::Skip => {}
        CompilerOperationResult::Success { bytecode, signature } => {
            return ResolvedKind::Bytecode {
                value: bytecode,
                source: BytecodeSource::Variable {
                    variable: identifier.to_string(),
                    signature,
                },
            };
        }
        CompilerOperationResult::Error { error, recoverable } => {
            let (missing_identifier, owning_entity) = if recoverable {
                let variable_id = identifier.split('.').next().unwrap_or(identifier);
                let owner = configuration
                    .entity_ownership
                    .as_ref()
                    .and_then(|ownership| ownership.get(variable_id))
                    .cloned();
                (Some(identifier.to_string()), owner)
            } else {
                (None, None)
            };
            return ResolvedKind::Error {
                message: error,
                missing_identifier,
                owning_entity,
            };
        }
    }

    match resolve_script_identifier(identifier, data, configuration) {
        Some(Ok(success)) => ResolvedKind::Bytecode {
            value: success.bytecode,
            source: BytecodeSource::Script {
                script: identifier.to_string(),
                source: success.resolve,
            },
        },
        Some(Err(message)) => ResolvedKind::Error {
            message,
            missing_identifier: None,
            owning_entity: None,
        },
        None => ResolvedKind::Error {
            message: format!("Unknown identifier \"{}\".", identifier),
            missing_identifier: None,
            owning_entity: None,
        },
    }
}

/// Compile the script `script_id` without applying P2SH transformations or
/// time-lock checks.
///
/// The script is appended to the configuration's `source_script_ids`; a
/// script already in that chain is a circular dependency.
pub fn compile_script_raw(
    script_id: &str,
    data: &CompilationData,
    configuration: &CompilerConfiguration,
) -> CompilationResult {
    let Some(script) = configuration.scripts.get(script_id) else {
        return CompilationFailure::parse(
            format!(
                "No script with an ID of \"{}\" was provided in the compiler configuration.",
                script_id
            ),
            Range::empty(),
        )
        .into();
    };

    let source_script_ids = configuration.source_script_ids.as_deref().unwrap_or(&[]);
    if source_script_ids.iter().any(|id| id == script_id) {
        return CompilationFailure::parse(
            format!(
                "A circular dependency was encountered: script \"{}\" relies on itself to be generated. (Source scripts: {})",
                script_id,
                source_script_ids.join(" → ")
            ),
            Range::empty(),
        )
        .into();
    }

    let mut nested = configuration.clone();
    let mut chain = source_script_ids.to_vec();
    chain.push(script_id.to_string());
    nested.source_script_ids = Some(chain);

    compile_script_contents(script, data, &nested)
}

/// Parse, resolve and reduce CashAssembly source text.
pub fn compile_script_contents(
    script: &str,
    data: &CompilationData,
    configuration: &CompilerConfiguration,
) -> CompilationResult {
    let parse = match parse_script(script) {
        Ok(parse) => parse,
        Err(failure) => {
            return CompilationFailure::parse(
                describe_expected_input(&failure.expected),
                Range::at(failure.position),
            )
            .into();
        }
    };

    let resolver = |identifier: &str| resolve_identifier(identifier, data, configuration);
    let resolve = resolve_script_segment(&parse, &resolver);
    let resolution_errors = get_resolution_errors(&resolve);
    if !resolution_errors.is_empty() {
        return CompilationFailure {
            error_type: CompilationErrorType::Resolve,
            errors: resolution_errors,
            parse: Some(parse),
            resolve: Some(resolve),
            reduce: None,
        }
        .into();
    }

    let reduce = reduce_script(
        &resolve,
        configuration.vm.as_deref(),
        configuration.create_authentication_program.as_ref(),
    );
    if reduce.errors.is_empty() {
        CompilationSuccess {
            bytecode: reduce.bytecode.clone(),
            parse,
            resolve,
            reduce,
            transformed: None,
        }
        .into()
    } else {
        CompilationFailure {
            error_type: CompilationErrorType::Reduce,
            errors: reduce.errors.clone(),
            parse: Some(parse),
            resolve: Some(resolve),
            reduce: Some(reduce),
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_literals(script: &str) -> Vec<Vec<u8>> {
        let parse = parse_script(script).unwrap();
        let unknown = |identifier: &str| ResolvedKind::Error {
            message: format!("Unknown identifier \"{}\".", identifier),
            missing_identifier: None,
            owning_entity: None,
        };
        resolve_script_segment(&parse, &unknown)
            .into_iter()
            .map(|segment| match segment.kind {
                ResolvedKind::Bytecode { value, .. } => value,
                other => panic!("expected bytecode, got {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_resolve_literals() {
        assert_eq!(
            resolve_literals("1_000 -1 0x00_ff 0b1010_1010 'abc' 0b101 0"),
            vec![
                vec![0xe8, 0x03],
                vec![0x81],
                vec![0x00, 0xff],
                vec![0xaa],
                b"abc".to_vec(),
                vec![0x05],
                vec![],
            ]
        );
    }

    #[test]
    fn test_binary_literals_use_eight_digit_groups() {
        assert_eq!(decode_binary_digits("111111110"), Some(vec![0xff, 0x00]));
        assert_eq!(decode_binary_digits("1"), Some(vec![0x01]));
    }

    #[test]
    fn test_empty_segment_resolves_to_comment() {
        let parse = parse_script("  ").unwrap();
        let resolved = resolve_script_segment(&parse, &|_: &str| ResolvedKind::Comment(String::new()));
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].kind, ResolvedKind::Comment(String::new()));
        assert_eq!(resolved[0].range, parse.range());
    }

    #[test]
    fn test_unknown_identifier() {
        let configuration = CompilerConfiguration::default();
        assert_eq!(
            resolve_identifier("OP_1", &CompilationData::default(), &configuration),
            ResolvedKind::Error {
                message: "Unknown identifier \"OP_1\".".into(),
                missing_identifier: None,
                owning_entity: None,
            }
        );
    }

    #[test]
    fn test_missing_operations() {
        let mut configuration = CompilerConfiguration::default();
        let result = resolve_variable_identifier("current_block_height", &CompilationData::default(), &configuration);
        assert_eq!(
            result,
            CompilerOperationResult::error(
                "The \"current_block_height\" variable type can not be resolved because the \"currentBlockHeight\" operation has not been included in this compiler's configuration."
            )
        );

        configuration.operations = Some(CompilerOperations {
            signing_serialization: Some(OperationGroup::ById(Default::default())),
            ..CompilerOperations::default()
        });
        let result = resolve_variable_identifier("signing_serialization", &CompilationData::default(), &configuration);
        assert_eq!(
            result,
            CompilerOperationResult::error(
                "This \"signing_serialization\" variable could not be resolved because this compiler's \"signingSerialization\" operations require an operation identifier, e.g. 'signing_serialization.version'."
            )
        );
        let result = resolve_variable_identifier(
            "signing_serialization.unknown",
            &CompilationData::default(),
            &configuration,
        );
        assert_eq!(
            result,
            CompilerOperationResult::error(
                "The identifier \"signing_serialization.unknown\" could not be resolved because the \"signing_serialization.unknown\" operation is not available to this compiler."
            )
        );
    }

    #[test]
    fn test_circular_dependency() {
        let configuration = CompilerConfiguration::with_scripts([("a", "b"), ("b", "a")]);
        let result = compile_script_raw("a", &CompilationData::default(), &configuration);
        assert_eq!(result.error_type(), Some(CompilationErrorType::Resolve));
        assert_eq!(
            result.errors()[0].error,
            "Compilation error in resolved script \"b\": [1, 1] Compilation error in resolved script \"a\": [0, 0] A circular dependency was encountered: script \"a\" relies on itself to be generated. (Source scripts: a → b)"
        );
    }

    #[test]
    fn test_missing_script() {
        let result = compile_script_raw("missing", &CompilationData::default(), &CompilerConfiguration::default());
        assert_eq!(result.error_type(), Some(CompilationErrorType::Parse));
        assert_eq!(
            result.errors()[0].error,
            "No script with an ID of \"missing\" was provided in the compiler configuration."
        );
        assert_eq!(result.errors()[0].range, Range::empty());
    }
}
