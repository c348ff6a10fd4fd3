//! Reduction: turns a resolved script into bytecode, running evaluations
//! in a virtual machine.

use bch_vm::{encode_data_push, AuthenticationErrorCode, ProgramState};

use crate::compiler::types::{CompilerVirtualMachine, CreateAuthenticationProgram};
use crate::language::types::{
    CompilationError, Range, ReductionDetail, ReductionNode, ResolvedKind, ResolvedScript, ScriptReduction,
};
use crate::language::utils::merge_ranges;

fn node(bytecode: Vec<u8>, range: Range, errors: Vec<CompilationError>, detail: ReductionDetail) -> ReductionNode {
    ReductionNode {
        bytecode,
        range,
        errors,
        detail,
    }
}

/// Check the final state of an evaluation: it must complete without error,
/// with an empty control stack and exactly one item on the stack.
///
/// # Returns
/// The single stack item, or the reduction error message.
fn evaluation_result(trace: &[ProgramState]) -> Result<Vec<u8>, String> {
    let Some(last) = trace.last() else {
        return Err("Internal error: the virtual machine returned an empty debug trace.".to_string());
    };

    if last.error.is_none() && last.ip < last.instructions.len() {
        return Err(format!(
            "Internal error: the virtual machine returned an incomplete debug trace: evaluation stopped at instruction {} of {} without an error.",
            last.ip,
            last.instructions.len()
        ));
    }

    let clean_stack_error = last.error.as_ref().is_some_and(|error| {
        matches!(
            error.code,
            AuthenticationErrorCode::RequiresCleanStack
                | AuthenticationErrorCode::RequiresCleanStackLockingBytecode
                | AuthenticationErrorCode::RequiresCleanStackRedeemBytecode
        )
    });
    let empty_stack = last.stack.is_empty() && (last.error.is_none() || clean_stack_error);
    if let Some(error) = last.error.as_ref().filter(|_| !empty_stack) {
        return Err(format!("Failed to reduce evaluation: {}", error));
    }
    if !last.control_stack.is_empty() {
        return Err(format!(
            "Failed to reduce evaluation: {}",
            AuthenticationErrorCode::NonEmptyControlStack
        ));
    }
    if empty_stack {
        return Err(
            "Failed to reduce evaluation: an evaluation must leave an item on the stack, but this evaluation completed with an empty stack."
                .to_string(),
        );
    }
    if last.stack.len() != 1 {
        return Err(format!(
            "Failed to reduce evaluation: {} This evaluation completed with {} items on the stack.",
            AuthenticationErrorCode::RequiresCleanStack,
            last.stack.len()
        ));
    }
    Ok(last.stack[0].clone())
}

/// Reduce a resolved script to bytecode.
///
/// Bytecode segments are concatenated, pushes wrap their reduced contents
/// in the smallest push instruction, and evaluations run their reduced
/// contents in `vm` and contribute the single resulting stack item.
/// Comments contribute nothing.
///
/// # Arguments
/// * `resolved` - The resolved script.
/// * `vm` - The virtual machine used for evaluations.
/// * `create_authentication_program` - Builds the program an evaluation's
///   bytecode runs in.
///
/// # Returns
/// The reduction. Its `errors` collect every error of the tree; its
/// bytecode is meaningful only if there are none.
pub fn reduce_script(
    resolved: &ResolvedScript,
    vm: Option<&dyn CompilerVirtualMachine>,
    create_authentication_program: Option<&CreateAuthenticationProgram>,
) -> ScriptReduction {
    let script: Vec<ReductionNode> = resolved
        .iter()
        .map(|segment| {
            let range = segment.range;
            match &segment.kind {
                ResolvedKind::Bytecode { value, .. } => node(value.clone(), range, Vec::new(), ReductionDetail::Leaf),
                ResolvedKind::Comment(_) => node(Vec::new(), range, Vec::new(), ReductionDetail::Leaf),
                ResolvedKind::Error { message, .. } => node(
                    Vec::new(),
                    range,
                    vec![CompilationError::new(
                        format!("Tried to reduce a CashAssembly script with resolution errors: {}", message),
                        range,
                    )],
                    ReductionDetail::Leaf,
                ),
                ResolvedKind::Push(inner) => {
                    let reduced = reduce_script(inner, vm, create_authentication_program);
                    node(
                        encode_data_push(&reduced.bytecode),
                        range,
                        reduced.errors.clone(),
                        ReductionDetail::Push(Box::new(reduced)),
                    )
                }
                ResolvedKind::Evaluation(inner) => {
                    reduce_evaluation(inner, range, vm, create_authentication_program)
                }
            }
        })
        .collect();

    let ranges: Vec<Range> = script.iter().map(|node| node.range).collect();
    let parent = resolved.first().map(|segment| segment.range).unwrap_or_else(Range::empty);
    ScriptReduction {
        bytecode: script.iter().flat_map(|node| node.bytecode.iter().copied()).collect(),
        range: merge_ranges(&ranges, parent),
        errors: script.iter().flat_map(|node| node.errors.iter().cloned()).collect(),
        script,
    }
}

fn reduce_evaluation(
    inner: &ResolvedScript,
    range: Range,
    vm: Option<&dyn CompilerVirtualMachine>,
    create_authentication_program: Option<&CreateAuthenticationProgram>,
) -> ReductionNode {
    let (Some(vm), Some(create_authentication_program)) = (vm, create_authentication_program) else {
        let source = reduce_script(inner, None, None);
        return node(
            Vec::new(),
            range,
            vec![CompilationError::new(
                "Both a VM and a createState method are required to reduce evaluations.",
                range,
            )],
            ReductionDetail::Evaluation {
                source: Box::new(source),
                trace: Vec::new(),
            },
        );
    };

    let source = reduce_script(inner, Some(vm), Some(create_authentication_program));
    if !source.errors.is_empty() {
        return node(
            Vec::new(),
            range,
            source.errors.clone(),
            ReductionDetail::Evaluation {
                source: Box::new(source),
                trace: Vec::new(),
            },
        );
    }

    let trace = vm.debug(create_authentication_program(source.bytecode.clone()));
    let (bytecode, errors) = match evaluation_result(&trace) {
        Ok(item) => (item, Vec::new()),
        Err(message) => (Vec::new(), vec![CompilationError::new(message, range)]),
    };
    node(
        bytecode,
        range,
        errors,
        ReductionDetail::Evaluation {
            source: Box::new(source),
            trace,
        },
    )
}
