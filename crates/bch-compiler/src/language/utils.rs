//! Helpers for inspecting compilation results and debug traces.

use std::collections::BTreeMap;

use bch_vm::instruction::encode_malformed_instruction;
use bch_vm::opcodes::opcode_name_chips;
use bch_vm::{decode_authentication_instructions, decode_vm_number, ControlItem, Instruction, ProgramState};

use crate::language::types::{
    BytecodeSource, CompilationError, Range, ReductionDetail, ReductionNode, ResolvedKind, ResolvedScript,
};

fn start_before(a: &Range, b: &Range) -> bool {
    (a.start_line_number, a.start_column) < (b.start_line_number, b.start_column)
}

fn end_after(a: &Range, b: &Range) -> bool {
    (a.end_line_number, a.end_column) > (b.end_line_number, b.end_column)
}

/// Combine `ranges` into the smallest range containing all of them.
///
/// # Arguments
/// * `ranges` - The ranges to merge.
/// * `parent` - The range to return if `ranges` is empty.
pub fn merge_ranges(ranges: &[Range], parent: Range) -> Range {
    let Some((first, rest)) = ranges.split_first() else {
        return parent;
    };
    rest.iter().fold(*first, |mut merged, range| {
        if start_before(range, &merged) {
            merged.start_line_number = range.start_line_number;
            merged.start_column = range.start_column;
        }
        if end_after(range, &merged) {
            merged.end_line_number = range.end_line_number;
            merged.end_column = range.end_column;
        }
        merged
    })
}

/// Whether `outer` fully contains `inner`. With `exclusive`, the ranges may
/// not share a start or end position.
pub fn contains_range(outer: &Range, inner: &Range, exclusive: bool) -> bool {
    let outer_start = (outer.start_line_number, outer.start_column);
    let inner_start = (inner.start_line_number, inner.start_column);
    let outer_end = (outer.end_line_number, outer.end_column);
    let inner_end = (inner.end_line_number, inner.end_column);
    if exclusive {
        outer_start < inner_start && outer_end > inner_end
    } else {
        outer_start <= inner_start && outer_end >= inner_end
    }
}

/// Every error segment in a resolved script, including those nested in
/// pushes and evaluations, in source order.
pub fn get_resolution_errors(resolved: &ResolvedScript) -> Vec<CompilationError> {
    let mut errors = Vec::new();
    collect_resolution_errors(resolved, &mut errors);
    errors
}

fn collect_resolution_errors(resolved: &ResolvedScript, errors: &mut Vec<CompilationError>) {
    for segment in resolved {
        match &segment.kind {
            ResolvedKind::Error {
                message,
                missing_identifier,
                owning_entity,
            } => errors.push(CompilationError {
                error: message.clone(),
                range: segment.range,
                missing_identifier: missing_identifier.clone(),
                owning_entity: owning_entity.clone(),
            }),
            ResolvedKind::Push(inner) | ResolvedKind::Evaluation(inner) => collect_resolution_errors(inner, errors),
            ResolvedKind::Bytecode { .. } | ResolvedKind::Comment(_) => {}
        }
    }
}

/// Whether every error could be fixed by providing the missing variable it
/// names, rather than by changing the template or the compiler.
pub fn all_errors_are_recoverable(errors: &[CompilationError]) -> bool {
    errors.iter().all(CompilationError::is_recoverable)
}

/// What a [`BytecodeResolution`] was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionType {
    Literal(crate::language::types::LiteralType),
    Opcode,
    Script,
    Variable,
}

/// A single piece of text in a script and the bytecode it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeResolution {
    pub bytecode: Vec<u8>,
    pub resolution_type: ResolutionType,
    pub text: String,
}

/// Every resolution in a resolved script. The resolutions inside a nested
/// script are listed before the script itself.
pub fn extract_bytecode_resolutions(resolved: &ResolvedScript) -> Vec<BytecodeResolution> {
    let mut resolutions = Vec::new();
    collect_bytecode_resolutions(resolved, &mut resolutions);
    resolutions
}

fn collect_bytecode_resolutions(resolved: &ResolvedScript, resolutions: &mut Vec<BytecodeResolution>) {
    for segment in resolved {
        match &segment.kind {
            ResolvedKind::Push(inner) | ResolvedKind::Evaluation(inner) => {
                collect_bytecode_resolutions(inner, resolutions)
            }
            ResolvedKind::Bytecode { value, source } => {
                let (resolution_type, text) = match source {
                    BytecodeSource::Variable { variable, .. } => (ResolutionType::Variable, variable),
                    BytecodeSource::Script { script, source } => {
                        collect_bytecode_resolutions(source, resolutions);
                        (ResolutionType::Script, script)
                    }
                    BytecodeSource::Opcode(opcode) => (ResolutionType::Opcode, opcode),
                    BytecodeSource::Literal { literal, literal_type } => {
                        (ResolutionType::Literal(*literal_type), literal)
                    }
                };
                resolutions.push(BytecodeResolution {
                    bytecode: value.clone(),
                    resolution_type,
                    text: text.clone(),
                });
            }
            ResolvedKind::Comment(_) | ResolvedKind::Error { .. } => {}
        }
    }
}

/// Map each variable identifier used in a resolved script to its bytecode.
pub fn extract_resolved_variable_bytecode_map(resolved: &ResolvedScript) -> BTreeMap<String, Vec<u8>> {
    extract_bytecode_resolutions(resolved)
        .into_iter()
        .filter(|resolution| resolution.resolution_type == ResolutionType::Variable)
        .map(|resolution| (resolution.text, resolution.bytecode))
        .collect()
}

/// Format errors as `[line, column] message`, joined by `separator`.
pub fn stringify_errors(errors: &[CompilationError], separator: &str) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Summarize a stack: every item as hex, followed by its value in
/// parentheses if it is a valid VM number.
pub fn summarize_stack(stack: &[Vec<u8>]) -> Vec<String> {
    stack
        .iter()
        .map(|item| match decode_vm_number(item, 8, true) {
            Ok(number) => format!("0x{}({})", hex::encode(item), number),
            Err(_) => format!("0x{}", hex::encode(item)),
        })
        .collect()
}

/// One step of a [`summarize_debug_trace`] summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugTraceStep {
    pub alternate_stack: Vec<String>,
    pub error: Option<String>,
    /// Whether the instruction was executed (not in an untaken branch).
    pub execute: bool,
    /// `None` for the final evaluation result.
    pub instruction: Option<Instruction>,
    pub ip: usize,
    pub stack: Vec<String>,
}

/// Summarize a debug trace. Each step pairs the instruction at a state
/// with the stacks of the state that follows it.
pub fn summarize_debug_trace(trace: &[ProgramState]) -> Vec<DebugTraceStep> {
    trace
        .windows(2)
        .map(|pair| {
            let (state, next) = (&pair[0], &pair[1]);
            DebugTraceStep {
                alternate_stack: summarize_stack(&next.alternate_stack),
                error: next.error.as_ref().map(ToString::to_string),
                execute: state.control_stack.last() != Some(&ControlItem::Branch(false)),
                instruction: state.instructions.get(state.ip).cloned(),
                ip: state.ip,
                stack: summarize_stack(&next.stack),
            }
        })
        .collect()
}

/// Render a debug trace summary with one step per line.
///
/// # Arguments
/// * `summary` - The output of [`summarize_debug_trace`].
/// * `opcodes` - Opcode names used to label instructions.
/// * `pad_instruction` - The width of the instruction column.
pub fn stringify_debug_trace_summary_with(
    summary: &[DebugTraceStep],
    opcodes: fn(u8) -> &'static str,
    pad_instruction: usize,
) -> String {
    summary
        .iter()
        .map(|step| {
            let label = match &step.instruction {
                None => "=>".to_string(),
                Some(instruction) => format!(
                    "{}. {}{}:",
                    step.ip,
                    if step.execute { "" } else { "(skip)" },
                    opcodes(instruction.opcode)
                ),
            };
            let contents = match &step.error {
                Some(error) => error.clone(),
                None if step.alternate_stack.is_empty() => step.stack.join(" "),
                None => format!("{}| alt: {}", step.stack.join(" "), step.alternate_stack.join(" ")),
            };
            format!("{:<width$} {}", label, contents, width = pad_instruction)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// [`stringify_debug_trace_summary_with`] using the CHIPs opcode names and
/// a 23-character instruction column.
pub fn stringify_debug_trace_summary(summary: &[DebugTraceStep]) -> String {
    stringify_debug_trace_summary_with(summary, opcode_name_chips, 23)
}

/// An instruction inside an [`EvaluationSample`] and the state it produced.
#[derive(Debug, Clone)]
pub struct InternalState {
    pub instruction: Instruction,
    pub state: ProgramState,
}

/// A program state paired with the source range that produced it.
#[derive(Debug, Clone)]
pub struct EvaluationSample {
    /// The range of the evaluation this sample belongs to.
    pub evaluation_range: Range,
    /// The last instruction of the sample, `None` for the initial state of
    /// an evaluation.
    pub instruction: Option<Instruction>,
    /// States produced by earlier instructions in the same range.
    pub internal_states: Vec<InternalState>,
    pub range: Range,
    pub state: ProgramState,
}

/// The result of [`extract_evaluation_samples`].
#[derive(Debug, Clone, Default)]
pub struct SampleExtraction {
    pub samples: Vec<EvaluationSample>,
    /// States left over once every node is matched. A successful
    /// evaluation always leaves at least the final result here; an empty
    /// list means evaluation halted before the last node.
    pub unmatched_states: Vec<ProgramState>,
}

/// Pair the states of a debug trace with the reduced nodes that produced
/// their instructions.
///
/// `trace` must begin with the initial state, hold one state per
/// instruction and end with the evaluation result, as produced by a
/// single bytecode segment of the VM's debug trace. A node may hold part
/// of an instruction (the bytecode of following nodes is appended until
/// it decodes) or several instructions (all but the last become
/// `internal_states`). When a node completes one instruction and starts
/// another, the samples of the two overlap in that node's range.
///
/// # Arguments
/// * `evaluation_range` - The range of the evaluated script.
/// * `nodes` - The reduced nodes of the evaluated script.
/// * `trace` - The debug trace of the evaluation.
pub fn extract_evaluation_samples(
    evaluation_range: Range,
    nodes: &[ReductionNode],
    trace: &[ProgramState],
) -> SampleExtraction {
    let states = match trace {
        [] => return SampleExtraction::default(),
        [_] => trace,
        [rest @ .., _] => rest,
    };
    let mut samples = vec![EvaluationSample {
        evaluation_range,
        instruction: None,
        internal_states: Vec::new(),
        range: Range {
            start_line_number: evaluation_range.start_line_number,
            start_column: evaluation_range.start_column,
            end_line_number: evaluation_range.start_line_number,
            end_column: evaluation_range.start_column,
        },
        state: states[0].clone(),
    }];

    let mut next_state = 1;
    let mut next_node = 0;
    let mut incomplete: Option<(Vec<u8>, Range)> = None;
    while next_state < states.len() && next_node < nodes.len() {
        let node = &nodes[next_node];
        let (bytecode, merged_range) = match &incomplete {
            None => (node.bytecode.clone(), node.range),
            Some((partial, range)) => (
                [partial.as_slice(), node.bytecode.as_slice()].concat(),
                merge_ranges(&[*range, node.range], *range),
            ),
        };
        let decoded = decode_authentication_instructions(&bytecode);

        if decoded.instructions.is_empty() {
            incomplete = decoded
                .malformed
                .as_ref()
                .map(|malformed| (encode_malformed_instruction(malformed), merged_range));
            next_node += 1;
            continue;
        }

        let paired: Vec<(&Instruction, Option<&ProgramState>)> = decoded
            .instructions
            .iter()
            .enumerate()
            .map(|(offset, instruction)| (instruction, states.get(next_state + offset)))
            .collect();
        let closes_open_sample = incomplete.is_some();
        if let (instruction, Some(state)) = paired[0] {
            if closes_open_sample {
                samples.push(EvaluationSample {
                    evaluation_range,
                    instruction: Some(instruction.clone()),
                    internal_states: Vec::new(),
                    range: merged_range,
                    state: state.clone(),
                });
            }
        }

        // The first state always exists, so a missing state is never at 0.
        let closing_index = paired
            .iter()
            .position(|(_, state)| state.is_none())
            .map_or(paired.len() - 1, |missing| missing - 1);
        if !closes_open_sample || closing_index > 0 {
            let first_internal = usize::from(closes_open_sample);
            let internal_states = paired[first_internal..closing_index]
                .iter()
                .filter_map(|(instruction, state)| {
                    state.map(|state| InternalState {
                        instruction: (*instruction).clone(),
                        state: state.clone(),
                    })
                })
                .collect();
            if let (instruction, Some(state)) = paired[closing_index] {
                samples.push(EvaluationSample {
                    evaluation_range,
                    instruction: Some(instruction.clone()),
                    internal_states,
                    range: node.range,
                    state: state.clone(),
                });
            }
        }

        next_state += decoded.instructions.len();
        incomplete = decoded
            .malformed
            .as_ref()
            .map(|malformed| (encode_malformed_instruction(malformed), node.range));
        next_node += 1;
    }

    let halted = next_node < nodes.len();
    let unmatched_states = if halted {
        Vec::new()
    } else {
        trace.get(next_state..).map(<[ProgramState]>::to_vec).unwrap_or_default()
    };
    SampleExtraction {
        samples,
        unmatched_states,
    }
}

/// [`extract_evaluation_samples`], followed by the samples of every
/// evaluation nested in `nodes`.
///
/// Samples are ordered by the end of their range, so the samples of a
/// nested evaluation come before the sample which uses its result. The
/// unmatched states are those of the outer evaluation only.
pub fn extract_evaluation_samples_recursive(
    evaluation_range: Range,
    nodes: &[ReductionNode],
    trace: &[ProgramState],
) -> SampleExtraction {
    let SampleExtraction {
        mut samples,
        unmatched_states,
    } = extract_evaluation_samples(evaluation_range, nodes, trace);
    for node in nodes {
        collect_nested_samples(node, &mut samples);
    }
    samples.sort_by_key(|sample| (sample.range.end_line_number, sample.range.end_column));
    SampleExtraction {
        samples,
        unmatched_states,
    }
}

fn collect_nested_samples(node: &ReductionNode, samples: &mut Vec<EvaluationSample>) {
    match &node.detail {
        ReductionDetail::Leaf => {}
        ReductionDetail::Push(reduction) => {
            for child in &reduction.script {
                collect_nested_samples(child, samples);
            }
        }
        ReductionDetail::Evaluation { source, trace } => {
            // Inside the `$(` and `)` delimiters.
            let evaluation_range = Range {
                start_column: node.range.start_column + 2,
                end_column: node.range.end_column.saturating_sub(1),
                ..node.range
            };
            // The evaluated bytecode is the locking bytecode; the first state
            // is the empty unlocking segment.
            let locking_trace = trace.get(1..).unwrap_or_default();
            samples.extend(extract_evaluation_samples(evaluation_range, &source.script, locking_trace).samples);
            for child in &source.script {
                collect_nested_samples(child, samples);
            }
        }
    }
}

/// The ranges of samples which certainly had no effect on an evaluation:
/// those following a sample which ended in an unexecuted branch, which
/// themselves end unexecuted with no executed internal state. Ranges
/// contained in a later unexecuted range are dropped.
///
/// # Arguments
/// * `samples` - Samples ordered by the end of their range.
/// * `evaluation_begins` - The line and column of the outermost
///   evaluation, where execution is assumed to be enabled.
pub fn extract_unexecuted_ranges(samples: &[EvaluationSample], evaluation_begins: (usize, usize)) -> Vec<Range> {
    let mut preceding_skips = BTreeMap::from([(evaluation_begins, false)]);
    let mut unexecuted = Vec::new();
    for sample in samples {
        let evaluation = (
            sample.evaluation_range.start_line_number,
            sample.evaluation_range.start_column,
        );
        let preceding_skips_here = preceding_skips.get(&evaluation).copied().unwrap_or(false);
        let ends_with_skip = !sample.state.is_executing();
        let nothing_executed =
            ends_with_skip && sample.internal_states.iter().all(|internal| !internal.state.is_executing());
        if preceding_skips_here && nothing_executed {
            preceding_skips.insert(evaluation, true);
            unexecuted.push(sample.range);
        } else {
            preceding_skips.insert(evaluation, ends_with_skip);
        }
    }

    let mut kept: Vec<Range> = Vec::with_capacity(unexecuted.len());
    for range in unexecuted.into_iter().rev() {
        if kept.last().is_some_and(|outer| contains_range(outer, &range, true)) {
            continue;
        }
        kept.push(range);
    }
    kept.reverse();
    kept
}
