//! Data types shared by the parse, resolve and reduce stages.

use std::fmt;

use bch_vm::ProgramState;

// -----------------------------------------------------------------------
// Source positions
// -----------------------------------------------------------------------

/// A position in CashAssembly source text.
///
/// `line` and `column` are 1-based; `column` counts characters. `offset` is
/// the byte offset into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

/// A span of source text, in 1-based lines and columns.
///
/// The all-zero range is used for errors not attributable to any source
/// text, such as a missing script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Range {
    pub start_line_number: usize,
    pub start_column: usize,
    pub end_line_number: usize,
    pub end_column: usize,
}

impl Range {
    /// The range between two source positions.
    pub fn between(start: SourcePosition, end: SourcePosition) -> Self {
        Range {
            start_line_number: start.line,
            start_column: start.column,
            end_line_number: end.line,
            end_column: end.column,
        }
    }

    /// A zero-width range at `position`.
    pub fn at(position: SourcePosition) -> Self {
        Range::between(position, position)
    }

    /// The all-zero range.
    pub fn empty() -> Self {
        Range::default()
    }
}

// -----------------------------------------------------------------------
// Parse tree
// -----------------------------------------------------------------------

/// A sequence of expressions: the whole script, or the contents of a push
/// or evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSegment {
    pub start: SourcePosition,
    pub end: SourcePosition,
    pub children: Vec<ScriptNode>,
}

impl ScriptSegment {
    pub fn range(&self) -> Range {
        Range::between(self.start, self.end)
    }
}

/// One expression in a [`ScriptSegment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptNode {
    pub start: SourcePosition,
    pub end: SourcePosition,
    pub kind: NodeKind,
}

impl ScriptNode {
    pub fn range(&self) -> Range {
        Range::between(self.start, self.end)
    }
}

/// The expression forms of CashAssembly.
///
/// Literal variants hold the source text of the literal, without its
/// prefix or quotes and with any `_` separators intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Push(ScriptSegment),
    Evaluation(ScriptSegment),
    Comment(String),
    Identifier(String),
    Utf8Literal(String),
    HexLiteral(String),
    BinaryLiteral(String),
    BigIntLiteral(String),
}

/// A failed parse: the furthest position reached and the sorted,
/// de-duplicated descriptions of what could have appeared there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub expected: Vec<String>,
    pub position: SourcePosition,
}

// -----------------------------------------------------------------------
// Resolution
// -----------------------------------------------------------------------

/// Metadata attached to a resolved signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionSignature {
    /// A transaction signature and the signing serialization it covers.
    Serialization(Vec<u8>),
    /// A data signature and the message it signs.
    Data { digest: Vec<u8>, message: Vec<u8> },
}

/// The kinds of literal that resolve directly to bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralType {
    BigInt,
    Binary,
    Hex,
    Utf8,
}

impl fmt::Display for LiteralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LiteralType::BigInt => "BigIntLiteral",
            LiteralType::Binary => "BinaryLiteral",
            LiteralType::Hex => "HexLiteral",
            LiteralType::Utf8 => "UTF8Literal",
        };
        f.write_str(name)
    }
}

/// Where a bytecode segment came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BytecodeSource {
    Literal { literal: String, literal_type: LiteralType },
    Opcode(String),
    Script { script: String, source: ResolvedScript },
    Variable { variable: String, signature: Option<ResolutionSignature> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedKind {
    Push(ResolvedScript),
    Evaluation(ResolvedScript),
    Bytecode { value: Vec<u8>, source: BytecodeSource },
    Comment(String),
    /// An identifier (or literal) that could not be resolved.
    ///
    /// When the failure is recoverable, `missing_identifier` names the
    /// value the caller must supply and `owning_entity` names its owner.
    Error {
        message: String,
        missing_identifier: Option<String>,
        owning_entity: Option<String>,
    },
}

/// One segment of a resolved script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSegment {
    pub range: Range,
    pub kind: ResolvedKind,
}

pub type ResolvedScript = Vec<ResolvedSegment>;

// -----------------------------------------------------------------------
// Errors and results
// -----------------------------------------------------------------------

/// A diagnostic attributed to a range of source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationError {
    pub error: String,
    pub range: Range,
    pub missing_identifier: Option<String>,
    pub owning_entity: Option<String>,
}

impl CompilationError {
    pub fn new(error: impl Into<String>, range: Range) -> Self {
        CompilationError {
            error: error.into(),
            range,
            missing_identifier: None,
            owning_entity: None,
        }
    }

    /// Whether supplying `missing_identifier` could resolve this error.
    pub fn is_recoverable(&self) -> bool {
        self.missing_identifier.is_some()
    }
}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] {}",
            self.range.start_line_number, self.range.start_column, self.error
        )
    }
}

/// The stage at which compilation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompilationErrorType {
    Parse,
    Resolve,
    Reduce,
}

impl fmt::Display for CompilationErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompilationErrorType::Parse => "parse",
            CompilationErrorType::Resolve => "resolve",
            CompilationErrorType::Reduce => "reduce",
        };
        f.write_str(name)
    }
}

/// The transformation applied to a script's compiled bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transformation {
    P2sh20Locking,
    P2sh20Unlocking,
    P2sh32Locking,
    P2sh32Unlocking,
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transformation::P2sh20Locking => "p2sh20-locking",
            Transformation::P2sh20Unlocking => "p2sh20-unlocking",
            Transformation::P2sh32Locking => "p2sh32-locking",
            Transformation::P2sh32Unlocking => "p2sh32-unlocking",
        };
        f.write_str(name)
    }
}

// -----------------------------------------------------------------------
// Reduction traces
// -----------------------------------------------------------------------

/// The reduction of a [`ResolvedScript`].
#[derive(Debug, Clone)]
pub struct ScriptReduction {
    pub bytecode: Vec<u8>,
    pub range: Range,
    pub errors: Vec<CompilationError>,
    pub script: Vec<ReductionNode>,
}

/// The reduction of a single resolved segment.
#[derive(Debug, Clone)]
pub struct ReductionNode {
    pub bytecode: Vec<u8>,
    pub range: Range,
    pub errors: Vec<CompilationError>,
    pub detail: ReductionDetail,
}

#[derive(Debug, Clone)]
pub enum ReductionDetail {
    /// Bytecode, comments and errors.
    Leaf,
    Push(Box<ScriptReduction>),
    /// An evaluation with the reduction of its contents and the VM trace
    /// (empty if the contents failed to reduce).
    Evaluation {
        source: Box<ScriptReduction>,
        trace: Vec<ProgramState>,
    },
}

// -----------------------------------------------------------------------
// Compilation results
// -----------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CompilationSuccess {
    pub bytecode: Vec<u8>,
    pub parse: ScriptSegment,
    pub resolve: ResolvedScript,
    pub reduce: ScriptReduction,
    pub transformed: Option<Transformation>,
}

/// A failed compilation. The intermediate results are present for the
/// stages that completed.
#[derive(Debug, Clone)]
pub struct CompilationFailure {
    pub error_type: CompilationErrorType,
    pub errors: Vec<CompilationError>,
    pub parse: Option<ScriptSegment>,
    pub resolve: Option<ResolvedScript>,
    pub reduce: Option<ScriptReduction>,
}

impl CompilationFailure {
    /// A parse-stage failure with a single error and no intermediate
    /// results.
    pub fn parse(error: impl Into<String>, range: Range) -> Self {
        CompilationFailure {
            error_type: CompilationErrorType::Parse,
            errors: vec![CompilationError::new(error, range)],
            parse: None,
            resolve: None,
            reduce: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CompilationResult {
    Success(Box<CompilationSuccess>),
    Error(Box<CompilationFailure>),
}

impl CompilationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CompilationResult::Success(_))
    }

    /// The compiled bytecode, if compilation succeeded.
    pub fn bytecode(&self) -> Option<&[u8]> {
        match self {
            CompilationResult::Success(success) => Some(&success.bytecode),
            CompilationResult::Error(_) => None,
        }
    }

    /// The errors of a failed compilation (empty on success).
    pub fn errors(&self) -> &[CompilationError] {
        match self {
            CompilationResult::Success(_) => &[],
            CompilationResult::Error(failure) => &failure.errors,
        }
    }

    pub fn error_type(&self) -> Option<CompilationErrorType> {
        match self {
            CompilationResult::Success(_) => None,
            CompilationResult::Error(failure) => Some(failure.error_type),
        }
    }
}

impl From<CompilationFailure> for CompilationResult {
    fn from(failure: CompilationFailure) -> Self {
        CompilationResult::Error(Box::new(failure))
    }
}

impl From<CompilationSuccess> for CompilationResult {
    fn from(success: CompilationSuccess) -> Self {
        CompilationResult::Success(Box::new(success))
    }
}

/// The outcome of [`Compiler::generate_bytecode`](crate::Compiler):
/// bytecode, or the failing stage and its errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeGenerationError {
    pub error_type: CompilationErrorType,
    pub errors: Vec<CompilationError>,
}

impl fmt::Display for BytecodeGenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CashAssembly compilation {} error:", self.error_type)?;
        for error in &self.errors {
            write!(f, " {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for BytecodeGenerationError {}
