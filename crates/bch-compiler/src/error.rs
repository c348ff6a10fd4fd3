/// Error types for the compiler's Rust-level entry points.
///
/// CashAssembly compilation failures are not Rust errors: they are returned
/// as [`CompilationResult::Error`](crate::CompilationResult) values carrying
/// ranged diagnostics. `CompilerError` covers the conversions around the
/// pipeline: loading templates and collapsing a result to bytes.
#[derive(Debug, thiserror::Error)]
pub enum CompilerError {
    /// The wallet template is not valid JSON, or does not match the schema.
    #[error("invalid wallet template: {0}")]
    Json(#[from] serde_json::Error),
    /// A hex-encoded value in a template or compilation data is invalid.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    /// The wallet template is well-formed JSON but cannot be used.
    #[error("unsupported wallet template: {0}")]
    Template(String),
    /// A script failed to compile. The message includes every diagnostic.
    #[error("{0}")]
    Compilation(String),
    /// An underlying transaction error (forwarded from `bch-transaction`).
    #[error("transaction error: {0}")]
    Transaction(#[from] bch_transaction::TransactionError),
}
