use crate::token::TokenPrefixError;

/// Error types for transaction encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    /// The transaction structure is invalid for the requested operation.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),
    /// An error occurred while reading or writing the wire format.
    #[error("serialization error: {0}")]
    SerializationError(String),
    /// An output's token prefix could not be decoded.
    #[error("Error reading token prefix. {0}")]
    TokenPrefix(#[from] TokenPrefixError),
    /// An underlying primitives error (forwarded from `bch-primitives`).
    #[error("primitives error: {0}")]
    Primitives(#[from] bch_primitives::PrimitivesError),
}
