/// Unified error type for all primitives operations.
///
/// Covers errors from hashing, EC operations and binary decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrimitivesError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid tweak: {0}")]
    InvalidTweak(String),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("Error reading CompactUint: requires at least one byte.")]
    CompactUintNoPrefix,

    #[error("Error reading CompactUint: insufficient bytes. CompactUint prefix {prefix} requires at least {required} bytes. Remaining bytes: {remaining}")]
    CompactUintInsufficientBytes {
        prefix: u8,
        required: usize,
        remaining: usize,
    },

    #[error("Error reading CompactUint: CompactUint is not minimally encoded.")]
    CompactUintNonMinimal,

    #[error("Error decoding CompactUint: unexpected bytes after CompactUint.")]
    CompactUintExcessiveBytes,

    #[error("unexpected end of data")]
    UnexpectedEof,
}

impl From<hex::FromHexError> for PrimitivesError {
    fn from(e: hex::FromHexError) -> Self {
        PrimitivesError::InvalidHex(e.to_string())
    }
}
