//! Authentication error types.
//!
//! VM failures are values, not Rust errors: an operation that fails returns
//! an [`AuthenticationError`], which the virtual machine records in
//! [`ProgramState::error`](crate::ProgramState). Once set, the error is never
//! replaced.

use std::fmt;

use thiserror::Error;

/// Every failure an instruction set can report while evaluating a program.
///
/// The `Display` implementation is the human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum AuthenticationErrorCode {
    #[error("Program called an unassigned, reserved operation.")]
    CalledReserved,
    #[error("Program called an OP_RETURN operation.")]
    CalledReturn,
    #[error("Program called a disallowed upgradable non-operation (OP_NOP1-OP_NOP10).")]
    CalledUpgradableNop,
    #[error("Program called an OP_CHECKSEQUENCEVERIFY operation, but OP_CHECKSEQUENCEVERIFY requires transaction version 2 or higher.")]
    CheckSequenceUnavailable,
    #[error("Program contains a disabled opcode.")]
    DisabledOpcode,
    #[error("Program attempted to divide a number by zero.")]
    DivisionByZero,
    #[error("Tried to read from an empty alternate stack.")]
    EmptyAlternateStack,
    #[error("Tried to read from an empty stack.")]
    EmptyStack,
    #[error("The provided locking bytecode exceeds the maximum bytecode length (10,000 bytes).")]
    ExceededMaximumBytecodeLengthLocking,
    #[error("The provided unlocking bytecode exceeds the maximum bytecode length (10,000 bytes).")]
    ExceededMaximumBytecodeLengthUnlocking,
    #[error("Program exceeded the maximum operation count (201 operations).")]
    ExceededMaximumOperationCount,
    #[error("Program exceeded the maximum stack depth (1,000 items).")]
    ExceededMaximumStackDepth,
    #[error("Program attempted to push a stack item that exceeded the maximum stack item length.")]
    ExceededMaximumStackItemLength,
    #[error("Program attempted an OP_BIN2NUM operation on a byte sequence that cannot be encoded within the maximum VM number byte length.")]
    ExceededMaximumVmNumberByteLength,
    #[error("Program called an OP_CHECKMULTISIG which exceeds the maximum public key count (20 public keys).")]
    ExceedsMaximumMultisigPublicKeyCount,
    #[error("Push exceeds the push size limit of 520 bytes.")]
    ExceedsMaximumPush,
    #[error("Program attempted a hashing operation that would exceed the hashing limit.")]
    ExcessiveHashing,
    #[error("Program attempted an OP_UNTIL operation that would exceed the limit of repeated bytes.")]
    ExcessiveLooping,
    #[error("Program failed an OP_VERIFY operation.")]
    FailedVerify,
    #[error("Program called an OP_CHECKLOCKTIMEVERIFY operation with an incompatible locktime type. The transaction locktime and required locktime must both refer to either a block height or a block time.")]
    IncompatibleLocktimeType,
    #[error("Program called an OP_CHECKSEQUENCEVERIFY operation with an incompatible sequence type flag. The input sequence number and required sequence number must both use the same sequence locktime type.")]
    IncompatibleSequenceType,
    #[error("Program called an OP_NUM2BIN operation with an insufficient byte length to re-encode the provided number.")]
    InsufficientLength,
    #[error("Program called an OP_CHECKMULTISIG operation which requires signatures from more public keys than are provided.")]
    InsufficientPublicKeys,
    #[error("Program called an OP_CHECKMULTISIG operation with an invalid Schnorr signature bitfield.")]
    InvalidMultisigBitfield,
    #[error("Invalid input: the key/signature count inputs for OP_CHECKMULTISIG require a natural number (n > 0).")]
    InvalidNaturalNumber,
    #[error("The OP_CHECKMULTISIG protocol bug value must be a Script Number 0 (to comply with the \"NULLDUMMY\" rule).")]
    InvalidProtocolBugValue,
    #[error("Encountered an improperly encoded public key.")]
    InvalidPublicKeyEncoding,
    #[error("Encountered an improperly encoded signature.")]
    InvalidSignatureEncoding,
    #[error("Invalid input: the index provided to OP_SPLIT must be a non-negative number less than or equal to the length of the provided stack item.")]
    InvalidSplitIndex,
    #[error("Tried to read from an invalid stack index.")]
    InvalidStackIndex,
    #[error("Invalid input: the index provided must be a valid transaction input index.")]
    InvalidTransactionInputIndex,
    #[error("Invalid input: the index provided must be a valid transaction output index.")]
    InvalidTransactionOutputIndex,
    #[error("Invalid input: the index provided must be a valid transaction UTXO index.")]
    InvalidTransactionUtxoIndex,
    #[error("Invalid input: this operation requires a valid VM Number.")]
    InvalidVmNumber,
    #[error("Program called an OP_CHECKLOCKTIMEVERIFY operation, but locktime is disabled for this transaction.")]
    LocktimeDisabled,
    #[error("The provided locking bytecode is malformed.")]
    MalformedLockingBytecode,
    #[error("The P2SH redeem bytecode is malformed.")]
    MalformedP2shBytecode,
    #[error("The provided unlocking bytecode is malformed.")]
    MalformedUnlockingBytecode,
    #[error("Program attempted a bitwise operation on operands of different lengths.")]
    MismatchedBitwiseOperandLength,
    #[error("Program called an OP_CHECKLOCKTIMEVERIFY or OP_CHECKSEQUENCEVERIFY operation with a negative locktime.")]
    NegativeLocktime,
    #[error("Program completed with a non-empty control stack (missing `OP_ENDIF`).")]
    NonEmptyControlStack,
    #[error("The unlocking bytecode completed with a non-empty control stack (missing `OP_ENDIF`).")]
    NonEmptyControlStackUnlockingBytecode,
    #[error("The locking bytecode completed with a non-empty control stack (missing `OP_ENDIF`).")]
    NonEmptyControlStackLockingBytecode,
    #[error("The P2SH redeem bytecode completed with a non-empty control stack (missing `OP_ENDIF`).")]
    NonEmptyControlStackRedeemBytecode,
    #[error("Push operations must use the smallest possible encoding.")]
    NonMinimalPush,
    #[error("Program failed a signature verification with a non-null signature (violating the \"NULLFAIL\" rule).")]
    NonNullSignatureFailure,
    #[error("Program attempted an operation resulting in a number which overflows the VM number range.")]
    OverflowsVmNumberRange,
    #[error("Program completed with an unexpected number of items on the stack (must be exactly 1).")]
    RequiresCleanStack,
    #[error("The locking bytecode completed with an unexpected number of items on the stack (must be exactly 1).")]
    RequiresCleanStackLockingBytecode,
    #[error("The P2SH redeem bytecode completed with an unexpected number of items on the stack (must be exactly 1).")]
    RequiresCleanStackRedeemBytecode,
    #[error("Unlocking bytecode may contain only push operations.")]
    RequiresPushOnly,
    #[error("Program used a schnorr-sized signature (65 bytes) in an OP_CHECKMULTISIG operation.")]
    SchnorrSizedSignatureInCheckMultiSig,
    #[error("Encountered an OP_ELSE outside of an OP_IF ... OP_ENDIF block.")]
    UnexpectedElse,
    #[error("Encountered an OP_ENDIF which is not following a matching OP_IF.")]
    UnexpectedEndIf,
    #[error("Encountered an OP_UNTIL that is not following a matching OP_BEGIN.")]
    UnexpectedUntil,
    #[error("Encountered an OP_UNTIL before the previous OP_IF was closed by an OP_ENDIF.")]
    UnexpectedUntilMissingEndIf,
    #[error("Called an unknown opcode.")]
    UnknownOpcode,
    #[error("The P2SH locking bytecode did not match the provided redeem bytecode.")]
    UnmatchedP2shRedeemBytecode,
    #[error("Program called an OP_CHECKSEQUENCEVERIFY operation requiring the disable flag, but the input's sequence number is missing the disable flag.")]
    UnmatchedSequenceDisable,
    #[error("Program called an OP_CHECKLOCKTIMEVERIFY operation which requires a locktime greater than the transaction's locktime.")]
    UnsatisfiedLocktime,
    #[error("Program called an OP_CHECKSEQUENCEVERIFY operation which requires a sequence number greater than the input's sequence number.")]
    UnsatisfiedSequenceNumber,
    #[error("Unsuccessful evaluation: completed with a non-truthy value on top of the stack.")]
    UnsuccessfulEvaluation,
}

/// An error code with optional details describing the specific failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationError {
    pub code: AuthenticationErrorCode,
    pub details: Option<String>,
}

impl AuthenticationError {
    pub fn new(code: AuthenticationErrorCode) -> Self {
        AuthenticationError { code, details: None }
    }

    pub fn with_details(code: AuthenticationErrorCode, details: impl Into<String>) -> Self {
        AuthenticationError {
            code,
            details: Some(details.into()),
        }
    }
}

impl From<AuthenticationErrorCode> for AuthenticationError {
    fn from(code: AuthenticationErrorCode) -> Self {
        AuthenticationError::new(code)
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{} {}", self.code, details),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for AuthenticationError {}
