//! Compiler configuration, compilation data and the compiler operation
//! contract.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use bch_primitives::ec::Secp256k1;
use bch_primitives::hash::Sha256;
use bch_transaction::AuthenticationProgram;
use bch_vm::{AuthenticationVirtualMachine, ProgramState};

use crate::language::types::ResolutionSignature;
use crate::template::{LockingType, TimeLockType, WalletTemplateVariable};

// -----------------------------------------------------------------------
// Compiler operations
// -----------------------------------------------------------------------

/// The outcome of a compiler operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerOperationResult {
    Success {
        bytecode: Vec<u8>,
        signature: Option<ResolutionSignature>,
    },
    /// A failure. A `recoverable` error means a specific variable was not
    /// provided: supplying it and compiling again may succeed.
    Error { error: String, recoverable: bool },
    /// The operation does not apply; the next one should be attempted.
    Skip,
}

impl CompilerOperationResult {
    pub fn success(bytecode: Vec<u8>) -> Self {
        CompilerOperationResult::Success {
            bytecode,
            signature: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        CompilerOperationResult::Error {
            error: error.into(),
            recoverable: false,
        }
    }

    pub fn recoverable(error: impl Into<String>) -> Self {
        CompilerOperationResult::Error {
            error: error.into(),
            recoverable: true,
        }
    }
}

/// A compiler operation: given the full identifier (e.g.
/// `owner.schnorr_signature.all_outputs`), the compilation data and the
/// configuration, produce bytecode or an error.
pub type CompilerOperation =
    Arc<dyn Fn(&str, &CompilationData, &CompilerConfiguration) -> CompilerOperationResult + Send + Sync>;

/// The operations available to one variable type: either a single
/// operation, or operations selected by the second identifier segment.
#[derive(Clone)]
pub enum OperationGroup {
    Single(CompilerOperation),
    ById(BTreeMap<String, CompilerOperation>),
}

impl fmt::Debug for OperationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationGroup::Single(_) => f.write_str("Single(..)"),
            OperationGroup::ById(operations) => f.debug_set().entries(operations.keys()).finish(),
        }
    }
}

/// The operation table of a compiler, one entry per variable type and
/// built-in variable.
#[derive(Debug, Clone, Default)]
pub struct CompilerOperations {
    pub address_data: Option<OperationGroup>,
    pub current_block_height: Option<OperationGroup>,
    pub current_block_time: Option<OperationGroup>,
    pub hd_key: Option<OperationGroup>,
    pub key: Option<OperationGroup>,
    pub signing_serialization: Option<OperationGroup>,
    pub wallet_data: Option<OperationGroup>,
}

// -----------------------------------------------------------------------
// Injected capabilities
// -----------------------------------------------------------------------

/// The virtual machine used to reduce evaluations (`$( ... )`).
pub trait CompilerVirtualMachine: Send + Sync {
    /// Evaluate `program`, returning every intermediate state with the
    /// final result last.
    fn debug(&self, program: AuthenticationProgram) -> Vec<ProgramState>;
}

impl CompilerVirtualMachine for AuthenticationVirtualMachine {
    fn debug(&self, program: AuthenticationProgram) -> Vec<ProgramState> {
        AuthenticationVirtualMachine::debug(self, program)
    }
}

/// A failure reported by an [`HdKeyDerivation`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HdKeyDerivationError {
    /// The encoded HD key could not be decoded.
    #[error("{0}")]
    InvalidKey(String),
    /// The path could not be derived from the key.
    #[error("{0}")]
    InvalidPath(String),
}

/// HD key decoding and derivation, required by `HdKey` operations.
pub trait HdKeyDerivation: Send + Sync {
    /// Derive the private key at the absolute `path` (e.g. `m/0'/3`) of an
    /// encoded HD private key.
    fn derive_private_key(&self, hd_private_key: &str, path: &str) -> Result<Vec<u8>, HdKeyDerivationError>;

    /// The depth of an encoded HD public key.
    fn public_key_depth(&self, hd_public_key: &str) -> Result<u8, HdKeyDerivationError>;

    /// Derive the compressed public key at the relative, non-hardened
    /// `path` (e.g. `0/3`) below an encoded HD public key.
    fn derive_public_key(&self, hd_public_key: &str, relative_path: &str) -> Result<Vec<u8>, HdKeyDerivationError>;
}

/// Produces the authentication program in which an evaluation's bytecode
/// is run.
pub type CreateAuthenticationProgram = Arc<dyn Fn(Vec<u8>) -> AuthenticationProgram + Send + Sync>;

// -----------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------

/// Everything a compiler knows about the scripts it compiles.
///
/// Optional properties are checked by the operations needing them; a
/// missing property produces an error naming it.
#[derive(Clone, Default)]
pub struct CompilerConfiguration {
    /// Script ID to CashAssembly source.
    pub scripts: BTreeMap<String, String>,
    /// Opcode name to bytecode.
    pub opcodes: Option<HashMap<String, Vec<u8>>>,
    pub variables: Option<BTreeMap<String, WalletTemplateVariable>>,
    /// Variable ID to the ID of the entity owning it.
    pub entity_ownership: Option<BTreeMap<String, String>>,
    /// Unlocking script ID to the ID of the locking script it unlocks.
    pub unlocking_scripts: Option<BTreeMap<String, String>>,
    pub locking_script_types: Option<BTreeMap<String, LockingType>>,
    pub unlocking_script_time_lock_types: Option<BTreeMap<String, TimeLockType>>,
    pub scenarios: Option<BTreeMap<String, serde_json::Value>>,
    /// The chain of scripts being compiled, outermost first. Set by the
    /// compiler while resolving nested scripts.
    pub source_script_ids: Option<Vec<String>>,
    pub operations: Option<CompilerOperations>,
    pub sha256: Option<Arc<dyn Sha256>>,
    pub secp256k1: Option<Arc<dyn Secp256k1>>,
    pub hd_key_derivation: Option<Arc<dyn HdKeyDerivation>>,
    pub vm: Option<Arc<dyn CompilerVirtualMachine>>,
    pub create_authentication_program: Option<CreateAuthenticationProgram>,
}

impl CompilerConfiguration {
    /// A configuration holding only `scripts`.
    pub fn with_scripts<I, K, V>(scripts: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        CompilerConfiguration {
            scripts: scripts
                .into_iter()
                .map(|(id, script)| (id.into(), script.into()))
                .collect(),
            ..CompilerConfiguration::default()
        }
    }
}

impl fmt::Debug for CompilerConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerConfiguration")
            .field("scripts", &self.scripts)
            .field("opcodes", &self.opcodes.as_ref().map(HashMap::len))
            .field("variables", &self.variables)
            .field("entity_ownership", &self.entity_ownership)
            .field("unlocking_scripts", &self.unlocking_scripts)
            .field("locking_script_types", &self.locking_script_types)
            .field("unlocking_script_time_lock_types", &self.unlocking_script_time_lock_types)
            .field("source_script_ids", &self.source_script_ids)
            .field("operations", &self.operations)
            .field("sha256", &self.sha256.is_some())
            .field("secp256k1", &self.secp256k1.is_some())
            .field("hd_key_derivation", &self.hd_key_derivation.is_some())
            .field("vm", &self.vm.is_some())
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------
// Compilation data
// -----------------------------------------------------------------------

/// Private keys for `Key` variables, by variable ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keys {
    pub private_keys: Option<BTreeMap<String, Vec<u8>>>,
}

/// Encoded HD keys for `HdKey` variables, by entity ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HdKeys {
    /// The address index; added to each variable's address offset to
    /// replace `i` in derivation paths.
    pub address_index: Option<u32>,
    pub hd_private_keys: Option<BTreeMap<String, String>>,
    pub hd_public_keys: Option<BTreeMap<String, String>>,
}

/// The values used to resolve variables during one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationData {
    /// Pre-computed bytecode by full identifier: `AddressData` and
    /// `WalletData` values, or existing public keys and signatures.
    pub bytecode: Option<BTreeMap<String, Vec<u8>>>,
    pub current_block_height: Option<u32>,
    pub current_block_time: Option<u32>,
    pub hd_keys: Option<HdKeys>,
    pub keys: Option<Keys>,
    /// The transaction context of the input being compiled, required by
    /// signatures and `signing_serialization` components.
    pub compilation_context: Option<AuthenticationProgram>,
}

impl CompilationData {
    /// Data holding only pre-computed bytecode.
    pub fn with_bytecode<I, K>(bytecode: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<u8>)>,
        K: Into<String>,
    {
        CompilationData {
            bytecode: Some(bytecode.into_iter().map(|(id, value)| (id.into(), value)).collect()),
            ..CompilationData::default()
        }
    }

    /// Data holding only private keys.
    pub fn with_private_keys<I, K>(private_keys: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<u8>)>,
        K: Into<String>,
    {
        CompilationData {
            keys: Some(Keys {
                private_keys: Some(private_keys.into_iter().map(|(id, key)| (id.into(), key)).collect()),
            }),
            ..CompilationData::default()
        }
    }
}
