//! Bitcoin Cash SDK - transaction model, wire encoding and signing
//! serialization.
//!
//! Provides the [`Transaction`], [`Input`] and [`Output`] types with their
//! binary/hex encodings, the CashTokens token prefix codec, the
//! [`AuthenticationProgram`] evaluation context, and the signing
//! serialization algorithm used by signature-checking operations.

pub mod input;
pub mod output;
pub mod program;
pub mod signing_serialization;
pub mod token;
pub mod transaction;

mod error;
mod serde_hex;

pub use error::TransactionError;
pub use input::Input;
pub use output::Output;
pub use program::AuthenticationProgram;
pub use token::{Nft, NftCapability, Token};
pub use transaction::Transaction;

#[cfg(test)]
mod tests;
