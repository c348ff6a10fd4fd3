#![deny(missing_docs)]

//! Bitcoin Cash SDK - authentication virtual machine and CashAssembly
//! compiler.
//!
//! Re-exports all SDK components for convenient single-crate usage.

pub use bch_primitives as primitives;
pub use bch_transaction as transaction;
pub use bch_vm as vm;
pub use bch_compiler as compiler;
