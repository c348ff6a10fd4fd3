//! Compiler configuration, operations and construction.

pub mod bch;
pub(crate) mod helpers;
pub mod operations;
pub mod types;
pub mod utils;
