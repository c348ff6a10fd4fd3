//! The CashAssembly language: parse, resolve and reduce.

pub mod compile;
pub mod parse;
pub mod reduce;
pub mod resolve;
pub mod types;
pub mod utils;
