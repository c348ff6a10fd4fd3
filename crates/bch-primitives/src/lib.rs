//! Bitcoin Cash SDK - cryptographic primitives, hashing, and binary encoding.
//!
//! This crate provides the foundational building blocks consumed by the
//! transaction codec, the authentication virtual machine and the compiler:
//! - Hash functions (SHA-1, SHA-256, SHA-256d, SHA-512, RIPEMD-160, Hash160)
//!   and the injectable hash capability traits
//! - The `Secp256k1` capability (ECDSA with DER/low-S rules and BCH Schnorr)
//! - CompactUint encoding with minimal-encoding enforcement
//! - Little-endian readers and writers for the wire format

pub mod hash;
pub mod ec;
pub mod util;

mod error;
pub use error::PrimitivesError;
