//! SPIR-V module decoding, re-serialization, and binding normalization.
//!
//! The decoder does no semantic interpretation: it splits a little-endian word stream into a
//! header and a flat list of instruction records, extracting the inline strings carried by
//! debug/entry-point instructions. Everything that needs to know what an instruction *means*
//! lives in `prism-translate`.

#![forbid(unsafe_code)]

mod decode;
mod error;
mod normalize;
mod writer;

/// Helpers for building synthetic SPIR-V modules in tests.
///
/// Only available when compiling this crate's own tests, or when the `test-utils` feature is
/// enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::decode::{
    decode_u32_words, decode_u8_le_bytes, Header, Instruction, InstructionLocation, Module,
    Opcode, HEADER_WORDS,
};
pub use crate::error::DecodeError;
pub use crate::normalize::{normalize_bindings, BindingAssignment};
pub use crate::writer::{encode_words, write_le_bytes};

/// Re-exported so downstream crates name opcodes and enumerants through one path.
pub use spirv;
