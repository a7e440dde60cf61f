//! SPIR-V shader cross-compilation.
//!
//! Re-exports the translator and adds a driver that compiles one module for several targets at
//! once, keeping every target that succeeds.

#![forbid(unsafe_code)]

pub mod driver;

pub use driver::{
    load_targets_json, translate_all, translate_all_parallel, BatchReport, DriverError,
    TargetResult,
};
pub use prism_spirv as spirv;
pub use prism_translate::*;
