//! SPIR-V to GLSL, HLSL and Metal source translation.
//!
//! A module is decoded once, optionally has its bindings normalized, and is then walked
//! instruction by instruction by the [engine](crate::engine) with one backend's
//! [`InstructionHandler`]. Structured control flow is rebuilt into nested blocks on the way.
//! [`Target::SpirV`] skips all of that and writes the decoded module back out unchanged.

#![forbid(unsafe_code)]

pub mod backend;
pub mod cache;
pub mod context;
mod engine;
pub mod error;
mod flow;
pub mod options;
pub mod reflect;
pub mod source_map;
pub mod symbols;
pub mod types;
pub mod writer;

use std::collections::BTreeMap;

use prism_spirv::Module;
use tracing::debug;

pub use crate::backend::{Dialect, GlslBackend, HlslBackend, InstructionHandler, MetalBackend};
pub use crate::cache::{CacheLookup, CacheLookupSource, TranslationCache};
pub use crate::error::{Diagnostic, DiagnosticKind, TranslateError};
pub use crate::options::{
    GlslOptions, HlslOptions, MetalOptions, RenderContext, ShaderStage, Target, TranslateOptions,
    VertexAttributeLayout, VertexBufferLayout,
};
pub use crate::reflect::{ReflectedVariable, Reflection};
pub use crate::source_map::SourceMap;
pub use prism_spirv::{normalize_bindings, DecodeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Text(String),
    /// Little-endian SPIR-V words.
    Binary(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct Translation {
    pub output: Output,
    pub stage: ShaderStage,
    /// Vertex attribute name to slot: GLSL/Metal attribute locations, HLSL `TEXCOORDn` indices.
    pub attributes: BTreeMap<String, u32>,
    /// Present for text targets when the module carries `OpLine` annotations.
    pub source_map: Option<SourceMap>,
    pub reflection: Reflection,
    pub diagnostics: Vec<Diagnostic>,
}

impl Translation {
    pub fn text(&self) -> Option<&str> {
        match &self.output {
            Output::Text(text) => Some(text),
            Output::Binary(_) => None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.output {
            Output::Text(text) => text.as_bytes(),
            Output::Binary(bytes) => bytes,
        }
    }
}

/// Decodes `bytes` and translates the module for `target`.
pub fn translate(
    bytes: &[u8],
    target: &Target,
    options: TranslateOptions,
) -> Result<Translation, TranslateError> {
    let module = Module::decode(bytes)?;
    translate_module(module, target, options)
}

/// Translates an already decoded module. Binding normalization, when enabled, is applied to
/// this copy only and never for [`Target::SpirV`].
pub fn translate_module(
    mut module: Module,
    target: &Target,
    options: TranslateOptions,
) -> Result<Translation, TranslateError> {
    if options.normalize_bindings && !matches!(target, Target::SpirV) {
        let assignments = normalize_bindings(&mut module);
        debug!(rewritten = assignments.len(), "normalized bindings");
    }
    match target {
        Target::Glsl(glsl) => {
            translate_text(&module, &mut GlslBackend::new(glsl.clone()), target, options)
        }
        Target::Hlsl(hlsl) => {
            translate_text(&module, &mut HlslBackend::new(*hlsl), target, options)
        }
        Target::Metal(metal) => {
            translate_text(&module, &mut MetalBackend::new(metal.clone()), target, options)
        }
        Target::SpirV => {
            let (stage, _) = context::entry_stage(&module, options.stage)?;
            let reflection = Reflection::from_module(&module)?;
            Ok(Translation {
                output: Output::Binary(prism_spirv::write_le_bytes(&module)),
                stage,
                attributes: BTreeMap::new(),
                source_map: None,
                reflection,
                diagnostics: Vec::new(),
            })
        }
    }
}

fn translate_text<H: InstructionHandler>(
    module: &Module,
    handler: &mut H,
    target: &Target,
    options: TranslateOptions,
) -> Result<Translation, TranslateError> {
    let output = engine::run(module, handler, options.stage)?;
    let source_map = (!output.sources.is_empty()).then(|| {
        SourceMap::new(
            format!("shader.{}", target.name()),
            output.sources,
            &output.line_mappings,
        )
    });
    Ok(Translation {
        output: Output::Text(output.text),
        stage: output.stage,
        attributes: output.attributes,
        source_map,
        reflection: Reflection::from_symbols(&output.context.symbols),
        diagnostics: output.diagnostics,
    })
}
