//! A crude by-name listing of a module's interface, for build steps that bind attributes and
//! uniforms without parsing the generated source.

use prism_spirv::Module;
use serde::{Deserialize, Serialize};
use spirv::StorageClass;

use crate::error::TranslateError;
use crate::symbols::Symbols;
use crate::types::TypeKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectedVariable {
    pub name: String,
    /// Target-agnostic type description such as `vec4<float>`.
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builtin: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reflection {
    pub inputs: Vec<ReflectedVariable>,
    pub outputs: Vec<ReflectedVariable>,
    /// Uniforms, textures and samplers. Members of uniform blocks are listed individually as
    /// `block.member`.
    pub uniforms: Vec<ReflectedVariable>,
}

impl Reflection {
    pub fn from_module(module: &Module) -> Result<Self, TranslateError> {
        let mut symbols = Symbols::new(module.header().id_bound);
        for inst in module.instructions() {
            symbols.record(inst)?;
        }
        Ok(Self::from_symbols(&symbols))
    }

    pub fn from_symbols(symbols: &Symbols) -> Self {
        let interface = |storage| {
            symbols
                .interface(storage)
                .into_iter()
                .map(|var| ReflectedVariable {
                    name: var.name,
                    ty: symbols.describe(var.ty),
                    location: var.location,
                    binding: None,
                    builtin: var.builtin.map(|builtin| format!("{builtin:?}")),
                })
                .collect::<Vec<_>>()
        };
        let inputs = interface(StorageClass::Input);
        let outputs = interface(StorageClass::Output);

        let mut uniforms = Vec::new();
        for (id, var) in symbols.globals() {
            if !matches!(
                var.storage,
                Some(
                    StorageClass::UniformConstant
                        | StorageClass::Uniform
                        | StorageClass::PushConstant
                        | StorageClass::StorageBuffer
                )
            ) {
                continue;
            }
            let name = symbols.display_name(id);
            if let (true, TypeKind::Struct { members }) =
                (symbols.is_block(var.ty), symbols.type_kind(var.ty))
            {
                for (index, &member) in members.iter().enumerate() {
                    uniforms.push(ReflectedVariable {
                        name: format!("{name}.{}", symbols.member_name(var.ty, index as u32)),
                        ty: symbols.describe(member),
                        location: None,
                        binding: var.binding,
                        builtin: None,
                    });
                }
                continue;
            }
            uniforms.push(ReflectedVariable {
                name,
                ty: symbols.describe(var.ty),
                location: None,
                binding: var.binding,
                builtin: None,
            });
        }

        Self {
            inputs,
            outputs,
            uniforms,
        }
    }
}
