//! Direct3D shading language.
//!
//! Stage inputs and outputs become `static` globals prefixed per stage (`v_`, `f_`, ...). The
//! entry function is emitted as `vert_main`/`frag_main`/...; a generated `main` copies the
//! semantic-tagged `Input*` struct into those statics, calls it, and packs the statics back
//! into the `Output*` struct.

use std::collections::BTreeMap;

use prism_spirv::{Instruction, Opcode};
use spirv::{BuiltIn, Dim, ExecutionMode, GLOp, Op, StorageClass};
use tracing::warn;

use super::c_style;
use super::{gl_builtin_name, glsl_std450_name, Dialect, InstructionHandler, Product, TextureSample};
use crate::context::TranslationContext;
use crate::error::TranslateError;
use crate::options::{HlslOptions, ShaderStage};
use crate::symbols::{InterfaceVariable, Symbols};
use crate::types::{Id, ImageFlags, Scalar, TypeKind};

const RESERVED: &[&str] = &[
    "main",
    "input",
    "output",
    "sample",
    "texture",
    "sampler",
    "point",
    "line",
    "triangle",
    "linear",
    "centroid",
    "register",
    "packoffset",
    "half",
    "string",
    "vector",
    "matrix",
];

#[derive(Debug, Clone, Copy)]
pub struct HlslBackend {
    options: HlslOptions,
    stage: ShaderStage,
}

/// One semantic-tagged member of the generated `Input*`/`Output*` struct.
#[derive(Debug, Clone)]
struct Field {
    name: String,
    ty: Id,
    semantic: String,
    /// Static global the field is copied from or into.
    global: String,
    /// Vertex `float4x4` attributes travel as four `float4` rows.
    split_rows: bool,
}

impl HlslBackend {
    pub fn new(options: HlslOptions) -> Self {
        Self {
            options,
            stage: ShaderStage::Vertex,
        }
    }

    fn prefix(&self) -> &'static str {
        match self.stage {
            ShaderStage::Vertex => "v_",
            ShaderStage::Fragment => "f_",
            ShaderStage::TessControl => "tc_",
            ShaderStage::TessEvaluation => "te_",
            ShaderStage::Geometry => "g_",
            ShaderStage::Compute => "c_",
        }
    }

    fn struct_suffix(&self) -> &'static str {
        match self.stage {
            ShaderStage::Vertex => "Vert",
            ShaderStage::Fragment => "Frag",
            ShaderStage::TessControl => "TessC",
            ShaderStage::TessEvaluation => "TessE",
            ShaderStage::Geometry => "Geom",
            ShaderStage::Compute => "Comp",
        }
    }

    fn position_semantic(&self) -> &'static str {
        if self.options.is_sm3() {
            "POSITION"
        } else {
            "SV_POSITION"
        }
    }

    fn writes_position(&self) -> bool {
        matches!(
            self.stage,
            ShaderStage::Vertex | ShaderStage::TessEvaluation | ShaderStage::Geometry
        )
    }

    fn input_semantic(&self, builtin: BuiltIn) -> Option<&'static str> {
        let sm3 = self.options.is_sm3();
        Some(match builtin {
            BuiltIn::VertexId | BuiltIn::VertexIndex if !sm3 => "SV_VertexID",
            BuiltIn::InstanceId | BuiltIn::InstanceIndex if !sm3 => "SV_InstanceID",
            BuiltIn::FrontFacing if sm3 => "VFACE",
            BuiltIn::FrontFacing => "SV_IsFrontFace",
            BuiltIn::PrimitiveId if !sm3 => "SV_PrimitiveID",
            BuiltIn::GlobalInvocationId => "SV_DispatchThreadID",
            BuiltIn::LocalInvocationId => "SV_GroupThreadID",
            BuiltIn::WorkgroupId => "SV_GroupID",
            BuiltIn::LocalInvocationIndex => "SV_GroupIndex",
            _ => return None,
        })
    }

    fn output_semantic(&self, builtin: BuiltIn) -> Option<&'static str> {
        let sm3 = self.options.is_sm3();
        Some(match builtin {
            BuiltIn::FragDepth if sm3 => "DEPTH",
            BuiltIn::FragDepth => "SV_Depth",
            BuiltIn::PointSize => "PSIZE",
            BuiltIn::SampleMask if !sm3 => "SV_Coverage",
            _ => return None,
        })
    }

    fn is_matrix4(&self, symbols: &Symbols, ty: Id) -> bool {
        matches!(symbols.type_kind(ty), TypeKind::Matrix { columns: 4, .. })
            && symbols.matrix_rows(ty) == 4
    }

    fn input_fields(
        &self,
        ctx: &mut TranslationContext,
        inputs: &[InterfaceVariable],
    ) -> Result<Vec<Field>, TranslateError> {
        let mut fields = Vec::new();
        if self.stage == ShaderStage::Fragment {
            fields.push(Field {
                name: "gl_Position".to_owned(),
                ty: 0,
                semantic: self.position_semantic().to_owned(),
                global: String::new(),
                split_rows: false,
            });
        }
        let mut slot = 0;
        for input in inputs {
            let Some(builtin) = input.builtin else {
                let split_rows =
                    self.stage == ShaderStage::Vertex && self.is_matrix4(&ctx.symbols, input.ty);
                if self.stage == ShaderStage::Vertex {
                    if split_rows {
                        for row in 0..4 {
                            ctx.attributes
                                .insert(format!("{}_{row}", input.name), slot + row);
                        }
                    } else {
                        ctx.attributes.insert(input.name.clone(), slot);
                    }
                }
                fields.push(Field {
                    name: input.name.clone(),
                    ty: input.ty,
                    semantic: format!("TEXCOORD{slot}"),
                    global: format!("{}{}", self.prefix(), input.name),
                    split_rows,
                });
                slot += if split_rows { 4 } else { 1 };
                continue;
            };
            if builtin == BuiltIn::FragCoord && self.stage == ShaderStage::Fragment {
                // Read from the position field every fragment input struct carries.
                if let Some(position) = fields.first_mut() {
                    position.global = self.builtin_name(builtin, StorageClass::Input);
                }
                continue;
            }
            let semantic = self.input_semantic(builtin).ok_or_else(|| {
                TranslateError::BackendLimitation {
                    backend: self.backend_name(),
                    id: input.id,
                    opcode: Opcode::Known(Op::Variable),
                    reason: format!("no input semantic for builtin {builtin:?}"),
                }
            })?;
            fields.push(Field {
                name: gl_builtin_name(builtin),
                ty: input.ty,
                semantic: semantic.to_owned(),
                global: self.builtin_name(builtin, StorageClass::Input),
                split_rows: false,
            });
        }
        Ok(fields)
    }

    fn output_fields(&self, outputs: &[InterfaceVariable]) -> Vec<Field> {
        let mut fields = Vec::new();
        if self.writes_position() {
            fields.push(Field {
                name: "gl_Position".to_owned(),
                ty: 0,
                semantic: self.position_semantic().to_owned(),
                global: self.builtin_name(BuiltIn::Position, StorageClass::Output),
                split_rows: false,
            });
        }
        let mut slot = 0;
        for output in outputs {
            match output.builtin {
                Some(BuiltIn::Position) => {}
                Some(builtin) => match self.output_semantic(builtin) {
                    Some(semantic) => fields.push(Field {
                        name: gl_builtin_name(builtin),
                        ty: output.ty,
                        semantic: semantic.to_owned(),
                        global: self.builtin_name(builtin, StorageClass::Output),
                        split_rows: false,
                    }),
                    None => warn!(builtin = ?builtin, "builtin output has no semantic; dropped"),
                },
                None => {
                    let semantic = if self.stage == ShaderStage::Fragment {
                        match output.location.unwrap_or(0) {
                            0 => "COLOR".to_owned(),
                            location => format!("COLOR{location}"),
                        }
                    } else {
                        let semantic = format!("TEXCOORD{slot}");
                        slot += 1;
                        semantic
                    };
                    fields.push(Field {
                        name: output.name.clone(),
                        ty: output.ty,
                        semantic,
                        global: format!("{}{}", self.prefix(), output.name),
                        split_rows: false,
                    });
                }
            }
        }
        fields
    }

    fn struct_text(&self, symbols: &Symbols, name: &str, fields: &[Field]) -> String {
        let mut text = format!("struct {name} {{\n");
        for field in fields {
            if field.split_rows {
                for row in 0..4 {
                    let semantic = field
                        .semantic
                        .strip_prefix("TEXCOORD")
                        .and_then(|slot| slot.parse::<u32>().ok())
                        .map_or_else(
                            || field.semantic.clone(),
                            |slot| format!("TEXCOORD{}", slot + row),
                        );
                    text.push_str(&format!("\tfloat4 {}_{row} : {semantic};\n", field.name));
                }
                continue;
            }
            let declaration = if field.ty == 0 {
                format!("float4 {}", field.name)
            } else {
                self.declare(symbols, field.ty, &field.name)
            };
            text.push_str(&format!("\t{declaration} : {};\n", field.semantic));
        }
        text.push_str("};\n\n");
        text
    }

    fn declare_block(&self, ctx: &mut TranslationContext, id: Id, ty: Id, register: u32) -> String {
        let members = c_style::struct_members(self, &ctx.symbols, ty, 1);
        if let Some(var) = ctx.symbols.variable_mut(id) {
            var.flattened = true;
        }
        if self.options.is_sm3() {
            return members
                .lines()
                .map(|line| format!("uniform {}\n", line.trim_start()))
                .collect();
        }
        let name = self.type_name(&ctx.symbols, ty);
        format!("cbuffer {name} : register(b{register}) {{\n{members}}};\n")
    }

    fn declare_globals(&self, ctx: &mut TranslationContext) -> Result<(), TranslateError> {
        for ty in ctx.symbols.struct_types() {
            if ctx.symbols.is_block(ty) || ctx.symbols.is_builtin_block(ty) {
                continue;
            }
            let definition = c_style::struct_definition(self, &ctx.symbols, ty);
            ctx.out.text().push_str(&definition);
            ctx.out.text().push('\n');
        }

        let mut globals = ctx
            .symbols
            .global_ids()
            .into_iter()
            .map(|id| (ctx.symbols.display_name(id), id))
            .collect::<Vec<_>>();
        globals.sort();

        // Sorted by global name.
        let mut statics = BTreeMap::new();
        let mut uniforms = String::new();
        let mut next_register = 0;
        if self.stage == ShaderStage::Vertex {
            let position = self.builtin_name(BuiltIn::Position, StorageClass::Output);
            statics.insert(position.clone(), format!("static float4 {position};"));
        }

        for (name, id) in globals {
            let Some(var) = ctx.symbols.variable(id).cloned() else {
                continue;
            };
            let Some(storage) = var.storage else {
                continue;
            };
            let name = if self.is_reserved(&name) {
                format!("_{name}")
            } else {
                name
            };
            match storage {
                StorageClass::Input | StorageClass::Output => {
                    let is_per_vertex = ctx.symbols.is_builtin_block(var.ty)
                        || matches!(ctx.symbols.type_kind(var.ty), TypeKind::Array { element, .. }
                            if ctx.symbols.is_builtin_block(*element));
                    if is_per_vertex {
                        // Members resolve through `builtin_name` in access chains.
                        let block = match ctx.symbols.type_kind(var.ty) {
                            TypeKind::Array { element, .. } => *element,
                            _ => var.ty,
                        };
                        for index in 0..ctx.symbols.type_kind(block).length() {
                            let member = ctx.symbols.member(block, index);
                            if let Some(builtin) = member.builtin {
                                let global = self.builtin_name(builtin, storage);
                                let declaration = self.declare(&ctx.symbols, member.ty, &global);
                                statics.insert(global, format!("static {declaration};"));
                            }
                        }
                        continue;
                    }
                    let global = match var.builtin {
                        Some(builtin) => self.builtin_name(builtin, storage),
                        None => format!("{}{}", self.prefix(), ctx.symbols.display_name(id)),
                    };
                    let declaration = self.declare(&ctx.symbols, var.ty, &global);
                    statics.insert(global.clone(), format!("static {declaration};"));
                    ctx.symbols.rebind(id, global);
                }
                StorageClass::Uniform | StorageClass::UniformConstant | StorageClass::PushConstant
                    if ctx.symbols.is_block(var.ty) =>
                {
                    let register = var.binding.unwrap_or(next_register);
                    next_register = register + 1;
                    uniforms.push_str(&self.declare_block(ctx, id, var.ty, register));
                }
                StorageClass::Uniform
                | StorageClass::UniformConstant
                | StorageClass::PushConstant => {
                    let declaration = self.declare(&ctx.symbols, var.ty, &name);
                    uniforms.push_str(&format!("uniform {declaration};\n"));
                    ctx.symbols.rebind(id, name);
                }
                StorageClass::Private => {
                    let declaration = self.declare(&ctx.symbols, var.ty, &name);
                    statics.insert(name.clone(), format!("static {declaration};"));
                    ctx.symbols.rebind(id, name);
                }
                StorageClass::Workgroup => {
                    let declaration = self.declare(&ctx.symbols, var.ty, &name);
                    uniforms.push_str(&format!("groupshared {declaration};\n"));
                    ctx.symbols.rebind(id, name);
                }
                StorageClass::StorageBuffer => {
                    return Err(TranslateError::BackendLimitation {
                        backend: self.backend_name(),
                        id,
                        opcode: Opcode::Known(Op::Variable),
                        reason: "storage buffers are not supported".to_owned(),
                    });
                }
                _ => {}
            }
            if let Some(var) = ctx.symbols.variable_mut(id) {
                var.declared = true;
            }
        }

        let mut text = uniforms;
        if !text.is_empty() {
            text.push('\n');
        }
        for declaration in statics.values() {
            text.push_str(declaration);
            text.push('\n');
        }
        text.push('\n');
        ctx.out.text().push_str(&text);

        let mut inputs = ctx.symbols.interface(StorageClass::Input);
        inputs.sort_by(|a, b| a.name.cmp(&b.name));
        let mut outputs = ctx.symbols.interface(StorageClass::Output);
        outputs.sort_by(|a, b| a.name.cmp(&b.name));
        let input_fields = self.input_fields(ctx, &inputs)?;
        let output_fields = self.output_fields(&outputs);
        let wrapper = self.wrapper(ctx, &input_fields, &output_fields);
        ctx.out.text().push_str(&wrapper);
        Ok(())
    }

    /// The generated `main`: stage structs, entry prototype and the copy-in/copy-out body.
    fn wrapper(&self, ctx: &TranslationContext, inputs: &[Field], outputs: &[Field]) -> String {
        let suffix = self.struct_suffix();
        let entry = self.entry_name(self.stage);
        let mut text = String::new();

        let parameter = if inputs.is_empty() {
            String::new()
        } else {
            text.push_str(&self.struct_text(&ctx.symbols, &format!("Input{suffix}"), inputs));
            format!("Input{suffix} input")
        };
        let result = if outputs.is_empty() {
            "void".to_owned()
        } else {
            text.push_str(&self.struct_text(&ctx.symbols, &format!("Output{suffix}"), outputs));
            format!("Output{suffix}")
        };

        text.push_str(&format!("void {entry}();\n\n"));
        if self.stage == ShaderStage::Compute {
            let size = ctx
                .symbols
                .execution_modes(ctx.entry)
                .find(|mode| mode.mode == ExecutionMode::LocalSize as u32)
                .map(|mode| {
                    let literal = |i: usize| mode.literals.get(i).copied().unwrap_or(1);
                    (literal(0), literal(1), literal(2))
                })
                .unwrap_or((1, 1, 1));
            text.push_str(&format!("[numthreads({}, {}, {})]\n", size.0, size.1, size.2));
        }
        text.push_str(&format!("{result} main({parameter}) {{\n"));

        for field in inputs {
            if field.global.is_empty() {
                continue;
            }
            if field.split_rows {
                for row in 0..4 {
                    text.push_str(&format!(
                        "\t{}[{row}] = input.{}_{row};\n",
                        field.global, field.name
                    ));
                }
            } else {
                text.push_str(&format!("\t{} = input.{};\n", field.global, field.name));
            }
        }
        text.push_str(&format!("\t{entry}();\n"));

        if !outputs.is_empty() {
            text.push_str(&format!("\t{result} output;\n"));
            for field in outputs {
                text.push_str(&format!("\toutput.{} = {};\n", field.name, field.global));
            }
            if self.stage == ShaderStage::Vertex {
                let p = "output.gl_Position";
                if self.options.is_sm3() {
                    text.push_str(&format!("\t{p}.x = {p}.x - dx_ViewAdjust.x * {p}.w;\n"));
                    text.push_str(&format!("\t{p}.y = {p}.y + dx_ViewAdjust.y * {p}.w;\n"));
                }
                text.push_str(&format!("\t{p}.z = ({p}.z + {p}.w) * 0.5;\n"));
            }
            text.push_str("\treturn output;\n");
        }
        text.push_str("}\n\n");
        text
    }

    fn image_type(&self, dim: Dim, flags: ImageFlags) -> String {
        if flags.contains(ImageFlags::STORAGE) {
            return "RWTexture2D<float4>".to_owned();
        }
        match dim {
            Dim::Dim1D => "sampler1D",
            Dim::Dim3D => "sampler3D",
            Dim::DimCube => "samplerCUBE",
            _ => "sampler2D",
        }
        .to_owned()
    }
}

impl Dialect for HlslBackend {
    fn backend_name(&self) -> &'static str {
        "hlsl"
    }

    fn type_name(&self, symbols: &Symbols, ty: Id) -> String {
        let scalar_name = |scalar: Option<Scalar>| match scalar {
            Some(Scalar::Bool) => "bool",
            Some(Scalar::Int { signed: true, .. }) => "int",
            Some(Scalar::Int { signed: false, .. }) => "uint",
            Some(Scalar::Float { width: 64 }) => "double",
            _ => "float",
        };
        match symbols.type_kind(ty) {
            TypeKind::Void => "void".to_owned(),
            TypeKind::Scalar(scalar) => scalar_name(Some(*scalar)).to_owned(),
            TypeKind::Vector { count, .. } => format!("{}{count}", scalar_name(symbols.scalar(ty))),
            // Rows of the HLSL matrix hold the columns of the SPIR-V matrix.
            TypeKind::Matrix { columns, .. } => format!(
                "{}{columns}x{}",
                scalar_name(symbols.scalar(ty)),
                symbols.matrix_rows(ty)
            ),
            TypeKind::Array { element, .. } => self.type_name(symbols, *element),
            TypeKind::Struct { .. } => symbols.display_name(ty),
            TypeKind::Image { dim, flags, .. } => self.image_type(*dim, *flags),
            TypeKind::SampledImage { image } => self.type_name(symbols, *image),
            TypeKind::Sampler => "sampler".to_owned(),
            TypeKind::Pointer { pointee, .. } => self.type_name(symbols, *pointee),
            TypeKind::Function { result, .. } => self.type_name(symbols, *result),
            TypeKind::Unknown => "unknown".to_owned(),
        }
    }

    fn builtin_name(&self, builtin: BuiltIn, _storage: StorageClass) -> String {
        format!("{}{}", self.prefix(), gl_builtin_name(builtin))
    }

    fn entry_name(&self, stage: ShaderStage) -> String {
        match stage {
            ShaderStage::Vertex => "vert_main",
            ShaderStage::Fragment => "frag_main",
            ShaderStage::TessControl => "tesc_main",
            ShaderStage::TessEvaluation => "tese_main",
            ShaderStage::Geometry => "geom_main",
            ShaderStage::Compute => "comp_main",
        }
        .to_owned()
    }

    fn is_reserved(&self, name: &str) -> bool {
        RESERVED.contains(&name)
    }

    fn ext_inst_name(&self, op: GLOp) -> Option<&'static str> {
        match op {
            GLOp::InverseSqrt => Some("rsqrt"),
            GLOp::Fract => Some("frac"),
            GLOp::FMix => Some("lerp"),
            GLOp::Atan2 => Some("atan2"),
            GLOp::Fma => Some("mad"),
            GLOp::RoundEven => Some("round"),
            GLOp::MatrixInverse => None,
            other => glsl_std450_name(other),
        }
    }

    fn bitcast(&self, symbols: &Symbols, ty: Id, _from: Id, expr: &str) -> String {
        match symbols.scalar(ty) {
            Some(Scalar::Float { .. }) => format!("asfloat({expr})"),
            Some(Scalar::Int { signed: true, .. }) => format!("asint({expr})"),
            Some(Scalar::Int { signed: false, .. }) => format!("asuint({expr})"),
            _ => self.cast(symbols, ty, expr),
        }
    }

    fn matrix_product(&self, product: Product, lhs: &str, rhs: &str) -> String {
        match product {
            Product::MatrixVector => format!("mul(transpose({lhs}), {rhs})"),
            Product::VectorMatrix => format!("mul({lhs}, transpose({rhs}))"),
            Product::MatrixMatrix => {
                format!("transpose(mul(transpose({lhs}), transpose({rhs})))")
            }
        }
    }

    fn derivative(&self, op: Op) -> Option<&'static str> {
        match op {
            Op::DPdx | Op::DPdxFine | Op::DPdxCoarse => Some("ddx"),
            Op::DPdy | Op::DPdyFine | Op::DPdyCoarse => Some("ddy"),
            Op::Fwidth | Op::FwidthFine | Op::FwidthCoarse => Some("fwidth"),
            _ => None,
        }
    }

    fn sample(&self, _symbols: &Symbols, sample: &TextureSample) -> Result<String, String> {
        if sample.depth_reference.is_some() {
            return Err("depth comparison sampling is not supported".to_owned());
        }
        if sample.offset.is_some() {
            return Err("offset sampling is not supported".to_owned());
        }
        if sample.flags.contains(ImageFlags::ARRAYED) {
            return Err("array textures are not supported".to_owned());
        }
        let (function, size) = match sample.dim {
            Dim::Dim1D => ("tex1D", 1),
            Dim::Dim2D | Dim::DimRect => ("tex2D", 2),
            Dim::Dim3D => ("tex3D", 3),
            Dim::DimCube => ("texCUBE", 3),
            other => return Err(format!("{other:?} textures cannot be sampled")),
        };
        let image = &sample.image;
        let coordinate = if sample.projective {
            let (xyz, w) = match size {
                1 => ("x", "y"),
                2 => ("xy", "z"),
                _ => ("xyz", "w"),
            };
            let c = &sample.coordinate;
            format!("{c}.{xyz} / {c}.{w}")
        } else {
            sample.coordinate.clone()
        };
        // tex*lod / tex*bias take the level in the fourth component.
        let with_level = |level: &str| match size {
            1 => format!("float4({coordinate}, 0.0, 0.0, {level})"),
            2 => format!("float4({coordinate}, 0.0, {level})"),
            _ => format!("float4({coordinate}, {level})"),
        };
        Ok(if let Some(lod) = &sample.lod {
            format!("{function}lod({image}, {})", with_level(lod))
        } else if let Some((dx, dy)) = &sample.gradient {
            format!("{function}grad({image}, {coordinate}, {dx}, {dy})")
        } else if let Some(bias) = &sample.bias {
            format!("{function}bias({image}, {})", with_level(bias))
        } else {
            format!("{function}({image}, {coordinate})")
        })
    }
}

impl InstructionHandler for HlslBackend {
    fn begin(&mut self, ctx: &mut TranslationContext) -> Result<(), TranslateError> {
        self.stage = ctx.stage;
        let mut header = String::new();
        for ty in ["float", "float2", "float3", "float4"] {
            header.push_str(&format!(
                "{ty} mod({ty} x, {ty} y) {{\n\treturn x - y * floor(x / y);\n}}\n\n"
            ));
        }
        if self.stage == ShaderStage::Vertex && self.options.is_sm3() {
            header.push_str("uniform float4 dx_ViewAdjust;\n\n");
        }
        ctx.out.text().push_str(&header);
        Ok(())
    }

    fn handle(
        &mut self,
        ctx: &mut TranslationContext,
        inst: &Instruction,
    ) -> Result<(), TranslateError> {
        match inst.op() {
            Some(Op::ExecutionMode) => {
                c_style::note_execution_mode(ctx, inst, &[ExecutionMode::LocalSize])
            }
            Some(Op::EmitVertex | Op::EndPrimitive) => Err(TranslateError::BackendLimitation {
                backend: self.backend_name(),
                id: 0,
                opcode: inst.opcode,
                reason: "geometry stream output is not supported".to_owned(),
            }),
            _ => c_style::handle(self, ctx, inst),
        }
    }

    fn begin_function(&mut self, ctx: &mut TranslationContext) -> Result<(), TranslateError> {
        if ctx.is_first_function() {
            self.declare_globals(ctx)?;
        }
        let signature = c_style::function_signature(self, ctx);
        if !ctx.in_entry_function() {
            ctx.out.line().push_str(&format!("{signature};"));
        }
        ctx.out.start_function();
        ctx.out.line().push_str(&format!("{signature} {{"));
        ctx.out.indent();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(dim: Dim) -> TextureSample {
        TextureSample {
            result_type: 0,
            image: "tex".to_owned(),
            sampler: None,
            coordinate: "uv".to_owned(),
            dim,
            flags: ImageFlags::empty(),
            depth_reference: None,
            bias: None,
            lod: None,
            gradient: None,
            offset: None,
            projective: false,
        }
    }

    #[test]
    fn sampling_uses_legacy_intrinsics() {
        let hlsl = HlslBackend::new(HlslOptions::default());
        let symbols = Symbols::new(1);
        assert_eq!(hlsl.sample(&symbols, &sample(Dim::Dim2D)).unwrap(), "tex2D(tex, uv)");

        let lod = TextureSample {
            lod: Some("2.0".to_owned()),
            ..sample(Dim::Dim2D)
        };
        assert_eq!(
            hlsl.sample(&symbols, &lod).unwrap(),
            "tex2Dlod(tex, float4(uv, 0.0, 2.0))"
        );

        let cube = TextureSample {
            bias: Some("b".to_owned()),
            ..sample(Dim::DimCube)
        };
        assert_eq!(
            hlsl.sample(&symbols, &cube).unwrap(),
            "texCUBEbias(tex, float4(uv, b))"
        );

        let shadow = TextureSample {
            depth_reference: Some("d".to_owned()),
            ..sample(Dim::Dim2D)
        };
        assert!(hlsl.sample(&symbols, &shadow).is_err());
    }

    #[test]
    fn integer_vectors_flip_signedness() {
        use prism_spirv::test_utils::ModuleBuilder;
        use prism_spirv::Module;

        let mut b = ModuleBuilder::new();
        b.inst(Op::TypeInt, &[1, 32, 1]);
        b.inst(Op::TypeVector, &[2, 1, 4]);
        b.inst(Op::TypeInt, &[3, 32, 0]);
        let module = Module::decode(&b.to_bytes()).unwrap();
        let mut symbols = Symbols::new(module.header().id_bound);
        for inst in module.instructions() {
            symbols.record(inst).unwrap();
        }
        let hlsl = HlslBackend::new(HlslOptions::default());
        assert_eq!(hlsl.int_type_name(&symbols, 2, false), "uint4");
        assert_eq!(hlsl.int_type_name(&symbols, 3, true), "int");
    }

    #[test]
    fn matrix_products_transpose_the_matrix() {
        let hlsl = HlslBackend::new(HlslOptions::default());
        assert_eq!(
            hlsl.matrix_product(Product::MatrixVector, "m", "v"),
            "mul(transpose(m), v)"
        );
        assert_eq!(
            hlsl.matrix_product(Product::VectorMatrix, "v", "m"),
            "mul(v, transpose(m))"
        );
    }

    #[test]
    fn intrinsics_use_hlsl_names() {
        let hlsl = HlslBackend::new(HlslOptions::default());
        assert_eq!(hlsl.ext_inst_name(GLOp::InverseSqrt), Some("rsqrt"));
        assert_eq!(hlsl.ext_inst_name(GLOp::FMix), Some("lerp"));
        assert_eq!(hlsl.ext_inst_name(GLOp::Sqrt), Some("sqrt"));
        assert_eq!(hlsl.entry_name(ShaderStage::Fragment), "frag_main");
    }
}
