//! Apple Metal shading language.
//!
//! Stage inputs and outputs are gathered into `main0_in`/`main0_out`, loose uniforms into
//! `main0_uniforms`, and every resource becomes an entry-point parameter with an explicit
//! `[[buffer(n)]]`/`[[texture(n)]]`/`[[sampler(n)]]` index. The indices are assigned once by
//! [`InstructionHandler::allocate_resources`] and stored on the variables, so the entry point's
//! declaration and definition read the same slots.

use std::collections::BTreeMap;

use prism_spirv::{Instruction, Opcode};
use spirv::{BuiltIn, Dim, ExecutionMode, GLOp, Op, StorageClass};
use tracing::warn;

use super::c_style;
use super::{gl_builtin_name, glsl_std450_name, Dialect, InstructionHandler, Product, TextureSample};
use crate::context::TranslationContext;
use crate::error::TranslateError;
use crate::options::{MetalOptions, ShaderStage, VertexBufferLayout};
use crate::symbols::{ResourceSlots, Symbols, Variable};
use crate::types::{Id, ImageFlags, Scalar, TypeKind};

const ENTRY: &str = "main0";

const RESERVED: &[&str] = &[
    "in",
    "out",
    "uniforms",
    "main0",
    "kernel",
    "vertex",
    "fragment",
    "constant",
    "device",
    "threadgroup",
    "thread",
    "texture",
    "sampler",
    "new",
    "delete",
    "class",
    "template",
    "this",
    "using",
    "namespace",
    "auto",
    "char",
    "short",
    "long",
    "half",
    "signed",
    "unsigned",
];

#[derive(Debug, Clone)]
pub struct MetalBackend {
    options: MetalOptions,
    stage: ShaderStage,
    /// Buffer index of `main0_uniforms`, when loose uniforms exist.
    uniforms_buffer: Option<u32>,
    /// Entry signature shared by the declaration and the definition.
    entry_signature: String,
    /// Statements opening the entry body: the output struct and stand-ins for globals.
    entry_prologue: Vec<String>,
    has_output: bool,
    writes_position: bool,
}

/// Where an input builtin arrives: inside `main0_in` or as its own entry parameter.
enum InputBuiltin {
    StageIn(&'static str),
    Parameter { ty: &'static str, attribute: &'static str },
}

impl MetalBackend {
    pub fn new(options: MetalOptions) -> Self {
        Self {
            options,
            stage: ShaderStage::Vertex,
            uniforms_buffer: None,
            entry_signature: String::new(),
            entry_prologue: Vec::new(),
            has_output: false,
            writes_position: false,
        }
    }

    fn fetches_vertices(&self) -> bool {
        self.stage == ShaderStage::Vertex && !self.options.vertex_buffers.is_empty()
    }

    fn input_builtin(&self, builtin: BuiltIn) -> Option<InputBuiltin> {
        use InputBuiltin::{Parameter, StageIn};
        Some(match builtin {
            BuiltIn::FragCoord => StageIn("position"),
            BuiltIn::VertexId | BuiltIn::VertexIndex => Parameter {
                ty: "uint",
                attribute: "vertex_id",
            },
            BuiltIn::InstanceId | BuiltIn::InstanceIndex => Parameter {
                ty: "uint",
                attribute: "instance_id",
            },
            BuiltIn::FrontFacing => Parameter {
                ty: "bool",
                attribute: "front_facing",
            },
            BuiltIn::PointCoord => Parameter {
                ty: "float2",
                attribute: "point_coord",
            },
            BuiltIn::SampleId => Parameter {
                ty: "uint",
                attribute: "sample_id",
            },
            BuiltIn::GlobalInvocationId => Parameter {
                ty: "uint3",
                attribute: "thread_position_in_grid",
            },
            BuiltIn::LocalInvocationId => Parameter {
                ty: "uint3",
                attribute: "thread_position_in_threadgroup",
            },
            BuiltIn::WorkgroupId => Parameter {
                ty: "uint3",
                attribute: "threadgroup_position_in_grid",
            },
            BuiltIn::NumWorkgroups => Parameter {
                ty: "uint3",
                attribute: "threadgroups_per_grid",
            },
            BuiltIn::LocalInvocationIndex => Parameter {
                ty: "uint",
                attribute: "thread_index_in_threadgroup",
            },
            _ => return None,
        })
    }

    /// `main0_out` attribute for an output builtin; `None` means it is written to a local
    /// stand-in and dropped.
    fn output_attribute(&self, builtin: BuiltIn) -> Option<&'static str> {
        match builtin {
            BuiltIn::Position => Some("position"),
            BuiltIn::PointSize if self.options.render.rendering_points => Some("point_size"),
            BuiltIn::FragDepth => Some("depth(any)"),
            BuiltIn::SampleMask => Some("sample_mask"),
            _ => None,
        }
    }

    fn limitation(&self, id: Id, opcode: Op, reason: impl Into<String>) -> TranslateError {
        TranslateError::BackendLimitation {
            backend: self.backend_name(),
            id,
            opcode: Opcode::Known(opcode),
            reason: reason.into(),
        }
    }

    fn texture_type(&self, symbols: &Symbols, sampled: Id, dim: Dim, flags: ImageFlags) -> String {
        let component = match symbols.scalar(sampled) {
            Some(Scalar::Int { signed: true, .. }) => "int",
            Some(Scalar::Int { signed: false, .. }) => "uint",
            _ => "float",
        };
        let base = if flags.contains(ImageFlags::DEPTH) {
            "depth"
        } else {
            "texture"
        };
        let shape = match dim {
            Dim::Dim1D => "1d",
            Dim::Dim3D => "3d",
            Dim::DimCube => "cube",
            Dim::DimBuffer => "_buffer",
            _ => "2d",
        };
        let multisampled = if flags.contains(ImageFlags::MULTISAMPLED) {
            "_ms"
        } else {
            ""
        };
        let arrayed = if flags.contains(ImageFlags::ARRAYED) {
            "_array"
        } else {
            ""
        };
        let access = if flags.contains(ImageFlags::STORAGE) {
            ", access::read_write"
        } else {
            ""
        };
        format!("{base}{shape}{multisampled}{arrayed}<{component}{access}>")
    }

    /// Tightly packed spelling used inside vertex buffer structs.
    fn packed_type(&self, symbols: &Symbols, ty: Id) -> String {
        match symbols.type_kind(ty) {
            TypeKind::Vector { count, .. } if *count > 1 => {
                format!("packed_{}", self.type_name(symbols, ty))
            }
            _ => self.type_name(symbols, ty),
        }
    }

    fn vertex_buffer_struct(
        &self,
        symbols: &Symbols,
        layout: &VertexBufferLayout,
        inputs: &BTreeMap<u32, (Id, String, Id)>,
    ) -> Result<(String, Vec<(Id, String, Id, u32)>), TranslateError> {
        let mut attributes = layout.attributes.clone();
        attributes.sort_by_key(|attribute| attribute.offset);
        let mut text = format!("struct {ENTRY}_vb{} {{\n", layout.binding);
        let mut fetched = Vec::new();
        let mut cursor = 0;
        let mut padding = 0;
        for attribute in attributes {
            let Some((id, name, ty)) = inputs.get(&attribute.location) else {
                continue;
            };
            if attribute.offset > cursor {
                text.push_str(&format!("\tchar _pad{padding}[{}];\n", attribute.offset - cursor));
                padding += 1;
                cursor = attribute.offset;
            }
            text.push_str(&format!("\t{} {name};\n", self.packed_type(symbols, *ty)));
            cursor = symbols
                .byte_size(*ty)
                .and_then(|size| cursor.checked_add(size))
                .ok_or_else(|| {
                    self.limitation(*id, Op::Variable, "vertex attribute size overflows u32")
                })?;
            fetched.push((*id, name.clone(), *ty, attribute.location));
        }
        if layout.stride > cursor {
            text.push_str(&format!("\tchar _pad{padding}[{}];\n", layout.stride - cursor));
        }
        text.push_str("};\n\n");
        Ok((text, fetched))
    }

    fn declare_globals(&mut self, ctx: &mut TranslationContext) -> Result<(), TranslateError> {
        let mut text = String::new();
        for ty in ctx.symbols.struct_types() {
            if ctx.symbols.is_builtin_block(ty) {
                continue;
            }
            text.push_str(&c_style::struct_definition(self, &ctx.symbols, ty));
            text.push('\n');
        }

        let mut uniforms = String::new();
        let mut parameters: Vec<String> = Vec::new();
        let mut stage_in: Vec<String> = Vec::new();
        let mut stage_out: Vec<String> = Vec::new();
        let mut prologue: Vec<String> = Vec::new();
        let mut fetched_inputs: BTreeMap<u32, (Id, String, Id)> = BTreeMap::new();
        let mut next_location = 0;
        let add_parameter = |parameters: &mut Vec<String>, parameter: String| {
            if !parameters.contains(&parameter) {
                parameters.push(parameter);
            }
        };

        for id in ctx.symbols.global_ids() {
            let Some(var) = ctx.symbols.variable(id).cloned() else {
                continue;
            };
            let Some(storage) = var.storage else {
                continue;
            };
            let mut name = ctx.symbols.display_name(id);
            if self.is_reserved(&name) {
                name = format!("_{name}");
            }
            match storage {
                StorageClass::Input => {
                    if let Some(builtin) = var.builtin {
                        self.declare_input_builtin(
                            ctx,
                            id,
                            &var,
                            builtin,
                            &mut stage_in,
                            &mut parameters,
                        )?;
                        continue;
                    }
                    let element = match ctx.symbols.type_kind(var.ty) {
                        TypeKind::Array { element, .. } => *element,
                        _ => var.ty,
                    };
                    if ctx.symbols.is_builtin_block(element) {
                        return Err(self.limitation(
                            id,
                            Op::Variable,
                            "per-vertex input blocks are not supported",
                        ));
                    }
                    let location = var.location.unwrap_or(next_location);
                    next_location = location + 1;
                    let declaration = self.declare(&ctx.symbols, var.ty, &name);
                    match self.stage {
                        ShaderStage::Vertex if self.fetches_vertices() => {
                            fetched_inputs.insert(location, (id, name.clone(), var.ty));
                        }
                        ShaderStage::Vertex => {
                            stage_in.push(format!("{declaration} [[attribute({location})]]"));
                            ctx.attributes.insert(name.clone(), location);
                            ctx.symbols.rebind(id, format!("in.{name}"));
                        }
                        ShaderStage::Fragment => {
                            let flat =
                                matches!(ctx.symbols.scalar(var.ty), Some(Scalar::Int { .. }));
                            let interpolation = if flat { ", flat" } else { "" };
                            stage_in.push(format!(
                                "{declaration} [[user(locn{location}){interpolation}]]"
                            ));
                            ctx.symbols.rebind(id, format!("in.{name}"));
                        }
                        _ => {
                            return Err(self.limitation(
                                id,
                                Op::Variable,
                                format!("{:?} stage inputs are not supported", self.stage),
                            ))
                        }
                    }
                }
                StorageClass::Output => {
                    if ctx.symbols.is_builtin_block(var.ty) {
                        let count = ctx.symbols.type_kind(var.ty).length();
                        for index in 0..count {
                            let member = ctx.symbols.member(var.ty, index);
                            if let Some(builtin) = member.builtin {
                                self.declare_output_builtin(
                                    ctx,
                                    member.ty,
                                    builtin,
                                    &mut stage_out,
                                    &mut prologue,
                                );
                            }
                        }
                        continue;
                    }
                    if let Some(builtin) = var.builtin {
                        self.declare_output_builtin(
                            ctx,
                            var.ty,
                            builtin,
                            &mut stage_out,
                            &mut prologue,
                        );
                        ctx.symbols.rebind(id, self.builtin_name(builtin, storage));
                        continue;
                    }
                    let location = var.location.unwrap_or(0);
                    let declaration = self.declare(&ctx.symbols, var.ty, &name);
                    let attribute = match self.stage {
                        ShaderStage::Fragment => format!("color({location})"),
                        ShaderStage::Vertex => format!("user(locn{location})"),
                        _ => {
                            return Err(self.limitation(
                                id,
                                Op::Variable,
                                format!("{:?} stage outputs are not supported", self.stage),
                            ))
                        }
                    };
                    stage_out.push(format!("{declaration} [[{attribute}]]"));
                    ctx.symbols.rebind(id, format!("out.{name}"));
                }
                StorageClass::UniformConstant
                | StorageClass::Uniform
                | StorageClass::PushConstant
                | StorageClass::StorageBuffer => {
                    self.declare_resource(ctx, id, &var, &name, &mut uniforms, &mut parameters)?;
                }
                StorageClass::Private => {
                    let declaration = self.declare(&ctx.symbols, var.ty, &name);
                    prologue.push(format!("{declaration} = {{}};"));
                    ctx.symbols.rebind(id, name);
                }
                StorageClass::Workgroup => {
                    let declaration = self.declare(&ctx.symbols, var.ty, &name);
                    prologue.push(format!("threadgroup {declaration};"));
                    ctx.symbols.rebind(id, name);
                }
                _ => {}
            }
            if let Some(var) = ctx.symbols.variable_mut(id) {
                var.declared = true;
            }
        }

        if let Some(buffer) = self.uniforms_buffer {
            text.push_str(&format!("struct {ENTRY}_uniforms {{\n{uniforms}}};\n\n"));
            add_parameter(
                &mut parameters,
                format!("constant {ENTRY}_uniforms& uniforms [[buffer({buffer})]]"),
            );
        }

        if self.fetches_vertices() {
            let layouts = self.options.vertex_buffers.clone();
            let mut covered = Vec::new();
            for layout in &layouts {
                let (definition, fetched) =
                    self.vertex_buffer_struct(&ctx.symbols, layout, &fetched_inputs)?;
                text.push_str(&definition);
                let binding = layout.binding;
                let index = if layout.per_instance {
                    add_parameter(&mut parameters, "uint gl_InstanceID [[instance_id]]".to_owned());
                    "gl_InstanceID"
                } else {
                    add_parameter(&mut parameters, "uint gl_VertexID [[vertex_id]]".to_owned());
                    "gl_VertexID"
                };
                add_parameter(
                    &mut parameters,
                    format!("const device {ENTRY}_vb{binding}* vb{binding} [[buffer({binding})]]"),
                );
                for (id, name, ty, location) in fetched {
                    let value = format!("vb{binding}[{index}].{name}");
                    let is_vector = matches!(ctx.symbols.type_kind(ty), TypeKind::Vector { .. });
                    let reference = if is_vector {
                        format!("{}({value})", self.type_name(&ctx.symbols, ty))
                    } else {
                        value
                    };
                    ctx.symbols.rebind(id, reference);
                    ctx.attributes.insert(name, location);
                    covered.push(location);
                }
            }
            if let Some((location, (id, _, _))) = fetched_inputs
                .iter()
                .find(|(location, _)| !covered.contains(location))
            {
                return Err(self.limitation(
                    *id,
                    Op::Variable,
                    format!("no vertex buffer provides location {location}"),
                ));
            }
        }

        if !stage_in.is_empty() {
            text.push_str(&format!("struct {ENTRY}_in {{\n"));
            for field in &stage_in {
                text.push_str(&format!("\t{field};\n"));
            }
            text.push_str("};\n\n");
            parameters.insert(0, format!("{ENTRY}_in in [[stage_in]]"));
        }
        self.has_output = !stage_out.is_empty();
        if self.has_output {
            text.push_str(&format!("struct {ENTRY}_out {{\n"));
            for field in &stage_out {
                text.push_str(&format!("\t{field};\n"));
            }
            text.push_str("};\n\n");
            prologue.insert(0, format!("{ENTRY}_out out = {{}};"));
        }

        let qualifier = match self.stage {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            _ => "kernel",
        };
        let result = if self.has_output {
            format!("{ENTRY}_out")
        } else {
            "void".to_owned()
        };
        self.entry_signature = format!("{qualifier} {result} {ENTRY}({})", parameters.join(", "));
        self.entry_prologue = prologue;
        text.push_str(&format!("{};\n\n", self.entry_signature));
        ctx.out.text().push_str(&text);
        Ok(())
    }

    fn declare_input_builtin(
        &self,
        ctx: &mut TranslationContext,
        id: Id,
        var: &Variable,
        builtin: BuiltIn,
        stage_in: &mut Vec<String>,
        parameters: &mut Vec<String>,
    ) -> Result<(), TranslateError> {
        let name = gl_builtin_name(builtin);
        match self.input_builtin(builtin) {
            Some(InputBuiltin::StageIn(attribute)) => {
                let declaration = self.declare(&ctx.symbols, var.ty, &name);
                stage_in.push(format!("{declaration} [[{attribute}]]"));
            }
            Some(InputBuiltin::Parameter { ty, attribute }) => {
                let parameter = format!("{ty} {name} [[{attribute}]]");
                if !parameters.contains(&parameter) {
                    parameters.push(parameter);
                }
                if self.type_name(&ctx.symbols, var.ty) != ty {
                    let reference = format!("{}({name})", self.type_name(&ctx.symbols, var.ty));
                    ctx.symbols.rebind(id, reference);
                    return Ok(());
                }
            }
            None => {
                return Err(self.limitation(
                    id,
                    Op::Variable,
                    format!("no input attribute for builtin {builtin:?}"),
                ))
            }
        }
        ctx.symbols.rebind(id, self.builtin_name(builtin, StorageClass::Input));
        Ok(())
    }

    fn declare_output_builtin(
        &mut self,
        ctx: &TranslationContext,
        ty: Id,
        builtin: BuiltIn,
        stage_out: &mut Vec<String>,
        prologue: &mut Vec<String>,
    ) {
        let name = gl_builtin_name(builtin);
        let declaration = self.declare(&ctx.symbols, ty, &name);
        match self.output_attribute(builtin) {
            Some(attribute) => {
                if builtin == BuiltIn::Position {
                    self.writes_position = true;
                }
                stage_out.push(format!("{declaration} [[{attribute}]]"));
            }
            None => {
                warn!(builtin = ?builtin, "builtin output has no attribute; dropped");
                prologue.push(format!("{declaration};"));
            }
        }
    }

    fn declare_resource(
        &self,
        ctx: &mut TranslationContext,
        id: Id,
        var: &Variable,
        name: &str,
        uniforms: &mut String,
        parameters: &mut Vec<String>,
    ) -> Result<(), TranslateError> {
        let slots = var.resource;
        let element = match ctx.symbols.type_kind(var.ty) {
            TypeKind::Array { element, .. } => *element,
            _ => var.ty,
        };
        let missing = || self.limitation(id, Op::Variable, "resource has no assigned slot");
        match ctx.symbols.type_kind(element) {
            TypeKind::SampledImage { .. } | TypeKind::Image { .. } | TypeKind::Sampler => {
                if let Some(texture) = slots.texture {
                    let declaration = self.declare(&ctx.symbols, var.ty, name);
                    parameters.push(format!("{declaration} [[texture({texture})]]"));
                }
                if let Some(sampler) = slots.sampler {
                    let sampler_name = if matches!(
                        ctx.symbols.type_kind(element),
                        TypeKind::Sampler
                    ) {
                        name.to_owned()
                    } else {
                        format!("{name}Sampler")
                    };
                    parameters.push(format!("sampler {sampler_name} [[sampler({sampler})]]"));
                }
                if slots.texture.is_none() && slots.sampler.is_none() {
                    return Err(missing());
                }
                ctx.symbols.rebind(id, name.to_owned());
            }
            _ if ctx.symbols.is_block(var.ty) => {
                let buffer = slots.buffer.ok_or_else(missing)?;
                let space = if var.storage == Some(StorageClass::StorageBuffer) {
                    "device"
                } else {
                    "constant"
                };
                let block = self.type_name(&ctx.symbols, var.ty);
                parameters.push(format!("{space} {block}& {name} [[buffer({buffer})]]"));
                ctx.symbols.rebind(id, name.to_owned());
            }
            _ => {
                let declaration = self.declare(&ctx.symbols, var.ty, name);
                uniforms.push_str(&format!("\t{declaration};\n"));
                ctx.symbols.rebind(id, format!("uniforms.{name}"));
            }
        }
        Ok(())
    }

    /// Writes the current expression to a temporary once it outgrows the inline limit.
    fn limit_expression(
        &self,
        ctx: &mut TranslationContext,
        inst: &Instruction,
    ) -> Result<(), TranslateError> {
        let Some(op) = inst.op() else {
            return Ok(());
        };
        if !c_style::is_expression(op) || !ctx.out.in_function() {
            return Ok(());
        }
        let Some(id) = inst.operand(1) else {
            return Ok(());
        };
        if ctx.expr(id).len() > self.options.inline_limit {
            c_style::materialize(self, ctx, inst)?;
        }
        Ok(())
    }

    fn entry_return(&self, ctx: &mut TranslationContext) {
        if !self.has_output {
            ctx.out.line().push_str("return;");
            return;
        }
        if self.stage == ShaderStage::Vertex
            && self.writes_position
            && self.options.render.flip_vertex_y
        {
            ctx.out
                .line()
                .push_str("out.gl_Position.y = -(out.gl_Position.y);");
        }
        ctx.out.line().push_str("return out;");
    }
}

impl Dialect for MetalBackend {
    fn backend_name(&self) -> &'static str {
        "metal"
    }

    fn type_name(&self, symbols: &Symbols, ty: Id) -> String {
        let scalar_name = |scalar: Option<Scalar>| match scalar {
            Some(Scalar::Bool) => "bool",
            Some(Scalar::Int { signed: true, .. }) => "int",
            Some(Scalar::Int { signed: false, .. }) => "uint",
            Some(Scalar::Float { width: 16 }) => "half",
            _ => "float",
        };
        match symbols.type_kind(ty) {
            TypeKind::Void => "void".to_owned(),
            TypeKind::Scalar(scalar) => scalar_name(Some(*scalar)).to_owned(),
            TypeKind::Vector { count, .. } => format!("{}{count}", scalar_name(symbols.scalar(ty))),
            TypeKind::Matrix { columns, .. } => format!(
                "{}{columns}x{}",
                scalar_name(symbols.scalar(ty)),
                symbols.matrix_rows(ty)
            ),
            TypeKind::Array { element, .. } => self.type_name(symbols, *element),
            TypeKind::Struct { .. } => symbols.display_name(ty),
            TypeKind::Image {
                sampled,
                dim,
                flags,
            } => self.texture_type(symbols, *sampled, *dim, *flags),
            TypeKind::SampledImage { image } => self.type_name(symbols, *image),
            TypeKind::Sampler => "sampler".to_owned(),
            TypeKind::Pointer { pointee, .. } => self.type_name(symbols, *pointee),
            TypeKind::Function { result, .. } => self.type_name(symbols, *result),
            TypeKind::Unknown => "unknown".to_owned(),
        }
    }

    fn builtin_name(&self, builtin: BuiltIn, storage: StorageClass) -> String {
        let name = gl_builtin_name(builtin);
        match storage {
            StorageClass::Output if self.output_attribute(builtin).is_some() => {
                format!("out.{name}")
            }
            StorageClass::Input
                if matches!(self.input_builtin(builtin), Some(InputBuiltin::StageIn(_))) =>
            {
                format!("in.{name}")
            }
            _ => name,
        }
    }

    fn entry_name(&self, _stage: ShaderStage) -> String {
        ENTRY.to_owned()
    }

    fn is_reserved(&self, name: &str) -> bool {
        RESERVED.contains(&name)
    }

    fn ext_inst_name(&self, op: GLOp) -> Option<&'static str> {
        match op {
            GLOp::InverseSqrt => Some("rsqrt"),
            GLOp::Atan2 => Some("atan2"),
            GLOp::RoundEven => Some("rint"),
            GLOp::MatrixInverse => None,
            other => glsl_std450_name(other),
        }
    }

    fn construct(&self, symbols: &Symbols, ty: Id, parts: &[String]) -> String {
        match symbols.type_kind(ty) {
            TypeKind::Array { .. } => format!("{{{}}}", parts.join(", ")),
            TypeKind::Struct { .. } => {
                format!("{}{{{}}}", self.type_name(symbols, ty), parts.join(", "))
            }
            _ => format!("{}({})", self.type_name(symbols, ty), parts.join(", ")),
        }
    }

    fn bitcast(&self, symbols: &Symbols, ty: Id, _from: Id, expr: &str) -> String {
        format!("as_type<{}>({expr})", self.type_name(symbols, ty))
    }

    fn matrix_product(&self, product: Product, lhs: &str, rhs: &str) -> String {
        match product {
            Product::MatrixVector => format!("(transpose({lhs}) * {rhs})"),
            Product::VectorMatrix => format!("({lhs} * transpose({rhs}))"),
            Product::MatrixMatrix => format!("transpose(transpose({lhs}) * transpose({rhs}))"),
        }
    }

    fn modulo(&self, lhs: &str, rhs: &str) -> String {
        format!("({lhs} - {rhs} * floor({lhs} / {rhs}))")
    }

    fn derivative(&self, op: Op) -> Option<&'static str> {
        match op {
            Op::DPdx | Op::DPdxFine | Op::DPdxCoarse => Some("dfdx"),
            Op::DPdy | Op::DPdyFine | Op::DPdyCoarse => Some("dfdy"),
            Op::Fwidth | Op::FwidthFine | Op::FwidthCoarse => Some("fwidth"),
            _ => None,
        }
    }

    fn sample(&self, _symbols: &Symbols, sample: &TextureSample) -> Result<String, String> {
        let image = &sample.image;
        let sampler = sample
            .sampler
            .clone()
            .unwrap_or_else(|| format!("{image}Sampler"));
        let (size, gradient) = match sample.dim {
            Dim::Dim1D => (1, None),
            Dim::Dim2D | Dim::DimRect => (2, Some("gradient2d")),
            Dim::Dim3D => (3, Some("gradient3d")),
            Dim::DimCube => (3, Some("gradientcube")),
            other => return Err(format!("{other:?} textures cannot be sampled")),
        };
        let c = &sample.coordinate;
        let mut coordinate = if sample.projective {
            let (xyz, w) = match size {
                1 => ("x", "y"),
                2 => ("xy", "z"),
                _ => ("xyz", "w"),
            };
            format!("{c}.{xyz} / {c}.{w}")
        } else {
            c.clone()
        };
        let arrayed = sample.flags.contains(ImageFlags::ARRAYED);
        let mut array_index = None;
        if arrayed {
            let (xyz, layer) = match size {
                1 => ("x", "y"),
                2 => ("xy", "z"),
                _ => ("xyz", "w"),
            };
            array_index = Some(format!("uint(round({c}.{layer}))"));
            coordinate = format!("{c}.{xyz}");
        }
        if self.options.render.flip_fragment_y && self.stage == ShaderStage::Fragment && size == 2 {
            coordinate = format!("float2(({coordinate}).x, 1.0 - ({coordinate}).y)");
        }

        let mut args = vec![sampler, coordinate];
        args.extend(array_index);
        let function = match &sample.depth_reference {
            Some(reference) => {
                args.push(reference.clone());
                "sample_compare"
            }
            None => "sample",
        };
        if let Some(bias) = &sample.bias {
            args.push(format!("bias({bias})"));
        }
        if let Some(lod) = &sample.lod {
            args.push(format!("level({lod})"));
        }
        if let Some((dx, dy)) = &sample.gradient {
            let gradient =
                gradient.ok_or_else(|| "1D textures have no gradient sampling".to_owned())?;
            args.push(format!("{gradient}({dx}, {dy})"));
        }
        if let Some(offset) = &sample.offset {
            args.push(offset.clone());
        }
        Ok(format!("{image}.{function}({})", args.join(", ")))
    }

    fn kill(&self) -> &'static str {
        "discard_fragment();"
    }
}

impl InstructionHandler for MetalBackend {
    fn begin(&mut self, ctx: &mut TranslationContext) -> Result<(), TranslateError> {
        self.stage = ctx.stage;
        if !matches!(
            self.stage,
            ShaderStage::Vertex | ShaderStage::Fragment | ShaderStage::Compute
        ) {
            return Err(self.limitation(
                ctx.entry,
                Op::EntryPoint,
                format!("{:?} shaders have no Metal equivalent", self.stage),
            ));
        }
        ctx.out.text().push_str(
            "#include <metal_stdlib>\n#include <simd/simd.h>\n\nusing namespace metal;\n\n",
        );
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
            Some(Op::Return) if ctx.in_entry_function() => {
                self.entry_return(ctx);
                Ok(())
            }
            _ => {
                c_style::handle(self, ctx, inst)?;
                self.limit_expression(ctx, inst)
            }
        }
    }

    fn allocate_resources(&mut self, symbols: &mut Symbols) {
        let mut buffer = if self.fetches_vertices() {
            self.options
                .vertex_buffers
                .iter()
                .map(|layout| layout.binding + 1)
                .max()
                .unwrap_or(0)
        } else {
            0
        };
        let mut texture = 0;
        let mut sampler = 0;
        let next = |counter: &mut u32| {
            let slot = *counter;
            *counter += 1;
            Some(slot)
        };

        for id in symbols.global_ids() {
            let Some(var) = symbols.variable(id) else {
                continue;
            };
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
            let element = match symbols.type_kind(var.ty) {
                TypeKind::Array { element, .. } => *element,
                _ => var.ty,
            };
            let slots = match symbols.type_kind(element) {
                TypeKind::SampledImage { .. } => ResourceSlots {
                    texture: next(&mut texture),
                    sampler: next(&mut sampler),
                    ..ResourceSlots::default()
                },
                TypeKind::Image { .. } => ResourceSlots {
                    texture: next(&mut texture),
                    ..ResourceSlots::default()
                },
                TypeKind::Sampler => ResourceSlots {
                    sampler: next(&mut sampler),
                    ..ResourceSlots::default()
                },
                _ if symbols.is_block(var.ty) => ResourceSlots {
                    buffer: next(&mut buffer),
                    ..ResourceSlots::default()
                },
                _ => {
                    if self.uniforms_buffer.is_none() {
                        self.uniforms_buffer = next(&mut buffer);
                    }
                    continue;
                }
            };
            if let Some(var) = symbols.variable_mut(id) {
                var.resource = slots;
            }
        }
    }

    fn begin_function(&mut self, ctx: &mut TranslationContext) -> Result<(), TranslateError> {
        if ctx.is_first_function() {
            self.declare_globals(ctx)?;
        }
        if ctx.in_entry_function() {
            ctx.out.start_function();
            ctx.out.line().push_str(&format!("{} {{", self.entry_signature));
            ctx.out.indent();
            for statement in &self.entry_prologue {
                ctx.out.line().push_str(statement);
            }
            return Ok(());
        }
        let signature = c_style::function_signature(self, ctx);
        ctx.out.line().push_str(&format!("{signature};"));
        ctx.out.start_function();
        ctx.out.line().push_str(&format!("{signature} {{"));
        ctx.out.indent();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RenderContext;

    fn sample() -> TextureSample {
        TextureSample {
            result_type: 0,
            image: "tex".to_owned(),
            sampler: None,
            coordinate: "uv".to_owned(),
            dim: Dim::Dim2D,
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
    fn sampling_uses_the_paired_sampler() {
        let metal = MetalBackend::new(MetalOptions::default());
        let symbols = Symbols::new(1);
        assert_eq!(
            metal.sample(&symbols, &sample()).unwrap(),
            "tex.sample(texSampler, uv)"
        );
        let lod = TextureSample {
            lod: Some("1.0".to_owned()),
            sampler: Some("linear".to_owned()),
            ..sample()
        };
        assert_eq!(
            metal.sample(&symbols, &lod).unwrap(),
            "tex.sample(linear, uv, level(1.0))"
        );
    }

    #[test]
    fn fragment_y_flip_rewrites_2d_coordinates() {
        let mut metal = MetalBackend::new(MetalOptions {
            render: RenderContext {
                flip_fragment_y: true,
                ..Default::default()
            },
            ..Default::default()
        });
        metal.stage = ShaderStage::Fragment;
        let symbols = Symbols::new(1);
        assert_eq!(
            metal.sample(&symbols, &sample()).unwrap(),
            "tex.sample(texSampler, float2((uv).x, 1.0 - (uv).y))"
        );
    }

    #[test]
    fn matrix_products_transpose_both_sides() {
        let metal = MetalBackend::new(MetalOptions::default());
        assert_eq!(
            metal.matrix_product(Product::MatrixVector, "m", "v"),
            "(transpose(m) * v)"
        );
        assert_eq!(metal.modulo("a", "b"), "(a - b * floor(a / b))");
        assert_eq!(metal.kill(), "discard_fragment();");
    }

    #[test]
    fn output_builtins_live_in_the_output_struct() {
        let metal = MetalBackend::new(MetalOptions::default());
        assert_eq!(
            metal.builtin_name(BuiltIn::Position, StorageClass::Output),
            "out.gl_Position"
        );
        // Point size is only an attribute when rendering points.
        assert_eq!(
            metal.builtin_name(BuiltIn::PointSize, StorageClass::Output),
            "gl_PointSize"
        );
        assert_eq!(
            metal.builtin_name(BuiltIn::FragCoord, StorageClass::Input),
            "in.gl_FragCoord"
        );
    }
}
