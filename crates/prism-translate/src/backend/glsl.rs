//! OpenGL / OpenGL ES shading language.

use prism_spirv::Instruction;
use spirv::{BuiltIn, Dim, ExecutionMode, Op, StorageClass};

use super::c_style;
use super::{gl_builtin_name, Dialect, InstructionHandler, TextureSample};
use crate::context::TranslationContext;
use crate::error::TranslateError;
use crate::options::{GlslOptions, ShaderStage};
use crate::symbols::Symbols;
use crate::types::{Id, ImageFlags, Scalar, TypeKind};

const SUPPORTED_MODES: &[ExecutionMode] = &[
    ExecutionMode::LocalSize,
    ExecutionMode::OutputVertices,
    ExecutionMode::Invocations,
    ExecutionMode::Triangles,
    ExecutionMode::Quads,
    ExecutionMode::Isolines,
    ExecutionMode::SpacingEqual,
    ExecutionMode::SpacingFractionalEven,
    ExecutionMode::SpacingFractionalOdd,
    ExecutionMode::VertexOrderCw,
    ExecutionMode::VertexOrderCcw,
    ExecutionMode::PointMode,
    ExecutionMode::InputPoints,
    ExecutionMode::InputLines,
    ExecutionMode::InputLinesAdjacency,
    ExecutionMode::InputTrianglesAdjacency,
    ExecutionMode::OutputPoints,
    ExecutionMode::OutputLineStrip,
    ExecutionMode::OutputTriangleStrip,
    ExecutionMode::EarlyFragmentTests,
];

const RESERVED: &[&str] = &[
    "input",
    "output",
    "texture",
    "sampler",
    "sample",
    "filter",
    "common",
    "partition",
    "active",
    "smooth",
    "flat",
    "noperspective",
    "patch",
    "precision",
    "lowp",
    "mediump",
    "highp",
    "attribute",
    "varying",
];

#[derive(Debug, Clone)]
pub struct GlslBackend {
    options: GlslOptions,
    stage: ShaderStage,
}

impl GlslBackend {
    pub fn new(options: GlslOptions) -> Self {
        Self {
            options,
            stage: ShaderStage::Vertex,
        }
    }

    fn global_name(&self, symbols: &Symbols, id: Id) -> String {
        let name = symbols.display_name(id);
        if self.is_reserved(&name) {
            format!("_{name}")
        } else {
            name
        }
    }

    fn write_execution_modes(&self, ctx: &mut TranslationContext) {
        use ExecutionMode as M;
        let modes = ctx
            .symbols
            .execution_modes(ctx.entry)
            .cloned()
            .collect::<Vec<_>>();
        let mut inputs: Vec<String> = Vec::new();
        let mut outputs: Vec<String> = Vec::new();
        for mode in modes {
            let literal = |index: usize| mode.literals.get(index).copied().unwrap_or(1);
            let Some(kind) = M::from_u32(mode.mode) else {
                continue;
            };
            match kind {
                M::LocalSize => inputs.push(format!(
                    "local_size_x = {}, local_size_y = {}, local_size_z = {}",
                    literal(0),
                    literal(1),
                    literal(2)
                )),
                M::OutputVertices if self.stage == ShaderStage::TessControl => {
                    outputs.push(format!("vertices = {}", literal(0)));
                }
                M::OutputVertices => outputs.push(format!("max_vertices = {}", literal(0))),
                M::Invocations => inputs.push(format!("invocations = {}", literal(0))),
                M::Triangles => inputs.push("triangles".to_owned()),
                M::Quads => inputs.push("quads".to_owned()),
                M::Isolines => inputs.push("isolines".to_owned()),
                M::SpacingEqual => inputs.push("equal_spacing".to_owned()),
                M::SpacingFractionalEven => inputs.push("fractional_even_spacing".to_owned()),
                M::SpacingFractionalOdd => inputs.push("fractional_odd_spacing".to_owned()),
                M::VertexOrderCw => inputs.push("cw".to_owned()),
                M::VertexOrderCcw => inputs.push("ccw".to_owned()),
                M::PointMode => inputs.push("point_mode".to_owned()),
                M::InputPoints => inputs.push("points".to_owned()),
                M::InputLines => inputs.push("lines".to_owned()),
                M::InputLinesAdjacency => inputs.push("lines_adjacency".to_owned()),
                M::InputTrianglesAdjacency => inputs.push("triangles_adjacency".to_owned()),
                M::OutputPoints => outputs.insert(0, "points".to_owned()),
                M::OutputLineStrip => outputs.insert(0, "line_strip".to_owned()),
                M::OutputTriangleStrip => outputs.insert(0, "triangle_strip".to_owned()),
                M::EarlyFragmentTests => inputs.push("early_fragment_tests".to_owned()),
                _ => {}
            }
        }
        if !inputs.is_empty() {
            ctx.out
                .line()
                .push_str(&format!("layout({}) in;", inputs.join(", ")));
        }
        if !outputs.is_empty() {
            ctx.out
                .line()
                .push_str(&format!("layout({}) out;", outputs.join(", ")));
        }
    }

    /// Module-scope declarations, written once before the first function.
    fn declare_globals(&self, ctx: &mut TranslationContext) -> Result<(), TranslateError> {
        let modern = self.options.is_modern();
        let explicit_locations = self.options.has_explicit_locations();
        self.write_execution_modes(ctx);

        for ty in ctx.symbols.struct_types() {
            if ctx.symbols.is_block(ty) || ctx.symbols.is_builtin_block(ty) {
                continue;
            }
            let definition = c_style::struct_definition(self, &ctx.symbols, ty);
            ctx.out.text().push_str(&definition);
        }

        let fragment_data = self.stage == ShaderStage::Fragment
            && !modern
            && ctx
                .symbols
                .interface(StorageClass::Output)
                .iter()
                .any(|output| output.builtin.is_none() && output.location.unwrap_or(0) > 0);

        let mut attribute_index = 0;
        for id in ctx.symbols.global_ids() {
            let Some(var) = ctx.symbols.variable(id).cloned() else {
                continue;
            };
            let Some(storage) = var.storage else {
                continue;
            };
            let name = self.global_name(&ctx.symbols, id);
            let interface = matches!(storage, StorageClass::Input | StorageClass::Output);

            if interface && ctx.symbols.is_builtin_block(var.ty) {
                // Members resolve to builtin names through access chains.
                continue;
            }
            if interface {
                if let TypeKind::Array { element, .. } = ctx.symbols.type_kind(var.ty) {
                    if ctx.symbols.is_builtin_block(*element) {
                        let array = if storage == StorageClass::Input {
                            "gl_in"
                        } else {
                            "gl_out"
                        };
                        ctx.symbols.rebind(id, array.to_owned());
                        continue;
                    }
                }
                if let Some(builtin) = var.builtin {
                    ctx.symbols.rebind(id, self.builtin_name(builtin, storage));
                    continue;
                }
            }

            match storage {
                StorageClass::Input => {
                    let qualifier = if modern {
                        "in"
                    } else if self.stage == ShaderStage::Vertex {
                        "attribute"
                    } else {
                        "varying"
                    };
                    let layout = match var.location {
                        Some(location)
                            if explicit_locations && self.stage == ShaderStage::Vertex =>
                        {
                            format!("layout(location = {location}) ")
                        }
                        _ => String::new(),
                    };
                    let declaration = self.declare(&ctx.symbols, var.ty, &name);
                    ctx.out
                        .line()
                        .push_str(&format!("{layout}{qualifier} {declaration};"));
                    if self.stage == ShaderStage::Vertex {
                        let slot = var.location.unwrap_or(attribute_index);
                        ctx.attributes.insert(name.clone(), slot);
                        attribute_index += 1;
                    }
                    ctx.symbols.rebind(id, name);
                }
                StorageClass::Output if self.stage == ShaderStage::Fragment => {
                    if !modern {
                        let reference = if fragment_data {
                            format!("gl_FragData[{}]", var.location.unwrap_or(0))
                        } else {
                            "gl_FragColor".to_owned()
                        };
                        ctx.symbols.rebind(id, reference);
                        continue;
                    }
                    let name = if name == "gl_FragColor" {
                        self.options.frag_color_name.clone()
                    } else {
                        name
                    };
                    let layout = match var.location {
                        Some(location) if explicit_locations => {
                            format!("layout(location = {location}) ")
                        }
                        _ => String::new(),
                    };
                    let declaration = self.declare(&ctx.symbols, var.ty, &name);
                    ctx.out
                        .line()
                        .push_str(&format!("{layout}out {declaration};"));
                    ctx.symbols.rebind(id, name);
                }
                StorageClass::Output => {
                    let qualifier = if modern { "out" } else { "varying" };
                    let declaration = self.declare(&ctx.symbols, var.ty, &name);
                    ctx.out
                        .line()
                        .push_str(&format!("{qualifier} {declaration};"));
                    ctx.symbols.rebind(id, name);
                }
                StorageClass::Uniform
                | StorageClass::UniformConstant
                | StorageClass::PushConstant
                | StorageClass::StorageBuffer => {
                    self.declare_uniform(ctx, id, var.ty, name);
                }
                StorageClass::Private => {
                    let declaration = self.declare(&ctx.symbols, var.ty, &name);
                    ctx.out.line().push_str(&format!("{declaration};"));
                    ctx.symbols.rebind(id, name);
                }
                StorageClass::Workgroup => {
                    let declaration = self.declare(&ctx.symbols, var.ty, &name);
                    ctx.out.line().push_str(&format!("shared {declaration};"));
                    ctx.symbols.rebind(id, name);
                }
                _ => {}
            }
            if let Some(var) = ctx.symbols.variable_mut(id) {
                var.declared = true;
            }
        }
        ctx.out.text().push('\n');
        Ok(())
    }

    fn declare_uniform(&self, ctx: &mut TranslationContext, id: Id, ty: Id, name: String) {
        let is_block = ctx.symbols.is_block(ty) && ctx.symbols.type_kind(ty).is_struct();
        if !is_block {
            let declaration = self.declare(&ctx.symbols, ty, &name);
            ctx.out
                .line()
                .push_str(&format!("uniform {declaration};"));
            ctx.symbols.rebind(id, name);
            return;
        }
        if self.options.has_uniform_blocks() {
            let block = self.type_name(&ctx.symbols, ty);
            let members = c_style::struct_members(self, &ctx.symbols, ty, 1);
            ctx.out.text().push_str(&format!(
                "layout(std140) uniform {block} {{\n{members}}} {name};\n"
            ));
            ctx.symbols.rebind(id, name);
            return;
        }
        let count = ctx.symbols.type_kind(ty).length();
        for index in 0..count {
            let member = ctx.symbols.member(ty, index);
            let member_name = ctx.symbols.member_name(ty, index);
            let declaration = self.declare(&ctx.symbols, member.ty, &member_name);
            ctx.out
                .line()
                .push_str(&format!("uniform {declaration};"));
        }
        if let Some(var) = ctx.symbols.variable_mut(id) {
            var.flattened = true;
        }
    }

    fn sampler_type(&self, symbols: &Symbols, sampled: Id, dim: Dim, flags: ImageFlags) -> String {
        let prefix = match symbols.scalar(sampled) {
            Some(Scalar::Int { signed: true, .. }) => "i",
            Some(Scalar::Int { signed: false, .. }) => "u",
            _ => "",
        };
        let kind = if flags.contains(ImageFlags::STORAGE) {
            "image"
        } else {
            "sampler"
        };
        let shape = match dim {
            Dim::Dim1D => "1D",
            Dim::Dim2D => "2D",
            Dim::Dim3D => "3D",
            Dim::DimCube => "Cube",
            Dim::DimRect => "2DRect",
            Dim::DimBuffer => "Buffer",
            Dim::DimSubpassData => return "subpassInput".to_owned(),
            _ => "2D",
        };
        let mut name = format!("{prefix}{kind}{shape}");
        if flags.contains(ImageFlags::MULTISAMPLED) {
            name.push_str("MS");
        }
        if flags.contains(ImageFlags::ARRAYED) {
            name.push_str("Array");
        }
        if flags.contains(ImageFlags::DEPTH) && kind == "sampler" {
            name.push_str("Shadow");
        }
        name
    }
}

fn coordinate_size(dim: Dim, flags: ImageFlags) -> Option<u32> {
    let base = match dim {
        Dim::Dim1D => 1,
        Dim::Dim2D | Dim::DimRect => 2,
        Dim::Dim3D | Dim::DimCube => 3,
        _ => return None,
    };
    Some(base + u32::from(flags.contains(ImageFlags::ARRAYED)))
}

impl Dialect for GlslBackend {
    fn backend_name(&self) -> &'static str {
        "glsl"
    }

    fn type_name(&self, symbols: &Symbols, ty: Id) -> String {
        match symbols.type_kind(ty) {
            TypeKind::Void => "void".to_owned(),
            TypeKind::Scalar(Scalar::Bool) => "bool".to_owned(),
            TypeKind::Scalar(Scalar::Int { signed: true, .. }) => "int".to_owned(),
            TypeKind::Scalar(Scalar::Int { signed: false, .. }) => "uint".to_owned(),
            TypeKind::Scalar(Scalar::Float { width: 64 }) => "double".to_owned(),
            TypeKind::Scalar(Scalar::Float { .. }) => "float".to_owned(),
            TypeKind::Vector { component, count } => {
                let prefix = match symbols.scalar(*component) {
                    Some(Scalar::Bool) => "b",
                    Some(Scalar::Int { signed: true, .. }) => "i",
                    Some(Scalar::Int { signed: false, .. }) => "u",
                    Some(Scalar::Float { width: 64 }) => "d",
                    _ => "",
                };
                format!("{prefix}vec{count}")
            }
            TypeKind::Matrix { columns, .. } => {
                let rows = symbols.matrix_rows(ty);
                let prefix = match symbols.scalar(ty) {
                    Some(Scalar::Float { width: 64 }) => "d",
                    _ => "",
                };
                if rows == *columns {
                    format!("{prefix}mat{columns}")
                } else {
                    format!("{prefix}mat{columns}x{rows}")
                }
            }
            TypeKind::Array { element, .. } => self.type_name(symbols, *element),
            TypeKind::Struct { .. } => symbols.display_name(ty),
            TypeKind::Image {
                sampled,
                dim,
                flags,
            } => self.sampler_type(symbols, *sampled, *dim, *flags),
            TypeKind::SampledImage { image } => self.type_name(symbols, *image),
            TypeKind::Sampler => "sampler".to_owned(),
            TypeKind::Pointer { pointee, .. } => self.type_name(symbols, *pointee),
            TypeKind::Function { result, .. } => self.type_name(symbols, *result),
            TypeKind::Unknown => "unknown".to_owned(),
        }
    }

    fn builtin_name(&self, builtin: BuiltIn, _storage: StorageClass) -> String {
        gl_builtin_name(builtin)
    }

    fn is_reserved(&self, name: &str) -> bool {
        RESERVED.contains(&name)
    }

    fn construct(&self, symbols: &Symbols, ty: Id, parts: &[String]) -> String {
        match symbols.type_kind(ty) {
            TypeKind::Array { element, .. } => format!(
                "{}[{}]({})",
                self.type_name(symbols, *element),
                parts.len(),
                parts.join(", ")
            ),
            _ => format!("{}({})", self.type_name(symbols, ty), parts.join(", ")),
        }
    }

    fn bitcast(&self, symbols: &Symbols, ty: Id, from: Id, expr: &str) -> String {
        match (symbols.scalar(ty), symbols.scalar(from)) {
            (Some(Scalar::Float { .. }), Some(Scalar::Int { signed: true, .. })) => {
                format!("intBitsToFloat({expr})")
            }
            (Some(Scalar::Float { .. }), Some(Scalar::Int { signed: false, .. })) => {
                format!("uintBitsToFloat({expr})")
            }
            (Some(Scalar::Int { signed: true, .. }), Some(Scalar::Float { .. })) => {
                format!("floatBitsToInt({expr})")
            }
            (Some(Scalar::Int { signed: false, .. }), Some(Scalar::Float { .. })) => {
                format!("floatBitsToUint({expr})")
            }
            _ => self.cast(symbols, ty, expr),
        }
    }

    fn vector_comparison(&self, op: &'static str, lhs: &str, rhs: &str) -> String {
        let function = match op {
            "<" => "lessThan",
            "<=" => "lessThanEqual",
            ">" => "greaterThan",
            ">=" => "greaterThanEqual",
            "==" => "equal",
            _ => "notEqual",
        };
        format!("{function}({lhs}, {rhs})")
    }

    fn sample(&self, _symbols: &Symbols, sample: &TextureSample) -> Result<String, String> {
        let size = coordinate_size(sample.dim, sample.flags)
            .ok_or_else(|| format!("{:?} textures cannot be sampled", sample.dim))?;
        let image = &sample.image;

        if !self.options.is_modern() {
            if sample.depth_reference.is_some() {
                return Err("depth comparison sampling needs a newer GLSL version".to_owned());
            }
            if sample.gradient.is_some() || sample.offset.is_some() {
                return Err("gradient and offset sampling need a newer GLSL version".to_owned());
            }
            if sample.flags.contains(ImageFlags::ARRAYED) {
                return Err("array textures need a newer GLSL version".to_owned());
            }
            let mut function = match sample.dim {
                Dim::Dim1D => "texture1D",
                Dim::Dim3D => "texture3D",
                Dim::DimCube => "textureCube",
                _ => "texture2D",
            }
            .to_owned();
            if sample.projective {
                function.push_str("Proj");
            }
            let mut args = vec![image.clone(), sample.coordinate.clone()];
            if let Some(lod) = &sample.lod {
                function.push_str("Lod");
                args.push(lod.clone());
            } else if let Some(bias) = &sample.bias {
                args.push(bias.clone());
            }
            return Ok(format!("{function}({})", args.join(", ")));
        }

        let coordinate = match &sample.depth_reference {
            Some(reference) => format!("vec{}({}, {reference})", size + 1, sample.coordinate),
            None => sample.coordinate.clone(),
        };
        let mut function = "texture".to_owned();
        if sample.projective {
            function.push_str("Proj");
        }
        let mut args = vec![image.clone(), coordinate];
        if let Some(lod) = &sample.lod {
            function.push_str("Lod");
            args.push(lod.clone());
        } else if let Some((dx, dy)) = &sample.gradient {
            function.push_str("Grad");
            args.push(dx.clone());
            args.push(dy.clone());
        }
        if let Some(offset) = &sample.offset {
            function.push_str("Offset");
            args.push(offset.clone());
        }
        if let Some(bias) = &sample.bias {
            args.push(bias.clone());
        }
        Ok(format!("{function}({})", args.join(", ")))
    }

    fn primitive_statements(&self) -> Option<(&'static str, &'static str)> {
        Some(("EmitVertex();", "EndPrimitive();"))
    }
}

impl InstructionHandler for GlslBackend {
    fn begin(&mut self, ctx: &mut TranslationContext) -> Result<(), TranslateError> {
        self.stage = ctx.stage;
        let version = self.options.version;
        let header = if self.options.es && version >= 300 {
            format!("#version {version} es")
        } else {
            format!("#version {version}")
        };
        ctx.out.line().push_str(&header);
        if self.options.es {
            let precision = if self.options.relaxed_precision {
                "mediump"
            } else {
                "highp"
            };
            ctx.out
                .line()
                .push_str(&format!("precision {precision} float;"));
        }
        ctx.out.text().push('\n');
        Ok(())
    }

    fn handle(
        &mut self,
        ctx: &mut TranslationContext,
        inst: &Instruction,
    ) -> Result<(), TranslateError> {
        match inst.op() {
            Some(Op::ExecutionMode) => c_style::note_execution_mode(ctx, inst, SUPPORTED_MODES),
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
    use prism_spirv::test_utils::ModuleBuilder;
    use prism_spirv::Module;
    use spirv::Op;

    use super::*;

    fn symbols(builder: &ModuleBuilder) -> Symbols {
        let module = Module::decode(&builder.to_bytes()).unwrap();
        let mut symbols = Symbols::new(module.header().id_bound);
        for inst in module.instructions() {
            symbols.record(inst).unwrap();
        }
        symbols
    }

    #[test]
    fn type_names_follow_glsl_conventions() {
        let mut b = ModuleBuilder::new();
        b.inst(Op::TypeFloat, &[1, 32]);
        b.inst(Op::TypeVector, &[2, 1, 3]);
        b.inst(Op::TypeMatrix, &[3, 2, 4]);
        b.inst(Op::TypeInt, &[4, 32, 1]);
        b.inst(Op::TypeVector, &[5, 4, 2]);
        b.inst(Op::TypeImage, &[6, 1, Dim::DimCube as u32, 1, 0, 0, 1, 0]);
        b.inst(Op::TypeSampledImage, &[7, 6]);
        let symbols = symbols(&b);
        let glsl = GlslBackend::new(GlslOptions::default());
        assert_eq!(glsl.type_name(&symbols, 2), "vec3");
        assert_eq!(glsl.type_name(&symbols, 3), "mat4x3");
        assert_eq!(glsl.type_name(&symbols, 5), "ivec2");
        assert_eq!(glsl.type_name(&symbols, 7), "samplerCubeShadow");
    }

    #[test]
    fn integer_types_flip_signedness() {
        let mut b = ModuleBuilder::new();
        b.inst(Op::TypeInt, &[1, 32, 1]);
        b.inst(Op::TypeVector, &[2, 1, 3]);
        b.inst(Op::TypeInt, &[3, 32, 0]);
        b.inst(Op::TypeVector, &[4, 3, 2]);
        b.inst(Op::TypeFloat, &[5, 32]);
        let symbols = symbols(&b);
        let glsl = GlslBackend::new(GlslOptions::default());
        assert_eq!(glsl.int_type_name(&symbols, 1, false), "uint");
        assert_eq!(glsl.int_type_name(&symbols, 2, false), "uvec3");
        assert_eq!(glsl.int_type_name(&symbols, 3, true), "int");
        assert_eq!(glsl.int_type_name(&symbols, 4, true), "ivec2");
        assert_eq!(glsl.int_type_name(&symbols, 2, true), "ivec3");
        assert_eq!(glsl.int_type_name(&symbols, 5, false), "float");
    }

    #[test]
    fn legacy_versions_use_texture2d() {
        let legacy = GlslBackend::new(GlslOptions {
            version: 110,
            ..Default::default()
        });
        let modern = GlslBackend::new(GlslOptions::default());
        let sample = TextureSample {
            result_type: 0,
            image: "tex".to_owned(),
            sampler: None,
            coordinate: "uv".to_owned(),
            dim: Dim::Dim2D,
            flags: ImageFlags::empty(),
            depth_reference: None,
            bias: None,
            lod: Some("0.0".to_owned()),
            gradient: None,
            offset: None,
            projective: false,
        };
        let symbols = Symbols::new(1);
        assert_eq!(
            legacy.sample(&symbols, &sample).unwrap(),
            "texture2DLod(tex, uv, 0.0)"
        );
        assert_eq!(
            modern.sample(&symbols, &sample).unwrap(),
            "textureLod(tex, uv, 0.0)"
        );
    }
}
