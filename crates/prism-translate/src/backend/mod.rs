//! Target backends.
//!
//! Each backend is a [`Dialect`] (how types, builtins and intrinsics are spelled) plus an
//! [`InstructionHandler`] (what a target does with the instructions it cares about). Handlers
//! delegate everything else to [`c_style::handle`], which covers the C-like expression and
//! statement forms every text target shares.

pub mod c_style;
pub mod glsl;
pub mod hlsl;
pub mod metal;

use spirv::{BuiltIn, Dim, GLOp, Op, StorageClass};

use crate::context::TranslationContext;
use crate::error::TranslateError;
use crate::options::ShaderStage;
use crate::symbols::Symbols;
use crate::types::{Id, ImageFlags, TypeKind};
use prism_spirv::Instruction;

pub use glsl::GlslBackend;
pub use hlsl::HlslBackend;
pub use metal::MetalBackend;

/// Operand order of a matrix multiplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    MatrixVector,
    VectorMatrix,
    MatrixMatrix,
}

/// Everything a dialect needs to spell one texture sampling call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSample {
    pub result_type: Id,
    /// Texture (or combined texture/sampler) expression.
    pub image: String,
    /// Separate sampler expression, when the image was combined with `OpSampledImage`.
    pub sampler: Option<String>,
    pub coordinate: String,
    pub dim: Dim,
    pub flags: ImageFlags,
    pub depth_reference: Option<String>,
    pub bias: Option<String>,
    pub lod: Option<String>,
    pub gradient: Option<(String, String)>,
    pub offset: Option<String>,
    pub projective: bool,
}

/// Target spelling: type names, builtins, intrinsics.
pub trait Dialect {
    /// Short backend name used in error messages.
    fn backend_name(&self) -> &'static str;

    fn type_name(&self, symbols: &Symbols, ty: Id) -> String;

    /// A declaration of `name` with type `ty`; arrays put their length after the name.
    fn declare(&self, symbols: &Symbols, ty: Id, name: &str) -> String {
        match symbols.type_kind(ty) {
            TypeKind::Array {
                element,
                length: Some(length),
            } => format!("{}[{length}]", self.declare(symbols, *element, name)),
            TypeKind::Array { element, .. } => {
                format!("{}[]", self.declare(symbols, *element, name))
            }
            _ => format!("{} {name}", self.type_name(symbols, ty)),
        }
    }

    /// Expression naming a builtin input or output.
    fn builtin_name(&self, builtin: BuiltIn, storage: StorageClass) -> String;

    /// Name the entry function is emitted under.
    fn entry_name(&self, stage: ShaderStage) -> String {
        let _ = stage;
        "main".to_owned()
    }

    /// Identifiers that must not be used for user symbols.
    fn is_reserved(&self, name: &str) -> bool {
        let _ = name;
        false
    }

    /// Intrinsic implementing a `GLSL.std.450` extended instruction.
    fn ext_inst_name(&self, op: GLOp) -> Option<&'static str> {
        glsl_std450_name(op)
    }

    /// Composite construction from already formatted parts.
    fn construct(&self, symbols: &Symbols, ty: Id, parts: &[String]) -> String {
        match symbols.type_kind(ty) {
            TypeKind::Array { .. } => format!("{{{}}}", parts.join(", ")),
            _ => format!("{}({})", self.type_name(symbols, ty), parts.join(", ")),
        }
    }

    /// Numeric conversion of `expr` to `ty`.
    fn cast(&self, symbols: &Symbols, ty: Id, expr: &str) -> String {
        format!("{}({expr})", self.type_name(symbols, ty))
    }

    /// Name of the integer type shaped like `ty` with the given signedness, e.g. `uvec3` for
    /// `ivec3` or `int2` for `uint2`.
    fn int_type_name(&self, symbols: &Symbols, ty: Id, signed: bool) -> String {
        let name = self.type_name(symbols, ty);
        if signed {
            match name.strip_prefix('u') {
                Some(rest) if rest.starts_with("int") => rest.to_owned(),
                Some(rest) if rest.starts_with("vec") => format!("i{rest}"),
                _ => name,
            }
        } else {
            match name.strip_prefix('i') {
                Some(rest) if rest.starts_with("vec") => format!("u{rest}"),
                Some(rest) if rest.starts_with("nt") => format!("u{name}"),
                _ => name,
            }
        }
    }

    /// Bit-preserving reinterpretation of `expr` (of type `from`) as `ty`.
    fn bitcast(&self, symbols: &Symbols, ty: Id, from: Id, expr: &str) -> String;

    /// Component-wise vector comparison; `op` is the C operator.
    fn vector_comparison(&self, op: &'static str, lhs: &str, rhs: &str) -> String {
        format!("({lhs} {op} {rhs})")
    }

    fn matrix_product(&self, product: Product, lhs: &str, rhs: &str) -> String {
        let _ = product;
        format!("({lhs} * {rhs})")
    }

    /// Floored modulo (result takes the sign of the divisor).
    fn modulo(&self, lhs: &str, rhs: &str) -> String {
        format!("mod({lhs}, {rhs})")
    }

    fn derivative(&self, op: Op) -> Option<&'static str> {
        match op {
            Op::DPdx | Op::DPdxFine | Op::DPdxCoarse => Some("dFdx"),
            Op::DPdy | Op::DPdyFine | Op::DPdyCoarse => Some("dFdy"),
            Op::Fwidth | Op::FwidthFine | Op::FwidthCoarse => Some("fwidth"),
            _ => None,
        }
    }

    /// Texture sampling expression; `Err` carries the reason the target cannot express it.
    fn sample(&self, symbols: &Symbols, sample: &TextureSample) -> Result<String, String>;

    fn kill(&self) -> &'static str {
        "discard;"
    }

    /// Statements for `OpEmitVertex` and `OpEndPrimitive`, when the target has them.
    fn primitive_statements(&self) -> Option<(&'static str, &'static str)> {
        None
    }
}

/// Per-target instruction handling driven by the translation engine.
///
/// Structural opcodes (labels, branches, merges, phis, function end) never reach `handle`;
/// the engine rebuilds control flow itself and calls `begin_function`/`end_function` around
/// each function body.
pub trait InstructionHandler: Dialect {
    /// Called once before the first instruction.
    fn begin(&mut self, ctx: &mut TranslationContext) -> Result<(), TranslateError> {
        let _ = ctx;
        Ok(())
    }

    fn handle(
        &mut self,
        ctx: &mut TranslationContext,
        inst: &Instruction,
    ) -> Result<(), TranslateError>;

    /// Assigns resource slots once every global is known, before any declaration is written.
    fn allocate_resources(&mut self, symbols: &mut Symbols) {
        let _ = symbols;
    }

    /// At a function's first label: writes declarations (first function only), the
    /// signature and the opening brace, and switches output to the function body.
    fn begin_function(&mut self, ctx: &mut TranslationContext) -> Result<(), TranslateError>;

    /// After the closing brace of a function, while output still targets its body.
    fn end_function(&mut self, ctx: &mut TranslationContext) -> Result<(), TranslateError> {
        let _ = ctx;
        Ok(())
    }

    /// Called once after the last instruction.
    fn finish(&mut self, ctx: &mut TranslationContext) -> Result<(), TranslateError> {
        let _ = ctx;
        Ok(())
    }
}

/// GLSL name of a builtin; other targets reuse it for struct members and statics.
pub fn gl_builtin_name(builtin: BuiltIn) -> String {
    use BuiltIn as B;
    let name = match builtin {
        B::Position => "gl_Position",
        B::PointSize => "gl_PointSize",
        B::ClipDistance => "gl_ClipDistance",
        B::CullDistance => "gl_CullDistance",
        B::VertexId | B::VertexIndex => "gl_VertexID",
        B::InstanceId | B::InstanceIndex => "gl_InstanceID",
        B::PrimitiveId => "gl_PrimitiveID",
        B::InvocationId => "gl_InvocationID",
        B::Layer => "gl_Layer",
        B::ViewportIndex => "gl_ViewportIndex",
        B::TessLevelOuter => "gl_TessLevelOuter",
        B::TessLevelInner => "gl_TessLevelInner",
        B::TessCoord => "gl_TessCoord",
        B::PatchVertices => "gl_PatchVerticesIn",
        B::FragCoord => "gl_FragCoord",
        B::PointCoord => "gl_PointCoord",
        B::FrontFacing => "gl_FrontFacing",
        B::SampleId => "gl_SampleID",
        B::SamplePosition => "gl_SamplePosition",
        B::SampleMask => "gl_SampleMask",
        B::FragDepth => "gl_FragDepth",
        B::NumWorkgroups => "gl_NumWorkGroups",
        B::WorkgroupSize => "gl_WorkGroupSize",
        B::WorkgroupId => "gl_WorkGroupID",
        B::LocalInvocationId => "gl_LocalInvocationID",
        B::GlobalInvocationId => "gl_GlobalInvocationID",
        B::LocalInvocationIndex => "gl_LocalInvocationIndex",
        other => return format!("gl_{other:?}"),
    };
    name.to_owned()
}

/// GLSL spellings of the `GLSL.std.450` instructions; other dialects override a few.
pub fn glsl_std450_name(op: GLOp) -> Option<&'static str> {
    use GLOp as G;
    Some(match op {
        G::Round => "round",
        G::RoundEven => "roundEven",
        G::Trunc => "trunc",
        G::FAbs | G::SAbs => "abs",
        G::FSign | G::SSign => "sign",
        G::Floor => "floor",
        G::Ceil => "ceil",
        G::Fract => "fract",
        G::Radians => "radians",
        G::Degrees => "degrees",
        G::Sin => "sin",
        G::Cos => "cos",
        G::Tan => "tan",
        G::Asin => "asin",
        G::Acos => "acos",
        G::Atan => "atan",
        G::Sinh => "sinh",
        G::Cosh => "cosh",
        G::Tanh => "tanh",
        G::Atan2 => "atan",
        G::Pow => "pow",
        G::Exp => "exp",
        G::Log => "log",
        G::Exp2 => "exp2",
        G::Log2 => "log2",
        G::Sqrt => "sqrt",
        G::InverseSqrt => "inversesqrt",
        G::Determinant => "determinant",
        G::MatrixInverse => "inverse",
        G::FMin | G::UMin | G::SMin | G::NMin => "min",
        G::FMax | G::UMax | G::SMax | G::NMax => "max",
        G::FClamp | G::UClamp | G::SClamp | G::NClamp => "clamp",
        G::FMix => "mix",
        G::Step => "step",
        G::SmoothStep => "smoothstep",
        G::Fma => "fma",
        G::Length => "length",
        G::Distance => "distance",
        G::Cross => "cross",
        G::Normalize => "normalize",
        G::FaceForward => "faceforward",
        G::Reflect => "reflect",
        G::Refract => "refract",
        _ => return None,
    })
}
