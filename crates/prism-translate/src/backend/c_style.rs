//! Expression and statement forms shared by every C-like target.
//!
//! Most value-producing instructions do not write anything: they record an expression string
//! for their result id, and the expression is inlined wherever the id is used. Statements are
//! only written for stores, calls, returns, local declarations and the like.

use half::f16;
use prism_spirv::Instruction;
use spirv::{ExecutionMode, GLOp, ImageOperands, Op, StorageClass};
use tracing::warn;

use super::{Dialect, Product, TextureSample};
use crate::context::TranslationContext;
use crate::error::{DiagnosticKind, TranslateError};
use crate::symbols::{corrupt, operand, CompositeInsert, Constant, Symbols};
use crate::types::{component_name, Id, Scalar, TypeKind};

/// Handles one non-structural instruction the generic way.
pub fn handle<D: Dialect + ?Sized>(
    dialect: &D,
    ctx: &mut TranslationContext,
    inst: &Instruction,
) -> Result<(), TranslateError> {
    let Some(op) = inst.op() else {
        ctx.unsupported(inst);
        return Ok(());
    };
    match op {
        Op::Nop
        | Op::Source
        | Op::SourceContinued
        | Op::SourceExtension
        | Op::Extension
        | Op::Capability
        | Op::MemoryModel
        | Op::EntryPoint
        | Op::ExecutionMode
        | Op::String
        | Op::Name
        | Op::MemberName
        | Op::Decorate
        | Op::MemberDecorate
        | Op::DecorationGroup
        | Op::GroupDecorate
        | Op::GroupMemberDecorate
        | Op::ExtInstImport
        | Op::ModuleProcessed
        | Op::Line
        | Op::NoLine
        | Op::TypeVoid
        | Op::TypeBool
        | Op::TypeInt
        | Op::TypeFloat
        | Op::TypeVector
        | Op::TypeMatrix
        | Op::TypeImage
        | Op::TypeSampler
        | Op::TypeSampledImage
        | Op::TypeArray
        | Op::TypeRuntimeArray
        | Op::TypeStruct
        | Op::TypePointer
        | Op::TypeFunction
        | Op::Unreachable => Ok(()),

        Op::Constant
        | Op::SpecConstant
        | Op::ConstantTrue
        | Op::ConstantFalse
        | Op::SpecConstantTrue
        | Op::SpecConstantFalse
        | Op::ConstantComposite
        | Op::SpecConstantComposite
        | Op::ConstantNull => {
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            let text = constant_text(dialect, ctx, id)?;
            ctx.define(inst, ty, id, text)
        }
        Op::Undef => {
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            let text = zero_value(dialect, ctx, ty);
            ctx.define(inst, ty, id, text)
        }

        Op::Variable => local_variable(dialect, ctx, inst),
        Op::Function => {
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            let name = function_name(dialect, ctx, id);
            ctx.define(inst, ty, id, name)
        }
        Op::FunctionParameter => {
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            let name = local_name(dialect, ctx, id);
            ctx.define(inst, ty, id, name)
        }
        Op::FunctionCall => call(dialect, ctx, inst),
        Op::Return => {
            ctx.out.line().push_str("return;");
            Ok(())
        }
        Op::ReturnValue => {
            let value = ctx.operand_expr(inst, 0)?;
            ctx.out.line().push_str(&format!("return {value};"));
            Ok(())
        }
        Op::Kill | Op::TerminateInvocation => {
            ctx.out.line().push_str(dialect.kill());
            Ok(())
        }
        Op::EmitVertex | Op::EndPrimitive => match dialect.primitive_statements() {
            Some((emit, end)) => {
                let statement = if op == Op::EmitVertex { emit } else { end };
                ctx.out.line().push_str(statement);
                Ok(())
            }
            None => Err(TranslateError::BackendLimitation {
                backend: dialect.backend_name(),
                id: 0,
                opcode: inst.opcode,
                reason: "geometry stream output is not expressible".to_owned(),
            }),
        },

        Op::Load => {
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            let pointer = ctx.id(inst, 2)?;
            let text = ctx.expr(pointer);
            ctx.define(inst, ty, id, text)?;
            ctx.symbols.set_loaded_from(id, pointer);
            Ok(())
        }
        Op::Store => store(ctx, inst),
        Op::CopyObject => {
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            let text = ctx.operand_expr(inst, 2)?;
            ctx.define(inst, ty, id, text)
        }
        Op::AccessChain | Op::InBoundsAccessChain => access_chain(dialect, ctx, inst),

        Op::CompositeConstruct => {
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            let parts = id_operands(ctx, inst, 2)?
                .into_iter()
                .map(|part| ctx.expr(part))
                .collect::<Vec<_>>();
            let text = dialect.construct(&ctx.symbols, ty, &parts);
            ctx.define(inst, ty, id, text)
        }
        Op::CompositeExtract => composite_extract(ctx, inst),
        Op::CompositeInsert => composite_insert(dialect, ctx, inst),
        Op::VectorShuffle => vector_shuffle(dialect, ctx, inst),
        Op::VectorExtractDynamic => {
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            let vector = ctx.operand_expr(inst, 2)?;
            let index = ctx.operand_expr(inst, 3)?;
            ctx.define(inst, ty, id, format!("{vector}[{index}]"))
        }
        Op::Transpose => call_intrinsic(ctx, inst, "transpose"),
        Op::Dot => call_intrinsic(ctx, inst, "dot"),
        Op::Any => call_intrinsic(ctx, inst, "any"),
        Op::All => call_intrinsic(ctx, inst, "all"),
        Op::IsNan => call_intrinsic(ctx, inst, "isnan"),
        Op::IsInf => call_intrinsic(ctx, inst, "isinf"),

        Op::FMod => {
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            let lhs = ctx.operand_expr(inst, 2)?;
            let rhs = ctx.operand_expr(inst, 3)?;
            ctx.define(inst, ty, id, dialect.modulo(&lhs, &rhs))
        }
        Op::MatrixTimesVector | Op::VectorTimesMatrix | Op::MatrixTimesMatrix => {
            let product = match op {
                Op::MatrixTimesVector => Product::MatrixVector,
                Op::VectorTimesMatrix => Product::VectorMatrix,
                _ => Product::MatrixMatrix,
            };
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            let lhs = ctx.operand_expr(inst, 2)?;
            let rhs = ctx.operand_expr(inst, 3)?;
            ctx.define(inst, ty, id, dialect.matrix_product(product, &lhs, &rhs))
        }
        Op::FNegate | Op::SNegate => unary(ctx, inst, "-"),
        Op::Not => unary(ctx, inst, "~"),
        Op::LogicalNot => unary(ctx, inst, "!"),
        Op::Select => {
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            let condition = ctx.operand_expr(inst, 2)?;
            let on_true = ctx.operand_expr(inst, 3)?;
            let on_false = ctx.operand_expr(inst, 4)?;
            ctx.define(inst, ty, id, format!("({condition} ? {on_true} : {on_false})"))
        }
        Op::ConvertFToU
        | Op::ConvertFToS
        | Op::ConvertSToF
        | Op::ConvertUToF
        | Op::UConvert
        | Op::SConvert
        | Op::FConvert => {
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            let value = ctx.operand_expr(inst, 2)?;
            let text = dialect.cast(&ctx.symbols, ty, &value);
            ctx.define(inst, ty, id, text)
        }
        Op::Bitcast => {
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            let value_id = ctx.id(inst, 2)?;
            let from = ctx.symbols.value_type(value_id);
            let text = dialect.bitcast(&ctx.symbols, ty, from, &ctx.expr(value_id));
            ctx.define(inst, ty, id, text)
        }
        Op::DPdx
        | Op::DPdy
        | Op::Fwidth
        | Op::DPdxFine
        | Op::DPdyFine
        | Op::FwidthFine
        | Op::DPdxCoarse
        | Op::DPdyCoarse
        | Op::FwidthCoarse => match dialect.derivative(op) {
            Some(name) => call_intrinsic(ctx, inst, name),
            None => {
                ctx.unsupported(inst);
                Ok(())
            }
        },
        Op::ExtInst => ext_inst(dialect, ctx, inst),

        Op::SampledImage => {
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            let image = ctx.id(inst, 2)?;
            let sampler = ctx.id(inst, 3)?;
            let text = ctx.expr(image);
            ctx.define(inst, ty, id, text)?;
            ctx.symbols.set_sampled_image(id, image, sampler);
            Ok(())
        }
        Op::Image => {
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            let text = ctx.operand_expr(inst, 2)?;
            ctx.define(inst, ty, id, text)
        }
        Op::ImageSampleImplicitLod
        | Op::ImageSampleExplicitLod
        | Op::ImageSampleDrefImplicitLod
        | Op::ImageSampleDrefExplicitLod
        | Op::ImageSampleProjImplicitLod
        | Op::ImageSampleProjExplicitLod => image_sample(dialect, ctx, inst, op),

        _ => match binary_operator(op) {
            Some(operator) => binary(dialect, ctx, inst, operator),
            None => {
                ctx.unsupported(inst);
                Ok(())
            }
        },
    }
}

/// C operator for the plain binary opcodes.
fn binary_operator(op: Op) -> Option<&'static str> {
    Some(match op {
        Op::FAdd | Op::IAdd => "+",
        Op::FSub | Op::ISub => "-",
        Op::FMul | Op::IMul | Op::VectorTimesScalar | Op::MatrixTimesScalar => "*",
        Op::FDiv | Op::SDiv | Op::UDiv => "/",
        // `%` truncates, so its result takes the sign of the dividend; `binary` adjusts `SMod`.
        Op::SRem | Op::SMod | Op::UMod => "%",
        Op::ShiftLeftLogical => "<<",
        Op::ShiftRightLogical | Op::ShiftRightArithmetic => ">>",
        Op::BitwiseAnd => "&",
        Op::BitwiseOr => "|",
        Op::BitwiseXor => "^",
        Op::LogicalAnd => "&&",
        Op::LogicalOr => "||",
        Op::LogicalEqual | Op::IEqual | Op::FOrdEqual | Op::FUnordEqual => "==",
        Op::LogicalNotEqual | Op::INotEqual | Op::FOrdNotEqual | Op::FUnordNotEqual => "!=",
        Op::SLessThan | Op::ULessThan | Op::FOrdLessThan | Op::FUnordLessThan => "<",
        Op::SGreaterThan | Op::UGreaterThan | Op::FOrdGreaterThan | Op::FUnordGreaterThan => ">",
        Op::SLessThanEqual
        | Op::ULessThanEqual
        | Op::FOrdLessThanEqual
        | Op::FUnordLessThanEqual => "<=",
        Op::SGreaterThanEqual
        | Op::UGreaterThanEqual
        | Op::FOrdGreaterThanEqual
        | Op::FUnordGreaterThanEqual => ">=",
        _ => return None,
    })
}

fn is_comparison(operator: &str) -> bool {
    matches!(operator, "==" | "!=" | "<" | ">" | "<=" | ">=")
}

/// True for opcodes whose result is an inlined expression rather than a named entity.
pub fn is_expression(op: Op) -> bool {
    binary_operator(op).is_some()
        || matches!(
            op,
            Op::CompositeConstruct
                | Op::CompositeExtract
                | Op::VectorShuffle
                | Op::Dot
                | Op::FMod
                | Op::MatrixTimesVector
                | Op::VectorTimesMatrix
                | Op::MatrixTimesMatrix
                | Op::FNegate
                | Op::SNegate
                | Op::Select
                | Op::ExtInst
                | Op::ImageSampleImplicitLod
                | Op::ImageSampleExplicitLod
                | Op::ImageSampleDrefImplicitLod
                | Op::ImageSampleDrefExplicitLod
                | Op::ConvertFToS
                | Op::ConvertSToF
                | Op::ConvertFToU
                | Op::ConvertUToF
        )
}

fn id_operands(
    ctx: &TranslationContext,
    inst: &Instruction,
    start: usize,
) -> Result<Vec<Id>, TranslateError> {
    inst.operands
        .get(start..)
        .unwrap_or(&[])
        .iter()
        .map(|&id| ctx.symbols.check_id(inst, id))
        .collect()
}

fn unary(
    ctx: &mut TranslationContext,
    inst: &Instruction,
    operator: &str,
) -> Result<(), TranslateError> {
    let ty = operand(inst, 0)?;
    let id = ctx.id(inst, 1)?;
    let value = ctx.operand_expr(inst, 2)?;
    ctx.define(inst, ty, id, format!("({operator}{value})"))
}

fn binary<D: Dialect + ?Sized>(
    dialect: &D,
    ctx: &mut TranslationContext,
    inst: &Instruction,
    operator: &'static str,
) -> Result<(), TranslateError> {
    let ty = operand(inst, 0)?;
    let id = ctx.id(inst, 1)?;
    let lhs_id = ctx.id(inst, 2)?;
    let lhs = ctx.expr(lhs_id);
    let rhs = ctx.operand_expr(inst, 3)?;
    let lhs_ty = ctx.symbols.value_type(lhs_id);
    let vector_operands = matches!(ctx.symbols.type_kind(lhs_ty), TypeKind::Vector { .. });
    let signed_lhs = match ctx.symbols.scalar(lhs_ty) {
        Some(Scalar::Int { signed, .. }) => Some(signed),
        _ => None,
    };
    let text = match (inst.op(), signed_lhs) {
        _ if is_comparison(operator) && vector_operands => {
            dialect.vector_comparison(operator, &lhs, &rhs)
        }
        // Floored: the result takes the sign of the divisor.
        (Some(Op::SMod), _) => format!("((({lhs} % {rhs}) + {rhs}) % {rhs})"),
        // `>>` shifts in the sign bit of signed operands only.
        (Some(Op::ShiftRightLogical), Some(true))
        | (Some(Op::ShiftRightArithmetic), Some(false)) => {
            let flipped = dialect.int_type_name(&ctx.symbols, lhs_ty, signed_lhs == Some(false));
            dialect.cast(&ctx.symbols, ty, &format!("{flipped}({lhs}) >> {rhs}"))
        }
        _ => format!("({lhs} {operator} {rhs})"),
    };
    ctx.define(inst, ty, id, text)
}

/// `name(operands...)` over every id operand after the result id.
fn call_intrinsic(
    ctx: &mut TranslationContext,
    inst: &Instruction,
    name: &str,
) -> Result<(), TranslateError> {
    let ty = operand(inst, 0)?;
    let id = ctx.id(inst, 1)?;
    let args = id_operands(ctx, inst, 2)?
        .into_iter()
        .map(|arg| ctx.expr(arg))
        .collect::<Vec<_>>()
        .join(", ");
    ctx.define(inst, ty, id, format!("{name}({args})"))
}

// -------------------------------------------------------------------------
// Constants
// -------------------------------------------------------------------------

/// Float literal text from raw bits; always contains a decimal point.
pub fn float_literal(bits: u64, width: u32) -> String {
    let value = match width {
        64 => f64::from_bits(bits),
        16 => f64::from(f16::from_bits(bits as u16)),
        _ => f64::from(f32::from_bits(bits as u32)),
    };
    if value.is_nan() {
        return "(0.0 / 0.0)".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 {
            "(1.0 / 0.0)".to_owned()
        } else {
            "(-1.0 / 0.0)".to_owned()
        };
    }
    let mut text = if width == 64 {
        value.to_string()
    } else {
        (value as f32).to_string()
    };
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}

fn constant_text<D: Dialect + ?Sized>(
    dialect: &D,
    ctx: &TranslationContext,
    id: Id,
) -> Result<String, TranslateError> {
    let Some(constant) = ctx.symbols.constant(id) else {
        return Ok(ctx.expr(id));
    };
    Ok(match constant {
        Constant::Bool(value) => value.to_string(),
        Constant::Scalar { ty, bits } => match ctx.symbols.scalar(*ty) {
            Some(Scalar::Float { width }) => float_literal(*bits, width),
            Some(Scalar::Int {
                width: 64,
                signed: true,
            }) => (*bits as i64).to_string(),
            Some(Scalar::Int { signed: true, .. }) => (*bits as u32 as i32).to_string(),
            Some(Scalar::Int { width: 64, .. }) => format!("{bits}u"),
            Some(Scalar::Int { .. }) => format!("{}u", *bits as u32),
            Some(Scalar::Bool) => (*bits != 0).to_string(),
            None => bits.to_string(),
        },
        Constant::Composite { ty, parts } => {
            let parts = parts.iter().map(|&part| ctx.expr(part)).collect::<Vec<_>>();
            dialect.construct(&ctx.symbols, *ty, &parts)
        }
        Constant::Null { ty } => zero_value(dialect, ctx, *ty),
    })
}

/// Zero-initialised value of `ty`, spelled out component by component.
pub fn zero_value<D: Dialect + ?Sized>(dialect: &D, ctx: &TranslationContext, ty: Id) -> String {
    let symbols = &ctx.symbols;
    match symbols.type_kind(ty) {
        TypeKind::Scalar(Scalar::Bool) => "false".to_owned(),
        TypeKind::Scalar(Scalar::Int { signed: true, .. }) => "0".to_owned(),
        TypeKind::Scalar(Scalar::Int { .. }) => "0u".to_owned(),
        TypeKind::Scalar(Scalar::Float { .. }) => "0.0".to_owned(),
        TypeKind::Vector { component, count } => {
            let zero = zero_value(dialect, ctx, *component);
            dialect.construct(symbols, ty, &vec![zero; *count as usize])
        }
        TypeKind::Matrix { column, columns } => {
            let zero = zero_value(dialect, ctx, *column);
            dialect.construct(symbols, ty, &vec![zero; *columns as usize])
        }
        TypeKind::Array {
            element,
            length: Some(length),
        } => {
            let zero = zero_value(dialect, ctx, *element);
            dialect.construct(symbols, ty, &vec![zero; *length as usize])
        }
        TypeKind::Struct { members } => {
            let parts = members
                .iter()
                .map(|&member| zero_value(dialect, ctx, member))
                .collect::<Vec<_>>();
            dialect.construct(symbols, ty, &parts)
        }
        _ => "0".to_owned(),
    }
}

// -------------------------------------------------------------------------
// Names, variables, calls
// -------------------------------------------------------------------------

/// Emitted name of a function; the entry point gets the dialect's entry name.
pub fn function_name<D: Dialect + ?Sized>(dialect: &D, ctx: &TranslationContext, id: Id) -> String {
    if id == ctx.entry {
        return dialect.entry_name(ctx.stage);
    }
    let name = ctx.symbols.display_name(id);
    if dialect.is_reserved(&name) || name == dialect.entry_name(ctx.stage) {
        format!("_{name}")
    } else {
        name
    }
}

/// A parameter or local name unique within the current function.
pub fn local_name<D: Dialect + ?Sized>(
    dialect: &D,
    ctx: &mut TranslationContext,
    id: Id,
) -> String {
    let mut name = ctx.symbols.display_name(id);
    if dialect.is_reserved(&name) {
        name = format!("_{name}");
    }
    if let Some(function) = ctx.function.as_mut() {
        if !function.local_names.insert(name.clone()) {
            name = format!("{name}_{id}");
            function.local_names.insert(name.clone());
        }
    }
    name
}

/// `ret name(T a, T b)` for the current function. Pointer parameters are passed by value.
pub fn function_signature<D: Dialect + ?Sized>(dialect: &D, ctx: &TranslationContext) -> String {
    let Some(function) = ctx.current_function() else {
        return String::new();
    };
    let result = dialect.type_name(&ctx.symbols, function.result_type);
    let name = function_name(dialect, ctx, function.id);
    let parameters = function
        .parameters
        .iter()
        .map(|&(id, ty)| dialect.declare(&ctx.symbols, ctx.symbols.deref(ty), &ctx.expr(id)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{result} {name}({parameters})")
}

fn local_variable<D: Dialect + ?Sized>(
    dialect: &D,
    ctx: &mut TranslationContext,
    inst: &Instruction,
) -> Result<(), TranslateError> {
    let ty = operand(inst, 0)?;
    let id = ctx.id(inst, 1)?;
    if operand(inst, 2)? != StorageClass::Function as u32 {
        // Module-scope variables are declared by each backend's declaration phase.
        return Ok(());
    }
    let pointee = ctx.symbols.deref(ty);
    let initializer = match inst.operand(3) {
        Some(init) => Some(ctx.expr(ctx.symbols.check_id(inst, init)?)),
        None => None,
    };
    if ctx.symbols.name(id) == Some("param") {
        // Call argument temporaries: stores rebind them instead of emitting statements.
        ctx.aliases.insert(id);
        let text = initializer.unwrap_or_else(|| zero_value(dialect, ctx, pointee));
        return ctx.define(inst, ty, id, text);
    }
    let name = local_name(dialect, ctx, id);
    let declaration = dialect.declare(&ctx.symbols, pointee, &name);
    let line = ctx.out.line();
    line.push_str(&declaration);
    if let Some(initializer) = initializer {
        line.push_str(" = ");
        line.push_str(&initializer);
    }
    line.push(';');
    ctx.define(inst, ty, id, name)
}

fn call<D: Dialect + ?Sized>(
    dialect: &D,
    ctx: &mut TranslationContext,
    inst: &Instruction,
) -> Result<(), TranslateError> {
    let ty = operand(inst, 0)?;
    let id = ctx.id(inst, 1)?;
    let function = ctx.id(inst, 2)?;
    let name = function_name(dialect, ctx, function);
    let args = id_operands(ctx, inst, 3)?
        .into_iter()
        .map(|arg| ctx.expr(arg))
        .collect::<Vec<_>>()
        .join(", ");
    if matches!(ctx.symbols.type_kind(ty), TypeKind::Void) {
        ctx.out.line().push_str(&format!("{name}({args});"));
        return ctx.define(inst, ty, id, String::new());
    }
    let temporary = format!("_{id}");
    let declaration = dialect.declare(&ctx.symbols, ty, &temporary);
    ctx.out
        .line()
        .push_str(&format!("{declaration} = {name}({args});"));
    ctx.define(inst, ty, id, temporary)
}

fn store(ctx: &mut TranslationContext, inst: &Instruction) -> Result<(), TranslateError> {
    let pointer = ctx.id(inst, 0)?;
    let value = ctx.id(inst, 1)?;
    if ctx.aliases.contains(&pointer) {
        let text = ctx.expr(value);
        ctx.symbols.rebind(pointer, text);
        return Ok(());
    }
    let target = ctx.expr(pointer);
    let statement = match ctx.symbols.composite_insert(value) {
        Some(insert) if insert.pointer == pointer => {
            format!("{target}{} = {};", insert.path, ctx.expr(insert.object))
        }
        _ => format!("{target} = {};", ctx.expr(value)),
    };
    ctx.out.line().push_str(&statement);
    Ok(())
}

/// Materialises the current result in a named temporary, for backends that cap inline
/// expression length.
pub fn materialize<D: Dialect + ?Sized>(
    dialect: &D,
    ctx: &mut TranslationContext,
    inst: &Instruction,
) -> Result<(), TranslateError> {
    let ty = operand(inst, 0)?;
    let id = ctx.id(inst, 1)?;
    let temporary = format!("_{id}");
    let value = ctx.expr(id);
    // Carried results are already declared at the top of the function.
    let declaration = if ctx.flow.carries(id) {
        temporary.clone()
    } else {
        dialect.declare(&ctx.symbols, ty, &temporary)
    };
    ctx.out
        .line()
        .push_str(&format!("{declaration} = {value};"));
    ctx.symbols.rebind(id, temporary);
    Ok(())
}

/// `struct Name {\n\tT member;\n};\n` for a struct type.
pub fn struct_definition<D: Dialect + ?Sized>(dialect: &D, symbols: &Symbols, ty: Id) -> String {
    let mut text = format!("struct {} {{\n", dialect.type_name(symbols, ty));
    text.push_str(&struct_members(dialect, symbols, ty, 1));
    text.push_str("};\n");
    text
}

/// One `T member;` line per struct member at the given indentation depth.
pub fn struct_members<D: Dialect + ?Sized>(
    dialect: &D,
    symbols: &Symbols,
    ty: Id,
    indentation: usize,
) -> String {
    let TypeKind::Struct { members } = symbols.type_kind(ty) else {
        return String::new();
    };
    let mut text = String::new();
    for (index, &member) in members.iter().enumerate() {
        let name = symbols.member_name(ty, index as u32);
        text.push_str(&"\t".repeat(indentation));
        text.push_str(&dialect.declare(symbols, member, &name));
        text.push_str(";\n");
    }
    text
}

/// Records an `OpExecutionMode` the backend cannot honour as a diagnostic. Origin and depth
/// modes only describe conventions every target already follows and pass silently.
pub fn note_execution_mode(
    ctx: &mut TranslationContext,
    inst: &Instruction,
    supported: &[ExecutionMode],
) -> Result<(), TranslateError> {
    let raw = operand(inst, 1)?;
    let mode = ExecutionMode::from_u32(raw);
    let silent = matches!(
        mode,
        Some(
            ExecutionMode::OriginUpperLeft
                | ExecutionMode::OriginLowerLeft
                | ExecutionMode::PixelCenterInteger
                | ExecutionMode::DepthReplacing
                | ExecutionMode::DepthGreater
                | ExecutionMode::DepthLess
                | ExecutionMode::DepthUnchanged
        )
    );
    if silent || mode.is_some_and(|mode| supported.contains(&mode)) {
        return Ok(());
    }
    warn!(mode = raw, "ignoring execution mode");
    ctx.diagnose(inst, DiagnosticKind::IgnoredExecutionMode(raw));
    Ok(())
}

// -------------------------------------------------------------------------
// Composite addressing
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Index {
    Literal(u32),
    Id(Id),
}

/// One addressing step into a value of type `ty`: the path suffix and the addressed type.
fn step(
    ctx: &TranslationContext,
    inst: &Instruction,
    ty: Id,
    index: Index,
) -> Result<(String, Id), TranslateError> {
    let constant = match index {
        Index::Literal(value) => Some(value),
        Index::Id(id) => ctx.symbols.constant_u32(id),
    };
    let dynamic = |fallback: u32| match index {
        Index::Id(id) => ctx.expr(id),
        Index::Literal(_) => fallback.to_string(),
    };
    match ctx.symbols.type_kind(ty) {
        TypeKind::Vector { component, .. } => match constant {
            Some(value) => {
                let letter = component_name(value).ok_or_else(|| {
                    corrupt(inst, ty, format!("vector component {value} out of range"))
                })?;
                Ok((format!(".{letter}"), *component))
            }
            None => Ok((format!("[{}]", dynamic(0)), *component)),
        },
        TypeKind::Matrix { column, .. } => Ok((
            format!("[{}]", constant.map_or_else(|| dynamic(0), |v| v.to_string())),
            *column,
        )),
        TypeKind::Array { element, .. } => Ok((
            format!("[{}]", constant.map_or_else(|| dynamic(0), |v| v.to_string())),
            *element,
        )),
        TypeKind::Struct { members } => {
            let value = constant
                .ok_or_else(|| corrupt(inst, ty, "struct member index is not a constant"))?;
            let member = members.get(value as usize).copied().ok_or_else(|| {
                corrupt(inst, ty, format!("struct member {value} out of range"))
            })?;
            Ok((format!(".{}", ctx.symbols.member_name(ty, value)), member))
        }
        TypeKind::Unknown => Ok((
            format!("[{}]", constant.map_or_else(|| dynamic(0), |v| v.to_string())),
            0,
        )),
        _ => Err(corrupt(inst, ty, "indexing into a non-composite type")),
    }
}

fn path(
    ctx: &TranslationContext,
    inst: &Instruction,
    mut ty: Id,
    indices: impl IntoIterator<Item = Index>,
) -> Result<(String, Id), TranslateError> {
    let mut text = String::new();
    for index in indices {
        let (suffix, next) = step(ctx, inst, ty, index)?;
        text.push_str(&suffix);
        ty = next;
    }
    Ok((text, ty))
}

fn access_chain<D: Dialect + ?Sized>(
    dialect: &D,
    ctx: &mut TranslationContext,
    inst: &Instruction,
) -> Result<(), TranslateError> {
    let ty = operand(inst, 0)?;
    let id = ctx.id(inst, 1)?;
    let base = ctx.id(inst, 2)?;
    let indices = id_operands(ctx, inst, 3)?;

    let variable = ctx.symbols.variable(base).cloned();
    let mut current = match &variable {
        Some(var) => var.ty,
        None => ctx.symbols.deref(ctx.symbols.value_type(base)),
    };
    let mut text = ctx.expr(base);
    let mut rest = indices.as_slice();

    if let (Some(var), Some((&first, tail))) = (&variable, indices.split_first()) {
        let is_struct = ctx.symbols.type_kind(var.ty).is_struct();
        if is_struct && (var.flattened || ctx.symbols.is_builtin_block(var.ty)) {
            let index = ctx.symbols.constant_u32(first).ok_or_else(|| {
                corrupt(inst, first, "block member index is not a constant")
            })?;
            let member = ctx.symbols.member(var.ty, index);
            text = match (member.builtin, var.storage) {
                (Some(builtin), Some(storage)) => dialect.builtin_name(builtin, storage),
                _ => ctx.symbols.member_name(var.ty, index),
            };
            current = member.ty;
            rest = tail;
        }
    }

    let (suffix, _) = path(ctx, inst, current, rest.iter().map(|&index| Index::Id(index)))?;
    text.push_str(&suffix);
    ctx.define(inst, ty, id, text)
}

fn composite_extract(
    ctx: &mut TranslationContext,
    inst: &Instruction,
) -> Result<(), TranslateError> {
    let ty = operand(inst, 0)?;
    let id = ctx.id(inst, 1)?;
    let composite = ctx.id(inst, 2)?;
    let base_ty = ctx.symbols.value_type(composite);
    let indices = inst.operands.get(3..).unwrap_or(&[]);
    let (suffix, _) = path(ctx, inst, base_ty, indices.iter().map(|&i| Index::Literal(i)))?;
    let text = format!("{}{suffix}", ctx.expr(composite));
    ctx.define(inst, ty, id, text)
}

fn composite_insert<D: Dialect + ?Sized>(
    dialect: &D,
    ctx: &mut TranslationContext,
    inst: &Instruction,
) -> Result<(), TranslateError> {
    let ty = operand(inst, 0)?;
    let id = ctx.id(inst, 1)?;
    let object = ctx.id(inst, 2)?;
    let composite = ctx.id(inst, 3)?;
    let indices = inst.operands.get(4..).unwrap_or(&[]);
    let (suffix, _) = path(ctx, inst, ty, indices.iter().map(|&i| Index::Literal(i)))?;

    if let Some(pointer) = ctx.symbols.loaded_from(composite) {
        let text = ctx.expr(composite);
        ctx.define(inst, ty, id, text)?;
        ctx.symbols.set_loaded_from(id, pointer);
        ctx.symbols.set_composite_insert(
            id,
            CompositeInsert {
                pointer,
                path: suffix,
                object,
            },
        );
        return Ok(());
    }

    let temporary = format!("_{id}");
    let declaration = dialect.declare(&ctx.symbols, ty, &temporary);
    let base = ctx.expr(composite);
    let value = ctx.expr(object);
    ctx.out.line().push_str(&format!("{declaration} = {base};"));
    ctx.out
        .line()
        .push_str(&format!("{temporary}{suffix} = {value};"));
    ctx.define(inst, ty, id, temporary)
}

fn vector_shuffle<D: Dialect + ?Sized>(
    dialect: &D,
    ctx: &mut TranslationContext,
    inst: &Instruction,
) -> Result<(), TranslateError> {
    let ty = operand(inst, 0)?;
    let id = ctx.id(inst, 1)?;
    let first = ctx.id(inst, 2)?;
    let second = ctx.id(inst, 3)?;
    // 0xFFFFFFFF marks an undefined component; any valid lane will do.
    let components = inst
        .operands
        .get(4..)
        .unwrap_or(&[])
        .iter()
        .map(|&c| if c == u32::MAX { 0 } else { c })
        .collect::<Vec<_>>();
    let first_len = ctx
        .symbols
        .type_kind(ctx.symbols.value_type(first))
        .length();

    let letter = |index: u32| {
        component_name(index)
            .ok_or_else(|| corrupt(inst, id, format!("shuffle component {index} out of range")))
    };

    let text = if components.iter().all(|&c| c < first_len) {
        let swizzle = components
            .iter()
            .map(|&c| letter(c))
            .collect::<Result<String, _>>()?;
        format!("{}.{swizzle}", ctx.expr(first))
    } else if components.iter().all(|&c| c >= first_len) {
        let swizzle = components
            .iter()
            .map(|&c| letter(c - first_len))
            .collect::<Result<String, _>>()?;
        format!("{}.{swizzle}", ctx.expr(second))
    } else {
        let parts = components
            .iter()
            .map(|&c| {
                if c < first_len {
                    Ok(format!("{}.{}", ctx.expr(first), letter(c)?))
                } else {
                    Ok(format!("{}.{}", ctx.expr(second), letter(c - first_len)?))
                }
            })
            .collect::<Result<Vec<_>, TranslateError>>()?;
        dialect.construct(&ctx.symbols, ty, &parts)
    };
    ctx.define(inst, ty, id, text)
}

// -------------------------------------------------------------------------
// Extended instructions and sampling
// -------------------------------------------------------------------------

fn ext_inst<D: Dialect + ?Sized>(
    dialect: &D,
    ctx: &mut TranslationContext,
    inst: &Instruction,
) -> Result<(), TranslateError> {
    let ty = operand(inst, 0)?;
    let id = ctx.id(inst, 1)?;
    let set = ctx.id(inst, 2)?;
    let number = operand(inst, 3)?;
    let name = match ctx.symbols.ext_set(set) {
        Some("GLSL.std.450") => GLOp::from_u32(number).and_then(|op| dialect.ext_inst_name(op)),
        _ => None,
    };
    let Some(name) = name else {
        ctx.diagnose(inst, DiagnosticKind::UnsupportedExtendedInstruction(number));
        ctx.out
            .line()
            .push_str(&format!("// Unknown GLSL instruction {number}"));
        let placeholder = zero_value(dialect, ctx, ty);
        return ctx.define(inst, ty, id, placeholder);
    };
    let args = id_operands(ctx, inst, 4)?
        .into_iter()
        .map(|arg| ctx.expr(arg))
        .collect::<Vec<_>>()
        .join(", ");
    ctx.define(inst, ty, id, format!("{name}({args})"))
}

fn image_sample<D: Dialect + ?Sized>(
    dialect: &D,
    ctx: &mut TranslationContext,
    inst: &Instruction,
    op: Op,
) -> Result<(), TranslateError> {
    let ty = operand(inst, 0)?;
    let id = ctx.id(inst, 1)?;
    let sampled_image = ctx.id(inst, 2)?;
    let coordinate = ctx.operand_expr(inst, 3)?;
    let has_dref = matches!(
        op,
        Op::ImageSampleDrefImplicitLod | Op::ImageSampleDrefExplicitLod
    );
    let mut next = 4;
    let depth_reference = if has_dref {
        next += 1;
        Some(ctx.operand_expr(inst, 4)?)
    } else {
        None
    };

    let image_type = ctx.symbols.value_type(sampled_image);
    let (dim, flags) = ctx.symbols.image_info(image_type).ok_or_else(|| {
        corrupt(inst, sampled_image, "sampling a value that is not an image")
    })?;
    let sampler = ctx
        .symbols
        .sampled_image(sampled_image)
        .map(|(_, sampler)| ctx.expr(sampler));

    let mut sample = TextureSample {
        result_type: ty,
        image: ctx.expr(sampled_image),
        sampler,
        coordinate,
        dim,
        flags,
        depth_reference,
        bias: None,
        lod: None,
        gradient: None,
        offset: None,
        projective: matches!(
            op,
            Op::ImageSampleProjImplicitLod | Op::ImageSampleProjExplicitLod
        ),
    };

    if let Some(mask) = inst.operand(next) {
        let mask = ImageOperands::from_bits_truncate(mask);
        let mut cursor = next + 1;
        let mut take = |ctx: &TranslationContext| -> Result<String, TranslateError> {
            let text = ctx.operand_expr(inst, cursor)?;
            cursor += 1;
            Ok(text)
        };
        if mask.contains(ImageOperands::BIAS) {
            sample.bias = Some(take(ctx)?);
        }
        if mask.contains(ImageOperands::LOD) {
            sample.lod = Some(take(ctx)?);
        }
        if mask.contains(ImageOperands::GRAD) {
            let dx = take(ctx)?;
            let dy = take(ctx)?;
            sample.gradient = Some((dx, dy));
        }
        if mask.contains(ImageOperands::CONST_OFFSET) {
            sample.offset = Some(take(ctx)?);
        }
        if mask.contains(ImageOperands::OFFSET) {
            sample.offset = Some(take(ctx)?);
        }
    }

    let text = dialect
        .sample(&ctx.symbols, &sample)
        .map_err(|reason| TranslateError::BackendLimitation {
            backend: dialect.backend_name(),
            id,
            opcode: inst.opcode,
            reason,
        })?;
    ctx.define(inst, ty, id, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_literals_always_have_a_decimal_point() {
        assert_eq!(float_literal(u64::from(2.0f32.to_bits()), 32), "2.0");
        assert_eq!(float_literal(u64::from(0.5f32.to_bits()), 32), "0.5");
        assert_eq!(float_literal(u64::from((-3.0f32).to_bits()), 32), "-3.0");
        assert_eq!(float_literal(1.25f64.to_bits(), 64), "1.25");
        assert_eq!(float_literal(u64::from(f32::NAN.to_bits()), 32), "(0.0 / 0.0)");
        assert_eq!(float_literal(u64::from(f32::INFINITY.to_bits()), 32), "(1.0 / 0.0)");
    }

    #[test]
    fn half_literals_decode_sixteen_bit_patterns() {
        assert_eq!(float_literal(u64::from(f16::from_f32(1.5).to_bits()), 16), "1.5");
        assert_eq!(float_literal(u64::from(f16::from_f32(-0.25).to_bits()), 16), "-0.25");
        assert_eq!(float_literal(0x3c00, 16), "1.0");
        assert_eq!(float_literal(u64::from(f16::INFINITY.to_bits()), 16), "(1.0 / 0.0)");
        assert_eq!(float_literal(u64::from(f16::NAN.to_bits()), 16), "(0.0 / 0.0)");
    }

    #[test]
    fn comparisons_are_recognized() {
        assert_eq!(binary_operator(Op::FOrdLessThan), Some("<"));
        assert!(is_comparison("<="));
        assert!(!is_comparison("+"));
        assert!(is_expression(Op::FAdd));
        assert!(!is_expression(Op::Load));
    }
}
