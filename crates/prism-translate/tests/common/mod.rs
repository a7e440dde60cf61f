//! Small hand-assembled modules shaped like front-end compiler output.

#![allow(dead_code)]

use prism_spirv::spirv::{BuiltIn, Decoration, Dim, ExecutionMode, ExecutionModel, Op, StorageClass};
use prism_spirv::test_utils::{f32_bits, ModuleBuilder};

pub const INPUT: u32 = StorageClass::Input as u32;
pub const OUTPUT: u32 = StorageClass::Output as u32;
pub const UNIFORM: u32 = StorageClass::Uniform as u32;
pub const UNIFORM_CONSTANT: u32 = StorageClass::UniformConstant as u32;
pub const FUNCTION: u32 = StorageClass::Function as u32;

/// Routes the translator's `tracing` output through the test harness's captured stdout.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Capability, GLSL.std.450 import (id 1) and memory model.
pub fn preamble(b: &mut ModuleBuilder) {
    b.inst(Op::Capability, &[1]);
    b.inst_with_string(Op::ExtInstImport, &[1], "GLSL.std.450", &[]);
    b.inst(Op::MemoryModel, &[0, 1]);
}

pub fn name(b: &mut ModuleBuilder, id: u32, name: &str) {
    b.inst_with_string(Op::Name, &[id], name, &[]);
}

pub fn decorate(b: &mut ModuleBuilder, id: u32, decoration: Decoration, literals: &[u32]) {
    let mut operands = vec![id, decoration as u32];
    operands.extend_from_slice(literals);
    b.inst(Op::Decorate, &operands);
}

/// `main` (id 4) returning void: `%2 = OpTypeVoid`, `%3 = OpTypeFunction %2`.
pub fn void_function_types(b: &mut ModuleBuilder) {
    b.inst(Op::TypeVoid, &[2]);
    b.inst(Op::TypeFunction, &[3, 2]);
}

pub fn begin_main(b: &mut ModuleBuilder) {
    b.inst(Op::Function, &[2, 4, 0, 3]);
    b.inst(Op::Label, &[5]);
}

pub fn end_main(b: &mut ModuleBuilder) {
    b.inst(Op::Return, &[]);
    b.inst(Op::FunctionEnd, &[]);
}

/// Fragment shader writing `vec4(uv_coord, 0.0, 1.0)` to its only output.
///
/// ```text
/// in vec2 uv_coord;
/// out vec4 fragColor;
/// void main() { fragColor = vec4(uv_coord, 0.0, 1.0); }
/// ```
pub fn uv_fragment() -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    preamble(&mut b);
    b.inst_with_string(
        Op::EntryPoint,
        &[ExecutionModel::Fragment as u32, 4],
        "main",
        &[9, 12],
    );
    b.inst(Op::ExecutionMode, &[4, ExecutionMode::OriginUpperLeft as u32]);
    name(&mut b, 4, "main");
    name(&mut b, 9, "fragColor");
    name(&mut b, 12, "uv_coord");
    decorate(&mut b, 9, Decoration::Location, &[0]);
    decorate(&mut b, 12, Decoration::Location, &[0]);
    void_function_types(&mut b);
    b.inst(Op::TypeFloat, &[6, 32]);
    b.inst(Op::TypeVector, &[7, 6, 4]);
    b.inst(Op::TypePointer, &[8, OUTPUT, 7]);
    b.inst(Op::Variable, &[8, 9, OUTPUT]);
    b.inst(Op::TypeVector, &[10, 6, 2]);
    b.inst(Op::TypePointer, &[11, INPUT, 10]);
    b.inst(Op::Variable, &[11, 12, INPUT]);
    b.inst(Op::Constant, &[6, 14, f32_bits(0.0)]);
    b.inst(Op::Constant, &[6, 15, f32_bits(1.0)]);
    begin_main(&mut b);
    b.inst(Op::Load, &[10, 13, 12]);
    b.inst(Op::CompositeConstruct, &[7, 16, 13, 14, 15]);
    b.inst(Op::Store, &[9, 16]);
    end_main(&mut b);
    b.to_bytes()
}

/// Vertex shader transforming its position by a matrix in a uniform block.
///
/// ```text
/// layout(binding = 0) uniform Matrices { mat4 mvp; } matrices;
/// layout(location = 0) in vec4 position;
/// void main() { gl_Position = matrices.mvp * position; }
/// ```
pub fn mvp_vertex() -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    preamble(&mut b);
    b.inst_with_string(
        Op::EntryPoint,
        &[ExecutionModel::Vertex as u32, 4],
        "main",
        &[13, 18],
    );
    name(&mut b, 4, "main");
    name(&mut b, 11, "gl_PerVertex");
    b.inst_with_string(Op::MemberName, &[11, 0], "gl_Position", &[]);
    name(&mut b, 15, "Matrices");
    b.inst_with_string(Op::MemberName, &[15, 0], "mvp", &[]);
    name(&mut b, 17, "matrices");
    name(&mut b, 18, "position");
    b.inst(
        Op::MemberDecorate,
        &[11, 0, Decoration::BuiltIn as u32, BuiltIn::Position as u32],
    );
    decorate(&mut b, 11, Decoration::Block, &[]);
    b.inst(Op::MemberDecorate, &[15, 0, Decoration::ColMajor as u32]);
    b.inst(Op::MemberDecorate, &[15, 0, Decoration::Offset as u32, 0]);
    b.inst(Op::MemberDecorate, &[15, 0, Decoration::MatrixStride as u32, 16]);
    decorate(&mut b, 15, Decoration::Block, &[]);
    decorate(&mut b, 17, Decoration::DescriptorSet, &[0]);
    decorate(&mut b, 17, Decoration::Binding, &[0]);
    decorate(&mut b, 18, Decoration::Location, &[0]);
    void_function_types(&mut b);
    b.inst(Op::TypeFloat, &[6, 32]);
    b.inst(Op::TypeVector, &[7, 6, 4]);
    b.inst(Op::TypeStruct, &[11, 7]);
    b.inst(Op::TypePointer, &[12, OUTPUT, 11]);
    b.inst(Op::Variable, &[12, 13, OUTPUT]);
    b.inst(Op::TypeInt, &[19, 32, 1]);
    b.inst(Op::Constant, &[19, 20, 0]);
    b.inst(Op::TypeMatrix, &[8, 7, 4]);
    b.inst(Op::TypeStruct, &[15, 8]);
    b.inst(Op::TypePointer, &[16, UNIFORM, 15]);
    b.inst(Op::Variable, &[16, 17, UNIFORM]);
    b.inst(Op::TypePointer, &[21, UNIFORM, 8]);
    b.inst(Op::TypePointer, &[23, INPUT, 7]);
    b.inst(Op::Variable, &[23, 18, INPUT]);
    b.inst(Op::TypePointer, &[24, OUTPUT, 7]);
    begin_main(&mut b);
    b.inst(Op::AccessChain, &[21, 25, 17, 20]);
    b.inst(Op::Load, &[8, 26, 25]);
    b.inst(Op::Load, &[7, 27, 18]);
    b.inst(Op::MatrixTimesVector, &[7, 28, 26, 27]);
    b.inst(Op::AccessChain, &[24, 29, 13, 20]);
    b.inst(Op::Store, &[29, 28]);
    end_main(&mut b);
    b.to_bytes()
}

/// Vertex shader whose only input is a `float[4294967295]` attribute at location 0.
pub fn oversized_attribute_vertex() -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    preamble(&mut b);
    b.inst_with_string(
        Op::EntryPoint,
        &[ExecutionModel::Vertex as u32, 4],
        "main",
        &[12],
    );
    name(&mut b, 4, "main");
    name(&mut b, 12, "weights");
    decorate(&mut b, 12, Decoration::Location, &[0]);
    void_function_types(&mut b);
    b.inst(Op::TypeFloat, &[6, 32]);
    b.inst(Op::TypeInt, &[7, 32, 0]);
    b.inst(Op::Constant, &[7, 8, u32::MAX]);
    b.inst(Op::TypeArray, &[10, 6, 8]);
    b.inst(Op::TypePointer, &[11, INPUT, 10]);
    b.inst(Op::Variable, &[11, 12, INPUT]);
    begin_main(&mut b);
    end_main(&mut b);
    b.to_bytes()
}

/// Fragment shader sampling a combined 2D texture/sampler at its varying coordinate.
///
/// ```text
/// layout(binding = 3) uniform sampler2D tex;
/// in vec2 uv;
/// out vec4 color;
/// void main() { color = texture(tex, uv); }
/// ```
pub fn textured_fragment() -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    preamble(&mut b);
    b.inst_with_string(
        Op::EntryPoint,
        &[ExecutionModel::Fragment as u32, 4],
        "main",
        &[9, 12],
    );
    b.inst(Op::ExecutionMode, &[4, ExecutionMode::OriginUpperLeft as u32]);
    name(&mut b, 4, "main");
    name(&mut b, 9, "color");
    name(&mut b, 12, "uv");
    name(&mut b, 20, "tex");
    decorate(&mut b, 9, Decoration::Location, &[0]);
    decorate(&mut b, 12, Decoration::Location, &[0]);
    decorate(&mut b, 20, Decoration::DescriptorSet, &[0]);
    decorate(&mut b, 20, Decoration::Binding, &[3]);
    void_function_types(&mut b);
    b.inst(Op::TypeFloat, &[6, 32]);
    b.inst(Op::TypeVector, &[7, 6, 4]);
    b.inst(Op::TypePointer, &[8, OUTPUT, 7]);
    b.inst(Op::Variable, &[8, 9, OUTPUT]);
    b.inst(Op::TypeVector, &[10, 6, 2]);
    b.inst(Op::TypePointer, &[11, INPUT, 10]);
    b.inst(Op::Variable, &[11, 12, INPUT]);
    b.inst(Op::TypeImage, &[16, 6, Dim::Dim2D as u32, 0, 0, 0, 1, 0]);
    b.inst(Op::TypeSampledImage, &[17, 16]);
    b.inst(Op::TypePointer, &[18, UNIFORM_CONSTANT, 17]);
    b.inst(Op::Variable, &[18, 20, UNIFORM_CONSTANT]);
    begin_main(&mut b);
    b.inst(Op::Load, &[17, 21, 20]);
    b.inst(Op::Load, &[10, 22, 12]);
    b.inst(Op::ImageSampleImplicitLod, &[7, 23, 21, 22]);
    b.inst(Op::Store, &[9, 23]);
    end_main(&mut b);
    b.to_bytes()
}

/// A counting loop in a fragment shader without outputs.
///
/// ```text
/// void main() { int i = 0; while (i < 4) { i = i + 1; } }
/// ```
pub fn counting_loop() -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    preamble(&mut b);
    b.inst_with_string(
        Op::EntryPoint,
        &[ExecutionModel::Fragment as u32, 4],
        "main",
        &[],
    );
    name(&mut b, 4, "main");
    name(&mut b, 8, "i");
    void_function_types(&mut b);
    b.inst(Op::TypeInt, &[6, 32, 1]);
    b.inst(Op::TypePointer, &[7, FUNCTION, 6]);
    b.inst(Op::Constant, &[6, 9, 0]);
    b.inst(Op::Constant, &[6, 14, 4]);
    b.inst(Op::TypeBool, &[15]);
    b.inst(Op::Constant, &[6, 17, 1]);
    begin_main(&mut b);
    b.inst(Op::Variable, &[7, 8, FUNCTION]);
    b.inst(Op::Store, &[8, 9]);
    b.inst(Op::Branch, &[10]);
    b.inst(Op::Label, &[10]);
    b.inst(Op::LoopMerge, &[12, 13, 0]);
    b.inst(Op::Branch, &[11]);
    b.inst(Op::Label, &[11]);
    b.inst(Op::Load, &[6, 16, 8]);
    b.inst(Op::SLessThan, &[15, 18, 16, 14]);
    b.inst(Op::BranchConditional, &[18, 19, 12]);
    b.inst(Op::Label, &[19]);
    b.inst(Op::Load, &[6, 20, 8]);
    b.inst(Op::IAdd, &[6, 21, 20, 17]);
    b.inst(Op::Store, &[8, 21]);
    b.inst(Op::Branch, &[13]);
    b.inst(Op::Label, &[13]);
    b.inst(Op::Branch, &[10]);
    b.inst(Op::Label, &[12]);
    end_main(&mut b);
    b.to_bytes()
}

/// `if (x > 0.0) color = vec4(1.0); else color = vec4(0.0);` over a float varying.
///
/// `body` is appended after the `if`/`else` merge label, before the return, so tests can
/// splice extra instructions into a reachable block.
pub fn branching_fragment(body: impl FnOnce(&mut ModuleBuilder)) -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    preamble(&mut b);
    b.inst_with_string(
        Op::EntryPoint,
        &[ExecutionModel::Fragment as u32, 4],
        "main",
        &[9, 12],
    );
    name(&mut b, 4, "main");
    name(&mut b, 9, "color");
    name(&mut b, 12, "x");
    decorate(&mut b, 9, Decoration::Location, &[0]);
    decorate(&mut b, 12, Decoration::Location, &[0]);
    void_function_types(&mut b);
    b.inst(Op::TypeFloat, &[6, 32]);
    b.inst(Op::TypeVector, &[7, 6, 4]);
    b.inst(Op::TypePointer, &[8, OUTPUT, 7]);
    b.inst(Op::Variable, &[8, 9, OUTPUT]);
    b.inst(Op::TypePointer, &[11, INPUT, 6]);
    b.inst(Op::Variable, &[11, 12, INPUT]);
    b.inst(Op::Constant, &[6, 13, f32_bits(0.0)]);
    b.inst(Op::Constant, &[6, 14, f32_bits(1.0)]);
    b.inst(Op::ConstantComposite, &[7, 15, 14, 14, 14, 14]);
    b.inst(Op::ConstantComposite, &[7, 16, 13, 13, 13, 13]);
    b.inst(Op::TypeBool, &[17]);
    begin_main(&mut b);
    b.inst(Op::Load, &[6, 18, 12]);
    b.inst(Op::FOrdGreaterThan, &[17, 19, 18, 13]);
    b.inst(Op::SelectionMerge, &[22, 0]);
    b.inst(Op::BranchConditional, &[19, 20, 21]);
    b.inst(Op::Label, &[20]);
    b.inst(Op::Store, &[9, 15]);
    b.inst(Op::Branch, &[22]);
    b.inst(Op::Label, &[21]);
    b.inst(Op::Store, &[9, 16]);
    b.inst(Op::Branch, &[22]);
    b.inst(Op::Label, &[22]);
    body(&mut b);
    end_main(&mut b);
    b.to_bytes()
}

/// Fragment header shared by the phi fixtures: `color` (%9, vec4 output at location 0),
/// float %6, vec4 %7, int %23, bool %17, and int constants 0 (%24), 1 (%25) and 4 (%26).
fn phi_preamble(b: &mut ModuleBuilder) {
    preamble(b);
    b.inst_with_string(
        Op::EntryPoint,
        &[ExecutionModel::Fragment as u32, 4],
        "main",
        &[9],
    );
    name(b, 4, "main");
    name(b, 9, "color");
    decorate(b, 9, Decoration::Location, &[0]);
    void_function_types(b);
    b.inst(Op::TypeFloat, &[6, 32]);
    b.inst(Op::TypeVector, &[7, 6, 4]);
    b.inst(Op::TypePointer, &[8, OUTPUT, 7]);
    b.inst(Op::Variable, &[8, 9, OUTPUT]);
    b.inst(Op::TypeBool, &[17]);
    b.inst(Op::TypeInt, &[23, 32, 1]);
    b.inst(Op::Constant, &[23, 24, 0]);
    b.inst(Op::Constant, &[23, 25, 1]);
    b.inst(Op::Constant, &[23, 26, 4]);
}

/// A loop testing its counter after the increment, as optimizers emit it: the counter is a
/// loop-header phi rather than a function variable.
///
/// ```text
/// int i = 0;
/// do { i = i + 1; } while (i < 4);
/// color = vec4(float(i));
/// ```
pub fn do_while_loop() -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    phi_preamble(&mut b);
    begin_main(&mut b);
    b.inst(Op::Branch, &[10]);
    b.inst(Op::Label, &[10]);
    b.inst(Op::Phi, &[23, 30, 24, 5, 21, 13]);
    b.inst(Op::LoopMerge, &[12, 13, 0]);
    b.inst(Op::Branch, &[13]);
    b.inst(Op::Label, &[13]);
    b.inst(Op::IAdd, &[23, 21, 30, 25]);
    b.inst(Op::SLessThan, &[17, 18, 21, 26]);
    b.inst(Op::BranchConditional, &[18, 10, 12]);
    b.inst(Op::Label, &[12]);
    b.inst(Op::ConvertSToF, &[6, 40, 21]);
    b.inst(Op::CompositeConstruct, &[7, 41, 40, 40, 40, 40]);
    b.inst(Op::Store, &[9, 41]);
    end_main(&mut b);
    b.to_bytes()
}

/// A loop whose header phis exchange values every iteration, and whose exit test is the
/// previous iteration's comparison, itself carried in a phi.
///
/// ```text
/// float a = 1.0, b = 2.0; int i = 0; bool more = true;
/// do { bool again = more; (a, b) = (b, a); i = i + 1; more = i < 4; } while (again);
/// color = vec4(a, b, 0.0, 1.0);
/// ```
pub fn swapping_loop() -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    phi_preamble(&mut b);
    b.inst(Op::Constant, &[6, 14, f32_bits(1.0)]);
    b.inst(Op::Constant, &[6, 27, f32_bits(2.0)]);
    b.inst(Op::ConstantTrue, &[17, 28]);
    b.inst(Op::Constant, &[6, 29, f32_bits(0.0)]);
    begin_main(&mut b);
    b.inst(Op::Branch, &[10]);
    b.inst(Op::Label, &[10]);
    b.inst(Op::Phi, &[6, 30, 14, 5, 31, 13]);
    b.inst(Op::Phi, &[6, 31, 27, 5, 30, 13]);
    b.inst(Op::Phi, &[23, 32, 24, 5, 21, 13]);
    b.inst(Op::Phi, &[17, 33, 28, 5, 18, 13]);
    b.inst(Op::LoopMerge, &[12, 13, 0]);
    b.inst(Op::Branch, &[13]);
    b.inst(Op::Label, &[13]);
    b.inst(Op::IAdd, &[23, 21, 32, 25]);
    b.inst(Op::SLessThan, &[17, 18, 21, 26]);
    b.inst(Op::BranchConditional, &[33, 10, 12]);
    b.inst(Op::Label, &[12]);
    b.inst(Op::CompositeConstruct, &[7, 42, 30, 31, 29, 14]);
    b.inst(Op::Store, &[9, 42]);
    end_main(&mut b);
    b.to_bytes()
}

/// Float varying `x` (%12, loaded as %18) and output `color`, with constants 0.0 (%13), 1.0
/// (%14), vec4 ones (%15), vec4 zeros (%16) and bool %17. `body` writes the function body
/// after the load.
fn float_varying_fragment(body: impl FnOnce(&mut ModuleBuilder)) -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    preamble(&mut b);
    b.inst_with_string(
        Op::EntryPoint,
        &[ExecutionModel::Fragment as u32, 4],
        "main",
        &[9, 12],
    );
    name(&mut b, 4, "main");
    name(&mut b, 9, "color");
    name(&mut b, 12, "x");
    decorate(&mut b, 9, Decoration::Location, &[0]);
    decorate(&mut b, 12, Decoration::Location, &[0]);
    void_function_types(&mut b);
    b.inst(Op::TypeFloat, &[6, 32]);
    b.inst(Op::TypeVector, &[7, 6, 4]);
    b.inst(Op::TypePointer, &[8, OUTPUT, 7]);
    b.inst(Op::Variable, &[8, 9, OUTPUT]);
    b.inst(Op::TypePointer, &[11, INPUT, 6]);
    b.inst(Op::Variable, &[11, 12, INPUT]);
    b.inst(Op::Constant, &[6, 13, f32_bits(0.0)]);
    b.inst(Op::Constant, &[6, 14, f32_bits(1.0)]);
    b.inst(Op::ConstantComposite, &[7, 15, 14, 14, 14, 14]);
    b.inst(Op::ConstantComposite, &[7, 16, 13, 13, 13, 13]);
    b.inst(Op::TypeBool, &[17]);
    begin_main(&mut b);
    b.inst(Op::Load, &[6, 18, 12]);
    body(&mut b);
    b.inst(Op::FunctionEnd, &[]);
    b.to_bytes()
}

/// `if (x > 0.0) { if (x > 1.0) { color = vec4(1.0); } }`
pub fn nested_selection() -> Vec<u8> {
    float_varying_fragment(|b| {
        b.inst(Op::FOrdGreaterThan, &[17, 19, 18, 13]);
        b.inst(Op::SelectionMerge, &[22, 0]);
        b.inst(Op::BranchConditional, &[19, 20, 22]);
        b.inst(Op::Label, &[20]);
        b.inst(Op::FOrdGreaterThan, &[17, 23, 18, 14]);
        b.inst(Op::SelectionMerge, &[25, 0]);
        b.inst(Op::BranchConditional, &[23, 24, 25]);
        b.inst(Op::Label, &[24]);
        b.inst(Op::Store, &[9, 15]);
        b.inst(Op::Branch, &[25]);
        b.inst(Op::Label, &[25]);
        b.inst(Op::Branch, &[22]);
        b.inst(Op::Label, &[22]);
        b.inst(Op::Return, &[]);
    })
}

/// `if (x > 0.0) { color = vec4(1.0); return; } else { color = vec4(0.0); }`
pub fn early_return() -> Vec<u8> {
    float_varying_fragment(|b| {
        b.inst(Op::FOrdGreaterThan, &[17, 19, 18, 13]);
        b.inst(Op::SelectionMerge, &[22, 0]);
        b.inst(Op::BranchConditional, &[19, 20, 21]);
        b.inst(Op::Label, &[20]);
        b.inst(Op::Store, &[9, 15]);
        b.inst(Op::Return, &[]);
        b.inst(Op::Label, &[21]);
        b.inst(Op::Store, &[9, 16]);
        b.inst(Op::Branch, &[22]);
        b.inst(Op::Label, &[22]);
        b.inst(Op::Return, &[]);
    })
}

/// [`uv_fragment`] with its header's id bound lowered below the last result id (%16).
pub fn id_past_bound() -> Vec<u8> {
    let mut bytes = uv_fragment();
    // Header word 3 holds the bound.
    bytes[12..16].copy_from_slice(&16u32.to_le_bytes());
    bytes
}

/// Counts `{` against `}` and checks nesting never goes negative.
pub fn braces_balanced(text: &str) -> bool {
    let mut depth = 0i64;
    for c in text.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
