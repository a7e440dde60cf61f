//! Structured control-flow reconstruction.
//!
//! SPIR-V functions are flat lists of labelled blocks ending in branches. Merge annotations
//! (`OpSelectionMerge`, `OpLoopMerge`) name where each construct ends, which is enough to emit
//! nested `if`/`else` and `while (true)` blocks as the labels stream past. Block parameters
//! (`OpPhi`) become function-scope temporaries assigned at the end of each predecessor.
//!
//! Loop-header phis are reassigned on the back edge, after values computed from them may
//! already have been inlined elsewhere. Every value derived from one is therefore written to
//! its own function-scope temporary where it is defined, and the copies on each edge are
//! performed as a parallel copy.

use hashbrown::{HashMap, HashSet};
use prism_spirv::{Instruction, Module};
use spirv::Op;

use crate::backend::{c_style, InstructionHandler};
use crate::context::TranslationContext;
use crate::error::TranslateError;
use crate::symbols::operand;
use crate::types::Id;

/// What to emit when a label is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockStart {
    /// Open `if <condition> {`; the condition carries its own parentheses.
    If(String),
    /// Close the `then` block and open `else`.
    Else,
}

#[derive(Debug, Clone, Copy)]
struct LoopFrame {
    header: Id,
    merge: Id,
    continue_target: Id,
}

#[derive(Debug, Default)]
pub(crate) struct Flow {
    /// Label following each label in layout order, within one function.
    next_label: HashMap<Id, Id>,
    /// `(phi, incoming value)` copies to perform at the end of each predecessor block.
    phi_copies: HashMap<Id, Vec<(Id, Id)>>,
    /// `(phi, type)` temporaries to declare at the top of each function.
    phis: HashMap<Id, Vec<(Id, Id)>>,
    phi_types: HashMap<Id, Id>,
    /// `(value, type)` results derived from loop-header phis, declared like phis.
    carried: HashMap<Id, Vec<(Id, Id)>>,
    carried_ids: HashSet<Id>,

    current_label: Option<Id>,
    pending_merge: Option<Id>,
    starts: HashMap<Id, BlockStart>,
    /// Open selection constructs per merge label.
    merges: HashMap<Id, u32>,
    loops: Vec<LoopFrame>,
}

impl Flow {
    /// Pre-scans block layout and phi operands; both are needed before their labels are reached.
    pub(crate) fn scan(module: &Module) -> Self {
        let mut flow = Self::default();
        let loop_headers = loop_headers(module);
        let mut current_label = None;
        let mut derived = HashSet::new();
        let mut function = None;
        let mut previous_label = None;
        for inst in module.instructions() {
            match inst.op() {
                Some(Op::Function) => {
                    function = inst.operand(1);
                    previous_label = None;
                    derived.clear();
                }
                Some(Op::FunctionEnd) => {
                    function = None;
                    previous_label = None;
                }
                Some(Op::Label) => {
                    let Some(label) = inst.operand(0) else {
                        continue;
                    };
                    if let Some(previous) = previous_label {
                        flow.next_label.insert(previous, label);
                    }
                    previous_label = Some(label);
                    current_label = Some(label);
                }
                Some(Op::Phi) => {
                    let (Some(ty), Some(id), Some(function)) =
                        (inst.operand(0), inst.operand(1), function)
                    else {
                        continue;
                    };
                    flow.phis.entry(function).or_default().push((id, ty));
                    flow.phi_types.insert(id, ty);
                    if current_label.is_some_and(|label| loop_headers.contains(&label)) {
                        derived.insert(id);
                    }
                    for pair in inst.operands.get(2..).unwrap_or(&[]).chunks_exact(2) {
                        flow.phi_copies
                            .entry(pair[1])
                            .or_default()
                            .push((id, pair[0]));
                    }
                }
                Some(op) if function.is_some() => {
                    let reads_derived = inst
                        .operands
                        .get(2..)
                        .is_some_and(|operands| operands.iter().any(|id| derived.contains(id)));
                    let (Some(ty), Some(id), Some(function)) =
                        (inst.operand(0), inst.operand(1), function)
                    else {
                        continue;
                    };
                    if !reads_derived {
                        continue;
                    }
                    if is_place(op) {
                        derived.insert(id);
                    } else if is_carried_value(op) {
                        derived.insert(id);
                        flow.carried.entry(function).or_default().push((id, ty));
                        flow.carried_ids.insert(id);
                    }
                }
                _ => {}
            }
        }
        flow
    }

    fn reset_function(&mut self) {
        self.current_label = None;
        self.pending_merge = None;
        self.starts.clear();
        self.merges.clear();
        self.loops.clear();
    }

    fn next_label(&self) -> Option<Id> {
        self.current_label
            .and_then(|label| self.next_label.get(&label).copied())
    }

    /// True for results that live in a function-scope temporary instead of being inlined.
    pub(crate) fn carries(&self, id: Id) -> bool {
        self.carried_ids.contains(&id)
    }
}

/// Labels of blocks holding an `OpLoopMerge`.
fn loop_headers(module: &Module) -> HashSet<Id> {
    let mut headers = HashSet::new();
    let mut label = None;
    for inst in module.instructions() {
        match inst.op() {
            Some(Op::Label) => label = inst.operand(0),
            Some(Op::LoopMerge) => headers.extend(label),
            _ => {}
        }
    }
    headers
}

/// Pointer results; they name a location, so they stay inlined and only pass derivation on.
fn is_place(op: Op) -> bool {
    matches!(
        op,
        Op::AccessChain | Op::InBoundsAccessChain | Op::PtrAccessChain
    )
}

fn is_carried_value(op: Op) -> bool {
    c_style::is_expression(op)
        || matches!(
            op,
            Op::Load
                | Op::CopyObject
                | Op::Bitcast
                | Op::CompositeInsert
                | Op::VectorExtractDynamic
                | Op::Transpose
                | Op::Not
                | Op::LogicalNot
                | Op::Any
                | Op::All
                | Op::IsNan
                | Op::IsInf
                | Op::UConvert
                | Op::SConvert
                | Op::FConvert
        )
}

/// Writes the result of `inst` to its function-scope temporary when it is carried.
pub(crate) fn carry_result(ctx: &mut TranslationContext, inst: &Instruction) {
    let Some(id) = inst.operand(1) else {
        return;
    };
    if !ctx.flow.carries(id) {
        return;
    }
    let temporary = format!("_{id}");
    let value = ctx.expr(id);
    if value == temporary {
        return;
    }
    ctx.out
        .line()
        .push_str(&format!("{temporary} = {value};"));
    ctx.symbols.rebind(id, temporary);
}

/// Whether `expr` uses the identifier `name` as a whole token.
fn mentions(expr: &str, name: &str) -> bool {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    expr.match_indices(name).any(|(start, _)| {
        let before = expr[..start].chars().next_back();
        let after = expr[start + name.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

pub(crate) fn is_structural(op: Op) -> bool {
    matches!(
        op,
        Op::Label
            | Op::Branch
            | Op::BranchConditional
            | Op::SelectionMerge
            | Op::LoopMerge
            | Op::Switch
            | Op::Phi
            | Op::FunctionEnd
    )
}

fn unsupported(label: Id, reason: impl Into<String>) -> TranslateError {
    TranslateError::UnsupportedControlFlow {
        label,
        reason: reason.into(),
    }
}

/// Wraps a condition in parentheses unless it already is one parenthesised group.
fn parenthesize(expr: &str) -> String {
    if is_wrapped(expr) {
        expr.to_owned()
    } else {
        format!("({expr})")
    }
}

fn is_wrapped(expr: &str) -> bool {
    if !(expr.starts_with('(') && expr.ends_with(')')) {
        return false;
    }
    let mut depth = 0usize;
    for (index, c) in expr.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && index != expr.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

pub(crate) fn handle<H: InstructionHandler + ?Sized>(
    handler: &mut H,
    ctx: &mut TranslationContext,
    inst: &Instruction,
    op: Op,
) -> Result<(), TranslateError> {
    match op {
        Op::Label => label(handler, ctx, inst),
        Op::SelectionMerge => {
            ctx.flow.pending_merge = Some(ctx.id(inst, 0)?);
            Ok(())
        }
        Op::LoopMerge => {
            let merge = ctx.id(inst, 0)?;
            let continue_target = ctx.id(inst, 1)?;
            let header = ctx.flow.current_label.unwrap_or(0);
            ctx.out.line().push_str("while (true) {");
            ctx.out.indent();
            ctx.flow.loops.push(LoopFrame {
                header,
                merge,
                continue_target,
            });
            Ok(())
        }
        Op::Branch => {
            let target = ctx.id(inst, 0)?;
            emit_phi_copies(handler, ctx, None);
            ctx.flow.pending_merge = None;
            branch(ctx, target)
        }
        Op::BranchConditional => branch_conditional(handler, ctx, inst),
        Op::Switch => Err(unsupported(
            ctx.flow.current_label.unwrap_or(0),
            "switch constructs are not reconstructed",
        )),
        Op::Phi => {
            let ty = operand(inst, 0)?;
            let id = ctx.id(inst, 1)?;
            ctx.symbols.set_value_type(id, ty);
            Ok(())
        }
        Op::FunctionEnd => function_end(handler, ctx),
        _ => Ok(()),
    }
}

fn label<H: InstructionHandler + ?Sized>(
    handler: &mut H,
    ctx: &mut TranslationContext,
    inst: &Instruction,
) -> Result<(), TranslateError> {
    let id = ctx.id(inst, 0)?;
    ctx.flow.current_label = Some(id);

    let Some(function) = ctx.function.as_ref() else {
        return Err(crate::symbols::corrupt(inst, id, "label outside of a function"));
    };
    if function.awaiting_label {
        let function_id = function.id;
        if ctx.is_first_function() {
            handler.allocate_resources(&mut ctx.symbols);
        }
        handler.begin_function(ctx)?;
        ctx.mark_function_started();
        if let Some(function) = ctx.function.as_mut() {
            function.awaiting_label = false;
            function.started = true;
        }
        let phis = ctx.flow.phis.get(&function_id).cloned().unwrap_or_default();
        for (phi, ty) in phis {
            let declaration = handler.declare(&ctx.symbols, ty, &format!("_{phi}"));
            ctx.out.line().push_str(&format!("{declaration};"));
            ctx.symbols.rebind(phi, format!("_{phi}"));
        }
        let carried = ctx.flow.carried.get(&function_id).cloned().unwrap_or_default();
        for (value, ty) in carried {
            let declaration = handler.declare(&ctx.symbols, ty, &format!("_{value}"));
            ctx.out.line().push_str(&format!("{declaration};"));
        }
        return Ok(());
    }

    if let Some(count) = ctx.flow.merges.remove(&id) {
        for _ in 0..count {
            ctx.out.dedent();
            ctx.out.line().push('}');
        }
    }
    while ctx.flow.loops.last().is_some_and(|frame| frame.merge == id) {
        ctx.flow.loops.pop();
        ctx.out.dedent();
        ctx.out.line().push('}');
    }
    match ctx.flow.starts.remove(&id) {
        Some(BlockStart::If(condition)) => {
            ctx.out.line().push_str(&format!("if {condition} {{"));
            ctx.out.indent();
        }
        Some(BlockStart::Else) => {
            ctx.out.dedent();
            ctx.out.line().push_str("} else {");
            ctx.out.indent();
        }
        None => {}
    }
    Ok(())
}

/// Assigns the phis fed by the current block. Sources that read a phi reassigned earlier in
/// the same copy are saved first, and so is `condition` when it reads any of them.
fn emit_phi_copies<H: InstructionHandler + ?Sized>(
    handler: &H,
    ctx: &mut TranslationContext,
    condition: Option<(Id, &mut String)>,
) {
    let Some(label) = ctx.flow.current_label else {
        return;
    };
    let Some(copies) = ctx.flow.phi_copies.get(&label).cloned() else {
        return;
    };
    let targets = copies
        .iter()
        .map(|&(phi, _)| format!("_{phi}"))
        .collect::<Vec<_>>();

    if let Some((condition_id, condition)) = condition {
        if targets.iter().any(|target| mentions(condition, target)) {
            let saved = format!("_c{label}");
            let ty = ctx.symbols.value_type(condition_id);
            let declaration = handler.declare(&ctx.symbols, ty, &saved);
            ctx.out
                .line()
                .push_str(&format!("{declaration} = {condition};"));
            *condition = saved;
        }
    }

    let mut values = Vec::with_capacity(copies.len());
    for (index, &(phi, value)) in copies.iter().enumerate() {
        let value = ctx.expr(value);
        let clobbered = targets[..index]
            .iter()
            .any(|target| mentions(&value, target));
        if clobbered {
            let saved = format!("_{phi}_{label}");
            let ty = ctx.flow.phi_types.get(&phi).copied().unwrap_or(0);
            let declaration = handler.declare(&ctx.symbols, ty, &saved);
            ctx.out.line().push_str(&format!("{declaration} = {value};"));
            values.push(saved);
        } else {
            values.push(value);
        }
    }
    for (target, value) in targets.iter().zip(values) {
        if *target != value {
            ctx.out.line().push_str(&format!("{target} = {value};"));
        }
    }
}

fn branch(ctx: &mut TranslationContext, target: Id) -> Result<(), TranslateError> {
    let next = ctx.flow.next_label();
    let current = ctx.flow.current_label.unwrap_or(0);
    if let Some(frame) = ctx.flow.loops.last().copied() {
        if target == frame.merge {
            ctx.out.line().push_str("break;");
            return Ok(());
        }
    }
    if ctx.flow.merges.contains_key(&target) || next == Some(target) {
        return Ok(());
    }
    if let Some(frame) = ctx.flow.loops.last().copied() {
        if target == frame.header {
            return Ok(());
        }
        if target == frame.continue_target {
            return Err(unsupported(
                current,
                "continue from the middle of a loop body",
            ));
        }
    }
    if ctx.flow.loops.iter().any(|frame| frame.merge == target) {
        return Err(unsupported(current, "break out of an enclosing loop"));
    }
    Err(unsupported(
        current,
        format!("branch to %{target} leaves the structured construct"),
    ))
}

fn branch_conditional<H: InstructionHandler + ?Sized>(
    handler: &H,
    ctx: &mut TranslationContext,
    inst: &Instruction,
) -> Result<(), TranslateError> {
    let condition_id = ctx.id(inst, 0)?;
    let mut condition = ctx.expr(condition_id);
    let on_true = ctx.id(inst, 1)?;
    let on_false = ctx.id(inst, 2)?;
    emit_phi_copies(handler, ctx, Some((condition_id, &mut condition)));
    let merge = ctx.flow.pending_merge.take();
    let current = ctx.flow.current_label.unwrap_or(0);
    let next = ctx.flow.next_label();

    if on_true == on_false {
        return branch(ctx, on_true);
    }

    if let Some(frame) = ctx.flow.loops.last().copied() {
        if on_true == frame.merge || on_false == frame.merge {
            let (statement, other) = if on_true == frame.merge {
                (format!("if {} break;", parenthesize(&condition)), on_false)
            } else {
                (format!("if (!{}) break;", parenthesize(&condition)), on_true)
            };
            let continues = Some(other) == next
                || Some(other) == merge
                || other == frame.header
                || ctx.flow.merges.contains_key(&other);
            if !continues {
                return Err(unsupported(
                    current,
                    "loop exit whose other target is not the following block",
                ));
            }
            ctx.out.line().push_str(&statement);
            return Ok(());
        }
    }

    let Some(merge) = merge else {
        return Err(unsupported(
            current,
            "conditional branch without a merge instruction",
        ));
    };
    let condition = parenthesize(&condition);
    let negated = format!("(!{condition})");
    let flow = &mut ctx.flow;
    if on_true == merge {
        flow.starts.insert(on_false, BlockStart::If(negated));
    } else if on_false == merge {
        flow.starts.insert(on_true, BlockStart::If(condition));
    } else if next == Some(on_false) && next != Some(on_true) {
        flow.starts.insert(on_false, BlockStart::If(negated));
        flow.starts.insert(on_true, BlockStart::Else);
    } else {
        flow.starts.insert(on_true, BlockStart::If(condition));
        flow.starts.insert(on_false, BlockStart::Else);
    }
    *flow.merges.entry(merge).or_default() += 1;
    Ok(())
}

fn function_end<H: InstructionHandler + ?Sized>(
    handler: &mut H,
    ctx: &mut TranslationContext,
) -> Result<(), TranslateError> {
    let started = ctx.function.as_ref().is_some_and(|f| f.started);
    if started {
        if let Some(frame) = ctx.flow.loops.last() {
            return Err(unsupported(frame.header, "loop never reaches its merge block"));
        }
        if let Some(&label) = ctx.flow.merges.keys().next() {
            return Err(unsupported(label, "selection never reaches its merge block"));
        }
        ctx.out.dedent();
        ctx.out.line().push('}');
        handler.end_function(ctx)?;
        ctx.out.end_function();
    }
    ctx.function = None;
    ctx.flow.reset_function();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentions_matches_whole_identifiers() {
        assert!(mentions("(_30 + 1)", "_30"));
        assert!(mentions("_30", "_30"));
        assert!(!mentions("(_301 + 1)", "_30"));
        assert!(!mentions("a_30", "_30"));
        assert!(mentions("v[_30].x", "_30"));
    }

    #[test]
    fn conditions_are_parenthesized_once() {
        assert_eq!(parenthesize("c"), "(c)");
        assert_eq!(parenthesize("(a < b)"), "(a < b)");
        assert_eq!(parenthesize("(a) && (b)"), "((a) && (b))");
    }
}
