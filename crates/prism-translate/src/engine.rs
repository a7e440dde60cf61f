//! The per-instruction dispatch loop shared by every text backend.

use std::collections::BTreeMap;

use prism_spirv::Module;
use spirv::Op;
use tracing::{debug, trace};

use crate::backend::InstructionHandler;
use crate::context::{FunctionState, TranslationContext};
use crate::error::{Diagnostic, TranslateError};
use crate::flow;
use crate::options::ShaderStage;
use crate::symbols::operand;
use crate::writer::LineMapping;

/// Raw result of walking a module with one handler.
#[derive(Debug)]
pub(crate) struct TextOutput {
    pub text: String,
    pub line_mappings: Vec<LineMapping>,
    pub sources: Vec<String>,
    pub stage: ShaderStage,
    pub attributes: BTreeMap<String, u32>,
    pub diagnostics: Vec<Diagnostic>,
    pub context: TranslationContext,
}

pub(crate) fn run<H: InstructionHandler + ?Sized>(
    module: &Module,
    handler: &mut H,
    stage: Option<ShaderStage>,
) -> Result<TextOutput, TranslateError> {
    let mut ctx = TranslationContext::new(module, stage)?;
    debug!(
        backend = handler.backend_name(),
        stage = ?ctx.stage,
        instructions = module.instructions().len(),
        "translating module"
    );
    handler.begin(&mut ctx)?;

    for inst in module.instructions() {
        ctx.set_instruction_index(inst.location.instruction_index);
        ctx.symbols.record(inst)?;
        match inst.op() {
            Some(Op::Line) => ctx.track_line(inst)?,
            Some(Op::NoLine) => ctx.out.clear_original_line(),
            Some(op) if flow::is_structural(op) => flow::handle(handler, &mut ctx, inst, op)?,
            Some(Op::Function) => {
                let result_type = operand(inst, 0)?;
                let id = ctx.id(inst, 1)?;
                trace!(function = id, "function");
                ctx.function = Some(FunctionState::new(id, result_type, id == ctx.entry));
                handler.handle(&mut ctx, inst)?;
            }
            Some(Op::FunctionParameter) => {
                let ty = operand(inst, 0)?;
                let id = ctx.id(inst, 1)?;
                match ctx.function.as_mut() {
                    Some(function) => function.parameters.push((id, ty)),
                    None => {
                        return Err(crate::symbols::corrupt(
                            inst,
                            id,
                            "parameter outside of a function",
                        ))
                    }
                }
                handler.handle(&mut ctx, inst)?;
            }
            _ => {
                handler.handle(&mut ctx, inst)?;
                flow::carry_result(&mut ctx, inst);
            }
        }
        ctx.out.end_instruction();
    }

    handler.finish(&mut ctx)?;
    ctx.out.end_instruction();

    let out = std::mem::take(&mut ctx.out);
    let (text, line_mappings) = out.finish();
    let sources = ctx.take_sources();
    debug!(
        backend = handler.backend_name(),
        bytes = text.len(),
        diagnostics = ctx.diagnostics.len(),
        "translation finished"
    );
    Ok(TextOutput {
        text,
        line_mappings,
        sources,
        stage: ctx.stage,
        attributes: std::mem::take(&mut ctx.attributes),
        diagnostics: std::mem::take(&mut ctx.diagnostics),
        context: ctx,
    })
}
