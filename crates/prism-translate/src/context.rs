use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};
use prism_spirv::{Instruction, Module};
use spirv::Op;
use tracing::warn;

use crate::error::{Diagnostic, DiagnosticKind, TranslateError};
use crate::flow::Flow;
use crate::options::ShaderStage;
use crate::symbols::{self, Symbols};
use crate::types::Id;
use crate::writer::CodeWriter;

/// Bookkeeping for the function currently being walked.
#[derive(Debug, Clone)]
pub struct FunctionState {
    pub id: Id,
    pub result_type: Id,
    /// `(parameter id, parameter type)` in declaration order.
    pub parameters: Vec<(Id, Id)>,
    pub is_entry: bool,
    /// No label seen yet, so the signature has not been written.
    pub(crate) awaiting_label: bool,
    pub(crate) started: bool,
    /// Parameter and local names already taken in this function.
    pub(crate) local_names: HashSet<String>,
}

impl FunctionState {
    pub(crate) fn new(id: Id, result_type: Id, is_entry: bool) -> Self {
        Self {
            id,
            result_type,
            parameters: Vec::new(),
            is_entry,
            awaiting_label: true,
            started: false,
            local_names: HashSet::new(),
        }
    }
}

/// All mutable state of one translation pass.
///
/// Handlers receive it by reference; nothing here outlives the pass, so translating the same
/// module for several targets never shares state.
#[derive(Debug)]
pub struct TranslationContext {
    pub symbols: Symbols,
    pub out: CodeWriter,
    pub stage: ShaderStage,
    /// Function id named by the module's entry point (0 when there is none).
    pub entry: Id,
    pub function: Option<FunctionState>,
    pub diagnostics: Vec<Diagnostic>,
    /// Vertex attribute name to input slot, for binding vertex buffers downstream.
    pub attributes: BTreeMap<String, u32>,
    pub(crate) flow: Flow,
    /// Function-local call temporaries whose stores rebind instead of emitting.
    pub(crate) aliases: HashSet<Id>,
    functions_started: usize,
    instruction_index: usize,
    sources: Vec<String>,
    source_indices: HashMap<Id, u32>,
}

impl TranslationContext {
    pub(crate) fn new(
        module: &Module,
        stage_override: Option<ShaderStage>,
    ) -> Result<Self, TranslateError> {
        let (stage, entry) = entry_stage(module, stage_override)?;
        Ok(Self {
            symbols: Symbols::new(module.header().id_bound),
            out: CodeWriter::new(),
            stage,
            entry,
            function: None,
            diagnostics: Vec::new(),
            attributes: BTreeMap::new(),
            flow: Flow::scan(module),
            aliases: HashSet::new(),
            functions_started: 0,
            instruction_index: 0,
            sources: Vec::new(),
            source_indices: HashMap::new(),
        })
    }

    pub(crate) fn set_instruction_index(&mut self, index: usize) {
        self.instruction_index = index;
    }

    /// Operand `index` as an id, checked against the module bound.
    pub fn id(&self, inst: &Instruction, index: usize) -> Result<Id, TranslateError> {
        let id = symbols::operand(inst, index)?;
        self.symbols.check_id(inst, id)
    }

    /// Expression text for operand `index`.
    pub fn operand_expr(&self, inst: &Instruction, index: usize) -> Result<String, TranslateError> {
        Ok(self.symbols.reference(self.id(inst, index)?))
    }

    pub fn expr(&self, id: Id) -> String {
        self.symbols.reference(id)
    }

    /// Records `text` as the expression for result `id` of type `ty`.
    pub fn define(
        &mut self,
        inst: &Instruction,
        ty: Id,
        id: Id,
        text: String,
    ) -> Result<(), TranslateError> {
        self.symbols.set_value_type(id, ty);
        self.symbols.define(inst, id, text)
    }

    /// True while the first function of the module has not yet been opened.
    pub fn is_first_function(&self) -> bool {
        self.functions_started == 0
    }

    pub(crate) fn mark_function_started(&mut self) {
        self.functions_started += 1;
    }

    pub fn current_function(&self) -> Option<&FunctionState> {
        self.function.as_ref()
    }

    pub fn in_entry_function(&self) -> bool {
        self.function.as_ref().is_some_and(|f| f.is_entry)
    }

    /// Writes a placeholder for an opcode nobody handles and records a diagnostic.
    pub fn unsupported(&mut self, inst: &Instruction) {
        warn!(
            opcode = inst.opcode.raw(),
            instruction = self.instruction_index,
            "no handler for SPIR-V opcode"
        );
        self.diagnostics.push(Diagnostic {
            kind: DiagnosticKind::UnsupportedOpcode,
            instruction_index: self.instruction_index,
            opcode: inst.opcode,
        });
        let raw = inst.opcode.raw();
        self.out
            .line()
            .push_str(&format!("// Unknown operation {raw}"));
    }

    /// Records a non-fatal diagnostic without writing anything.
    pub fn diagnose(&mut self, inst: &Instruction, kind: DiagnosticKind) {
        self.diagnostics.push(Diagnostic {
            kind,
            instruction_index: self.instruction_index,
            opcode: inst.opcode,
        });
    }

    /// Follows an `OpLine` annotation so later statements map back to it.
    pub(crate) fn track_line(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let file = symbols::operand(inst, 0)?;
        let line = symbols::operand(inst, 1)?;
        let source = match self.source_indices.get(&file) {
            Some(&index) => index,
            None => {
                let index = self.sources.len() as u32;
                let name = self
                    .symbols
                    .string(file)
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("source{file}"));
                self.sources.push(name);
                self.source_indices.insert(file, index);
                index
            }
        };
        self.out
            .set_original_line(source, line.saturating_sub(1));
        Ok(())
    }

    pub(crate) fn take_sources(&mut self) -> Vec<String> {
        std::mem::take(&mut self.sources)
    }
}

/// Stage and function id of the module's first entry point, with `stage_override` taking
/// precedence over the declared execution model.
pub(crate) fn entry_stage(
    module: &Module,
    stage_override: Option<ShaderStage>,
) -> Result<(ShaderStage, Id), TranslateError> {
    let entry = module
        .instructions()
        .iter()
        .find(|inst| inst.op() == Some(Op::EntryPoint));
    let (model_stage, entry_id) = match entry {
        Some(inst) => {
            let model = symbols::operand(inst, 0)?;
            let stage = spirv::ExecutionModel::from_u32(model)
                .and_then(ShaderStage::from_execution_model);
            (stage, symbols::operand(inst, 1)?)
        }
        None => (None, 0),
    };
    let stage = stage_override
        .or(model_stage)
        .ok_or_else(|| TranslateError::CorruptModule {
            id: entry_id,
            opcode: entry.map_or(prism_spirv::Opcode::Known(Op::EntryPoint), |i| i.opcode),
            reason: "no graphics or compute entry point and no stage override".to_owned(),
        })?;
    Ok((stage, entry_id))
}
