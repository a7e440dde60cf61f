use core::fmt;

use prism_spirv::{DecodeError, Opcode};
use thiserror::Error;

use crate::types::Id;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// An operand names an id outside the module's bound, an id that was never declared where a
    /// declaration is required, or a decoration that cannot apply to its target.
    #[error("corrupt module: {opcode} (id {id}): {reason}")]
    CorruptModule {
        id: Id,
        opcode: Opcode,
        reason: String,
    },
    /// Branch/merge patterns that cannot be rebuilt as nested blocks.
    #[error("unsupported control flow at label {label}: {reason}")]
    UnsupportedControlFlow { label: Id, reason: String },
    /// A construct the selected target language cannot express.
    #[error("{backend} cannot translate {opcode} (id {id}): {reason}")]
    BackendLimitation {
        backend: &'static str,
        id: Id,
        opcode: Opcode,
        reason: String,
    },
}

/// A non-fatal problem recorded while the pass carried on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub instruction_index: usize,
    pub opcode: Opcode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// No handler exists for the opcode; a placeholder line was written instead.
    UnsupportedOpcode,
    /// An `OpExtInst` number outside the handled `GLSL.std.450` subset.
    UnsupportedExtendedInstruction(u32),
    /// An execution mode the backend ignores.
    IgnoredExecutionMode(u32),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DiagnosticKind::UnsupportedOpcode => {
                write!(f, "instruction {}: unsupported {}", self.instruction_index, self.opcode)
            }
            DiagnosticKind::UnsupportedExtendedInstruction(number) => write!(
                f,
                "instruction {}: unsupported GLSL.std.450 instruction {number}",
                self.instruction_index
            ),
            DiagnosticKind::IgnoredExecutionMode(mode) => write!(
                f,
                "instruction {}: ignored execution mode {mode}",
                self.instruction_index
            ),
        }
    }
}
