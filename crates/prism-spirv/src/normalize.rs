use hashbrown::HashMap;

use spirv::{Decoration, Op};
use tracing::debug;

use crate::decode::Module;

/// A `Binding` decoration rewritten by [`normalize_bindings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingAssignment {
    /// Id the decoration targets (normally an `OpVariable` result).
    pub target: u32,
    /// The binding number before normalization.
    pub previous: u32,
    /// The binding number written back.
    pub binding: u32,
    /// Consecutive binding slots the resource occupies (its array length, or 1).
    pub slots: u32,
}

/// Renumbers `Binding` decorations into one flat, gap-free sequence.
///
/// Array-typed resources are followed through `OpTypeArray -> OpTypePointer -> OpVariable` so an
/// array of `N` resources reserves `N` consecutive bindings. Decorations are visited in module
/// order and rewritten in place, in both the word stream and the decoded instruction.
pub fn normalize_bindings(module: &mut Module) -> Vec<BindingAssignment> {
    let mut constants: HashMap<u32, u32> = HashMap::new();
    let mut array_lengths: HashMap<u32, u32> = HashMap::new();

    for inst in module.instructions() {
        let ops = &inst.operands;
        match inst.op() {
            Some(Op::Constant) if ops.len() >= 3 => {
                constants.insert(ops[1], ops[2]);
            }
            Some(Op::TypeArray) if ops.len() >= 3 => {
                if let Some(&length) = constants.get(&ops[2]) {
                    array_lengths.insert(ops[0], length);
                }
            }
            Some(Op::TypePointer) if ops.len() >= 3 => {
                if let Some(&length) = array_lengths.get(&ops[2]) {
                    array_lengths.insert(ops[0], length);
                }
            }
            Some(Op::Variable) if ops.len() >= 2 => {
                if let Some(&length) = array_lengths.get(&ops[0]) {
                    array_lengths.insert(ops[1], length);
                }
            }
            _ => {}
        }
    }

    let mut next = 0u32;
    let mut assignments = Vec::new();
    let mut patches = Vec::new();
    for inst in module.instructions() {
        let ops = &inst.operands;
        if inst.op() != Some(Op::Decorate)
            || ops.len() < 3
            || ops[1] != Decoration::Binding as u32
        {
            continue;
        }
        let target = ops[0];
        // Unresolvable (e.g. specialization-constant) lengths fall back to a single slot.
        let slots = array_lengths
            .get(&target)
            .copied()
            .filter(|&length| length > 0)
            .unwrap_or(1);
        assignments.push(BindingAssignment {
            target,
            previous: ops[2],
            binding: next,
            slots,
        });
        patches.push((inst.location.instruction_index, next));
        next = next.saturating_add(slots);
    }

    for (instruction_index, binding) in patches {
        module.patch_operand(instruction_index, 2, binding);
    }

    debug!(
        bindings = assignments.len(),
        slots = next,
        "normalized SPIR-V resource bindings"
    );
    assignments
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use spirv::StorageClass;

    use super::*;
    use crate::decode::decode_u8_le_bytes;
    use crate::test_utils::ModuleBuilder;

    const BINDING: u32 = Decoration::Binding as u32;

    fn binding_of(module: &Module, target: u32) -> Option<u32> {
        module.instructions().iter().find_map(|inst| {
            (inst.op() == Some(Op::Decorate)
                && inst.operands[0] == target
                && inst.operands[1] == BINDING)
                .then(|| inst.operands[2])
        })
    }

    #[test]
    fn arrays_consume_their_length_in_slots() {
        let uniform_constant = StorageClass::UniformConstant as u32;
        let mut b = ModuleBuilder::new();
        // Front ends number every binding 0; normalization owns the final layout.
        b.inst(Op::Decorate, &[30, BINDING, 0]);
        b.inst(Op::Decorate, &[31, BINDING, 0]);
        b.inst(Op::Decorate, &[32, BINDING, 0]);
        b.inst(Op::Decorate, &[33, BINDING, 0]);
        b.inst(Op::TypeInt, &[1, 32, 0]);
        b.inst(Op::Constant, &[1, 2, 1]);
        b.inst(Op::Constant, &[1, 3, 4]);
        b.inst(Op::TypeFloat, &[4, 32]);
        b.inst(Op::TypeImage, &[5, 4, 1, 0, 0, 0, 1, 0]);
        b.inst(Op::TypeSampledImage, &[6, 5]);
        b.inst(Op::TypeArray, &[7, 6, 2]);
        b.inst(Op::TypeArray, &[8, 6, 3]);
        b.inst(Op::TypePointer, &[9, uniform_constant, 7]);
        b.inst(Op::TypePointer, &[10, uniform_constant, 8]);
        b.inst(Op::TypePointer, &[11, uniform_constant, 6]);
        b.inst(Op::Variable, &[9, 30, uniform_constant]);
        b.inst(Op::Variable, &[10, 31, uniform_constant]);
        b.inst(Op::Variable, &[9, 32, uniform_constant]);
        b.inst(Op::Variable, &[11, 33, uniform_constant]);
        let mut module = decode_u8_le_bytes(&b.to_bytes()).unwrap();

        let assignments = normalize_bindings(&mut module);

        let bindings: Vec<_> = [30, 31, 32, 33]
            .into_iter()
            .map(|id| binding_of(&module, id))
            .collect();
        assert_eq!(bindings, vec![Some(0), Some(1), Some(5), Some(6)]);
        assert_eq!(
            assignments.iter().map(|a| a.slots).collect::<Vec<_>>(),
            vec![1, 4, 1, 1]
        );

        // The raw word stream was rewritten too.
        let decoded_again = crate::decode::decode_u32_words(module.words().to_vec()).unwrap();
        assert_eq!(binding_of(&decoded_again, 31), Some(1));
        assert_eq!(binding_of(&decoded_again, 33), Some(6));
    }

    #[test]
    fn leaves_other_decorations_alone() {
        let mut b = ModuleBuilder::new();
        b.inst(Op::Decorate, &[3, Decoration::Location as u32, 7]);
        b.inst(Op::Decorate, &[4, Decoration::DescriptorSet as u32, 2]);
        let bytes = b.to_bytes();
        let mut module = decode_u8_le_bytes(&bytes).unwrap();

        assert!(normalize_bindings(&mut module).is_empty());
        assert_eq!(crate::write_le_bytes(&module), bytes);
    }
}
