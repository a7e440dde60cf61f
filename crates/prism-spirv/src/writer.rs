use crate::decode::{Module, HEADER_WORDS};

/// Re-serializes a module to words: the header, then each instruction's leading
/// `(word_count << 16) | opcode` word followed by its operands.
pub fn encode_words(module: &Module) -> Vec<u32> {
    let body: usize = module
        .instructions()
        .iter()
        .map(|inst| inst.word_count())
        .sum();
    let mut words = Vec::with_capacity(HEADER_WORDS + body);
    words.extend_from_slice(&module.header_words());
    for inst in module.instructions() {
        words.push(inst.leading_word());
        words.extend_from_slice(&inst.operands);
    }
    words
}

/// Re-serializes a module to its little-endian byte form.
pub fn write_le_bytes(module: &Module) -> Vec<u8> {
    encode_words(module)
        .into_iter()
        .flat_map(u32::to_le_bytes)
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use spirv::Op;

    use super::*;
    use crate::decode::decode_u8_le_bytes;
    use crate::test_utils::ModuleBuilder;

    #[test]
    fn reproduces_input_bytes() {
        let mut builder = ModuleBuilder::new();
        builder.inst(Op::Capability, &[1]);
        builder.inst_with_string(Op::ExtInstImport, &[1], "GLSL.std.450", &[]);
        builder.inst(Op::MemoryModel, &[0, 1]);
        builder.inst_with_string(Op::EntryPoint, &[4, 2], "main", &[]);
        builder.raw(0x7fff, &[3, 4, 5]);
        builder.inst(Op::TypeVoid, &[3]);
        let bytes = builder.to_bytes();

        let module = decode_u8_le_bytes(&bytes).unwrap();
        assert_eq!(write_le_bytes(&module), bytes);
        assert_eq!(encode_words(&module), module.words());
    }
}
