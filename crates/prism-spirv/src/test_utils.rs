use spirv::Op;

use crate::decode::HEADER_WORDS;

/// Packs `s` the way SPIR-V literal strings are laid out: little-endian bytes, NUL-terminated,
/// zero-padded to a whole word.
pub fn encode_string(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Builds SPIR-V word streams instruction by instruction.
///
/// The header's id bound is computed as one past the largest operand seen, which is an
/// over-estimate (literals count too) but always valid.
#[derive(Debug, Clone, Default)]
pub struct ModuleBuilder {
    body: Vec<u32>,
    bound: u32,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inst(&mut self, op: Op, operands: &[u32]) -> &mut Self {
        self.raw(op as u32, operands)
    }

    /// Emits an instruction whose operands are `leading`, then the packed `s`, then `trailing`.
    pub fn inst_with_string(
        &mut self,
        op: Op,
        leading: &[u32],
        s: &str,
        trailing: &[u32],
    ) -> &mut Self {
        let mut operands = leading.to_vec();
        operands.extend(encode_string(s));
        operands.extend_from_slice(trailing);
        for &id in leading.iter().chain(trailing) {
            self.bound = self.bound.max(id.saturating_add(1));
        }
        let word_count = operands.len() as u32 + 1;
        self.body.push((word_count << 16) | op as u32);
        self.body.extend_from_slice(&operands);
        self
    }

    /// Emits an instruction with an arbitrary (possibly unknown) opcode number.
    pub fn raw(&mut self, opcode: u32, operands: &[u32]) -> &mut Self {
        let word_count = operands.len() as u32 + 1;
        self.body.push((word_count << 16) | (opcode & 0xffff));
        self.body.extend_from_slice(operands);
        for &id in operands {
            self.bound = self.bound.max(id.saturating_add(1));
        }
        self
    }

    pub fn to_words(&self) -> Vec<u32> {
        let mut words = Vec::with_capacity(HEADER_WORDS + self.body.len());
        words.push(spirv::MAGIC_NUMBER);
        words.push(0x0001_0000);
        // Khronos glslang reference front end, tool version 10.
        words.push((8 << 16) | 10);
        words.push(self.bound.max(1));
        words.push(0);
        words.extend_from_slice(&self.body);
        words
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_words()
            .into_iter()
            .flat_map(u32::to_le_bytes)
            .collect()
    }
}

/// Bit pattern of an `f32` literal as stored in an `OpConstant` operand.
pub fn f32_bits(value: f32) -> u32 {
    value.to_bits()
}
