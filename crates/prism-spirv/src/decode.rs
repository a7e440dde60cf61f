use core::fmt;

use spirv::Op;

use crate::error::DecodeError;

/// Number of words in the fixed module header (magic, version, generator, id bound, schema).
pub const HEADER_WORDS: usize = 5;

/// The five leading words of a SPIR-V module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub version: u32,
    pub generator: u32,
    pub id_bound: u32,
    pub schema: u32,
}

impl Header {
    /// `(major, minor)` as packed into the version word.
    pub fn version_pair(&self) -> (u8, u8) {
        (((self.version >> 16) & 0xff) as u8, ((self.version >> 8) & 0xff) as u8)
    }

    fn to_words(self) -> [u32; HEADER_WORDS] {
        [
            self.magic,
            self.version,
            self.generator,
            self.id_bound,
            self.schema,
        ]
    }
}

/// Instruction opcode, keeping unrecognized values intact so they can be re-emitted verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Known(Op),
    Unknown(u16),
}

impl Opcode {
    pub fn from_raw(raw: u16) -> Self {
        match Op::from_u32(u32::from(raw)) {
            Some(op) => Self::Known(op),
            None => Self::Unknown(raw),
        }
    }

    pub fn raw(self) -> u16 {
        match self {
            Self::Known(op) => op as u32 as u16,
            Self::Unknown(raw) => raw,
        }
    }

    pub fn op(self) -> Option<Op> {
        match self {
            Self::Known(op) => Some(op),
            Self::Unknown(_) => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(op) => write!(f, "Op{op:?}"),
            Self::Unknown(raw) => write!(f, "<unknown opcode {raw}>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstructionLocation {
    /// Position of the instruction in [`Module::instructions`].
    pub instruction_index: usize,
    /// Offset of the instruction's leading word in the module word stream (header included).
    pub word_offset: usize,
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub location: InstructionLocation,
    pub opcode: Opcode,
    /// All operand words following the leading word, including any packed string.
    pub operands: Vec<u32>,
    /// The NUL-terminated literal string embedded in the operands, for opcodes that carry one.
    pub string: Option<String>,
    /// Operand index of the first word after the embedded string.
    string_end: usize,
}

impl Instruction {
    pub fn op(&self) -> Option<Op> {
        self.opcode.op()
    }

    /// Operand word count (the leading word excluded).
    pub fn length(&self) -> usize {
        self.operands.len()
    }

    pub fn word_count(&self) -> usize {
        self.operands.len() + 1
    }

    pub fn operand(&self, index: usize) -> Option<u32> {
        self.operands.get(index).copied()
    }

    /// Operands that follow the embedded string (e.g. the interface ids of `OpEntryPoint`).
    ///
    /// Empty for instructions without a string.
    pub fn operands_after_string(&self) -> &[u32] {
        match self.string {
            Some(_) => self.operands.get(self.string_end..).unwrap_or(&[]),
            None => &[],
        }
    }

    pub(crate) fn leading_word(&self) -> u32 {
        ((self.word_count() as u32) << 16) | u32::from(self.opcode.raw())
    }
}

/// Operand index at which a packed literal string starts, for opcodes that embed one.
fn string_operand_index(op: Op) -> Option<usize> {
    match op {
        Op::SourceExtension | Op::Extension | Op::ModuleProcessed => Some(0),
        Op::String | Op::Name | Op::ExtInstImport => Some(1),
        Op::MemberName | Op::EntryPoint => Some(2),
        _ => None,
    }
}

/// Decodes a little-endian packed string starting at `operands[start]`.
///
/// Returns the string and the operand index following its terminating word. A string missing its
/// NUL terminator consumes every remaining word.
fn decode_string(operands: &[u32], start: usize) -> Option<(String, usize)> {
    let words = operands.get(start..)?;
    let mut bytes = Vec::new();
    for (i, word) in words.iter().enumerate() {
        for byte in word.to_le_bytes() {
            if byte == 0 {
                return Some((String::from_utf8_lossy(&bytes).into_owned(), start + i + 1));
            }
            bytes.push(byte);
        }
    }
    Some((String::from_utf8_lossy(&bytes).into_owned(), operands.len()))
}

/// A decoded SPIR-V module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    header: Header,
    words: Vec<u32>,
    instructions: Vec<Instruction>,
}

impl Module {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode_u8_le_bytes(bytes)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// The raw word stream the module was decoded from, header included.
    ///
    /// Reflects binding normalization once [`crate::normalize_bindings`] has run.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Overwrites operand `operand` of the instruction at `instruction_index`, keeping the word
    /// stream and the instruction record in agreement.
    pub(crate) fn patch_operand(&mut self, instruction_index: usize, operand: usize, value: u32) {
        let Some(inst) = self.instructions.get_mut(instruction_index) else {
            return;
        };
        let Some(slot) = inst.operands.get_mut(operand) else {
            return;
        };
        *slot = value;
        let word = inst.location.word_offset + 1 + operand;
        if let Some(slot) = self.words.get_mut(word) {
            *slot = value;
        }
    }

    pub(crate) fn header_words(&self) -> [u32; HEADER_WORDS] {
        self.header.to_words()
    }
}

/// Decodes a little-endian byte stream into a [`Module`].
pub fn decode_u8_le_bytes(bytes: &[u8]) -> Result<Module, DecodeError> {
    if bytes.len() % 4 != 0 {
        return Err(DecodeError::malformed(format!(
            "byte length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    let words = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    decode_u32_words(words)
}

/// Decodes an already word-aligned stream into a [`Module`].
pub fn decode_u32_words(words: Vec<u32>) -> Result<Module, DecodeError> {
    if words.len() < HEADER_WORDS {
        return Err(DecodeError::malformed(format!(
            "need at least {HEADER_WORDS} header words, got {}",
            words.len()
        )));
    }
    let header = Header {
        magic: words[0],
        version: words[1],
        generator: words[2],
        id_bound: words[3],
        schema: words[4],
    };
    if header.magic != spirv::MAGIC_NUMBER {
        return Err(DecodeError::malformed(format!(
            "bad magic 0x{:08x}, expected 0x{:08x}",
            header.magic,
            spirv::MAGIC_NUMBER
        )));
    }

    let mut instructions = Vec::new();
    let mut word_offset = HEADER_WORDS;
    while word_offset < words.len() {
        let leading = words[word_offset];
        let word_count = (leading >> 16) as usize;
        let opcode = Opcode::from_raw((leading & 0xffff) as u16);

        if word_count == 0 {
            return Err(DecodeError::malformed(format!(
                "instruction at word {word_offset} ({opcode}) has a word count of 0"
            )));
        }
        let available = words.len() - word_offset;
        if word_count > available {
            return Err(DecodeError::TruncatedInstruction {
                word_offset,
                word_count,
                available,
            });
        }

        let operands = words[word_offset + 1..word_offset + word_count].to_vec();
        let (string, string_end) = match opcode
            .op()
            .and_then(string_operand_index)
            .and_then(|start| decode_string(&operands, start))
        {
            Some((string, end)) => (Some(string), end),
            None => (None, 0),
        };

        instructions.push(Instruction {
            location: InstructionLocation {
                instruction_index: instructions.len(),
                word_offset,
            },
            opcode,
            operands,
            string,
            string_end,
        });
        word_offset += word_count;
    }

    Ok(Module {
        header,
        words,
        instructions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{encode_string, ModuleBuilder};

    #[test]
    fn decodes_header_and_instruction_boundaries() {
        let mut builder = ModuleBuilder::new();
        builder.inst(Op::Capability, &[1]);
        builder.inst(Op::TypeVoid, &[2]);
        let module = Module::decode(&builder.to_bytes()).unwrap();

        assert_eq!(module.header().magic, spirv::MAGIC_NUMBER);
        assert_eq!(module.instructions().len(), 2);
        let void = &module.instructions()[1];
        assert_eq!(void.op(), Some(Op::TypeVoid));
        assert_eq!(void.operands, vec![2]);
        assert_eq!(void.location.word_offset, HEADER_WORDS + 2);
        assert_eq!(void.location.instruction_index, 1);
    }

    #[test]
    fn rejects_short_header() {
        let err = decode_u32_words(vec![spirv::MAGIC_NUMBER, 0x0001_0000]).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedModule { .. }), "{err}");
    }

    #[test]
    fn rejects_unaligned_byte_stream() {
        let err = decode_u8_le_bytes(&[0u8; 21]).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedModule { .. }), "{err}");
    }

    #[test]
    fn rejects_word_count_past_end() {
        let mut words = ModuleBuilder::new().to_words();
        // OpTypeInt declares 4 words, only 2 follow.
        words.push((4 << 16) | Op::TypeInt as u32);
        words.push(7);
        words.push(32);

        let err = decode_u32_words(words).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TruncatedInstruction {
                word_offset: HEADER_WORDS,
                word_count: 4,
                available: 3,
            }
        );
    }

    #[test]
    fn rejects_zero_word_count() {
        let mut words = ModuleBuilder::new().to_words();
        words.push(Op::Nop as u32);
        let err = decode_u32_words(words).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedModule { .. }), "{err}");
    }

    #[test]
    fn extracts_strings_at_opcode_specific_offsets() {
        let mut builder = ModuleBuilder::new();
        builder.inst_with_string(Op::SourceExtension, &[], "GL_GOOGLE_include", &[]);
        builder.inst_with_string(Op::Name, &[5], "uv_coord", &[]);
        builder.inst_with_string(Op::MemberName, &[6, 1], "color", &[]);
        builder.inst_with_string(Op::EntryPoint, &[4, 3], "main", &[9, 10]);
        let module = Module::decode(&builder.to_bytes()).unwrap();

        let strings: Vec<_> = module
            .instructions()
            .iter()
            .map(|inst| inst.string.as_deref())
            .collect();
        assert_eq!(
            strings,
            vec![
                Some("GL_GOOGLE_include"),
                Some("uv_coord"),
                Some("color"),
                Some("main")
            ]
        );
        assert_eq!(module.instructions()[3].operands_after_string(), &[9, 10]);
    }

    #[test]
    fn string_of_exact_word_multiple_gets_a_terminator_word() {
        // "main" fills one word; the NUL lives in the next.
        assert_eq!(encode_string("main").len(), 2);
        let (s, end) = decode_string(&encode_string("main"), 0).unwrap();
        assert_eq!(s, "main");
        assert_eq!(end, 2);
    }

    #[test]
    fn keeps_unknown_opcodes() {
        let mut words = ModuleBuilder::new().to_words();
        words.push((2 << 16) | 0xfff0);
        words.push(42);
        let module = decode_u32_words(words).unwrap();
        assert_eq!(module.instructions()[0].opcode, Opcode::Unknown(0xfff0));
        assert_eq!(module.instructions()[0].operands, vec![42]);
    }
}
