use thiserror::Error;

/// Failure to decode a SPIR-V word stream.
///
/// Both variants abort decoding: nothing downstream of a bad header or a torn instruction can be
/// trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The header is missing or unusable, or the stream is not made of whole words.
    #[error("malformed SPIR-V module: {reason}")]
    MalformedModule { reason: String },
    /// An instruction declares more words than remain in the stream.
    #[error(
        "truncated SPIR-V instruction at word {word_offset}: declares {word_count} words but only {available} remain"
    )]
    TruncatedInstruction {
        word_offset: usize,
        word_count: usize,
        available: usize,
    },
}

impl DecodeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedModule {
            reason: reason.into(),
        }
    }
}
