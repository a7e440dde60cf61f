//! Source Map v3 documents built from `OpLine` annotations.
//!
//! Every mapped output line gets a single segment at column 0 pointing at the most recent
//! original line; columns in the original source are not tracked.

use serde::{Deserialize, Serialize};

use crate::writer::LineMapping;

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMap {
    pub version: u32,
    pub file: String,
    pub sources: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    /// Builds a map for `file` from the writer's line mappings, which must be sorted by output
    /// line. Only the first mapping of each output line is kept.
    pub fn new(file: impl Into<String>, sources: Vec<String>, lines: &[LineMapping]) -> Self {
        let mut mappings = String::new();
        let mut line = 0;
        let mut previous_source = 0i64;
        let mut previous_original = 0i64;
        let mut mapped_line = None;
        for mapping in lines {
            if mapped_line == Some(mapping.output_line) {
                continue;
            }
            while line < mapping.output_line {
                mappings.push(';');
                line += 1;
            }
            mapped_line = Some(mapping.output_line);

            let source = i64::from(mapping.source);
            let original = i64::from(mapping.original_line);
            encode_vlq(&mut mappings, 0);
            encode_vlq(&mut mappings, source - previous_source);
            encode_vlq(&mut mappings, original - previous_original);
            encode_vlq(&mut mappings, 0);
            previous_source = source;
            previous_original = original;
        }
        Self {
            version: 3,
            file: file.into(),
            sources,
            names: Vec::new(),
            mappings,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Appends `value` as a base64 VLQ: sign in the lowest bit, five bits per digit.
fn encode_vlq(out: &mut String, value: i64) {
    let mut rest = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = (rest & 0b1_1111) as usize;
        rest >>= 5;
        if rest > 0 {
            digit |= 0b10_0000;
        }
        out.push(char::from(BASE64[digit]));
        if rest == 0 {
            break;
        }
    }
}
