//! Output buffering: indentation, per-instruction line termination, and function bodies kept
//! apart from module-level declarations.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sink {
    Globals,
    Function(usize),
}

#[derive(Debug, Default)]
struct FunctionText {
    text: String,
    /// `(byte offset of a statement line, source index, original line)`.
    marks: Vec<(usize, u32, u32)>,
}

/// One output line traced back to an `OpLine` annotation. Both numbers are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMapping {
    pub output_line: u32,
    pub source: u32,
    pub original_line: u32,
}

#[derive(Debug)]
pub struct CodeWriter {
    globals: String,
    functions: Vec<FunctionText>,
    sink: Sink,
    indentation: usize,
    /// Sink holding an unterminated line begun by the current instruction.
    open_line: Option<Sink>,
    original: Option<(u32, u32)>,
}

impl Default for CodeWriter {
    fn default() -> Self {
        Self {
            globals: String::new(),
            functions: Vec::new(),
            sink: Sink::Globals,
            indentation: 0,
            open_line: None,
            original: None,
        }
    }
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(&mut self, sink: Sink) -> &mut String {
        match sink {
            Sink::Globals => &mut self.globals,
            Sink::Function(index) => &mut self.functions[index].text,
        }
    }

    /// Starts a new indented line in the current sink and returns the buffer to write it into.
    ///
    /// A line already begun by this instruction is terminated first.
    pub fn line(&mut self) -> &mut String {
        self.terminate_line();
        let sink = self.sink;
        self.open_line = Some(sink);
        if let (Sink::Function(index), Some((source, line))) = (sink, self.original) {
            let offset = self.functions[index].text.len();
            self.functions[index].marks.push((offset, source, line));
        }
        let indentation = self.indentation;
        let buffer = self.buffer(sink);
        for _ in 0..indentation {
            buffer.push('\t');
        }
        buffer
    }

    /// Raw access to the current sink for multi-line blocks that carry their own newlines.
    pub fn text(&mut self) -> &mut String {
        self.terminate_line();
        let sink = self.sink;
        self.buffer(sink)
    }

    /// Ends the current instruction: a begun line gets its newline, otherwise nothing is written.
    pub fn end_instruction(&mut self) {
        self.terminate_line();
    }

    fn terminate_line(&mut self) {
        if let Some(sink) = self.open_line.take() {
            self.buffer(sink).push('\n');
        }
    }

    pub fn indentation(&self) -> usize {
        self.indentation
    }

    pub fn indent(&mut self) {
        self.indentation += 1;
    }

    pub fn dedent(&mut self) {
        self.indentation = self.indentation.saturating_sub(1);
    }

    /// Redirects output into a fresh function body buffer.
    pub fn start_function(&mut self) {
        self.terminate_line();
        self.functions.push(FunctionText::default());
        self.sink = Sink::Function(self.functions.len() - 1);
    }

    /// Returns output to the module-level buffer.
    pub fn end_function(&mut self) {
        self.terminate_line();
        self.sink = Sink::Globals;
    }

    pub fn in_function(&self) -> bool {
        matches!(self.sink, Sink::Function(_))
    }

    /// Attributes following statement lines to `line` of source file `source` (zero-based).
    pub fn set_original_line(&mut self, source: u32, line: u32) {
        self.original = Some((source, line));
    }

    pub fn clear_original_line(&mut self) {
        self.original = None;
    }

    /// Joins module-level text and function bodies (each followed by a blank line).
    pub fn finish(mut self) -> (String, Vec<LineMapping>) {
        self.terminate_line();
        let mut output = self.globals;
        let mut line_base = count_lines(&output);
        let mut mappings = Vec::new();
        for function in self.functions {
            for &(offset, source, original_line) in &function.marks {
                mappings.push(LineMapping {
                    output_line: line_base + count_lines(&function.text[..offset]),
                    source,
                    original_line,
                });
            }
            output.push_str(&function.text);
            output.push('\n');
            line_base += count_lines(&function.text) + 1;
        }
        (output, mappings)
    }
}

fn count_lines(text: &str) -> u32 {
    text.bytes().filter(|&b| b == b'\n').count() as u32
}
