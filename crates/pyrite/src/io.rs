use std::{
    collections::VecDeque,
    io::{self, Write},
};

/// Trait for handling output from the `print()` builtin function.
///
/// Program output is line-buffered by the interpreter: the writer sees each
/// completed line once, without its trailing newline. A trailing fragment that
/// never received a newline is handed over when the run terminates.
pub trait PrintWriter {
    /// Called once per completed output line.
    ///
    /// # Arguments
    /// * `line` - The line text without the terminating newline
    fn write_line(&mut self, line: &str);
}

/// Default `PrintWriter` that writes to stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write_line(&mut self, line: &str) {
        write_line_or_warn(&mut io::stdout().lock(), line);
    }
}

/// Writes `line` plus a newline, logging a failed write instead of returning it.
fn write_line_or_warn(out: &mut impl Write, line: &str) {
    if let Err(err) = writeln!(out, "{line}") {
        tracing::warn!(%err, "failed to write program output");
    }
}

/// `PrintWriter` that ignores all output.
///
/// The interpreter still keeps its own output log, so this is the writer to
/// use when only [`crate::Interpreter::output`] is of interest.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write_line(&mut self, _line: &str) {}
}

/// Forwards every line to a closure.
pub struct CallbackPrint<F: FnMut(&str)>(pub F);

impl<F: FnMut(&str)> PrintWriter for CallbackPrint<F> {
    fn write_line(&mut self, line: &str) {
        (self.0)(line);
    }
}

/// Source of lines for the `input()` builtin.
///
/// Called synchronously; the interpreter does not proceed until it returns.
pub trait InputReader {
    /// Returns the next line (without newline), or `None` at end of input.
    ///
    /// # Arguments
    /// * `prompt` - The prompt passed to `input()`, already written to the output
    fn read_line(&mut self, prompt: &str) -> Option<String>;
}

/// Input source that is always at end of input; `input()` raises `EOFError`.
#[derive(Debug, Default)]
pub struct NoInput;

impl InputReader for NoInput {
    fn read_line(&mut self, _prompt: &str) -> Option<String> {
        None
    }
}

/// Input source serving a fixed queue of lines.
#[derive(Debug, Default)]
pub struct QueuedInput(VecDeque<String>);

impl QueuedInput {
    pub fn new(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(lines.into_iter().map(Into::into).collect())
    }
}

impl InputReader for QueuedInput {
    fn read_line(&mut self, _prompt: &str) -> Option<String> {
        self.0.pop_front()
    }
}

/// Input source reading stdin.
#[derive(Debug, Default)]
pub struct StdInput;

impl InputReader for StdInput {
    fn read_line(&mut self, _prompt: &str) -> Option<String> {
        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\n', '\r']).len();
                line.truncate(trimmed);
                Some(line)
            }
        }
    }
}

/// The interpreter's line buffer and output log.
///
/// Text accumulates until a newline; each completed line is appended to the
/// log (bounded by `limit`, oldest lines dropped first) and forwarded to the
/// configured writer.
pub(crate) struct OutputBuffer {
    partial: String,
    lines: VecDeque<String>,
    limit: Option<usize>,
    writer: Box<dyn PrintWriter>,
}

impl OutputBuffer {
    pub fn new(writer: Box<dyn PrintWriter>, limit: Option<usize>) -> Self {
        Self {
            partial: String::new(),
            lines: VecDeque::new(),
            limit,
            writer,
        }
    }

    pub fn set_writer(&mut self, writer: Box<dyn PrintWriter>) {
        self.writer = writer;
    }

    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
        self.trim();
    }

    pub fn write(&mut self, text: &str) {
        self.partial.push_str(text);
        while let Some(newline) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=newline).collect();
            self.push_line(line.trim_end_matches('\n').to_owned());
        }
    }

    /// Emits the unterminated fragment, if any, as a final line.
    pub fn flush(&mut self) {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.push_line(line);
        }
    }

    fn push_line(&mut self, line: String) {
        self.writer.write_line(&line);
        self.lines.push_back(line);
        self.trim();
    }

    fn trim(&mut self) {
        if let Some(limit) = self.limit {
            while self.lines.len() > limit {
                self.lines.pop_front();
            }
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    /// All retained output, including an unterminated fragment.
    pub fn text(&self) -> String {
        let mut text = self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
        if !self.partial.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&self.partial);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_writes_do_not_abort_the_program() {
        write_line_or_warn(&mut BrokenPipe, "lost");
        let mut sink = Vec::new();
        write_line_or_warn(&mut sink, "kept");
        assert_eq!(sink, b"kept\n");
    }

    #[test]
    fn lines_are_buffered_until_newline() {
        let mut out = OutputBuffer::new(Box::new(NoPrint), None);
        out.write("a");
        out.write("b\nc");
        assert_eq!(out.lines(), vec!["ab".to_owned()]);
        assert_eq!(out.text(), "ab\nc");
        out.flush();
        assert_eq!(out.lines(), vec!["ab".to_owned(), "c".to_owned()]);
    }

    #[test]
    fn limit_drops_oldest_lines() {
        let mut out = OutputBuffer::new(Box::new(NoPrint), Some(2));
        out.write("1\n2\n3\n");
        assert_eq!(out.lines(), vec!["2".to_owned(), "3".to_owned()]);
    }
}
