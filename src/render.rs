//! Output rendering for chat responses.
//!
//! A response has two text channels: reasoning tokens, shown dimmed after a
//! `Thinking :` header, and answer tokens. The [`Renderer`] trait receives both
//! as they stream in; [`PlainTextRenderer`] writes them to a terminal or any
//! other writer.

use std::env;
use std::io::{self, IsTerminal, Stdout, Write};

/// ANSI escape code for dim text (used for reasoning).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text (used for reasoning).
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// Label printed before every assistant response.
pub const RESPONSE_LABEL: &str = "DeepSeek> ";

/// Header printed before the first reasoning fragment.
pub const REASONING_HEADER: &str = "Thinking :";

/// Printed once between the reasoning and the answer.
pub const REASONING_FINISHED: &str = "==========Reasoning finished.==========";

/// Trait for rendering chat output.
pub trait Renderer: Send {
    /// Called before the first chunk of a streamed response.
    fn start_response(&mut self);

    /// Called before the first reasoning fragment of a response.
    fn start_reasoning(&mut self);

    /// Print a chunk of reasoning text.
    fn print_reasoning(&mut self, text: &str);

    /// Called once, before the first answer fragment, when the response reasoned.
    fn finish_reasoning(&mut self);

    /// Print a chunk of answer text.
    ///
    /// This is called incrementally as tokens are streamed from the API.
    fn print_answer(&mut self, text: &str);

    /// Called when a streamed response is complete.
    fn finish_response(&mut self);

    /// Print a whole non-streamed response.
    fn print_complete(&mut self, text: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);
}

/// Plain text renderer with optional ANSI styling.
///
/// Output is flushed after every fragment so tokens appear as they arrive.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    in_reasoning: bool,
}

impl PlainTextRenderer<Stdout> {
    /// Creates a renderer on stdout.
    ///
    /// Color is used when stdout is a terminal and `NO_COLOR` is not set.
    pub fn new() -> Self {
        let stdout = io::stdout();
        let use_color = stdout.is_terminal() && env::var_os("NO_COLOR").is_none();
        Self::with_writer(stdout, use_color)
    }

    /// Creates a renderer on stdout with the specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl Default for PlainTextRenderer<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer on an arbitrary writer.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            in_reasoning: false,
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    // Rendering is best-effort: a closed stdout must not abort the turn.
    fn write(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    fn reset_reasoning(&mut self) {
        if self.in_reasoning {
            if self.use_color {
                self.write(ANSI_RESET);
            }
            self.in_reasoning = false;
        }
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn start_response(&mut self) {
        self.write(RESPONSE_LABEL);
        self.write("\n");
    }

    fn start_reasoning(&mut self) {
        self.write(REASONING_HEADER);
    }

    fn print_reasoning(&mut self, text: &str) {
        if self.use_color && !self.in_reasoning {
            self.write(ANSI_DIM);
            self.write(ANSI_ITALIC);
        }
        self.in_reasoning = true;
        self.write(text);
    }

    fn finish_reasoning(&mut self) {
        self.reset_reasoning();
        self.write(&format!("\n{REASONING_FINISHED}\n"));
    }

    fn print_answer(&mut self, text: &str) {
        self.reset_reasoning();
        self.write(text);
    }

    fn finish_response(&mut self) {
        self.reset_reasoning();
        self.write("\n");
    }

    fn print_complete(&mut self, text: &str) {
        self.write(&format!("{RESPONSE_LABEL}{text}\n"));
    }

    fn print_info(&mut self, info: &str) {
        self.reset_reasoning();
        self.write(&format!("{info}\n"));
    }
}
