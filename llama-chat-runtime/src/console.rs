use std::io;

use console::{style, Term};
use llama_chat_core::dialog::Message;

use crate::consumer::TokenSink;

/// Where a chat run writes its transcript
pub trait ChatOutput: TokenSink {
    /// A non fatal diagnostic, e.g. a skipped example
    fn notice(&mut self, text: &str) -> io::Result<()>;

    fn banner(&mut self) -> io::Result<()>;

    /// A prompt message, printed before its completion is streamed
    fn message(&mut self, message: &Message) -> io::Result<()>;

    /// Separator written once a dialog's completion is over
    fn end_dialog(&mut self) -> io::Result<()>;
}

/// ConsoleOutput
/// Writes the transcript to stdout, generated text in yellow
#[derive(Debug, Clone)]
pub struct ConsoleOutput {
    term: Term,
}

impl ConsoleOutput {
    pub fn stdout() -> Self {
        Self {
            term: Term::stdout(),
        }
    }
}

impl TokenSink for ConsoleOutput {
    fn emit(&mut self, text: &str) -> io::Result<()> {
        self.term.write_str(&style(text).yellow().to_string())?;
        self.term.flush()
    }
}

impl ChatOutput for ConsoleOutput {
    fn notice(&mut self, text: &str) -> io::Result<()> {
        self.term.write_line(text)
    }

    fn banner(&mut self) -> io::Result<()> {
        self.term
            .write_line("\n\n==== Starting Chat Completion ====\n")
    }

    fn message(&mut self, message: &Message) -> io::Result<()> {
        self.term.write_line(&format!(
            "{}: {}\n",
            message.role().label(),
            message.content()
        ))
    }

    fn end_dialog(&mut self) -> io::Result<()> {
        self.term.write_line("\n")
    }
}
