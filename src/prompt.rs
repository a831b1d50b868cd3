//! Operator input: plain lines and masked passwords

use crate::error::{ErrorCategory, ErrorKind, KisError, Result};
use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};
use zeroize::Zeroizing;

/// Source of operator input.
pub trait Prompt {
    /// Read one line of text, without its line terminator.
    fn read_line(&mut self, label: &str) -> Result<String>;

    /// Read a password. Terminal implementations do not echo it.
    ///
    /// Returns the password wrapped in `Zeroizing` to ensure it is securely
    /// wiped from memory when dropped.
    fn read_password(&mut self, label: &str) -> Result<Zeroizing<String>>;
}

/// Interactive prompt on the controlling terminal. Labels go to stderr.
pub struct TerminalPrompt;

impl TerminalPrompt {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompt for TerminalPrompt {
    fn read_line(&mut self, label: &str) -> Result<String> {
        let mut stderr = io::stderr();
        stderr
            .write_all(label.as_bytes())
            .and_then(|()| stderr.flush())
            .map_err(|e| io_error("failed to write prompt", e))?;

        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| io_error("failed to read input", e))?;
        if read == 0 {
            return Err(end_of_input());
        }
        trim_line_ending(&mut line);
        Ok(line)
    }

    /// Note: terminal input is limited to UTF-8 due to rpassword library constraints.
    fn read_password(&mut self, label: &str) -> Result<Zeroizing<String>> {
        if !io::stdin().is_terminal() {
            return Err(KisError::with_kind(
                ErrorCategory::User,
                ErrorKind::PromptUnavailable,
                "cannot read password from terminal - stdin is not a terminal (use --stdin)",
            ));
        }

        // Read password *without echo*
        let password = rpassword::prompt_password(label).map_err(|e| {
            KisError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PromptUnavailable,
                "failure reading password",
                e,
            )
        })?;

        Ok(Zeroizing::new(password))
    }
}

/// Answers prompts line by line from a reader, e.g. piped stdin.
///
/// Labels are not printed. Running out of lines is an error rather than an
/// empty answer.
pub struct ReaderPrompt {
    reader: Box<dyn BufRead>,
}

impl ReaderPrompt {
    pub fn new(reader: Box<dyn BufRead>) -> Self {
        Self { reader }
    }

    fn next_line(&mut self) -> Result<Zeroizing<String>> {
        let mut line = Zeroizing::new(String::new());
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|e| io_error("failed to read input", e))?;
        if read == 0 {
            return Err(end_of_input());
        }
        trim_line_ending(&mut line);
        Ok(line)
    }
}

impl Prompt for ReaderPrompt {
    fn read_line(&mut self, _label: &str) -> Result<String> {
        Ok((*self.next_line()?).clone())
    }

    fn read_password(&mut self, _label: &str) -> Result<Zeroizing<String>> {
        self.next_line()
    }
}

/// Fixed answers, consumed in order (for testing).
pub struct ScriptedPrompt {
    answers: VecDeque<Zeroizing<String>>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers
                .into_iter()
                .map(|a| Zeroizing::new(a.into()))
                .collect(),
        }
    }

    /// Answers not consumed yet.
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next_answer(&mut self) -> Result<Zeroizing<String>> {
        self.answers.pop_front().ok_or_else(end_of_input)
    }
}

impl Prompt for ScriptedPrompt {
    fn read_line(&mut self, _label: &str) -> Result<String> {
        Ok((*self.next_answer()?).clone())
    }

    fn read_password(&mut self, _label: &str) -> Result<Zeroizing<String>> {
        self.next_answer()
    }
}

fn trim_line_ending(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
}

fn end_of_input() -> KisError {
    KisError::with_kind(
        ErrorCategory::User,
        ErrorKind::PromptUnavailable,
        "unexpected end of input",
    )
}

fn io_error(msg: &str, err: io::Error) -> KisError {
    KisError::with_kind_and_source(
        ErrorCategory::Internal,
        ErrorKind::PromptUnavailable,
        format!("{}: {}", msg, err),
        err,
    )
}
