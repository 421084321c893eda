//! Command results and the error record built while reading them.

use std::time::Duration;

/// Ordered, de-duplicated names of error patterns seen during one command.
///
/// A name equal to the most recently recorded one is dropped, so a failing
/// condition that keeps matching while output grows is reported once. If a
/// different error matches in between, the first one is recorded again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorRecord {
    names: Vec<String>,
}

impl ErrorRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a match. Returns `true` if the name was appended.
    pub fn record(&mut self, name: &str) -> bool {
        if self.last() == Some(name) {
            return false;
        }
        self.names.push(name.to_string());
        true
    }

    /// The most recently recorded name.
    pub fn last(&self) -> Option<&str> {
        self.names.last().map(String::as_str)
    }

    /// Number of recorded names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Consume the record.
    pub fn into_vec(self) -> Vec<String> {
        self.names
    }
}

/// Output of one command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// The text that was written to the shell.
    pub command: String,

    /// Everything read from issuing the command until completion, including
    /// any echo of the command itself.
    pub output: String,

    /// Names of the error patterns that matched, in order, de-duplicated.
    pub errors: Vec<String>,

    /// Name of the pattern that ended the read loop.
    pub matched: String,

    /// Time taken to execute the command.
    pub elapsed: Duration,
}

impl CommandOutput {
    /// Whether no error pattern matched.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Human-readable descriptions of each recorded error.
    pub fn error_messages(&self) -> impl Iterator<Item = String> + '_ {
        self.errors
            .iter()
            .map(|name| format!("Matched error pattern: {name}"))
    }

    /// Get the output lines as an iterator.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines()
    }

    /// Check if the output contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.output.contains(pattern)
    }
}

impl std::fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.output)
    }
}
