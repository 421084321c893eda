//! Commands: text to send plus the patterns that decide when it is done.

use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, trace};
use serde::Deserialize;

use super::patterns::PatternSet;
use crate::error::PatternError;
use crate::verbosity::Verbosity;

/// Compiled form of a command's pattern mappings.
#[derive(Debug)]
pub struct CompiledPatterns {
    /// Patterns that end the command.
    pub valid: PatternSet,

    /// Patterns that record a failure.
    pub error: PatternSet,
}

/// A command to run in the remote shell.
///
/// `exec` is written verbatim; no line terminator is added. The command is
/// finished when any *valid* pattern matches the output and nothing more is
/// buffered. *Error* patterns are recorded but do not stop reading unless
/// [`fail_fast`](Self::fail_fast) is set.
///
/// Patterns are tried in the order they were added. They are compiled once,
/// on first use, and the compiled form is reused for every later run of the
/// same `Command`.
///
/// A command whose valid patterns never match the remote output never
/// finishes unless the read is bounded by a timeout or cancellation.
///
/// # Example
///
/// ```rust
/// use sshexpect::Command;
///
/// let cmd = Command::new("sudo id\n")
///     .valid("prompt", r"\$\s*$")
///     .error("denied", "Permission denied");
/// assert_eq!(cmd.exec(), "sudo id\n");
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    exec: String,

    #[serde(default)]
    valid_patterns: IndexMap<String, String>,

    #[serde(default)]
    error_patterns: IndexMap<String, String>,

    #[serde(default)]
    fail_fast: bool,

    #[serde(skip)]
    compiled: Option<Arc<CompiledPatterns>>,
}

impl Command {
    /// Create a command with no patterns.
    pub fn new(exec: impl Into<String>) -> Self {
        Self {
            exec: exec.into(),
            ..Self::default()
        }
    }

    /// Add a valid (completion) pattern.
    pub fn valid(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.add_valid(name, pattern);
        self
    }

    /// Add an error pattern.
    pub fn error(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.add_error(name, pattern);
        self
    }

    /// Stop reading as soon as an error pattern is recorded.
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Add a valid pattern in place. Drops any compiled state.
    pub fn add_valid(&mut self, name: impl Into<String>, pattern: impl Into<String>) {
        self.valid_patterns.insert(name.into(), pattern.into());
        self.compiled = None;
    }

    /// Add an error pattern in place. Drops any compiled state.
    pub fn add_error(&mut self, name: impl Into<String>, pattern: impl Into<String>) {
        self.error_patterns.insert(name.into(), pattern.into());
        self.compiled = None;
    }

    /// The text written to the shell.
    pub fn exec(&self) -> &str {
        &self.exec
    }

    /// Valid patterns, name to pattern text.
    pub fn valid_patterns(&self) -> &IndexMap<String, String> {
        &self.valid_patterns
    }

    /// Error patterns, name to pattern text.
    pub fn error_patterns(&self) -> &IndexMap<String, String> {
        &self.error_patterns
    }

    /// Whether the first recorded error ends the command.
    pub fn is_fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Whether the patterns have been compiled.
    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    /// Compile the patterns, or return the cached result of an earlier
    /// compile.
    pub fn compile(&mut self) -> Result<Arc<CompiledPatterns>, PatternError> {
        if let Some(compiled) = &self.compiled {
            return Ok(Arc::clone(compiled));
        }

        let compiled = Arc::new(CompiledPatterns {
            valid: PatternSet::compile(&self.valid_patterns)?,
            error: PatternSet::compile(&self.error_patterns)?,
        });
        self.compiled = Some(Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Emit the command's configuration, gated by `verbosity`.
    pub(crate) fn log_config(&self, verbosity: Verbosity) {
        if verbosity.allows(3) {
            debug!("command exec = {:?}", self.exec);
            for (name, pattern) in &self.valid_patterns {
                debug!("command valid pattern {name} = {pattern:?}");
            }
            for (name, pattern) in &self.error_patterns {
                debug!("command error pattern {name} = {pattern:?}");
            }
        }

        if verbosity.allows(5) {
            if let Some(compiled) = &self.compiled {
                for (name, regex) in compiled.valid.iter() {
                    trace!("compiled valid pattern {name} = {:?}", regex.as_str());
                }
                for (name, regex) in compiled.error.iter() {
                    trace!("compiled error pattern {name} = {:?}", regex.as_str());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_is_memoized() {
        let mut cmd = Command::new("ls\n").valid("prompt", r"\$\s*$");
        assert!(!cmd.is_compiled());

        let first = cmd.compile().unwrap();
        let second = cmd.compile().unwrap();
        assert!(cmd.is_compiled());
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_adding_pattern_recompiles() {
        let mut cmd = Command::new("ls\n").valid("prompt", r"\$\s*$");
        let first = cmd.compile().unwrap();

        cmd.add_error("missing", "No such file");
        assert!(!cmd.is_compiled());

        let second = cmd.compile().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.error.len(), 1);
    }

    #[test]
    fn test_compile_error_names_pattern() {
        let mut cmd = Command::new("ls\n")
            .valid("prompt", r"\$\s*$")
            .error("bad", "[unclosed");
        let err = cmd.compile().unwrap_err();
        assert_eq!(err.name(), "bad");
        assert!(!cmd.is_compiled());
    }

    #[test]
    fn test_clone_shares_compiled_state() {
        let mut cmd = Command::new("ls\n").valid("prompt", r"\$\s*$");
        let first = cmd.compile().unwrap();
        let mut copy = cmd.clone();
        assert!(Arc::ptr_eq(&first, &copy.compile().unwrap()));
    }

    #[test]
    fn test_deserialize_keeps_pattern_order() {
        let cmd: Command = serde_json::from_str(
            r#"{
                "exec": "uptime\n",
                "validPatterns": { "zeta": "z$", "alpha": "a$" },
                "errorPatterns": { "denied": "Permission denied" }
            }"#,
        )
        .unwrap();

        assert_eq!(cmd.exec(), "uptime\n");
        let names: Vec<_> = cmd.valid_patterns().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert!(!cmd.is_fail_fast());
        assert!(!cmd.is_compiled());
    }
}
