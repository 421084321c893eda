//! Channel layer: prompt handshake and pattern-driven command execution.
//!
//! This module handles the interactive session protocol over any duplex
//! byte stream, independent of how the stream was obtained.

mod buffer;
mod command;
mod guard;
mod patterns;
mod response;
mod shell;

pub use buffer::Accumulator;
pub use command::{Command, CompiledPatterns};
pub use guard::{Interrupt, ReadGuard};
pub use patterns::{compile_pattern, PatternSet, DEFAULT_READY_PATTERN};
pub use response::{CommandOutput, ErrorRecord};
pub use shell::{ScanMode, ShellChannel};
