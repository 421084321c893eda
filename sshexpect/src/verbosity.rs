//! Diagnostic verbosity carried by clients and channels.
//!
//! Verbosity decides how much of the session configuration and command
//! detail is handed to the `log` facade. It is a plain value passed at
//! construction time; there is no process-wide level.

use serde::Deserialize;

/// Diagnostic verbosity from 1 (quiet) to 5 (everything).
///
/// - `>= 3`: each command and its pattern mappings
/// - `>= 4`: the client options on connect
/// - `5`: compiled pattern expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(from = "u8")]
pub struct Verbosity(u8);

impl Verbosity {
    /// Lowest verbosity.
    pub const MIN: Verbosity = Verbosity(1);

    /// Highest verbosity.
    pub const MAX: Verbosity = Verbosity(5);

    /// Create a verbosity, clamped to `1..=5`.
    pub fn new(level: u8) -> Self {
        Self(level.clamp(Self::MIN.0, Self::MAX.0))
    }

    /// The numeric level.
    pub fn level(self) -> u8 {
        self.0
    }

    /// Whether messages at `level` should be emitted.
    pub fn allows(self, level: u8) -> bool {
        self.0 >= level
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Self::MIN
    }
}

impl From<u8> for Verbosity {
    fn from(level: u8) -> Self {
        Self::new(level)
    }
}
