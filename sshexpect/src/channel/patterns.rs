//! Named pattern sets for completion and error detection.

use indexmap::IndexMap;
use regex::bytes::Regex;

use crate::error::PatternError;

/// Prompt pattern used when none is configured. Matches a trailing `#`, `$`
/// or `>` optionally followed by whitespace.
pub const DEFAULT_READY_PATTERN: &str = r"[#$>]\s*$";

/// Compile a single named pattern.
pub fn compile_pattern(name: &str, pattern: &str) -> Result<Regex, PatternError> {
    Regex::new(pattern).map_err(|source| PatternError::Syntax {
        name: name.to_string(),
        source,
    })
}

/// An ordered set of named, compiled patterns.
///
/// Matching walks the set in insertion order and the first pattern that
/// matches wins, so two patterns that both match the same text always
/// resolve to the one added first.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: IndexMap<String, Regex>,
}

impl PatternSet {
    /// Compile every pattern in `patterns`, keeping its order.
    ///
    /// Fails on the first pattern that is not a valid expression, naming it.
    pub fn compile<'a, I>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let patterns = patterns
            .into_iter()
            .map(|(name, pattern)| Ok((name.clone(), compile_pattern(name, pattern)?)))
            .collect::<Result<IndexMap<_, _>, PatternError>>()?;
        Ok(Self { patterns })
    }

    /// Name of the first pattern matching anywhere in `text`.
    pub fn first_match(&self, text: &[u8]) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(text))
            .map(|(name, _)| name.as_str())
    }

    /// Iterate over names and compiled expressions.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Regex)> {
        self.patterns.iter().map(|(name, regex)| (name.as_str(), regex))
    }

    /// Number of patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the set has no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
