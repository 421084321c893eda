//! Output accumulator for a single handshake or command.
//!
//! Patterns may legitimately span several reads, so the accumulator never
//! drops data while an operation is running and every test looks at the
//! whole thing.

use std::ops::Range;

use regex::bytes::Regex;

use super::patterns::PatternSet;

/// Bytes received since the current operation started.
#[derive(Debug)]
pub struct Accumulator {
    buffer: Vec<u8>,
}

impl Accumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Append one byte.
    pub fn push(&mut self, byte: u8) {
        self.buffer.push(byte);
    }

    /// Append a run of bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Drop the last `n` bytes.
    pub fn truncate_tail(&mut self, n: usize) {
        let len = self.buffer.len().saturating_sub(n);
        self.buffer.truncate(len);
    }

    /// Span of the leftmost match of `pattern` in the accumulated output.
    pub fn find(&self, pattern: &Regex) -> Option<Range<usize>> {
        pattern.find(&self.buffer).map(|m| m.range())
    }

    /// First pattern in `set` matching the accumulated output.
    pub fn first_match<'s>(&self, set: &'s PatternSet) -> Option<&'s str> {
        set.first_match(&self.buffer)
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the accumulator, returning its contents as a string.
    pub fn into_string(self) -> String {
        match String::from_utf8(self.buffer) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}
