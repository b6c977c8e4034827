//! Parser settings.

use serde::Deserialize;

/// Default bound on live nested frames.
pub const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Maximum number of nested messages open at once. Chain links in tail position do not
    /// count, so long chains are limited only by the input.
    pub max_depth: usize,
    /// Require the unused trailing bits of a bit string's last octet to be zero.
    pub strict_unused_bits: bool,
    /// Fail when the top-level message does not consume the whole buffer.
    pub reject_trailing_data: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            max_depth: DEFAULT_MAX_DEPTH,
            strict_unused_bits: false,
            reject_trailing_data: false,
        }
    }
}

impl ParserConfig {
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn strict_unused_bits(mut self, on: bool) -> Self {
        self.strict_unused_bits = on;
        self
    }

    pub fn reject_trailing_data(mut self, on: bool) -> Self {
        self.reject_trailing_data = on;
        self
    }
}
