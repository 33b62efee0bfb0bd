use std::ops::Range;

use serde::Serialize;

/// Byte-offset span into a module's source text. Start is inclusive, end
/// is exclusive.
///
/// AST nodes handed to the semantic core carry a `Span`; line and column
/// numbers are left to the report renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// Span used for synthesized nodes that have no source text.
    pub const DUMMY: Span = Span { start: 0, end: 0 };

    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "span start ({start}) must be <= end ({end})");
        Self { start, end }
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// The span as a `usize` range, the form report renderers expect.
    pub fn to_range(self) -> Range<usize> {
        self.start as usize..self.end as usize
    }
}
