//! Byte-offset source positions.
//!
//! A [`Span`] names a half-open byte range in one source file, together with
//! the 1-based line and column of its first byte so diagnostics never have
//! to rescan the file. [`LineIndex`] is the lookup table the lexer uses to
//! stamp those coordinates while tokens are being produced.

use serde::{Deserialize, Serialize};

/// Byte offsets at which each line begins, built once per source buffer.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    /// Scan the source, recording where every line starts. Line 1 always
    /// starts at byte 0; each `\n` opens the next line.
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|&(_, byte)| byte == b'\n')
                .map(|(offset, _)| offset + 1),
        );
        Self { starts }
    }

    /// The 1-based (line, column) holding a byte offset. Columns count
    /// bytes from the line start.
    pub fn line_col(&self, offset: usize) -> (u32, u32) {
        // Every start <= offset belongs to this line or an earlier one, so
        // the count of such starts is already the 1-based line number.
        let line = self.starts.partition_point(|&start| start <= offset);
        let column = offset - self.starts[line - 1] + 1;
        (line as u32, column as u32)
    }
}

/// A half-open byte range in the source, carrying the 1-based line and
/// column of its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// First byte of the range.
    pub start: usize,
    /// One past the last byte of the range.
    pub end: usize,
    /// 1-based line of `start`.
    pub line: u32,
    /// 1-based byte column of `start`.
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// A zeroed span for synthesized tokens and nodes.
    pub fn dummy() -> Self {
        Self::new(0, 0, 0, 0)
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The smallest span covering both inputs. Line and column come from
    /// whichever span begins earlier, so a merged span still points at its
    /// first byte.
    pub fn merge(self, other: Span) -> Span {
        let (first, second) = if self.start <= other.start {
            (self, other)
        } else {
            (other, self)
        };
        Span {
            start: first.start,
            end: first.end.max(second.end),
            line: first.line,
            column: first.column,
        }
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::dummy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_walks_lines_and_columns() {
        let index = LineIndex::new("let a = 1;\nlet bb = 2;\n\nreturn;");
        assert_eq!(index.line_col(0), (1, 1));
        assert_eq!(index.line_col(4), (1, 5)); // `a`
        assert_eq!(index.line_col(11), (2, 1)); // second `let`
        assert_eq!(index.line_col(15), (2, 5)); // first `b`
        assert_eq!(index.line_col(23), (3, 1)); // the blank line
        assert_eq!(index.line_col(24), (4, 1)); // `return`
    }

    #[test]
    fn single_line_source_stays_on_line_one() {
        let index = LineIndex::new("x + y");
        assert_eq!(index.line_col(0), (1, 1));
        assert_eq!(index.line_col(4), (1, 5));
    }

    #[test]
    fn merge_is_order_independent() {
        let head = Span::new(2, 6, 1, 3);
        let tail = Span::new(9, 14, 2, 4);
        assert_eq!(head.merge(tail), tail.merge(head));

        let merged = head.merge(tail);
        assert_eq!((merged.start, merged.end), (2, 14));
        assert_eq!((merged.line, merged.column), (1, 3));
    }

    #[test]
    fn merge_with_nested_span_keeps_outer_end() {
        let outer = Span::new(0, 20, 1, 1);
        let inner = Span::new(5, 9, 1, 6);
        assert_eq!(outer.merge(inner).end, 20);
        assert_eq!(inner.merge(outer).end, 20);
    }

    #[test]
    fn dummy_span_is_empty() {
        assert!(Span::dummy().is_empty());
        assert_eq!(Span::new(3, 8, 1, 4).len(), 5);
    }
}
