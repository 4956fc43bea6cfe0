use serde::{Deserialize, Serialize};
use std::fmt;

/// A region of source text.
///
/// Lines and columns are 1-based. The serialized field names follow the
/// diagnostic JSON format (`line`, `column`, `end_line`, `end_column`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    #[serde(rename = "line")]
    pub start_line: u32,
    #[serde(rename = "column")]
    pub start_col: u32,
    pub end_line: u32,
    #[serde(rename = "end_column")]
    pub end_col: u32,
}

impl Span {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// A zero-width span at `line:col`.
    pub fn point(line: u32, col: u32) -> Self {
        Self::new(line, col, line, col)
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        let (start_line, start_col) =
            (self.start_line, self.start_col).min((other.start_line, other.start_col));
        let (end_line, end_col) = (self.end_line, self.end_col).max((other.end_line, other.end_col));
        Span::new(start_line, start_col, end_line, end_col)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// A named source text plus a line index for diagnostics.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    line_offsets: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let mut line_offsets = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_offsets.push(i + 1);
            }
        }
        Self {
            name: name.into(),
            source,
            line_offsets,
        }
    }

    /// Text of the 1-based `line`, without its line terminator.
    pub fn line(&self, line: u32) -> Option<&str> {
        let idx = (line as usize).checked_sub(1)?;
        let start = *self.line_offsets.get(idx)?;
        let end = match self.line_offsets.get(idx + 1) {
            Some(next) => next - 1,
            None => self.source.len(),
        };
        Some(self.source[start..end].trim_end_matches('\r'))
    }

    pub fn line_count(&self) -> usize {
        self.line_offsets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_to_covers_both_ends() {
        let a = Span::new(2, 4, 2, 9);
        let b = Span::new(3, 1, 3, 6);
        assert_eq!(a.to(b), Span::new(2, 4, 3, 6));
        assert_eq!(b.to(a), Span::new(2, 4, 3, 6));
    }

    #[test]
    fn span_to_same_line_picks_extremes() {
        let a = Span::new(1, 5, 1, 7);
        let b = Span::new(1, 2, 1, 12);
        assert_eq!(a.to(b), Span::new(1, 2, 1, 12));
    }

    #[test]
    fn span_displays_start_position() {
        assert_eq!(Span::new(7, 3, 8, 1).to_string(), "7:3");
    }

    #[test]
    fn source_lines_are_one_based() {
        let src = SourceFile::new("main.tn", "fn Main(): Int {\r\n  return 1;\n}");
        assert_eq!(src.line(1), Some("fn Main(): Int {"));
        assert_eq!(src.line(2), Some("  return 1;"));
        assert_eq!(src.line(3), Some("}"));
        assert_eq!(src.line(0), None);
        assert_eq!(src.line(4), None);
        assert_eq!(src.line_count(), 3);
    }

    #[test]
    fn empty_source_has_one_empty_line() {
        let src = SourceFile::new("empty.tn", "");
        assert_eq!(src.line_count(), 1);
        assert_eq!(src.line(1), Some(""));
    }
}
