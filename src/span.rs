//! Source locations.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A half-open range `[start, end)` of UTF-8 byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    /// Creates a new range. `start` must not exceed `end`.
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "invalid range: {start}..{end}");
        Self { start, end }
    }

    /// An empty range at `offset`.
    pub fn empty(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns true if `offset` lies inside the range.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Returns true if `other` lies entirely inside this range.
    pub fn covers(&self, other: &TextRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Returns true if the two ranges share at least one byte.
    ///
    /// Two empty ranges at the same offset also count as overlapping.
    pub fn overlaps(&self, other: &TextRange) -> bool {
        if self.is_empty() && other.is_empty() {
            return self.start == other.start;
        }
        self.start < other.end && other.start < self.end
    }

    /// Slices `text` by this range.
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start.min(text.len())..self.end.min(text.len())]
    }

    /// Shifts the range left by `offset` bytes.
    pub fn relative_to(&self, offset: usize) -> TextRange {
        TextRange::new(self.start - offset, self.end - offset)
    }
}

/// A range within a specific file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub file: PathBuf,
    pub range: TextRange,
}

impl Span {
    pub fn new(file: impl Into<PathBuf>, range: TextRange) -> Self {
        Self {
            file: file.into(),
            range,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}

/// A zero-based line/column position, used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    /// Computes the position of a byte offset in `text`.
    pub fn of_offset(text: &str, offset: usize) -> Self {
        let offset = offset.min(text.len());
        let before = &text[..offset];
        let line = before.matches('\n').count() as u32;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let character = before[line_start..].chars().count() as u32;
        Self { line, character }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.character + 1)
    }
}

/// Returns the offset of the first byte of the line containing `offset`.
pub fn line_start(text: &str, offset: usize) -> usize {
    text[..offset.min(text.len())]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// Returns the offset just past the newline ending the line containing
/// `offset` (or the end of `text`).
pub fn line_end(text: &str, offset: usize) -> usize {
    let offset = offset.min(text.len());
    text[offset..]
        .find('\n')
        .map(|i| offset + i + 1)
        .unwrap_or(text.len())
}

/// Leading whitespace of the line containing `offset`.
pub fn indentation_at(text: &str, offset: usize) -> &str {
    let start = line_start(text, offset);
    let line = &text[start..];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlaps() {
        let a = TextRange::new(0, 5);
        assert!(a.overlaps(&TextRange::new(4, 6)));
        assert!(!a.overlaps(&TextRange::new(5, 6)));
        assert!(!a.overlaps(&TextRange::empty(5)));
        assert!(TextRange::empty(3).overlaps(&TextRange::empty(3)));
        assert!(a.overlaps(&TextRange::empty(2)));
    }

    #[test]
    fn test_position_of_offset() {
        let text = "line one\nline two\nline three";
        assert_eq!(Position::of_offset(text, 0), Position { line: 0, character: 0 });
        assert_eq!(Position::of_offset(text, 13), Position { line: 1, character: 4 });
        assert_eq!(Position::of_offset(text, 13).to_string(), "2:5");
    }

    #[test]
    fn test_line_helpers() {
        let text = "class A {\n    int x;\n}\n";
        let x = text.find("int").unwrap();
        assert_eq!(line_start(text, x), 10);
        assert_eq!(line_end(text, x), 21);
        assert_eq!(indentation_at(text, x), "    ");
        assert_eq!(indentation_at(text, 0), "");
    }
}
