//! Line table for resolving `{line, column}` pairs to buffer offsets.
//!
//! Lines are 1-based and split on `\n`. Columns count characters within a
//! line. Offsets are UTF-8 byte offsets into the buffer and always land on a
//! char boundary.

use serde::{Deserialize, Serialize};

/// A position as reported by a text surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Precomputed line starts for one buffer revision.
pub struct LineTable<'a> {
    text: &'a str,
    /// Byte offset of the first character of each line.
    starts: Vec<usize>,
}

impl<'a> LineTable<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut starts = Vec::with_capacity(text.len() / 32 + 1);
        starts.push(0);
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { text, starts }
    }

    /// Number of lines. An empty buffer has one empty line.
    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// Total buffer length in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Byte range of `line` (1-based), excluding its line break.
    pub fn line_range(&self, line: usize) -> Option<std::ops::Range<usize>> {
        if line == 0 || line > self.starts.len() {
            return None;
        }
        let start = self.starts[line - 1];
        let end = match self.starts.get(line) {
            Some(next) => next - 1,
            None => self.text.len(),
        };
        Some(start..end)
    }

    /// Length of `line` in characters.
    pub fn line_len(&self, line: usize) -> Option<usize> {
        self.line_range(line).map(|r| self.text[r].chars().count())
    }

    /// Resolve a reported position to a byte offset.
    ///
    /// A line beyond the last one is clamped to the last line; a column
    /// beyond the line's length is clamped to the line end. Lines below 1 and
    /// negative columns are outside the domain and yield `None`.
    pub fn offset_of(&self, line: i64, column: i64) -> Option<usize> {
        if line < 1 || column < 0 {
            return None;
        }
        let line = (line as u64).min(self.starts.len() as u64) as usize;
        let range = self.line_range(line)?;
        let line_text = &self.text[range.clone()];
        let offset = match line_text.char_indices().nth(column as usize) {
            Some((byte, _)) => range.start + byte,
            None => range.end,
        };
        Some(offset)
    }

    /// Position of a byte offset. Offsets past the end or inside a
    /// multi-byte character are floored to the nearest valid boundary.
    pub fn position_of(&self, offset: usize) -> Position {
        let offset = floor_char_boundary(self.text, offset);
        let line_idx = match self.starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let start = self.starts[line_idx];
        let column = self.text[start..offset].chars().count();
        Position::new(line_idx as u32 + 1, column as u32)
    }
}

/// Largest char boundary `<= offset`, clamped to the text length.
pub fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "def f():\n    return 1\n";

    #[test]
    fn test_line_count() {
        assert_eq!(LineTable::new("").line_count(), 1);
        assert_eq!(LineTable::new("a").line_count(), 1);
        assert_eq!(LineTable::new(SAMPLE).line_count(), 3);
    }

    #[test]
    fn test_line_range() {
        let table = LineTable::new(SAMPLE);
        assert_eq!(table.line_range(1), Some(0..8));
        assert_eq!(table.line_range(2), Some(9..21));
        assert_eq!(table.line_range(3), Some(22..22));
        assert_eq!(table.line_range(0), None);
        assert_eq!(table.line_range(4), None);
    }

    #[test]
    fn test_offset_of_exact() {
        let table = LineTable::new(SAMPLE);
        assert_eq!(table.offset_of(1, 0), Some(0));
        assert_eq!(table.offset_of(2, 4), Some(13));
    }

    #[test]
    fn test_column_clamped_to_line_end() {
        let table = LineTable::new(SAMPLE);
        // Line 1 is "def f():" (8 chars); column 50 lands on its end.
        assert_eq!(table.offset_of(1, 50), Some(8));
    }

    #[test]
    fn test_line_clamped_to_last_line() {
        let table = LineTable::new("a\nbc");
        assert_eq!(table.offset_of(9, 1), Some(3));
        assert_eq!(table.offset_of(9, 9), Some(4));
    }

    #[test]
    fn test_out_of_domain_positions() {
        let table = LineTable::new(SAMPLE);
        assert_eq!(table.offset_of(0, 0), None);
        assert_eq!(table.offset_of(-3, 0), None);
        assert_eq!(table.offset_of(1, -1), None);
    }

    #[test]
    fn test_columns_count_chars() {
        let table = LineTable::new("héllo\nwörld");
        // 'é' is two bytes: column 2 is at byte 3.
        assert_eq!(table.offset_of(1, 2), Some(3));
        assert_eq!(table.line_len(1), Some(5));
        assert_eq!(table.offset_of(2, 2), Some(7 + 3));
    }

    #[test]
    fn test_position_of() {
        let table = LineTable::new(SAMPLE);
        assert_eq!(table.position_of(0), Position::new(1, 0));
        assert_eq!(table.position_of(8), Position::new(1, 8));
        assert_eq!(table.position_of(9), Position::new(2, 0));
        assert_eq!(table.position_of(13), Position::new(2, 4));
        assert_eq!(table.position_of(1000), Position::new(3, 0));
    }

    #[test]
    fn test_position_of_inside_multibyte_char() {
        let table = LineTable::new("é");
        assert_eq!(table.position_of(1), Position::new(1, 0));
        assert_eq!(table.position_of(2), Position::new(1, 1));
    }

    #[test]
    fn test_position_roundtrip() {
        let text = "fn main() {\n    println!(\"ü\");\n}";
        let table = LineTable::new(text);
        for (offset, _) in text.char_indices() {
            let pos = table.position_of(offset);
            assert_eq!(
                table.offset_of(pos.line as i64, pos.column as i64),
                Some(offset)
            );
        }
    }

    #[test]
    fn test_floor_char_boundary() {
        assert_eq!(floor_char_boundary("aé", 2), 1);
        assert_eq!(floor_char_boundary("aé", 3), 3);
        assert_eq!(floor_char_boundary("aé", 10), 3);
    }
}
