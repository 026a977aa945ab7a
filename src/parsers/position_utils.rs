//! Conversions between line/character positions and byte offsets.
//!
//! Positions count characters within a line (not bytes), so every
//! conversion goes through the line's text. Out-of-range positions are
//! clamped to the nearest valid offset rather than rejected; the editor may
//! send a cursor past the end of a line that is still being typed.

use crate::ir::{Position, Range};

/// Line start table over a borrowed text.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.char_indices()
                .filter(|(_, c)| *c == '\n')
                .map(|(i, _)| i + 1),
        );
        Self { text, line_starts }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Number of lines; a trailing newline opens one more (empty) line.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Text of line `line` without its terminator (`\n` or `\r\n`).
    pub fn line(&self, line: u32) -> &'a str {
        let Some(&start) = self.line_starts.get(line as usize) else {
            return "";
        };
        let end = self
            .line_starts
            .get(line as usize + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        let raw = &self.text[start..end];
        raw.strip_suffix('\r').unwrap_or(raw)
    }

    pub fn offset(&self, pos: Position) -> usize {
        let Some(&start) = self.line_starts.get(pos.line as usize) else {
            return self.text.len();
        };
        let line = self.line(pos.line);
        let within = line
            .char_indices()
            .nth(pos.character as usize)
            .map(|(i, _)| i)
            .unwrap_or(line.len());
        start + within
    }

    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let start = self.line_starts[line];
        let character = self.text[start..offset].chars().count();
        Position::new(line as u32, character as u32)
    }

    /// Position just past the last character of the text.
    pub fn end_position(&self) -> Position {
        self.position(self.text.len())
    }

    pub fn slice(&self, range: Range) -> &'a str {
        let start = self.offset(range.start);
        let end = self.offset(range.end).max(start);
        &self.text[start..end]
    }

    /// Converts a column counted in UTF-16 code units to a character
    /// column. A column inside a surrogate pair rounds down; columns past
    /// the end of the line keep their overshoot.
    pub fn from_utf16(&self, pos: Position) -> Position {
        let mut units = 0;
        let mut character = 0;
        for c in self.line(pos.line).chars() {
            let width = c.len_utf16() as u32;
            if units + width > pos.character {
                return Position::new(pos.line, character);
            }
            units += width;
            character += 1;
        }
        Position::new(pos.line, character + (pos.character - units))
    }

    /// Inverse of [`from_utf16`](Self::from_utf16).
    pub fn to_utf16(&self, pos: Position) -> Position {
        let mut units = 0;
        let mut counted = 0;
        for c in self.line(pos.line).chars().take(pos.character as usize) {
            units += c.len_utf16() as u32;
            counted += 1;
        }
        Position::new(pos.line, units + (pos.character - counted))
    }

    /// Text of the cursor's line up to the cursor.
    pub fn line_prefix(&self, pos: Position) -> &'a str {
        let line = self.line(pos.line);
        let end = line
            .char_indices()
            .nth(pos.character as usize)
            .map(|(i, _)| i)
            .unwrap_or(line.len());
        &line[..end]
    }
}
