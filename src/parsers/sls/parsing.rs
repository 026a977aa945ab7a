//! Indentation-driven block parser.
//!
//! Builds a generic mapping/sequence/scalar structure from the logical lines
//! produced by the lexer. It never fails: misplaced lines are reported as
//! raw diagnostics and skipped, missing colons are repaired, and an empty
//! or unfinished block simply yields [`Value::Empty`].

use crate::ir::{Position, Range, Severity};
use crate::parsers::position_utils::LineIndex;

use super::lexer::{LogicalLine, Scalar, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Value {
    Mapping(Vec<Entry>),
    Sequence(Vec<Item>),
    Scalar(Scalar),
    Empty,
}

impl Value {
    pub fn start(&self) -> Option<Position> {
        match self {
            Value::Mapping(entries) => entries.first().map(|e| e.range.start),
            Value::Sequence(items) => items.first().map(|i| i.range.start),
            Value::Scalar(s) => Some(s.range.start),
            Value::Empty => None,
        }
    }

    pub fn end(&self) -> Option<Position> {
        match self {
            Value::Mapping(entries) => entries.last().map(|e| e.range.end),
            Value::Sequence(items) => items.last().map(|i| i.range.end),
            Value::Scalar(s) => Some(s.range.end),
            Value::Empty => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    pub key: Scalar,
    /// Position of the `:`; for a repaired key this is the key's end.
    pub colon: Position,
    pub missing_colon: bool,
    pub value: Value,
    /// From the key's start to the end of the value.
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Item {
    pub value: Value,
    /// From the dash (or first character for flow items) to the end of the value.
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawDiagnostic {
    pub range: Range,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug)]
pub(crate) struct Document {
    pub root: Value,
    pub diagnostics: Vec<RawDiagnostic>,
}

pub(crate) fn parse_blocks(lines: Vec<LogicalLine>, index: &LineIndex<'_>) -> Document {
    let mut parser = BlockParser { lines, pos: 0, index, diagnostics: Vec::new() };
    let root = parser.parse_root();
    Document { root, diagnostics: parser.diagnostics }
}

struct BlockParser<'a, 'b> {
    lines: Vec<LogicalLine>,
    pos: usize,
    index: &'b LineIndex<'a>,
    diagnostics: Vec<RawDiagnostic>,
}

impl BlockParser<'_, '_> {
    fn peek(&self) -> Option<&LogicalLine> {
        self.lines.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&LogicalLine> {
        self.lines.get(self.pos + offset)
    }

    fn next_line(&mut self) -> Option<LogicalLine> {
        let line = self.lines.get(self.pos).cloned();
        if line.is_some() {
            self.pos += 1;
        }
        line
    }

    fn report(&mut self, range: Range, severity: Severity, message: impl Into<String>) {
        self.diagnostics.push(RawDiagnostic { range, severity, message: message.into() });
    }

    fn line_range(line: &LogicalLine) -> Range {
        Range::new(Position::new(line.row, line.col), line.end)
    }

    fn parse_root(&mut self) -> Value {
        let Some(first_col) = self.peek().map(|l| l.col) else {
            return Value::Empty;
        };
        let mut root = self.parse_block(first_col);

        // Anything left is indented less than the first block.
        while let Some(line) = self.peek().cloned() {
            let stray = self.parse_block(line.col);
            match (&mut root, stray) {
                (Value::Mapping(entries), Value::Mapping(more)) => {
                    self.report(
                        Self::line_range(&line),
                        Severity::Warning,
                        "inconsistent indentation of top-level keys",
                    );
                    entries.extend(more);
                }
                _ => self.report(
                    Self::line_range(&line),
                    Severity::Error,
                    "unexpected content at top level",
                ),
            }
        }
        root
    }

    /// Parses the block starting at the next line if it is indented by at
    /// least `min_col`.
    fn parse_block(&mut self, min_col: u32) -> Value {
        let Some(line) = self.peek() else {
            return Value::Empty;
        };
        if line.col < min_col {
            return Value::Empty;
        }
        let col = line.col;
        match &line.token {
            Token::Dash => Value::Sequence(self.parse_sequence(col)),
            Token::Entry { .. } => Value::Mapping(self.parse_mapping(col)),
            Token::Scalar(_) => {
                // A bare word followed by keys at the same column, or by a
                // deeper list, is a key whose colon has not been typed yet.
                let missing_colon = self.peek_at(1).is_some_and(|next| {
                    (next.col == col && matches!(next.token, Token::Entry { .. }))
                        || (next.col > col && next.token == Token::Dash)
                });
                if missing_colon {
                    Value::Mapping(self.parse_mapping(col))
                } else {
                    self.parse_scalar_block(col)
                }
            }
        }
    }

    fn parse_scalar_block(&mut self, col: u32) -> Value {
        let Some(line) = self.next_line() else {
            return Value::Empty;
        };
        let Token::Scalar(mut scalar) = line.token else {
            return Value::Empty;
        };
        if let Some(end) = self.skip_deeper(col, false) {
            scalar.range.end = end;
            scalar.text = self.index.slice(scalar.range).to_string();
        }
        Value::Scalar(scalar)
    }

    fn parse_sequence(&mut self, col: u32) -> Vec<Item> {
        let mut items = Vec::new();
        while let Some(line) = self.peek().cloned() {
            if line.col < col {
                break;
            }
            if line.col > col {
                self.report(Self::line_range(&line), Severity::Error, "unexpected indentation");
                self.skip_deeper(col, false);
                continue;
            }
            if line.token != Token::Dash {
                break;
            }
            self.pos += 1;

            let dash = Position::new(line.row, line.col);
            let value = self.parse_block(col + 1);
            let end = value.end().unwrap_or(dash.shifted(1));
            items.push(Item { value, range: Range::new(dash, end) });
        }
        items
    }

    fn parse_mapping(&mut self, col: u32) -> Vec<Entry> {
        let mut entries = Vec::new();
        while let Some(line) = self.peek().cloned() {
            if line.col < col {
                break;
            }
            if line.col > col {
                self.report(Self::line_range(&line), Severity::Error, "unexpected indentation");
                self.skip_deeper(col, false);
                continue;
            }
            match line.token {
                Token::Entry { key, colon, value } => {
                    self.pos += 1;
                    let value = match value {
                        Some(inline) => self.parse_inline_value(col, inline),
                        None => self.parse_nested_value(col),
                    };
                    let end = value.end().unwrap_or(colon.shifted(1));
                    entries.push(Entry {
                        range: Range::new(key.range.start, end),
                        key,
                        colon,
                        missing_colon: false,
                        value,
                    });
                }
                Token::Scalar(key) => {
                    self.pos += 1;
                    self.report(key.range, Severity::Warning, format!("missing ':' after key '{}'", key.text));
                    let value = self.parse_nested_value(col);
                    let end = value.end().unwrap_or(key.range.end);
                    entries.push(Entry {
                        range: Range::new(key.range.start, end),
                        colon: key.range.end,
                        key,
                        missing_colon: true,
                        value,
                    });
                }
                Token::Dash => {
                    self.report(
                        Self::line_range(&line),
                        Severity::Error,
                        "list item where a mapping key was expected",
                    );
                    self.parse_sequence(col);
                }
            }
        }
        entries
    }

    /// Value of a key written without anything after the colon: a deeper
    /// block, or a sequence at the key's own column.
    fn parse_nested_value(&mut self, col: u32) -> Value {
        match self.peek() {
            Some(next) if next.col > col => self.parse_block(col + 1),
            Some(next) if next.col == col && next.token == Token::Dash => {
                Value::Sequence(self.parse_sequence(col))
            }
            _ => Value::Empty,
        }
    }

    fn parse_inline_value(&mut self, col: u32, mut scalar: Scalar) -> Value {
        let raw = self.index.slice(scalar.range);

        if is_block_indicator(raw) {
            if let Some(end) = self.skip_deeper(col, false) {
                let body_start = Position::new(scalar.range.start.line + 1, 0);
                scalar.text = self.index.slice(Range::new(body_start, end)).to_string();
                scalar.range.end = end;
            } else {
                scalar.text = String::new();
            }
            return Value::Scalar(scalar);
        }

        if raw.starts_with('[') && raw.ends_with(']') {
            let items = flow_items(&scalar, raw);
            self.skip_deeper(col, true);
            return Value::Sequence(items);
        }

        if let Some(end) = self.skip_deeper(col, true) {
            scalar.range.end = end;
            scalar.text = self.index.slice(scalar.range).to_string();
        }
        Value::Scalar(scalar)
    }

    /// Consumes every line indented deeper than `col` and returns the end of
    /// the last one. With `strict`, deeper keys and list items are reported
    /// since a scalar cannot hold a collection.
    fn skip_deeper(&mut self, col: u32, strict: bool) -> Option<Position> {
        let mut end = None;
        let mut reported_row = None;
        while let Some(line) = self.peek().cloned() {
            if line.col <= col {
                break;
            }
            let structural = matches!(line.token, Token::Entry { .. } | Token::Dash);
            if strict && structural && reported_row != Some(line.row) {
                reported_row = Some(line.row);
                self.report(
                    Self::line_range(&line),
                    Severity::Error,
                    "nested collection is not allowed after a scalar value",
                );
            }
            self.pos += 1;
            end = Some(line.end);
        }
        end
    }
}

fn is_block_indicator(raw: &str) -> bool {
    matches!(raw, "|" | ">" | "|-" | ">-" | "|+" | ">+")
}

/// Splits `[a, 'b', c]` into items. Commas inside quotes are kept.
fn flow_items(scalar: &Scalar, raw: &str) -> Vec<Item> {
    let chars: Vec<char> = raw.chars().collect();
    let row = scalar.range.start.line;
    let base = scalar.range.start.character;
    let inner_end = chars.len() - 1;

    let mut items = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 1;
    for i in 1..=inner_end {
        let at_end = i == inner_end;
        let c = chars[i];
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) if !at_end => continue,
            None if c == '\'' || c == '"' => quote = Some(c),
            _ => {}
        }
        if at_end || (quote.is_none() && c == ',') {
            let mut s = start;
            let mut e = i;
            while s < e && chars[s].is_whitespace() {
                s += 1;
            }
            while e > s && chars[e - 1].is_whitespace() {
                e -= 1;
            }
            if s < e {
                let range = Range::new(
                    Position::new(row, base + s as u32),
                    Position::new(row, base + e as u32),
                );
                items.push(Item {
                    value: Value::Scalar(Scalar { text: super::lexer::unquote(&chars[s..e]), range }),
                    range,
                });
            }
            start = i + 1;
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::sls::lexer::tokenize;

    fn parse(text: &str) -> Document {
        let index = LineIndex::new(text);
        parse_blocks(tokenize(&index), &index)
    }

    fn mapping(value: &Value) -> &[Entry] {
        match value {
            Value::Mapping(entries) => entries,
            other => panic!("expected mapping, got {:?}", other),
        }
    }

    fn sequence(value: &Value) -> &[Item] {
        match value {
            Value::Sequence(items) => items,
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_state_structure() {
        let doc = parse("saltmaster.packages:\n  pkg.installed:\n    - pkgs:\n      - salt-master\n");
        assert!(doc.diagnostics.is_empty(), "{:?}", doc.diagnostics);
        let top = mapping(&doc.root);
        assert_eq!(top[0].key.text, "saltmaster.packages");
        let body = mapping(&top[0].value);
        assert_eq!(body[0].key.text, "pkg.installed");
        let args = sequence(&body[0].value);
        let pkgs = mapping(&args[0].value);
        assert_eq!(pkgs[0].key.text, "pkgs");
        // sequence at the same column as its key
        let values = sequence(&pkgs[0].value);
        assert_eq!(values.len(), 1);
        assert_eq!(top[0].range.end, Position::new(3, 19));
    }

    #[test]
    fn test_multiple_keys_in_one_list_item() {
        let doc = parse("a:\n  b.c:\n    - name: x\n      user: root\n    - mode: 644\n");
        let args = sequence(&mapping(&mapping(&doc.root)[0].value)[0].value);
        assert_eq!(args.len(), 2);
        assert_eq!(mapping(&args[0].value).len(), 2);
    }

    #[test]
    fn test_scalar_body_and_missing_colon() {
        let doc = parse("root:\n  user.present\n");
        let top = mapping(&doc.root);
        assert!(matches!(&top[0].value, Value::Scalar(s) if s.text == "user.present"));

        let doc = parse("foo:\n  fi\n  file.managed: []\n");
        let body = mapping(&mapping(&doc.root)[0].value);
        assert!(body[0].missing_colon);
        assert_eq!(body[0].key.text, "fi");
        assert_eq!(body[1].value, Value::Sequence(vec![]));
        assert_eq!(doc.diagnostics.len(), 1);
    }

    #[test]
    fn test_missing_colon_over_argument_list() {
        let doc = parse("foo:\n  file.\n    - name: x\n");
        let body = mapping(&mapping(&doc.root)[0].value);
        assert_eq!(body.len(), 1);
        assert!(body[0].missing_colon);
        assert_eq!(body[0].key.text, "file.");
        assert_eq!(body[0].key.range, Range::new(Position::new(1, 2), Position::new(1, 7)));
        let args = sequence(&body[0].value);
        assert_eq!(mapping(&args[0].value)[0].key.text, "name");
        assert_eq!(doc.diagnostics.len(), 1);
        assert!(doc.diagnostics[0].message.contains("missing ':'"));

        // deeper plain lines still continue the scalar
        let doc = parse("foo:\n  cmd.run\n    more\n");
        let body = &mapping(&doc.root)[0].value;
        assert!(matches!(body, Value::Scalar(s) if s.text == "cmd.run\n    more"));
    }

    #[test]
    fn test_block_scalar_consumes_deeper_lines() {
        let doc = parse("motd:\n  file.managed:\n    - contents: |\n        line one\n        key: not a key\n    - mode: 644\n");
        let args = sequence(&mapping(&mapping(&doc.root)[0].value)[0].value);
        assert_eq!(args.len(), 2);
        let contents = &mapping(&args[0].value)[0];
        match &contents.value {
            Value::Scalar(s) => assert!(s.text.contains("key: not a key")),
            other => panic!("expected scalar, got {:?}", other),
        }
        assert!(doc.diagnostics.is_empty());
    }

    #[test]
    fn test_flow_sequence_items() {
        let doc = parse("include: [bar, 'baz', .qux]\n");
        let items = sequence(&mapping(&doc.root)[0].value);
        let texts: Vec<_> = items
            .iter()
            .map(|i| match &i.value {
                Value::Scalar(s) => s.text.clone(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(texts, vec!["bar", "baz", ".qux"]);
        assert_eq!(items[0].range, Range::new(Position::new(0, 10), Position::new(0, 13)));
    }

    #[test]
    fn test_unexpected_indentation_is_reported_and_skipped() {
        let doc = parse("a:\n  b.c:\n    - x: 1\n        - oops\n  d.e: []\nnext:\n  f.g\n");
        assert!(!doc.diagnostics.is_empty());
        let top = mapping(&doc.root);
        assert_eq!(top.len(), 2);
        assert_eq!(top[1].key.text, "next");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse("").root, Value::Empty);
        assert_eq!(parse("# only a comment\n\n").root, Value::Empty);
    }
}
