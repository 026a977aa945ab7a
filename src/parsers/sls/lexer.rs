//! Row lexer for SLS text.
//!
//! Each source row becomes zero or more logical lines. A row such as
//! `    - user: bernd` yields a `Dash` at column 4 followed by an `Entry` at
//! column 6 on the same row, so the block parser can treat compact nested
//! collections exactly like indented ones.
//!
//! Comments, blank rows, document markers and template statement rows
//! (`{% ... %}`, `{# ... #}`) produce nothing. Template expressions
//! (`{{ ... }}`) are ordinary text.

use crate::ir::{Position, Range};
use crate::parsers::position_utils::LineIndex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Scalar {
    /// Unquoted value.
    pub text: String,
    /// Source span, quotes included.
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Dash,
    Entry {
        key: Scalar,
        colon: Position,
        value: Option<Scalar>,
    },
    Scalar(Scalar),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogicalLine {
    pub row: u32,
    /// Column where this token starts.
    pub col: u32,
    /// Indentation of the whole row.
    pub row_indent: u32,
    pub token: Token,
    /// End of the row's meaningful content (comments stripped).
    pub end: Position,
}

pub(crate) fn tokenize(index: &LineIndex<'_>) -> Vec<LogicalLine> {
    let mut lines = Vec::new();
    for row in 0..index.line_count() as u32 {
        lex_row(row, index.line(row), &mut lines);
    }
    lines
}

fn lex_row(row: u32, line: &str, out: &mut Vec<LogicalLine>) {
    let chars: Vec<char> = line.chars().collect();
    let indent = chars.iter().take_while(|c| **c == ' ' || **c == '\t').count();
    let content_end = content_end(&chars, indent);
    if content_end <= indent {
        return;
    }

    let content = &chars[indent..content_end];
    if content.starts_with(&['{', '%']) || content.starts_with(&['{', '#']) {
        return;
    }
    if indent == 0 && (content == ['-', '-', '-'] || content == ['.', '.', '.']) {
        return;
    }

    let end = Position::new(row, content_end as u32);
    let chars = &chars[..content_end];
    let mut col = indent;
    loop {
        if chars[col] == '-' && chars.get(col + 1).is_none_or(|c| c.is_whitespace()) {
            out.push(LogicalLine {
                row,
                col: col as u32,
                row_indent: indent as u32,
                token: Token::Dash,
                end,
            });
            col += 1;
            while col < content_end && chars[col].is_whitespace() {
                col += 1;
            }
            if col >= content_end {
                return;
            }
            continue;
        }
        out.push(LogicalLine {
            row,
            col: col as u32,
            row_indent: indent as u32,
            token: lex_content(row, chars, col),
            end,
        });
        return;
    }
}

/// Index just past the last meaningful character: inline comments and
/// trailing whitespace are cut off.
fn content_end(chars: &[char], start: usize) -> usize {
    let mut quote: Option<char> = None;
    let mut end = chars.len();
    for i in start..chars.len() {
        let c = chars[i];
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if (c == '\'' || c == '"') && opens_quote(chars, i, start) => quote = Some(c),
            None if c == '#' && (i == start || chars[i - 1].is_whitespace()) => {
                end = i;
                break;
            }
            None => {}
        }
    }
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    end
}

/// A quote only starts a quoted region at the beginning of a token, so
/// apostrophes inside plain words (`don't`) are left alone.
fn opens_quote(chars: &[char], i: usize, start: usize) -> bool {
    i == start || matches!(chars[i - 1], ' ' | '\t' | '[' | '{' | ',' | ':' | '-')
}

fn lex_content(row: u32, chars: &[char], col: usize) -> Token {
    let end = chars.len();

    if matches!(chars[col], '"' | '\'') {
        if let Some(close) = closing_quote(chars, col) {
            let mut after = close + 1;
            while after < end && chars[after] == ' ' {
                after += 1;
            }
            if after < end && is_mapping_colon(chars, after) {
                let key = Scalar {
                    text: unquote(&chars[col..=close]),
                    range: span(row, col, close + 1),
                };
                return entry(row, chars, key, after);
            }
        }
    }

    if let Some(colon) = find_mapping_colon(chars, col) {
        let mut key_end = colon;
        while key_end > col && chars[key_end - 1].is_whitespace() {
            key_end -= 1;
        }
        let key = Scalar {
            text: chars[col..key_end].iter().collect(),
            range: span(row, col, key_end),
        };
        return entry(row, chars, key, colon);
    }

    Token::Scalar(Scalar {
        text: unquote(&chars[col..end]),
        range: span(row, col, end),
    })
}

fn entry(row: u32, chars: &[char], key: Scalar, colon: usize) -> Token {
    let mut value_start = colon + 1;
    while value_start < chars.len() && chars[value_start].is_whitespace() {
        value_start += 1;
    }
    let value = (value_start < chars.len()).then(|| Scalar {
        text: unquote(&chars[value_start..]),
        range: span(row, value_start, chars.len()),
    });
    Token::Entry {
        key,
        colon: Position::new(row, colon as u32),
        value,
    }
}

fn is_mapping_colon(chars: &[char], i: usize) -> bool {
    chars[i] == ':' && chars.get(i + 1).is_none_or(|c| c.is_whitespace())
}

/// First `:` that ends a plain key, skipping quoted regions.
fn find_mapping_colon(chars: &[char], start: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for i in start..chars.len() {
        let c = chars[i];
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if (c == '\'' || c == '"') && opens_quote(chars, i, start) => quote = Some(c),
            None if i > start && is_mapping_colon(chars, i) => return Some(i),
            None => {}
        }
    }
    None
}

fn closing_quote(chars: &[char], open: usize) -> Option<usize> {
    let q = chars[open];
    let mut i = open + 1;
    while i < chars.len() {
        if q == '"' && chars[i] == '\\' {
            i += 2;
            continue;
        }
        if chars[i] == q {
            // '' is an escaped quote inside a single-quoted scalar
            if q == '\'' && chars.get(i + 1) == Some(&'\'') {
                i += 2;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

pub(crate) fn unquote(chars: &[char]) -> String {
    let n = chars.len();
    if n >= 2 && chars[0] == chars[n - 1] && matches!(chars[0], '"' | '\'') {
        let inner = &chars[1..n - 1];
        if chars[0] == '\'' {
            return inner.iter().collect::<String>().replace("''", "'");
        }
        let mut out = String::with_capacity(inner.len());
        let mut iter = inner.iter();
        while let Some(&c) = iter.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match iter.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(&other) => out.push(other),
                None => out.push('\\'),
            }
        }
        return out;
    }
    chars.iter().collect::<String>().trim().to_string()
}

fn span(row: u32, start: usize, end: usize) -> Range {
    Range::new(Position::new(row, start as u32), Position::new(row, end as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> Vec<LogicalLine> {
        tokenize(&LineIndex::new(text))
    }

    fn entry_key(line: &LogicalLine) -> (&str, Option<&str>) {
        match &line.token {
            Token::Entry { key, value, .. } => (key.text.as_str(), value.as_ref().map(|v| v.text.as_str())),
            other => panic!("expected entry, got {:?}", other),
        }
    }

    #[test]
    fn test_compact_sequence_mapping_splits_into_two_tokens() {
        let lines = lex("      - user: bernd\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].token, Token::Dash);
        assert_eq!(lines[0].col, 6);
        assert_eq!(lines[1].col, 8);
        assert_eq!(entry_key(&lines[1]), ("user", Some("bernd")));
        assert_eq!(lines[1].row_indent, 6);
    }

    #[test]
    fn test_urls_and_paths_are_not_keys() {
        let lines = lex("    - source: salt://opensuse/bash\n      - /root/.fishrc\n");
        assert_eq!(entry_key(&lines[1]), ("source", Some("salt://opensuse/bash")));
        match &lines[3].token {
            Token::Scalar(s) => assert_eq!(s.text, "/root/.fishrc"),
            other => panic!("expected scalar, got {:?}", other),
        }
    }

    #[test]
    fn test_comments_and_template_rows_are_skipped() {
        let lines = lex("# header\n{% if grains.os == 'SUSE' %}\nfoo: # trailing\n{# note #}\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(entry_key(&lines[0]), ("foo", None));
        assert_eq!(lines[0].end, Position::new(2, 4));
    }

    #[test]
    fn test_quoted_key_and_value() {
        let lines = lex("'/srv/my dir': \"a: b\"\n");
        match &lines[0].token {
            Token::Entry { key, value, colon } => {
                assert_eq!(key.text, "/srv/my dir");
                assert_eq!(key.range, span(0, 0, 13));
                assert_eq!(*colon, Position::new(0, 13));
                assert_eq!(value.as_ref().map(|v| v.text.as_str()), Some("a: b"));
            }
            other => panic!("expected entry, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_function_key_is_an_entry() {
        let lines = lex("  file.:\n");
        assert_eq!(entry_key(&lines[0]), ("file.", None));
        let lines = lex("  file.\n");
        assert!(matches!(&lines[0].token, Token::Scalar(s) if s.text == "file."));
    }

    #[test]
    fn test_apostrophe_inside_word_does_not_hide_comment() {
        let lines = lex("- name: don't # really\n");
        assert_eq!(entry_key(&lines[1]), ("name", Some("don't")));
    }

    #[test]
    fn test_single_quote_escape() {
        assert_eq!(unquote(&"'it''s'".chars().collect::<Vec<_>>()), "it's");
        assert_eq!(unquote(&"\"a\\\"b\"".chars().collect::<Vec<_>>()), "a\"b");
    }
}
