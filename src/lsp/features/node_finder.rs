//! Node lookup at a cursor position and LSP <-> tree coordinate conversion.
//!
//! Tree positions count characters. LSP positions count UTF-16 code units
//! unless the client accepted UTF-32, in which case conversion is a field
//! copy. The interesting part is deciding which node a cursor belongs to
//! when it sits in trailing whitespace: after `- ` or `user: ` the node
//! being typed ends before the cursor, yet the cursor is still "in" it.

use tower_lsp::lsp_types::{Position as LspPosition, PositionEncodingKind, Range as LspRange};
use tracing::trace;

use crate::ir::{NodeId, Position, Range, SlsTree};
use crate::parsers::position_utils::LineIndex;

/// Column unit agreed with the client during `initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionEncoding {
    #[default]
    Utf16,
    /// Columns are characters, the unit the tree uses.
    Utf32,
}

impl PositionEncoding {
    /// UTF-32 when the client offers it, otherwise the mandatory UTF-16.
    pub fn negotiate(offered: Option<&[PositionEncodingKind]>) -> Self {
        match offered {
            Some(kinds) if kinds.contains(&PositionEncodingKind::UTF32) => PositionEncoding::Utf32,
            _ => PositionEncoding::Utf16,
        }
    }

    pub fn kind(self) -> PositionEncodingKind {
        match self {
            PositionEncoding::Utf16 => PositionEncodingKind::UTF16,
            PositionEncoding::Utf32 => PositionEncodingKind::UTF32,
        }
    }
}

pub fn from_lsp_position(text: &str, position: LspPosition, encoding: PositionEncoding) -> Position {
    let position = Position::new(position.line, position.character);
    match encoding {
        PositionEncoding::Utf16 => LineIndex::new(text).from_utf16(position),
        PositionEncoding::Utf32 => position,
    }
}

fn to_lsp_position(index: &LineIndex<'_>, position: Position, encoding: PositionEncoding) -> LspPosition {
    let position = match encoding {
        PositionEncoding::Utf16 => index.to_utf16(position),
        PositionEncoding::Utf32 => position,
    };
    LspPosition { line: position.line, character: position.character }
}

/// Converts a range of the tree built from `text`.
pub fn to_lsp_range(text: &str, range: Range, encoding: PositionEncoding) -> LspRange {
    let index = LineIndex::new(text);
    LspRange {
        start: to_lsp_position(&index, range.start, encoding),
        end: to_lsp_position(&index, range.end, encoding),
    }
}

/// Innermost node at `position`.
///
/// When only whitespace separates the cursor from earlier content on the
/// same line, the lookup happens at the end of that content instead.
pub fn find_node_at_position(tree: &SlsTree, index: &LineIndex<'_>, position: Position) -> Option<NodeId> {
    let probe = probe_position(index, position);
    let node = tree.innermost_at(probe);
    trace!(
        "Node at {} (probe {}): {:?}",
        position,
        probe,
        node.map(|id| tree.kind(id).name())
    );
    node
}

fn probe_position(index: &LineIndex<'_>, position: Position) -> Position {
    let prefix = index.line_prefix(position);
    let trimmed = prefix.trim_end();
    if trimmed.len() == prefix.len() || trimmed.trim_start().is_empty() {
        return position;
    }
    Position::new(position.line, trimmed.chars().count() as u32)
}
