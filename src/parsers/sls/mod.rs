//! Tolerant parser for Salt state (`.sls`) files.
//!
//! Parsing runs in three passes: [`lexer`] splits rows into logical lines,
//! [`parsing`] rebuilds the indentation structure and [`conversion`] turns
//! that structure into an [`SlsTree`]. None of the passes can fail.

mod conversion;
mod lexer;
mod parsing;

use tracing::trace;

use crate::ir::SlsTree;
use crate::parsers::position_utils::LineIndex;

/// Parses `text` into a tree. Always succeeds; problems are reported through
/// [`SlsTree::diagnostics`].
pub fn parse(text: &str) -> SlsTree {
    let index = LineIndex::new(text);
    let lines = lexer::tokenize(&index);
    let document = parsing::parse_blocks(lines, &index);
    let tree = conversion::build_tree(document, &index);
    trace!(nodes = tree.len(), diagnostics = tree.diagnostics().len(), "parsed sls text");
    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reparse_is_structurally_equal() {
        let text = "foo:\n  file.managed:\n    - source: x\n    - require:\n      - pkg: bar\n";
        assert_eq!(parse(text), parse(text));
    }

    #[test]
    fn test_every_range_is_contained_by_its_parent() {
        let text = "include:\n  - a\nfoo:\n  file.:\n    - us\n    - require:\n      - \n  cmd.run\n";
        let tree = parse(text);
        for (id, node) in tree.nodes() {
            assert!(node.range.is_well_formed(), "{:?}", node);
            if let Some(parent) = tree.parent(id) {
                assert!(tree.range(parent).contains_range(&node.range), "{:?} not in parent", node);
            }
        }
    }
}
