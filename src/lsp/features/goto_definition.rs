//! Goto-definition for requisite targets and include entries.
//!
//! ```text
//! cursor
//!   ├─ on a requisite target ─→ current document, then include closure
//!   │                           breadth first ─→ state declaration range
//!   └─ on an include entry   ─→ resolved file ─→ its first state range
//!                                                (whole file if none)
//! ```

use std::sync::Arc;

use tower_lsp::lsp_types::Location;
use tracing::debug;

use crate::ir::{NodeKind, Position, SlsTree};
use crate::lsp::backend::workspace_index::WorkspaceIndex;
use crate::lsp::features::node_finder::{PositionEncoding, find_node_at_position, to_lsp_range};
use crate::lsp::models::SlsDocument;
use crate::parsers::position_utils::LineIndex;

/// What the cursor points at, as far as definitions go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionTarget {
    Requisite {
        target_module: Option<String>,
        target_id: String,
    },
    Include {
        path: String,
    },
}

pub fn definition_target(tree: &SlsTree, text: &str, position: Position) -> Option<DefinitionTarget> {
    let index = LineIndex::new(text);
    let node = find_node_at_position(tree, &index, position)?;
    match tree.kind(node) {
        NodeKind::RequisiteEntry { target_module, target_id, target_range }
            if target_range.touches(position) && !target_id.is_empty() =>
        {
            Some(DefinitionTarget::Requisite {
                target_module: target_module.clone(),
                target_id: target_id.clone(),
            })
        }
        NodeKind::IncludeEntry { path } if !path.is_empty() => Some(DefinitionTarget::Include { path: path.clone() }),
        _ => None,
    }
}

/// Location of the definition under `position` in `document`, if any. The
/// returned range is expressed in `encoding` columns of the target file.
pub fn find_definition(
    index: &WorkspaceIndex,
    document: Arc<SlsDocument>,
    position: Position,
    encoding: PositionEncoding,
) -> Option<Location> {
    let target = definition_target(&document.tree, &document.text, position)?;
    debug!("Definition target at {} in {}: {:?}", position, document.uri, target);

    match target {
        DefinitionTarget::Requisite { target_module, target_id } => {
            let (found, state) = index.find_state(document, &target_id, target_module.as_deref())?;
            Some(Location::new(
                found.uri.clone(),
                to_lsp_range(&found.text, found.tree.range(state), encoding),
            ))
        }
        DefinitionTarget::Include { path } => {
            let from = document.path.as_deref()?;
            let resolved = index.resolve_include(from, &path)?;
            let target = index.document(&resolved)?;
            let tree = &target.tree;
            let range = tree
                .states()
                .next()
                .map(|state| tree.range(state))
                .unwrap_or_else(|| tree.range(tree.root()));
            Some(Location::new(target.uri.clone(), to_lsp_range(&target.text, range, encoding)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::parse;

    #[test]
    fn test_targets() {
        let text = "include:\n  - bar\n\nfoo:\n  test.nop:\n    - require:\n      - /root/.fishrc\n      - user: root\n";
        let tree = parse(text);
        assert_eq!(
            definition_target(&tree, text, Position::new(1, 5)),
            Some(DefinitionTarget::Include { path: "bar".into() })
        );
        assert_eq!(
            definition_target(&tree, text, Position::new(6, 10)),
            Some(DefinitionTarget::Requisite { target_module: None, target_id: "/root/.fishrc".into() })
        );
        assert_eq!(
            definition_target(&tree, text, Position::new(7, 15)),
            Some(DefinitionTarget::Requisite { target_module: Some("user".into()), target_id: "root".into() })
        );
        assert_eq!(definition_target(&tree, text, Position::new(4, 4)), None);
        assert_eq!(definition_target(&tree, text, Position::new(3, 1)), None);
    }

    #[test]
    fn test_requisite_key_is_not_a_target() {
        let text = "foo:\n  test.nop:\n    - require:\n      - user: root\n";
        let tree = parse(text);
        assert_eq!(definition_target(&tree, text, Position::new(3, 9)), None);
    }
}
