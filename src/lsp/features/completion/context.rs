//! Classification of a cursor position into a completion intent.
//!
//! The innermost node at the cursor decides the intent:
//!
//! | node                              | cursor                 | intent            |
//! |-----------------------------------|------------------------|-------------------|
//! | `ModuleFunctionRef`               | key, up to the dot     | `ModuleName`      |
//! | `ModuleFunctionRef`               | key, after the dot     | `FunctionName`    |
//! | `ModuleFunctionRef`               | argument list          | `ParameterName`   |
//! | `Parameter`                       | key                    | `ParameterName`   |
//! | `RequisiteEntry` / `RequisiteList`| target                 | `RequisiteTarget` |
//! | `StateDeclaration`                | body line              | `ModuleName` or `ParameterName` by indentation |
//!
//! Everything else (ids, values, include lists, `extend`) has no intent.

use tracing::debug;

use crate::ir::{NodeId, NodeKind, Position, Range, SlsTree};
use crate::lsp::features::node_finder::find_node_at_position;
use crate::parsers::position_utils::LineIndex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionIntent {
    ModuleName {
        prefix: String,
    },
    FunctionName {
        module: String,
        prefix: String,
    },
    ParameterName {
        module: String,
        function: String,
        /// Keys already written under the same function, excluding the one
        /// under the cursor.
        present: Vec<String>,
        prefix: String,
    },
    RequisiteTarget {
        target_module: Option<String>,
        prefix: String,
    },
}

/// Determines what the user is typing at `position`.
///
/// A `.` trigger only ever completes a `module.function` key; anywhere else
/// the dot is part of a value or path and yields no intent.
pub fn determine_intent(
    tree: &SlsTree,
    text: &str,
    position: Position,
    trigger: Option<&str>,
) -> Option<CompletionIntent> {
    let index = LineIndex::new(text);
    let node = find_node_at_position(tree, &index, position)?;
    let intent = classify(tree, &index, node, position);

    let intent = match (trigger, intent) {
        (Some("."), Some(intent @ (CompletionIntent::ModuleName { .. } | CompletionIntent::FunctionName { .. }))) => {
            Some(intent)
        }
        (Some("."), _) => None,
        (_, intent) => intent,
    };
    debug!("Completion intent at {}: {:?}", position, intent);
    intent
}

fn classify(tree: &SlsTree, index: &LineIndex<'_>, node: NodeId, position: Position) -> Option<CompletionIntent> {
    match tree.kind(node) {
        NodeKind::ModuleFunctionRef { module, key_range, dot, .. } => {
            if key_range.touches(position) {
                return Some(key_intent(index, module, *key_range, *dot, position));
            }
            argument_intent(tree, index, node, None, position)
        }
        NodeKind::Parameter { key_range, .. } => {
            if !key_range.touches(position) {
                return None;
            }
            let function = tree.enclosing_function(node)?;
            argument_intent(tree, index, function, Some(node), position)
        }
        NodeKind::RequisiteEntry { target_module, target_range, .. } => {
            let at_empty_target = target_range.is_empty()
                && position.line == target_range.start.line
                && position >= target_range.start;
            if !target_range.touches(position) && !at_empty_target {
                return None;
            }
            let start = target_range.start.min(position);
            Some(CompletionIntent::RequisiteTarget {
                target_module: target_module.clone(),
                prefix: unquoted_prefix(index, Range::new(start, position)),
            })
        }
        NodeKind::RequisiteList { key_range, .. } => {
            if key_range.touches(position) {
                return None;
            }
            let prefix = line_item_prefix(index, position)?;
            Some(CompletionIntent::RequisiteTarget { target_module: None, prefix })
        }
        NodeKind::StateDeclaration { id_range, .. } => {
            if position.line <= id_range.start.line {
                return None;
            }
            body_intent(tree, index, node, position)
        }
        NodeKind::File | NodeKind::IncludeList { .. } | NodeKind::IncludeEntry { .. } | NodeKind::Extend => None,
    }
}

fn key_intent(
    index: &LineIndex<'_>,
    module: &str,
    key_range: Range,
    dot: Option<Position>,
    position: Position,
) -> CompletionIntent {
    match dot {
        Some(dot) if position > dot => CompletionIntent::FunctionName {
            module: module.to_string(),
            prefix: index.slice(Range::new(dot.shifted(1), position)).to_string(),
        },
        _ => CompletionIntent::ModuleName {
            prefix: unquoted_prefix(index, Range::new(key_range.start, position)),
        },
    }
}

/// Parameter completion under `function`. `current` is the parameter whose
/// key the cursor is in, if any.
fn argument_intent(
    tree: &SlsTree,
    index: &LineIndex<'_>,
    function: NodeId,
    current: Option<NodeId>,
    position: Position,
) -> Option<CompletionIntent> {
    let NodeKind::ModuleFunctionRef { module, function: name, .. } = tree.kind(function) else {
        return None;
    };

    let prefix = match current.map(|param| tree.kind(param)) {
        Some(NodeKind::Parameter { key_range, .. }) => {
            unquoted_prefix(index, Range::new(key_range.start, position.max(key_range.start)))
        }
        _ => line_item_prefix(index, position)?,
    };

    let present = tree
        .children(function)
        .iter()
        .filter(|child| Some(**child) != current)
        .filter_map(|child| match tree.kind(*child) {
            NodeKind::Parameter { key, .. } => Some(key.clone()),
            _ => None,
        })
        .collect();

    Some(CompletionIntent::ParameterName {
        module: module.clone(),
        function: name.clone(),
        present,
        prefix,
    })
}

/// Cursor on a body line of a state that is not inside any node: indented
/// deeper than the last function key it is a parameter, otherwise a new
/// module key.
fn body_intent(tree: &SlsTree, index: &LineIndex<'_>, state: NodeId, position: Position) -> Option<CompletionIntent> {
    let function = tree
        .children(state)
        .iter()
        .copied()
        .filter(|child| match tree.kind(*child) {
            NodeKind::ModuleFunctionRef { key_range, .. } => key_range.start.line < position.line,
            _ => false,
        })
        .last();

    if let Some(function) = function {
        if let NodeKind::ModuleFunctionRef { key_range, .. } = tree.kind(function) {
            if position.character > key_range.start.character {
                return argument_intent(tree, index, function, None, position);
            }
        }
    }

    let prefix = index.line_prefix(position).trim_start();
    if prefix.contains(':') || prefix.starts_with('-') {
        return None;
    }
    Some(CompletionIntent::ModuleName { prefix: prefix.to_string() })
}

/// Word being typed as a list item on the cursor line (`  - us` gives `us`).
/// `None` once a colon has been written.
fn line_item_prefix(index: &LineIndex<'_>, position: Position) -> Option<String> {
    let line = index.line_prefix(position).trim_start();
    let line = line.strip_prefix('-').map(str::trim_start).unwrap_or(line);
    if line.contains(':') {
        return None;
    }
    Some(line.to_string())
}

fn unquoted_prefix(index: &LineIndex<'_>, range: Range) -> String {
    index
        .slice(range)
        .trim_start()
        .trim_start_matches(['"', '\''])
        .to_string()
}
