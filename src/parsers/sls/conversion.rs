//! Conversion of the generic block structure into the Salt arena tree.
//!
//! The block parser knows nothing about Salt; this pass gives meaning to
//! keys (`include`, `extend`, state ids, `module.function`, requisites) and
//! reports structure that Salt would reject. Every problem becomes a
//! diagnostic on the nearest node and the remaining siblings are still
//! converted.

use crate::ir::{NodeId, NodeKind, ParseDiagnostic, Position, Range, RequisiteKind, SlsTree};
use crate::parsers::position_utils::LineIndex;

use super::lexer::Scalar;
use super::parsing::{Document, Entry, Item, Value};

pub(crate) fn build_tree(document: Document, index: &LineIndex<'_>) -> SlsTree {
    let eof = index.end_position();
    let mut builder = TreeBuilder {
        tree: SlsTree::new(Range::new(Position::default(), eof)),
        index,
    };

    match &document.root {
        Value::Mapping(entries) => builder.top_level(entries, eof),
        Value::Empty => {}
        other => builder.error(
            NodeId::ROOT,
            span(other, Position::default()),
            "expected a mapping of state IDs",
        ),
    }

    for raw in document.diagnostics {
        let node = builder.tree.innermost_at(raw.range.start).unwrap_or(NodeId::ROOT);
        builder.tree.add_diagnostic(ParseDiagnostic {
            range: raw.range,
            severity: raw.severity,
            message: raw.message,
            node,
        });
    }
    builder.tree
}

struct TreeBuilder<'a, 'b> {
    tree: SlsTree,
    index: &'b LineIndex<'a>,
}

impl TreeBuilder<'_, '_> {
    fn error(&mut self, node: NodeId, range: Range, message: impl Into<String>) {
        self.tree.add_diagnostic(ParseDiagnostic::error(node, range, message));
    }

    fn warning(&mut self, node: NodeId, range: Range, message: impl Into<String>) {
        self.tree.add_diagnostic(ParseDiagnostic::warning(node, range, message));
    }

    fn top_level(&mut self, entries: &[Entry], eof: Position) {
        for (i, entry) in entries.iter().enumerate() {
            // A state owns everything up to the next top-level key.
            let next = entries.get(i + 1).map_or(eof, |next| next.range.start);
            match entry.key.text.as_str() {
                "include" => self.include(entry),
                "extend" => self.extend(entry),
                _ => {
                    let range = Range::new(entry.key.range.start, next.max(entry.range.end));
                    self.state(entry, range, NodeId::ROOT);
                }
            }
        }
    }

    fn include(&mut self, entry: &Entry) {
        let list = self
            .tree
            .push(NodeKind::IncludeList { paths: Vec::new() }, entry.range, NodeId::ROOT);
        let mut paths = Vec::new();

        match &entry.value {
            Value::Sequence(items) => {
                for item in items {
                    let path = match &item.value {
                        Value::Scalar(scalar) => Some(scalar.text.clone()),
                        // `- foo: {defaults}` names the sls by its key
                        Value::Mapping(entries) => entries.first().map(|e| e.key.text.clone()),
                        Value::Empty => {
                            self.warning(list, item.range, "empty include entry");
                            None
                        }
                        Value::Sequence(_) => {
                            self.error(list, item.range, "include entries must be sls names");
                            None
                        }
                    };
                    if let Some(path) = path {
                        self.tree
                            .push(NodeKind::IncludeEntry { path: path.clone() }, item.range, list);
                        paths.push(path);
                    }
                }
            }
            Value::Scalar(scalar) => {
                self.warning(list, scalar.range, "include expects a list of sls names");
                self.tree.push(
                    NodeKind::IncludeEntry { path: scalar.text.clone() },
                    scalar.range,
                    list,
                );
                paths.push(scalar.text.clone());
            }
            Value::Empty => {}
            Value::Mapping(_) => {
                self.error(list, span(&entry.value, entry.colon), "include expects a list of sls names");
            }
        }

        *self.tree.kind_mut(list) = NodeKind::IncludeList { paths };
    }

    fn extend(&mut self, entry: &Entry) {
        let node = self.tree.push(NodeKind::Extend, entry.range, NodeId::ROOT);
        match &entry.value {
            Value::Mapping(states) => {
                for (i, state) in states.iter().enumerate() {
                    let next = states.get(i + 1).map_or(entry.range.end, |n| n.range.start);
                    self.state(state, Range::new(state.key.range.start, next), node);
                }
            }
            Value::Empty => {}
            other => self.error(node, span(other, entry.colon), "extend expects a mapping of state IDs"),
        }
    }

    fn state(&mut self, entry: &Entry, range: Range, parent: NodeId) {
        let state = self.tree.push(
            NodeKind::StateDeclaration {
                id: entry.key.text.clone(),
                id_range: entry.key.range,
            },
            range,
            parent,
        );

        match &entry.value {
            Value::Mapping(entries) => {
                for e in entries {
                    match RequisiteKind::from_key(&e.key.text) {
                        Some(kind) => self.requisite_list(state, kind, e),
                        None => self.function(state, e),
                    }
                }
            }
            // `root:\n  user.present`
            Value::Scalar(scalar) => {
                self.function_ref(state, scalar, scalar.range);
            }
            Value::Empty => self.warning(
                state,
                entry.key.range,
                format!("state '{}' does not call any module function", entry.key.text),
            ),
            Value::Sequence(_) => self.error(
                state,
                span(&entry.value, entry.colon),
                "state body must be a mapping of module functions",
            ),
        }
    }

    fn function_ref(&mut self, parent: NodeId, key: &Scalar, range: Range) -> NodeId {
        let quoted = self.index.slice(key.range).starts_with(['"', '\'']);
        let key_start = key.range.start.shifted(u32::from(quoted));
        let (module, function, dot) = match key.text.split_once('.') {
            Some((module, function)) => (
                module.to_string(),
                function.to_string(),
                Some(key_start.shifted(module.chars().count() as u32)),
            ),
            None => (key.text.clone(), String::new(), None),
        };
        self.tree.push(
            NodeKind::ModuleFunctionRef { module, function, key_range: key.range, dot },
            range,
            parent,
        )
    }

    fn function(&mut self, state: NodeId, entry: &Entry) {
        let func = self.function_ref(state, &entry.key, entry.range);
        match &entry.value {
            Value::Sequence(items) => self.arguments(func, items),
            Value::Empty => {}
            Value::Mapping(entries) => {
                self.warning(
                    func,
                    span(&entry.value, entry.colon),
                    "arguments should be a list of single-key mappings",
                );
                for e in entries {
                    self.argument(func, e);
                }
            }
            Value::Scalar(scalar) => {
                self.error(func, scalar.range, "arguments must be a list");
            }
        }
    }

    fn arguments(&mut self, func: NodeId, items: &[Item]) {
        for item in items {
            match &item.value {
                Value::Mapping(entries) => {
                    if entries.len() > 1 {
                        self.warning(func, item.range, "list item holds more than one key");
                    }
                    for e in entries {
                        self.argument(func, e);
                    }
                }
                Value::Scalar(scalar) => self.bare_argument(func, scalar),
                Value::Empty => self.warning(func, item.range, "empty list item"),
                Value::Sequence(_) => self.error(func, item.range, "nested list is not a valid argument"),
            }
        }
    }

    /// `- managed` under a dot-less key names the function; anywhere else a
    /// bare word is a parameter whose colon is still missing.
    fn bare_argument(&mut self, func: NodeId, scalar: &Scalar) {
        if let NodeKind::ModuleFunctionRef { function, dot: None, .. } = self.tree.kind_mut(func) {
            if function.is_empty() {
                *function = scalar.text.clone();
                return;
            }
        }
        let param = self.tree.push(
            NodeKind::Parameter {
                key: scalar.text.clone(),
                key_range: scalar.range,
                value: None,
            },
            scalar.range,
            func,
        );
        self.warning(param, scalar.range, format!("missing ':' after parameter '{}'", scalar.text));
    }

    fn argument(&mut self, func: NodeId, entry: &Entry) {
        if let Some(kind) = RequisiteKind::from_key(&entry.key.text) {
            self.requisite_list(func, kind, entry);
            return;
        }
        let value = match &entry.value {
            Value::Empty => None,
            Value::Scalar(scalar) => Some(scalar.text.clone()),
            nested => Some(self.index.slice(span(nested, entry.colon)).to_string()),
        };
        self.tree.push(
            NodeKind::Parameter {
                key: entry.key.text.clone(),
                key_range: entry.key.range,
                value,
            },
            entry.range,
            func,
        );
    }

    fn requisite_list(&mut self, parent: NodeId, kind: RequisiteKind, entry: &Entry) {
        let list = self.tree.push(
            NodeKind::RequisiteList { kind, key_range: entry.key.range },
            entry.range,
            parent,
        );
        match &entry.value {
            Value::Sequence(items) => {
                for item in items {
                    self.requisite_item(list, item);
                }
            }
            Value::Empty => {}
            Value::Scalar(scalar) => {
                self.warning(list, scalar.range, format!("'{}' expects a list", kind));
                self.bare_requisite(list, scalar, scalar.range);
            }
            Value::Mapping(entries) => {
                self.warning(list, span(&entry.value, entry.colon), format!("'{}' expects a list", kind));
                for e in entries {
                    self.requisite_pair(list, e);
                }
            }
        }
    }

    fn requisite_item(&mut self, list: NodeId, item: &Item) {
        match &item.value {
            Value::Mapping(entries) => {
                if entries.len() > 1 {
                    self.warning(list, item.range, "requisite entry holds more than one key");
                }
                for e in entries {
                    self.requisite_pair(list, e);
                }
            }
            Value::Scalar(scalar) => self.bare_requisite(list, scalar, item.range),
            Value::Empty => {
                // `- ` with the target still to be typed
                let entry = self.tree.push(
                    NodeKind::RequisiteEntry {
                        target_module: None,
                        target_id: String::new(),
                        target_range: Range::empty(item.range.end),
                    },
                    item.range,
                    list,
                );
                self.error(entry, item.range, "requisite entry is empty");
            }
            Value::Sequence(_) => self.error(list, item.range, "nested list is not a valid requisite"),
        }
    }

    fn bare_requisite(&mut self, list: NodeId, scalar: &Scalar, range: Range) {
        self.tree.push(
            NodeKind::RequisiteEntry {
                target_module: None,
                target_id: scalar.text.clone(),
                target_range: scalar.range,
            },
            range,
            list,
        );
    }

    fn requisite_pair(&mut self, list: NodeId, entry: &Entry) {
        let (target_id, target_range, problem) = match &entry.value {
            Value::Scalar(scalar) => (scalar.text.clone(), scalar.range, None),
            Value::Empty => (
                String::new(),
                Range::empty(entry.colon.shifted(1)),
                Some(format!("requisite '{}' has no target", entry.key.text)),
            ),
            nested => (
                String::new(),
                span(nested, entry.colon),
                Some(format!("requisite '{}' target must be a state ID", entry.key.text)),
            ),
        };
        let range = Range::new(entry.range.start, entry.range.end.max(target_range.end));
        let node = self.tree.push(
            NodeKind::RequisiteEntry {
                target_module: Some(entry.key.text.clone()),
                target_id,
                target_range,
            },
            range,
            list,
        );
        if let Some(message) = problem {
            self.error(node, range, message);
        }
    }
}

fn span(value: &Value, fallback: Position) -> Range {
    match (value.start(), value.end()) {
        (Some(start), Some(end)) => Range::new(start, end),
        _ => Range::empty(fallback),
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{NodeKind, Position, Range, SlsTree};
    use crate::parsers::sls::parse;

    fn r(a: (u32, u32), b: (u32, u32)) -> Range {
        Range::new(Position::new(a.0, a.1), Position::new(b.0, b.1))
    }

    fn kinds(tree: &SlsTree) -> Vec<&'static str> {
        tree.nodes().map(|(_, node)| node.kind.name()).collect()
    }

    #[test]
    fn test_state_range_extends_to_next_key() {
        let text = "bernd:\n  user.present:\n    - fullname: Bernhardt\n    - home: /home/bernd\n\n/home/bernd/.bashrc:\n  file.managed:\n    - source: salt://opensuse/bash\n    - require:\n      - user: bernd\n";
        let tree = parse(text);
        assert!(tree.diagnostics().is_empty(), "{:?}", tree.diagnostics());
        let states: Vec<_> = tree.states().collect();
        assert_eq!(states.len(), 2);
        assert_eq!(tree.range(states[0]), r((0, 0), (5, 0)));
        assert_eq!(tree.range(states[1]), r((5, 0), (10, 0)));
    }

    #[test]
    fn test_requisite_entries() {
        let tree = parse("foo:\n  test.nop:\n    - require:\n      - /root/.fishrc\n      - user: root\n");
        let entries: Vec<_> = tree
            .nodes()
            .filter_map(|(_, n)| match &n.kind {
                NodeKind::RequisiteEntry { target_module, target_id, .. } => {
                    Some((target_module.clone(), target_id.clone()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            entries,
            vec![(None, "/root/.fishrc".to_string()), (Some("user".to_string()), "root".to_string())]
        );
    }

    #[test]
    fn test_include_entries_keep_leading_dots() {
        let tree = parse("include:\n  - bar\n  - ..common.users\n\nfoo:\n  test.nop\n");
        let paths: Vec<_> = tree.include_entries().into_iter().map(|(_, p)| p.to_string()).collect();
        assert_eq!(paths, vec!["bar", "..common.users"]);
        match tree.kind(tree.children(tree.root())[0]) {
            NodeKind::IncludeList { paths } => assert_eq!(paths.len(), 2),
            other => panic!("expected include list, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_function_name_is_a_valid_anchor() {
        let tree = parse("/srv/git/salt-states:\n  file.:\n    - target: /srv/salt\n");
        assert!(tree.diagnostics().is_empty());
        let func = tree
            .nodes()
            .find(|(_, n)| matches!(n.kind, NodeKind::ModuleFunctionRef { .. }))
            .map(|(_, n)| n.kind.clone());
        assert_eq!(
            func,
            Some(NodeKind::ModuleFunctionRef {
                module: "file".into(),
                function: String::new(),
                key_range: r((1, 2), (1, 7)),
                dot: Some(Position::new(1, 6)),
            })
        );
    }

    #[test]
    fn test_key_without_colon_keeps_its_arguments() {
        let tree = parse("foo:\n  file.\n    - name: x\n");
        assert_eq!(kinds(&tree), vec!["File", "StateDeclaration", "ModuleFunctionRef", "Parameter"]);
        let func = tree.nodes().find_map(|(_, n)| match &n.kind {
            NodeKind::ModuleFunctionRef { module, function, key_range, .. } => {
                Some((module.clone(), function.clone(), *key_range))
            }
            _ => None,
        });
        assert_eq!(func, Some(("file".to_string(), String::new(), r((1, 2), (1, 7)))));
        assert_eq!(tree.diagnostics().len(), 1);
    }

    #[test]
    fn test_parameter_range_covers_key_and_value() {
        let text = "x:\n  file.managed:\n    - source: 'salt://a b'\n";
        let tree = parse(text);
        let (_, param) = tree
            .nodes()
            .find(|(_, n)| matches!(n.kind, NodeKind::Parameter { .. }))
            .expect("parameter");
        let index = crate::parsers::position_utils::LineIndex::new(text);
        assert_eq!(index.slice(param.range), "source: 'salt://a b'");
        assert!(matches!(&param.kind, NodeKind::Parameter { value: Some(v), .. } if v == "salt://a b"));
    }

    #[test]
    fn test_dotless_key_takes_function_from_first_item() {
        let tree = parse("motd:\n  file:\n    - managed\n    - source: salt://motd\n");
        let funcs: Vec<_> = tree
            .nodes()
            .filter_map(|(_, n)| match &n.kind {
                NodeKind::ModuleFunctionRef { module, function, .. } => Some((module.clone(), function.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(funcs, vec![("file".to_string(), "managed".to_string())]);
        assert!(tree.diagnostics().is_empty());
    }

    #[test]
    fn test_malformed_siblings_are_still_converted() {
        let text = "broken:\n  - not a mapping\n\nok:\n  pkg.installed:\n    - name: vim\n    - require:\n      - pkg:\n";
        let tree = parse(text);
        let states: Vec<_> = tree.states().collect();
        assert_eq!(states.len(), 2);
        assert_eq!(tree.state_id(states[1]), Some("ok"));
        assert_eq!(tree.diagnostics().len(), 2);
        assert_eq!(tree.diagnostics()[0].node, states[0]);
        // the empty target is a typing anchor right after the colon
        let empty = tree.nodes().find_map(|(_, n)| match &n.kind {
            NodeKind::RequisiteEntry { target_id, target_range, .. } if target_id.is_empty() => Some(*target_range),
            _ => None,
        });
        assert_eq!(empty, Some(Range::empty(Position::new(7, 12))));
    }

    #[test]
    fn test_scalar_body_and_extend() {
        let tree = parse("root:\n  user.present\n\nextend:\n  root:\n    user.present:\n      - shell: /bin/zsh\n");
        assert_eq!(
            kinds(&tree),
            vec!["File", "StateDeclaration", "ModuleFunctionRef", "Extend", "StateDeclaration", "ModuleFunctionRef", "Parameter"]
        );
        assert_eq!(tree.states().count(), 1);
    }

    #[test]
    fn test_non_mapping_root_is_reported() {
        let tree = parse("just some words\n");
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.diagnostics().len(), 1);
    }
}
