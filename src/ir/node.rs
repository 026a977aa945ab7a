//! Arena-backed syntax tree for Salt state files.
//!
//! Nodes live in a flat `Vec` owned by [`SlsTree`] and address each other by
//! [`NodeId`]. Every node owns an ordered list of child ids and keeps a
//! non-owning parent id for upward traversal, so the tree never forms a
//! reference cycle.
//!
//! ```text
//! File
//!  ├─ IncludeList { paths }
//!  │    └─ IncludeEntry { path }
//!  ├─ Extend
//!  │    └─ StateDeclaration ...
//!  └─ StateDeclaration { id }
//!       ├─ ModuleFunctionRef { module, function }
//!       │    ├─ Parameter { key, value }
//!       │    └─ RequisiteList { kind }
//!       │         └─ RequisiteEntry { target_module, target_id }
//!       └─ RequisiteList { kind }
//! ```

use std::fmt;

use super::diagnostic::ParseDiagnostic;

/// Zero-based line/column position. Columns count characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }

    /// Returns the position `n` characters further on the same line.
    pub const fn shifted(self, n: u32) -> Self {
        Self { line: self.line, character: self.character + n }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.character)
    }
}

/// Half-open source range: `start` is inclusive, `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub const fn empty(at: Position) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Containment used for cursor lookups: the end position counts as
    /// inside so that a cursor sitting right after a token still hits it.
    pub fn touches(&self, pos: Position) -> bool {
        self.start <= pos && pos <= self.end
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.start <= pos && pos < self.end
    }

    pub fn contains_range(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn is_well_formed(&self) -> bool {
        self.start <= self.end
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{}]", self.start, self.end)
    }
}

/// Index of a node inside its owning [`SlsTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The twelve requisite keywords that relate one state to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequisiteKind {
    Require,
    Watch,
    Onchanges,
    Listen,
    RequireIn,
    WatchIn,
    OnchangesIn,
    ListenIn,
    Prereq,
    PrereqIn,
    Onfail,
    OnfailIn,
}

impl RequisiteKind {
    pub const ALL: [RequisiteKind; 12] = [
        RequisiteKind::Require,
        RequisiteKind::Watch,
        RequisiteKind::Onchanges,
        RequisiteKind::Listen,
        RequisiteKind::RequireIn,
        RequisiteKind::WatchIn,
        RequisiteKind::OnchangesIn,
        RequisiteKind::ListenIn,
        RequisiteKind::Prereq,
        RequisiteKind::PrereqIn,
        RequisiteKind::Onfail,
        RequisiteKind::OnfailIn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RequisiteKind::Require => "require",
            RequisiteKind::Watch => "watch",
            RequisiteKind::Onchanges => "onchanges",
            RequisiteKind::Listen => "listen",
            RequisiteKind::RequireIn => "require_in",
            RequisiteKind::WatchIn => "watch_in",
            RequisiteKind::OnchangesIn => "onchanges_in",
            RequisiteKind::ListenIn => "listen_in",
            RequisiteKind::Prereq => "prereq",
            RequisiteKind::PrereqIn => "prereq_in",
            RequisiteKind::Onfail => "onfail",
            RequisiteKind::OnfailIn => "onfail_in",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == key)
    }
}

impl fmt::Display for RequisiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of node kinds. Consumers match exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Root of every tree; spans the whole text.
    File,
    /// `include:` block. Paths are kept verbatim, leading dots included.
    IncludeList { paths: Vec<String> },
    IncludeEntry { path: String },
    /// `extend:` block; children are state declarations.
    Extend,
    StateDeclaration { id: String, id_range: Range },
    /// `module.function` key. `function` is empty while the user is still
    /// typing (`file.`) or when the key has no dot at all. `dot` is the
    /// position of the separating dot when present.
    ModuleFunctionRef {
        module: String,
        function: String,
        key_range: Range,
        dot: Option<Position>,
    },
    Parameter {
        key: String,
        key_range: Range,
        value: Option<String>,
    },
    RequisiteList { kind: RequisiteKind, key_range: Range },
    /// `- module: id` or a bare `- id`. An empty `target_id` with an empty
    /// `target_range` marks an entry whose target has not been typed yet.
    RequisiteEntry {
        target_module: Option<String>,
        target_id: String,
        target_range: Range,
    },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::File => "File",
            NodeKind::IncludeList { .. } => "IncludeList",
            NodeKind::IncludeEntry { .. } => "IncludeEntry",
            NodeKind::Extend => "Extend",
            NodeKind::StateDeclaration { .. } => "StateDeclaration",
            NodeKind::ModuleFunctionRef { .. } => "ModuleFunctionRef",
            NodeKind::Parameter { .. } => "Parameter",
            NodeKind::RequisiteList { .. } => "RequisiteList",
            NodeKind::RequisiteEntry { .. } => "RequisiteEntry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub range: Range,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Parsed state file: node arena plus the diagnostics collected while
/// building it. Immutable once returned by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlsTree {
    nodes: Vec<Node>,
    diagnostics: Vec<ParseDiagnostic>,
}

impl SlsTree {
    /// Creates a tree holding only the `File` root.
    pub fn new(range: Range) -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::File,
                range,
                parent: None,
                children: Vec::new(),
            }],
            diagnostics: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn range(&self, id: NodeId) -> Range {
        self.nodes[id.index()].range
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId(i as u32), node))
    }

    pub fn diagnostics(&self) -> &[ParseDiagnostic] {
        &self.diagnostics
    }

    /// Appends a node under `parent` and returns its id.
    pub(crate) fn push(&mut self, kind: NodeKind, range: Range, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            range,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    pub(crate) fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.index()].kind
    }

    pub(crate) fn add_diagnostic(&mut self, diagnostic: ParseDiagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Walks from `id` up to the root, `id` included.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |current| self.parent(*current))
    }

    /// Innermost node whose range touches `pos`. Among siblings that all
    /// touch the position the later-starting one wins.
    pub fn innermost_at(&self, pos: Position) -> Option<NodeId> {
        let root = self.root();
        if !self.range(root).touches(pos) {
            return None;
        }
        let mut current = root;
        while let Some(next) = self
            .children(current)
            .iter()
            .rev()
            .copied()
            .find(|child| self.range(*child).touches(pos))
        {
            current = next;
        }
        Some(current)
    }

    /// Top-level state declarations in source order. States nested under
    /// `extend` are not included.
    pub fn states(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children(self.root())
            .iter()
            .copied()
            .filter(|id| matches!(self.kind(*id), NodeKind::StateDeclaration { .. }))
    }

    pub fn state_id(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::StateDeclaration { id, .. } => Some(id),
            _ => None,
        }
    }

    /// `(module, function)` pairs declared directly under a state.
    pub fn state_functions(&self, state: NodeId) -> Vec<(&str, &str)> {
        self.children(state)
            .iter()
            .filter_map(|child| match self.kind(*child) {
                NodeKind::ModuleFunctionRef { module, function, .. } => {
                    Some((module.as_str(), function.as_str()))
                }
                _ => None,
            })
            .collect()
    }

    /// First top-level state whose id is `target_id` and, when a module is
    /// given, that uses that module.
    pub fn find_state(&self, target_id: &str, target_module: Option<&str>) -> Option<NodeId> {
        self.states().find(|state| {
            self.state_id(*state) == Some(target_id)
                && target_module.is_none_or(|module| {
                    self.state_functions(*state)
                        .iter()
                        .any(|(declared, _)| *declared == module)
                })
        })
    }

    /// Include entries in declaration order, across every `include:` block.
    pub fn include_entries(&self) -> Vec<(NodeId, &str)> {
        self.children(self.root())
            .iter()
            .filter(|id| matches!(self.kind(**id), NodeKind::IncludeList { .. }))
            .flat_map(|list| self.children(*list).iter().copied())
            .filter_map(|id| match self.kind(id) {
                NodeKind::IncludeEntry { path } => Some((id, path.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Parameter keys already written under a module function.
    pub fn parameter_keys(&self, function: NodeId) -> Vec<&str> {
        self.children(function)
            .iter()
            .filter_map(|child| match self.kind(*child) {
                NodeKind::Parameter { key, .. } => Some(key.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Nearest ancestor (or self) that is a module function reference.
    pub fn enclosing_function(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .find(|ancestor| matches!(self.kind(*ancestor), NodeKind::ModuleFunctionRef { .. }))
    }
}
