//! Include resolution and include-graph traversal.
//!
//! The index does not scan the workspace up front. A file is read and parsed
//! only when a traversal starting at an open document reaches it, and every
//! traversal carries its own visited set so cyclic includes terminate.
//!
//! An sls file's dotted position is its path relative to the workspace root
//! without the `.sls` suffix: `opensuse/init.sls` is `opensuse.init`. A
//! relative include (`.users`, `..common`) drops one trailing component of
//! that position per leading dot before appending the rest, so `.users`
//! inside `opensuse/init.sls` names `opensuse.users`.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use tower_lsp::lsp_types::Url;
use tracing::{debug, trace, warn};

use crate::ir::{NodeId, ParseDiagnostic};
use crate::lsp::backend::dependency_graph::IncludeGraph;
use crate::lsp::backend::document_cache::{CacheStats, ContentHash, FileCache, FileMarker, Lookup};
use crate::lsp::backend::document_store::DocumentStore;
use crate::lsp::models::SlsDocument;

/// A state declaration visible from some document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRef {
    pub id: String,
    pub uri: Url,
    /// `module.function` keys used by the state.
    pub functions: Vec<String>,
}

#[derive(Debug)]
pub struct WorkspaceIndex {
    store: Arc<DocumentStore>,
    cache: FileCache,
    graph: IncludeGraph,
    roots: RwLock<Vec<PathBuf>>,
    /// Unresolved-include diagnostics from the last indexing of each file.
    unresolved: DashMap<PathBuf, Vec<ParseDiagnostic>>,
}

impl WorkspaceIndex {
    pub fn new(store: Arc<DocumentStore>, cache_capacity: usize) -> Self {
        Self {
            store,
            cache: FileCache::with_capacity(cache_capacity),
            graph: IncludeGraph::new(),
            roots: RwLock::new(Vec::new()),
            unresolved: DashMap::new(),
        }
    }

    pub fn set_roots(&self, roots: Vec<PathBuf>) {
        debug!("Workspace roots: {:?}", roots);
        *self.roots.write() = roots;
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        self.roots.read().clone()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Innermost workspace root containing `file`; a file outside every
    /// root is resolved against its own directory.
    pub fn root_for(&self, file: &Path) -> PathBuf {
        self.roots
            .read()
            .iter()
            .filter(|root| file.starts_with(root))
            .max_by_key(|root| root.components().count())
            .cloned()
            .or_else(|| file.parent().map(Path::to_path_buf))
            .unwrap_or_default()
    }

    /// Dotted position of `file`, one element per component.
    pub fn sls_position(&self, file: &Path) -> Vec<String> {
        let root = self.root_for(file);
        let relative = file.strip_prefix(&root).unwrap_or(file);
        let mut parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if let Some(last) = parts.last_mut() {
            if let Some(stem) = last.strip_suffix(".sls") {
                *last = stem.to_string();
            }
        }
        parts
    }

    /// Resolves an include string written in `from` to an existing file.
    pub fn resolve_include(&self, from: &Path, include: &str) -> Option<PathBuf> {
        let dots = include.chars().take_while(|c| *c == '.').count();
        let mut parts = if dots == 0 {
            Vec::new()
        } else {
            let mut position = self.sls_position(from);
            for _ in 0..dots {
                position.pop();
            }
            position
        };
        parts.extend(
            include[dots..]
                .split('.')
                .filter(|part| !part.is_empty())
                .map(str::to_string),
        );
        let (last, dirs) = parts.split_last()?;

        let mut base = self.root_for(from);
        base.extend(dirs);
        let candidates = [base.join(format!("{}.sls", last)), base.join(last).join("init.sls")];
        let found = candidates.into_iter().find(|candidate| candidate.is_file());
        trace!("include '{}' from {} -> {:?}", include, from.display(), found);
        found
    }

    /// Open snapshot for `path`, or the file read from disk.
    pub fn document(&self, path: &Path) -> Option<Arc<SlsDocument>> {
        if let Some(snapshot) = self.store.snapshot_by_path(path) {
            return Some(snapshot);
        }
        match self.load_from_disk(path) {
            Ok(document) => Some(document),
            Err(e) => {
                debug!("{:#}", e);
                None
            }
        }
    }

    fn load_from_disk(&self, path: &Path) -> Result<Arc<SlsDocument>> {
        let marker = FileMarker::of(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        let stale = match self.cache.lookup(path, marker) {
            Lookup::Fresh(document) => return Ok(document),
            Lookup::Stale(document) => Some(document),
            Lookup::Miss => None,
        };

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let hash = ContentHash::from_str(&text);
        if let Some(previous) = stale.filter(|previous| previous.content_hash == hash) {
            self.cache.refresh(path.to_path_buf(), marker, previous.clone());
            return Ok(previous);
        }

        let uri = Url::from_file_path(path)
            .map_err(|()| anyhow!("Invalid file path: {}", path.display()))?;
        let document = Arc::new(SlsDocument::parse(uri, text, None));
        debug!("Parsed {} from disk", path.display());
        self.cache.insert(path.to_path_buf(), marker, document.clone());
        Ok(document)
    }

    /// Resolves the includes of `document`, records its outgoing graph edges
    /// and its unresolved-include diagnostics. Returns the resolved targets
    /// in declaration order.
    pub fn index_document(&self, document: &SlsDocument) -> Vec<PathBuf> {
        let Some(path) = document.path.as_deref() else {
            return Vec::new();
        };
        let tree = &document.tree;
        let mut targets = Vec::new();
        let mut problems = Vec::new();
        for (entry, include) in tree.include_entries() {
            match self.resolve_include(path, include) {
                Some(target) => targets.push(target),
                None => {
                    let list = tree.parent(entry).unwrap_or(NodeId::ROOT);
                    problems.push(ParseDiagnostic::warning(
                        list,
                        tree.range(entry),
                        format!("include '{}' could not be resolved", include),
                    ));
                }
            }
        }

        self.graph.set_includes(path, targets.clone());
        if problems.is_empty() {
            self.unresolved.remove(path);
        } else {
            self.unresolved.insert(path.to_path_buf(), problems);
        }
        targets
    }

    pub fn include_diagnostics(&self, path: &Path) -> Vec<ParseDiagnostic> {
        self.unresolved
            .get(path)
            .map(|problems| problems.value().clone())
            .unwrap_or_default()
    }

    /// Breadth-first walk over `start` and everything it includes, in
    /// declaration order, visiting each file at most once.
    pub fn walk<T>(
        &self,
        start: Arc<SlsDocument>,
        mut visit: impl FnMut(&Arc<SlsDocument>) -> ControlFlow<T>,
    ) -> Option<T> {
        let mut visited = FxHashSet::default();
        if let Some(path) = &start.path {
            visited.insert(path.clone());
        }
        let mut queue = VecDeque::from([start]);

        while let Some(document) = queue.pop_front() {
            if let ControlFlow::Break(found) = visit(&document) {
                return Some(found);
            }
            for target in self.index_document(&document) {
                if !visited.insert(target.clone()) {
                    continue;
                }
                match self.document(&target) {
                    Some(next) => queue.push_back(next),
                    None => warn!("Included file vanished: {}", target.display()),
                }
            }
        }
        None
    }

    /// Indexes the include closure of `start` and returns the files visited.
    pub fn index_closure(&self, start: Arc<SlsDocument>) -> Vec<Url> {
        let mut files = Vec::new();
        self.walk::<()>(start, |document| {
            files.push(document.uri.clone());
            ControlFlow::Continue(())
        });
        files
    }

    /// First state `target_id` visible from `start`: the document itself
    /// first, then its includes breadth first.
    pub fn find_state(
        &self,
        start: Arc<SlsDocument>,
        target_id: &str,
        target_module: Option<&str>,
    ) -> Option<(Arc<SlsDocument>, NodeId)> {
        self.walk(start, |document| match document.tree.find_state(target_id, target_module) {
            Some(state) => ControlFlow::Break((document.clone(), state)),
            None => ControlFlow::Continue(()),
        })
    }

    /// State ids visible from `start`, deduplicated, in search order.
    pub fn known_states(&self, start: Arc<SlsDocument>) -> Vec<StateRef> {
        let mut seen = FxHashSet::default();
        let mut states = Vec::new();
        self.walk::<()>(start, |document| {
            let tree = &document.tree;
            for state in tree.states() {
                let Some(id) = tree.state_id(state) else {
                    continue;
                };
                if !seen.insert(id.to_string()) {
                    continue;
                }
                states.push(StateRef {
                    id: id.to_string(),
                    uri: document.uri.clone(),
                    functions: tree
                        .state_functions(state)
                        .into_iter()
                        .map(|(module, function)| format!("{}.{}", module, function))
                        .collect(),
                });
            }
            ControlFlow::Continue(())
        });
        states
    }

    /// Forgets the cached parse of `path` and returns every file whose
    /// include closure contains it, `path` included.
    pub fn invalidate(&self, path: &Path) -> Vec<PathBuf> {
        self.cache.remove(path);
        let mut affected = vec![path.to_path_buf()];
        affected.extend(self.graph.dependents(path));
        debug!("Invalidated {} ({} affected)", path.display(), affected.len());
        affected
    }
}
