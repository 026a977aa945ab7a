//! Include graph over state files.
//!
//! Tracks which files each state file includes so that a change to one file
//! can be propagated to every open document whose include closure contains
//! it.
//!
//! # Architecture
//!
//! - **Forward edges**: `file A → files A includes`, so that re-indexing A
//!   can drop the reverse edges it no longer owns.
//! - **Reverse edges**: `file B → files that include B`, used for
//!   invalidation.
//! - **Traversals**: breadth-first with an explicit visited set, so include
//!   cycles terminate by construction.
//!
//! Edges are replaced wholesale per file (`set_includes`) every time a file
//! is indexed; a file's outgoing edges are never patched incrementally.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use rustc_hash::FxHashSet;
use tracing::debug;

#[derive(Clone, Debug, Default)]
pub struct IncludeGraph {
    /// file → resolved includes, in declaration order
    forward: Arc<DashMap<PathBuf, Vec<PathBuf>>>,
    /// file → files that include it
    reverse: Arc<DashMap<PathBuf, Arc<DashSet<PathBuf>>>>,
}

impl IncludeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the outgoing edges of `file`.
    ///
    /// Duplicate targets keep their first position.
    pub fn set_includes(&self, file: &Path, includes: Vec<PathBuf>) {
        let mut seen = FxHashSet::default();
        let includes: Vec<PathBuf> = includes
            .into_iter()
            .filter(|target| seen.insert(target.clone()))
            .collect();

        if let Some((_, old)) = self.forward.remove(file) {
            for target in old {
                if let Some(dependents) = self.reverse.get(&target) {
                    dependents.remove(file);
                }
            }
        }

        for target in &includes {
            self.reverse
                .entry(target.clone())
                .or_insert_with(|| Arc::new(DashSet::new()))
                .insert(file.to_path_buf());
        }

        debug!("{} includes {} file(s)", file.display(), includes.len());
        self.forward.insert(file.to_path_buf(), includes);
    }

    /// Every file that includes `file`, directly or transitively. `file`
    /// itself is never part of the result, even inside a cycle.
    pub fn dependents(&self, file: &Path) -> Vec<PathBuf> {
        let mut dependents = Vec::new();
        let mut visited = FxHashSet::default();
        let mut queue = VecDeque::new();

        visited.insert(file.to_path_buf());
        queue.push_back(file.to_path_buf());

        while let Some(current) = queue.pop_front() {
            let Some(direct) = self.reverse.get(&current) else {
                continue;
            };
            let direct: Vec<PathBuf> = direct.iter().map(|d| d.key().clone()).collect();
            for dependent in direct {
                if visited.insert(dependent.clone()) {
                    dependents.push(dependent.clone());
                    queue.push_back(dependent);
                }
            }
        }

        debug!(
            "Found {} transitive dependents for {}",
            dependents.len(),
            file.display()
        );
        dependents
    }
}
