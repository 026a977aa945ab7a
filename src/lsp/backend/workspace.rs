//! Transport-independent core of the server.
//!
//! `SaltWorkspace` owns the schema, the open documents and the workspace
//! index, and exposes the document lifecycle plus completion and definition
//! queries. The `tower_lsp` handlers are thin wrappers around it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tower_lsp::lsp_types::{Location, Position as LspPosition, TextDocumentContentChangeEvent, Url};
use tracing::{debug, warn};

use crate::ir::{ParseDiagnostic, Position};
use crate::lsp::backend::document_cache::CacheStats;
use crate::lsp::backend::document_store::DocumentStore;
use crate::lsp::backend::workspace_index::WorkspaceIndex;
use crate::lsp::config::ServerConfig;
use crate::lsp::document::EditError;
use crate::lsp::features::completion::{self, CompletionIntent, Suggestion};
use crate::lsp::features::goto_definition::find_definition;
use crate::lsp::features::node_finder::{PositionEncoding, from_lsp_position};
use crate::lsp::models::SlsDocument;
use crate::state_schema::StateSchema;

/// Capacity of the indexing signal channel; slow subscribers lag instead of
/// blocking indexing.
const SIGNAL_CAPACITY: usize = 64;

/// Emitted once the include closure of a document has been indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingFinished {
    pub uri: Url,
    /// Every file visited, the document itself first.
    pub files: Vec<Url>,
}

#[derive(Debug)]
pub struct SaltWorkspace {
    schema: Arc<StateSchema>,
    store: Arc<DocumentStore>,
    index: WorkspaceIndex,
    indexing_tx: broadcast::Sender<IndexingFinished>,
    /// Column unit of incoming edits and outgoing locations.
    encoding: RwLock<PositionEncoding>,
}

impl SaltWorkspace {
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_schema(config.load_schema(), config.cache_capacity)
    }

    pub fn with_schema(schema: Arc<StateSchema>, cache_capacity: usize) -> Self {
        let store = Arc::new(DocumentStore::new());
        let (indexing_tx, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            schema,
            index: WorkspaceIndex::new(store.clone(), cache_capacity),
            store,
            indexing_tx,
            encoding: RwLock::new(PositionEncoding::default()),
        }
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn index(&self) -> &WorkspaceIndex {
        &self.index
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.index.cache_stats()
    }

    pub fn set_roots(&self, roots: Vec<PathBuf>) {
        self.index.set_roots(roots);
    }

    pub fn set_position_encoding(&self, encoding: PositionEncoding) {
        debug!("Position encoding: {:?}", encoding);
        *self.encoding.write() = encoding;
    }

    pub fn position_encoding(&self) -> PositionEncoding {
        *self.encoding.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexingFinished> {
        self.indexing_tx.subscribe()
    }

    pub fn open(&self, uri: Url, text: String, version: i32) -> Arc<SlsDocument> {
        self.store.open(uri, text, version).snapshot()
    }

    /// Applies an edit to an open document. `Ok(None)` means the document is
    /// not open or a newer edit superseded this one.
    pub fn change(
        &self,
        uri: &Url,
        changes: Vec<TextDocumentContentChangeEvent>,
        version: i32,
    ) -> Result<Option<Arc<SlsDocument>>, EditError> {
        let Some(document) = self.store.get(uri) else {
            warn!("Change for unopened document {}", uri);
            return Ok(None);
        };
        document.apply(changes, version, self.position_encoding())
    }

    pub fn close(&self, uri: &Url) {
        if self.store.close(uri).is_some() {
            debug!("Closed {}", uri);
        }
    }

    /// Committed snapshot of an open document.
    pub fn snapshot(&self, uri: &Url) -> Option<Arc<SlsDocument>> {
        self.store.get(uri).map(|document| document.snapshot())
    }

    /// Indexes the include closure of `document` and signals completion.
    pub fn index_document(&self, document: Arc<SlsDocument>) -> Vec<Url> {
        let uri = document.uri.clone();
        let files = self.index.index_closure(document);
        debug!("Indexed {} ({} files)", uri, files.len());
        // No subscriber is not an error.
        let _ = self.indexing_tx.send(IndexingFinished { uri, files: files.clone() });
        files
    }

    /// Character position of a client position in the open document `uri`.
    pub fn char_position(&self, uri: &Url, position: LspPosition) -> Option<Position> {
        let document = self.snapshot(uri)?;
        Some(from_lsp_position(&document.text, position, self.position_encoding()))
    }

    pub fn complete(&self, uri: &Url, position: Position, trigger: Option<&str>) -> Vec<Suggestion> {
        let Some(document) = self.snapshot(uri) else {
            return Vec::new();
        };
        let Some(intent) = completion::determine_intent(&document.tree, &document.text, position, trigger) else {
            return Vec::new();
        };
        match &intent {
            CompletionIntent::RequisiteTarget { target_module, prefix } => {
                let states = self.index.known_states(document);
                completion::state_suggestions(&states, target_module.as_deref(), prefix)
            }
            _ => completion::complete(&self.schema, &intent),
        }
    }

    /// Definition at a character `position`; the location's range uses the
    /// negotiated encoding.
    pub fn definition(&self, uri: &Url, position: Position) -> Option<Location> {
        let document = self.snapshot(uri)?;
        find_definition(&self.index, document, position, self.position_encoding())
    }

    /// Parse diagnostics of `document` plus its unresolved includes.
    pub fn diagnostics(&self, document: &SlsDocument) -> Vec<ParseDiagnostic> {
        let mut diagnostics = document.tree.diagnostics().to_vec();
        if let Some(path) = &document.path {
            diagnostics.extend(self.index.include_diagnostics(path));
        }
        diagnostics
    }

    /// Handles an on-disk change of `path` and returns the open documents
    /// that need re-indexing: those whose include closure contains `path`,
    /// and those with unresolved includes the change might satisfy.
    pub fn file_changed(&self, path: &Path) -> Vec<Arc<SlsDocument>> {
        let affected = self.index.invalidate(path);
        self.store
            .uris()
            .into_iter()
            .filter_map(|uri| self.snapshot(&uri))
            .filter(|document| match &document.path {
                Some(own) => affected.contains(own) || !self.index.include_diagnostics(own).is_empty(),
                None => false,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> SaltWorkspace {
        SaltWorkspace::with_schema(StateSchema::bundled(), 16)
    }

    #[test]
    fn test_complete_module_functions() {
        let workspace = workspace();
        let uri = Url::parse("file:///srv/salt/motd.sls").unwrap();
        workspace.open(uri.clone(), "motd:\n  file.\n".into(), 1);
        let suggestions = workspace.complete(&uri, Position::new(1, 7), Some("."));
        assert_eq!(suggestions.len(), 30);
        assert!(workspace.complete(&Url::parse("file:///nope.sls").unwrap(), Position::new(0, 0), None).is_empty());
    }

    #[test]
    fn test_requisite_targets_from_same_document() {
        let workspace = workspace();
        let uri = Url::parse("file:///srv/salt/base.sls").unwrap();
        let text = "bernd:\n  user.present\n\nrc:\n  file.managed:\n    - require:\n      - user: \n";
        workspace.open(uri.clone(), text.into(), 1);
        let labels: Vec<_> = workspace
            .complete(&uri, Position::new(6, 14), None)
            .into_iter()
            .map(|s| s.label)
            .collect();
        assert_eq!(labels, vec!["bernd"]);
    }

    #[test]
    fn test_client_positions_follow_negotiated_encoding() {
        use tower_lsp::lsp_types::Range as LspRange;

        let workspace = workspace();
        let uri = Url::parse("file:///srv/salt/crab.sls").unwrap();
        let text = "a:\n  test.nop:\n    - require:\n      - crab\n\ncrab:\n  test.nop:\n    - name: \u{1F980}x";
        workspace.open(uri.clone(), text.into(), 1);

        // `x` follows a character outside the basic plane
        let after_crab = LspPosition::new(7, 14);
        assert_eq!(workspace.char_position(&uri, after_crab), Some(Position::new(7, 13)));
        let location = workspace.definition(&uri, Position::new(3, 9)).unwrap();
        assert_eq!(location.range.start, LspPosition::new(5, 0));
        assert_eq!(location.range.end, LspPosition::new(7, 15));

        let change = TextDocumentContentChangeEvent {
            range: Some(LspRange::new(after_crab, LspPosition::new(7, 15))),
            range_length: None,
            text: "y".into(),
        };
        let snapshot = workspace.change(&uri, vec![change], 2).unwrap().unwrap();
        assert!(snapshot.text.ends_with("\u{1F980}y"));

        workspace.set_position_encoding(PositionEncoding::Utf32);
        assert_eq!(workspace.char_position(&uri, after_crab), Some(Position::new(7, 14)));
        let location = workspace.definition(&uri, Position::new(3, 9)).unwrap();
        assert_eq!(location.range.end, LspPosition::new(7, 14));
    }

    #[test]
    fn test_change_unopened_document_is_ignored() {
        let workspace = workspace();
        let uri = Url::parse("file:///srv/salt/x.sls").unwrap();
        assert!(matches!(workspace.change(&uri, vec![], 2), Ok(None)));
    }

    #[test]
    fn test_index_signal_is_sent() {
        let workspace = workspace();
        let mut rx = workspace.subscribe();
        let uri = Url::parse("file:///srv/salt/lonely.sls").unwrap();
        let document = workspace.open(uri.clone(), "a:\n  test.nop\n".into(), 1);
        workspace.index_document(document);
        let signal = rx.try_recv().unwrap();
        assert_eq!(signal.uri, uri);
        assert_eq!(signal.files, vec![uri]);
    }
}
