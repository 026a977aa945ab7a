//! Open documents, keyed by URI.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use tower_lsp::lsp_types::Url;
use tracing::debug;

use crate::lsp::models::{LspDocument, SlsDocument};

#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: DashMap<Url, Arc<LspDocument>>,
    serial_document_id: AtomicU32,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or reopens) a document and returns it.
    pub fn open(&self, uri: Url, text: String, version: i32) -> Arc<LspDocument> {
        let id = self.serial_document_id.fetch_add(1, Ordering::SeqCst);
        let document = Arc::new(LspDocument::new(id, uri.clone(), text, version));
        debug!("Opened document {} as #{}", uri, id);
        self.documents.insert(uri, document.clone());
        document
    }

    pub fn get(&self, uri: &Url) -> Option<Arc<LspDocument>> {
        self.documents.get(uri).map(|entry| entry.value().clone())
    }

    pub fn close(&self, uri: &Url) -> Option<Arc<LspDocument>> {
        self.documents.remove(uri).map(|(_, document)| document)
    }

    /// Committed snapshot of the open document at `path`, if any.
    pub fn snapshot_by_path(&self, path: &Path) -> Option<Arc<SlsDocument>> {
        self.documents.iter().find_map(|entry| {
            let snapshot = entry.value().snapshot();
            (snapshot.path.as_deref() == Some(path)).then_some(snapshot)
        })
    }

    pub fn uris(&self) -> Vec<Url> {
        self.documents.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
