use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::{Mutex, RwLock};
use ropey::Rope;
use thiserror::Error;
use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent, Url};
use tracing::{debug, trace};

use crate::lsp::backend::document_cache::ContentHash;
use crate::lsp::features::node_finder::PositionEncoding;
use crate::parsers::parse;

pub use crate::lsp::models::{LspDocument, LspDocumentState, SlsDocument};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("version {received} is not newer than {current}")]
    StaleVersion { received: i32, current: i32 },
}

/// Converts an LSP position to a char index in the rope, clamping positions
/// past the end of a line or of the text.
fn position_to_char_index(position: &Position, text: &Rope, encoding: PositionEncoding) -> usize {
    let line = position.line as usize;
    if line >= text.len_lines() {
        return text.len_chars();
    }
    let line_start = text.line_to_char(line);
    let line_text = text.line(line);
    let mut line_len = line_text.len_chars();
    // the terminator is not addressable
    if line + 1 < text.len_lines() {
        line_len -= 1;
        if line_len > 0 && line_text.char(line_len - 1) == '\r' {
            line_len -= 1;
        }
    }
    let column = match encoding {
        PositionEncoding::Utf32 => position.character as usize,
        PositionEncoding::Utf16 => {
            let units = (position.character as usize).min(line_text.len_utf16_cu());
            line_text.utf16_cu_to_char(units)
        }
    };
    line_start + column.min(line_len)
}

pub fn uri_to_path(uri: &Url) -> Option<PathBuf> {
    if uri.scheme() != "file" {
        return None;
    }
    uri.to_file_path().ok()
}

impl SlsDocument {
    /// Parses `text` into a new snapshot.
    pub fn parse(uri: Url, text: String, version: Option<i32>) -> Self {
        let tree = Arc::new(parse(&text));
        let content_hash = ContentHash::from_str(&text);
        Self {
            path: uri_to_path(&uri),
            uri,
            text,
            tree,
            content_hash,
            version,
        }
    }
}

impl LspDocumentState {
    /// Applies content changes in order. Ranged changes edit the rope in
    /// place; a change without a range replaces the whole text.
    pub fn apply(
        &mut self,
        changes: Vec<TextDocumentContentChangeEvent>,
        version: i32,
        encoding: PositionEncoding,
    ) -> Result<String, EditError> {
        if version <= self.version {
            return Err(EditError::StaleVersion { received: version, current: self.version });
        }
        for change in &changes {
            if let Some(range) = change.range {
                let start = position_to_char_index(&range.start, &self.text, encoding);
                let end = position_to_char_index(&range.end, &self.text, encoding).max(start);
                self.text.remove(start..end);
                self.text.insert(start, &change.text);
            } else {
                self.text = Rope::from_str(&change.text);
            }
        }
        self.version = version;
        Ok(self.text.to_string())
    }
}

impl LspDocument {
    pub fn new(id: u32, uri: Url, text: String, version: i32) -> Self {
        let snapshot = Arc::new(SlsDocument::parse(uri.clone(), text.clone(), Some(version)));
        Self {
            id,
            state: Mutex::new(LspDocumentState {
                uri,
                text: Rope::from_str(&text),
                version,
            }),
            parse_lock: Mutex::new(()),
            latest_version: AtomicI32::new(version),
            snapshot: RwLock::new(snapshot),
        }
    }

    pub fn uri(&self) -> Url {
        self.state.lock().uri.clone()
    }

    pub fn text(&self) -> String {
        self.state.lock().text.to_string()
    }

    pub fn version(&self) -> i32 {
        self.state.lock().version
    }

    /// Last committed snapshot. Never a partially built one.
    pub fn snapshot(&self) -> Arc<SlsDocument> {
        self.snapshot.read().clone()
    }

    /// Applies an edit, reparses and commits the new snapshot.
    ///
    /// Returns `Ok(None)` when a newer edit arrived while this one was
    /// waiting to be parsed; the newer edit commits instead.
    pub fn apply(
        &self,
        changes: Vec<TextDocumentContentChangeEvent>,
        version: i32,
        encoding: PositionEncoding,
    ) -> Result<Option<Arc<SlsDocument>>, EditError> {
        let (uri, text) = {
            let mut state = self.state.lock();
            let text = state.apply(changes, version, encoding)?;
            self.latest_version.fetch_max(version, Ordering::SeqCst);
            (state.uri.clone(), text)
        };

        let _guard = self.parse_lock.lock();
        if self.is_superseded(version) {
            trace!("Skipping superseded parse of {} v{}", uri, version);
            return Ok(None);
        }
        let snapshot = Arc::new(SlsDocument::parse(uri, text, Some(version)));
        if self.is_superseded(version) {
            return Ok(None);
        }
        *self.snapshot.write() = snapshot.clone();
        debug!("Committed {} v{}", snapshot.uri, version);
        Ok(Some(snapshot))
    }

    fn is_superseded(&self, version: i32) -> bool {
        self.latest_version.load(Ordering::SeqCst) > version
    }
}
