use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicI32;

use parking_lot::{Mutex, RwLock};
use ropey::Rope;
use tower_lsp::lsp_types::Url;

use crate::ir::SlsTree;
use crate::lsp::backend::document_cache::ContentHash;

/// Parsed, immutable snapshot of a state file.
///
/// A new snapshot is built for every edit or disk change; readers holding an
/// `Arc` to an older one keep seeing consistent text and tree.
#[derive(Debug)]
pub struct SlsDocument {
    pub uri: Url,
    /// Local path, when the URI is a `file:` URI.
    pub path: Option<PathBuf>,
    pub text: String,
    pub tree: Arc<SlsTree>,
    pub content_hash: ContentHash,
    /// Editor version for open documents; `None` for files read from disk.
    pub version: Option<i32>,
}

/// Mutable editing state of an open document.
#[derive(Debug)]
pub struct LspDocumentState {
    pub uri: Url,
    pub text: Rope,
    pub version: i32,
}

/// An open text document: the editable rope plus the last committed
/// snapshot.
#[derive(Debug)]
pub struct LspDocument {
    pub id: u32,
    pub state: Mutex<LspDocumentState>,
    /// Serialises parse-and-commit for this document.
    pub(crate) parse_lock: Mutex<()>,
    /// Highest version whose text has been applied to `state`.
    pub(crate) latest_version: AtomicI32,
    pub(crate) snapshot: RwLock<Arc<SlsDocument>>,
}
