//! Server backend: document storage, the workspace index and the
//! `tower_lsp` glue.

pub mod dependency_graph;
pub mod document_cache;
pub mod document_store;
mod handlers;
mod state;
pub mod watcher;
pub mod workspace;
pub mod workspace_index;

pub use handlers::{TRIGGER_CHARACTERS, to_lsp_diagnostic, workspace_roots};
pub use state::{LoadingFinished, LoadingFinishedParams, SaltBackend};
pub use workspace::{IndexingFinished, SaltWorkspace};
