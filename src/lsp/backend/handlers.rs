//! LSP protocol handler implementations
//!
//! This module contains the `tower_lsp::LanguageServer` implementation for
//! the Salt backend:
//! - Lifecycle handlers (initialize, initialized, shutdown)
//! - Document lifecycle (did_open, did_change, did_close)
//! - Requests (completion, goto_definition)
//! - On-disk changes (did_change_watched_files and the file watcher)
//!
//! Parsing, indexing and disk reads run on the blocking pool; handlers only
//! await their results.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task;
use tower_lsp::jsonrpc::Result as LspResult;
use tower_lsp::lsp_types::{
    CompletionOptions, CompletionParams, CompletionResponse, Diagnostic, DiagnosticSeverity,
    DidChangeTextDocumentParams, DidChangeWatchedFilesParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, GotoDefinitionParams, GotoDefinitionResponse, InitializeParams,
    InitializeResult, InitializedParams, OneOf, ServerCapabilities, ServerInfo,
    TextDocumentSyncCapability, TextDocumentSyncKind,
};
use tower_lsp::{LanguageServer, jsonrpc};
use tracing::{debug, error, info, trace, warn};

use super::state::SaltBackend;
use super::watcher::{FileWatcher, is_sls};
use crate::ir::{ParseDiagnostic, Severity};
use crate::lsp::document::uri_to_path;
use crate::lsp::features::completion::to_completion_item;
use crate::lsp::features::node_finder::{PositionEncoding, to_lsp_range};
use crate::lsp::models::SlsDocument;

pub const TRIGGER_CHARACTERS: [&str; 4] = [".", ":", "-", " "];

/// Workspace roots announced by the client: the workspace folders, else the
/// root URI, else the deprecated root path.
#[allow(deprecated)]
pub fn workspace_roots(params: &InitializeParams) -> Vec<PathBuf> {
    if let Some(folders) = params.workspace_folders.as_ref().filter(|f| !f.is_empty()) {
        return folders.iter().filter_map(|folder| uri_to_path(&folder.uri)).collect();
    }
    if let Some(root) = params.root_uri.as_ref().and_then(uri_to_path) {
        return vec![root];
    }
    params.root_path.iter().map(PathBuf::from).collect()
}

/// Converts a diagnostic of the tree built from `text`.
pub fn to_lsp_diagnostic(text: &str, diagnostic: &ParseDiagnostic, encoding: PositionEncoding) -> Diagnostic {
    Diagnostic {
        range: to_lsp_range(text, diagnostic.range, encoding),
        severity: Some(match diagnostic.severity {
            Severity::Error => DiagnosticSeverity::ERROR,
            Severity::Warning => DiagnosticSeverity::WARNING,
        }),
        source: Some("salt-lsp".to_string()),
        message: diagnostic.message.clone(),
        ..Default::default()
    }
}

impl SaltBackend {
    /// Indexes the include closure of `document`, then publishes its
    /// diagnostics. The indexing signal is forwarded to the client by the
    /// loading notifier.
    async fn refresh(&self, document: Arc<SlsDocument>) {
        let workspace = self.workspace.clone();
        let uri = document.uri.clone();
        let version = document.version;
        let indexed = task::spawn_blocking(move || {
            workspace.index_document(document.clone());
            let encoding = workspace.position_encoding();
            workspace
                .diagnostics(&document)
                .iter()
                .map(|diagnostic| to_lsp_diagnostic(&document.text, diagnostic, encoding))
                .collect::<Vec<_>>()
        })
        .await;

        match indexed {
            Ok(diagnostics) => {
                self.client.publish_diagnostics(uri, diagnostics, version).await;
            }
            Err(e) => error!("Indexing task for {} failed: {}", uri, e),
        }
    }

    async fn on_files_changed(&self, paths: Vec<PathBuf>) {
        let workspace = self.workspace.clone();
        let affected = task::spawn_blocking(move || {
            let mut affected: Vec<Arc<SlsDocument>> = Vec::new();
            for path in &paths {
                for document in workspace.file_changed(path) {
                    if !affected.iter().any(|seen| seen.uri == document.uri) {
                        affected.push(document);
                    }
                }
            }
            affected
        })
        .await;

        match affected {
            Ok(affected) => {
                debug!("{} open documents affected by file changes", affected.len());
                for document in affected {
                    self.refresh(document).await;
                }
            }
            Err(e) => error!("File change task failed: {}", e),
        }
    }

    fn start_watching(&self, roots: &[PathBuf]) {
        if roots.is_empty() {
            return;
        }
        match FileWatcher::watch(roots) {
            Ok((watcher, events)) => {
                *self.file_watcher.lock() = Some(watcher);
                self.spawn_file_events(events);
            }
            Err(e) => warn!("Failed to watch workspace roots: {}", e),
        }
    }

    fn spawn_file_events(&self, mut events: mpsc::UnboundedReceiver<Vec<PathBuf>>) {
        let backend = self.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    paths = events.recv() => match paths {
                        Some(paths) => backend.on_files_changed(paths).await,
                        None => break,
                    },
                }
            }
            debug!("File event loop stopped");
        });
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for SaltBackend {
    async fn initialize(&self, params: InitializeParams) -> LspResult<InitializeResult> {
        info!("Received initialize from {:?}", params.client_info.as_ref().map(|c| &c.name));
        self.workspace.set_roots(workspace_roots(&params));
        let encoding = PositionEncoding::negotiate(
            params
                .capabilities
                .general
                .as_ref()
                .and_then(|general| general.position_encodings.as_deref()),
        );
        self.workspace.set_position_encoding(encoding);

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                position_encoding: Some(encoding.kind()),
                text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::INCREMENTAL)),
                definition_provider: Some(OneOf::Left(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(TRIGGER_CHARACTERS.iter().map(|c| c.to_string()).collect()),
                    resolve_provider: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let roots = self.workspace.index().roots();
        info!("Initialized with roots {:?}", roots);
        self.start_watching(&roots);
    }

    async fn shutdown(&self) -> LspResult<()> {
        info!("Received shutdown request");
        let _ = self.shutdown_tx.send(());
        self.file_watcher.lock().take();
        let stats = self.workspace.cache_stats();
        info!("File cache: {} entries, hit rate {:.2}", stats.current_size, stats.hit_rate());
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = params.text_document;
        info!("Opening document: URI={}, version={}", document.uri, document.version);
        let workspace = self.workspace.clone();
        let opened = task::spawn_blocking(move || workspace.open(document.uri, document.text, document.version)).await;
        match opened {
            Ok(snapshot) => self.refresh(snapshot).await,
            Err(e) => error!("Open task failed: {}", e),
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        trace!("textDocument/didChange: {} v{}", uri, version);
        let workspace = self.workspace.clone();
        let changed = {
            let uri = uri.clone();
            task::spawn_blocking(move || workspace.change(&uri, params.content_changes, version)).await
        };
        match changed {
            Ok(Ok(Some(snapshot))) => self.refresh(snapshot).await,
            Ok(Ok(None)) => trace!("No commit for {} v{}", uri, version),
            Ok(Err(e)) => warn!("Rejected change to {}: {}", uri, e),
            Err(e) => error!("Change task for {} failed: {}", uri, e),
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.workspace.close(&uri);
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let paths: Vec<PathBuf> = params
            .changes
            .iter()
            .filter_map(|change| uri_to_path(&change.uri))
            .filter(|path| is_sls(path))
            .collect();
        if !paths.is_empty() {
            self.on_files_changed(paths).await;
        }
    }

    async fn completion(&self, params: CompletionParams) -> LspResult<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let trigger = params.context.and_then(|context| context.trigger_character);
        debug!("Completion at {:?} in {} (trigger {:?})", position, uri, trigger);

        let workspace = self.workspace.clone();
        let suggestions = task::spawn_blocking(move || match workspace.char_position(&uri, position) {
            Some(position) => workspace.complete(&uri, position, trigger.as_deref()),
            None => Vec::new(),
        })
        .await
            .map_err(|e| {
                error!("Completion task failed: {}", e);
                jsonrpc::Error::internal_error()
            })?;
        let items = suggestions.into_iter().map(to_completion_item).collect();
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn goto_definition(&self, params: GotoDefinitionParams) -> LspResult<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let workspace = self.workspace.clone();
        let location = task::spawn_blocking(move || {
            let position = workspace.char_position(&uri, position)?;
            workspace.definition(&uri, position)
        })
        .await
            .map_err(|e| {
                error!("Definition task failed: {}", e);
                jsonrpc::Error::internal_error()
            })?;
        Ok(location.map(GotoDefinitionResponse::Scalar))
    }
}
