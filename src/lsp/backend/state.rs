//! Backend state management
//!
//! This module defines the SaltBackend struct, which holds the client handle,
//! the transport-independent workspace core and the file watcher.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tower_lsp::Client;
use tower_lsp::lsp_types::Url;
use tower_lsp::lsp_types::notification::Notification;
use tracing::{debug, warn};

use super::watcher::FileWatcher;
use super::workspace::SaltWorkspace;
use crate::lsp::config::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingFinishedParams {
    pub uri: Url,
}

/// Sent once the include closure of a document has been indexed.
pub enum LoadingFinished {}

impl Notification for LoadingFinished {
    type Params = LoadingFinishedParams;
    const METHOD: &'static str = "saltLsp/loadingFinished";
}

/// The Salt language server backend, managing state and handling LSP requests.
#[derive(Clone)]
pub struct SaltBackend {
    pub(super) client: Client,
    pub(super) workspace: Arc<SaltWorkspace>,
    pub(super) file_watcher: Arc<Mutex<Option<FileWatcher>>>,
    pub(super) shutdown_tx: Arc<broadcast::Sender<()>>,
}

impl std::fmt::Debug for SaltBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaltBackend")
            .field("workspace", &self.workspace)
            .field("watching", &self.file_watcher.lock().is_some())
            .finish()
    }
}

impl SaltBackend {
    /// Creates the backend and starts forwarding indexing signals to the
    /// client. Must be called from within a tokio runtime.
    pub fn new(client: Client, config: &ServerConfig) -> Self {
        let workspace = Arc::new(SaltWorkspace::new(config));
        let (shutdown_tx, _) = broadcast::channel(1);
        let backend = Self {
            client,
            workspace,
            file_watcher: Arc::new(Mutex::new(None)),
            shutdown_tx: Arc::new(shutdown_tx),
        };
        backend.spawn_loading_notifier();
        backend
    }

    pub fn workspace(&self) -> &Arc<SaltWorkspace> {
        &self.workspace
    }

    fn spawn_loading_notifier(&self) {
        let mut signals = self.workspace.subscribe();
        let mut shutdown = self.shutdown_tx.subscribe();
        let client = self.client.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    signal = signals.recv() => match signal {
                        Ok(signal) => {
                            client
                                .send_notification::<LoadingFinished>(LoadingFinishedParams { uri: signal.uri })
                                .await;
                        }
                        Err(RecvError::Lagged(skipped)) => warn!("Dropped {} loading notifications", skipped),
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("Loading notifier stopped");
        });
    }
}
