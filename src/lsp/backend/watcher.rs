//! Recursive file system watching of the workspace roots.
//!
//! Events arrive on notify's own thread and are forwarded, reduced to the
//! affected `.sls` paths, to an unbounded tokio channel.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Keeps the underlying watcher alive; dropping it stops the events.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher").finish_non_exhaustive()
    }
}

impl FileWatcher {
    pub fn watch(roots: &[PathBuf]) -> notify::Result<(Self, mpsc::UnboundedReceiver<Vec<PathBuf>>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let paths = sls_paths(event);
                    if !paths.is_empty() {
                        let _ = tx.send(paths);
                    }
                }
                Err(e) => warn!("File watcher error: {}", e),
            },
            notify::Config::default(),
        )?;
        for root in roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
            debug!("Watching {}", root.display());
        }
        Ok((Self { _watcher: watcher }, rx))
    }
}

pub fn is_sls(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "sls")
}

/// `.sls` paths touched by a create, modify or remove event.
pub fn sls_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
            event.paths.into_iter().filter(|p| is_sls(p)).collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    #[test]
    fn test_only_sls_changes_pass() {
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/srv/salt/top.sls"))
            .add_path(PathBuf::from("/srv/salt/README.md"));
        assert_eq!(sls_paths(event), vec![PathBuf::from("/srv/salt/top.sls")]);

        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/srv/salt/qux.sls"));
        assert_eq!(sls_paths(created).len(), 1);

        let access = Event::new(EventKind::Access(AccessKind::Any)).add_path(PathBuf::from("/srv/salt/top.sls"));
        assert!(sls_paths(access).is_empty());
    }

    #[tokio::test]
    async fn test_watch_reports_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let (_watcher, mut rx) = FileWatcher::watch(&[dir.path().to_path_buf()]).unwrap();
        std::fs::write(dir.path().join("qux.sls"), "qux:\n  test.nop\n").unwrap();
        let paths = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv()).await;
        // Some platforms coalesce or delay events; only check what arrives.
        if let Ok(Some(paths)) = paths {
            assert!(paths.iter().all(|p| is_sls(p)));
        }
    }
}
