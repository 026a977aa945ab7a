mod common;

use std::time::Duration;

use tokio::task;
use tower_lsp::lsp_types::{Position as LspPosition, Range as LspRange, TextDocumentContentChangeEvent};

use common::TestWorkspace;
use salt_language_server::ir::Severity;

#[tokio::test]
async fn test_signal_lists_include_closure_in_bfs_order() {
    let workspace = TestWorkspace::sample();
    let mut signals = workspace.core.subscribe();
    let foo = workspace.open("foo.sls");

    let core = workspace.core.clone();
    let snapshot = core.snapshot(&foo).unwrap();
    let files = task::spawn_blocking(move || core.index_document(snapshot)).await.unwrap();

    let signal = tokio::time::timeout(Duration::from_secs(5), signals.recv())
        .await
        .expect("signal in time")
        .expect("channel open");
    assert_eq!(signal.uri, foo);
    assert_eq!(signal.files, files);
    assert_eq!(
        files,
        vec![workspace.uri("foo.sls"), workspace.uri("bar.sls"), workspace.uri("baz.sls"), workspace.uri("quo.sls")]
    );
}

#[tokio::test]
async fn test_unresolved_include_is_a_warning_after_indexing() {
    let workspace = TestWorkspace::sample();
    let baz = workspace.open("baz.sls");
    let snapshot = workspace.core.snapshot(&baz).unwrap();
    workspace.core.index_document(snapshot.clone());

    let diagnostics = workspace.core.diagnostics(&snapshot);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].severity, Severity::Warning);
    assert!(diagnostics[0].message.contains("qux"));

    common::write(workspace.dir.path(), "qux.sls", "qux:\n  test.nop\n");
    let affected = workspace.core.file_changed(&workspace.path("qux.sls"));
    assert_eq!(affected.len(), 1);
    workspace.core.index_document(affected[0].clone());
    assert!(workspace.core.diagnostics(&affected[0]).is_empty());
}

#[tokio::test]
async fn test_concurrent_edits_commit_the_newest_version() {
    let workspace = TestWorkspace::new(&[]);
    let uri = workspace.uri("edit.sls");
    workspace.core.open(uri.clone(), "foo:\n  file.\n".into(), 1);

    let mut handles = Vec::new();
    for version in 2..=20 {
        let core = workspace.core.clone();
        let uri = uri.clone();
        handles.push(task::spawn_blocking(move || {
            let change = TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: format!("state{}:\n  test.nop\n", version),
            };
            core.change(&uri, vec![change], version)
        }));
    }
    for handle in handles {
        // Older versions may be rejected as stale or superseded.
        let _ = handle.await.unwrap();
    }

    let snapshot = workspace.core.snapshot(&uri).unwrap();
    let tree = &snapshot.tree;
    let id = tree.state_id(tree.states().next().unwrap()).unwrap().to_string();
    assert_eq!(snapshot.version, Some(20));
    assert_eq!(id, "state20");
}

#[tokio::test]
async fn test_incremental_edit_updates_completion_anchor() {
    let workspace = TestWorkspace::new(&[]);
    let uri = workspace.uri("motd.sls");
    workspace.core.open(uri.clone(), "motd:\n  file\n".into(), 1);

    let change = TextDocumentContentChangeEvent {
        range: Some(LspRange {
            start: LspPosition { line: 1, character: 6 },
            end: LspPosition { line: 1, character: 6 },
        }),
        range_length: None,
        text: ".".into(),
    };
    let snapshot = workspace.core.change(&uri, vec![change], 2).unwrap().unwrap();
    assert_eq!(snapshot.text, "motd:\n  file.\n");

    let suggestions = workspace
        .core
        .complete(&uri, salt_language_server::ir::Position::new(1, 7), Some("."));
    assert_eq!(suggestions.len(), 30);
}
