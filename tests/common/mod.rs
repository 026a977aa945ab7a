#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indoc::indoc;
use tempfile::TempDir;
use tower_lsp::lsp_types::Url;

use salt_language_server::lsp::backend::SaltWorkspace;
use salt_language_server::state_schema::StateSchema;

pub const TOP: &str = indoc! {"
    base:
      '*':
        - opensuse
"};

pub const OPENSUSE_INIT: &str = indoc! {"
    include:
      - dns.server

    root:
      user.present
"};

pub const OPENSUSE_BASE: &str = indoc! {"
    bernd:
      user.present:
        - fullname: Bernhardt
        - home: /home/bernd

    /home/bernd/.bashrc:
      file.managed:
        - source: salt://opensuse/bash
        - require:
          - user: bernd
"};

pub const DNS_SERVER: &str = indoc! {"
    /disk:
      mount.mounted:
        - fstype: zfs
"};

pub const FOO: &str = indoc! {"
    include:
      - bar
      - baz

    foo:
      test.nop:
        - require:
          - /root/.fishrc
"};

pub const BAR: &str = indoc! {"
    include:
      - quo

    bar:
      test.nop:
        - require:
          - /root/.fishrc
"};

pub const BAZ: &str = indoc! {"
    include:
      - qux
"};

pub const QUO: &str = indoc! {"
    /root/.fishrc:
      file.managed:
        - user: root
        - group: root
        - require:
          - user: root
"};

/// A workspace directory on disk plus a core rooted at it.
pub struct TestWorkspace {
    pub dir: TempDir,
    pub core: Arc<SaltWorkspace>,
}

impl TestWorkspace {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (relative, text) in files {
            write(dir.path(), relative, text);
        }
        let core = Arc::new(SaltWorkspace::with_schema(StateSchema::bundled(), 32));
        core.set_roots(vec![dir.path().to_path_buf()]);
        Self { dir, core }
    }

    /// The sample tree: `top.sls`, `opensuse/`, `dns/server/` and the
    /// foo/bar/baz/quo include chain (`qux` is missing).
    pub fn sample() -> Self {
        Self::new(&[
            ("top.sls", TOP),
            ("opensuse/init.sls", OPENSUSE_INIT),
            ("opensuse/base.sls", OPENSUSE_BASE),
            ("dns/server/init.sls", DNS_SERVER),
            ("foo.sls", FOO),
            ("bar.sls", BAR),
            ("baz.sls", BAZ),
            ("quo.sls", QUO),
        ])
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn uri(&self, relative: &str) -> Url {
        Url::from_file_path(self.path(relative)).unwrap()
    }

    /// Opens a file of the workspace with its on-disk content.
    pub fn open(&self, relative: &str) -> Url {
        let uri = self.uri(relative);
        let text = fs::read_to_string(self.path(relative)).unwrap();
        self.core.open(uri.clone(), text, 1);
        uri
    }
}

pub fn write(root: &Path, relative: &str, text: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, text).unwrap();
    path
}
