#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use table_engine::{
    column_type::builtin_catalog,
    config::EngineConfig,
    model::{CustomerTable, TableKind},
    storage::{MemoryStore, TableStore},
};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes raw bytes into a file under the workspace and returns the path.
    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, contents).expect("write temp file bytes");
        path
    }

    /// Engine configuration that stages files inside this workspace.
    pub fn config(&self) -> EngineConfig {
        EngineConfig {
            staging_dir: self.staging_dir(),
            ..Default::default()
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.temp_dir.path().join("staging")
    }

    /// Number of files currently left in the staging directory.
    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.staging_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// A store with the built-in column types and one empty staging table.
pub fn store_with_table(name: &str) -> (MemoryStore, u64) {
    let store = MemoryStore::with_column_types(builtin_catalog());
    let table = store
        .create_table(CustomerTable::staging(1, name, TableKind::Default))
        .expect("create table");
    (store, table.id)
}
