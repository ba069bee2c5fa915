#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// The binary under test with logging kept out of assertions on stderr.
pub fn followup_cmd() -> Command {
    let mut cmd = Command::cargo_bin("followup-quotes").expect("binary exists");
    cmd.env("RUST_LOG", "off");
    cmd
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

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

    /// Reads a written report table back as rows of unquoted cells, header first.
    pub fn read_table(&self, dir: &str, table: &str) -> Vec<Vec<String>> {
        let path = self.path().join(dir).join(format!("{table}.csv"));
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .unwrap_or_else(|err| panic!("open {path:?}: {err}"));
        reader
            .records()
            .map(|record| {
                record
                    .expect("csv record")
                    .iter()
                    .map(str::to_string)
                    .collect()
            })
            .collect()
    }

    pub fn table_exists(&self, dir: &str, table: &str) -> bool {
        fs::metadata(self.path().join(dir).join(format!("{table}.csv"))).is_ok()
    }
}

/// Quote ids (first column) of a table read with [`TestWorkspace::read_table`].
pub fn quote_ids(rows: &[Vec<String>]) -> Vec<String> {
    rows.iter().skip(1).map(|row| row[0].clone()).collect()
}
