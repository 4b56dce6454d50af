// fixtures/mod.rs - The SQL fixture script loaded into every test database
//
// The script is plain SQL (schema first, then seed rows). It is read whole and
// sent to the server as one batch, so it may hold any number of statements.
//
// Tests can run from the crate directory or from a workspace root, so the
// default location is searched across a few candidate paths.

pub mod tables;

use crate::error::{HarnessError, Result};
use std::path::{Path, PathBuf};

/// Seed tables whose expected contents tests can check after setup
pub trait TestTable {
    /// Table name as created by the fixture script
    fn table_name() -> &'static str;

    /// Number of rows the fixture script inserts
    fn seeded_rows() -> i64;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureScript {
    path: PathBuf,
}

impl FixtureScript {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// First candidate that exists on disk.
    pub fn locate<I, P>(candidates: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let candidates: Vec<PathBuf> = candidates.into_iter().map(Into::into).collect();
        candidates
            .iter()
            .find(|p| p.is_file())
            .cloned()
            .map(Self::new)
            .ok_or(HarnessError::FixturesNotFound(candidates))
    }

    /// `tests/fixtures.sql` relative to the working directory or this crate.
    pub fn default_location() -> Result<Self> {
        Self::locate([
            PathBuf::from("tests/fixtures.sql"),
            PathBuf::from("fixtures.sql"),
            Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures.sql"),
        ])
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The full script text.
    pub async fn read(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| HarnessError::ReadFixtures {
                path: self.path.clone(),
                source,
            })
    }
}
