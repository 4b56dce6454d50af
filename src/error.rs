// error.rs - Errors raised while provisioning or tearing down a test database
//
// Every variant that wraps a driver or IO failure keeps it as `#[source]`, so
// callers (and anyhow's `{:#}` formatting) see the underlying cause.

use std::path::PathBuf;
use thiserror::Error;

/// SQLSTATE for `duplicate_database`
pub const DUPLICATE_DATABASE: &str = "42P04";

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("environment variable {0} must be set")]
    MissingSetting(&'static str),

    #[error("environment variable {key} has an invalid value {value:?}")]
    InvalidSetting { key: &'static str, value: String },

    #[error("test database name {database} is the configured database itself")]
    TestNameCollides { database: String },

    #[error("failed to connect to database {database}")]
    Connect {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to create database {database}")]
    CreateDatabase {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to drop database {database}")]
    DropDatabase {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("no fixture script found (looked in {})", display_paths(.0))]
    FixturesNotFound(Vec<PathBuf>),

    #[error("failed to read fixture script {path}")]
    ReadFixtures {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load fixture script {path} into {database}")]
    LoadFixtures {
        database: String,
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to block new connections to {database}")]
    Quarantine {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to terminate sessions attached to {database}")]
    TerminateBackends {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("query on {database} failed")]
    Query {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to close session on {database}")]
    Close {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("test body for {database} did not run to completion")]
    TestTaskFailed {
        database: String,
        #[source]
        source: tokio::task::JoinError,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// True when the server rejected a `CREATE DATABASE` because the name is taken.
pub fn is_duplicate_database(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(DUPLICATE_DATABASE),
        _ => false,
    }
}
