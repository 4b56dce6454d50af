// lib.rs - Root module for the pg_test_db library
//
// Provisions a throwaway PostgreSQL database for a test suite: create it,
// load the fixture script, hand out connections, then drop it again.

pub mod admin;
pub mod config;
pub mod error;
/// The fixtures module contains the fixture script and its seed tables
pub mod fixtures;
pub mod lifecycle;
pub mod logging;

pub use config::{DbSettings, HarnessConfig};
pub use error::{HarnessError, Result};
pub use fixtures::FixtureScript;
pub use lifecycle::{with_test_database, TestConnection, TestDatabase};
