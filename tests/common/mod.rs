// common/mod.rs - Shared helpers for tests that talk to a live server
//
// Each test gets its own uniquely named database so the test binary can run
// its tests in parallel against one server.

#![allow(dead_code)]

use pg_test_db::logging::init_test_tracing;
use pg_test_db::HarnessConfig;
use std::path::PathBuf;

/// Settings from POSTGRES_* (or .env), with a per-test unique database name
pub fn harness_config() -> anyhow::Result<HarnessConfig> {
    init_test_tracing();
    Ok(HarnessConfig::from_env()?.unique())
}

/// Write `sql` to a throwaway file and return its path
pub fn scratch_fixture(sql: &str) -> anyhow::Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("pg_test_db_{}.sql", uuid::Uuid::new_v4().simple()));
    std::fs::write(&path, sql)?;
    Ok(path)
}
