/// Lifecycle tests against a real PostgreSQL server
///
/// Prerequisites: POSTGRES_USER, POSTGRES_PASSWORD, POSTGRES_DB (and optionally
/// POSTGRES_HOST / POSTGRES_PORT) for a role allowed to create databases.
///
/// Run with: cargo test --features live-db

mod common;

use anyhow::Result;
use common::{harness_config, scratch_fixture};
use pg_test_db::fixtures::tables::{CompaniesTable, MetaTable};
use pg_test_db::fixtures::TestTable;
use pg_test_db::{with_test_database, HarnessError, TestDatabase};

async fn count_rows(db: &TestDatabase, table: &str) -> Result<i64> {
    let mut conn = db.connect().await?;
    let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(&mut *conn)
        .await?;
    conn.close().await?;
    Ok(count)
}

#[tokio::test]
async fn test_fresh_database_lifecycle() -> Result<()> {
    let config = harness_config()?;

    let db = TestDatabase::setup(config.clone()).await?;
    assert!(db.exists().await?, "database should exist after setup");
    assert_eq!(count_rows(&db, CompaniesTable::table_name()).await?, CompaniesTable::seeded_rows());
    assert_eq!(count_rows(&db, MetaTable::table_name()).await?, MetaTable::seeded_rows());

    db.clone().teardown().await?;
    assert!(!db.exists().await?, "database should be gone after teardown");
    Ok(())
}

#[tokio::test]
async fn test_repeated_runs_do_not_accumulate_rows() -> Result<()> {
    let config = harness_config()?;

    for _ in 0..2 {
        let count = with_test_database(config.clone(), |db| async move {
            count_rows(&db, CompaniesTable::table_name()).await
        })
        .await?;
        assert_eq!(count, CompaniesTable::seeded_rows());
    }
    Ok(())
}

#[tokio::test]
async fn test_stale_database_is_replaced() -> Result<()> {
    let config = harness_config()?;

    // A previous run that never reached teardown
    let stale = TestDatabase::setup(config.clone()).await?;
    let mut conn = stale.connect().await?;
    sqlx::query("INSERT INTO meta (key, value) VALUES ('stale', 'yes')")
        .execute(&mut *conn)
        .await?;
    conn.close().await?;
    assert_eq!(count_rows(&stale, "meta").await?, 2);

    let db = TestDatabase::new(config.clone());
    let replaced = db.create_test_database().await?;
    assert!(replaced, "leftover database should have been dropped and recreated");

    db.load_fixtures().await?;
    assert_eq!(count_rows(&db, MetaTable::table_name()).await?, MetaTable::seeded_rows());

    db.teardown().await?;
    Ok(())
}

#[tokio::test]
async fn test_create_reports_fresh_database() -> Result<()> {
    let config = harness_config()?;
    let db = TestDatabase::new(config.clone());

    assert!(!db.create_test_database().await?);

    db.terminate_and_drop().await?;
    assert!(!db.exists().await?);
    Ok(())
}

#[tokio::test]
async fn test_invalid_fixtures_abort_setup() -> Result<()> {
    let path = scratch_fixture("CREATE TABLE broken (id INT;\n")?;
    let config = harness_config()?.with_fixtures(&path);

    let err = TestDatabase::setup(config.clone()).await.unwrap_err();
    assert!(
        matches!(err, HarnessError::LoadFixtures { .. }),
        "unexpected error: {err}"
    );

    // A unique name is never reused, so the half-built database must not linger
    assert!(config.is_unique());
    assert!(!TestDatabase::new(config).exists().await?);

    std::fs::remove_file(path)?;
    Ok(())
}

#[tokio::test]
async fn test_missing_fixture_file_aborts_setup() -> Result<()> {
    let config = harness_config()?.with_fixtures("does/not/exist.sql");

    let err = TestDatabase::setup(config.clone()).await.unwrap_err();
    assert!(matches!(err, HarnessError::ReadFixtures { .. }));
    assert!(!TestDatabase::new(config).exists().await?);
    Ok(())
}

#[tokio::test]
async fn test_fixture_script_runs_as_one_batch() -> Result<()> {
    let path = scratch_fixture(
        r#"
        -- several statements, one with a semicolon inside a literal
        CREATE TABLE notes (id SERIAL PRIMARY KEY, body TEXT NOT NULL);
        INSERT INTO notes (body) VALUES ('first; still first');
        INSERT INTO notes (body) VALUES ('second');
        CREATE VIEW note_count AS SELECT COUNT(*) AS n FROM notes;
        "#,
    )?;
    let config = harness_config()?.with_fixtures(&path);

    with_test_database(config, |db| async move {
        let mut conn = db.connect().await?;
        let n: i64 = sqlx::query_scalar("SELECT n FROM note_count")
            .fetch_one(&mut *conn)
            .await?;
        assert_eq!(n, 2);

        let first: String = sqlx::query_scalar("SELECT body FROM notes ORDER BY id LIMIT 1")
            .fetch_one(&mut *conn)
            .await?;
        assert_eq!(first, "first; still first");
        conn.close().await?;
        Ok::<_, anyhow::Error>(())
    })
    .await?;

    std::fs::remove_file(path)?;
    Ok(())
}

#[tokio::test]
async fn test_teardown_runs_after_test_error() -> Result<()> {
    let config = harness_config()?;

    let result: Result<()> = with_test_database(config.clone(), |_db| async move {
        anyhow::bail!("assertion failed inside the test body")
    })
    .await;

    assert!(result.is_err());
    assert!(!TestDatabase::new(config).exists().await?);
    Ok(())
}

#[tokio::test]
async fn test_teardown_runs_after_test_panic() -> Result<()> {
    let config = harness_config()?;

    let run = tokio::spawn(with_test_database(config.clone(), |_db| async move {
        if true {
            panic!("test body panicked");
        }
        Ok::<(), anyhow::Error>(())
    }));

    let join_err = run.await.unwrap_err();
    assert!(join_err.is_panic());
    assert!(!TestDatabase::new(config).exists().await?);
    Ok(())
}

#[tokio::test]
async fn test_open_sessions_are_terminated() -> Result<()> {
    let config = harness_config()?;
    let db = TestDatabase::setup(config).await?;

    // Left open on purpose, like a test that forgot to close its connection
    let _leaked = db.connect().await?;
    let pool = db.pool(2).await?;
    sqlx::query("SELECT 1").execute(&pool).await?;
    assert!(db.attached_sessions().await? >= 2);

    db.quarantine().await?;
    let refused = db.connect().await;
    assert!(refused.is_err(), "quarantined database should refuse new connections");

    let terminated = db.terminate_and_drop().await?;
    assert!(terminated >= 2, "expected both sessions terminated, got {terminated}");
    assert!(!db.exists().await?);
    Ok(())
}
