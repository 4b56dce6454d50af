// lifecycle.rs - Create, seed, hand out and drop an ephemeral test database
//
// Setup:    CREATE DATABASE (drop + one retry if a stale copy exists),
//           then run the fixture script against the new database.
// Use:      test code opens connections or a pool from a `TestDatabase`.
// Teardown: refuse new connections, terminate the remaining sessions,
//           DROP DATABASE. The order matters: a database with attached
//           sessions cannot be dropped, and nothing may reconnect in between.
//
// Each administrative step opens its own session and closes it before
// returning, whether the step succeeded or not.

use crate::admin::{quote_identifier, AdminSession};
use crate::config::{DbSettings, HarnessConfig};
use crate::error::{is_duplicate_database, HarnessError, Result};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::Connection;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

/// Handle to one test database.
///
/// Cloning is cheap; every clone refers to the same server-side database.
#[derive(Debug, Clone)]
pub struct TestDatabase {
    config: HarnessConfig,
    name: String,
    settings: DbSettings,
}

impl TestDatabase {
    /// Describe the test database for `config` without touching the server.
    pub fn new(config: HarnessConfig) -> Self {
        let name = config.test_database_name();
        let settings = config.test_settings();
        Self {
            config,
            name,
            settings,
        }
    }

    /// Create the database and load the fixture script.
    ///
    /// Nothing is returned unless both steps succeed. If the fixtures fail to load, the half-built database is dropped again
    /// and the load error is returned.
    pub async fn setup(config: HarnessConfig) -> Result<Self> {
        let db = Self::new(config);
        db.create_test_database().await?;

        if let Err(err) = db.load_fixtures().await {
            if let Err(drop_err) = db.terminate_and_drop().await {
                tracing::warn!(database = %db.name, error = %drop_err, "could not drop database after failed fixture load");
            }
            return Err(err);
        }

        tracing::info!(database = %db.name, "test database ready");
        Ok(db)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settings pointing at the test database.
    pub fn settings(&self) -> &DbSettings {
        &self.settings
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Issue `CREATE DATABASE`, replacing a leftover database of the same name.
    ///
    /// Returns `true` when a stale database had to be dropped first.
    pub async fn create_test_database(&self) -> Result<bool> {
        self.config.check_test_name()?;
        let mut admin = AdminSession::open(self.config.admin_settings()).await?;
        let outcome = self.create_on(&mut admin).await;
        admin.release(outcome).await
    }

    async fn create_on(&self, admin: &mut AdminSession) -> Result<bool> {
        let quoted = quote_identifier(&self.name);
        let create = format!("CREATE DATABASE {}", quoted);

        match admin.execute(&create).await {
            Ok(_) => {
                tracing::info!(database = %self.name, "created test database");
                Ok(false)
            }
            Err(err) if is_duplicate_database(&err) => {
                tracing::warn!(database = %self.name, "test database left over from an earlier run, recreating");
                admin
                    .execute(&format!("DROP DATABASE {}", quoted))
                    .await
                    .map_err(|source| HarnessError::DropDatabase {
                        database: self.name.clone(),
                        source,
                    })?;
                admin
                    .execute(&create)
                    .await
                    .map_err(|source| HarnessError::CreateDatabase {
                        database: self.name.clone(),
                        source,
                    })?;
                tracing::info!(database = %self.name, "recreated test database");
                Ok(true)
            }
            Err(source) => Err(HarnessError::CreateDatabase {
                database: self.name.clone(),
                source,
            }),
        }
    }

    /// Run the fixture script against the test database as one batch.
    pub async fn load_fixtures(&self) -> Result<()> {
        let mut session = AdminSession::open(&self.settings).await?;
        let outcome = self.load_on(&mut session).await;
        session.release(outcome).await
    }

    async fn load_on(&self, session: &mut AdminSession) -> Result<()> {
        let fixtures = &self.config.fixtures;
        let sql = fixtures.read().await?;

        sqlx::raw_sql(&sql)
            .execute(session.connection())
            .await
            .map_err(|source| HarnessError::LoadFixtures {
                database: self.name.clone(),
                path: fixtures.path().to_path_buf(),
                source,
            })?;

        tracing::info!(
            database = %self.name,
            fixtures = %fixtures.path().display(),
            "loaded fixtures"
        );
        Ok(())
    }

    /// Open a connection to the test database.
    pub async fn connect(&self) -> Result<TestConnection> {
        let conn = PgConnection::connect_with(&self.settings.connect_options())
            .await
            .map_err(|source| HarnessError::Connect {
                database: self.name.clone(),
                source,
            })?;
        Ok(TestConnection { conn })
    }

    /// Build a pool against the test database.
    ///
    /// Close the pool (or let teardown terminate its sessions) when done.
    pub async fn pool(&self, max_connections: u32) -> Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(self.settings.connect_options())
            .await
            .map_err(|source| HarnessError::Connect {
                database: self.name.clone(),
                source,
            })
    }

    /// Stop the server from accepting new connections to the test database.
    pub async fn quarantine(&self) -> Result<()> {
        self.config.check_test_name()?;
        let mut admin = AdminSession::open(self.config.admin_settings()).await?;
        let sql = format!(
            "ALTER DATABASE {} WITH ALLOW_CONNECTIONS false",
            quote_identifier(&self.name)
        );
        let outcome = admin
            .execute(&sql)
            .await
            .map(|_| ())
            .map_err(|source| HarnessError::Quarantine {
                database: self.name.clone(),
                source,
            });
        admin.release(outcome).await?;

        tracing::debug!(database = %self.name, "new connections blocked");
        Ok(())
    }

    /// Kick every session off the test database, then drop it.
    ///
    /// Returns how many sessions were terminated.
    pub async fn terminate_and_drop(&self) -> Result<usize> {
        self.config.check_test_name()?;
        let mut admin = AdminSession::open(self.config.admin_settings()).await?;
        let outcome = self.terminate_and_drop_on(&mut admin).await;
        admin.release(outcome).await
    }

    async fn terminate_and_drop_on(&self, admin: &mut AdminSession) -> Result<usize> {
        let terminated: Vec<bool> = sqlx::query_scalar(
            r#"
            SELECT pg_terminate_backend(pid)
            FROM pg_stat_activity
            WHERE datname = $1 AND pid <> pg_backend_pid()
            "#,
        )
        .bind(&self.name)
        .fetch_all(admin.connection())
        .await
        .map_err(|source| HarnessError::TerminateBackends {
            database: self.name.clone(),
            source,
        })?;
        let terminated = terminated.into_iter().filter(|ok| *ok).count();

        admin
            .execute(&format!("DROP DATABASE {}", quote_identifier(&self.name)))
            .await
            .map_err(|source| HarnessError::DropDatabase {
                database: self.name.clone(),
                source,
            })?;

        tracing::info!(database = %self.name, terminated, "dropped test database");
        Ok(terminated)
    }

    /// Quarantine, terminate, drop.
    pub async fn teardown(self) -> Result<()> {
        self.quarantine().await?;
        self.terminate_and_drop().await?;
        Ok(())
    }

    /// Whether the test database currently exists on the server.
    pub async fn exists(&self) -> Result<bool> {
        let mut admin = AdminSession::open(self.config.admin_settings()).await?;
        let outcome = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&self.name)
            .fetch_one(admin.connection())
            .await
            .map_err(|source| HarnessError::Query {
                database: self.config.admin_settings().database.clone(),
                source,
            });
        admin.release(outcome).await
    }

    /// Number of server sessions attached to the test database, other than
    /// the one asking.
    pub async fn attached_sessions(&self) -> Result<i64> {
        let mut admin = AdminSession::open(self.config.admin_settings()).await?;
        let outcome = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pg_stat_activity WHERE datname = $1 AND pid <> pg_backend_pid()",
        )
        .bind(&self.name)
        .fetch_one(admin.connection())
        .await
        .map_err(|source| HarnessError::Query {
            database: self.config.admin_settings().database.clone(),
            source,
        });
        admin.release(outcome).await
    }
}

/// A session on the test database handed to test code.
///
/// Derefs to `PgConnection`, so it works anywhere sqlx expects
/// `&mut PgConnection` (`&mut *conn`). Dropping it releases the socket.
pub struct TestConnection {
    conn: PgConnection,
}

impl TestConnection {
    pub async fn close(self) -> std::result::Result<(), sqlx::Error> {
        self.conn.close().await
    }
}

impl Deref for TestConnection {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        &self.conn
    }
}

impl DerefMut for TestConnection {
    fn deref_mut(&mut self) -> &mut PgConnection {
        &mut self.conn
    }
}

/// Provision a test database, run `body` against it, and always tear it down.
///
/// `body` runs as its own Tokio task so a panic inside it still reaches
/// teardown; the panic is resumed afterwards. If `body` fails, its error is
/// returned and a teardown failure is only logged. If `body` succeeds, a
/// teardown failure becomes the result.
pub async fn with_test_database<F, Fut, T, E>(config: HarnessConfig, body: F) -> std::result::Result<T, E>
where
    F: FnOnce(TestDatabase) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<HarnessError> + Send + 'static,
{
    let db = TestDatabase::setup(config).await?;
    let name = db.name().to_string();

    let joined = tokio::spawn(body(db.clone())).await;
    let teardown = db.teardown().await;

    match joined {
        Ok(Ok(value)) => {
            teardown?;
            Ok(value)
        }
        Ok(Err(err)) => {
            if let Err(teardown_err) = teardown {
                tracing::warn!(database = %name, error = %teardown_err, "teardown failed after test error");
            }
            Err(err)
        }
        Err(join_err) => {
            if let Err(teardown_err) = teardown {
                tracing::warn!(database = %name, error = %teardown_err, "teardown failed after test panic");
            }
            if join_err.is_panic() {
                std::panic::resume_unwind(join_err.into_panic());
            }
            Err(HarnessError::TestTaskFailed {
                database: name,
                source: join_err,
            }
            .into())
        }
    }
}
