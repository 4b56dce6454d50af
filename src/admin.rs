// admin.rs - Administrative sessions
//
// An admin session is a single connection used for CREATE/DROP DATABASE,
// ALTER DATABASE and pg_terminate_backend. None of those may run inside a
// transaction block, so statements are sent on a bare connection and each one
// commits on its own.

use crate::config::DbSettings;
use crate::error::{HarnessError, Result};
use sqlx::postgres::{PgConnection, PgQueryResult};
use sqlx::{Connection, Executor};

pub struct AdminSession {
    conn: PgConnection,
    database: String,
}

impl AdminSession {
    /// Connect to `settings.database`.
    pub async fn open(settings: &DbSettings) -> Result<Self> {
        tracing::debug!(database = %settings.database, "opening admin session");
        let conn = PgConnection::connect_with(&settings.connect_options())
            .await
            .map_err(|source| HarnessError::Connect {
                database: settings.database.clone(),
                source,
            })?;

        Ok(Self {
            conn,
            database: settings.database.clone(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Run a single parameterless statement (DDL such as CREATE DATABASE).
    pub async fn execute(&mut self, sql: &str) -> std::result::Result<PgQueryResult, sqlx::Error> {
        (&mut self.conn).execute(sql).await
    }

    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    pub async fn close(self) -> Result<()> {
        tracing::debug!(database = %self.database, "closing admin session");
        let database = self.database;
        self.conn
            .close()
            .await
            .map_err(|source| HarnessError::Close { database, source })
    }

    /// Close the session and hand back `outcome`.
    ///
    /// An error already in `outcome` takes precedence over a failed close.
    pub async fn release<T>(self, outcome: Result<T>) -> Result<T> {
        let database = self.database.clone();
        match (outcome, self.close().await) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                tracing::warn!(%database, error = %close_err, "admin session did not close cleanly");
                Err(err)
            }
        }
    }
}

/// Quote an identifier for interpolation into DDL.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
