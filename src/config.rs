// config.rs - Connection settings and harness options
//
// Settings are plain values. Pointing a connection at the test database means
// building a second `DbSettings` with `with_database`, never rewriting a shared
// global that other code might be reading at the same time.

use crate::error::{HarnessError, Result};
use crate::fixtures::FixtureScript;
use sqlx::postgres::PgConnectOptions;
use std::fmt;
use std::path::PathBuf;

/// PostgreSQL's identifier limit (NAMEDATALEN - 1)
pub const MAX_IDENTIFIER_LEN: usize = 63;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_SUFFIX: &str = "_test";

/// Where to reach the server and which database the application normally uses
#[derive(Clone, PartialEq, Eq)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl DbSettings {
    /// Read `POSTGRES_*` variables, loading a `.env` file first if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, but with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or(HarnessError::MissingSetting(key))
        };

        let port = match lookup("POSTGRES_PORT").filter(|v| !v.is_empty()) {
            Some(raw) => raw.parse().map_err(|_| HarnessError::InvalidSetting {
                key: "POSTGRES_PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            host: lookup("POSTGRES_HOST")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            user: required("POSTGRES_USER")?,
            password: required("POSTGRES_PASSWORD")?,
            database: required("POSTGRES_DB")?,
        })
    }

    /// A copy of these settings aimed at another database on the same server.
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self.clone()
        }
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

impl fmt::Debug for DbSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Everything the lifecycle manager needs: server settings, naming and fixtures
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub settings: DbSettings,
    pub suffix: String,
    pub fixtures: FixtureScript,
    unique_token: Option<String>,
}

impl HarnessConfig {
    pub fn new(settings: DbSettings, fixtures: FixtureScript) -> Self {
        Self {
            settings,
            suffix: DEFAULT_SUFFIX.to_string(),
            fixtures,
            unique_token: None,
        }
    }

    /// Build from the environment.
    ///
    /// Besides the `POSTGRES_*` settings this honors `TEST_DB_SUFFIX`,
    /// `TEST_DB_UNIQUE` (`1`/`true`) and `TEST_DB_FIXTURES`.
    pub fn from_env() -> Result<Self> {
        let settings = DbSettings::from_env()?;
        Self::from_lookup(settings, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(settings: DbSettings, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fixtures = match lookup("TEST_DB_FIXTURES").filter(|v| !v.is_empty()) {
            Some(path) => FixtureScript::new(path),
            None => FixtureScript::default_location()?,
        };

        let mut config = Self::new(settings, fixtures);
        if let Some(suffix) = lookup("TEST_DB_SUFFIX") {
            if suffix.is_empty() {
                return Err(HarnessError::InvalidSetting {
                    key: "TEST_DB_SUFFIX",
                    value: suffix,
                });
            }
            config = config.with_suffix(suffix);
        }
        if let Some(raw) = lookup("TEST_DB_UNIQUE").filter(|v| !v.is_empty()) {
            match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => config = config.unique(),
                "0" | "false" | "no" => {}
                _ => {
                    return Err(HarnessError::InvalidSetting {
                        key: "TEST_DB_UNIQUE",
                        value: raw,
                    })
                }
            }
        }
        Ok(config)
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_fixtures(mut self, path: impl Into<PathBuf>) -> Self {
        self.fixtures = FixtureScript::new(path);
        self
    }

    /// Append a per-process random token to the test database name so that
    /// several suites can share one server.
    ///
    /// The token is drawn once; clones of this config agree on the name.
    pub fn unique(mut self) -> Self {
        let random = uuid::Uuid::new_v4().simple().to_string();
        self.unique_token = Some(format!("_{}_{}", std::process::id(), &random[..8]));
        self
    }

    pub fn is_unique(&self) -> bool {
        self.unique_token.is_some()
    }

    /// `<database><suffix>[_<pid>_<token>]`, sanitized and cut to 63 bytes
    pub fn test_database_name(&self) -> String {
        let token = self.unique_token.as_deref().unwrap_or("");
        let base = sanitize_identifier(&format!("{}{}", self.settings.database, self.suffix));
        let room = MAX_IDENTIFIER_LEN.saturating_sub(token.len());
        let base = if base.len() > room { &base[..room] } else { &base[..] };
        format!("{}{}", base, token)
    }

    /// Refuse a test database name that resolves to the configured database.
    ///
    /// An empty suffix, or truncation of a 63-byte database name, would
    /// otherwise point CREATE/DROP DATABASE at the application's own data.
    pub fn check_test_name(&self) -> Result<()> {
        let name = self.test_database_name();
        if name == self.settings.database {
            return Err(HarnessError::TestNameCollides { database: name });
        }
        Ok(())
    }

    /// Settings for the server's maintenance database (the configured one).
    pub fn admin_settings(&self) -> &DbSettings {
        &self.settings
    }

    /// Settings pointing at the test database.
    pub fn test_settings(&self) -> DbSettings {
        self.settings.with_database(self.test_database_name())
    }
}

/// Replace anything outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
