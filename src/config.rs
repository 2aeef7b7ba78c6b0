// ABOUTME: Loader settings from defaults, an optional TOML file, and the environment
// ABOUTME: Produces one validated Settings value that the entry point hands to the pipeline

use crate::records::Table;
use crate::utils::validate_postgres_identifier;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tokio_postgres::config::SslMode;

pub const DEFAULT_POSTGRES_HOST: &str = "127.0.0.1";
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;
pub const DEFAULT_POSTGRES_SCHEMA: &str = "content";
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_CHUNK_SIZE: usize = 10;
pub const DEFAULT_CONNECT_RETRIES: u32 = 3;

/// PostgreSQL accepts at most this many bind parameters per statement
pub const MAX_BIND_PARAMETERS: usize = 65535;

#[derive(Clone, PartialEq)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub schema: String,
    pub sslmode: SslMode,
}

impl fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("schema", &self.schema)
            .field("sslmode", &self.sslmode)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadSettings {
    pub page_size: usize,
    pub chunk_size: usize,
    pub connect_retries: u32,
    pub verify: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub sqlite_path: String,
    pub postgres: PostgresSettings,
    pub load: LoadSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    #[serde(default)]
    sqlite: RawSqlite,
    #[serde(default)]
    postgres: RawPostgres,
    #[serde(default)]
    load: RawLoad,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSqlite {
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPostgres {
    host: Option<String>,
    port: Option<u16>,
    dbname: Option<String>,
    user: Option<String>,
    password: Option<String>,
    schema: Option<String>,
    sslmode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLoad {
    page_size: Option<usize>,
    chunk_size: Option<usize>,
    connect_retries: Option<u32>,
    verify: Option<bool>,
}

impl RawSettings {
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            sqlite: RawSqlite {
                path: get("SQLITE_PATH"),
            },
            postgres: RawPostgres {
                host: get("POSTGRES_HOST"),
                port: parse_var(&get, "POSTGRES_PORT")?,
                dbname: get("POSTGRES_DB_NAME"),
                user: get("POSTGRES_DB_USER"),
                password: get("POSTGRES_DB_PASSWORD"),
                schema: get("POSTGRES_SCHEMA"),
                sslmode: get("POSTGRES_SSLMODE"),
            },
            load: RawLoad {
                page_size: parse_var(&get, "ETL_PAGE_SIZE")?,
                chunk_size: parse_var(&get, "ETL_CHUNK_SIZE")?,
                connect_retries: parse_var(&get, "ETL_CONNECT_RETRIES")?,
                verify: parse_var(&get, "ETL_VERIFY")?,
            },
        })
    }

    /// Layer `over` on top of `self`; values set in `over` win
    fn merge(self, over: RawSettings) -> RawSettings {
        RawSettings {
            sqlite: RawSqlite {
                path: over.sqlite.path.or(self.sqlite.path),
            },
            postgres: RawPostgres {
                host: over.postgres.host.or(self.postgres.host),
                port: over.postgres.port.or(self.postgres.port),
                dbname: over.postgres.dbname.or(self.postgres.dbname),
                user: over.postgres.user.or(self.postgres.user),
                password: over.postgres.password.or(self.postgres.password),
                schema: over.postgres.schema.or(self.postgres.schema),
                sslmode: over.postgres.sslmode.or(self.postgres.sslmode),
            },
            load: RawLoad {
                page_size: over.load.page_size.or(self.load.page_size),
                chunk_size: over.load.chunk_size.or(self.load.chunk_size),
                connect_retries: over.load.connect_retries.or(self.load.connect_retries),
                verify: over.load.verify.or(self.load.verify),
            },
        }
    }

    fn resolve(self) -> Result<Settings> {
        let settings = Settings {
            sqlite_path: self
                .sqlite
                .path
                .context("SQLITE_PATH is required (path to the source SQLite file)")?,
            postgres: PostgresSettings {
                host: self
                    .postgres
                    .host
                    .unwrap_or_else(|| DEFAULT_POSTGRES_HOST.to_string()),
                port: self.postgres.port.unwrap_or(DEFAULT_POSTGRES_PORT),
                dbname: self
                    .postgres
                    .dbname
                    .context("POSTGRES_DB_NAME is required")?,
                user: self.postgres.user.context("POSTGRES_DB_USER is required")?,
                password: self.postgres.password.unwrap_or_default(),
                schema: self
                    .postgres
                    .schema
                    .unwrap_or_else(|| DEFAULT_POSTGRES_SCHEMA.to_string()),
                sslmode: match self.postgres.sslmode {
                    Some(mode) => parse_sslmode(&mode)?,
                    None => SslMode::Prefer,
                },
            },
            load: LoadSettings {
                page_size: self.load.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
                chunk_size: self.load.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
                connect_retries: self
                    .load
                    .connect_retries
                    .unwrap_or(DEFAULT_CONNECT_RETRIES),
                verify: self.load.verify.unwrap_or(false),
            },
        };

        settings.validate()?;
        Ok(settings)
    }
}

fn parse_var<T, F>(get: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: '{}'", key, raw))
        })
        .transpose()
}

fn parse_sslmode(mode: &str) -> Result<SslMode> {
    match mode.trim().to_ascii_lowercase().as_str() {
        "disable" => Ok(SslMode::Disable),
        "prefer" => Ok(SslMode::Prefer),
        "require" => Ok(SslMode::Require),
        other => bail!(
            "Invalid sslmode '{}'. Expected one of: disable, prefer, require",
            other
        ),
    }
}

impl Settings {
    /// Settings from an arbitrary key lookup using the environment key names
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        RawSettings::from_lookup(lookup)?.resolve()
    }

    /// Settings from an optional TOML file overlaid by the key lookup
    ///
    /// ```toml
    /// [sqlite]
    /// path = "db.sqlite"
    ///
    /// [postgres]
    /// dbname = "movies_database"
    /// user = "app"
    ///
    /// [load]
    /// chunk_size = 50
    /// ```
    pub fn load<F>(config_file: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file_layer = match config_file {
            Some(path) => read_settings_file(path)?,
            None => RawSettings::default(),
        };
        let env_layer = RawSettings::from_lookup(lookup)?;

        file_layer.merge(env_layer).resolve()
    }

    /// Check ranges and identifiers; called again after CLI overrides
    pub fn validate(&self) -> Result<()> {
        if self.sqlite_path.trim().is_empty() {
            bail!("SQLite path cannot be empty");
        }
        if self.load.page_size == 0 {
            bail!("Page size must be at least 1");
        }
        if self.load.chunk_size == 0 {
            bail!("Chunk size must be at least 1");
        }

        let max_chunk = MAX_BIND_PARAMETERS / Table::max_columns();
        if self.load.chunk_size > max_chunk {
            bail!(
                "Chunk size {} exceeds the maximum of {} rows ({} columns x {} rows must stay under {} bind parameters)",
                self.load.chunk_size,
                max_chunk,
                Table::max_columns(),
                self.load.chunk_size,
                MAX_BIND_PARAMETERS
            );
        }

        validate_postgres_identifier(&self.postgres.schema)
            .context("Invalid destination schema name")?;

        Ok(())
    }
}

fn read_settings_file(path: &Path) -> Result<RawSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("Failed to parse TOML config at {}", path.display()))
}
