use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const TOKEN_VAR: &str = "TG_API_TOKEN";
pub const DB_NAME_VAR: &str = "TG_DBNAME";
pub const DB_USER_VAR: &str = "TG_DBUSER";
pub const DB_HOST_VAR: &str = "TG_DBHOST";
pub const DB_PASSWORD_VAR: &str = "TG_DBPASSWORD";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    Sqlite,
}

impl std::fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackend::Postgres => write!(f, "postgres"),
            DatabaseBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Optional settings file. Credentials never live here, only in the environment.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub polling: PollingSection,
    #[serde(default)]
    pub database: DatabaseSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramSection {
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingSection {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSection {
    #[serde(default)]
    pub backend: DatabaseBackend,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
    /// Written verbatim into the `extra` column of every committed row.
    #[serde(default = "default_extra")]
    pub extra: String,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
        }
    }
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::default(),
            sqlite_path: default_sqlite_path(),
            extra: default_extra(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_interval_secs() -> u64 {
    2
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("dialogs.db")
}

fn default_extra() -> String {
    "{}".to_string()
}

/// PostgreSQL credentials, all taken from the environment.
#[derive(Clone)]
pub struct PostgresCredentials {
    pub dbname: String,
    pub user: String,
    pub host: String,
    pub password: String,
}

impl std::fmt::Debug for PostgresCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresCredentials")
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("host", &self.host)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum DatabaseConfig {
    Postgres(PostgresCredentials),
    Sqlite(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_token: String,
    pub api_url: String,
    pub poll_interval: Duration,
    pub database: DatabaseConfig,
    pub extra: String,
}

impl Config {
    /// Load the optional settings file, then read credentials from the process environment.
    pub fn load(path: &Path) -> Result<Self> {
        let file = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            FileConfig::default()
        };

        Self::from_parts(file, |key| std::env::var(key).ok())
    }

    /// Combine file settings with credentials resolved through `lookup`.
    pub fn from_parts<F>(file: FileConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_token = match lookup(TOKEN_VAR) {
            Some(token) if !token.is_empty() => token,
            _ => bail!(
                "Telegram token wasn't provided. \
                 You should specify it in environment: export {}=___your_tg_token___",
                TOKEN_VAR
            ),
        };

        let database = match file.database.backend {
            DatabaseBackend::Postgres => {
                DatabaseConfig::Postgres(postgres_credentials(&lookup)?)
            }
            DatabaseBackend::Sqlite => DatabaseConfig::Sqlite(file.database.sqlite_path),
        };

        if file.polling.interval_secs == 0 {
            bail!("polling.interval_secs must be at least 1");
        }

        Ok(Self {
            api_token,
            api_url: file.telegram.api_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(file.polling.interval_secs),
            database,
            extra: file.database.extra,
        })
    }

    /// Bot endpoint root, e.g. `https://api.telegram.org/bot<token>`.
    pub fn bot_url(&self) -> String {
        format!("{}/bot{}", self.api_url, self.api_token)
    }

    pub fn backend(&self) -> DatabaseBackend {
        match self.database {
            DatabaseConfig::Postgres(_) => DatabaseBackend::Postgres,
            DatabaseConfig::Sqlite(_) => DatabaseBackend::Sqlite,
        }
    }
}

fn postgres_credentials<F>(lookup: &F) -> Result<PostgresCredentials>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

    // An empty password is legitimate (trust auth), it only has to be set.
    match (
        non_empty(DB_NAME_VAR),
        non_empty(DB_USER_VAR),
        non_empty(DB_HOST_VAR),
        lookup(DB_PASSWORD_VAR),
    ) {
        (Some(dbname), Some(user), Some(host), Some(password)) => Ok(PostgresCredentials {
            dbname,
            user,
            host,
            password,
        }),
        _ => bail!(
            "Postgres variables weren't provided. You should specify them in environment: \
             export {}=___dbname___ {}=___dbuser___ {}=___dbhost___ {}=___dbpassword___",
            DB_NAME_VAR,
            DB_USER_VAR,
            DB_HOST_VAR,
            DB_PASSWORD_VAR
        ),
    }
}
