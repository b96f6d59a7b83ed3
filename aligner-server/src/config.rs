//! Database configuration - environment loading
//!
//! Configuration is loaded from environment variables:
//! - `DATABASE_URL`: full connection string (wins over the parts below)
//! - `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`: connection parts
//! - `DB_CONNECTION_LIMIT`: pool size (default: 10)

use std::collections::HashMap;

use sqlx::postgres::PgConnectOptions;

/// Default pool size
pub const DEFAULT_CONNECTION_LIMIT: u32 = 10;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5432;
const DEFAULT_USER: &str = "webuser";
const DEFAULT_PASSWORD: &str = "password";
const DEFAULT_NAME: &str = "aligner";

/// Database configuration
///
/// The parts are handed to the driver as-is, so passwords may contain any
/// character; they never pass through a URL.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Full connection string; when set the parts below are ignored
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Maximum concurrent connections; further callers queue
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Create config from process environment variables
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars().collect())
    }

    /// Create config from an explicit variable map (for testing)
    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        let get = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();

        let max_connections = get("DB_CONNECTION_LIMIT")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_CONNECTION_LIMIT);

        Self {
            url: get("DATABASE_URL"),
            host: get("DB_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: get("DB_PORT")
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(DEFAULT_PORT),
            user: get("DB_USER").unwrap_or_else(|| DEFAULT_USER.to_string()),
            password: get("DB_PASSWORD").unwrap_or_else(|| DEFAULT_PASSWORD.to_string()),
            database: get("DB_NAME").unwrap_or_else(|| DEFAULT_NAME.to_string()),
            max_connections,
        }
    }

    /// Create config with an explicit URL and the default pool size
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::from_vars(HashMap::new())
        }
    }

    /// Driver connect options: the parsed URL if one is set, otherwise the parts.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error::Configuration` when the URL does not parse.
    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        match &self.url {
            Some(url) => url.parse(),
            None => Ok(PgConnectOptions::new_without_pgpass()
                .host(&self.host)
                .port(self.port)
                .username(&self.user)
                .password(&self.password)
                .database(&self.database)),
        }
    }

    /// Connection target with the password masked, for logging
    pub fn redacted_url(&self) -> String {
        match self.connect_options() {
            Ok(options) => format!(
                "postgres://{}:***@{}:{}/{}",
                options.get_username(),
                options.get_host(),
                options.get_port(),
                options.get_database().unwrap_or_default()
            ),
            Err(_) => "<unparsable DATABASE_URL>".to_string(),
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("target", &self.redacted_url())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
