//! Command implementations for the aligner CLI

pub mod migrate;
pub mod serve;

pub use migrate::run_migrate;
pub use serve::run_serve;

use aligner_server::DatabaseConfig;

/// Environment config with command-line overrides applied
pub(crate) fn database_config(url: Option<String>, max_connections: Option<u32>) -> DatabaseConfig {
    let mut config = DatabaseConfig::from_env();
    if let Some(url) = url {
        config.url = Some(url);
    }
    if let Some(max) = max_connections.filter(|n| *n > 0) {
        config.max_connections = max;
    }
    config
}
