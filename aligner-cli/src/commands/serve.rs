//! HTTP server command
//!
//! Connects the pool, applies the schema unless told not to, and serves the
//! API until Ctrl+C/SIGTERM.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use aligner_server::db::{create_pool, schema};
use aligner_server::{run_server, PgStore, ServerConfig};

use super::database_config;

const DEFAULT_PORT: u16 = 3000;

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (default: 0.0.0.0 on --port)
    #[arg(long, short = 'b', env = "ALIGNER_BIND")]
    pub bind: Option<SocketAddr>,

    /// Port to listen on all interfaces; ignored when --bind is given
    #[arg(long, short = 'p', env = "PORT")]
    pub port: Option<u16>,

    /// Allowed CORS origin (repeatable); all origins allowed when omitted
    #[arg(long = "cors-origin", value_name = "ORIGIN")]
    pub cors_origins: Vec<String>,

    /// Database URL (overrides DATABASE_URL and DB_* variables)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Maximum pooled connections (overrides DB_CONNECTION_LIMIT)
    #[arg(long)]
    pub max_connections: Option<u32>,

    /// Do not apply the schema on startup
    #[arg(long)]
    pub skip_migrations: bool,
}

impl ServeArgs {
    /// Explicit bind address, else all interfaces on `PORT` (default 3000)
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind.unwrap_or_else(|| {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port.unwrap_or(DEFAULT_PORT)))
        })
    }
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let bind_addr = args.bind_addr();
    let db_config = database_config(args.database_url, args.max_connections);
    tracing::info!(database = %db_config.redacted_url(), "Starting aligner server on {}", bind_addr);

    let config = ServerConfig {
        bind_addr,
        ..ServerConfig::default()
    }
    .with_cors_origins(&args.cors_origins)
    .context("Invalid --cors-origin")?;

    // Create database pool
    let pool = create_pool(&db_config)
        .await
        .context("Failed to create database pool")?;

    if args.skip_migrations {
        tracing::info!("Skipping schema setup");
    } else {
        schema::run(&pool)
            .await
            .context("Failed to apply database schema")?;
    }

    // Run server (blocks until shutdown, then drains the pool)
    run_server(Arc::new(PgStore::new(pool)), config)
        .await
        .context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(bind: Option<&str>, port: Option<u16>) -> ServeArgs {
        ServeArgs {
            bind: bind.map(|b| b.parse().unwrap()),
            port,
            cors_origins: Vec::new(),
            database_url: None,
            max_connections: None,
            skip_migrations: false,
        }
    }

    #[test]
    fn defaults_to_port_3000_on_all_interfaces() {
        assert_eq!(args(None, None).bind_addr().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn port_sets_listen_port() {
        assert_eq!(args(None, Some(8080)).bind_addr().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn explicit_bind_wins_over_port() {
        assert_eq!(
            args(Some("127.0.0.1:4000"), Some(8080)).bind_addr().to_string(),
            "127.0.0.1:4000"
        );
    }
}
