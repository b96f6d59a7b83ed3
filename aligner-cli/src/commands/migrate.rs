//! Schema setup command

use anyhow::{Context, Result};
use clap::Parser;

use aligner_server::db::{close_pool, create_pool, schema};

use super::database_config;

/// Arguments for the migrate command
#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Database URL (overrides DATABASE_URL and DB_* variables)
    #[arg(long)]
    pub database_url: Option<String>,
}

/// Apply the schema and exit
pub async fn run_migrate(args: MigrateArgs) -> Result<()> {
    let db_config = database_config(args.database_url, Some(1));
    tracing::info!(database = %db_config.redacted_url(), "Applying schema");

    let pool = create_pool(&db_config)
        .await
        .context("Failed to create database pool")?;

    let result = schema::run(&pool).await;
    close_pool(&pool).await;
    result.context("Failed to apply database schema")?;

    Ok(())
}
