//! Database connection pool management
//!
//! Uses sqlx PgPool with an explicit connection limit. Callers beyond the
//! limit wait in the pool's queue instead of failing fast.

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::config::DatabaseConfig;

/// How long a caller may wait in the acquire queue.
///
/// Long enough that the queue is effectively unbounded; latency grows under
/// load rather than requests being rejected.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Create a PostgreSQL connection pool.
///
/// # Errors
///
/// Returns an error if the configured URL does not parse or the first
/// connection cannot be established.
///
/// # Example
///
/// ```ignore
/// let pool = create_pool(&DatabaseConfig::from_env()).await?;
/// ```
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    connect(config.connect_options()?, config.max_connections).await
}

/// Create a PostgreSQL connection pool from a URL with an explicit size.
pub async fn create_pool_with_options(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    connect(database_url.parse::<PgConnectOptions>()?, max_connections).await
}

async fn connect(options: PgConnectOptions, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .test_before_acquire(true)
        .connect_with(options)
        .await
        .inspect_err(log_connection_error)?;

    tracing::info!(max_connections, "Connected to database");
    Ok(pool)
}

/// Drain the pool: wait for checked-out connections to return, then close.
pub async fn close_pool(pool: &PgPool) {
    tracing::info!(
        idle = pool.num_idle(),
        size = pool.size(),
        "Closing database pool"
    );
    pool.close().await;
    tracing::info!("Database pool closed");
}

/// Whether an error means the database itself is unreachable or saturated,
/// as opposed to a problem with one statement.
pub fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            // too_many_connections, admin_shutdown, crash_shutdown, cannot_connect_now
            Some("53300" | "57P01" | "57P02" | "57P03")
        ),
        _ => false,
    }
}

/// Log connection-level failures at the pool level. Never panics.
pub fn log_connection_error(err: &sqlx::Error) {
    match err {
        sqlx::Error::Io(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            tracing::error!(error = %e, "Database connection was refused");
        }
        sqlx::Error::Io(e) => {
            tracing::error!(error = %e, "Database connection was lost");
        }
        sqlx::Error::PoolTimedOut => {
            tracing::error!("Timed out waiting for a database connection");
        }
        sqlx::Error::PoolClosed => {
            tracing::warn!("Database pool is closed");
        }
        sqlx::Error::Database(db) if db.code().as_deref() == Some("53300") => {
            tracing::error!("Database has too many connections");
        }
        other if is_connection_error(other) => {
            tracing::error!(error = %other, "Database connection error");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_connection_errors() {
        let refused = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(is_connection_error(&refused));
        assert!(is_connection_error(&sqlx::Error::PoolTimedOut));
        assert!(is_connection_error(&sqlx::Error::PoolClosed));
        assert!(!is_connection_error(&sqlx::Error::RowNotFound));
    }

    // Integration tests require a real database
    // Run with: DATABASE_URL=postgres://... cargo test -p aligner-server -- --ignored

    #[tokio::test]
    #[ignore = "requires database"]
    async fn pool_acquires_connection() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&DatabaseConfig::with_url(url))
            .await
            .expect("pool creation failed");

        let result: (i32,) = sqlx::query_as("SELECT 1")
            .fetch_one(&pool)
            .await
            .expect("query failed");

        assert_eq!(result.0, 1);
        close_pool(&pool).await;
        assert!(pool.is_closed());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn callers_beyond_limit_queue() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool_with_options(&url, 2)
            .await
            .expect("pool creation failed");

        // 10 tasks against 2 connections: all must finish, none rejected
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    let result: (i32,) = sqlx::query_as("SELECT $1::int FROM pg_sleep(0.05)")
                        .bind(i)
                        .fetch_one(&pool)
                        .await
                        .expect("queued query failed");
                    result.0
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let result = handle.await.expect("task panicked");
            assert_eq!(result, i as i32);
        }
    }
}
