//! User repository
//!
//! Users are created on first login handoff from the auth provider and never
//! deleted here.

use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use sqlx::{FromRow, PgPool};

use super::{is_unique_violation, DbError};
use crate::models::{ExternalId, RegisteredUser, User};

#[derive(Debug, FromRow)]
struct UserRow {
    user_id: i64,
    aw_id: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            user_id: r.user_id,
            aw_id: r.aw_id,
            created_at: r.created_at,
        }
    }
}

/// User repository
pub struct UserRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a user keyed by the external auth id.
    ///
    /// A second registration of the same id fails with `Conflict`.
    pub async fn register(&self, aw_id: &ExternalId) -> Result<RegisteredUser, DbError> {
        let user_id: i64 =
            sqlx::query_scalar("INSERT INTO users (aw_id) VALUES ($1) RETURNING user_id")
                .bind(aw_id.as_str())
                .fetch_one(self.pool)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        DbError::Conflict(format!(
                            "user with external id '{}' already exists",
                            aw_id.as_str()
                        ))
                    } else {
                        DbError::from(e)
                    }
                })?;

        tracing::debug!(user_id, aw_id = aw_id.as_str(), "Registered user");
        Ok(RegisteredUser {
            user_id,
            aw_id: aw_id.as_str().to_owned(),
        })
    }

    /// Point lookup by external id; `None` when absent.
    pub async fn find_by_external_id(&self, aw_id: &str) -> Result<Option<User>, DbError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT user_id, aw_id, created_at FROM users WHERE aw_id = $1")
                .bind(aw_id)
                .fetch_optional(self.pool)
                .await?;

        Ok(row.map(User::from))
    }

    /// Read the free-form preferences blob. A user without one reads as `{}`.
    pub async fn preferences(&self, user_id: i64) -> Result<JsonValue, DbError> {
        let row: Option<(Option<JsonValue>,)> =
            sqlx::query_as("SELECT preferences FROM users WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(self.pool)
                .await?;

        match row {
            Some((prefs,)) => Ok(prefs.unwrap_or_else(|| json!({}))),
            None => Err(DbError::not_found("user", user_id)),
        }
    }

    /// Overwrite the whole preferences blob (no merge).
    pub async fn update_preferences(
        &self,
        user_id: i64,
        preferences: &JsonValue,
    ) -> Result<JsonValue, DbError> {
        let stored: Option<JsonValue> = sqlx::query_scalar(
            "UPDATE users SET preferences = $1 WHERE user_id = $2 RETURNING preferences",
        )
        .bind(preferences)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        stored.ok_or_else(|| DbError::not_found("user", user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Integration tests - run with DATABASE_URL set
    // cargo test -p aligner-server -- --ignored

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = PgPool::connect(&url).await.expect("connect failed");
        crate::db::schema::run(&pool).await.expect("schema failed");
        pool
    }

    fn unique_id(prefix: &str) -> ExternalId {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        ExternalId::new(&format!("{}-{}", prefix, nanos)).unwrap()
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn register_then_lookup() {
        let pool = pool().await;
        let repo = UserRepo::new(&pool);
        let aw_id = unique_id("lookup");

        let registered = repo.register(&aw_id).await.unwrap();
        let found = repo
            .find_by_external_id(aw_id.as_str())
            .await
            .unwrap()
            .expect("user should exist");

        assert_eq!(found.user_id, registered.user_id);
        assert_eq!(found.aw_id, aw_id.as_str());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn duplicate_registration_conflicts() {
        let pool = pool().await;
        let repo = UserRepo::new(&pool);
        let aw_id = unique_id("dup");

        repo.register(&aw_id).await.unwrap();
        let err = repo.register(&aw_id).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn preferences_blob_overwrites() {
        let pool = pool().await;
        let repo = UserRepo::new(&pool);
        let user = repo.register(&unique_id("blob")).await.unwrap();

        assert_eq!(repo.preferences(user.user_id).await.unwrap(), json!({}));

        repo.update_preferences(user.user_id, &json!({"units": "mm", "grid": true}))
            .await
            .unwrap();
        repo.update_preferences(user.user_id, &json!({"units": "in"}))
            .await
            .unwrap();

        assert_eq!(
            repo.preferences(user.user_id).await.unwrap(),
            json!({"units": "in"})
        );
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn unknown_user_lookup_is_none() {
        let pool = pool().await;
        let repo = UserRepo::new(&pool);
        assert!(repo
            .find_by_external_id("never-registered-anywhere")
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            repo.preferences(i64::MAX).await.unwrap_err(),
            DbError::NotFound { .. }
        ));
    }
}
