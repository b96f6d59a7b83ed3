//! Repository implementations for database access
//!
//! Each repository follows these patterns:
//! - Parameterized statements only
//! - Handles conflicts via constraints and ON CONFLICT (no check-then-insert)
//! - Uses transactions for multi-step writes; a dropped transaction rolls back

pub mod images;
pub mod preferences;
pub mod users;

pub use images::ImageRepo;
pub use preferences::PreferenceRepo;
pub use users::UserRepo;

use super::pool::{is_connection_error, log_connection_error};

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),

    /// Connection refused/lost, pool exhausted or closed
    #[error("database unavailable: {0}")]
    Unavailable(sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    /// Row missing or owned by someone else; the two are not distinguished
    #[error("{resource} '{id}' not found or not owned by user {user_id}")]
    NotFoundOrUnauthorized {
        resource: &'static str,
        id: String,
        user_id: i64,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    /// A JSON column holds something the typed model rejects
    #[error("stored {column} is invalid: {source}")]
    Corrupt {
        column: &'static str,
        source: serde_json::Error,
    },
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        if is_connection_error(&e) {
            log_connection_error(&e);
            Self::Unavailable(e)
        } else {
            Self::Sqlx(e)
        }
    }
}

impl DbError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

pub(crate) fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_foreign_key_violation())
}

/// Map a failed insert that references a user: FK violation means the user is unknown.
pub(crate) fn missing_user(e: sqlx::Error, user_id: i64) -> DbError {
    if is_foreign_key_violation(&e) {
        DbError::not_found("user", user_id)
    } else {
        DbError::from(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DbError::not_found("image", 42);
        assert_eq!(err.to_string(), "not found: image '42'");

        let err = DbError::NotFoundOrUnauthorized {
            resource: "image",
            id: "7".into(),
            user_id: 3,
        };
        assert_eq!(err.to_string(), "image '7' not found or not owned by user 3");
    }

    #[test]
    fn connection_errors_become_unavailable() {
        let err = DbError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, DbError::Unavailable(_)));

        let err = DbError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, DbError::Sqlx(_)));
    }
}
