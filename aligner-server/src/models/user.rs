//! User identity types

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::ValidationError;

/// Maximum length for external auth-provider ids
const MAX_EXTERNAL_ID_LEN: usize = 255;

/// Auth-provider ids: letters, digits, dots, dashes, underscores
static EXTERNAL_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("invalid external id regex"));

/// Validated external auth-provider id (`aw_id` column)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalId(String);

impl ExternalId {
    /// Create an external id, trimming surrounding whitespace.
    ///
    /// # Example
    /// ```
    /// use aligner_server::models::ExternalId;
    ///
    /// assert!(ExternalId::new("ext-123").is_ok());
    /// assert!(ExternalId::new("").is_err());
    /// assert!(ExternalId::new("has space").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: "awId" });
        }

        if trimmed.len() > MAX_EXTERNAL_ID_LEN {
            return Err(ValidationError::TooLong {
                field: "awId",
                max: MAX_EXTERNAL_ID_LEN,
            });
        }

        if !EXTERNAL_ID_RE.is_match(trimmed) {
            return Err(ValidationError::InvalidFormat {
                field: "awId",
                reason: "must contain only letters, digits, '.', '-' or '_'",
            });
        }

        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for ExternalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Result of registering a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredUser {
    pub user_id: i64,
    pub aw_id: String,
}

/// Stored user row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub user_id: i64,
    pub aw_id: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_provider_ids() {
        assert!(ExternalId::new("ext-123").is_ok());
        assert!(ExternalId::new("68318dce002126d5e349").is_ok());
        assert!(ExternalId::new("user.name_01").is_ok());
    }

    #[test]
    fn trims_whitespace() {
        let id = ExternalId::new("  ext-123 ").unwrap();
        assert_eq!(id.as_str(), "ext-123");
    }

    #[test]
    fn rejects_empty() {
        let err = ExternalId::new("   ").unwrap_err();
        assert!(matches!(err, ValidationError::Empty { .. }));
    }

    #[test]
    fn rejects_bad_characters() {
        let err = ExternalId::new("a/b").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn max_length() {
        assert!(ExternalId::new(&"a".repeat(255)).is_ok());
        let err = ExternalId::new(&"a".repeat(256)).unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max: 255, .. }));
    }
}
