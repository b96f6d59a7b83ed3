//! Edge-detection preference repository
//!
//! One row per user (`user_id` is UNIQUE). Saving is a single upsert so two
//! concurrent saves cannot both insert.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use super::{missing_user, DbError};
use crate::models::{EdgeDetectionSettings, SavedPreferences};

#[derive(Debug, FromRow)]
struct PreferenceRow {
    preset_id: i64,
    user_id: i64,
    gaussian_blur: i32,
    canny_threshold_1: i32,
    canny_threshold_2: i32,
    morph_kernel_size: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PreferenceRow> for SavedPreferences {
    fn from(r: PreferenceRow) -> Self {
        Self {
            preset_id: r.preset_id,
            user_id: r.user_id,
            settings: EdgeDetectionSettings {
                gaussian_blur: r.gaussian_blur,
                canny_threshold_1: r.canny_threshold_1,
                canny_threshold_2: r.canny_threshold_2,
                morph_kernel_size: r.morph_kernel_size,
            },
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Edge-detection preference repository
pub struct PreferenceRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> PreferenceRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace the user's settings. The `preset_id` of an existing
    /// row is kept.
    pub async fn save(
        &self,
        user_id: i64,
        settings: &EdgeDetectionSettings,
    ) -> Result<SavedPreferences, DbError> {
        let row: PreferenceRow = sqlx::query_as(
            r#"
            INSERT INTO edge_detection_preferences
                (user_id, gaussian_blur, canny_threshold_1, canny_threshold_2, morph_kernel_size)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
            SET gaussian_blur = EXCLUDED.gaussian_blur,
                canny_threshold_1 = EXCLUDED.canny_threshold_1,
                canny_threshold_2 = EXCLUDED.canny_threshold_2,
                morph_kernel_size = EXCLUDED.morph_kernel_size,
                updated_at = NOW()
            RETURNING preset_id, user_id, gaussian_blur, canny_threshold_1,
                      canny_threshold_2, morph_kernel_size, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(settings.gaussian_blur)
        .bind(settings.canny_threshold_1)
        .bind(settings.canny_threshold_2)
        .bind(settings.morph_kernel_size)
        .fetch_one(self.pool)
        .await
        .map_err(|e| missing_user(e, user_id))?;

        tracing::debug!(user_id, preset_id = row.preset_id, "Saved edge-detection preferences");
        Ok(row.into())
    }

    /// The user's settings, or `None` if never saved.
    pub async fn get(&self, user_id: i64) -> Result<Option<SavedPreferences>, DbError> {
        let row: Option<PreferenceRow> = sqlx::query_as(
            r#"
            SELECT preset_id, user_id, gaussian_blur, canny_threshold_1,
                   canny_threshold_2, morph_kernel_size, created_at, updated_at
            FROM edge_detection_preferences
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(SavedPreferences::from))
    }

    /// Remove the user's settings. Returns whether a row existed.
    pub async fn delete(&self, user_id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM edge_detection_preferences WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
