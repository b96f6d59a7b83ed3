//! PostgreSQL-backed store

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;

use super::Store;
use crate::db::{close_pool, DbError, ImageRepo, PreferenceRepo, UserRepo};
use crate::models::{
    CreatedImage, EdgeDetectionSettings, ExternalId, Image, ImageUpdate, NewImage,
    RegisteredUser, SavedPreferences, User,
};

/// Store that delegates to the repositories over a shared pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn register_user(&self, aw_id: &ExternalId) -> Result<RegisteredUser, DbError> {
        UserRepo::new(&self.pool).register(aw_id).await
    }

    async fn find_user_by_external_id(&self, aw_id: &str) -> Result<Option<User>, DbError> {
        UserRepo::new(&self.pool).find_by_external_id(aw_id).await
    }

    async fn user_preferences(&self, user_id: i64) -> Result<JsonValue, DbError> {
        UserRepo::new(&self.pool).preferences(user_id).await
    }

    async fn update_user_preferences(
        &self,
        user_id: i64,
        preferences: &JsonValue,
    ) -> Result<JsonValue, DbError> {
        UserRepo::new(&self.pool)
            .update_preferences(user_id, preferences)
            .await
    }

    async fn add_image(&self, image: &NewImage) -> Result<CreatedImage, DbError> {
        ImageRepo::new(&self.pool).add(image).await
    }

    async fn get_image(&self, image_id: i64) -> Result<Image, DbError> {
        ImageRepo::new(&self.pool).get(image_id).await
    }

    async fn list_user_images(&self, user_id: i64) -> Result<Vec<Image>, DbError> {
        ImageRepo::new(&self.pool).list_for_user(user_id).await
    }

    async fn delete_image(&self, image_id: i64, user_id: i64) -> Result<(), DbError> {
        ImageRepo::new(&self.pool).delete(image_id, user_id).await
    }

    async fn update_image(&self, image_id: i64, update: &ImageUpdate) -> Result<Image, DbError> {
        ImageRepo::new(&self.pool).update(image_id, update).await
    }

    async fn save_preferences(
        &self,
        user_id: i64,
        settings: &EdgeDetectionSettings,
    ) -> Result<SavedPreferences, DbError> {
        PreferenceRepo::new(&self.pool).save(user_id, settings).await
    }

    async fn get_preferences(&self, user_id: i64) -> Result<Option<SavedPreferences>, DbError> {
        PreferenceRepo::new(&self.pool).get(user_id).await
    }

    async fn delete_preferences(&self, user_id: i64) -> Result<bool, DbError> {
        PreferenceRepo::new(&self.pool).delete(user_id).await
    }

    async fn close(&self) {
        close_pool(&self.pool).await;
    }
}
