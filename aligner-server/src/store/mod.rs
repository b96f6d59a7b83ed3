//! Storage seam between the HTTP layer and the database
//!
//! Routes talk to `dyn Store`:
//! - `PgStore`: PostgreSQL through the repositories
//! - `MemoryStore`: in-process maps with the same semantics, for tests

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::db::DbError;
use crate::models::{
    CreatedImage, EdgeDetectionSettings, ExternalId, Image, ImageUpdate, NewImage,
    RegisteredUser, SavedPreferences, User,
};

/// Every persistence operation the routes need
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Cheap liveness check of the backing database
    async fn ping(&self) -> Result<(), DbError>;

    async fn register_user(&self, aw_id: &ExternalId) -> Result<RegisteredUser, DbError>;
    async fn find_user_by_external_id(&self, aw_id: &str) -> Result<Option<User>, DbError>;
    async fn user_preferences(&self, user_id: i64) -> Result<JsonValue, DbError>;
    async fn update_user_preferences(
        &self,
        user_id: i64,
        preferences: &JsonValue,
    ) -> Result<JsonValue, DbError>;

    async fn add_image(&self, image: &NewImage) -> Result<CreatedImage, DbError>;
    async fn get_image(&self, image_id: i64) -> Result<Image, DbError>;
    async fn list_user_images(&self, user_id: i64) -> Result<Vec<Image>, DbError>;
    async fn delete_image(&self, image_id: i64, user_id: i64) -> Result<(), DbError>;
    async fn update_image(&self, image_id: i64, update: &ImageUpdate) -> Result<Image, DbError>;

    async fn save_preferences(
        &self,
        user_id: i64,
        settings: &EdgeDetectionSettings,
    ) -> Result<SavedPreferences, DbError>;
    async fn get_preferences(&self, user_id: i64) -> Result<Option<SavedPreferences>, DbError>;
    async fn delete_preferences(&self, user_id: i64) -> Result<bool, DbError>;

    /// Release resources at shutdown
    async fn close(&self);
}
