//! In-memory store
//!
//! Mirrors the PostgreSQL constraints the routes depend on: unique external
//! ids, user foreign keys, ownership checks, payload cascade on image delete,
//! one preferences row per user, newest-first listing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};

use super::Store;
use crate::db::DbError;
use crate::models::{
    CreatedImage, EdgeDetectionSettings, ExternalId, Image, ImageEdgeParams, ImageGeometry,
    ImagePayload, ImageUpdate, NewImage, RegisteredUser, SavedPreferences, User,
};

struct UserRow {
    aw_id: String,
    preferences: Option<JsonValue>,
    created_at: DateTime<Utc>,
}

struct ImageRow {
    id_user: i64,
    project_id: Option<i64>,
    id_image_data: i64,
    filename: Option<String>,
    geometry: ImageGeometry,
    edge: ImageEdgeParams,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    last_user_id: i64,
    last_image_id: i64,
    last_image_data_id: i64,
    last_preset_id: i64,
    users: BTreeMap<i64, UserRow>,
    images: BTreeMap<i64, ImageRow>,
    images_data: BTreeMap<i64, ImagePayload>,
    preferences: HashMap<i64, SavedPreferences>,
}

impl Inner {
    fn require_user(&self, user_id: i64) -> Result<(), DbError> {
        if self.users.contains_key(&user_id) {
            Ok(())
        } else {
            Err(DbError::not_found("user", user_id))
        }
    }

    fn require_owned(&self, image_id: i64, user_id: i64) -> Result<(), DbError> {
        match self.images.get(&image_id) {
            Some(row) if row.id_user == user_id => Ok(()),
            _ => Err(DbError::NotFoundOrUnauthorized {
                resource: "image",
                id: image_id.to_string(),
                user_id,
            }),
        }
    }

    fn joined(&self, image_id: i64, with_payload: bool) -> Result<Image, DbError> {
        let row = self
            .images
            .get(&image_id)
            .ok_or_else(|| DbError::not_found("image", image_id))?;
        let data = self
            .images_data
            .get(&row.id_image_data)
            .ok_or_else(|| DbError::not_found("image data", row.id_image_data))?;

        Ok(Image {
            image_id,
            id_user: row.id_user,
            project_id: row.project_id,
            id_image_data: row.id_image_data,
            filename: row.filename.clone(),
            real_width_mm: row.geometry.real_width_mm,
            real_height_mm: row.geometry.real_height_mm,
            corner_coordinates: row.geometry.corner_coordinates.clone(),
            transformations: row.geometry.transformations,
            x_ratio: row.geometry.x_ratio,
            y_ratio: row.geometry.y_ratio,
            gaussian_blur: row.edge.gaussian_blur,
            canny_threshold_1: row.edge.canny_threshold_1,
            canny_threshold_2: row.edge.canny_threshold_2,
            morph_kernel_size: row.edge.morph_kernel_size,
            mime_type: data.mime_type.as_str().to_owned(),
            file_size: Some(data.file_size),
            base64_data: with_payload.then(|| data.base64_data.clone()),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Store backed by process memory; contents are lost on drop
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn register_user(&self, aw_id: &ExternalId) -> Result<RegisteredUser, DbError> {
        let mut inner = self.lock();
        if inner.users.values().any(|u| u.aw_id == aw_id.as_str()) {
            return Err(DbError::Conflict(format!(
                "user with external id '{}' already exists",
                aw_id.as_str()
            )));
        }

        inner.last_user_id += 1;
        let user_id = inner.last_user_id;
        inner.users.insert(
            user_id,
            UserRow {
                aw_id: aw_id.as_str().to_owned(),
                preferences: None,
                created_at: Utc::now(),
            },
        );

        Ok(RegisteredUser {
            user_id,
            aw_id: aw_id.as_str().to_owned(),
        })
    }

    async fn find_user_by_external_id(&self, aw_id: &str) -> Result<Option<User>, DbError> {
        let inner = self.lock();
        Ok(inner
            .users
            .iter()
            .find(|(_, u)| u.aw_id == aw_id)
            .map(|(id, u)| User {
                user_id: *id,
                aw_id: u.aw_id.clone(),
                created_at: u.created_at,
            }))
    }

    async fn user_preferences(&self, user_id: i64) -> Result<JsonValue, DbError> {
        let inner = self.lock();
        let user = inner
            .users
            .get(&user_id)
            .ok_or_else(|| DbError::not_found("user", user_id))?;
        Ok(user.preferences.clone().unwrap_or_else(|| json!({})))
    }

    async fn update_user_preferences(
        &self,
        user_id: i64,
        preferences: &JsonValue,
    ) -> Result<JsonValue, DbError> {
        let mut inner = self.lock();
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| DbError::not_found("user", user_id))?;
        user.preferences = Some(preferences.clone());
        Ok(preferences.clone())
    }

    async fn add_image(&self, image: &NewImage) -> Result<CreatedImage, DbError> {
        let mut inner = self.lock();
        inner.require_user(image.user_id)?;

        inner.last_image_data_id += 1;
        let image_data_id = inner.last_image_data_id;
        inner.images_data.insert(image_data_id, image.payload.clone());

        inner.last_image_id += 1;
        let image_id = inner.last_image_id;
        let now = Utc::now();
        inner.images.insert(
            image_id,
            ImageRow {
                id_user: image.user_id,
                project_id: image.project_id,
                id_image_data: image_data_id,
                filename: image.filename.clone(),
                geometry: image.geometry.clone(),
                edge: image.edge,
                created_at: now,
                updated_at: now,
            },
        );

        Ok(CreatedImage::new(image_id, image_data_id, image))
    }

    async fn get_image(&self, image_id: i64) -> Result<Image, DbError> {
        self.lock().joined(image_id, true)
    }

    async fn list_user_images(&self, user_id: i64) -> Result<Vec<Image>, DbError> {
        let inner = self.lock();
        let mut ids: Vec<(DateTime<Utc>, i64)> = inner
            .images
            .iter()
            .filter(|(_, row)| row.id_user == user_id)
            .map(|(id, row)| (row.created_at, *id))
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));

        ids.into_iter()
            .map(|(_, id)| inner.joined(id, false))
            .collect()
    }

    async fn delete_image(&self, image_id: i64, user_id: i64) -> Result<(), DbError> {
        let mut inner = self.lock();
        inner.require_owned(image_id, user_id)?;

        if let Some(row) = inner.images.remove(&image_id) {
            inner.images_data.remove(&row.id_image_data);
        }
        Ok(())
    }

    async fn update_image(&self, image_id: i64, update: &ImageUpdate) -> Result<Image, DbError> {
        let mut inner = self.lock();
        inner.require_owned(image_id, update.user_id)?;

        let Some(row) = inner.images.get_mut(&image_id) else {
            return Err(DbError::not_found("image", image_id));
        };
        row.geometry = update.geometry.clone();
        row.edge = update.edge;
        row.updated_at = Utc::now();
        let image_data_id = row.id_image_data;

        inner
            .images_data
            .insert(image_data_id, update.payload.clone());

        inner.joined(image_id, false)
    }

    async fn save_preferences(
        &self,
        user_id: i64,
        settings: &EdgeDetectionSettings,
    ) -> Result<SavedPreferences, DbError> {
        let mut inner = self.lock();
        inner.require_user(user_id)?;

        let now = Utc::now();
        let saved = match inner.preferences.get(&user_id).cloned() {
            Some(existing) => SavedPreferences {
                settings: *settings,
                updated_at: now,
                ..existing
            },
            None => {
                inner.last_preset_id += 1;
                SavedPreferences {
                    preset_id: inner.last_preset_id,
                    user_id,
                    settings: *settings,
                    created_at: now,
                    updated_at: now,
                }
            }
        };
        inner.preferences.insert(user_id, saved.clone());

        Ok(saved)
    }

    async fn get_preferences(&self, user_id: i64) -> Result<Option<SavedPreferences>, DbError> {
        Ok(self.lock().preferences.get(&user_id).cloned())
    }

    async fn delete_preferences(&self, user_id: i64) -> Result<bool, DbError> {
        Ok(self.lock().preferences.remove(&user_id).is_some())
    }

    async fn close(&self) {}
}
