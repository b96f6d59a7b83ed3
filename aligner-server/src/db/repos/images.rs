//! Image repository
//!
//! An image is two rows: `images_data` (the base64 payload) and `images`
//! (geometry and edge-detection metadata referencing it). Both are written in
//! one transaction; deleting the image removes the payload through the
//! `images_delete_image_data` trigger.

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::{missing_user, DbError};
use crate::models::{CreatedImage, Image, ImageUpdate, NewImage};

/// Columns of the `images` / `images_data` join, without the payload
const IMAGE_COLUMNS: &str = r#"
    i.image_id, i.id_user, i.project_id, i.id_image_data, i.filename,
    i.real_width_mm, i.real_height_mm, i.corner_coordinates, i.transformations,
    i.x_ratio, i.y_ratio,
    i.gaussian_blur, i.canny_threshold_1, i.canny_threshold_2, i.morph_kernel_size,
    d.mime_type, d.file_size, i.created_at, i.updated_at
"#;

fn json_column<T: DeserializeOwned>(
    row: &PgRow,
    column: &'static str,
) -> Result<Option<T>, DbError> {
    let value: Option<JsonValue> = row.try_get(column)?;
    value
        .map(|v| serde_json::from_value(v).map_err(|source| DbError::Corrupt { column, source }))
        .transpose()
}

fn image_from_row(row: &PgRow, with_payload: bool) -> Result<Image, DbError> {
    Ok(Image {
        image_id: row.try_get("image_id")?,
        id_user: row.try_get("id_user")?,
        project_id: row.try_get("project_id")?,
        id_image_data: row.try_get("id_image_data")?,
        filename: row.try_get("filename")?,
        real_width_mm: row.try_get("real_width_mm")?,
        real_height_mm: row.try_get("real_height_mm")?,
        corner_coordinates: json_column(row, "corner_coordinates")?,
        transformations: json_column(row, "transformations")?,
        x_ratio: row.try_get("x_ratio")?,
        y_ratio: row.try_get("y_ratio")?,
        gaussian_blur: row.try_get("gaussian_blur")?,
        canny_threshold_1: row.try_get("canny_threshold_1")?,
        canny_threshold_2: row.try_get("canny_threshold_2")?,
        morph_kernel_size: row.try_get("morph_kernel_size")?,
        mime_type: row.try_get("mime_type")?,
        file_size: row.try_get("file_size")?,
        base64_data: if with_payload {
            Some(row.try_get("base64_data")?)
        } else {
            None
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Image repository
pub struct ImageRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ImageRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert payload then metadata in one transaction.
    ///
    /// If the metadata insert fails the payload insert is rolled back with it;
    /// no orphaned `images_data` rows.
    pub async fn add(&self, image: &NewImage) -> Result<CreatedImage, DbError> {
        let mut tx = self.pool.begin().await?;

        let image_data_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO images_data (base64_data, mime_type, file_size)
            VALUES ($1, $2, $3)
            RETURNING image_data_id
            "#,
        )
        .bind(&image.payload.base64_data)
        .bind(image.payload.mime_type.as_str())
        .bind(image.payload.file_size)
        .fetch_one(&mut *tx)
        .await?;

        let g = &image.geometry;
        let e = &image.edge;
        let image_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO images (
                id_user, project_id, id_image_data, filename,
                real_width_mm, real_height_mm, corner_coordinates, transformations,
                x_ratio, y_ratio,
                gaussian_blur, canny_threshold_1, canny_threshold_2, morph_kernel_size
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING image_id
            "#,
        )
        .bind(image.user_id)
        .bind(image.project_id)
        .bind(image_data_id)
        .bind(image.filename.as_deref())
        .bind(g.real_width_mm)
        .bind(g.real_height_mm)
        .bind(g.corner_coordinates.as_ref().map(Json))
        .bind(g.transformations.as_ref().map(Json))
        .bind(g.x_ratio)
        .bind(g.y_ratio)
        .bind(e.gaussian_blur)
        .bind(e.canny_threshold_1)
        .bind(e.canny_threshold_2)
        .bind(e.morph_kernel_size)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| missing_user(err, image.user_id))?;

        tx.commit().await?;

        tracing::debug!(image_id, image_data_id, user_id = image.user_id, "Created image");
        Ok(CreatedImage::new(image_id, image_data_id, image))
    }

    /// Single image with its payload.
    pub async fn get(&self, image_id: i64) -> Result<Image, DbError> {
        let query = format!(
            r#"
            SELECT {IMAGE_COLUMNS}, d.base64_data
            FROM images i
            JOIN images_data d ON d.image_data_id = i.id_image_data
            WHERE i.image_id = $1
            "#
        );
        let row = sqlx::query(&query)
            .bind(image_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("image", image_id))?;

        image_from_row(&row, true)
    }

    /// All images of a user, newest first, without payloads.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Image>, DbError> {
        let query = format!(
            r#"
            SELECT {IMAGE_COLUMNS}
            FROM images i
            JOIN images_data d ON d.image_data_id = i.id_image_data
            WHERE i.id_user = $1
            ORDER BY i.created_at DESC, i.image_id DESC
            "#
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(self.pool)
            .await?;

        rows.iter().map(|r| image_from_row(r, false)).collect()
    }

    /// Lock the image row if `user_id` owns it; returns its `id_image_data`.
    async fn lock_owned(
        tx: &mut Transaction<'_, Postgres>,
        image_id: i64,
        user_id: i64,
    ) -> Result<i64, DbError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT id_image_data FROM images WHERE image_id = $1 AND id_user = $2 FOR UPDATE",
        )
        .bind(image_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| DbError::NotFoundOrUnauthorized {
            resource: "image",
            id: image_id.to_string(),
            user_id,
        })
    }

    /// Delete an image owned by `user_id`.
    pub async fn delete(&self, image_id: i64, user_id: i64) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        Self::lock_owned(&mut tx, image_id, user_id).await?;

        sqlx::query("DELETE FROM images WHERE image_id = $1")
            .bind(image_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(image_id, user_id, "Deleted image");
        Ok(())
    }

    /// Replace payload and metadata of an image owned by `update.user_id`.
    ///
    /// Returns the re-read joined row (without payload).
    pub async fn update(&self, image_id: i64, update: &ImageUpdate) -> Result<Image, DbError> {
        let mut tx = self.pool.begin().await?;

        let image_data_id = Self::lock_owned(&mut tx, image_id, update.user_id).await?;

        sqlx::query(
            r#"
            UPDATE images_data
            SET base64_data = $1, mime_type = $2, file_size = $3
            WHERE image_data_id = $4
            "#,
        )
        .bind(&update.payload.base64_data)
        .bind(update.payload.mime_type.as_str())
        .bind(update.payload.file_size)
        .bind(image_data_id)
        .execute(&mut *tx)
        .await?;

        let g = &update.geometry;
        let e = &update.edge;
        sqlx::query(
            r#"
            UPDATE images SET
                real_width_mm = $1,
                real_height_mm = $2,
                corner_coordinates = $3,
                transformations = $4,
                x_ratio = $5,
                y_ratio = $6,
                gaussian_blur = $7,
                canny_threshold_1 = $8,
                canny_threshold_2 = $9,
                morph_kernel_size = $10,
                updated_at = NOW()
            WHERE image_id = $11
            "#,
        )
        .bind(g.real_width_mm)
        .bind(g.real_height_mm)
        .bind(g.corner_coordinates.as_ref().map(Json))
        .bind(g.transformations.as_ref().map(Json))
        .bind(g.x_ratio)
        .bind(g.y_ratio)
        .bind(e.gaussian_blur)
        .bind(e.canny_threshold_1)
        .bind(e.canny_threshold_2)
        .bind(e.morph_kernel_size)
        .bind(image_id)
        .execute(&mut *tx)
        .await?;

        let query = format!(
            r#"
            SELECT {IMAGE_COLUMNS}
            FROM images i
            JOIN images_data d ON d.image_data_id = i.id_image_data
            WHERE i.image_id = $1
            "#
        );
        let row = sqlx::query(&query)
            .bind(image_id)
            .fetch_one(&mut *tx)
            .await?;
        let image = image_from_row(&row, false)?;

        tx.commit().await?;

        tracing::debug!(image_id, user_id = update.user_id, "Updated image");
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repos::UserRepo;
    use crate::models::{
        CornerCoordinates, ExternalId, ImageEdgeParams, ImageGeometry, ImagePayload, MimeType,
        Point, Transformations,
    };

    // Integration tests - run with DATABASE_URL set
    // cargo test -p aligner-server -- --ignored

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = PgPool::connect(&url).await.expect("connect failed");
        crate::db::schema::run(&pool).await.expect("schema failed");
        pool
    }

    async fn new_user(pool: &PgPool, prefix: &str) -> i64 {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let aw_id = ExternalId::new(&format!("{}-{}", prefix, nanos)).unwrap();
        UserRepo::new(pool).register(&aw_id).await.unwrap().user_id
    }

    fn corners() -> CornerCoordinates {
        CornerCoordinates::try_from(vec![
            Point { x: 10.0, y: 10.0 },
            Point { x: 100.0, y: 10.0 },
            Point { x: 100.0, y: 100.0 },
            Point { x: 10.0, y: 100.0 },
        ])
        .unwrap()
    }

    fn new_image(user_id: i64) -> NewImage {
        NewImage {
            user_id,
            project_id: None,
            filename: Some("drawer.png".into()),
            payload: ImagePayload::from_bytes(b"pixels", MimeType::new("image/png").unwrap())
                .unwrap(),
            geometry: ImageGeometry {
                real_width_mm: Some(400.0),
                real_height_mm: Some(300.0),
                corner_coordinates: Some(corners()),
                transformations: Some(Transformations::new(90, true).unwrap()),
                x_ratio: None,
                y_ratio: None,
            },
            edge: ImageEdgeParams::default(),
        }
    }

    async fn payload_exists(pool: &PgPool, image_data_id: i64) -> bool {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM images_data WHERE image_data_id = $1)")
            .bind(image_data_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn add_then_get_round_trips_json_columns() {
        let pool = pool().await;
        let repo = ImageRepo::new(&pool);
        let user_id = new_user(&pool, "roundtrip").await;

        let created = repo.add(&new_image(user_id)).await.unwrap();
        let image = repo.get(created.image_id).await.unwrap();

        assert_eq!(image.corner_coordinates, Some(corners()));
        assert_eq!(image.transformations, Some(Transformations::new(90, true).unwrap()));
        assert_eq!(image.base64_data.as_deref(), Some("cGl4ZWxz"));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn unknown_owner_rolls_back_payload() {
        let pool = pool().await;
        let repo = ImageRepo::new(&pool);

        let mut image = new_image(i64::MAX);
        let marker = format!("rollback-{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default());
        image.payload =
            ImagePayload::from_bytes(marker.as_bytes(), MimeType::new("image/png").unwrap()).unwrap();

        let err = repo.add(&image).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { resource: "user", .. }));

        let orphans: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM images_data WHERE base64_data = $1")
                .bind(&image.payload.base64_data)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn delete_requires_owner_and_cascades() {
        let pool = pool().await;
        let repo = ImageRepo::new(&pool);
        let owner = new_user(&pool, "owner").await;
        let other = new_user(&pool, "other").await;

        let created = repo.add(&new_image(owner)).await.unwrap();

        let err = repo.delete(created.image_id, other).await.unwrap_err();
        assert!(matches!(err, DbError::NotFoundOrUnauthorized { .. }));
        assert!(repo.get(created.image_id).await.is_ok());

        repo.delete(created.image_id, owner).await.unwrap();
        assert!(matches!(
            repo.get(created.image_id).await.unwrap_err(),
            DbError::NotFound { .. }
        ));
        assert!(!payload_exists(&pool, created.image_data_id).await);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn list_is_newest_first() {
        let pool = pool().await;
        let repo = ImageRepo::new(&pool);
        let user_id = new_user(&pool, "list").await;

        let first = repo.add(&new_image(user_id)).await.unwrap();
        let second = repo.add(&new_image(user_id)).await.unwrap();

        let images = repo.list_for_user(user_id).await.unwrap();
        let ids: Vec<i64> = images.iter().map(|i| i.image_id).collect();
        assert_eq!(ids, vec![second.image_id, first.image_id]);
        assert!(images.iter().all(|i| i.base64_data.is_none()));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn update_replaces_fields() {
        let pool = pool().await;
        let repo = ImageRepo::new(&pool);
        let user_id = new_user(&pool, "update").await;
        let created = repo.add(&new_image(user_id)).await.unwrap();

        let update = ImageUpdate {
            user_id,
            payload: ImagePayload::from_bytes(b"new", MimeType::new("image/jpeg").unwrap())
                .unwrap(),
            geometry: ImageGeometry::default(),
            edge: ImageEdgeParams::new(Some(7), Some(20), Some(90), Some(3)).unwrap(),
        };
        let updated = repo.update(created.image_id, &update).await.unwrap();

        assert_eq!(updated.mime_type, "image/jpeg");
        assert_eq!(updated.corner_coordinates, None);
        assert_eq!(updated.gaussian_blur, Some(7));
        assert_eq!(updated.morph_kernel_size, Some(3));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn failed_image_update_rolls_back_payload() {
        let pool = pool().await;
        let repo = ImageRepo::new(&pool);
        let user_id = new_user(&pool, "update-rollback").await;
        let created = repo.add(&new_image(user_id)).await.unwrap();

        // Reject the images row update for this image only, after images_data has been written
        let function = format!("reject_image_update_{}", created.image_id);
        let trigger = format!("reject_image_update_{}", created.image_id);
        sqlx::query(&format!(
            r#"
            CREATE OR REPLACE FUNCTION {function}() RETURNS trigger AS $$
            BEGIN
                RAISE EXCEPTION 'images update rejected';
            END;
            $$ LANGUAGE plpgsql
            "#
        ))
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(&format!(
            r#"
            CREATE TRIGGER {trigger}
            BEFORE UPDATE ON images
            FOR EACH ROW WHEN (OLD.image_id = {image_id})
            EXECUTE FUNCTION {function}()
            "#,
            image_id = created.image_id
        ))
        .execute(&pool)
        .await
        .unwrap();

        let update = ImageUpdate {
            user_id,
            payload: ImagePayload::from_bytes(b"replacement", MimeType::new("image/jpeg").unwrap())
                .unwrap(),
            geometry: ImageGeometry::default(),
            edge: ImageEdgeParams::new(Some(7), Some(20), Some(90), Some(3)).unwrap(),
        };
        let result = repo.update(created.image_id, &update).await;

        sqlx::query(&format!("DROP TRIGGER IF EXISTS {trigger} ON images"))
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(&format!("DROP FUNCTION IF EXISTS {function}()"))
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(result, Err(DbError::Sqlx(_))));

        let (base64_data, mime_type): (String, String) = sqlx::query_as(
            "SELECT base64_data, mime_type FROM images_data WHERE image_data_id = $1",
        )
        .bind(created.image_data_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(base64_data, "cGl4ZWxz");
        assert_eq!(mime_type, "image/png");

        let image = repo.get(created.image_id).await.unwrap();
        assert_eq!(image.gaussian_blur, None);
        assert_eq!(image.corner_coordinates, Some(corners()));
    }
}
