//! Database schema: users, images + images_data, edge_detection_preferences
//!
//! Every statement is idempotent so `run` is safe on each startup.

use sqlx::{PgPool, Postgres, Transaction};

/// `pg_advisory_xact_lock` key held while the schema is applied
const SCHEMA_LOCK_KEY: i64 = 0x616c_6967_6e65_72;

/// Apply all tables, triggers and indexes
pub async fn run(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Applying database schema...");

    // Concurrent starters wait here instead of racing on CREATE OR REPLACE
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id BIGSERIAL PRIMARY KEY,
            aw_id TEXT NOT NULL UNIQUE,
            preferences JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images_data (
            image_data_id BIGSERIAL PRIMARY KEY,
            base64_data TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            file_size BIGINT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            image_id BIGSERIAL PRIMARY KEY,
            id_user BIGINT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
            project_id BIGINT,
            id_image_data BIGINT NOT NULL UNIQUE
                REFERENCES images_data(image_data_id) ON DELETE CASCADE,
            filename TEXT,
            real_width_mm DOUBLE PRECISION,
            real_height_mm DOUBLE PRECISION,
            corner_coordinates JSONB,
            transformations JSONB,
            x_ratio DOUBLE PRECISION,
            y_ratio DOUBLE PRECISION,
            gaussian_blur INTEGER,
            canny_threshold_1 INTEGER,
            canny_threshold_2 INTEGER,
            morph_kernel_size INTEGER,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS edge_detection_preferences (
            preset_id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL UNIQUE REFERENCES users(user_id) ON DELETE CASCADE,
            gaussian_blur INTEGER NOT NULL,
            canny_threshold_1 INTEGER NOT NULL,
            canny_threshold_2 INTEGER NOT NULL,
            morph_kernel_size INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    create_cascade_trigger(&mut tx).await?;
    create_indexes(&mut tx).await?;

    tx.commit().await?;

    tracing::info!("Database schema ready");
    Ok(())
}

/// images_data rows belong to exactly one image; removing the image removes
/// its payload.
async fn create_cascade_trigger(tx: &mut Transaction<'_, Postgres>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION delete_image_data_of_image() RETURNS trigger AS $$
        BEGIN
            DELETE FROM images_data WHERE image_data_id = OLD.id_image_data;
            RETURN OLD;
        END;
        $$ LANGUAGE plpgsql
        "#,
    )
    .execute(&mut **tx)
    .await?;

    sqlx::query("DROP TRIGGER IF EXISTS images_delete_image_data ON images")
        .execute(&mut **tx)
        .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER images_delete_image_data
        AFTER DELETE ON images
        FOR EACH ROW EXECUTE FUNCTION delete_image_data_of_image()
        "#,
    )
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn create_indexes(tx: &mut Transaction<'_, Postgres>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_images_user_created ON images(id_user, created_at DESC)",
    )
    .execute(&mut **tx)
    .await?;

    Ok(())
}
