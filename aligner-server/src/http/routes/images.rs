//! Image endpoints
//!
//! Images arrive either as JSON with a base64 payload or as a multipart
//! upload whose `image` file part is encoded here.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::http::error::ApiError;
use crate::http::extractors::{IdParam, JsonBody};
use crate::http::server::AppState;
use crate::models::lenient::{parse_f64, parse_i64};
use crate::models::{
    CreatedImage, Image, ImageFields, ImagePayload, MimeType, Point, TransformationFields,
    ValidationError,
};

/// MIME type used when an upload part carries none
const FALLBACK_MIME: &str = "application/octet-stream";

/// Delete image request
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeleteImageRequest {
    #[serde(default, deserialize_with = "crate::models::lenient::opt_i64")]
    pub user_id: Option<i64>,
}

/// Delete image response
#[derive(Serialize)]
pub struct DeleteImageResponse {
    pub success: bool,
}

/// POST /api/images - JSON body with base64 payload
async fn create_image(
    State(state): State<Arc<AppState>>,
    JsonBody(fields): JsonBody<ImageFields>,
) -> Result<(StatusCode, Json<CreatedImage>), ApiError> {
    let image = fields.into_new_image()?;
    let created = state.store.add_image(&image).await?;

    tracing::info!(
        image_id = created.image_id,
        user_id = created.user_id,
        file_size = created.file_size,
        "Image created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

fn json_field<T: serde::de::DeserializeOwned>(
    field: &'static str,
    raw: &str,
) -> Result<Option<T>, ApiError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| ApiError::BadRequest {
            message: format!("{} is not valid JSON: {}", field, e),
        })
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::Rejected {
        status: e.status(),
        message: e.body_text(),
    }
}

/// POST /api/images/upload - multipart form with an `image` file part
async fn upload_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CreatedImage>), ApiError> {
    let mut fields = ImageFields::default();
    let mut file: Option<(Bytes, Option<String>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let key = field.name().unwrap_or("").to_string();

        if key == "image" {
            if fields.filename.is_none() {
                fields.filename = field.file_name().map(str::to_owned);
            }
            let content_type = field.content_type().map(str::to_owned);
            let bytes = field.bytes().await.map_err(multipart_error)?;
            file = Some((bytes, content_type));
            continue;
        }

        let text = field.text().await.map_err(multipart_error)?;
        match key.as_str() {
            "userId" => fields.user_id = parse_i64(&text),
            "projectId" => fields.project_id = parse_i64(&text),
            "filename" => fields.filename = Some(text),
            "realWidth" | "realWidthMm" => fields.real_width_mm = parse_f64(&text),
            "realHeight" | "realHeightMm" => fields.real_height_mm = parse_f64(&text),
            "xRatio" => fields.x_ratio = parse_f64(&text),
            "yRatio" => fields.y_ratio = parse_f64(&text),
            "cornerCoordinates" => {
                fields.corner_coordinates = json_field::<Vec<Point>>("cornerCoordinates", &text)?
            }
            "transformations" => {
                fields.transformations =
                    json_field::<TransformationFields>("transformations", &text)?
            }
            "gaussianBlur" => fields.gaussian_blur = parse_i32(&text),
            "cannyThreshold1" => fields.canny_threshold_1 = parse_i32(&text),
            "cannyThreshold2" => fields.canny_threshold_2 = parse_i32(&text),
            "morphKernelSize" => fields.morph_kernel_size = parse_i32(&text),
            other => tracing::debug!(field = other, "Ignoring unknown upload field"),
        }
    }

    let (bytes, content_type) = file.ok_or(ValidationError::Missing { field: "image" })?;
    let mime = MimeType::new(content_type.as_deref().unwrap_or(FALLBACK_MIME))?;
    let payload = ImagePayload::from_bytes(&bytes, mime)?;
    let image = fields.with_payload(payload)?;

    let created = state.store.add_image(&image).await?;

    tracing::info!(
        image_id = created.image_id,
        user_id = created.user_id,
        file_size = created.file_size,
        "Image uploaded"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

fn parse_i32(s: &str) -> Option<i32> {
    parse_i64(s).and_then(|v| i32::try_from(v).ok())
}

/// PUT /api/images/{imageId} - full replacement by the owner
async fn update_image(
    State(state): State<Arc<AppState>>,
    IdParam(image_id): IdParam,
    JsonBody(fields): JsonBody<ImageFields>,
) -> Result<Json<Image>, ApiError> {
    let update = fields.into_update()?;
    let image = state.store.update_image(image_id, &update).await?;

    tracing::info!(image_id, user_id = update.user_id, "Image updated");
    Ok(Json(image))
}

/// GET /api/images/user/{userId} - newest first, without payloads
async fn list_user_images(
    State(state): State<Arc<AppState>>,
    IdParam(user_id): IdParam,
) -> Result<Json<Vec<Image>>, ApiError> {
    Ok(Json(state.store.list_user_images(user_id).await?))
}

/// GET /api/images/{imageId}
async fn get_image(
    State(state): State<Arc<AppState>>,
    IdParam(image_id): IdParam,
) -> Result<Json<Image>, ApiError> {
    Ok(Json(state.store.get_image(image_id).await?))
}

/// DELETE /api/images/{imageId} - body `{userId}` must name the owner
///
/// The body is read raw so a missing body or content type is a 400 for the
/// missing `userId`, not a 415.
async fn delete_image(
    State(state): State<Arc<AppState>>,
    IdParam(image_id): IdParam,
    body: Bytes,
) -> Result<Json<DeleteImageResponse>, ApiError> {
    let req: DeleteImageRequest = if body.iter().all(u8::is_ascii_whitespace) {
        DeleteImageRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest {
            message: format!("invalid JSON body: {}", e),
        })?
    };

    let user_id = match req.user_id {
        Some(id) if id > 0 => id,
        _ => return Err(ValidationError::Missing { field: "userId" }.into()),
    };

    state.store.delete_image(image_id, user_id).await?;

    tracing::info!(image_id, user_id, "Image deleted");
    Ok(Json(DeleteImageResponse { success: true }))
}

/// Image routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/images", post(create_image))
        .route("/api/images/upload", post(upload_image))
        .route("/api/images/user/{user_id}", get(list_user_images))
        .route(
            "/api/images/{image_id}",
            get(get_image).put(update_image).delete(delete_image),
        )
}
