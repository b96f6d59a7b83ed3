//! User endpoints
//!
//! Registration is keyed by the auth provider's id (`awId`); every other
//! endpoint uses the internal numeric `user_id` it returns.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::http::error::ApiError;
use crate::http::extractors::{IdParam, JsonBody};
use crate::http::server::AppState;
use crate::models::{ExternalId, RegisteredUser, User, ValidationError};

/// Register user request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub aw_id: Option<String>,
}

/// Preferences blob update response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesResponse {
    pub user_id: i64,
    pub preferences: JsonValue,
}

/// POST /api/users and /api/users/register
async fn register_user(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisteredUser>), ApiError> {
    let raw = req.aw_id.ok_or(ValidationError::Missing { field: "awId" })?;
    let aw_id = ExternalId::new(&raw)?;
    let user = state.store.register_user(&aw_id).await?;

    tracing::info!(user_id = user.user_id, "User registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/users/appwrite/{awId}
async fn get_user_by_external_id(
    State(state): State<Arc<AppState>>,
    Path(aw_id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .store
        .find_user_by_external_id(&aw_id)
        .await?
        .ok_or(ApiError::NotFound {
            resource: "user",
            id: aw_id,
        })?;
    Ok(Json(user))
}

/// GET /api/users/{userId}/preferences
async fn get_preferences_blob(
    State(state): State<Arc<AppState>>,
    IdParam(user_id): IdParam,
) -> Result<Json<JsonValue>, ApiError> {
    Ok(Json(state.store.user_preferences(user_id).await?))
}

/// PUT /api/users/{userId}/preferences - replaces the whole blob
async fn put_preferences_blob(
    State(state): State<Arc<AppState>>,
    IdParam(user_id): IdParam,
    JsonBody(preferences): JsonBody<JsonValue>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    if !preferences.is_object() {
        return Err(ApiError::BadRequest {
            message: "preferences must be a JSON object".into(),
        });
    }

    let preferences = state
        .store
        .update_user_preferences(user_id, &preferences)
        .await?;
    Ok(Json(PreferencesResponse {
        user_id,
        preferences,
    }))
}

/// User routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", post(register_user))
        .route("/api/users/register", post(register_user))
        .route("/api/users/appwrite/{aw_id}", get(get_user_by_external_id))
        .route(
            "/api/users/{user_id}/preferences",
            get(get_preferences_blob).put(put_preferences_blob),
        )
}
