//! Edge-detection preference endpoints

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::http::error::ApiError;
use crate::http::extractors::{IdParam, JsonBody};
use crate::http::server::AppState;
use crate::models::{EdgeDetectionParams, EdgeDetectionSettings, SavedPreferences, ValidationError};

/// Save preferences request; omitted settings take the defaults
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePreferencesRequest {
    #[serde(default, deserialize_with = "crate::models::lenient::opt_i64")]
    pub user_id: Option<i64>,
    #[serde(flatten)]
    pub params: EdgeDetectionParams,
}

/// Delete preferences response
#[derive(Serialize)]
pub struct DeletePreferencesResponse {
    pub success: bool,
    pub message: &'static str,
}

/// POST /api/preferences - create or replace
async fn save_preferences(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<SavePreferencesRequest>,
) -> Result<(StatusCode, Json<SavedPreferences>), ApiError> {
    let user_id = match req.user_id {
        Some(id) if id > 0 => id,
        Some(id) => {
            return Err(ValidationError::OutOfRange {
                field: "userId",
                value: id.to_string(),
                expected: "a positive integer",
            }
            .into())
        }
        None => return Err(ValidationError::Missing { field: "userId" }.into()),
    };
    let settings = EdgeDetectionSettings::try_from(req.params)?;

    let saved = state.store.save_preferences(user_id, &settings).await?;

    tracing::info!(user_id, preset_id = saved.preset_id, "Preferences saved");
    Ok((StatusCode::CREATED, Json(saved)))
}

/// GET /api/preferences/user/{userId}
async fn get_preferences(
    State(state): State<Arc<AppState>>,
    IdParam(user_id): IdParam,
) -> Result<Json<SavedPreferences>, ApiError> {
    state
        .store
        .get_preferences(user_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound {
            resource: "preferences for user",
            id: user_id.to_string(),
        })
}

/// DELETE /api/preferences/user/{userId}
async fn delete_preferences(
    State(state): State<Arc<AppState>>,
    IdParam(user_id): IdParam,
) -> Result<Json<DeletePreferencesResponse>, ApiError> {
    if !state.store.delete_preferences(user_id).await? {
        return Err(ApiError::NotFound {
            resource: "preferences for user",
            id: user_id.to_string(),
        });
    }

    tracing::info!(user_id, "Preferences deleted");
    Ok(Json(DeletePreferencesResponse {
        success: true,
        message: "Preferences deleted successfully",
    }))
}

/// Preference routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/preferences", post(save_preferences))
        .route(
            "/api/preferences/user/{user_id}",
            get(get_preferences).delete(delete_preferences),
        )
}
