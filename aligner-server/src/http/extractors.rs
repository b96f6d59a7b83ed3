//! Custom Axum extractors

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use super::error::ApiError;
use crate::models::ValidationError;

/// Extract a positive integer id from a single-segment path parameter
pub struct IdParam(pub i64);

impl<S> FromRequestParts<S> for IdParam
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Validation(ValidationError::Empty { field: "id" }))?;

        match raw.trim().parse::<i64>() {
            Ok(id) if id > 0 => Ok(Self(id)),
            _ => Err(ApiError::Validation(ValidationError::InvalidFormat {
                field: "id",
                reason: "must be a positive integer",
            })),
        }
    }
}

/// `Json<T>` whose rejection is an `ApiError` body instead of plain text
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    match rejection {
        // Well-formed JSON with the wrong shape is a client error like any other bad field
        JsonRejection::JsonDataError(e) => ApiError::BadRequest {
            message: e.body_text(),
        },
        other => ApiError::Rejected {
            status: other.status(),
            message: other.body_text(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, StatusCode};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        name: String,
    }

    async fn status_for(uri: &str) -> StatusCode {
        use axum::routing::get;
        use axum::Router;
        use tower::ServiceExt;

        let app: Router = Router::new().route(
            "/items/{id}",
            get(|IdParam(id): IdParam| async move { id.to_string() }),
        );
        app.oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn id_param_accepts_positive() {
        assert_eq!(status_for("/items/42").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn id_param_rejects_garbage() {
        assert_eq!(status_for("/items/abc").await, StatusCode::BAD_REQUEST);
        assert_eq!(status_for("/items/0").await, StatusCode::BAD_REQUEST);
        assert_eq!(status_for("/items/-3").await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn json_body_maps_syntax_error() {
        let req = axum::http::Request::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let err = match JsonBody::<Payload>::from_request(req, &()).await {
            Ok(_) => panic!("malformed JSON accepted"),
            Err(e) => e,
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn json_body_maps_type_mismatch_to_bad_request() {
        let req = axum::http::Request::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name": 5}"#))
            .unwrap();
        let err = match JsonBody::<Payload>::from_request(req, &()).await {
            Ok(_) => panic!("mistyped field accepted"),
            Err(e) => e,
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn json_body_requires_content_type() {
        let req = axum::http::Request::builder()
            .body(Body::from(r#"{"name":"x"}"#))
            .unwrap();
        let err = match JsonBody::<Payload>::from_request(req, &()).await {
            Ok(_) => panic!("missing content type accepted"),
            Err(e) => e,
        };
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn json_body_extracts() {
        let req = axum::http::Request::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name":"drawer"}"#))
            .unwrap();
        let JsonBody(payload) = JsonBody::<Payload>::from_request(req, &())
            .await
            .unwrap_or_else(|_| panic!("valid JSON rejected"));
        assert_eq!(payload.name, "drawer");
    }
}
