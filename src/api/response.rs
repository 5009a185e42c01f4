// JSON envelopes: `{ success: true, data }` and `{ success: false, error, code }`.

use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::error::MatchError;

pub fn success<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(json!({ "success": true, "data": data }))).into_response()
}

fn failure(status: StatusCode, error: &str, code: &str) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": error, "code": code })),
    )
        .into_response()
}

/// JSON request body. A body that is missing, not JSON, or the wrong shape is
/// rejected as a validation error inside the usual envelope.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = MatchError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                tracing::debug!("Rejected request body: {}", rejection.body_text());
                Err(MatchError::Validation(
                    "Request body must be a valid JSON object".to_string(),
                ))
            }
        }
    }
}

/// Client-facing rendering. Internal failures are logged and replaced by a
/// generic message so no storage detail reaches game clients.
impl IntoResponse for MatchError {
    fn into_response(self) -> Response {
        if self.is_internal() {
            tracing::error!("Request failed: {self}");
            return failure(self.status(), "Internal server error", self.code());
        }
        failure(self.status(), &self.to_string(), self.code())
    }
}

/// Rendering for authenticated administrative routes: same envelope, plus
/// the underlying error text in `detail`.
pub fn admin_error(e: MatchError) -> Response {
    if !e.is_internal() {
        return e.into_response();
    }
    tracing::error!("Admin request failed: {e}");
    (
        e.status(),
        Json(json!({
            "success": false,
            "error": "Internal server error",
            "code": e.code(),
            "detail": e.to_string(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_client_rendering_hides_storage_detail() {
        let resp = MatchError::Persistence(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["code"], "persistence_error");
        assert!(body.get("detail").is_none());
        assert!(!body.to_string().contains("pool timed out"));
    }

    #[tokio::test]
    async fn test_client_rendering_hides_generation_exhaustion() {
        let resp = MatchError::TokenGenerationExhausted { attempts: 10 }.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["code"], "token_generation_exhausted");
        assert!(body.get("detail").is_none());
    }

    #[tokio::test]
    async fn test_client_rendering_keeps_domain_messages() {
        let resp = MatchError::TokenExpired.into_response();
        assert_eq!(resp.status(), StatusCode::GONE);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "Token has expired");
        assert_eq!(body["code"], "token_expired");
    }

    #[tokio::test]
    async fn test_admin_rendering_adds_detail() {
        let resp = admin_error(MatchError::Persistence(sqlx::Error::PoolTimedOut));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["code"], "persistence_error");
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.starts_with("Persistence error: "));
        assert!(detail.contains("pool timed out"));
    }

    #[tokio::test]
    async fn test_admin_rendering_of_domain_errors_has_no_detail() {
        let resp = admin_error(MatchError::NotFound("Match"));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "Match not found");
        assert!(body.get("detail").is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_validation_error() {
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(r#"{"token": 5"#))
            .unwrap();
        let err = ApiJson::<serde_json::Value>::from_request(req, &())
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "validation_error");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
