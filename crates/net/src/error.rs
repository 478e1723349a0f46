use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use molc_service::ServiceError;
use serde_json::json;
use std::error::Error as StdError;
use std::fmt;
use tracing::{debug, error};

/// Header carrying the authenticated user id, set by the upstream identity provider.
pub const CALLER_HEADER: &str = "x-molc-user";

#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for ApiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.0)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) | ServiceError::AlreadyVoted => StatusCode::CONFLICT,
            ServiceError::Chain(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Database(_) | ServiceError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.0.to_string();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "request failed");
        } else {
            debug!(status = status.as_u16(), error = %message, "request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Id of the user making the request.
#[derive(Debug, Clone)]
pub struct Caller(pub String);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Caller(id.to_string()))
            .ok_or_else(|| ApiError(ServiceError::Unauthenticated("User not authenticated".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_caller_from_header() {
        let (mut parts, _) = Request::builder()
            .header(CALLER_HEADER, " alice ")
            .body(())
            .unwrap()
            .into_parts();
        let caller = Caller::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(caller.0, "alice");

        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        let err = Caller::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError(ServiceError::validation("bad")).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError(ServiceError::forbidden("no")).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError(ServiceError::AlreadyVoted).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError(ServiceError::Chain(molc_chain::ChainError::reverted("Already voted"))).status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
