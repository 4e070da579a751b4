/// Unified error types for the storefront backend
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed or missing input, raised before storage is touched
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing, invalid, expired or revoked session token
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Wrong password for an existing account
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Authenticated but not allowed
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Unique constraint violation on a named field
    #[error("Conflict on {field}: {message}")]
    Conflict { field: String, message: String },

    /// Request origin does not belong to any tenant
    #[error("Domain not authorized: {0}")]
    UnauthorizedDomain(String),

    /// Broken invariant (corrupted guest credentials, key mismatch)
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// Best-effort enrichment failures; callers swallow these
    #[error("Downstream failure: {0}")]
    Downstream(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),
}

impl ApiError {
    /// Conflict error naming the offending field
    pub fn conflict(field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("{} is already in use", field);
        ApiError::Conflict { field, message }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => format!("{}: {}", field, msg),
                    None => format!("{}: {}", field, e.code),
                })
            })
            .collect();
        details.sort();
        ApiError::Validation(details.join(", "))
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Convert ApiError to HTTP response
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut field = None;
        let (status, error_code, message) = match &self {
            ApiError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "ValidationError",
                self.to_string(),
            ),
            ApiError::InvalidCredentials => (
                StatusCode::BAD_REQUEST,
                "InvalidCredentials",
                self.to_string(),
            ),
            ApiError::Conflict { field: name, message } => {
                field = Some(name.clone());
                (StatusCode::BAD_REQUEST, "Conflict", message.clone())
            }
            ApiError::UnauthorizedDomain(_) => (
                StatusCode::BAD_REQUEST,
                "UnauthorizedDomain",
                "Domain not authorized".to_string(),
            ),
            ApiError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            ApiError::Authorization(_) => (
                StatusCode::FORBIDDEN,
                "Forbidden",
                self.to_string(),
            ),
            ApiError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                self.to_string(),
            ),
            ApiError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
            ),
            ApiError::Integrity(detail) => {
                tracing::error!("Integrity violation: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ServerError",
                    "Internal server error".to_string(),
                )
            }
            _ => {
                tracing::error!("Request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ServerError",
                    "Internal server error".to_string(), // Don't leak details
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            field,
        });

        let mut response = (status, body).into_response();
        if let ApiError::RateLimitExceeded { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Result type alias for service operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (ApiError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (ApiError::InvalidCredentials, StatusCode::BAD_REQUEST),
            (ApiError::conflict("phone"), StatusCode::BAD_REQUEST),
            (ApiError::Authentication("no".into()), StatusCode::UNAUTHORIZED),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::Integrity("key".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_integrity_hides_detail() {
        let response = ApiError::Integrity("guest hash mismatch for shop.example".into()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body.error, "ServerError");
        assert!(!body.message.contains("shop.example"));
    }

    #[tokio::test]
    async fn test_conflict_names_field() {
        let response = ApiError::conflict("cpf").into_response();
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body.field.as_deref(), Some("cpf"));
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = ApiError::RateLimitExceeded {
            retry_after: std::time::Duration::from_secs(3),
        }
        .into_response();

        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "3");
    }
}
