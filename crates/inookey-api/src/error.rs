//! API error types and JSON error response formatting.
//!
//! Every failure leaves the server as `{success: false, error, message?,
//! details?}`. Validation problems are reported verbatim; anything internal
//! is logged here and replaced by a generic message.

use std::fmt::Display;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use inookey_chat::ChatError;
use inookey_core::error::InookeyError;
use inookey_core::validation::ValidationError;

/// Shown to clients in place of any internal error text.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong";

pub const RATE_LIMIT_MESSAGE: &str = "Too many requests from this IP, please try again later.";

pub const MALFORMED_JSON_MESSAGE: &str = "Malformed JSON body";
pub const INVALID_BODY_MESSAGE: &str = "Invalid request body";
pub const CONTENT_TYPE_MESSAGE: &str = "Content-Type must be application/json";
pub const INVALID_QUERY_MESSAGE: &str = "Invalid query parameters";

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 - malformed body or parameter.
    BadRequest(String),
    /// 400 - the payload failed validation.
    Validation(ValidationError),
    /// 404 - referenced session, appointment or route does not exist.
    NotFound(String),
    /// 413 - body exceeds the configured limit.
    PayloadTooLarge,
    /// 429 - client exceeded its request window.
    TooManyRequests,
    /// 500 - the string names the failed operation, never the cause.
    Internal(String),
}

impl ApiError {
    /// Log `err` and return a 500 labelled with `context`.
    pub fn internal(context: &str, err: impl Display) -> Self {
        tracing::error!(error = %err, "{}", context);
        ApiError::Internal(context.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None, None),
            ApiError::Validation(ValidationError::ValidationFailed { details }) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                None,
                Some(details),
            ),
            ApiError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string(), None, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None, None),
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body is too large".to_string(),
                None,
                None,
            ),
            ApiError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                RATE_LIMIT_MESSAGE.to_string(),
                None,
                None,
            ),
            ApiError::Internal(context) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                context,
                Some(GENERIC_ERROR_MESSAGE.to_string()),
                None,
            ),
        };

        let body = ErrorBody {
            success: false,
            error,
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge;
        }
        tracing::debug!(rejection = %rejection.body_text(), "Rejected JSON body");
        let message = match rejection {
            JsonRejection::JsonSyntaxError(_) => MALFORMED_JSON_MESSAGE,
            JsonRejection::MissingJsonContentType(_) => CONTENT_TYPE_MESSAGE,
            _ => INVALID_BODY_MESSAGE,
        };
        ApiError::BadRequest(message.to_string())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!(rejection = %rejection.body_text(), "Rejected query string");
        ApiError::BadRequest(INVALID_QUERY_MESSAGE.to_string())
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Validation(v) => ApiError::Validation(v),
            other => ApiError::internal("Failed to process message", other),
        }
    }
}

impl From<InookeyError> for ApiError {
    fn from(err: InookeyError) -> Self {
        ApiError::internal("Internal server error", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: ApiError) -> (StatusCode, ErrorBody) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_failed_carries_details() {
        let err = ApiError::from(ValidationError::ValidationFailed {
            details: vec!["Customer name is required".to_string()],
        });
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
        assert_eq!(body.error, "Validation failed");
        assert_eq!(body.details.unwrap(), vec!["Customer name is required"]);
    }

    #[tokio::test]
    async fn test_invalid_input_is_verbatim() {
        let err = ApiError::from(ValidationError::TooLong("Message is too long".to_string()));
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Message is too long");
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn test_storage_error_sanitized() {
        let err: ApiError =
            InookeyError::Storage("sqlite: disk full at /var/db".to_string()).into();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let text = serde_json::to_string(&body).unwrap();
        assert!(!text.contains("sqlite"));
        assert!(!text.contains("/var/db"));
        assert_eq!(body.message.as_deref(), Some(GENERIC_ERROR_MESSAGE));
    }

    #[tokio::test]
    async fn test_chat_persistence_error_maps_to_500() {
        let err: ApiError = ChatError::Persistence("locked".to_string()).into();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Failed to process message");
    }

    #[tokio::test]
    async fn test_chat_validation_error_stays_400() {
        let err: ApiError =
            ChatError::Validation(ValidationError::InvalidInput("bad".to_string())).into();
        let (status, _) = body_of(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_payload_too_large_maps_to_413() {
        let (status, body) = body_of(ApiError::PayloadTooLarge).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!body.success);
    }

    async fn reject_json(content_type: &str, body: &'static str) -> ApiError {
        use axum::extract::FromRequest;
        let req = axum::http::Request::post("/")
            .header("content-type", content_type)
            .body(axum::body::Body::from(body))
            .unwrap();
        match Json::<std::collections::HashMap<String, u32>>::from_request(req, &()).await {
            Ok(_) => panic!("body should have been rejected"),
            Err(rejection) => rejection.into(),
        }
    }

    #[tokio::test]
    async fn test_json_rejections_use_fixed_messages() {
        let cases = [
            ("application/json", "{not json", MALFORMED_JSON_MESSAGE),
            ("application/json", r#"{"count": "seven"}"#, INVALID_BODY_MESSAGE),
            ("text/plain", r#"{"count": 7}"#, CONTENT_TYPE_MESSAGE),
        ];
        for (content_type, raw, expected) in cases {
            let (status, body) = body_of(reject_json(content_type, raw).await).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body.error, expected);
            assert!(!body.error.contains("seven"));
        }
    }

    #[tokio::test]
    async fn test_query_rejection_uses_fixed_message() {
        use axum::extract::{FromRequestParts, Query};
        let (mut parts, _) = axum::http::Request::get("/?limit=abc")
            .body(())
            .unwrap()
            .into_parts();
        let rejection = Query::<std::collections::HashMap<String, u32>>::from_request_parts(
            &mut parts,
            &(),
        )
        .await
        .err()
        .unwrap();
        let (status, body) = body_of(rejection.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, INVALID_QUERY_MESSAGE);
    }

    #[tokio::test]
    async fn test_rate_limited_maps_to_429() {
        let (status, body) = body_of(ApiError::TooManyRequests).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body.error, RATE_LIMIT_MESSAGE);
    }
}
