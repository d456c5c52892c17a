//! HTTP response building helpers
//!
//! Provides a consistent API for building HTTP responses across all handlers.
//! Protocol documents (actor, note, activity responses) carry the activity
//! content type; operational endpoints use plain JSON.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;

use crate::activitypub::ACTIVITY_CONTENT_TYPE;
use crate::error::LaurelError;

/// Result type alias for handlers
pub type HandlerResult = Result<Response<Full<Bytes>>, LaurelError>;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a protocol document response with the activity content type
pub fn activity_json<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, ACTIVITY_CONTENT_TYPE)
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

/// Serve already-serialized protocol document bytes verbatim
pub fn activity_bytes(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, ACTIVITY_CONTENT_TYPE)
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Build a 404 Not Found response with message
pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": message }),
    )
}

/// Build a 400 Bad Request response with message
pub fn bad_request(message: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::BAD_REQUEST,
        &serde_json::json!({ "error": message }),
    )
}

/// Build a 405 Method Not Allowed response
pub fn method_not_allowed() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({ "error": "Method not allowed" }),
    )
}

/// Convert a LaurelError to an appropriate HTTP response
pub fn error_response(error: LaurelError) -> Response<Full<Bytes>> {
    let (status, message) = match &error {
        LaurelError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        LaurelError::InvalidActivity(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        LaurelError::NotImplemented(msg) => (StatusCode::NOT_IMPLEMENTED, msg.clone()),
        LaurelError::Signature(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
        LaurelError::Integrity { expected, actual } => (
            StatusCode::CONFLICT,
            format!("Fingerprint mismatch: expected {}, got {}", expected, actual),
        ),
        LaurelError::Delivery(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
        LaurelError::Json(e) => (StatusCode::BAD_REQUEST, format!("JSON error: {}", e)),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    };

    json_response(status, &serde_json::json!({ "error": message }))
}

/// Wrap a handler result into a final HTTP response
pub fn from_handler(result: HandlerResult) -> Response<Full<Bytes>> {
    match result {
        Ok(response) => response,
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response() {
        let resp = ok(&serde_json::json!({"test": true}));
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_activity_response_content_type() {
        let resp = activity_json(StatusCode::OK, &serde_json::json!({"type": "Note"}));
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            ACTIVITY_CONTENT_TYPE
        );
    }

    #[test]
    fn test_error_response_not_found() {
        let resp = error_response(LaurelError::NotFound("test".into()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_response_not_implemented() {
        let resp = error_response(LaurelError::NotImplemented("Delete".into()));
        assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn test_error_response_bad_signature() {
        let resp = error_response(LaurelError::Signature("bad signature".into()));
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
